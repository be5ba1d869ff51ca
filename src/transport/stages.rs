use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{self, HeaderValue};
use tracing::warn;

use super::{Middleware, Next, Request, Response};
use crate::endpoint::Resource;
use crate::error::{FormatError, Result};

/// Talks plain HTTP to registries served without TLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsecure;

#[async_trait]
impl Middleware for Unsecure {
    async fn handle(&self, mut request: Request, next: Next<'_>) -> Result<Response> {
        if request.url.scheme() == "https" && request.url.set_scheme("http").is_err() {
            warn!("cannot downgrade {} to http", request.url);
        }
        next.run(request).await
    }
}

/// Serves the API from below a sub-path, e.g. `https://x.com/prefix/v2/`.
#[derive(Debug, Clone)]
pub struct PathPrefix {
    prefix: String,
}

impl PathPrefix {
    pub fn new(prefix: &str) -> Self {
        let trimmed = prefix.trim_matches('/');
        Self {
            prefix: if trimmed.is_empty() {
                String::new()
            } else {
                format!("/{}", trimmed)
            },
        }
    }

    fn apply(&self, path: &str) -> Option<String> {
        if self.prefix.is_empty() {
            return None;
        }
        let already = path == self.prefix
            || path
                .strip_prefix(self.prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/'));
        if already {
            return None;
        }
        Some(format!("{}{}", self.prefix, path))
    }
}

#[async_trait]
impl Middleware for PathPrefix {
    async fn handle(&self, mut request: Request, next: Next<'_>) -> Result<Response> {
        if let Some(path) = self.apply(request.url.path()) {
            request.url.set_path(&path);
        }
        next.run(request).await
    }
}

/// Content negotiation for manifest pulls.
#[derive(Debug, Clone)]
pub struct Accept {
    manifests: HeaderValue,
}

impl Accept {
    /// Accept `media_types` when pulling manifests.
    pub fn manifests<I, S>(media_types: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = media_types
            .into_iter()
            .map(|m| m.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let manifests = HeaderValue::from_str(&joined)
            .map_err(|_| FormatError::Argument(format!("invalid media types {:?}", joined)))?;
        Ok(Self { manifests })
    }
}

#[async_trait]
impl Middleware for Accept {
    async fn handle(&self, mut request: Request, next: Next<'_>) -> Result<Response> {
        let wants_manifest = request
            .endpoint
            .as_ref()
            .is_some_and(|ep| ep.method == Method::GET && ep.resource() == Resource::Manifests);
        if wants_manifest {
            request
                .headers
                .insert(header::ACCEPT, self.manifests.clone());
        }
        next.run(request).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use url::Url;

    use super::*;
    use crate::digest::Digest;
    use crate::endpoint::{Endpoint, Target};
    use crate::reference::Reference;
    use crate::transport::testing::Recorder;
    use crate::transport::{Pipeline, Transport};

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_unsecure_downgrades_scheme() {
        let terminal = Arc::new(Recorder::ok());
        let pipeline = Pipeline::new(terminal.clone()).stage(Unsecure);

        pipeline.fetch(Request::get(url("https://x.com"))).await.unwrap();
        assert_eq!(terminal.last().url.as_str(), "http://x.com/");

        pipeline.fetch(Request::get(url("http://y.com/v2/"))).await.unwrap();
        assert_eq!(terminal.last().url.as_str(), "http://y.com/v2/");
    }

    #[tokio::test]
    async fn test_path_prefix() {
        let terminal = Arc::new(Recorder::ok());
        let pipeline = Pipeline::new(terminal.clone()).stage(PathPrefix::new("foo"));

        pipeline.fetch(Request::get(url("https://x.com/bar"))).await.unwrap();
        assert_eq!(terminal.last().url.as_str(), "https://x.com/foo/bar");
    }

    #[tokio::test]
    async fn test_path_prefix_is_idempotent() {
        let terminal = Arc::new(Recorder::ok());
        let pipeline = Pipeline::new(terminal.clone())
            .stage(PathPrefix::new("foo"))
            .stage(PathPrefix::new("/foo/"));

        pipeline.fetch(Request::get(url("https://x.com/bar"))).await.unwrap();
        assert_eq!(terminal.last().url.as_str(), "https://x.com/foo/bar");

        pipeline
            .fetch(Request::get(url("https://x.com/foobar")))
            .await
            .unwrap();
        assert_eq!(terminal.last().url.as_str(), "https://x.com/foo/foobar");
    }

    #[tokio::test]
    async fn test_path_prefix_keeps_query() {
        let terminal = Arc::new(Recorder::ok());
        let pipeline = Pipeline::new(terminal.clone()).stage(PathPrefix::new("mirror"));

        pipeline
            .fetch(Request::get(url("https://x.com/v2/a/tags/list?n=1")))
            .await
            .unwrap();
        assert_eq!(
            terminal.last().url.as_str(),
            "https://x.com/mirror/v2/a/tags/list?n=1"
        );
    }

    #[tokio::test]
    async fn test_accept_only_for_manifest_get() {
        let terminal = Arc::new(Recorder::ok());
        let pipeline = Pipeline::new(terminal.clone())
            .stage(Accept::manifests(["foo", "bar"]).unwrap());

        let manifest = Target::Manifest {
            reference: Reference::tag("latest").unwrap(),
        };
        let get = Request::get(url("https://x.com/v2/a/manifests/latest"))
            .with_endpoint(Endpoint::new("a", Method::GET, manifest.clone()));
        pipeline.fetch(get).await.unwrap();
        assert_eq!(
            terminal.last().headers.get(header::ACCEPT).unwrap(),
            "foo, bar"
        );

        let head = Request::new(Method::HEAD, url("https://x.com/v2/a/manifests/latest"))
            .with_endpoint(Endpoint::new("a", Method::HEAD, manifest));
        pipeline.fetch(head).await.unwrap();
        assert!(terminal.last().headers.get(header::ACCEPT).is_none());

        let tags = Request::get(url("https://x.com/v2/a/tags/list")).with_endpoint(Endpoint::new(
            "a",
            Method::GET,
            Target::TagsList { n: None, last: None },
        ));
        pipeline.fetch(tags).await.unwrap();
        assert!(terminal.last().headers.get(header::ACCEPT).is_none());

        let blob = Request::get(url("https://x.com/v2/a/blobs/x")).with_endpoint(Endpoint::new(
            "a",
            Method::GET,
            Target::Blob {
                digest: Digest::sha256(b""),
            },
        ));
        pipeline.fetch(blob).await.unwrap();
        assert!(terminal.last().headers.get(header::ACCEPT).is_none());

        pipeline.fetch(Request::get(url("https://x.com/v2/"))).await.unwrap();
        assert!(terminal.last().headers.get(header::ACCEPT).is_none());
        assert_eq!(terminal.count(), 5);
    }
}
