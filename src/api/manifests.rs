use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{self, HeaderValue};
use serde::Serialize;
use url::Url;

use super::{Repository, resolve};
use crate::digest::Digest;
use crate::endpoint::Target;
use crate::error::{FormatError, Result};
use crate::models::{Manifest, Typed};
use crate::reference::Reference;
use crate::result::{ApiResult, Probe, content_digest, empty, json, probe, result};
use crate::transport::Request;

/// A stored manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct Pushed {
    pub location: Option<Url>,
    /// `Docker-Content-Digest` of the stored manifest, if the registry sent it.
    pub digest: Option<Digest>,
}

/// Manifest endpoints of one repository.
///
/// Every operation takes an optional reference and falls back to the one
/// the repository was opened with, else `latest`.
#[derive(Debug, Clone, Copy)]
pub struct Manifests<'a> {
    repo: &'a Repository,
}

impl<'a> Manifests<'a> {
    pub(crate) fn new(repo: &'a Repository) -> Self {
        Self { repo }
    }

    fn target(&self, reference: Option<Reference>) -> Result<(Url, Reference)> {
        let reference = reference.unwrap_or_else(|| self.repo.default_reference());
        let url = self.repo.url(&format!("manifests/{}", reference))?;
        Ok((url, reference))
    }

    /// `HEAD /v2/{name}/manifests/{reference}`
    pub async fn exists(&self, reference: Option<Reference>) -> Result<Probe> {
        let (url, reference) = self.target(reference)?;
        let res = self
            .repo
            .send(Request::new(Method::HEAD, url), Target::Manifest { reference })
            .await?;
        probe(res)
    }

    /// `GET /v2/{name}/manifests/{reference}`
    pub async fn get(&self, reference: Option<Reference>) -> Result<ApiResult<Manifest>> {
        let (url, reference) = self.target(reference)?;
        let res = self
            .repo
            .send(Request::get(url), Target::Manifest { reference })
            .await?;
        result(res, json::<Manifest>)
    }

    /// `PUT /v2/{name}/manifests/{reference}` with `body` declared as
    /// `media_type`.
    pub async fn put(
        &self,
        reference: Option<Reference>,
        media_type: &str,
        body: impl Into<Bytes>,
    ) -> Result<ApiResult<Pushed>> {
        let (url, reference) = self.target(reference)?;
        let content_type = HeaderValue::from_str(media_type)
            .map_err(|_| FormatError::Argument(format!("invalid media type {:?}", media_type)))?;
        let body = body.into();
        let request = Request::new(Method::PUT, url)
            .with_header(header::CONTENT_TYPE, content_type)
            .with_body(body.clone());
        let res = self
            .repo
            .send(request, Target::ManifestPut {
                reference,
                digest: Some(Digest::sha256(&body)),
            })
            .await?;
        let base = self.repo.base().clone();
        result(res, move |res| {
            let location = match res.header(header::LOCATION) {
                Some(l) => Some(resolve(&base, l)?),
                None => None,
            };
            Ok(Pushed {
                location,
                digest: content_digest(res),
            })
        })
    }

    /// Serialize `document` and put it under its own media type.
    pub async fn put_json<T>(&self, reference: Option<Reference>, document: &T) -> Result<ApiResult<Pushed>>
    where
        T: Serialize + Typed,
    {
        let body = serde_json::to_vec(document)?;
        self.put(reference, T::MEDIA_TYPE, body).await
    }

    /// `DELETE /v2/{name}/manifests/{reference}`
    pub async fn delete(&self, reference: Option<Reference>) -> Result<ApiResult<()>> {
        let (url, reference) = self.target(reference)?;
        let res = self
            .repo
            .send(Request::new(Method::DELETE, url), Target::Manifest { reference })
            .await?;
        result(res, empty)
    }
}
