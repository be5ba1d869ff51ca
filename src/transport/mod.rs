//! Request pipeline: an ordered list of stages in front of a terminal
//! transport that performs the actual HTTP exchange.

mod auth;
mod http;
mod stages;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::endpoint::Endpoint;
use crate::error::Result;

pub use auth::{Authenticator, Challenge};
pub use http::HttpTransport;
pub use stages::{Accept, PathPrefix, Unsecure};

/// An outbound request as seen by pipeline stages.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Which registry endpoint this request targets, if any.
    pub endpoint: Option<Endpoint>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            endpoint: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A response with its body fully read.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    url: Url,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode, url: Url, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            url,
            headers,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Value of the header `name` if present and valid visible ASCII.
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Media type of the body without parameters such as `charset`.
    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE)
            .map(|v| v.split(';').next().unwrap_or(v).trim())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Performs one HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn fetch(&self, request: Request) -> Result<Response> {
        (**self).fetch(request).await
    }
}

/// A pipeline stage. It may forward the request as is, rewrite it, answer it
/// itself, or call `next` any number of times.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response>;
}

/// The rest of the pipeline after the current stage.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Arc<dyn Middleware>],
    terminal: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub async fn run(self, request: Request) -> Result<Response> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    terminal: self.terminal,
                };
                stage.handle(request, next).await
            }
            None => self.terminal.fetch(request).await,
        }
    }
}

/// Stages applied outer to inner in the order they were added; the first
/// stage sees the request first and the response last.
#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Middleware>>,
    terminal: Arc<dyn Transport>,
}

impl Pipeline {
    pub fn new(terminal: impl Transport + 'static) -> Self {
        Self {
            stages: Vec::new(),
            terminal: Arc::new(terminal),
        }
    }

    pub fn from_arc(terminal: Arc<dyn Transport>) -> Self {
        Self {
            stages: Vec::new(),
            terminal,
        }
    }

    pub fn stage(mut self, stage: impl Middleware + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    fn head(&self) -> Next<'_> {
        Next {
            stages: &self.stages,
            terminal: self.terminal.as_ref(),
        }
    }
}

#[async_trait]
impl Transport for Pipeline {
    async fn fetch(&self, request: Request) -> Result<Response> {
        self.head().run(request).await
    }
}

/// A pipeline nested inside another one runs its own stages and then hands
/// over to the outer pipeline's remaining stages instead of its terminal.
#[async_trait]
impl Middleware for Pipeline {
    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response> {
        let chained = Chained {
            stages: &self.stages,
            outer: next,
        };
        chained.run(request).await
    }
}

struct Chained<'a> {
    stages: &'a [Arc<dyn Middleware>],
    outer: Next<'a>,
}

#[async_trait]
impl Transport for Chained<'_> {
    async fn fetch(&self, request: Request) -> Result<Response> {
        self.outer.run(request).await
    }
}

impl Chained<'_> {
    async fn run(&self, request: Request) -> Result<Response> {
        Next {
            stages: self.stages,
            terminal: self,
        }
        .run(request)
        .await
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::testing::{Recorder, respond};
    use super::*;

    struct Tap {
        id: u32,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Middleware for Tap {
        async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response> {
            self.log.lock().unwrap().push(format!("req {}", self.id));
            let response = next.run(request).await?;
            self.log.lock().unwrap().push(format!("res {}", self.id));
            Ok(response)
        }
    }

    struct Twice {
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Middleware for Twice {
        async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response> {
            self.log.lock().unwrap().push("first".to_string());
            next.run(request.clone()).await?;
            self.log.lock().unwrap().push("second".to_string());
            next.run(request).await
        }
    }

    struct ShortCircuit;

    #[async_trait]
    impl Middleware for ShortCircuit {
        async fn handle(&self, request: Request, _next: Next<'_>) -> Result<Response> {
            Ok(respond(&request, StatusCode::IM_A_TEAPOT))
        }
    }

    fn url() -> Url {
        Url::parse("https://x.com/v2/").unwrap()
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let terminal = Arc::new(Recorder::ok());
        let pipeline = Pipeline::new(terminal.clone())
            .stage(Tap { id: 1, log: log.clone() })
            .stage(Tap { id: 2, log: log.clone() })
            .stage(Tap { id: 3, log: log.clone() });

        let res = pipeline.fetch(Request::get(url())).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(terminal.count(), 1);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["req 1", "req 2", "req 3", "res 3", "res 2", "res 1"]
        );
    }

    #[tokio::test]
    async fn test_next_is_reusable() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let terminal = Arc::new(Recorder::ok());
        let pipeline = Pipeline::new(terminal.clone())
            .stage(Tap { id: 1, log: log.clone() })
            .stage(Twice { log: log.clone() })
            .stage(Tap { id: 2, log: log.clone() });

        pipeline.fetch(Request::get(url())).await.unwrap();
        assert_eq!(terminal.count(), 2);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["req 1", "first", "req 2", "res 2", "second", "req 2", "res 2", "res 1"]
        );
    }

    #[tokio::test]
    async fn test_stage_can_short_circuit() {
        let terminal = Arc::new(Recorder::ok());
        let pipeline = Pipeline::new(terminal.clone()).stage(ShortCircuit);

        let res = pipeline.fetch(Request::get(url())).await.unwrap();
        assert_eq!(res.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(terminal.count(), 0);
    }

    #[tokio::test]
    async fn test_nested_pipeline_continues_outer_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let terminal = Arc::new(Recorder::ok());
        let inner = Pipeline::new(Recorder::ok()).stage(Tap { id: 2, log: log.clone() });
        let pipeline = Pipeline::new(terminal.clone())
            .stage(Tap { id: 1, log: log.clone() })
            .stage(inner)
            .stage(Tap { id: 3, log: log.clone() });

        pipeline.fetch(Request::get(url())).await.unwrap();
        assert_eq!(terminal.count(), 1);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["req 1", "req 2", "req 3", "res 3", "res 2", "res 1"]
        );
    }

    #[test]
    fn test_content_type_strips_parameters() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        let res = Response::new(StatusCode::OK, url(), headers, Bytes::new());
        assert_eq!(res.content_type(), Some("application/json"));
    }
}
