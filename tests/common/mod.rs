#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing_subscriber::EnvFilter;

use ocidist::transport::{Request, Response, Transport};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

type Responder = Box<dyn Fn(&Request) -> Response + Send + Sync>;

/// In-memory terminal that keeps every request and answers from a closure.
pub struct Recording {
    requests: Mutex<Vec<Request>>,
    respond: Responder,
}

impl Recording {
    pub fn new(respond: impl Fn(&Request) -> Response + Send + Sync + 'static) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        }
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last(&self) -> Request {
        self.requests().pop().unwrap()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for Recording {
    async fn fetch(&self, request: Request) -> ocidist::Result<Response> {
        let response = (self.respond)(&request);
        self.requests.lock().unwrap().push(request);
        Ok(response)
    }
}

/// Response builder for responders.
pub struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Reply {
    pub fn status(status: u16) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_str(value).unwrap(),
        );
        self
    }

    pub fn json(self, body: &str) -> Self {
        self.header("content-type", "application/json").body(body)
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = Bytes::from(body.to_string());
        self
    }

    pub fn to(self, request: &Request) -> Response {
        Response::new(self.status, request.url.clone(), self.headers, self.body)
    }
}
