//! Interpretation of registry responses: existence probes and deferred
//! results whose error bodies are decoded on first use.

use std::fmt;
use std::sync::OnceLock;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::digest::Digest;
use crate::error::{Error, ResError, Result};
use crate::models::{Manifest, MediaTyped, Typed};
use crate::registry_error::{ErrorEntry, ErrorResponse};
use crate::transport::Response;

/// Header carrying the canonical digest of returned or stored content.
pub const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";

/// Outcome of a `HEAD` existence check.
#[derive(Debug, Clone)]
pub struct Probe {
    response: Response,
    ok: bool,
}

impl Probe {
    /// Whether the content exists.
    pub fn ok(&self) -> bool {
        self.ok
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    /// `Docker-Content-Digest` of the probed content, if the registry sent a
    /// valid one.
    pub fn digest(&self) -> Option<Digest> {
        content_digest(&self.response)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.response
            .header(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.parse().ok())
    }
}

/// 200 means the content exists, 404 that it does not. Anything else is a
/// protocol violation.
pub fn probe(response: Response) -> Result<Probe> {
    match response.status() {
        StatusCode::OK => Ok(Probe { response, ok: true }),
        StatusCode::NOT_FOUND => Ok(Probe {
            response,
            ok: false,
        }),
        status => Err(ResError::new(response, format!("unexpected status code: {}", status)).into()),
    }
}

pub(crate) fn content_digest(response: &Response) -> Option<Digest> {
    response
        .header(DOCKER_CONTENT_DIGEST)
        .and_then(|v| Digest::parse(v).ok())
}

type Decoder<T> = Box<dyn Fn(&Response) -> Result<T> + Send + Sync>;

enum Outcome<T> {
    Success(T),
    Failure(Vec<ErrorEntry>),
    Malformed(String),
}

/// A response below 500 whose interpretation is deferred until first use.
///
/// Successful responses run the decoder; 4xx responses parse the registry
/// error body. Either way the outcome is computed once.
pub struct ApiResult<T> {
    response: Response,
    decode: Decoder<T>,
    outcome: OnceLock<Outcome<T>>,
}

/// Wrap `response`, escalating server errors immediately.
pub fn result<T, F>(response: Response, decode: F) -> Result<ApiResult<T>>
where
    F: Fn(&Response) -> Result<T> + Send + Sync + 'static,
{
    if response.status().is_server_error() {
        let status = response.status();
        return Err(ResError::new(response, format!("server error: {}", status)).into());
    }
    Ok(ApiResult {
        response,
        decode: Box::new(decode),
        outcome: OnceLock::new(),
    })
}

/// Decoder for JSON bodies.
pub fn json<T: DeserializeOwned>(response: &Response) -> Result<T> {
    response.json()
}

/// Decoder for endpoints whose success carries nothing.
pub fn empty(_: &Response) -> Result<()> {
    Ok(())
}

fn error_entries(response: &Response) -> Vec<ErrorEntry> {
    if response.content_type() != Some("application/json") {
        return Vec::new();
    }
    match serde_json::from_slice::<ErrorResponse>(response.body()) {
        Ok(body) => body.errors,
        Err(err) => {
            warn!("unreadable error body from {}: {}", response.url(), err);
            Vec::new()
        }
    }
}

impl<T> ApiResult<T> {
    fn outcome(&self) -> &Outcome<T> {
        self.outcome.get_or_init(|| {
            if self.response.status().is_client_error() {
                return Outcome::Failure(error_entries(&self.response));
            }
            match (self.decode)(&self.response) {
                Ok(value) => Outcome::Success(value),
                Err(err) => Outcome::Malformed(err.to_string()),
            }
        })
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome(), Outcome::Success(_))
    }

    /// Registry errors carried by a 4xx response; empty otherwise.
    pub fn errors(&self) -> &[ErrorEntry] {
        match self.outcome() {
            Outcome::Failure(errors) => errors,
            _ => &[],
        }
    }

    /// The decoded value, or the registry's error as [`Error::Registry`].
    pub fn unwrap(self) -> Result<Success<T>> {
        self.unwrap_with(|_| {})
    }

    /// Like [`unwrap`](Self::unwrap), but lets `cb` see the registry errors
    /// before the failure is returned.
    pub fn unwrap_with<F>(self, cb: F) -> Result<Success<T>>
    where
        F: FnOnce(&[ErrorEntry]),
    {
        self.outcome();
        let ApiResult {
            response, outcome, ..
        } = self;
        match outcome.into_inner() {
            Some(Outcome::Success(value)) => Ok(Success::new(value, &response)),
            Some(Outcome::Failure(errors)) => {
                cb(&errors);
                Err(Error::Registry {
                    status: response.status(),
                    errors,
                })
            }
            Some(Outcome::Malformed(message)) => {
                Err(ResError::new(response, format!("malformed response: {}", message)).into())
            }
            None => Err(ResError::new(response, "response was not evaluated").into()),
        }
    }

    /// The decoded value, or `default` on any failure.
    pub fn unwrap_or(self, default: T) -> T {
        self.unwrap().map(Success::into_value).unwrap_or(default)
    }
}

impl<T: fmt::Debug> fmt::Debug for ApiResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiResult")
            .field("status", &self.response.status())
            .field("url", &self.response.url().as_str())
            .finish_non_exhaustive()
    }
}

/// A decoded value together with what the response declared about it.
#[derive(Debug, Clone)]
pub struct Success<T> {
    value: T,
    content_type: Option<String>,
    digest: Option<Digest>,
}

impl<T> Success<T> {
    fn new(value: T, response: &Response) -> Self {
        Self {
            value,
            content_type: response.content_type().map(str::to_string),
            digest: content_digest(response),
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    /// `Content-Type` of the response, without parameters.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// `Docker-Content-Digest` of the response.
    pub fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }
}

impl<T: MediaTyped> Success<T> {
    fn declares(&self, media_type: &str) -> bool {
        self.content_type.as_deref() == Some(media_type)
            || self.value.declared_media_type() == Some(media_type)
    }

    /// The value if the response or the value itself declares `media_type`.
    /// Nothing is validated or converted.
    pub fn narrow(self, media_type: &str) -> Option<T> {
        if self.declares(media_type) {
            Some(self.value)
        } else {
            None
        }
    }
}

impl Success<Manifest> {
    /// Decode the document as `U` if it is declared as `U`'s media type.
    pub fn narrow_to<U>(&self) -> Result<Option<U>>
    where
        U: Typed + DeserializeOwned,
    {
        if !self.declares(U::MEDIA_TYPE) {
            return Ok(None);
        }
        Ok(Some(self.value.decode()?))
    }
}
