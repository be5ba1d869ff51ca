use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderValue};
use serde::Deserialize;
use tracing::{debug, info};
use url::{Origin, Url};

use super::{Middleware, Next, Request, Response};
use crate::error::{FormatError, ResError, Result};

/// Parameters of a `WWW-Authenticate: Bearer ...` challenge as issued by
/// CNCF distribution and compatible registries. Not a general RFC 7235
/// parser: only the `Bearer` scheme with `key="value"` and `key=token`
/// pairs is understood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub realm: String,
    pub service: Option<String>,
    pub scope: Option<String>,
}

impl Challenge {
    pub fn parse(text: &str) -> Option<Self> {
        let (scheme, params) = text.trim_start().split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for (key, value) in parse_params(params) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }

        Some(Self {
            realm: realm?,
            service,
            scope,
        })
    }

    /// URL of the token endpoint with `service` and `scope` as query.
    pub fn token_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.realm)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = &self.service {
                query.append_pair("service", service);
            }
            if let Some(scope) = &self.scope {
                query.append_pair("scope", scope);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }
}

fn parse_params(text: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut chars = text.chars().peekable();

    loop {
        while chars.next_if(|c| *c == ',' || c.is_whitespace()).is_some() {}

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && *c != ',') {
            key.push(c);
        }
        if chars.next_if_eq(&'=').is_none() {
            if chars.peek().is_none() {
                break;
            }
            continue;
        }

        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    c => value.push(c),
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| *c != ',') {
                value.push(c);
            }
            value = value.trim().to_string();
        }

        let key = key.trim();
        if !key.is_empty() {
            out.push((key.to_string(), value));
        }
    }

    out
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// Answers bearer challenges by exchanging for a token at the challenge's
/// realm and replaying the request once with it.
///
/// The last token obtained for an origin is attached up front to later
/// requests for that same origin only. A stale or out-of-scope token just
/// triggers a fresh exchange.
#[derive(Debug, Default)]
pub struct Authenticator {
    basic: Option<HeaderValue>,
    tokens: Mutex<HashMap<Origin, HeaderValue>>,
}

impl Authenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `username:password` as basic credentials to the token realm.
    pub fn with_credentials(username: &str, password: &str) -> Result<Self> {
        let encoded = STANDARD.encode(format!("{}:{}", username, password));
        let basic = HeaderValue::from_str(&format!("Basic {}", encoded))
            .map_err(|_| FormatError::Argument("credentials are not valid header text".to_string()))?;
        Ok(Self {
            basic: Some(basic),
            tokens: Mutex::default(),
        })
    }

    fn cached(&self, url: &Url) -> Option<HeaderValue> {
        let tokens = self.tokens.lock().ok()?;
        tokens.get(&url.origin()).cloned()
    }

    fn remember(&self, url: &Url, value: HeaderValue) {
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.insert(url.origin(), value);
        }
    }

    async fn exchange(&self, challenge: &Challenge, next: Next<'_>) -> Result<HeaderValue> {
        let url = challenge.token_url()?;
        info!("requesting token from {}", url);

        let mut request = Request::get(url);
        if let Some(basic) = &self.basic {
            request.headers.insert(header::AUTHORIZATION, basic.clone());
        }
        let res = next.run(request).await?;
        if !res.status().is_success() {
            return Err(ResError::new(res, "token exchange failed").into());
        }

        let payload: TokenResponse = res.json()?;
        let Some(token) = payload.token.or(payload.access_token) else {
            return Err(ResError::new(res, "token response carries no token").into());
        };
        HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ResError::new(res, "token is not valid header text").into())
    }
}

#[async_trait]
impl Middleware for Authenticator {
    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response> {
        let mut first = request.clone();
        if !first.headers.contains_key(header::AUTHORIZATION) {
            if let Some(token) = self.cached(&request.url) {
                first.headers.insert(header::AUTHORIZATION, token);
            }
        }

        let res = next.run(first).await?;
        if res.status() != StatusCode::UNAUTHORIZED {
            return Ok(res);
        }

        let Some(text) = res.header(header::WWW_AUTHENTICATE) else {
            return Err(ResError::new(res, "unauthorized but challenge is not given").into());
        };
        let Some(challenge) = Challenge::parse(text) else {
            let scheme = text.split_whitespace().next().unwrap_or_default();
            let message = if scheme.eq_ignore_ascii_case("bearer") {
                "challenge has no realm".to_string()
            } else {
                format!("unsupported challenge scheme: {}", scheme)
            };
            return Err(ResError::new(res, message).into());
        };
        debug!("challenged by {:?}", challenge);

        let token = self.exchange(&challenge, next).await?;
        self.remember(&request.url, token.clone());

        let mut retry = request;
        retry.headers.insert(header::AUTHORIZATION, token);
        next.run(retry).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use reqwest::header::HeaderMap;

    use super::*;
    use crate::error::Error;
    use crate::transport::testing::{Recorder, respond};
    use crate::transport::{Pipeline, Transport};

    #[test]
    fn test_parse_challenge() {
        let c = Challenge::parse(
            r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/node:pull""#,
        )
        .unwrap();
        assert_eq!(c.realm, "https://auth.docker.io/token");
        assert_eq!(c.service.as_deref(), Some("registry.docker.io"));
        assert_eq!(c.scope.as_deref(), Some("repository:library/node:pull"));
    }

    #[test]
    fn test_parse_challenge_scope_with_commas() {
        let c = Challenge::parse(
            r#"Bearer realm="https://x.com/token", scope="repository:a/b:pull,push""#,
        )
        .unwrap();
        assert_eq!(c.realm, "https://x.com/token");
        assert_eq!(c.service, None);
        assert_eq!(c.scope.as_deref(), Some("repository:a/b:pull,push"));
    }

    #[test]
    fn test_parse_challenge_unquoted_and_missing_realm() {
        let c = Challenge::parse("Bearer realm=https://x.com/token,service=x.com").unwrap();
        assert_eq!(c.realm, "https://x.com/token");
        assert_eq!(c.service.as_deref(), Some("x.com"));

        assert_eq!(Challenge::parse(r#"Bearer service="x.com""#), None);
    }

    #[test]
    fn test_parse_challenge_needs_bearer_scheme() {
        assert_eq!(Challenge::parse(r#"Basic realm="Registry Realm""#), None);
        assert_eq!(Challenge::parse(r#"realm="https://x.com/token""#), None);
        assert!(Challenge::parse(r#"bearer realm="https://x.com/token""#).is_some());
    }

    #[test]
    fn test_token_url() {
        let c = Challenge {
            realm: "https://auth.x.com/token".to_string(),
            service: Some("x.com".to_string()),
            scope: Some("repository:a:pull,push".to_string()),
        };
        assert_eq!(
            c.token_url().unwrap().as_str(),
            "https://auth.x.com/token?service=x.com&scope=repository%3Aa%3Apull%2Cpush"
        );

        let bare = Challenge {
            realm: "https://auth.x.com/token".to_string(),
            service: None,
            scope: None,
        };
        assert_eq!(bare.token_url().unwrap().as_str(), "https://auth.x.com/token");
    }

    fn registry() -> Recorder {
        Recorder::new(|req| {
            if req.url.host_str() == Some("auth.x.com") {
                let body = if req.headers.contains_key(header::AUTHORIZATION) {
                    r#"{"access_token":"secret"}"#
                } else {
                    r#"{"token":"anon"}"#
                };
                return Response::new(StatusCode::OK, req.url.clone(), HeaderMap::new(), body);
            }
            match req.headers.get(header::AUTHORIZATION) {
                Some(v) if v == "Bearer anon" || v == "Bearer secret" => {
                    respond(req, StatusCode::OK)
                }
                _ => {
                    let mut headers = HeaderMap::new();
                    headers.insert(
                        header::WWW_AUTHENTICATE,
                        HeaderValue::from_static(
                            r#"Bearer realm="https://auth.x.com/token",service="x.com",scope="repository:a:pull""#,
                        ),
                    );
                    Response::new(StatusCode::UNAUTHORIZED, req.url.clone(), headers, Bytes::new())
                }
            }
        })
    }

    fn url() -> Url {
        Url::parse("https://x.com/v2/a/manifests/latest").unwrap()
    }

    #[tokio::test]
    async fn test_exchanges_token_and_retries() {
        let terminal = Arc::new(registry());
        let pipeline = Pipeline::new(terminal.clone()).stage(Authenticator::new());

        let res = pipeline.fetch(Request::get(url())).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let requests = terminal.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 3);
        assert_eq!(
            requests[1].url.as_str(),
            "https://auth.x.com/token?service=x.com&scope=repository%3Aa%3Apull"
        );
        assert_eq!(
            requests[2].headers.get(header::AUTHORIZATION).unwrap(),
            "Bearer anon"
        );
    }

    #[tokio::test]
    async fn test_reuses_token() {
        let terminal = Arc::new(registry());
        let pipeline = Pipeline::new(terminal.clone()).stage(Authenticator::new());

        pipeline.fetch(Request::get(url())).await.unwrap();
        pipeline.fetch(Request::get(url())).await.unwrap();
        assert_eq!(terminal.count(), 4);
    }

    #[tokio::test]
    async fn test_basic_credentials_reach_realm() {
        let terminal = Arc::new(registry());
        let pipeline = Pipeline::new(terminal.clone())
            .stage(Authenticator::with_credentials("user", "pass").unwrap());

        pipeline.fetch(Request::get(url())).await.unwrap();

        let requests = terminal.requests.lock().unwrap().clone();
        assert_eq!(
            requests[1].headers.get(header::AUTHORIZATION).unwrap(),
            "Basic dXNlcjpwYXNz"
        );
        assert_eq!(
            requests[2].headers.get(header::AUTHORIZATION).unwrap(),
            "Bearer secret"
        );
    }

    #[tokio::test]
    async fn test_missing_challenge_is_fatal() {
        let terminal = Arc::new(Recorder::new(|req| respond(req, StatusCode::UNAUTHORIZED)));
        let pipeline = Pipeline::new(terminal.clone()).stage(Authenticator::new());

        let err = pipeline.fetch(Request::get(url())).await.unwrap_err();
        match err {
            Error::Response(err) => {
                assert_eq!(err.message(), "unauthorized but challenge is not given");
                assert_eq!(err.response().status(), StatusCode::UNAUTHORIZED);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(terminal.count(), 1);
    }

    #[tokio::test]
    async fn test_passes_through_other_statuses() {
        let terminal = Arc::new(Recorder::new(|req| respond(req, StatusCode::NOT_FOUND)));
        let pipeline = Pipeline::new(terminal.clone()).stage(Authenticator::new());

        let res = pipeline.fetch(Request::get(url())).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(terminal.count(), 1);
    }

    #[tokio::test]
    async fn test_token_stays_with_its_origin() {
        let terminal = Arc::new(registry());
        let pipeline = Pipeline::new(terminal.clone()).stage(Authenticator::new());
        pipeline.fetch(Request::get(url())).await.unwrap();

        let storage = Url::parse("https://storage.y.com/uploads/1").unwrap();
        pipeline.fetch(Request::get(storage)).await.unwrap();

        let requests = terminal.requests.lock().unwrap().clone();
        assert_eq!(requests[3].url.host_str(), Some("storage.y.com"));
        assert!(!requests[3].headers.contains_key(header::AUTHORIZATION));

        let other_port = Url::parse("https://x.com:5000/v2/a/manifests/latest").unwrap();
        pipeline.fetch(Request::get(other_port)).await.unwrap();
        let requests = terminal.requests.lock().unwrap().clone();
        assert!(!requests[6].headers.contains_key(header::AUTHORIZATION));
    }

    #[tokio::test]
    async fn test_non_bearer_challenge_names_scheme() {
        let terminal = Arc::new(Recorder::new(|req| {
            let mut headers = HeaderMap::new();
            headers.insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(r#"Basic realm="Registry Realm""#),
            );
            Response::new(StatusCode::UNAUTHORIZED, req.url.clone(), headers, Bytes::new())
        }));
        let pipeline = Pipeline::new(terminal.clone()).stage(Authenticator::new());

        let err = pipeline.fetch(Request::get(url())).await.unwrap_err();
        match err {
            Error::Response(err) => {
                assert_eq!(err.message(), "unsupported challenge scheme: Basic")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(terminal.count(), 1);
    }
}
