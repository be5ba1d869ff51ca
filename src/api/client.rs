use std::fmt;
use std::sync::Arc;

use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use super::{ListOptions, Repository};
use crate::config::ClientConfig;
use crate::error::{FormatError, ResError, Result};
use crate::models::Catalog;
use crate::patterns;
use crate::reference::Ref;
use crate::result::{ApiResult, json, result};
use crate::transport::{
    Accept, Authenticator, HttpTransport, PathPrefix, Pipeline, Request, Response, Transport,
    Unsecure,
};
use crate::upload::DEFAULT_CHUNK_SIZE;

/// Entry point to one registry.
#[derive(Clone)]
pub struct Client {
    domain: String,
    transport: Arc<dyn Transport>,
    chunk_size: usize,
}

impl Client {
    /// Client for `domain` with the default pipeline.
    pub fn new(domain: &str) -> Result<Self> {
        Self::from_config(&ClientConfig::new(domain))
    }

    /// Client for `domain` sending every request through `transport`.
    pub fn with_transport(domain: &str, transport: impl Transport + 'static) -> Result<Self> {
        if !patterns::DOMAIN.is_match(domain) {
            return Err(FormatError::Domain(domain.to_string()).into());
        }
        Ok(Self {
            domain: domain.to_string(),
            transport: Arc::new(transport),
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Assemble the pipeline described by `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let http = HttpTransport::with_options(config.timeout(), config.user_agent.as_deref())?;
        let mut pipeline = Pipeline::new(http);
        if config.insecure {
            pipeline = pipeline.stage(Unsecure);
        }
        if let Some(prefix) = &config.path_prefix {
            pipeline = pipeline.stage(PathPrefix::new(prefix));
        }
        if !config.accept.is_empty() {
            pipeline = pipeline.stage(Accept::manifests(&config.accept)?);
        }
        let auth = match config.credentials() {
            Some((user, pass)) => Authenticator::with_credentials(user, pass)?,
            None => Authenticator::new(),
        };
        pipeline = pipeline.stage(auth);
        debug!("client for {} with {} stages", config.domain, pipeline.len());

        Ok(Self::with_transport(&config.domain, pipeline)?.with_chunk_size(config.chunk_size))
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!("https://{}/v2/{}", self.domain, path))?)
    }

    /// `GET /v2/`: whether the registry speaks the distribution API and
    /// accepts our credentials.
    pub async fn ping(&self) -> Result<Response> {
        let res = self.transport.fetch(Request::get(self.url("")?)).await?;
        let message = match res.status() {
            StatusCode::OK => return Ok(res),
            StatusCode::UNAUTHORIZED => "unauthorized",
            StatusCode::NOT_FOUND => "v2 API not supported",
            _ => "unknown server response",
        };
        Err(ResError::new(res, message).into())
    }

    /// `GET /v2/_catalog?n=&last=`
    pub async fn catalog(&self, options: ListOptions) -> Result<ApiResult<Catalog>> {
        let (n, last) = options.validate()?;
        let mut url = self.url("_catalog")?;
        ListOptions::apply(n, last.as_deref(), &mut url);
        let res = self.transport.fetch(Request::get(url)).await?;
        result(res, json::<Catalog>)
    }

    /// Open `reference`, e.g. `library/node` or `x.com/a/b:tag`. References
    /// without a domain are served from this client's.
    pub fn repo(&self, reference: &str) -> Result<Repository> {
        self.repository(Ref::parse(reference)?)
    }

    pub fn repository(&self, reference: Ref) -> Result<Repository> {
        let reference = match reference.domain() {
            Some(_) => reference,
            None => reference.with_domain(self.domain.as_str())?,
        };
        Repository::new(self.transport.clone(), reference, self.chunk_size)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("domain", &self.domain)
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}
