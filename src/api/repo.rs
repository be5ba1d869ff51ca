use std::fmt;
use std::sync::Arc;

use url::Url;

use super::{Blobs, Manifests, Referrers, Tags};
use crate::endpoint::{Endpoint, Target};
use crate::error::{FormatError, Result};
use crate::reference::{Ref, Reference, Tag};
use crate::transport::{Request, Response, Transport};

/// One repository on a registry.
#[derive(Clone)]
pub struct Repository {
    transport: Arc<dyn Transport>,
    reference: Ref,
    base: Url,
    chunk_size: usize,
}

impl Repository {
    /// `reference` must carry a domain.
    pub fn new(transport: Arc<dyn Transport>, reference: Ref, chunk_size: usize) -> Result<Self> {
        let Some(domain) = reference.domain() else {
            return Err(FormatError::Domain(format!("{} has no domain", reference)).into());
        };
        let base = Url::parse(&format!("https://{}/v2/{}/", domain, reference.name()))?;
        Ok(Self {
            transport,
            reference,
            base,
            chunk_size,
        })
    }

    pub fn reference(&self) -> &Ref {
        &self.reference
    }

    pub fn name(&self) -> &str {
        self.reference.name()
    }

    /// `https://{domain}/v2/{name}/`
    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn blobs(&self) -> Blobs<'_> {
        Blobs::new(self)
    }

    pub fn manifests(&self) -> Manifests<'_> {
        Manifests::new(self)
    }

    pub fn tags(&self) -> Tags<'_> {
        Tags::new(self)
    }

    pub fn referrers(&self) -> Referrers<'_> {
        Referrers::new(self)
    }

    /// The reference manifest operations fall back to: the one this
    /// repository was opened with, else `latest`.
    pub(crate) fn default_reference(&self) -> Reference {
        self.reference
            .reference()
            .cloned()
            .unwrap_or_else(|| Reference::Tag(Tag::latest()))
    }

    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    pub(crate) async fn send(&self, mut request: Request, target: Target) -> Result<Response> {
        request.endpoint = Some(Endpoint::new(
            self.reference.name(),
            request.method.clone(),
            target,
        ));
        self.transport.fetch(request).await
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("reference", &self.reference.to_string())
            .field("base", &self.base.as_str())
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}
