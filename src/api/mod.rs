//! Typed access to the distribution API endpoints.

mod blobs;
mod client;
mod manifests;
mod referrers;
mod repo;
mod tags;

use reqwest::header;
use url::Url;

use crate::error::{ResError, Result};
use crate::transport::Response;

pub use blobs::{Blobs, Mounted, UploadInit, UploadProgress, Uploaded};
pub use client::Client;
pub use manifests::{Manifests, Pushed};
pub use referrers::Referrers;
pub use repo::Repository;
pub use tags::{ListOptions, Tags};

/// Header a registry may use to demand a minimum chunk size.
pub const OCI_CHUNK_MIN_LENGTH: &str = "oci-chunk-min-length";

/// Resolve `location` against `base`. Registries may answer with absolute
/// URLs, absolute paths or relative ones.
pub(crate) fn resolve(base: &Url, location: &str) -> Result<Url> {
    Ok(base.join(location)?)
}

/// The `Location` header of `response`, resolved against `base`.
pub(crate) fn location(base: &Url, response: &Response) -> Result<Url> {
    match response.header(header::LOCATION) {
        Some(l) => resolve(base, l),
        None => Err(ResError::new(response.clone(), "missing Location header").into()),
    }
}
