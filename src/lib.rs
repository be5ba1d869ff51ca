//! Client for registries implementing the OCI Distribution Spec.
//!
//! ```no_run
//! # async fn run() -> ocidist::Result<()> {
//! let client = ocidist::Client::new("ghcr.io")?;
//! let repo = client.repo("a/b:latest")?;
//! let manifest = repo.manifests().get(None).await?.unwrap()?;
//! if let Some(index) = manifest.narrow_to::<ocidist::ImageIndex>()? {
//!     println!("{} platforms", index.manifests.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod digest;
pub mod endpoint;
pub mod error;
pub mod media_types;
pub mod models;
mod patterns;
pub mod range;
pub mod reference;
pub mod registry_error;
pub mod result;
pub mod transport;
pub mod upload;

pub use api::{Client, ListOptions, Repository};
pub use config::ClientConfig;
pub use digest::{Digest, Digester, HashAlgorithm};
pub use error::{Error, FormatError, ResError, Result};
pub use models::{Descriptor, ImageIndex, ImageManifest, Manifest, Platform};
pub use range::Range;
pub use reference::{Ref, Reference, Tag};
pub use registry_error::{ErrorCode, ErrorEntry};
pub use result::{ApiResult, Probe, Success};
pub use upload::UploadSession;
