//! Descriptors attached to outbound requests so pipeline stages can tell which
//! registry endpoint a request targets without parsing its URL.

use reqwest::Method;
use url::Url;

use crate::digest::Digest;
use crate::reference::Reference;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Blobs,
    Manifests,
    Tags,
    Referrers,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Blobs => "blobs",
            Resource::Manifests => "manifests",
            Resource::Tags => "tags",
            Resource::Referrers => "referrers",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Uploads,
    List,
}

/// The registry API endpoint a request was built for.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// end-2, GET and HEAD
    Blob { digest: Digest },
    /// end-3, GET and HEAD; end-9, DELETE
    Manifest { reference: Reference },
    /// end-4a and end-4b
    UploadInit { digest: Option<Digest> },
    /// end-5 and end-13
    UploadSession { location: Url },
    /// end-6
    UploadClose { digest: Digest },
    /// end-7
    ManifestPut {
        reference: Reference,
        digest: Option<Digest>,
    },
    /// end-8
    TagsList { n: Option<usize>, last: Option<String> },
    /// end-10
    BlobDelete { digest: Digest },
    /// end-11
    Mount { mount: Digest, from: Option<String> },
    /// end-12
    Referrers {
        digest: Digest,
        artifact_type: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub name: String,
    pub method: Method,
    pub target: Target,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, method: Method, target: Target) -> Self {
        Self {
            name: name.into(),
            method,
            target,
        }
    }

    pub fn resource(&self) -> Resource {
        match self.target {
            Target::Manifest { .. } | Target::ManifestPut { .. } => Resource::Manifests,
            Target::TagsList { .. } => Resource::Tags,
            Target::Referrers { .. } => Resource::Referrers,
            _ => Resource::Blobs,
        }
    }

    pub fn action(&self) -> Option<Action> {
        match self.target {
            Target::UploadInit { .. }
            | Target::UploadSession { .. }
            | Target::UploadClose { .. }
            | Target::Mount { .. } => Some(Action::Uploads),
            Target::TagsList { .. } => Some(Action::List),
            _ => None,
        }
    }

    pub fn digest(&self) -> Option<&Digest> {
        match &self.target {
            Target::Blob { digest }
            | Target::UploadClose { digest }
            | Target::BlobDelete { digest }
            | Target::Referrers { digest, .. } => Some(digest),
            Target::UploadInit { digest } | Target::ManifestPut { digest, .. } => digest.as_ref(),
            Target::Manifest { reference } => reference.as_digest(),
            _ => None,
        }
    }

    pub fn reference(&self) -> Option<&Reference> {
        match &self.target {
            Target::Manifest { reference } | Target::ManifestPut { reference, .. } => {
                Some(reference)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_and_action() {
        let digest = Digest::sha256(b"");
        let ep = Endpoint::new(
            "a/b",
            Method::GET,
            Target::Manifest {
                reference: Reference::tag("latest").unwrap(),
            },
        );
        assert_eq!(ep.resource(), Resource::Manifests);
        assert_eq!(ep.action(), None);
        assert_eq!(ep.digest(), None);

        let ep = Endpoint::new("a/b", Method::POST, Target::Mount {
            mount: digest.clone(),
            from: Some("c/d".to_string()),
        });
        assert_eq!(ep.resource(), Resource::Blobs);
        assert_eq!(ep.action(), Some(Action::Uploads));

        let ep = Endpoint::new("a/b", Method::GET, Target::TagsList { n: None, last: None });
        assert_eq!(ep.resource(), Resource::Tags);
        assert_eq!(ep.action(), Some(Action::List));

        let ep = Endpoint::new("a/b", Method::GET, Target::Referrers {
            digest: digest.clone(),
            artifact_type: None,
        });
        assert_eq!(ep.resource().as_str(), "referrers");
        assert_eq!(ep.digest(), Some(&digest));
    }
}
