use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::digest::Digest;
use crate::media_types;

/// A document whose `mediaType` is fixed, so a decoded body can be narrowed
/// to it.
pub trait Typed {
    const MEDIA_TYPE: &'static str;
}

/// A document that may declare its own `mediaType`.
pub trait MediaTyped {
    fn declared_media_type(&self) -> Option<&str>;
}

/// Represents a descriptor for a content blob in an OCI registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content
    pub media_type: String,
    /// Digest of the referenced content
    pub digest: Digest,
    /// Size of the referenced content in bytes
    pub size: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
    /// Embedded content, base64
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    /// Optional platform information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

impl Descriptor {
    pub fn new(media_type: impl Into<String>, digest: Digest, size: u64) -> Self {
        Self {
            media_type: media_type.into(),
            digest,
            size,
            urls: Vec::new(),
            annotations: HashMap::new(),
            data: None,
            artifact_type: None,
            platform: None,
        }
    }

    /// Descriptor of `content` as it would be pushed as a blob.
    pub fn of(media_type: impl Into<String>, content: &[u8]) -> Self {
        Self::new(media_type, Digest::sha256(content), content.len() as u64)
    }
}

/// Represents platform information for a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    /// CPU architecture
    pub architecture: String,
    /// Operating system
    pub os: String,
    #[serde(rename = "os.version", skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(rename = "os.features", default, skip_serializing_if = "Vec::is_empty")]
    pub os_features: Vec<String>,
    /// Optional variant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// Represents an OCI image manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    /// Schema version of the manifest
    pub schema_version: u32,
    /// Media type of the manifest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    /// Descriptor for the config blob
    pub config: Descriptor,
    /// Descriptors for the layer blobs
    pub layers: Vec<Descriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Descriptor>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
}

impl ImageManifest {
    pub fn new(config: Descriptor, layers: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: Some(Self::MEDIA_TYPE.to_string()),
            artifact_type: None,
            config,
            layers,
            subject: None,
            annotations: HashMap::new(),
        }
    }
}

impl Typed for ImageManifest {
    const MEDIA_TYPE: &'static str = media_types::OCI_IMAGE_MANIFEST_V1;
}

impl MediaTyped for ImageManifest {
    fn declared_media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }
}

/// Represents an OCI image index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    /// Schema version of the index
    pub schema_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    /// List of manifests
    pub manifests: Vec<Descriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Descriptor>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
}

impl Typed for ImageIndex {
    const MEDIA_TYPE: &'static str = media_types::OCI_IMAGE_INDEX_V1;
}

impl MediaTyped for ImageIndex {
    fn declared_media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }
}

/// Any manifest document, kept as raw JSON until narrowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(pub serde_json::Value);

impl Manifest {
    /// The document's own `mediaType` field.
    pub fn media_type(&self) -> Option<&str> {
        self.0.get("mediaType").and_then(|v| v.as_str())
    }

    /// Decode into a concrete document type.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.0)
    }
}

impl MediaTyped for Manifest {
    fn declared_media_type(&self) -> Option<&str> {
        self.media_type()
    }
}

/// Response of the tags list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagList {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Response of `/v2/_catalog`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub repositories: Vec<String>,
}
