//! Media type strings for documents commonly stored in registries.

pub const OCI_IMAGE_INDEX_V1: &str = "application/vnd.oci.image.index.v1+json";
pub const OCI_IMAGE_MANIFEST_V1: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_IMAGE_CONFIG_V1: &str = "application/vnd.oci.image.config.v1+json";
pub const OCI_IMAGE_LAYER_V1_TAR: &str = "application/vnd.oci.image.layer.v1.tar";
pub const OCI_IMAGE_LAYER_V1_TAR_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
pub const OCI_EMPTY_V1: &str = "application/vnd.oci.empty.v1+json";

pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST_V2: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

pub const HELM_CONFIG_V1: &str = "application/vnd.cncf.helm.config.v1+json";
pub const HELM_CHART_CONTENT_V1: &str = "application/vnd.cncf.helm.chart.content.v1.tar+gzip";
pub const HELM_CHART_PROVENANCE_V1: &str = "application/vnd.cncf.helm.chart.provenance.v1.prov";

/// What an `Accept` stage advertises when nothing else is configured.
pub const DEFAULT_MANIFEST_TYPES: &[&str] = &[
    OCI_IMAGE_INDEX_V1,
    OCI_IMAGE_MANIFEST_V1,
    DOCKER_MANIFEST_LIST_V2,
    DOCKER_MANIFEST_V2,
];
