//! Registry documents: manifests, manifest lists, and the layers they name

use crate::{errors::PullError, image::ContentDigest, platform::Platform};
use serde::{Deserialize, Serialize};

/// Partial implementation of the manifest v2 schema2 spec, also accepting
/// manifest lists and their OCI equivalents.
///
/// Reference: https://docs.docker.com/registry/spec/manifest-v2-2/
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Manifest {
    #[serde(rename = "schemaVersion", default)]
    pub schema_version: u32,
    #[serde(rename = "mediaType", default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub config: Option<Link>,
    #[serde(default)]
    pub layers: Option<Vec<Link>>,
    #[serde(default)]
    pub manifests: Option<Vec<Descriptor>>,
}

/// A blob named by a manifest: the runtime config, or one layer
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub struct Link {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    #[serde(default)]
    pub size: Option<u64>,
    pub digest: String,
}

/// One layer, in the order it must be applied
pub type Layer = Link;

/// Manifest list entry pointing at the manifest for one platform
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub struct Descriptor {
    #[serde(rename = "mediaType", default)]
    pub media_type: String,
    pub digest: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub platform: Option<DescriptorPlatform>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub struct DescriptorPlatform {
    pub architecture: String,
    pub os: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

pub mod media_types {
    pub const MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
    pub const MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
    pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
    pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
    pub const LAYER_TAR_GZIP: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
    pub const OCI_LAYER_TAR_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
    pub const OCI_LAYER_TAR: &str = "application/vnd.oci.image.layer.v1.tar";

    /// Every manifest type we can parse, for the `Accept` header
    pub const ACCEPT_MANIFESTS: &[&str] = &[MANIFEST, MANIFEST_LIST, OCI_MANIFEST, OCI_INDEX];

    /// Layer types we know how to unpack
    pub const LAYERS: &[&str] = &[LAYER_TAR_GZIP, OCI_LAYER_TAR_GZIP, OCI_LAYER_TAR];
}

impl Manifest {
    /// Is this a list of per-platform manifests rather than an image?
    pub fn is_list(&self) -> bool {
        self.manifests.is_some()
    }

    /// Choose the entry for a platform from a manifest list
    ///
    /// Entries are scanned in order and the first exact `(os, arch)` match
    /// wins. A miss is reported with the platforms that are available.
    pub fn select_platform(&self, platform: &Platform) -> Result<&Descriptor, PullError> {
        let entries = self.manifests.as_deref().unwrap_or(&[]);
        entries
            .iter()
            .find(|entry| match &entry.platform {
                Some(p) => platform.matches(&p.os, &p.architecture),
                None => false,
            })
            .ok_or_else(|| PullError::UnsupportedPlatform {
                wanted: platform.to_string(),
                available: entries
                    .iter()
                    .filter_map(|entry| entry.platform.as_ref())
                    .map(|p| format!("{}/{}", p.os, p.architecture))
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    /// The image layers, lowest first
    pub fn layers(&self) -> &[Layer] {
        self.layers.as_deref().unwrap_or(&[])
    }
}

impl Link {
    /// Parsed form of this blob's digest
    pub fn content_digest(&self) -> Result<ContentDigest, PullError> {
        ContentDigest::parse(&self.digest)
    }
}
