//! The sandbox's root filesystem, assembled from image layers

pub mod layer;
pub mod tar;

use crate::{errors::PullError, image::ContentDigest};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Directory that receives every extracted layer for one run
///
/// The path is canonical, so containment checks during extraction compare
/// like with like.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SandboxRoot {
    path: PathBuf,
}

impl SandboxRoot {
    /// Use `path` as the sandbox root, creating it if needed
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, PullError> {
        fs::create_dir_all(path.as_ref())?;
        let path = fs::canonicalize(path.as_ref())?;
        log::debug!("sandbox root at {:?}", path);
        Ok(SandboxRoot { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where a layer's compressed archive is staged before extraction
    pub fn archive_path(&self, digest: &ContentDigest) -> PathBuf {
        self.path.join(format!("{}.tar.gz", digest.hex_str()))
    }
}
