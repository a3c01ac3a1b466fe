//! Error types you might see while pulling an image or starting the sandbox

use crate::image::ContentDigest;
use std::{io, path::PathBuf};
use thiserror::Error;

/// Errors while retrieving an image and assembling its root filesystem
#[derive(Error, Debug)]
pub enum PullError {
    /// invalid image reference format
    #[error("invalid image reference format: {0:?}")]
    InvalidReferenceFormat(String),

    /// invalid content digest
    #[error("invalid content digest: {0:?}")]
    InvalidContentDigest(String),

    /// storage io error
    #[error("storage io error: {0}")]
    Storage(#[from] io::Error),

    /// json error
    #[error("json error: {0}")]
    JSON(#[from] serde_json::Error),

    /// network request error
    #[error("network request error: {0}")]
    NetworkRequest(#[from] reqwest::Error),

    /// invalid registry endpoint
    #[error("invalid registry endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    /// the server answered with a status we won't retry
    #[error("server responded with {status} for {url}")]
    HttpStatus {
        status: reqwest::StatusCode,
        url: String,
    },

    /// every allowed attempt failed
    #[error("giving up on {what} after {attempts} attempts, last error: {last_error}")]
    RetriesExhausted {
        what: String,
        attempts: u32,
        last_error: String,
    },

    /// no pull token was issued
    #[error("registry did not issue a pull token for {0}")]
    NoToken(String),

    /// no usable manifest was returned
    #[error("registry returned no usable manifest for {0}")]
    NoManifest(String),

    /// the manifest list has no entry for our platform
    #[error("no manifest for platform {wanted}, available: {available}")]
    UnsupportedPlatform { wanted: String, available: String },

    /// only v2 and OCI image manifests are supported
    #[error("unsupported manifest type, {0:?}")]
    UnsupportedManifestType(String),

    /// unsupported type for image layer
    #[error("unsupported type for image layer, {0:?}")]
    UnsupportedLayerType(String),

    /// archive entry would land outside the sandbox root
    #[error("refusing to extract archive entry outside the sandbox root: {0:?}")]
    PathTraversal(PathBuf),

    /// calculated digest of downloaded content is not what we asked for
    #[error("calculated digest of downloaded content is not what we asked for, expected {expected}, found {found}")]
    ContentDigestMismatch {
        expected: ContentDigest,
        found: ContentDigest,
    },
}

/// Errors while entering the sandbox and running the command
///
/// All of these are fatal: the process has already started changing its own
/// root or namespaces and can't go back.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// chroot into the sandbox root failed
    #[error("failed to change root to {path:?}: {source}")]
    ChangeRoot { path: PathBuf, source: io::Error },

    /// unshare of the PID namespace failed
    #[error("failed to isolate the process-ID namespace: {0}")]
    Unshare(io::Error),

    /// the command could not be started
    #[error("failed to execute {command:?}: {source}")]
    Exec { command: String, source: io::Error },

    /// captured output could not be written back out
    #[error("failed to relay command output: {0}")]
    Relay(io::Error),
}

impl SandboxError {
    /// Exit status to use when the sandboxed command never ran
    ///
    /// Follows the shell convention for commands that can't be found (127) or
    /// can't be executed (126). Everything else is 0xFF.
    pub fn exit_code(&self) -> i32 {
        match self {
            SandboxError::Exec { source, .. } => match source.kind() {
                io::ErrorKind::NotFound => 127,
                io::ErrorKind::PermissionDenied => 126,
                _ => FATAL_EXIT_CODE,
            },
            _ => FATAL_EXIT_CODE,
        }
    }
}

/// Exit status for failures in setting up the sandbox or pulling the image
pub const FATAL_EXIT_CODE: i32 = 0xFF;
