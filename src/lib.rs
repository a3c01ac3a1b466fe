//! Pull a container image's layers from a registry, assemble them into a
//! root filesystem, and run one command inside it with its own process-ID
//! namespace.
//!
//! The pieces are usable separately: [RegistryClient] talks to the
//! registry, [Puller] drives it to fill a [SandboxRoot], and [Sandbox]
//! enters the result.

#[cfg(not(target_os = "linux"))]
compile_error!("layerjail only works on linux");

#[macro_use] extern crate lazy_static;
#[macro_use] extern crate serde;

pub mod errors;
pub mod filesystem;
pub mod image;
pub mod manifest;
pub mod platform;
pub mod pull;
pub mod registry;
pub mod sandbox;

pub use crate::{
    filesystem::SandboxRoot,
    image::ImageReference,
    platform::Platform,
    pull::{PullReport, Puller},
    registry::RegistryClient,
    sandbox::Sandbox,
};
