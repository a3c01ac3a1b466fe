//! Support for downloading container images from a registry server

mod auth;
mod builder;
mod client;
mod default;
mod outcome;
mod retry;

pub use auth::{pull_scope, Token};
pub use builder::RegistryClientBuilder;
pub use client::RegistryClient;
pub use default::DefaultRegistry;
pub use outcome::Outcome;
pub use retry::{AttemptError, Backoff, Retry, RETRYABLE_STATUS};
