//! Configuration for [RegistryClient] instances

use crate::{
    errors::PullError,
    registry::{Backoff, DefaultRegistry, RegistryClient, Retry},
};
use rand::{rngs::StdRng, RngCore, SeedableRng};
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Certificate, Client, ClientBuilder,
};
use std::{convert::TryInto, time::Duration};

/// Builder for configuring custom [RegistryClient] instances
pub struct RegistryClientBuilder {
    network: ClientBuilder,
    default_registry: Option<DefaultRegistry>,
    backoff: Backoff,
    rng: Option<Box<dyn RngCore + Send>>,
}

impl RegistryClientBuilder {
    /// Start constructing a custom registry client
    pub fn new() -> Self {
        RegistryClientBuilder {
            network: Client::builder().user_agent(RegistryClient::default_user_agent()),
            default_registry: None,
            backoff: Backoff::default(),
            rng: None,
        }
    }

    /// Set a timeout for each network request
    ///
    /// This timeout applies from the beginning of a (GET) request until the
    /// last byte has been received. By default there is no timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.network = self.network.timeout(timeout);
        self
    }

    /// Set a timeout for only the initial connect phase of each network request
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.network = self.network.connect_timeout(timeout);
        self
    }

    /// Sets the `User-Agent` header used by this client
    ///
    /// By default, the value returned by
    /// [RegistryClient::default_user_agent()] is used.
    pub fn user_agent<V>(mut self, value: V) -> Self
    where
        V: TryInto<HeaderValue>,
        V::Error: Into<http::Error>,
    {
        self.network = self.network.user_agent(value);
        self
    }

    /// Set the default headers for every HTTP request
    pub fn default_request_headers(mut self, headers: HeaderMap) -> Self {
        self.network = self.network.default_headers(headers);
        self
    }

    /// Trust an additional root certificate
    pub fn add_root_certificate(mut self, certificate: Certificate) -> Self {
        self.network = self.network.add_root_certificate(certificate);
        self
    }

    /// Change the registry server and token endpoint
    ///
    /// The default value if unset can be determined with
    /// [RegistryClient::default_registry()]
    pub fn registry(mut self, default_registry: &DefaultRegistry) -> Self {
        self.default_registry = Some(default_registry.clone());
        self
    }

    /// Change how failed requests are retried
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Use a specific random source for retry jitter
    pub fn jitter_rng<R: RngCore + Send + 'static>(mut self, rng: R) -> Self {
        self.rng = Some(Box::new(rng));
        self
    }

    /// Construct a RegistryClient using the parameters from this Builder
    pub fn build(self) -> Result<RegistryClient, PullError> {
        let default_registry = self
            .default_registry
            .unwrap_or_else(RegistryClient::default_registry);
        log::debug!(
            "using registry {} with tokens from {}",
            default_registry.network_name,
            default_registry.auth_realm
        );
        let rng = match self.rng {
            Some(rng) => rng,
            None => Box::new(StdRng::from_entropy()),
        };
        Ok(RegistryClient::from_parts(
            self.network.build()?,
            default_registry,
            Retry::with_rng(self.backoff, rng),
        ))
    }
}

impl Default for RegistryClientBuilder {
    fn default() -> Self {
        RegistryClientBuilder::new()
    }
}
