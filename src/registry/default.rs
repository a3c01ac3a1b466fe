//! Where the default registry lives, and how it names repositories

use crate::{
    errors::PullError,
    image::{ContentDigest, ImageReference, ImageVersion, Repository},
    registry::auth::pull_scope,
};
use url::Url;

/// Endpoints and naming quirks of the registry images are pulled from
///
/// The built-in settings describe Docker Hub. Tests and mirrors can point
/// the same protocol at other servers with [DefaultRegistry::with_endpoints].
#[derive(Clone, Debug)]
pub struct DefaultRegistry {
    /// Base URL of the registry API, without the `/v2` suffix
    pub network_name: Url,
    /// Token endpoint for anonymous pulls
    pub auth_realm: Url,
    /// `service` parameter sent to the token endpoint
    pub auth_service: String,
    /// Registry host names that may lead a repository path and are dropped
    pub also_known_as: Vec<String>,
    /// Use this prefix when accessing an image repository with only a single
    /// path component
    pub library_prefix: Option<Repository>,
}

impl Default for DefaultRegistry {
    fn default() -> Self {
        DefaultRegistry::new()
    }
}

impl DefaultRegistry {
    /// Return the built-in defaults
    pub fn new() -> Self {
        DefaultRegistry {
            network_name: Url::parse("https://registry.hub.docker.com").unwrap(),
            auth_realm: Url::parse("https://auth.docker.io/token").unwrap(),
            auth_service: "registry.docker.io".to_owned(),
            also_known_as: vec![
                "docker.io".to_owned(),
                "index.docker.io".to_owned(),
                "registry-1.docker.io".to_owned(),
                "registry.hub.docker.com".to_owned(),
            ],
            library_prefix: Some(Repository::parse("library").unwrap()),
        }
    }

    /// Same naming rules as the defaults, served from other endpoints
    pub fn with_endpoints(network_name: &str, auth_realm: &str) -> Result<Self, PullError> {
        Ok(DefaultRegistry {
            network_name: Url::parse(network_name)?,
            auth_realm: Url::parse(auth_realm)?,
            ..DefaultRegistry::new()
        })
    }

    /// Full repository path for an image on this registry
    ///
    /// A leading registry host name is dropped, and single-segment names get
    /// the library prefix: `busybox` becomes `library/busybox`.
    pub fn resolve_repository(&self, image: &ImageReference) -> Repository {
        let mut name = image.name().clone();
        for alias in &self.also_known_as {
            if let Some(stripped) = name.strip_first_segment(alias) {
                name = stripped;
                break;
            }
        }
        match &self.library_prefix {
            Some(prefix) if name.is_single_segment() => prefix.join(&name),
            _ => name,
        }
    }

    /// Token endpoint URL with the query for pulling `repository`
    pub fn token_url(&self, repository: &Repository) -> Url {
        let mut url = self.auth_realm.clone();
        url.query_pairs_mut()
            .append_pair("service", &self.auth_service)
            .append_pair("scope", &pull_scope(repository));
        url
    }

    /// `/v2/<repository>/manifests/<tag or digest>`
    pub fn manifest_url(
        &self,
        repository: &Repository,
        version: &ImageVersion,
    ) -> Result<Url, PullError> {
        self.api_url(&format!("{}/manifests/{}", repository, version))
    }

    /// `/v2/<repository>/blobs/<digest>`
    pub fn blob_url(
        &self,
        repository: &Repository,
        digest: &ContentDigest,
    ) -> Result<Url, PullError> {
        self.api_url(&format!("{}/blobs/{}", repository, digest))
    }

    fn api_url(&self, path: &str) -> Result<Url, PullError> {
        let base = self.network_name.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{}/v2/{}", base, path))?)
    }
}
