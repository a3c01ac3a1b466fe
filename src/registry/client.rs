use crate::{
    errors::PullError,
    image::{ContentDigest, ImageReference, ImageVersion, Repository},
    manifest::{media_types, Layer, Manifest},
    platform::Platform,
    registry::{
        auth::Token, AttemptError, DefaultRegistry, Outcome, RegistryClientBuilder, Retry,
    },
};
use bytes::Bytes;
use rand::RngCore;
use reqwest::{header, header::HeaderValue, RequestBuilder};

/// Registry clients fetch tokens, manifests and layer blobs
///
/// Every request goes through the client's [Retry] policy. Failures come
/// back as [Outcome::Failed] rather than errors, so the caller can decide
/// which missing pieces are fatal.
pub struct RegistryClient {
    req: reqwest::Client,
    default_registry: DefaultRegistry,
    retry: Retry<Box<dyn RngCore + Send>>,
}

impl RegistryClient {
    /// Construct a new registry client with default options
    pub fn new() -> Result<RegistryClient, PullError> {
        RegistryClient::builder().build()
    }

    /// Construct a registry client with custom options, via
    /// [RegistryClientBuilder]
    pub fn builder() -> RegistryClientBuilder {
        RegistryClientBuilder::new()
    }

    pub(crate) fn from_parts(
        req: reqwest::Client,
        default_registry: DefaultRegistry,
        retry: Retry<Box<dyn RngCore + Send>>,
    ) -> Self {
        RegistryClient {
            req,
            default_registry,
            retry,
        }
    }

    /// Return the default `User-Agent` that we use if no other is set
    pub fn default_user_agent() -> HeaderValue {
        static USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
        HeaderValue::from_static(USER_AGENT)
    }

    /// Return the default registry server
    pub fn default_registry() -> DefaultRegistry {
        DefaultRegistry::new()
    }

    /// Repository path this client will use for an image
    pub fn repository_for(&self, image: &ImageReference) -> Repository {
        self.default_registry.resolve_repository(image)
    }

    /// Ask the token endpoint for anonymous pull access to an image
    pub async fn get_token(&mut self, image: &ImageReference) -> Outcome<Token> {
        let repository = self.repository_for(image);
        let url = self.default_registry.token_url(&repository);
        log::info!("{} requesting pull token", image);
        let what = format!("token for {}", repository);
        self.fetch(&what, |req| req.get(url.clone()))
            .await
            .and_then(|body| match Token::from_response(&body) {
                Ok(Some(token)) => Outcome::Data(token),
                Ok(None) => {
                    log::warn!("token response for {} has no token", repository);
                    Outcome::Empty
                }
                Err(err) => Outcome::Failed(err),
            })
    }

    /// Find the layers of an image for a platform, lowest first
    ///
    /// When the reference resolves to a manifest list, the first entry
    /// matching `platform` is fetched in turn.
    pub async fn get_layers(
        &mut self,
        image: &ImageReference,
        token: &Token,
        platform: &Platform,
    ) -> Outcome<Vec<Layer>> {
        let repository = self.repository_for(image);
        let manifest = match self
            .get_manifest(&repository, &image.version(), token)
            .await
        {
            Outcome::Data(manifest) => manifest,
            Outcome::Empty => return Outcome::Empty,
            Outcome::Failed(err) => return Outcome::Failed(err),
        };

        let manifest = if manifest.is_list() {
            let descriptor = match manifest.select_platform(platform) {
                Ok(descriptor) => descriptor,
                Err(err) => return Outcome::Failed(err),
            };
            log::info!(
                "{} selected {} manifest {}",
                image,
                platform,
                descriptor.digest
            );
            let version = match ContentDigest::parse(&descriptor.digest) {
                Ok(digest) => ImageVersion::ContentDigest(digest),
                Err(err) => return Outcome::Failed(err),
            };
            match self.get_manifest(&repository, &version, token).await {
                Outcome::Data(manifest) if manifest.is_list() => {
                    return Outcome::Failed(PullError::UnsupportedManifestType(
                        manifest.media_type.unwrap_or_default(),
                    ))
                }
                Outcome::Data(manifest) => manifest,
                Outcome::Empty => return Outcome::Empty,
                Outcome::Failed(err) => return Outcome::Failed(err),
            }
        } else {
            manifest
        };

        match manifest.layers {
            Some(layers) => {
                log::info!("{} has {} layers", image, layers.len());
                Outcome::Data(layers)
            }
            None => {
                log::warn!("{} manifest has no layers", image);
                Outcome::Empty
            }
        }
    }

    /// Download one layer blob, checking it against its digest
    pub async fn get_blob(
        &mut self,
        image: &ImageReference,
        layer: &Layer,
        token: &Token,
    ) -> Outcome<Bytes> {
        let digest = match layer.content_digest() {
            Ok(digest) => digest,
            Err(err) => return Outcome::Failed(err),
        };
        let repository = self.repository_for(image);
        let url = match self.default_registry.blob_url(&repository, &digest) {
            Ok(url) => url,
            Err(err) => return Outcome::Failed(err),
        };
        match layer.size {
            Some(size) => log::info!("{} downloading {} ({} bytes)", image, digest, size),
            None => log::info!("{} downloading {}", image, digest),
        }
        let what = format!("blob {}", digest);
        let media_type = layer.media_type.clone();
        self.fetch(&what, |req| {
            token
                .authorize(req.get(url.clone()))
                .header(header::ACCEPT, media_type.as_str())
        })
        .await
        .and_then(|data| {
            if data.is_empty() {
                return Outcome::Empty;
            }
            match digest.verify(&data) {
                Ok(()) => {
                    log::debug!("{} downloaded, {} bytes", digest, data.len());
                    Outcome::Data(data)
                }
                Err(err) => Outcome::Failed(err),
            }
        })
    }

    async fn get_manifest(
        &mut self,
        repository: &Repository,
        version: &ImageVersion,
        token: &Token,
    ) -> Outcome<Manifest> {
        let url = match self.default_registry.manifest_url(repository, version) {
            Ok(url) => url,
            Err(err) => return Outcome::Failed(err),
        };
        log::debug!("downloading manifest <{}>", url);
        let what = format!("manifest {}:{}", repository, version);
        let accept = media_types::ACCEPT_MANIFESTS.join(", ");
        self.fetch(&what, |req| {
            token
                .authorize(req.get(url.clone()))
                .header(header::ACCEPT, accept.as_str())
        })
        .await
        .and_then(|body| {
            if body.is_empty() {
                return Outcome::Empty;
            }
            if let ImageVersion::ContentDigest(digest) = version {
                if let Err(err) = digest.verify(&body) {
                    return Outcome::Failed(err);
                }
            }
            log::trace!("raw json manifest, {}", String::from_utf8_lossy(&body));
            serde_json::from_slice::<Manifest>(&body)
                .map_err(PullError::from)
                .into()
        })
    }

    /// Send a GET built by `request` under the retry policy, returning the
    /// body of the first successful response
    async fn fetch<F>(&mut self, what: &str, request: F) -> Outcome<Bytes>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let req = &self.req;
        self.retry
            .execute(what, || send(request(req)))
            .await
    }
}

async fn send(request: RequestBuilder) -> Result<Bytes, AttemptError> {
    let response = request.send().await.map_err(AttemptError::Transport)?;
    let status = response.status();
    if status.is_success() {
        response.bytes().await.map_err(AttemptError::Transport)
    } else {
        let url = response.url().to_string();
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(AttemptError::Status {
            status,
            url,
            headers,
            body,
        })
    }
}
