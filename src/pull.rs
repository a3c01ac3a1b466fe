//! The pull pipeline: token, manifest, then every layer in order

use crate::{
    errors::PullError,
    filesystem::{
        layer::{Ingested, LayerAssembler},
        SandboxRoot,
    },
    image::ImageReference,
    platform::Platform,
    registry::RegistryClient,
};

/// Summary of an assembled root filesystem
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct PullReport {
    /// Layers unpacked into the root
    pub extracted: usize,
    /// Layers that could not be downloaded
    pub skipped: usize,
    /// Archive entries written, across all layers
    pub entries: usize,
}

/// Pulls images into sandbox roots for one platform
pub struct Puller {
    client: RegistryClient,
    platform: Platform,
}

impl Puller {
    /// Pull with `client`, selecting `platform` from manifest lists
    pub fn new(client: RegistryClient, platform: Platform) -> Self {
        Puller { client, platform }
    }

    /// Platform this puller selects
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Assemble the root filesystem for `image` in `root`
    ///
    /// A missing token or manifest stops the pull. Layers that fail to
    /// download are skipped, so the result may be incomplete; see
    /// [PullReport::skipped].
    pub async fn pull(
        &mut self,
        image: &ImageReference,
        root: &SandboxRoot,
    ) -> Result<PullReport, PullError> {
        log::info!("pulling {} for {}", image, self.platform);

        let token = self
            .client
            .get_token(image)
            .await
            .into_result(|| PullError::NoToken(image.to_string()))?;

        let layers = self
            .client
            .get_layers(image, &token, &self.platform)
            .await
            .into_result(|| PullError::NoManifest(image.to_string()))?;

        let assembler = LayerAssembler::new(root.clone());
        let mut report = PullReport::default();
        for (index, layer) in layers.iter().enumerate() {
            log::debug!("layer {}/{}: {}", index + 1, layers.len(), layer.digest);
            match assembler
                .ingest(&mut self.client, image, layer, &token)
                .await?
            {
                Ingested::Extracted { entries } => {
                    report.extracted += 1;
                    report.entries += entries;
                }
                Ingested::Skipped(_) => report.skipped += 1,
            }
        }

        if report.skipped > 0 {
            log::warn!(
                "{} of {} layers of {} were skipped, the root filesystem is incomplete",
                report.skipped,
                layers.len(),
                image
            );
        }
        log::info!(
            "{} assembled in {:?}: {} layers, {} entries",
            image,
            root.path(),
            report.extracted,
            report.entries
        );
        Ok(report)
    }
}
