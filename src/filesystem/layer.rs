use crate::{
    errors::PullError,
    filesystem::{tar, SandboxRoot},
    image::{ContentDigest, ImageReference},
    manifest::{media_types, Layer},
    registry::{Outcome, RegistryClient, Token},
};
use bytes::Bytes;
use flate2::read::MultiGzDecoder;
use std::{
    fs::File,
    io,
    io::{BufRead, BufReader},
    path::Path,
};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// What happened to one layer
#[derive(Debug)]
pub enum Ingested {
    /// The layer was unpacked into the root
    Extracted { entries: usize },
    /// Nothing was downloaded, with the reason if there was one
    Skipped(Option<PullError>),
}

/// Downloads layers and unpacks them, in order, into a [SandboxRoot]
pub struct LayerAssembler {
    root: SandboxRoot,
}

impl LayerAssembler {
    /// Assemble layers into `root`, in the order they are ingested
    pub fn new(root: SandboxRoot) -> Self {
        LayerAssembler { root }
    }

    pub fn root(&self) -> &SandboxRoot {
        &self.root
    }

    /// Fetch one layer blob and apply it on top of what's already there
    ///
    /// A blob that can't be downloaded is skipped rather than failing the
    /// pull. Errors writing or unpacking a downloaded blob are returned.
    pub async fn ingest(
        &self,
        client: &mut RegistryClient,
        image: &ImageReference,
        layer: &Layer,
        token: &Token,
    ) -> Result<Ingested, PullError> {
        let digest = layer.content_digest()?;
        if layer.media_type.ends_with("+zstd") {
            let err = PullError::UnsupportedLayerType(layer.media_type.clone());
            log::warn!("skipping layer {}: {}", digest, err);
            return Ok(Ingested::Skipped(Some(err)));
        }
        if !media_types::LAYERS.contains(&layer.media_type.as_str()) {
            log::warn!(
                "layer {} has unrecognized type {:?}, unpacking by content",
                digest,
                layer.media_type
            );
        }

        match client.get_blob(image, layer, token).await {
            Outcome::Data(data) => {
                let entries = self.unpack(&digest, data).await?;
                Ok(Ingested::Extracted { entries })
            }
            Outcome::Empty => {
                log::warn!("skipping layer {}, no data", digest);
                Ok(Ingested::Skipped(None))
            }
            Outcome::Failed(err) => {
                log::warn!("skipping layer {}: {}", digest, err);
                Ok(Ingested::Skipped(Some(err)))
            }
        }
    }

    /// Stage a downloaded blob inside the root, extract it, then remove the
    /// staged archive whether or not extraction worked
    pub async fn unpack(&self, digest: &ContentDigest, data: Bytes) -> Result<usize, PullError> {
        let archive = self.root.archive_path(digest);
        tokio::fs::write(&archive, &data).await?;

        let root = self.root.path().to_owned();
        let staged = archive.clone();
        let result = tokio::task::spawn_blocking(move || extract_file(&root, &staged))
            .await
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;

        match tokio::fs::remove_file(&archive).await {
            Err(err) if err.kind() != io::ErrorKind::NotFound => {
                log::warn!("failed to remove {:?}: {}", archive, err)
            }
            _ => {}
        }

        let entries = result?;
        log::info!(
            "extracted {} ({} bytes) into {} entries",
            digest,
            data.len(),
            entries
        );
        Ok(entries)
    }
}

fn extract_file(root: &Path, archive: &Path) -> Result<usize, PullError> {
    let mut reader = BufReader::new(File::open(archive)?);
    let gzipped = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
    if gzipped {
        tar::extract(root, MultiGzDecoder::new(reader))
    } else {
        log::debug!("{:?} is not gzip compressed, reading as plain tar", archive);
        tar::extract(root, reader)
    }
}
