//! Firmware download and decompression

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bzip2::read::MultiBzDecoder;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::FirmwareUpdateError;
use crate::updater::FirmwareUpdater;

const ARTIFACT_MODE: u32 = 0o644;

/// Where a firmware image is fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareSource {
    /// `http://` or `https://` URL
    Http(String),
    /// Local file, given as a plain path or a `file://` URL
    Local(PathBuf),
}

impl FirmwareSource {
    /// Classify an image location.
    pub fn parse(location: &str) -> Result<Self, FirmwareUpdateError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(FirmwareUpdateError::invalid("empty image location"));
        }

        let lower = location.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(FirmwareSource::Http(location.to_string()));
        }
        if let Some(path) = location.strip_prefix("file://") {
            return Ok(FirmwareSource::Local(PathBuf::from(path)));
        }
        if let Some((scheme, _)) = location.split_once("://") {
            return Err(FirmwareUpdateError::DownloadFailed(format!(
                "unsupported scheme {scheme}://"
            )));
        }
        Ok(FirmwareSource::Local(PathBuf::from(location)))
    }
}

impl std::fmt::Display for FirmwareSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FirmwareSource::Http(url) => f.write_str(url),
            FirmwareSource::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

impl FirmwareUpdater {
    /// Fetch the compressed image into the staging area.
    pub async fn download_firmware(&self, location: &str) -> Result<(), FirmwareUpdateError> {
        let config = self.require_config()?;
        let source = FirmwareSource::parse(location)?;
        let destination = config.compressed_image_path();
        info!(source = %source, destination = %destination.display(), "downloading firmware");

        let fetched = match &source {
            FirmwareSource::Http(url) => {
                fetch_http(url, &destination, config.command_timeout()).await
            }
            FirmwareSource::Local(path) => tokio::fs::copy(path, &destination)
                .await
                .map(|bytes| debug!(bytes, "copied local image"))
                .map_err(|e| format!("{}: {e}", path.display())),
        };

        if let Err(reason) = fetched {
            discard_partial(&destination).await;
            return Err(FirmwareUpdateError::DownloadFailed(reason));
        }

        set_artifact_mode(&destination).await;
        Ok(())
    }

    /// Decompress the staged image to the temporary image path.
    ///
    /// Concatenated bzip2 streams are decoded as one image.
    pub async fn decompress_image(&self) -> Result<(), FirmwareUpdateError> {
        let config = self.require_config()?;
        let source = config.compressed_image_path();
        let destination = config.temp_image_path.clone();
        info!(
            source = %source.display(),
            destination = %destination.display(),
            "decompressing image"
        );

        let target = destination.clone();
        let decoded = tokio::task::spawn_blocking(move || decompress_file(&source, &target))
            .await
            .map_err(|e| FirmwareUpdateError::DecompressFailed(e.to_string()))?;

        match decoded {
            Ok(bytes) => {
                debug!(bytes, "image decompressed");
                set_artifact_mode(&destination).await;
                Ok(())
            }
            Err(e) => {
                discard_partial(&destination).await;
                Err(FirmwareUpdateError::DecompressFailed(e.to_string()))
            }
        }
    }
}

async fn fetch_http(
    url: &str,
    destination: &Path,
    timeout: Option<Duration>,
) -> Result<(), String> {
    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("bpi-firmware-update/", env!("CARGO_PKG_VERSION")));
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    let client = builder.build().map_err(|e| e.to_string())?;

    let mut response = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| e.to_string())?;

    let mut file = tokio::fs::File::create(destination)
        .await
        .map_err(|e| format!("{}: {e}", destination.display()))?;

    let mut written: u64 = 0;
    while let Some(chunk) = response.chunk().await.map_err(|e| e.to_string())? {
        file.write_all(&chunk).await.map_err(|e| e.to_string())?;
        written = written.saturating_add(chunk.len() as u64);
    }
    file.flush().await.map_err(|e| e.to_string())?;
    file.sync_all().await.map_err(|e| e.to_string())?;

    debug!(bytes = written, "download finished");
    Ok(())
}

fn decompress_file(source: &Path, destination: &Path) -> std::io::Result<u64> {
    let input = File::open(source)?;
    let mut decoder = MultiBzDecoder::new(BufReader::new(input));
    let mut output = BufWriter::new(File::create(destination)?);
    let bytes = std::io::copy(&mut decoder, &mut output)?;
    output.flush()?;
    Ok(bytes)
}

async fn discard_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove partial file");
    }
}

#[cfg(unix)]
async fn set_artifact_mode(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let permissions = std::fs::Permissions::from_mode(ARTIFACT_MODE);
    if let Err(e) = tokio::fs::set_permissions(path, permissions).await {
        warn!(path = %path.display(), error = %e, "failed to set file mode");
    }
}

#[cfg(not(unix))]
async fn set_artifact_mode(path: &Path) {
    debug!(path = %path.display(), mode = ARTIFACT_MODE, "file modes not supported");
}
