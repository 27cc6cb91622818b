//! Channel/version resolution against the local image store.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tracing::{info, warn};

pub const CHANNELS: [&str; 3] = ["alpha", "beta", "stable"];
pub const DEFAULT_CHANNEL: &str = "alpha";
pub const LATEST: &str = "latest";

const IMAGE_PREFIX: &str = "coreos_production_pxe";

/// Kernel file name inside a `<channel>/<version>/` directory
pub fn kernel_file() -> String {
    format!("{}.vmlinuz", IMAGE_PREFIX)
}

/// Initrd file name inside a `<channel>/<version>/` directory
pub fn initrd_file() -> String {
    format!("{}_image.cpio.gz", IMAGE_PREFIX)
}

/// Kernel and initrd locations for a resolved image
pub fn boot_images(image_dir: &Path, channel: &str, version: &str) -> (PathBuf, PathBuf) {
    let dir = image_dir.join(channel).join(version);
    (dir.join(kernel_file()), dir.join(initrd_file()))
}

#[async_trait]
pub trait ImageResolver: Send + Sync {
    /// Settle the concrete `(channel, version)` to boot.
    async fn resolve(&self, channel: &str, version: &str, prefer_local: bool)
        -> Result<(String, String)>;
}

/// Resolves images already present under the image directory.
pub struct LocalImages {
    image_dir: PathBuf,
}

impl LocalImages {
    pub fn new(image_dir: PathBuf) -> Self {
        Self { image_dir }
    }

    async fn local_versions(&self, channel: &str) -> Result<Vec<String>> {
        let dir = self.image_dir.join(channel);
        let mut versions = Vec::new();
        if !dir.exists() {
            return Ok(versions);
        }

        let mut entries = fs::read_dir(&dir)
            .await
            .with_context(|| format!("reading image directory {}", dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let Some(version) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let (kernel, initrd) = boot_images(&self.image_dir, channel, &version);
            if kernel.exists() && initrd.exists() {
                versions.push(version);
            }
        }
        versions.sort_by(|a, b| compare_versions(a, b));
        Ok(versions)
    }
}

#[async_trait]
impl ImageResolver for LocalImages {
    async fn resolve(
        &self,
        channel: &str,
        version: &str,
        prefer_local: bool,
    ) -> Result<(String, String)> {
        let channel = normalize_channel(channel);
        let version = normalize_version(version);
        let local = self.local_versions(&channel).await?;

        if !prefer_local {
            info!(target: "image", channel = %channel, "remote image lookup unavailable, using local images");
        }

        let resolved = if version == LATEST {
            local.last().cloned()
        } else {
            local.iter().find(|v| **v == version).cloned()
        };

        match resolved {
            Some(v) => {
                info!(target: "image", channel = %channel, version = %v, "image resolved");
                Ok((channel, v))
            }
            None => bail!(
                "no local {} image for version '{}' under {}; pull it first",
                channel,
                version,
                self.image_dir.display()
            ),
        }
    }
}

/// Map user input onto a known channel, defaulting to alpha.
pub fn normalize_channel(channel: &str) -> String {
    let lower = channel.trim().to_lowercase();
    if CHANNELS.contains(&lower.as_str()) {
        lower
    } else {
        warn!(channel, "unknown channel, using '{}'", DEFAULT_CHANNEL);
        DEFAULT_CHANNEL.to_string()
    }
}

pub fn normalize_version(version: &str) -> String {
    let trimmed = version.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(LATEST) {
        LATEST.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Numeric, dot-separated comparison (`1010.1.0` > `983.0.0`)
fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |s: &str| -> Vec<u64> { s.split('.').map(|p| p.parse().unwrap_or(0)).collect() };
    parse(a).cmp(&parse(b)).then_with(|| a.cmp(b))
}
