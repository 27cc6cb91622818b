use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use super::{ValidationError, Validator};
use crate::state::{CloudConfig, CloudConfigLocation, VmDescriptor};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP reachability check used to tell remote cloud-configs from local ones.
#[async_trait]
pub trait CloudConfigProbe: Send + Sync {
    /// Status code of a GET on `url`
    async fn status(&self, url: &str) -> Result<u16>;
}

/// Probe backed by `reqwest`.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .context("building HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CloudConfigProbe for HttpProbe {
    async fn status(&self, url: &str) -> Result<u16> {
        let resp = self.client.get(url).send().await?;
        Ok(resp.status().as_u16())
    }
}

/// Remote when the locator answers 200 or 204, local when it names an
/// existing file (rewritten to an absolute path), an error otherwise.
pub async fn classify(
    probe: &dyn CloudConfigProbe,
    locator: &str,
    workdir: &Path,
) -> Result<CloudConfig> {
    match probe.status(locator).await {
        Ok(200) | Ok(204) => {
            info!(target: "validate", url = locator, "using remote cloud-config");
            return Ok(CloudConfig {
                locator: locator.to_string(),
                location: CloudConfigLocation::Remote,
            });
        }
        Ok(status) => debug!(target: "validate", url = locator, status, "cloud-config not served remotely"),
        Err(e) => debug!(target: "validate", locator, error = %e, "cloud-config is not a reachable URL"),
    }

    let joined = workdir.join(locator);
    match fs::metadata(&joined).await {
        Ok(meta) if meta.is_file() => {
            let abs = fs::canonicalize(&joined)
                .await
                .with_context(|| format!("resolving {}", locator))?;
            info!(target: "validate", path = %abs.display(), "using local cloud-config");
            Ok(CloudConfig {
                locator: abs.display().to_string(),
                location: CloudConfigLocation::Local,
            })
        }
        _ => Err(ValidationError::CloudConfigUnreachable(locator.to_string()).into()),
    }
}

impl Validator<'_> {
    /// Classify the cloud-config locator, if one was given.
    pub async fn validate_cloud_config(
        &self,
        vm: &mut VmDescriptor,
        locator: Option<&str>,
        probe: &dyn CloudConfigProbe,
    ) -> Result<()> {
        let Some(locator) = locator.filter(|l| !l.is_empty()) else {
            return Ok(());
        };
        vm.cloud_config = Some(classify(probe, locator, self.workdir).await?);
        Ok(())
    }
}
