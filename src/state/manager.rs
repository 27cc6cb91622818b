use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use super::types::VmDescriptor;

/// File name of the per-instance record inside its directory
pub const CONFIG_FILE: &str = "config";

/// Persists instance descriptors under `<run_dir>/<uuid>/config`.
pub struct ConfigStore {
    run_dir: PathBuf,
    owner: Option<(u32, u32)>,
}

impl ConfigStore {
    pub fn new(run_dir: PathBuf) -> Self {
        Self {
            run_dir,
            owner: invoking_user(),
        }
    }

    /// Override the uid/gid written files are handed back to.
    pub fn with_owner(mut self, owner: Option<(u32, u32)>) -> Self {
        self.owner = owner;
        self
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn instance_dir(&self, uuid: &str) -> PathBuf {
        self.run_dir.join(uuid)
    }

    /// Initialize the run directory
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.run_dir)
            .await
            .context("creating run directory")?;
        Ok(())
    }

    /// Start from an empty instance directory, dropping leftovers of a
    /// previous instance with the same UUID.
    pub async fn prepare_instance_dir(&self, uuid: &str) -> Result<PathBuf> {
        let dir = self.instance_dir(uuid);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => debug!(target: "store", dir = %dir.display(), "removed stale instance directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).context("removing stale instance directory"),
        }
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating instance directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Save a descriptor
    ///
    /// The record is written to a temporary file and renamed into place so a
    /// concurrent `list` never parses a half-written file.
    pub async fn save(&self, vm: &VmDescriptor) -> Result<()> {
        let dir = self.instance_dir(&vm.uuid);
        fs::create_dir_all(&dir)
            .await
            .context("creating instance directory")?;

        let json = to_indented_json(vm).context("serializing descriptor")?;
        debug!(target: "store", uuid = %vm.uuid, "{}", String::from_utf8_lossy(&json));

        let tmp = dir.join(format!("{}.tmp", CONFIG_FILE));
        let file = dir.join(CONFIG_FILE);
        fs::write(&tmp, &json)
            .await
            .context("writing descriptor")?;
        fs::rename(&tmp, &file)
            .await
            .context("moving descriptor into place")?;

        self.normalize_permissions(&dir).await
    }

    /// Load a descriptor by UUID
    pub async fn load(&self, uuid: &str) -> Result<VmDescriptor> {
        let file = self.instance_dir(uuid).join(CONFIG_FILE);
        let json = fs::read_to_string(&file)
            .await
            .with_context(|| format!("reading descriptor {}", file.display()))?;
        let vm: VmDescriptor = serde_json::from_str(&json).context("parsing descriptor")?;
        Ok(vm)
    }

    /// List every stored descriptor, skipping unreadable records
    pub async fn list(&self) -> Result<Vec<VmDescriptor>> {
        let mut vms = Vec::new();

        if !self.run_dir.exists() {
            return Ok(vms);
        }

        let mut entries = fs::read_dir(&self.run_dir)
            .await
            .context("reading run directory")?;

        while let Some(entry) = entries.next_entry().await? {
            let file = entry.path().join(CONFIG_FILE);
            let Ok(json) = fs::read_to_string(&file).await else {
                continue;
            };
            match serde_json::from_str::<VmDescriptor>(&json) {
                Ok(vm) => vms.push(vm),
                Err(e) => {
                    warn!(target: "store", file = %file.display(), error = %e, "skipping unreadable descriptor")
                }
            }
        }

        Ok(vms)
    }

    /// Hand the instance directory back to the user who invoked us via sudo.
    async fn normalize_permissions(&self, dir: &Path) -> Result<()> {
        let Some((uid, gid)) = self.owner else {
            return Ok(());
        };

        let mut targets = vec![dir.to_path_buf()];
        let mut entries = fs::read_dir(dir).await.context("reading instance directory")?;
        while let Some(entry) = entries.next_entry().await? {
            targets.push(entry.path());
        }

        for target in targets {
            nix::unistd::chown(
                &target,
                Some(nix::unistd::Uid::from_raw(uid)),
                Some(nix::unistd::Gid::from_raw(gid)),
            )
            .with_context(|| format!("changing owner of {}", target.display()))?;
        }
        Ok(())
    }
}

/// uid/gid of the user behind `sudo`, if any
pub fn invoking_user() -> Option<(u32, u32)> {
    let uid = std::env::var("SUDO_UID").ok()?.parse().ok()?;
    let gid = std::env::var("SUDO_GID").ok()?.parse().ok()?;
    Some((uid, gid))
}

fn to_indented_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}
