//! Pre-spawn validation of an instance's identity and attachments.
//!
//! Every check here runs before any process is spawned and before anything
//! is persisted, so a failure needs no rollback.

pub mod cloud_config;
pub mod identity;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::registry::ResourceRegistry;
use crate::state::{NetworkInterface, StorageDevice, StorageKind, VmDescriptor};

pub use cloud_config::{CloudConfigProbe, HttpProbe};
pub use identity::{resolve_identity, Identity, MAX_MAC_ATTEMPTS, RANDOM_UUID};

pub const MIN_MEMORY_MIB: u32 = 1024;
pub const MAX_MEMORY_MIB: u32 = 8192;

/// Rejections raised while validating a boot request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("another VM is running with the same UUID ({uuid}): '{holder}'")]
    UuidInUse { uuid: String, holder: String },

    #[error("another VM is running with the same name ({name}): '{holder}'")]
    NameInUse { name: String, holder: String },

    #[error("unable to derive a MAC address after {attempts} UUIDs")]
    MacDerivation { attempts: u32 },

    #[error("--cdrom payload MUST end in '.iso' ('{}' doesn't)", .0.display())]
    NotIso(PathBuf),

    #[error("--volume payload MUST end in '.img' ('{}' doesn't)", .0.display())]
    NotImg(PathBuf),

    #[error("'{}' does not exist", .0.display())]
    Missing(PathBuf),

    #[error("{} already being used as a volume by another VM ('{holder}')", .path.display())]
    VolumeInUse { path: PathBuf, holder: String },

    #[error("attempting to set '{}' as base of multiple volumes", .0.display())]
    DuplicateVolume(PathBuf),

    #[error("'{}' not a valid tap device", .0.display())]
    InvalidTap(PathBuf),

    #[error("{device} already being used by another VM ('{holder}')")]
    TapInUse { device: String, holder: String },

    #[error("cloud-config '{0}' is neither a reachable URL nor an existing local file")]
    CloudConfigUnreachable(String),
}

/// Clamp requested memory into the supported range, warning when adjusted.
pub fn clamp_memory(requested: u32) -> u32 {
    if requested < MIN_MEMORY_MIB {
        warn!(
            requested,
            "'{}' not a reasonable memory value, using '{}', the default",
            requested,
            MIN_MEMORY_MIB
        );
        MIN_MEMORY_MIB
    } else if requested > MAX_MEMORY_MIB {
        warn!(
            requested,
            "'{}' not a reasonable memory value, presently only VMs with up to 8GB of RAM are supported, using '{}'",
            requested,
            MAX_MEMORY_MIB
        );
        MAX_MEMORY_MIB
    } else {
        requested
    }
}

/// Checks attachments against the filesystem and the running instances.
pub struct Validator<'a> {
    registry: &'a dyn ResourceRegistry,
    workdir: &'a Path,
    device_root: PathBuf,
}

impl<'a> Validator<'a> {
    /// Relative paths are resolved against `workdir`.
    pub fn new(registry: &'a dyn ResourceRegistry, workdir: &'a Path) -> Self {
        Self {
            registry,
            workdir,
            device_root: PathBuf::from("/dev"),
        }
    }

    /// Directory tap devices must live under (`/dev` unless overridden)
    pub fn with_device_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.device_root = root.into();
        self
    }

    /// Attach an ISO image as the single CD-ROM device.
    pub async fn validate_cdrom(&self, vm: &mut VmDescriptor, path: Option<&Path>) -> Result<()> {
        let Some(path) = non_empty(path) else {
            return Ok(());
        };
        if !has_extension(path, "iso") {
            return Err(ValidationError::NotIso(path.to_path_buf()).into());
        }
        let abs = self.resolve_existing(path).await?;

        info!(target: "validate", cdrom = %abs.display(), "attaching CD-ROM");
        vm.storage.cdrom = Some(StorageDevice {
            kind: StorageKind::Cdrom,
            slot: 0,
            path: abs,
        });
        Ok(())
    }

    /// Attach disk images as hard drives, in order, on consecutive slots.
    ///
    /// With `is_root` the first attached image becomes the root device.
    pub async fn validate_volumes(
        &self,
        vm: &mut VmDescriptor,
        paths: &[PathBuf],
        is_root: bool,
    ) -> Result<()> {
        for path in paths {
            if path.as_os_str().is_empty() {
                continue;
            }
            if !has_extension(path, "img") {
                return Err(ValidationError::NotImg(path.clone()).into());
            }
            let abs = self.resolve_existing(path).await?;

            let running = self.registry.running().await?;
            if let Some(holder) = running
                .iter()
                .find(|other| other.storage.hard_drives.iter().any(|d| d.path == abs))
            {
                return Err(ValidationError::VolumeInUse {
                    path: abs,
                    holder: holder.name.clone(),
                }
                .into());
            }

            if vm.storage.hard_drives.iter().any(|d| d.path == abs) {
                return Err(ValidationError::DuplicateVolume(path.clone()).into());
            }

            let slot = vm.storage.hard_drives.len();
            info!(target: "validate", volume = %abs.display(), slot, root = is_root, "attaching volume");
            vm.storage.hard_drives.push(StorageDevice {
                kind: StorageKind::Hdd,
                slot,
                path: abs,
            });
            if is_root && vm.storage.root.is_none() {
                vm.storage.root = Some(slot);
            }
        }
        Ok(())
    }

    /// Append a tap-backed network interface.
    pub async fn add_tap_interface(&self, vm: &mut VmDescriptor, path: Option<&Path>) -> Result<()> {
        let Some(path) = non_empty(path) else {
            return Ok(());
        };

        let in_device_dir = path
            .parent()
            .is_some_and(|dir| dir.starts_with(&self.device_root));
        let device = path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| n.starts_with("tap"))
            .map(str::to_string);
        let (true, Some(device)) = (in_device_dir, device) else {
            return Err(ValidationError::InvalidTap(path.to_path_buf()).into());
        };

        if fs::metadata(path).await.is_err() {
            return Err(ValidationError::Missing(path.to_path_buf()).into());
        }

        let running = self.registry.running().await?;
        if let Some(holder) = running
            .iter()
            .find(|other| other.tap_devices().any(|d| d == device))
        {
            return Err(ValidationError::TapInUse {
                device,
                holder: holder.name.clone(),
            }
            .into());
        }

        info!(target: "validate", tap = %device, "attaching tap interface");
        vm.ethernet.push(NetworkInterface::tap(device));
        Ok(())
    }

    async fn resolve_existing(&self, path: &Path) -> Result<PathBuf> {
        let joined = self.workdir.join(path);
        if fs::metadata(&joined).await.is_err() {
            return Err(ValidationError::Missing(path.to_path_buf()).into());
        }
        fs::canonicalize(&joined)
            .await
            .with_context(|| format!("resolving {}", path.display()))
    }
}

fn non_empty(path: Option<&Path>) -> Option<&Path> {
    path.filter(|p| !p.as_os_str().is_empty())
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.to_string_lossy().ends_with(&format!(".{}", ext))
}
