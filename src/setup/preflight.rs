use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use nix::unistd::{geteuid, Uid};
use tracing::debug;

/// Checks that must pass before `run` touches anything on disk.
pub fn allowed_to_run(hypervisor: &Path) -> Result<()> {
    check_privileges(geteuid())?;
    let found = check_hypervisor(hypervisor)?;
    debug!(target: "preflight", hypervisor = %found.display(), "preflight passed");
    Ok(())
}

/// The hypervisor's networking and the NFS export both need root.
pub fn check_privileges(euid: Uid) -> Result<()> {
    if !euid.is_root() {
        bail!("not enough privileges to start or run VMs, please run as root (or with sudo)");
    }
    Ok(())
}

/// Resolve the hypervisor binary, by path or on `PATH`.
pub fn check_hypervisor(hypervisor: &Path) -> Result<PathBuf> {
    which::which(hypervisor)
        .with_context(|| format!("hypervisor '{}' not found", hypervisor.display()))
}
