//! Enumeration of running instances.
//!
//! There is no live index: the registry is derived on every call by listing
//! the descriptors in the run directory and keeping the ones whose owning
//! process is still around. Checks built on top of it are check-then-act
//! across processes, so two boots racing for the same resource can both pass
//! validation before either persists its claim.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::state::{ConfigStore, VmDescriptor, VmStatus};
use crate::utils::is_process_alive;

#[async_trait]
pub trait ResourceRegistry: Send + Sync {
    /// Descriptors of every instance currently holding its resources
    async fn running(&self) -> Result<Vec<VmDescriptor>>;
}

/// Registry backed by the on-disk config store.
pub struct StoreRegistry {
    store: Arc<ConfigStore>,
}

impl StoreRegistry {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ResourceRegistry for StoreRegistry {
    async fn running(&self) -> Result<Vec<VmDescriptor>> {
        let vms = self.store.list().await?;
        Ok(vms.into_iter().filter(holds_resources).collect())
    }
}

/// Whether a stored descriptor still claims its identity and devices.
///
/// Once the guest has reported its IP the recorded `pid` decides. Before
/// that, the instance holds its resources while either the spawned
/// hypervisor or the supervising corevm process is alive; a detached
/// hypervisor outlives an interrupted supervisor.
pub fn holds_resources(vm: &VmDescriptor) -> bool {
    if vm.status == VmStatus::Failed {
        return false;
    }
    if let Some(pid) = vm.pid {
        return is_process_alive(pid);
    }
    [vm.hypervisor_pid, vm.supervisor_pid]
        .into_iter()
        .flatten()
        .any(is_process_alive)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> VmDescriptor {
        VmDescriptor::new("u".into(), "n".into(), "m".into())
    }

    #[test]
    fn test_live_child_holds_resources() {
        let mut vm = descriptor();
        vm.status = VmStatus::Running;
        vm.pid = Some(std::process::id());
        assert!(holds_resources(&vm));
    }

    #[test]
    fn test_dead_child_releases_resources() {
        let mut vm = descriptor();
        vm.status = VmStatus::Running;
        vm.pid = Some(u32::MAX);
        vm.supervisor_pid = Some(std::process::id());
        assert!(!holds_resources(&vm));
    }

    #[test]
    fn test_starting_instance_follows_supervisor() {
        let mut vm = descriptor();
        vm.supervisor_pid = Some(std::process::id());
        assert!(holds_resources(&vm));

        vm.supervisor_pid = Some(u32::MAX);
        assert!(!holds_resources(&vm));
    }

    #[test]
    fn test_orphaned_hypervisor_keeps_resources() {
        let mut vm = descriptor();
        vm.supervisor_pid = Some(u32::MAX);
        vm.hypervisor_pid = Some(std::process::id());
        assert!(holds_resources(&vm));

        vm.hypervisor_pid = Some(u32::MAX);
        assert!(!holds_resources(&vm));
    }

    #[test]
    fn test_failed_instance_releases_resources() {
        let mut vm = descriptor();
        vm.supervisor_pid = Some(std::process::id());
        vm.status = VmStatus::Failed;
        assert!(!holds_resources(&vm));
    }
}
