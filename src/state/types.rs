use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: u32 = 1;

/// Persisted record of one VM instance: configuration plus runtime status.
///
/// The orchestrator owns the descriptor for the whole boot attempt. Watcher
/// tasks never touch it directly; they report back over channels and the
/// orchestrator applies the change and re-persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmDescriptor {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub uuid: String,
    pub name: String,
    pub mac_address: String,
    pub memory_mib: u32,
    pub cpus: u32,
    pub channel: String,
    pub version: String,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub ethernet: Vec<NetworkInterface>,
    #[serde(default)]
    pub cloud_config: Option<CloudConfig>,
    /// User supplied public key, forwarded on the kernel command line
    #[serde(default)]
    pub ssh_key: Option<String>,
    #[serde(default)]
    pub internal_ssh: Option<SshKeyPair>,
    /// Hidden passthrough arguments for the hypervisor
    #[serde(default)]
    pub extra_args: Vec<String>,
    pub detached: bool,
    #[serde(default)]
    pub prefer_local_images: bool,
    pub status: VmStatus,
    #[serde(default)]
    pub error: Option<String>,
    /// Hypervisor child PID, known once the guest reported its IP
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub public_ip: Option<String>,
    /// Hypervisor child PID, recorded as soon as it is spawned
    #[serde(default)]
    pub hypervisor_pid: Option<u32>,
    /// PID of the corevm process that claimed this instance
    #[serde(default)]
    pub supervisor_pid: Option<u32>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VmStatus {
    Starting,
    Running,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Storage {
    /// Slot of the hard drive the guest mounts as `/`
    #[serde(default)]
    pub root: Option<usize>,
    #[serde(default)]
    pub hard_drives: Vec<StorageDevice>,
    #[serde(default)]
    pub cdrom: Option<StorageDevice>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageDevice {
    pub kind: StorageKind,
    pub slot: usize,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Hdd,
    Cdrom,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkInterface {
    pub kind: InterfaceKind,
    /// Tap device name (e.g. `tap1`); empty for raw interfaces
    #[serde(default)]
    pub device: String,
}

impl NetworkInterface {
    pub fn raw() -> Self {
        Self {
            kind: InterfaceKind::Raw,
            device: String::new(),
        }
    }

    pub fn tap(device: impl Into<String>) -> Self {
        Self {
            kind: InterfaceKind::Tap,
            device: device.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    Raw,
    Tap,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CloudConfig {
    /// URL for remote configs, absolute path for local ones
    pub locator: String,
    pub location: CloudConfigLocation,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CloudConfigLocation {
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SshKeyPair {
    pub private_key: String,
    pub authorized_key: String,
}

impl VmDescriptor {
    /// Empty descriptor, filled in by identity resolution and validation.
    pub fn new(uuid: String, name: String, mac_address: String) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            uuid,
            name,
            mac_address,
            memory_mib: 0,
            cpus: 1,
            channel: String::new(),
            version: String::new(),
            storage: Storage::default(),
            ethernet: Vec::new(),
            cloud_config: None,
            ssh_key: None,
            internal_ssh: None,
            extra_args: Vec::new(),
            detached: false,
            prefer_local_images: false,
            status: VmStatus::Starting,
            error: None,
            pid: None,
            public_ip: None,
            hypervisor_pid: None,
            supervisor_pid: None,
            created_at: None,
        }
    }

    /// Tap devices attached to this instance.
    pub fn tap_devices(&self) -> impl Iterator<Item = &str> {
        self.ethernet
            .iter()
            .filter(|iface| iface.kind == InterfaceKind::Tap)
            .map(|iface| iface.device.as_str())
    }

    /// Record the terminal outcome of a boot attempt.
    pub fn mark_failed(&mut self, error: &anyhow::Error) {
        self.status = VmStatus::Failed;
        self.error = Some(format!("{:#}", error));
    }
}
