use std::path::PathBuf;

use crate::image::{DEFAULT_CHANNEL, LATEST};
use crate::validate::{identity::RANDOM_UUID, MIN_MEMORY_MIB};

/// Everything a caller asks for when booting one instance.
///
/// Built once at the CLI boundary; nothing downstream reads flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootRequest {
    pub channel: String,
    pub version: String,
    /// UUID to use, or `"random"`
    pub uuid: String,
    pub name: Option<String>,
    pub memory_mib: u32,
    pub cpus: u32,
    pub cloud_config: Option<String>,
    pub ssh_key: Option<String>,
    pub root: Option<PathBuf>,
    pub cdrom: Option<PathBuf>,
    pub volumes: Vec<PathBuf>,
    pub tap: Option<PathBuf>,
    pub detached: bool,
    pub prefer_local_images: bool,
    pub extra_args: Vec<String>,
}

impl Default for BootRequest {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            version: LATEST.to_string(),
            uuid: RANDOM_UUID.to_string(),
            name: None,
            memory_mib: MIN_MEMORY_MIB,
            cpus: 1,
            cloud_config: None,
            ssh_key: None,
            root: None,
            cdrom: None,
            volumes: Vec::new(),
            tap: None,
            detached: false,
            prefer_local_images: false,
            extra_args: Vec::new(),
        }
    }
}
