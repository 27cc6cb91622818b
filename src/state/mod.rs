pub mod manager;
pub mod types;
pub mod utils;

// Re-export all state types and functions for convenience
pub use manager::ConfigStore;
pub use types::{
    CloudConfig, CloudConfigLocation, InterfaceKind, NetworkInterface, SshKeyPair, Storage,
    StorageDevice, StorageKind, VmDescriptor, VmStatus,
};
pub use utils::{generate_uuid, is_valid_uuid, HashedMac, MacDeriver};
