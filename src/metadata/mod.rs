pub mod server;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::state::VmDescriptor;

pub use server::LocalMetadataService;

/// Result of registering an instance with the metadata service.
#[derive(Debug)]
pub struct Registration {
    /// Base URL handed to the guest on its kernel command line
    pub endpoint: String,
    /// Resolves with the guest's public IP once it checks in
    pub public_ip: oneshot::Receiver<String>,
    /// Cancel to stop serving this instance
    pub shutdown: CancellationToken,
}

#[async_trait]
pub trait MetadataService: Send + Sync {
    async fn register(&self, vm: &VmDescriptor) -> Result<Registration>;
}
