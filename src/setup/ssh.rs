use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::state::SshKeyPair;

/// Produces the internal keypair corevm uses to reach the guest.
#[async_trait]
pub trait KeyGenerator: Send + Sync {
    async fn generate(&self) -> Result<SshKeyPair>;
}

/// Generates ed25519 keys with the host's `ssh-keygen`.
pub struct SshKeygen {
    comment: String,
}

impl SshKeygen {
    pub fn new(comment: impl Into<String>) -> Self {
        Self {
            comment: comment.into(),
        }
    }
}

#[async_trait]
impl KeyGenerator for SshKeygen {
    async fn generate(&self) -> Result<SshKeyPair> {
        let dir = tempfile::tempdir().context("creating key directory")?;
        let key_path = dir.path().join("id_ed25519");

        let output = Command::new("ssh-keygen")
            .args(["-q", "-t", "ed25519", "-N", "", "-C", &self.comment, "-f"])
            .arg(&key_path)
            .output()
            .await
            .context("running ssh-keygen")?;
        if !output.status.success() {
            bail!(
                "ssh-keygen failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let private_key = tokio::fs::read_to_string(&key_path)
            .await
            .context("reading generated private key")?;
        let authorized_key = tokio::fs::read_to_string(key_path.with_extension("pub"))
            .await
            .context("reading generated public key")?
            .trim()
            .to_string();

        debug!(target: "setup", "internal SSH keypair generated");
        Ok(SshKeyPair {
            private_key,
            authorized_key,
        })
    }
}
