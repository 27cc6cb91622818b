use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

const BEGIN_MARKER: &str = "# BEGIN - corevm";
const END_MARKER: &str = "# END - corevm";

/// Makes the host's home directories reachable from guests.
#[async_trait]
pub trait HostShare: Send + Sync {
    async fn export(&self) -> Result<()>;
}

/// Sharing disabled
pub struct NoShare;

#[async_trait]
impl HostShare for NoShare {
    async fn export(&self) -> Result<()> {
        debug!(target: "setup", "host share disabled");
        Ok(())
    }
}

/// Keeps a corevm block in the NFS exports file and reloads the daemon.
pub struct NfsExports {
    exports_file: PathBuf,
    line: String,
    reload: Vec<String>,
}

impl NfsExports {
    /// Export `/Users` to the hypervisor's NAT network, mapped to `uid:gid`.
    pub fn new(exports_file: PathBuf, uid: u32, gid: u32) -> Self {
        Self {
            exports_file,
            line: format!(
                "/Users -network 192.168.64.0 -mask 255.255.255.0 -alldirs -mapall={}:{}",
                uid, gid
            ),
            reload: vec!["nfsd".to_string(), "update".to_string()],
        }
    }

    /// Replace the daemon reload command (first element is the program).
    pub fn with_reload(mut self, reload: Vec<String>) -> Self {
        self.reload = reload;
        self
    }

    async fn reload_daemon(&self) -> Result<()> {
        let Some((program, args)) = self.reload.split_first() else {
            return Ok(());
        };
        let status = Command::new(program)
            .args(args)
            .status()
            .await
            .with_context(|| format!("running {}", program))?;
        if !status.success() {
            bail!("{} exited with {}", self.reload.join(" "), status);
        }
        Ok(())
    }
}

#[async_trait]
impl HostShare for NfsExports {
    async fn export(&self) -> Result<()> {
        let current = match tokio::fs::read_to_string(&self.exports_file).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e).context("reading NFS exports"),
        };

        let updated = with_block(&current, &self.line);
        if updated != current {
            tokio::fs::write(&self.exports_file, &updated)
                .await
                .with_context(|| format!("writing {}", self.exports_file.display()))?;
            info!(target: "setup", file = %self.exports_file.display(), "NFS export registered");
        }

        self.reload_daemon().await
    }
}

/// `exports` with the corevm block set to `line`, other entries untouched.
fn with_block(exports: &str, line: &str) -> String {
    let mut out = Vec::new();
    let mut inside = false;
    for l in exports.lines() {
        match l.trim() {
            BEGIN_MARKER => inside = true,
            END_MARKER => inside = false,
            _ if !inside => out.push(l),
            _ => {}
        }
    }
    out.push(BEGIN_MARKER);
    out.push(line);
    out.push(END_MARKER);

    let mut joined = out.join("\n");
    joined.push('\n');
    joined
}
