//! Hypervisor engine capability.
//!
//! The orchestrator only ever asks an [`Engine`] to start a payload and gets
//! back a process handle; how the hypervisor is reached is up to the
//! implementation. [`ReexecEngine`] re-invokes corevm through its hidden
//! `engine` entry point, which decodes the payload and execs the hypervisor.

pub mod reexec;

use std::path::PathBuf;
use std::process::ExitStatus;

use anyhow::{anyhow, Context, Result};
use tokio::process::Child;
use tracing::info;

use crate::payload::BootPayload;

pub use reexec::{decode_tokens, encode_tokens, hypervisor_argv, ReexecEngine};

/// How the child's standard streams are wired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdioMode {
    /// Console stays on the controlling terminal
    Attached,
    /// Own process group, console written to a log file
    Detached { console_log: PathBuf },
}

pub trait Engine: Send + Sync {
    fn start(&self, payload: &BootPayload, stdio: &StdioMode) -> Result<EngineProcess>;
}

/// A started hypervisor child.
#[derive(Debug)]
pub struct EngineProcess {
    child: Child,
    pid: u32,
}

impl EngineProcess {
    pub fn from_child(child: Child) -> Result<Self> {
        let pid = child
            .id()
            .ok_or_else(|| anyhow!("process ID not available from tokio::process::Child"))?;
        Ok(Self { child, pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        self.child
            .wait()
            .await
            .context("waiting for hypervisor process")
    }

    /// Kill the process and reap it
    pub async fn kill(&mut self) -> Result<()> {
        info!(target: "engine", pid = self.pid, "killing hypervisor process");
        self.child
            .kill()
            .await
            .context("killing hypervisor process")
    }
}

/// Apply the stdio wiring shared by every engine implementation.
pub fn configure_stdio(cmd: &mut tokio::process::Command, stdio: &StdioMode) -> Result<()> {
    match stdio {
        StdioMode::Attached => {
            cmd.stdin(std::process::Stdio::inherit())
                .stdout(std::process::Stdio::inherit())
                .stderr(std::process::Stdio::inherit());
        }
        StdioMode::Detached { console_log } => {
            let log = std::fs::File::create(console_log)
                .with_context(|| format!("creating console log {}", console_log.display()))?;
            let log_err = log.try_clone().context("duplicating console log handle")?;
            cmd.stdin(std::process::Stdio::null())
                .stdout(log)
                .stderr(log_err)
                // keep terminal signals away from the background VM
                .process_group(0);
        }
    }
    Ok(())
}
