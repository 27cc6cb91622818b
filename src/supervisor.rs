//! Completion supervision for one boot attempt.
//!
//! Watchers run in a task group and report over a single event channel; the
//! descriptor is only touched here, by the supervising task, in response to
//! those events.
//!
//! ```text
//! ip watcher      public IP or 30s timeout ──┐
//! exit watcher    hypervisor wait() ─────────┼─► events ─► supervise() ─► descriptor + store
//!                                            │
//! task group drained ────────────────────────┘  (detached completion)
//! ```
//!
//! Detached boots finish once the group drains, which only needs the IP.
//! Attached boots finish as soon as IP and PID are both known; the exit
//! watcher is handed back as a [`Console`] so the caller can keep the
//! foreground until the VM exits.

use std::process::ExitStatus;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::EngineProcess;
use crate::state::{ConfigStore, VmDescriptor, VmStatus};

/// How long the guest has to report its IP
pub const IP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
enum Event {
    PublicIp(String),
    Exited(ExitStatus),
    Failed(anyhow::Error),
}

/// Foreground hypervisor still running after an attached boot.
#[derive(Debug)]
pub struct Console {
    events: mpsc::UnboundedReceiver<Event>,
    _watchers: JoinSet<()>,
}

impl Console {
    /// Wait for the hypervisor to exit.
    pub async fn wait(mut self) -> Result<ExitStatus> {
        while let Some(event) = self.events.recv().await {
            match event {
                Event::Exited(status) => return Ok(status),
                Event::Failed(e) => return Err(e),
                Event::PublicIp(_) => {}
            }
        }
        bail!("hypervisor watcher ended without an exit status")
    }
}

/// Supervise a started hypervisor until the boot attempt completes.
///
/// On success the descriptor carries PID and public IP and has been
/// persisted. On failure the hypervisor is killed before returning; recording
/// the terminal status is left to the caller.
pub async fn supervise(
    store: &ConfigStore,
    vm: &mut VmDescriptor,
    process: EngineProcess,
    public_ip: oneshot::Receiver<String>,
) -> Result<Option<Console>> {
    let detached = vm.detached;
    let pid = process.pid();
    let cancel = CancellationToken::new();
    let (tx, mut events) = mpsc::unbounded_channel();

    let mut watchers = JoinSet::new();
    watchers.spawn(ip_watcher(public_ip, tx.clone(), cancel.clone()));

    // detached: the exit watcher runs outside the group so completion does not
    // wait for the VM to exit
    let mut background: Option<JoinHandle<()>> = None;
    if detached {
        background = Some(tokio::spawn(exit_watcher(process, tx.clone(), cancel.clone())));
    } else {
        watchers.spawn(exit_watcher(process, tx.clone(), cancel.clone()));
    }
    drop(tx);

    info!(target: "supervisor", name = %vm.name, pid, detached, "waiting for the VM to report its IP");

    let mut ip_known = false;
    let outcome: Result<()> = loop {
        tokio::select! {
            biased;

            Some(event) = events.recv() => match event {
                Event::PublicIp(ip) => {
                    vm.pid = Some(pid);
                    vm.public_ip = Some(ip);
                    vm.status = VmStatus::Running;
                    if let Err(e) = store.save(vm).await {
                        break Err(e.context("persisting descriptor with PID and IP"));
                    }
                    ip_known = true;
                    if !detached {
                        // attached: PID is known from the spawn, IP just arrived
                        break Ok(());
                    }
                }
                Event::Exited(status) => {
                    break Err(anyhow!("VM exited ({}) before reporting its IP", status));
                }
                Event::Failed(e) => break Err(e),
            },

            joined = watchers.join_next(), if !watchers.is_empty() => {
                if let Some(Err(e)) = joined {
                    break Err(anyhow!(e).context("supervisor watcher failed"));
                }
                if watchers.is_empty() && ip_known {
                    debug!(target: "supervisor", "all watchers finished");
                    break Ok(());
                }
            }

            else => break Err(anyhow!("supervisor lost track of its watchers")),
        }
    };

    match outcome {
        Ok(()) if detached => {
            // the VM outlives us; drop the waiter without touching the child
            if let Some(handle) = background {
                handle.abort();
            }
            Ok(None)
        }
        Ok(()) => Ok(Some(Console {
            events,
            _watchers: watchers,
        })),
        Err(e) => {
            warn!(target: "supervisor", name = %vm.name, error = %format!("{:#}", e), "boot failed, stopping VM");
            cancel.cancel();
            while watchers.join_next().await.is_some() {}
            if let Some(handle) = background {
                let _ = handle.await;
            }
            Err(e)
        }
    }
}

async fn ip_watcher(
    public_ip: oneshot::Receiver<String>,
    events: mpsc::UnboundedSender<Event>,
    cancel: CancellationToken,
) {
    let event = tokio::select! {
        ip = public_ip => match ip {
            Ok(ip) => Event::PublicIp(ip),
            Err(_) => Event::Failed(anyhow!("metadata service closed before the VM reported its IP")),
        },
        _ = tokio::time::sleep(IP_TIMEOUT) => Event::Failed(anyhow!(
            "unable to grab VM's PID and IP after {}s, aborting",
            IP_TIMEOUT.as_secs()
        )),
        _ = cancel.cancelled() => return,
    };
    let _ = events.send(event);
}

async fn exit_watcher(
    mut process: EngineProcess,
    events: mpsc::UnboundedSender<Event>,
    cancel: CancellationToken,
) {
    tokio::select! {
        status = process.wait() => {
            let event = match status {
                Ok(status) => Event::Exited(status),
                Err(e) => Event::Failed(e.context("VM exited with error")),
            };
            let _ = events.send(event);
        }
        _ = cancel.cancelled() => {
            if let Err(e) = process.kill().await {
                warn!(target: "supervisor", pid = process.pid(), error = %e, "failed to kill VM process");
            }
        }
    }
}

/// Exit status as a process result.
pub fn check_exit(status: ExitStatus) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(anyhow!("VM exited with {}", status)).context("hypervisor failed")
    }
}
