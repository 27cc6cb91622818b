mod common;

use std::time::Duration;

use common::{spawn_shell, temp_store, TEST_IP};
use corevm::state::{VmDescriptor, VmStatus};
use corevm::supervisor::supervise;
use corevm::utils::is_process_alive;
use tempfile::TempDir;
use tokio::sync::oneshot;

const UUID: &str = "3e4f5a6b-7c8d-4e9f-a0b1-c2d3e4f5a6b7";

fn descriptor(detached: bool) -> VmDescriptor {
    let mut vm = VmDescriptor::new(UUID.into(), "core-01".into(), "02:00:00:00:00:01".into());
    vm.detached = detached;
    vm.supervisor_pid = Some(std::process::id());
    vm
}

fn reported(ip: &str) -> oneshot::Receiver<String> {
    let (tx, rx) = oneshot::channel();
    tx.send(ip.to_string()).unwrap();
    rx
}

#[tokio::test]
async fn test_detached_completes_once_ip_is_known() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(dir.path());
    let mut vm = descriptor(true);

    let process = spawn_shell("sleep 30");
    let pid = process.pid();

    let console = supervise(&store, &mut vm, process, reported(TEST_IP))
        .await
        .unwrap();
    assert!(console.is_none());
    assert_eq!(vm.status, VmStatus::Running);
    assert_eq!(vm.pid, Some(pid));
    assert_eq!(vm.public_ip.as_deref(), Some(TEST_IP));

    // the VM keeps running after supervision ends
    assert!(is_process_alive(pid));

    let stored = store.load(UUID).await.unwrap();
    assert_eq!(stored.pid, Some(pid));
    assert_eq!(stored.public_ip.as_deref(), Some(TEST_IP));

    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid as i32),
        nix::sys::signal::Signal::SIGKILL,
    )
    .unwrap();
}

#[tokio::test]
async fn test_attached_returns_console_until_exit() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(dir.path());
    let mut vm = descriptor(false);

    let process = spawn_shell("sleep 0.5; exit 3");
    let console = supervise(&store, &mut vm, process, reported(TEST_IP))
        .await
        .unwrap()
        .expect("attached boot keeps a console");
    assert_eq!(vm.status, VmStatus::Running);
    assert!(vm.pid.is_some());

    let status = tokio::time::timeout(Duration::from_secs(10), console.wait())
        .await
        .expect("VM exit")
        .unwrap();
    assert_eq!(status.code(), Some(3));
}

#[tokio::test(start_paused = true)]
async fn test_ip_timeout_kills_vm() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(dir.path());
    let mut vm = descriptor(true);

    let process = spawn_shell("sleep 600");
    let pid = process.pid();
    let (_never, rx) = oneshot::channel::<String>();

    let err = supervise(&store, &mut vm, process, rx).await.unwrap_err();
    assert!(format!("{:#}", err).contains("after 30s"), "{:#}", err);
    assert!(!is_process_alive(pid), "VM should be killed and reaped");
    assert!(vm.public_ip.is_none());
}

#[tokio::test]
async fn test_early_exit_fails_attached_boot() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(dir.path());
    let mut vm = descriptor(false);

    let (_guest, rx) = oneshot::channel::<String>();
    let err = supervise(&store, &mut vm, spawn_shell("exit 1"), rx)
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("before reporting its IP"));
    assert!(vm.pid.is_none());
}

#[tokio::test]
async fn test_early_exit_fails_detached_boot() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(dir.path());
    let mut vm = descriptor(true);

    let (_guest, rx) = oneshot::channel::<String>();
    let err = supervise(&store, &mut vm, spawn_shell("exit 2"), rx)
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("exited"));
}

#[tokio::test]
async fn test_metadata_going_away_fails_boot() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(dir.path());
    let mut vm = descriptor(true);

    let process = spawn_shell("sleep 600");
    let pid = process.pid();
    let (guest, rx) = oneshot::channel::<String>();
    drop(guest);

    let err = supervise(&store, &mut vm, process, rx).await.unwrap_err();
    assert!(format!("{:#}", err).contains("metadata service"));
    assert!(!is_process_alive(pid));
}
