// Focused CLI parsing tests (tests command-line parsing only, not business logic)

use std::path::PathBuf;

use clap::Parser;
use corevm::cli::{Cli, Commands};
use corevm::BootRequest;

fn run_args(argv: &[&str]) -> corevm::cli::RunArgs {
    match Cli::try_parse_from(argv).expect("parse").cmd {
        Commands::Run(r) => r,
        _ => panic!("Expected Run command"),
    }
}

#[test]
fn test_run_and_start_alias_parse() {
    let test_cases = vec![
        vec!["corevm", "run"],
        vec!["corevm", "start"],
        vec!["corevm", "run", "-d", "-n", "core-01"],
        vec!["corevm", "--debug", "start", "--local"],
    ];

    for args in test_cases {
        let cli = Cli::try_parse_from(&args).unwrap_or_else(|e| panic!("Failed to parse {:?}: {}", args, e));
        assert!(matches!(cli.cmd, Commands::Run(_)));
    }
}

#[test]
fn test_run_defaults() {
    let r = run_args(&["corevm", "run"]);
    assert_eq!(r.channel, "alpha");
    assert_eq!(r.version, "latest");
    assert_eq!(r.uuid, "random");
    assert_eq!(r.memory, 1024);
    assert_eq!(r.cpus, 1);
    assert!(!r.detached);
    assert!(!r.local);
    assert!(r.volume.is_empty());
    assert!(r.extra.is_none());
}

#[test]
fn test_run_with_all_options() {
    let r = run_args(&[
        "corevm", "run",
        "--channel", "stable",
        "--version", "1465.6.0",
        "--uuid", "2f0a6d1e-5b1a-4c44-9c3e-8f2d6a1b7c90",
        "--memory", "2048",
        "--cpus", "2",
        "--cloud_config", "user-data.yml",
        "--sshkey", "ssh-ed25519 AAAA me@host",
        "--root", "root.img",
        "--cdrom", "boot.iso",
        "--volume", "a.img",
        "--volume", "b.img,c.img",
        "--tap", "/dev/tap0",
        "--detached",
        "--local",
        "--name", "core-01",
    ]);

    assert_eq!(r.channel, "stable");
    assert_eq!(r.memory, 2048);
    assert_eq!(r.cpus, 2);
    assert_eq!(r.cloud_config.as_deref(), Some("user-data.yml"));
    assert_eq!(r.root, Some(PathBuf::from("root.img")));
    assert_eq!(r.cdrom, Some(PathBuf::from("boot.iso")));
    assert_eq!(
        r.volume,
        vec![PathBuf::from("a.img"), PathBuf::from("b.img"), PathBuf::from("c.img")]
    );
    assert_eq!(r.tap, Some(PathBuf::from("/dev/tap0")));
    assert!(r.detached && r.local);
    assert_eq!(r.name.as_deref(), Some("core-01"));
}

#[test]
fn test_run_rejects_positional_arguments() {
    assert!(Cli::try_parse_from(["corevm", "run", "extra-arg"]).is_err());
}

#[test]
fn test_boot_request_from_args() {
    let r = run_args(&["corevm", "run", "-n", "core-02", "--extra", "-s 7,virtio-rnd"]);
    let req = BootRequest::try_from(r).unwrap();
    assert_eq!(req.name.as_deref(), Some("core-02"));
    assert_eq!(req.extra_args, vec!["-s", "7,virtio-rnd"]);
    assert_eq!(req.memory_mib, 1024);
}

#[test]
fn test_engine_requires_exactly_three_tokens() {
    let cli = Cli::try_parse_from(["corevm", "engine", "YQ==", "Yg==", "Yw=="]).unwrap();
    match cli.cmd {
        Commands::Engine(e) => assert_eq!(e.tokens.len(), 3),
        _ => panic!("Expected Engine command"),
    }

    assert!(Cli::try_parse_from(["corevm", "engine", "YQ==", "Yg=="]).is_err());
    assert!(Cli::try_parse_from(["corevm", "engine", "YQ==", "Yg==", "Yw==", "ZA=="]).is_err());
}

#[test]
fn test_global_options() {
    let cli = Cli::try_parse_from([
        "corevm",
        "--home", "/tmp/corevm-home",
        "--hypervisor", "/usr/local/bin/xhyve",
        "--metadata-bind", "127.0.0.1:4000",
        "run",
        "--no-nfs",
    ])
    .unwrap();
    assert_eq!(cli.home, "/tmp/corevm-home");
    assert_eq!(cli.hypervisor, PathBuf::from("/usr/local/bin/xhyve"));
    assert_eq!(cli.metadata_bind.port(), 4000);
    assert!(cli.no_nfs);
}
