use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};

use super::args::{Cli, RunArgs};
use crate::types::BootRequest;

/// Process-wide settings taken from the global options.
#[derive(Debug, Clone)]
pub struct Settings {
    pub home: String,
    pub debug: bool,
    pub hypervisor: PathBuf,
    pub metadata_bind: SocketAddr,
    pub metadata_host: String,
    pub nfs: bool,
    pub nfs_exports: PathBuf,
}

impl From<&Cli> for Settings {
    fn from(cli: &Cli) -> Self {
        Self {
            home: cli.home.clone(),
            debug: cli.debug,
            hypervisor: cli.hypervisor.clone(),
            metadata_bind: cli.metadata_bind,
            metadata_host: cli.metadata_host.clone(),
            nfs: !cli.no_nfs,
            nfs_exports: cli.nfs_exports.clone(),
        }
    }
}

impl TryFrom<RunArgs> for BootRequest {
    type Error = anyhow::Error;

    fn try_from(args: RunArgs) -> Result<Self> {
        let extra_args = match args.extra.as_deref() {
            Some(extra) => shell_words::split(extra).context("parsing --extra")?,
            None => Vec::new(),
        };

        Ok(Self {
            channel: args.channel,
            version: args.version,
            uuid: args.uuid,
            name: args.name,
            memory_mib: args.memory,
            cpus: args.cpus,
            cloud_config: args.cloud_config,
            ssh_key: args.sshkey,
            root: args.root,
            cdrom: args.cdrom,
            volumes: args.volume,
            tap: args.tap,
            detached: args.detached,
            prefer_local_images: args.local,
            extra_args,
        })
    }
}
