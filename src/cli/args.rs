use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::paths::DEFAULT_HOME;

#[derive(Parser, Debug)]
#[command(name = "corevm", version, about = "Boot and supervise CoreOS VMs on xhyve")]
pub struct Cli {
    /// Directory holding instance state and kernel images
    #[arg(long, global = true, env = "COREVM_HOME", default_value = DEFAULT_HOME)]
    pub home: String,

    /// Verbose logging, including every stored instance record
    #[arg(long, global = true)]
    pub debug: bool,

    /// Hypervisor binary
    #[arg(long, global = true, env = "COREVM_HYPERVISOR", default_value = "xhyve")]
    pub hypervisor: PathBuf,

    /// Address the metadata service listens on
    #[arg(long, global = true, default_value = "0.0.0.0:0")]
    pub metadata_bind: SocketAddr,

    /// Host address guests use to reach the metadata service
    #[arg(long, global = true, default_value = "192.168.64.1")]
    pub metadata_host: String,

    /// Skip registering the NFS export of /Users
    #[arg(long, global = true)]
    pub no_nfs: bool,

    /// NFS exports file
    #[arg(long, global = true, default_value = "/etc/exports", hide = true)]
    pub nfs_exports: PathBuf,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Boot a new CoreOS instance
    #[command(visible_alias = "start")]
    Run(RunArgs),

    /// Internal: replace this process with the hypervisor
    #[command(hide = true)]
    Engine(EngineArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// CoreOS channel (alpha, beta or stable)
    #[arg(long, default_value = "alpha")]
    pub channel: String,

    /// CoreOS version
    #[arg(long, default_value = "latest")]
    pub version: String,

    /// VM's UUID, or 'random'
    #[arg(long, default_value = "random")]
    pub uuid: String,

    /// VM's RAM in MB (1024 to 8192)
    #[arg(long, default_value_t = 1024)]
    pub memory: u32,

    /// Number of vCPUs
    #[arg(long, default_value_t = 1)]
    pub cpus: u32,

    /// cloud-config file location, local path or URL
    #[arg(long = "cloud_config", visible_alias = "cloud-config")]
    pub cloud_config: Option<String>,

    /// SSH public key to authorize in the guest
    #[arg(long)]
    pub sshkey: Option<String>,

    /// Root volume (.img)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// CD-ROM image (.iso)
    #[arg(long)]
    pub cdrom: Option<PathBuf>,

    /// Extra volume(s) (.img), repeat or comma-separated
    #[arg(long, num_args = 0.., value_delimiter = ',')]
    pub volume: Vec<PathBuf>,

    /// Tap device to attach, e.g. /dev/tap0
    #[arg(long)]
    pub tap: Option<PathBuf>,

    /// Boot in the background
    #[arg(long, short)]
    pub detached: bool,

    /// Prefer locally available images
    #[arg(long, short)]
    pub local: bool,

    /// Instance name (defaults to the UUID)
    #[arg(long, short)]
    pub name: Option<String>,

    /// Extra hypervisor arguments
    #[arg(long, hide = true, allow_hyphen_values = true)]
    pub extra: Option<String>,
}

#[derive(Args, Debug)]
pub struct EngineArgs {
    /// Encoded argument list, kexec pairing and kernel command line
    #[arg(num_args = 3, required = true)]
    pub tokens: Vec<String>,
}
