use std::os::unix::process::CommandExt;
use std::path::Path;

use anyhow::{anyhow, Result};
use tracing::debug;

use crate::cli::EngineArgs;
use crate::engine::{decode_tokens, hypervisor_argv};

/// Hidden entry point: decode the bridge tokens and become the hypervisor.
///
/// Only returns if the exec itself fails.
pub fn cmd_engine(hypervisor: &Path, args: EngineArgs) -> Result<()> {
    let (args, kexec, cmdline) = decode_tokens(&args.tokens)?;
    let argv = hypervisor_argv(args, &kexec, &cmdline);
    debug!(target: "engine", hypervisor = %hypervisor.display(), ?argv, "exec");

    let err = std::process::Command::new(hypervisor).args(&argv).exec();
    Err(anyhow!(err).context(format!("exec {}", hypervisor.display())))
}
