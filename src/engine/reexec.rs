use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::process::Command;
use tracing::info;

use super::{configure_stdio, Engine, EngineProcess, StdioMode};
use crate::payload::BootPayload;

/// Name of the hidden subcommand the child is started with
pub const ENTRY_POINT: &str = "engine";

/// Starts the hypervisor by re-running the current executable.
///
/// The payload crosses the process boundary as three base64 tokens (argv,
/// kexec pairing, kernel command line) so embedded whitespace and quotes
/// survive untouched.
pub struct ReexecEngine {
    program: PathBuf,
    hypervisor: PathBuf,
    debug: bool,
}

impl ReexecEngine {
    pub fn new(program: PathBuf, hypervisor: PathBuf) -> Self {
        Self {
            program,
            hypervisor,
            debug: false,
        }
    }

    /// Have the bridge log at debug level too
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    fn command(&self, payload: &BootPayload) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(ENTRY_POINT)
            .arg("--hypervisor")
            .arg(&self.hypervisor);
        if self.debug {
            cmd.arg("--debug");
        }
        cmd.args(encode_tokens(payload));
        cmd
    }

    /// Re-exec through the running binary
    pub fn current(hypervisor: PathBuf) -> Result<Self> {
        let program = std::env::current_exe().context("locating the corevm executable")?;
        Ok(Self::new(program, hypervisor))
    }
}

impl Engine for ReexecEngine {
    fn start(&self, payload: &BootPayload, stdio: &StdioMode) -> Result<EngineProcess> {
        let mut cmd = self.command(payload);
        configure_stdio(&mut cmd, stdio)?;

        let child = cmd.spawn().context("spawning hypervisor bridge")?;
        let process = EngineProcess::from_child(child)?;
        info!(
            target: "engine",
            pid = process.pid(),
            hypervisor = %self.hypervisor.display(),
            detached = matches!(stdio, StdioMode::Detached { .. }),
            "hypervisor started"
        );
        Ok(process)
    }
}

/// Encode a payload as the three opaque bridge tokens.
pub fn encode_tokens(payload: &BootPayload) -> [String; 3] {
    [
        STANDARD.encode(shell_words::join(&payload.args)),
        STANDARD.encode(payload.kexec()),
        STANDARD.encode(&payload.cmdline),
    ]
}

/// Decode bridge tokens back into `(args, kexec, cmdline)`.
pub fn decode_tokens(tokens: &[String]) -> Result<(Vec<String>, String, String)> {
    let [args, kexec, cmdline] = tokens else {
        bail!("expected exactly 3 engine tokens, got {}", tokens.len());
    };

    let decode = |token: &str, what: &str| -> Result<String> {
        let bytes = STANDARD
            .decode(token)
            .with_context(|| format!("decoding {} token", what))?;
        String::from_utf8(bytes).with_context(|| format!("{} token is not UTF-8", what))
    };

    let args = shell_words::split(&decode(args.as_str(), "argument")?)
        .context("splitting engine arguments")?;
    Ok((
        args,
        decode(kexec.as_str(), "kexec")?,
        decode(cmdline.as_str(), "cmdline")?,
    ))
}

/// Final hypervisor argv: device arguments followed by the firmware argument.
pub fn hypervisor_argv(args: Vec<String>, kexec: &str, cmdline: &str) -> Vec<String> {
    let mut argv = args;
    argv.push("-f".to_string());
    argv.push(format!("{}{}", kexec, cmdline));
    argv
}
