use anyhow::Result;
use clap::Parser;
use corevm::cli::{Commands, Settings};
use corevm::{cli, commands};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let settings = Settings::from(&cli);

    let level = if settings.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    // The engine entry point runs as a child of `run`; its lines land in the
    // console or console log, so drop time and level but keep targets.
    if matches!(cli.cmd, Commands::Engine(_)) {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
            .with_target(true)
            .without_time()
            .with_level(false)
            .with_ansi(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        // Only use colors when outputting to a TTY
        let use_color = atty::is(atty::Stream::Stdout);
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
            .with_target(true)
            .with_ansi(use_color)
            .with_writer(std::io::stderr)
            .init();
    }

    let result = match cli.cmd {
        Commands::Run(args) => commands::cmd_run(settings, args).await,
        Commands::Engine(args) => commands::cmd_engine(&settings.hypervisor, args),
    };

    if let Err(e) = &result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }

    result
}
