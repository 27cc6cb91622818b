pub mod engine;
pub mod run;

// Re-export command functions
pub use engine::cmd_engine;
pub use run::{boot, cmd_run, BootOutcome};
