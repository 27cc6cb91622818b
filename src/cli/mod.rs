pub mod args;
pub mod types;

pub use args::{Cli, Commands, EngineArgs, RunArgs};
pub use types::Settings;
