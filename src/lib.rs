pub mod cli;
pub mod commands;
pub mod engine;
pub mod image;
pub mod metadata;
pub mod paths;
pub mod payload;
pub mod registry;
pub mod session;
pub mod setup;
pub mod state;
pub mod supervisor;
pub mod types;
pub mod utils;
pub mod validate;

// Re-export core types for convenience
pub use session::Session;
pub use types::BootRequest;
