pub mod nfs;
pub mod preflight;
pub mod ssh;

pub use nfs::{HostShare, NfsExports, NoShare};
pub use ssh::{KeyGenerator, SshKeygen};
