//! Everything a boot attempt needs, bundled once per process.
//!
//! Collaborators sit behind trait objects so tests can swap in fakes without
//! touching the orchestration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::cli::Settings;
use crate::engine::{Engine, ReexecEngine};
use crate::image::{ImageResolver, LocalImages};
use crate::metadata::{LocalMetadataService, MetadataService};
use crate::paths::Paths;
use crate::registry::{ResourceRegistry, StoreRegistry};
use crate::setup::{HostShare, KeyGenerator, NfsExports, NoShare, SshKeygen};
use crate::state::{manager::invoking_user, ConfigStore, HashedMac, MacDeriver};
use crate::validate::{CloudConfigProbe, HttpProbe};

pub struct Session {
    pub paths: Paths,
    /// Relative attachment paths resolve against this
    pub workdir: PathBuf,
    /// Where tap devices must live
    pub device_root: PathBuf,
    pub store: Arc<ConfigStore>,
    pub registry: Box<dyn ResourceRegistry>,
    pub images: Box<dyn ImageResolver>,
    pub macs: Box<dyn MacDeriver>,
    pub probe: Box<dyn CloudConfigProbe>,
    pub keys: Box<dyn KeyGenerator>,
    pub share: Box<dyn HostShare>,
    pub metadata: Box<dyn MetadataService>,
    pub engine: Box<dyn Engine>,
}

impl Session {
    /// Production wiring for the given settings.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let paths = Paths::from_home(&settings.home);
        let store = Arc::new(ConfigStore::new(paths.run_dir()));
        store.init().await?;

        let share: Box<dyn HostShare> = if settings.nfs {
            let (uid, gid) = invoking_user().unwrap_or_else(|| {
                (nix::unistd::getuid().as_raw(), nix::unistd::getgid().as_raw())
            });
            Box::new(NfsExports::new(settings.nfs_exports.clone(), uid, gid))
        } else {
            Box::new(NoShare)
        };

        let workdir = std::env::current_dir().context("reading working directory")?;
        debug!(target: "session", home = %paths.home().display(), workdir = %workdir.display(), "session ready");

        Ok(Self {
            images: Box::new(LocalImages::new(paths.image_dir())),
            registry: Box::new(StoreRegistry::new(store.clone())),
            macs: Box::new(HashedMac),
            probe: Box::new(HttpProbe::new()?),
            keys: Box::new(SshKeygen::new("corevm")),
            share,
            metadata: Box::new(LocalMetadataService::new(
                settings.metadata_bind,
                settings.metadata_host.clone(),
            )),
            engine: Box::new(
                ReexecEngine::current(settings.hypervisor.clone())?.with_debug(settings.debug),
            ),
            device_root: PathBuf::from("/dev"),
            workdir,
            store,
            paths,
        })
    }
}
