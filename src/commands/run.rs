use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::cli::{RunArgs, Settings};
use crate::engine::{EngineProcess, StdioMode};
use crate::metadata::Registration;
use crate::payload;
use crate::session::Session;
use crate::setup::preflight;
use crate::state::{NetworkInterface, VmDescriptor, VmStatus};
use crate::supervisor::{self, Console};
use crate::types::BootRequest;
use crate::validate::{clamp_memory, resolve_identity, Validator};

/// Console output file for detached instances, inside the instance directory
pub const CONSOLE_LOG: &str = "console.log";

/// A booted instance. `console` is set for attached boots.
#[derive(Debug)]
pub struct BootOutcome {
    pub descriptor: VmDescriptor,
    pub console: Option<Console>,
}

pub async fn cmd_run(settings: Settings, args: RunArgs) -> Result<()> {
    let request = BootRequest::try_from(args)?;
    preflight::allowed_to_run(&settings.hypervisor)?;
    let session = Session::from_settings(&settings).await?;

    let outcome = boot(&session, &request).await?;
    let vm = &outcome.descriptor;

    match outcome.console {
        None => {
            println!(
                "started '{}' in background with IP {} and PID {}",
                vm.name,
                vm.public_ip.as_deref().unwrap_or("-"),
                vm.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())
            );
            Ok(())
        }
        Some(console) => {
            let status = console.wait().await?;
            info!(target: "run", name = %vm.name, %status, "VM exited");
            supervisor::check_exit(status)
        }
    }
}

/// Boot one instance.
///
/// Validation runs first and persists nothing. Once the descriptor has been
/// stored, any later failure is recorded on it as the terminal status.
pub async fn boot(session: &Session, request: &BootRequest) -> Result<BootOutcome> {
    let mut vm = bootstrap(session, request).await?;

    let instance_dir = session
        .store
        .prepare_instance_dir(&vm.uuid)
        .await
        .context("preparing instance directory")?;
    session
        .share
        .export()
        .await
        .context("unable to setup NFS export of /Users")?;
    let Registration {
        endpoint,
        public_ip,
        shutdown,
    } = session
        .metadata
        .register(&vm)
        .await
        .context("registering with the metadata service")?;

    let payload = payload::assemble(&vm, &session.paths.image_dir(), &endpoint);

    vm.status = VmStatus::Starting;
    vm.created_at = Some(Utc::now());
    vm.supervisor_pid = Some(std::process::id());
    if let Err(e) = session.store.save(&vm).await {
        shutdown.cancel();
        return Err(e.context("persisting instance configuration"));
    }

    let stdio = if vm.detached {
        StdioMode::Detached {
            console_log: instance_dir.join(CONSOLE_LOG),
        }
    } else {
        StdioMode::Attached
    };

    let result = match session.engine.start(&payload, &stdio) {
        Ok(process) => claim_and_supervise(session, &mut vm, process, public_ip).await,
        Err(e) => Err(e.context("starting hypervisor")),
    };

    match result {
        Ok(console) => Ok(BootOutcome {
            descriptor: vm,
            console,
        }),
        Err(e) => {
            shutdown.cancel();
            vm.mark_failed(&e);
            if let Err(save_err) = session.store.save(&vm).await {
                warn!(target: "run", uuid = %vm.uuid, error = %save_err, "failed to record boot failure");
            }
            Err(e)
        }
    }
}

/// Record the spawned hypervisor's PID, then supervise it.
///
/// A detached hypervisor survives its supervisor, so the claim on the
/// instance's resources has to follow the child from the moment it exists.
async fn claim_and_supervise(
    session: &Session,
    vm: &mut VmDescriptor,
    mut process: EngineProcess,
    public_ip: oneshot::Receiver<String>,
) -> Result<Option<Console>> {
    vm.hypervisor_pid = Some(process.pid());
    if let Err(e) = session.store.save(vm).await {
        if let Err(kill_err) = process.kill().await {
            warn!(target: "run", pid = process.pid(), error = %kill_err, "failed to kill hypervisor");
        }
        return Err(e.context("recording hypervisor PID"));
    }
    supervisor::supervise(&session.store, vm, process, public_ip).await
}

/// Identity, image and attachment validation. Nothing is persisted here.
async fn bootstrap(session: &Session, request: &BootRequest) -> Result<VmDescriptor> {
    let identity = resolve_identity(
        &request.uuid,
        request.name.as_deref(),
        session.macs.as_ref(),
        session.registry.as_ref(),
    )
    .await?;

    let mut vm = VmDescriptor::new(identity.uuid, identity.name, identity.mac_address);
    vm.memory_mib = clamp_memory(request.memory_mib);
    vm.cpus = request.cpus;
    vm.detached = request.detached;
    vm.prefer_local_images = request.prefer_local_images;
    vm.extra_args = request.extra_args.clone();
    vm.ssh_key = request.ssh_key.clone().filter(|k| !k.is_empty());

    let (channel, version) = session
        .images
        .resolve(&request.channel, &request.version, request.prefer_local_images)
        .await?;
    vm.channel = channel;
    vm.version = version;

    let validator = Validator::new(session.registry.as_ref(), &session.workdir)
        .with_device_root(&session.device_root);
    validator
        .validate_cdrom(&mut vm, request.cdrom.as_deref())
        .await?;
    if let Some(root) = &request.root {
        validator
            .validate_volumes(&mut vm, std::slice::from_ref(root), true)
            .await?;
    }
    validator
        .validate_volumes(&mut vm, &request.volumes, false)
        .await?;

    vm.ethernet.push(NetworkInterface::raw());
    validator
        .add_tap_interface(&mut vm, request.tap.as_deref())
        .await?;
    validator
        .validate_cloud_config(&mut vm, request.cloud_config.as_deref(), session.probe.as_ref())
        .await?;

    vm.internal_ssh = Some(
        session
            .keys
            .generate()
            .await
            .context("unable to generate internal SSH key pair")?,
    );

    info!(
        target: "run",
        uuid = %vm.uuid,
        name = %vm.name,
        channel = %vm.channel,
        version = %vm.version,
        memory_mib = vm.memory_mib,
        cpus = vm.cpus,
        "instance validated"
    );
    Ok(vm)
}
