//! Boot payload assembly: descriptor in, hypervisor argv and kernel out.
//!
//! Device topology is fixed:
//!
//! ```text
//! bus 0  slot 0   hostbridge
//! com1            serial console on stdio
//! slot 31         lpc
//! bus 2  slot i   network interface i   (virtio-tap for tap, virtio-net otherwise)
//! bus 3  slot n   CD-ROM                (ahci-cd)
//! bus 4  slot n   hard drive n          (virtio-blk)
//! ```

use std::path::{Path, PathBuf};

use crate::image::boot_images;
use crate::state::{CloudConfigLocation, InterfaceKind, VmDescriptor};

const BASE_CMDLINE: &str = "earlyprintk=serial console=ttyS0 coreos.autologin";

/// Everything the engine needs to start one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootPayload {
    pub args: Vec<String>,
    pub kernel: PathBuf,
    pub initrd: PathBuf,
    pub cmdline: String,
}

impl BootPayload {
    /// Kernel/initrd pairing in the hypervisor's `kexec` firmware syntax
    pub fn kexec(&self) -> String {
        format!("kexec,{},{},", self.kernel.display(), self.initrd.display())
    }
}

/// Map a validated descriptor to its boot payload.
///
/// `endpoint` is the metadata service URL the guest reports back to.
pub fn assemble(vm: &VmDescriptor, image_dir: &Path, endpoint: &str) -> BootPayload {
    let (kernel, initrd) = boot_images(image_dir, &vm.channel, &vm.version);

    BootPayload {
        args: engine_args(vm),
        kernel,
        initrd,
        cmdline: kernel_cmdline(vm, endpoint),
    }
}

fn engine_args(vm: &VmDescriptor) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-s".into(),
        "0:0,hostbridge".into(),
        "-l".into(),
        "com1,stdio".into(),
        "-s".into(),
        "31,lpc".into(),
        "-U".into(),
        vm.uuid.clone(),
        "-m".into(),
        format!("{}M", vm.memory_mib),
        "-c".into(),
        vm.cpus.to_string(),
        "-A".into(),
    ];

    args.extend(vm.extra_args.iter().cloned());

    for (index, iface) in vm.ethernet.iter().enumerate() {
        args.push("-s".into());
        match iface.kind {
            InterfaceKind::Tap => args.push(format!("2:{},virtio-tap,{}", index, iface.device)),
            InterfaceKind::Raw => args.push(format!("2:{},virtio-net", index)),
        }
    }

    if let Some(cd) = &vm.storage.cdrom {
        args.push("-s".into());
        args.push(format!("3:{},ahci-cd,{}", cd.slot, cd.path.display()));
    }

    for hd in &vm.storage.hard_drives {
        args.push("-s".into());
        args.push(format!("4:{},virtio-blk,{}", hd.slot, hd.path.display()));
    }

    args
}

fn kernel_cmdline(vm: &VmDescriptor, endpoint: &str) -> String {
    let mut cmdline = format!("{} uuid={}", BASE_CMDLINE, vm.uuid);

    if let Some(key) = vm.ssh_key.as_deref().filter(|k| !k.is_empty()) {
        cmdline.push_str(&format!(" sshkey=\"{}\"", key));
    }

    if let Some(root) = vm.storage.root {
        cmdline.push_str(&format!(" root=/dev/vd{}", root_letter(root)));
    }

    cmdline.push_str(&format!(" endpoint={}", endpoint));

    if let Some(cc) = &vm.cloud_config {
        let url = match cc.location {
            CloudConfigLocation::Local => format!("{}/cloud-config", endpoint),
            CloudConfigLocation::Remote => cc.locator.clone(),
        };
        cmdline.push_str(&format!(" cloud-config-url={}", url));
    }

    cmdline
}

/// `0 -> 'a'`, `1 -> 'b'`, ...
fn root_letter(slot: usize) -> char {
    char::from(b'a' + (slot % 26) as u8)
}
