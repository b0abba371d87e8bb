//! Builds the VM subprocess command line.
//!
//! Grounded on the original `qemu.py`'s `get_qemu_cmd`: a base template plus
//! the control-socket chardev, a "nyx" device descriptor carrying the work
//! directory and buffer sizes, optional IP filter ranges, and snapshot
//! load/create flags keyed on whether this worker is the snapshot creator.

use std::path::PathBuf;
use std::process::Command;

use vmfuzz_common::Config;

pub fn interface_socket_path(work_dir: &std::path::Path, pid: usize) -> PathBuf {
    work_dir.join(format!("interface_{pid}"))
}

pub fn build_qemu_cmd(config: &Config, pid: usize) -> Command {
    let mut cmd = Command::new(&config.qemu_path);

    cmd.arg("-m").arg(config.memory_mb.to_string());
    cmd.arg("-enable-kvm");
    cmd.arg("-no-reboot");
    cmd.arg("-nographic");
    cmd.arg("-serial").arg(format!("file:{}", config.work_dir.join(format!("serial_{pid:02}.log")).display()));

    if let Some(kernel) = &config.qemu_kernel {
        cmd.arg("-kernel").arg(kernel);
    }
    if let Some(initrd) = &config.qemu_initrd {
        cmd.arg("-initrd").arg(initrd);
    }
    if let Some(bios) = &config.qemu_bios {
        cmd.arg("-bios").arg(bios);
    }
    if let Some(append) = &config.qemu_append {
        cmd.arg("-append").arg(append);
    }
    if let Some(image) = &config.qemu_image {
        cmd.arg("-drive").arg(format!("file={},format=raw", image.display()));
    }

    let sock = interface_socket_path(&config.work_dir, pid);
    cmd.arg("-chardev").arg(format!(
        "socket,id=nyx_chardev,path={},server=on,wait=off",
        sock.display()
    ));

    let mut nyx_device = format!(
        "nyx,chardev=nyx_chardev,workdir={},worker_id={},bitmap_size={},input_buffer_size={}",
        config.work_dir.display(),
        pid,
        config.bitmap_size,
        config.payload_size,
    );
    for (i, filter) in config.ip_filters.iter().enumerate() {
        if let Some((start, end)) = filter {
            nyx_device.push_str(&format!(",ip{i}_a={start:#x},ip{i}_b={end:#x}"));
        }
    }
    if config.trace {
        nyx_device.push_str(",dump_pt_trace=on");
    }
    let load = if Config::is_snapshot_creator(pid) { "off" } else { "on" };
    nyx_device.push_str(&format!(",snapshot_load={load}"));
    cmd.arg("-device").arg(nyx_device);

    cmd
}

/// Non-creator workers stagger startup to avoid a known boot-time race in the
/// snapshot-load path. Fixed in the original at `4 + 0.1*pid` seconds.
pub fn startup_delay(pid: usize) -> std::time::Duration {
    if Config::is_snapshot_creator(pid) {
        std::time::Duration::ZERO
    } else {
        std::time::Duration::from_millis(4_000 + 100 * pid as u64)
    }
}
