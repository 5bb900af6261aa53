//! fio command lines used by soak workloads.

use crate::duty_cycle::DutyCycle;
use crate::platform::manifest::{BLOCK_DEVICE_PATH, FS_MOUNT_PATH};
use crate::platform::VolumeMode;

/// Arguments appended to every fio invocation.
pub const COMMON_FIO_ARGS: &[&str] = &[
    "--name=benchtest",
    "--numjobs=1",
    "--direct=1",
    "--rw=randrw",
    "--ioengine=libaio",
    "--bs=4k",
    "--iodepth=16",
    "--verify=crc32",
    "--verify_fatal=1",
    "--verify_async=2",
];

/// fio target file for filesystem volumes.
pub fn fs_filename() -> String {
    format!("{FS_MOUNT_PATH}/fiotestfile")
}

/// fio target for a volume mode.
pub fn filename(mode: VolumeMode) -> String {
    match mode {
        VolumeMode::Filesystem => fs_filename(),
        VolumeMode::RawBlock => BLOCK_DEVICE_PATH.to_string(),
    }
}

/// Time-based fio arguments for one run.
///
/// `--size` is only emitted for filesystem volumes; raw block runs use the
/// whole device.
pub fn run_args(
    runtime_secs: u64,
    mode: VolumeMode,
    duty_cycle: DutyCycle,
    fs_size_mb: u64,
) -> Vec<String> {
    let mut args = vec![
        "--time_based".to_string(),
        format!("--runtime={runtime_secs}"),
        format!("--filename={}", filename(mode)),
        format!("--thinktime={}", duty_cycle.think_time),
        format!("--thinktime_blocks={}", duty_cycle.think_time_blocks),
    ];
    if mode == VolumeMode::Filesystem {
        args.push(format!("--size={fs_size_mb}m"));
    }
    args.extend(COMMON_FIO_ARGS.iter().map(ToString::to_string));
    args
}
