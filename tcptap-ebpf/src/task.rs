//! Current-task context readers
//!
//! Safe wrappers around the BPF helpers the extractor needs. Every
//! read completes in bounded time; failures surface as sentinels or
//! None, never as faults.

use aya_ebpf::helpers::{
    bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_ktime_get_ns, bpf_probe_read_kernel,
    r#gen::bpf_get_current_task,
};
use tcptap_common::constants::COMM_LEN;

use crate::vmlinux::task_struct;

/// Get current timestamp in nanoseconds
#[inline(always)]
pub fn get_timestamp() -> u64 {
    unsafe { bpf_ktime_get_ns() }
}

/// Get current process ID (thread group id)
#[inline(always)]
pub fn get_pid() -> u32 {
    (bpf_get_current_pid_tgid() >> 32) as u32
}

/// Get the current task command name, zero padded to `COMM_LEN`
#[inline(always)]
pub fn get_comm() -> [u8; COMM_LEN] {
    bpf_get_current_comm().unwrap_or([0u8; COMM_LEN])
}

/// Get the parent's thread group id by following the current task's
/// real_parent link
///
/// One bounded verified read per hop. Returns None when the link cannot
/// be read so the caller can substitute a sentinel instead of aborting
/// the capture.
#[inline(always)]
pub fn get_ppid() -> Option<u32> {
    let task = unsafe { bpf_get_current_task() } as *const task_struct;
    if task.is_null() {
        return None;
    }

    let parent: *const task_struct = match unsafe { bpf_probe_read_kernel(&(*task).real_parent) } {
        Ok(p) => p,
        Err(_) => return None,
    };
    if parent.is_null() {
        return None;
    }

    match unsafe { bpf_probe_read_kernel(&(*parent).tgid) } {
        Ok(tgid) => Some(tgid as u32),
        Err(_) => None,
    }
}
