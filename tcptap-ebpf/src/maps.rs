//! BPF map definitions for the capture pipeline
//!
//! Defines the maps used for communication between kernel and userspace
//! and the read-only filter configuration global.

use aya_ebpf::{
    macros::map,
    maps::{HashMap, PerCpuArray, PerfEventArray},
};
use tcptap_common::{constants::*, FilterConfig, TcpEvent};

/// Per-CPU perf event array carrying accepted records to userspace
///
/// This is the only hand-off point between the capture path and the
/// daemon. The push never blocks; when a CPU's buffer is full the
/// kernel drops the record and the daemon observes the loss count.
#[map]
pub static EVENTS: PerfEventArray<TcpEvent> = PerfEventArray::new(0);

/// Dynamic pid membership set for `FilterMode::PidSet`
///
/// Key: thread group id
/// Value: presence marker (always 1)
///
/// Created empty at load time, written only by the daemon control
/// plane, read-only from the capture path. Destroyed with the object.
#[map]
pub static FILTER_PIDS: HashMap<u32, u8> =
    HashMap::with_max_entries(FILTER_PIDS_CAPACITY, 0);

/// Per-CPU capture counters
///
/// Index: stat id (see STAT_* constants)
/// Value: u64 counter, summed across CPUs by the daemon
#[map]
pub static STATS: PerCpuArray<u64> = PerCpuArray::with_max_entries(MAX_STATS, 0);

/// Filter configuration, patched into the object by the daemon before
/// load. The default captures everything.
#[no_mangle]
static FILTER_CFG: FilterConfig = FilterConfig::ALL;

/// Reads the daemon-provided filter configuration.
///
/// Volatile so the compiler cannot fold the pre-patch default into the
/// capture path.
#[inline(always)]
pub fn filter_config() -> FilterConfig {
    unsafe { core::ptr::read_volatile(&FILTER_CFG) }
}

/// Increment a statistics counter
///
/// Counters are per-CPU, so the add needs no synchronization.
#[inline(always)]
pub fn increment_stat(stat_id: u32) {
    if let Some(count) = STATS.get_ptr_mut(stat_id) {
        unsafe { *count += 1 };
    }
}
