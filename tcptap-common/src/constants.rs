//! Shared constants for the capture pipeline
//!
//! These constants are used by both the kernel programs and the daemon
//! so that map names, counter indices, and size limits stay in step.

// ============================================================================
// Fixed widths
// ============================================================================

/// Width of the command-name snapshot (the kernel's TASK_COMM_LEN)
pub const COMM_LEN: usize = 16;

// ============================================================================
// BPF map and global names
// ============================================================================

/// Per-CPU perf event array carrying `TcpEvent` records to userspace
pub const EVENTS_MAP: &str = "EVENTS";

/// Dynamic pid membership set consulted in `FilterMode::PidSet`
pub const FILTER_PIDS_MAP: &str = "FILTER_PIDS";

/// Per-CPU capture counters (see STAT_* indices below)
pub const STATS_MAP: &str = "STATS";

/// Read-only global holding the `FilterConfig`
pub const FILTER_CONFIG_GLOBAL: &str = "FILTER_CFG";

// ============================================================================
// BPF map sizes
// ============================================================================

/// Maximum number of pids in the membership set
pub const FILTER_PIDS_CAPACITY: u32 = 10240;

// ============================================================================
// Statistics counter indices (for the STATS map)
// ============================================================================

/// Handler invocations that reached the extractor
pub const STAT_SEEN: u32 = 0;

/// Records accepted by the filter and pushed to the event channel
pub const STAT_ACCEPTED: u32 = 1;

/// Records rejected by the filter
pub const STAT_FILTERED: u32 = 2;

/// Parent-link reads that fell back to the zero sentinel
pub const STAT_PARENT_MISS: u32 = 3;

/// Total number of statistics counters
pub const MAX_STATS: u32 = 4;
