//! eBPF program loader and attachment lifecycle
//!
//! Handles loading the probe object, patching the filter configuration
//! into its read-only data, and attaching the four TCP kprobes as one
//! unit. Attachment is all-or-nothing: if any hook fails, the hooks
//! already placed are rolled back before the error is reported, so a
//! partially attached set is never exposed.

use std::path::{Path, PathBuf};

use aya::{
    maps::{perf::AsyncPerfEventArray, HashMap as AyaHashMap, MapData, MapError, PerCpuArray},
    programs::{kprobe::KProbeLinkId, KProbe, ProgramError},
    Ebpf, EbpfError, EbpfLoader,
};
use aya_log::EbpfLogger;
use log::{debug, info, warn};
use tcptap_common::{
    FilterConfig, EVENTS_MAP, FILTER_CONFIG_GLOBAL, FILTER_PIDS_MAP, MAX_STATS, STATS_MAP,
    STAT_ACCEPTED, STAT_FILTERED, STAT_PARENT_MISS, STAT_SEEN,
};
use thiserror::Error;

use crate::{filter::FilterControl, report::KernelStats};

/// Kernel entry points instrumented by the probe set, in attach order
///
/// Each name is both the program name inside the object and the kernel
/// symbol the kprobe hooks.
pub const TCP_ENTRY_POINTS: [&str; 4] = [
    "tcp_v4_connect",
    "tcp_sendmsg",
    "tcp_recvmsg",
    "tcp_close",
];

/// Errors from loading, attaching, or detaching the probe set
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to read eBPF object file {path:?}")]
    ObjectRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load eBPF object")]
    Load(#[from] EbpfError),
    #[error("program {0} not found in eBPF object")]
    ProgramNotFound(&'static str),
    #[error("program {0} is not a kprobe")]
    ProgramType(&'static str),
    #[error("failed to load program {program}")]
    ProgramLoad {
        program: &'static str,
        #[source]
        source: ProgramError,
    },
    #[error("failed to attach {program}")]
    Attach {
        program: &'static str,
        #[source]
        source: ProgramError,
    },
    #[error("failed to detach {program}")]
    Detach {
        program: &'static str,
        #[source]
        source: ProgramError,
    },
    #[error("map {0} not found in eBPF object")]
    MapNotFound(&'static str),
    #[error("map {name} has the wrong type")]
    Map {
        name: &'static str,
        #[source]
        source: MapError,
    },
    #[error("cannot {op} while the probe set is {state:?}")]
    InvalidState {
        op: &'static str,
        state: AttachState,
    },
}

/// Attachment lifecycle of the probe set
///
/// The only path back to Attached from Detaching is a fresh
/// Unattached -> Attached cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachState {
    /// No hooks placed
    Unattached,
    /// All four entry points hooked
    Attached,
    /// Hooks being removed
    Detaching,
}

impl AttachState {
    /// Whether an attach may begin from this state.
    pub const fn can_attach(self) -> bool {
        matches!(self, AttachState::Unattached)
    }

    /// Whether a detach may begin from this state.
    pub const fn can_detach(self) -> bool {
        matches!(self, AttachState::Attached)
    }
}

/// Loaded probe object and its attachment state
pub struct ProbeSet {
    ebpf: Ebpf,
    links: Vec<(&'static str, KProbeLinkId)>,
    state: AttachState,
}

impl ProbeSet {
    /// Loads the probe object from disk and patches the filter
    /// configuration into its read-only data before the kernel sees it.
    pub fn load(path: &Path, filter: &FilterConfig) -> Result<ProbeSet, ProbeError> {
        info!("Loading eBPF object from: {:?}", path);

        let data = std::fs::read(path).map_err(|source| ProbeError::ObjectRead {
            path: path.to_owned(),
            source,
        })?;

        let ebpf = EbpfLoader::new()
            .set_global(FILTER_CONFIG_GLOBAL, filter, true)
            .load(&data)?;

        info!("eBPF object loaded successfully");

        Ok(ProbeSet {
            ebpf,
            links: Vec::new(),
            state: AttachState::Unattached,
        })
    }

    /// Initialize the kernel-side logger
    ///
    /// Non-fatal: without it the probes still run, only their log lines
    /// are not surfaced.
    pub fn init_logger(&mut self) {
        if let Err(e) = EbpfLogger::init(&mut self.ebpf) {
            warn!("failed to initialize eBPF logger: {}", e);
        }
    }

    /// Current attachment state.
    pub fn state(&self) -> AttachState {
        self.state
    }

    /// Attaches all four entry points, or none.
    pub fn attach(&mut self) -> Result<(), ProbeError> {
        if !self.state.can_attach() {
            return Err(ProbeError::InvalidState {
                op: "attach",
                state: self.state,
            });
        }

        let mut attached: Vec<(&'static str, KProbeLinkId)> = Vec::new();
        for name in TCP_ENTRY_POINTS {
            match self.attach_one(name) {
                Ok(link) => {
                    info!("  Attached to {}", name);
                    attached.push((name, link));
                }
                Err(e) => {
                    warn!(
                        "Attach failed on {}, rolling back {} placed hook(s)",
                        name,
                        attached.len()
                    );
                    self.rollback(attached);
                    return Err(e);
                }
            }
        }

        self.links = attached;
        self.state = AttachState::Attached;
        info!("All kprobes attached successfully");

        Ok(())
    }

    fn attach_one(&mut self, name: &'static str) -> Result<KProbeLinkId, ProbeError> {
        let program = self.kprobe_mut(name)?;
        program
            .load()
            .map_err(|source| ProbeError::ProgramLoad {
                program: name,
                source,
            })?;
        program.attach(name, 0).map_err(|source| ProbeError::Attach {
            program: name,
            source,
        })
    }

    /// Removes the given hooks in reverse order. Individual failures are
    /// logged and skipped; nothing better can be done mid-rollback.
    fn rollback(&mut self, mut attached: Vec<(&'static str, KProbeLinkId)>) {
        while let Some((name, link)) = attached.pop() {
            match self.kprobe_mut(name) {
                Ok(program) => {
                    if let Err(e) = program.detach(link) {
                        warn!("rollback: failed to detach {}: {}", name, e);
                    }
                }
                Err(e) => warn!("rollback: {} no longer addressable: {}", name, e),
            }
        }
    }

    /// Detaches all hooks. A detach with nothing attached is a no-op.
    pub fn detach(&mut self) -> Result<(), ProbeError> {
        if self.state == AttachState::Unattached {
            debug!("detach: probe set already unattached");
            return Ok(());
        }
        if !self.state.can_detach() {
            return Err(ProbeError::InvalidState {
                op: "detach",
                state: self.state,
            });
        }

        self.state = AttachState::Detaching;

        let mut first_err = None;
        for (name, link) in std::mem::take(&mut self.links) {
            let result = self.kprobe_mut(name).and_then(|program| {
                program.detach(link).map_err(|source| ProbeError::Detach {
                    program: name,
                    source,
                })
            });
            match result {
                Ok(()) => info!("  Detached from {}", name),
                Err(e) => {
                    warn!("failed to detach {}: {}", name, e);
                    first_err.get_or_insert(e);
                }
            }
        }

        self.state = AttachState::Unattached;
        match first_err {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    fn kprobe_mut(&mut self, name: &'static str) -> Result<&mut KProbe, ProbeError> {
        self.ebpf
            .program_mut(name)
            .ok_or(ProbeError::ProgramNotFound(name))?
            .try_into()
            .map_err(|_| ProbeError::ProgramType(name))
    }

    /// Takes the per-CPU perf array the handlers write accepted records
    /// to. The caller owns the read side from here on.
    pub fn take_event_array(&mut self) -> Result<AsyncPerfEventArray<MapData>, ProbeError> {
        let map = self
            .ebpf
            .take_map(EVENTS_MAP)
            .ok_or(ProbeError::MapNotFound(EVENTS_MAP))?;
        AsyncPerfEventArray::try_from(map).map_err(|source| ProbeError::Map {
            name: EVENTS_MAP,
            source,
        })
    }

    /// Takes the pid membership map as a control-plane handle.
    pub fn take_filter_control(&mut self) -> Result<FilterControl, ProbeError> {
        let map = self
            .ebpf
            .take_map(FILTER_PIDS_MAP)
            .ok_or(ProbeError::MapNotFound(FILTER_PIDS_MAP))?;
        let pids = AyaHashMap::try_from(map).map_err(|source| ProbeError::Map {
            name: FILTER_PIDS_MAP,
            source,
        })?;
        Ok(FilterControl::new(pids))
    }

    /// Sums the per-CPU capture counters.
    pub fn kernel_stats(&self) -> Result<KernelStats, ProbeError> {
        let map = self
            .ebpf
            .map(STATS_MAP)
            .ok_or(ProbeError::MapNotFound(STATS_MAP))?;
        let stats: PerCpuArray<&MapData, u64> =
            PerCpuArray::try_from(map).map_err(|source| ProbeError::Map {
                name: STATS_MAP,
                source,
            })?;

        let mut totals = [0u64; MAX_STATS as usize];
        for (index, total) in totals.iter_mut().enumerate() {
            let values = stats
                .get(&(index as u32), 0)
                .map_err(|source| ProbeError::Map {
                    name: STATS_MAP,
                    source,
                })?;
            *total = values.iter().sum();
        }

        Ok(KernelStats {
            seen: totals[STAT_SEEN as usize],
            accepted: totals[STAT_ACCEPTED as usize],
            filtered: totals[STAT_FILTERED as usize],
            parent_miss: totals[STAT_PARENT_MISS as usize],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_allowed_only_when_unattached() {
        assert!(AttachState::Unattached.can_attach());
        assert!(!AttachState::Attached.can_attach());
        // No path back into Attached from Detaching
        assert!(!AttachState::Detaching.can_attach());
    }

    #[test]
    fn test_detach_allowed_only_when_attached() {
        assert!(AttachState::Attached.can_detach());
        assert!(!AttachState::Unattached.can_detach());
        assert!(!AttachState::Detaching.can_detach());
    }

    #[test]
    fn test_entry_points_cover_the_tcp_lifecycle() {
        assert_eq!(
            TCP_ENTRY_POINTS,
            ["tcp_v4_connect", "tcp_sendmsg", "tcp_recvmsg", "tcp_close"]
        );
    }
}
