//! Inclusion filter configuration and predicates
//!
//! The filter decides whether an assembled event is exported. It is pure:
//! the membership lookup for `PidSet` mode happens at the call site (a BPF
//! hash map in-kernel, a plain set in tests) and its result is passed in.

use crate::types::TcpEvent;

/// Which predicate the capture path applies before export
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterMode {
    /// Export every event
    All = 0,
    /// Export events whose command name starts with the configured byte
    CommPrefix = 1,
    /// Export events by pid membership in the dynamic set
    PidSet = 2,
}

/// Membership polarity for `FilterMode::PidSet`
///
/// Explicit so the empty-set behavior is a stated configuration rather
/// than a hidden convention.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterPolarity {
    /// Listed pids are accepted, all others rejected. An empty set
    /// rejects everything (default closed).
    AcceptListed = 0,
    /// Listed pids are rejected, all others accepted
    RejectListed = 1,
}

impl FilterPolarity {
    /// Applies the polarity to a membership lookup result.
    #[inline]
    pub const fn accepts(self, listed: bool) -> bool {
        match self {
            FilterPolarity::AcceptListed => listed,
            FilterPolarity::RejectListed => !listed,
        }
    }
}

/// Filter configuration shared between the daemon and the probe object
///
/// The daemon writes it into the object's read-only data before load;
/// every handler invocation reads it. It never changes while attached.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct FilterConfig {
    pub mode: FilterMode,
    pub polarity: FilterPolarity,
    /// Byte compared against `comm[0]` in `CommPrefix` mode
    pub prefix: u8,
}

impl FilterConfig {
    /// Capture everything.
    pub const ALL: FilterConfig = FilterConfig {
        mode: FilterMode::All,
        polarity: FilterPolarity::AcceptListed,
        prefix: 0,
    };

    /// First-byte command-name filter.
    pub const fn comm_prefix(prefix: u8) -> FilterConfig {
        FilterConfig {
            mode: FilterMode::CommPrefix,
            polarity: FilterPolarity::AcceptListed,
            prefix,
        }
    }

    /// Pid membership filter with the given polarity.
    pub const fn pid_set(polarity: FilterPolarity) -> FilterConfig {
        FilterConfig {
            mode: FilterMode::PidSet,
            polarity,
            prefix: 0,
        }
    }

    /// Whether a record passes the filter. `pid_listed` is the membership
    /// lookup result for `record.pid`; it is only consulted in `PidSet`
    /// mode, so callers may skip the lookup in the other modes.
    #[inline]
    pub fn accepts(&self, record: &TcpEvent, pid_listed: bool) -> bool {
        match self.mode {
            FilterMode::All => true,
            FilterMode::CommPrefix => record.comm[0] == self.prefix,
            FilterMode::PidSet => self.polarity.accepts(pid_listed),
        }
    }
}

#[cfg(feature = "userspace")]
mod userspace_impls {
    use super::*;

    // Pod lets the daemon hand the config to the loader's global-data
    // writer as one value.
    unsafe impl aya::Pod for FilterConfig {}
}
