//! Filter selection and the membership-set control plane
//!
//! `FilterSpec` is the command-line side: which configuration gets
//! patched into the object and which pids get installed after attach.
//! `FilterControl` is the live side: updates to the in-kernel membership
//! set. Updates race with in-flight handler invocations by design; an
//! event close to an update may be judged against either state.

use anyhow::{bail, Result};
use aya::maps::{HashMap as AyaHashMap, MapData, MapError};
use log::debug;
use tcptap_common::{FilterConfig, FilterMode, FilterPolarity};

/// Filter selection derived from the command line
#[derive(Debug, Clone)]
pub struct FilterSpec {
    /// Configuration patched into the object's read-only data
    pub config: FilterConfig,
    /// Pids to install into the membership set after attach
    pub pids: Vec<u32>,
}

impl FilterSpec {
    /// Capture everything.
    pub fn all() -> FilterSpec {
        FilterSpec {
            config: FilterConfig::ALL,
            pids: Vec::new(),
        }
    }

    /// Single-byte prefix filter. The prefix must be ASCII because the
    /// kernel compares exactly one byte.
    pub fn comm_prefix(prefix: char) -> Result<FilterSpec> {
        if !prefix.is_ascii() {
            bail!("Prefix must be a single ASCII character, got {:?}", prefix);
        }
        Ok(FilterSpec {
            config: FilterConfig::comm_prefix(prefix as u8),
            pids: Vec::new(),
        })
    }

    /// Membership filter over the given pids.
    pub fn pid_set(pids: Vec<u32>, polarity: FilterPolarity) -> FilterSpec {
        FilterSpec {
            config: FilterConfig::pid_set(polarity),
            pids,
        }
    }

    /// One-line description for the startup log.
    pub fn describe(&self) -> String {
        match self.config.mode {
            FilterMode::All => "all events".to_string(),
            FilterMode::CommPrefix => {
                format!("command name starts with {:?}", self.config.prefix as char)
            }
            FilterMode::PidSet => {
                let scope = match self.config.polarity {
                    FilterPolarity::AcceptListed => "only",
                    FilterPolarity::RejectListed => "all except",
                };
                format!("{} {} listed pid(s)", scope, self.pids.len())
            }
        }
    }
}

/// Handle on the in-kernel pid membership set
///
/// The capture path only reads the set; every write goes through here.
pub struct FilterControl {
    pids: AyaHashMap<MapData, u32, u8>,
}

impl FilterControl {
    pub(crate) fn new(pids: AyaHashMap<MapData, u32, u8>) -> FilterControl {
        FilterControl { pids }
    }

    /// Adds a pid to the membership set.
    pub fn add(&mut self, pid: u32) -> Result<(), MapError> {
        debug!("filter set: adding pid {}", pid);
        self.pids.insert(pid, 1u8, 0)
    }

    /// Removes a pid from the membership set.
    pub fn remove(&mut self, pid: u32) -> Result<(), MapError> {
        debug!("filter set: removing pid {}", pid);
        self.pids.remove(&pid)
    }
}
