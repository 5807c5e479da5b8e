//! Packet transform plugins.

use crate::error::Result;
use crate::packet::Packet;
use crate::plugin::{Plugin, ProcessorPlugin};

/// A processor that forwards every packet untouched.
///
/// Useful as a placeholder stage and for measuring the cost of the
/// pipeline machinery itself.
pub struct PassThrough {
    name: String,
    count: u64,
}

impl PassThrough {
    /// Create a new PassThrough.
    pub fn new() -> Self {
        Self {
            name: "pass".to_string(),
            count: 0,
        }
    }

    /// Number of packets forwarded so far.
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Default for PassThrough {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for PassThrough {
    fn name(&self) -> &str {
        &self.name
    }
}

impl ProcessorPlugin for PassThrough {
    fn process(&mut self, packets: Vec<Packet>) -> Result<Vec<Packet>> {
        self.count += packets.len() as u64;
        Ok(packets)
    }
}

/// A processor that drops engine-injected stuffing packets.
///
/// The inverse of input stuffing: everything the stuffing rules added
/// upstream is removed again, leaving only real packets.
pub struct NullFilter {
    name: String,
    dropped: u64,
}

impl NullFilter {
    /// Create a new NullFilter.
    pub fn new() -> Self {
        Self {
            name: "filter-null".to_string(),
            dropped: 0,
        }
    }

    /// Number of stuffing packets dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for NullFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for NullFilter {
    fn name(&self) -> &str {
        &self.name
    }
}

impl ProcessorPlugin for NullFilter {
    fn process(&mut self, packets: Vec<Packet>) -> Result<Vec<Packet>> {
        let before = packets.len();
        let kept: Vec<Packet> = packets.into_iter().filter(|p| !p.is_null()).collect();
        self.dropped += (before - kept.len()) as u64;
        Ok(kept)
    }
}
