//! Null input and drop output plugins.

use crate::error::Result;
use crate::packet::{Packet, DEFAULT_PACKET_SIZE};
use crate::plugin::{InputPlugin, OutputPlugin, Plugin};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An input plugin that produces null packets.
///
/// This is useful for:
/// - Generating a stuffing-only stream at a fixed bitrate
/// - Testing downstream stages without a real source
/// - Benchmarking pipeline throughput
///
/// Arguments (passed via `PluginOptions::args`):
/// - `count=N`: produce N packets, then end of stream (default: endless)
/// - `size=N`: packet size in bytes (default: 188)
pub struct NullInput {
    name: String,
    /// Packets to produce; `None` means endless.
    count: Option<u64>,
    produced: u64,
    packet_size: usize,
}

impl NullInput {
    /// Create a NullInput that produces `count` packets, then EOS.
    pub fn new(count: u64) -> Self {
        Self {
            name: "null".to_string(),
            count: Some(count),
            produced: 0,
            packet_size: DEFAULT_PACKET_SIZE,
        }
    }

    /// Create a NullInput that never runs out.
    pub fn endless() -> Self {
        Self {
            name: "null".to_string(),
            count: None,
            produced: 0,
            packet_size: DEFAULT_PACKET_SIZE,
        }
    }

    /// Set the packet size in bytes.
    pub fn with_packet_size(mut self, size: usize) -> Self {
        self.packet_size = size.max(1);
        self
    }

    /// Number of packets produced so far.
    pub fn produced(&self) -> u64 {
        self.produced
    }
}

impl Plugin for NullInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, args: &[String]) -> Result<()> {
        for arg in args {
            if let Some(value) = arg.strip_prefix("count=") {
                self.count = value.parse::<u64>().ok();
            } else if let Some(value) = arg.strip_prefix("size=") {
                if let Ok(size) = value.parse::<usize>() {
                    self.packet_size = size.max(1);
                }
            }
        }
        Ok(())
    }
}

impl InputPlugin for NullInput {
    fn receive(&mut self, max_count: usize) -> Result<Vec<Packet>> {
        let budget = match self.count {
            Some(count) => (count.saturating_sub(self.produced) as usize).min(max_count),
            None => max_count,
        };
        let batch: Vec<Packet> = (0..budget).map(|_| Packet::null(self.packet_size)).collect();
        self.produced += batch.len() as u64;
        Ok(batch)
    }
}

/// An output plugin that discards all packets.
///
/// Counts what it drops, so it doubles as a packet counter at the end of
/// a pipeline.
pub struct DropOutput {
    name: String,
    count: Arc<AtomicU64>,
}

impl DropOutput {
    /// Create a new DropOutput.
    pub fn new() -> Self {
        Self {
            name: "drop".to_string(),
            count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared handle to the packet counter.
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.count)
    }

    /// Number of packets discarded so far.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for DropOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for DropOutput {
    fn name(&self) -> &str {
        &self.name
    }
}

impl OutputPlugin for DropOutput {
    fn send(&mut self, packets: &[Packet]) -> Result<()> {
        self.count.fetch_add(packets.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}
