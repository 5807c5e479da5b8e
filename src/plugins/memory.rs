//! In-memory input and output plugins.
//!
//! The memory pair is how an embedding application (or a test) feeds
//! packets into a pipeline and collects what comes out, without touching
//! the filesystem or the network.

use crate::error::Result;
use crate::packet::Packet;
use crate::plugin::{InputPlugin, OutputPlugin, Plugin};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// An input plugin that plays back a preloaded packet sequence.
pub struct MemoryInput {
    name: String,
    pending: VecDeque<Packet>,
    joint_termination: bool,
}

impl MemoryInput {
    /// Create a MemoryInput that will produce `packets` in order, then
    /// signal end of stream.
    pub fn new(packets: impl IntoIterator<Item = Packet>) -> Self {
        Self {
            name: "memory".to_string(),
            pending: packets.into_iter().collect(),
            joint_termination: false,
        }
    }

    /// Opt this input into joint termination.
    pub fn with_joint_termination(mut self, value: bool) -> Self {
        self.joint_termination = value;
        self
    }

    /// Packets not yet handed to the pipeline.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl Plugin for MemoryInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn joint_termination(&self) -> bool {
        self.joint_termination
    }

    fn is_terminated(&self) -> bool {
        self.pending.is_empty()
    }
}

impl InputPlugin for MemoryInput {
    fn receive(&mut self, max_count: usize) -> Result<Vec<Packet>> {
        let budget = max_count.min(self.pending.len());
        Ok(self.pending.drain(..budget).collect())
    }
}

/// Shared collector behind a [`MemoryOutput`].
///
/// Clone freely; all clones see the same packets.
#[derive(Clone, Default)]
pub struct MemorySink {
    packets: Arc<Mutex<Vec<Packet>>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything received so far, in arrival order.
    pub fn packets(&self) -> Vec<Packet> {
        self.packets.lock().unwrap().clone()
    }

    /// Number of packets received so far.
    pub fn len(&self) -> usize {
        self.packets.lock().unwrap().len()
    }

    /// Whether nothing has been received yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of received packets that are engine-injected stuffing.
    pub fn null_count(&self) -> usize {
        self.packets
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.is_null())
            .count()
    }

    fn push(&self, packets: &[Packet]) {
        self.packets.lock().unwrap().extend_from_slice(packets);
    }
}

/// An output plugin that collects packets into a [`MemorySink`].
pub struct MemoryOutput {
    name: String,
    sink: MemorySink,
}

impl MemoryOutput {
    /// Create a MemoryOutput with a fresh sink.
    pub fn new() -> Self {
        Self::with_sink(MemorySink::new())
    }

    /// Create a MemoryOutput writing into an existing sink.
    pub fn with_sink(sink: MemorySink) -> Self {
        Self {
            name: "memory".to_string(),
            sink,
        }
    }

    /// Handle to the sink this output writes into.
    pub fn sink(&self) -> MemorySink {
        self.sink.clone()
    }
}

impl Default for MemoryOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for MemoryOutput {
    fn name(&self) -> &str {
        &self.name
    }
}

impl OutputPlugin for MemoryOutput {
    fn send(&mut self, packets: &[Packet]) -> Result<()> {
        self.sink.push(packets);
        Ok(())
    }
}
