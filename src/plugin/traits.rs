//! Core plugin traits.

use crate::error::Result;
use crate::packet::Packet;

/// Lifecycle hooks shared by every plugin, regardless of role.
pub trait Plugin: Send {
    /// Name of this plugin (for diagnostics).
    fn name(&self) -> &str;

    /// Start the plugin with its configuration arguments.
    ///
    /// Called once by the stage before any packet moves. A failure here
    /// is a plugin failure and aborts the pipeline.
    fn start(&mut self, _args: &[String]) -> Result<()> {
        Ok(())
    }

    /// Stop the plugin. Called once when the stage exits, whatever the
    /// cause.
    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    /// Whether this plugin opts into joint termination.
    ///
    /// When every opted-in stage has finished, the whole pipeline stops
    /// gracefully (unless joint termination is disabled in the
    /// configuration).
    fn joint_termination(&self) -> bool {
        false
    }

    /// Whether this plugin has finished its useful work.
    ///
    /// Polled by the stage after each cycle. Only meaningful for plugins
    /// that opt into joint termination: the stage reports the plugin as
    /// terminated to the coordinator and keeps moving packets until the
    /// pipeline stops.
    fn is_terminated(&self) -> bool {
        false
    }

    /// Bitrate this plugin would like to run at, in packets per second.
    ///
    /// Input plugins may report their natural rate here. `None` means no
    /// opinion.
    fn bitrate(&self) -> Option<u64> {
        None
    }
}

/// A plugin that produces packets.
pub trait InputPlugin: Plugin {
    /// Receive up to `max_count` packets.
    ///
    /// Returns an empty batch to signal end of stream. The call is
    /// synchronous and expected to return promptly; pacing is the
    /// engine's job.
    fn receive(&mut self, max_count: usize) -> Result<Vec<Packet>>;
}

/// A plugin that transforms packets.
pub trait ProcessorPlugin: Plugin {
    /// Process a batch of packets.
    ///
    /// The returned batch replaces the input: packets may be dropped,
    /// duplicated, or rewritten in place. Order of surviving packets is
    /// preserved by the engine.
    fn process(&mut self, packets: Vec<Packet>) -> Result<Vec<Packet>>;
}

/// A plugin that consumes packets.
pub trait OutputPlugin: Plugin {
    /// Send a batch of packets to the sink.
    fn send(&mut self, packets: &[Packet]) -> Result<()>;
}
