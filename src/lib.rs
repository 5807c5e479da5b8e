//! tspump: a transport-stream packet pipeline engine.
//!
//! A pipeline is a chain of plugins: one input, zero or more packet
//! processors, one output. The engine moves fixed-size packets through
//! the chain in batches, one tokio task per stage, with bounded
//! inter-stage buffers providing backpressure. Plugin data hooks are
//! synchronous; all waiting (buffer space, pacing delays, cancellation)
//! belongs to the engine.
//!
//! # Quick start
//!
//! ```no_run
//! use tspump::args::{PluginOptions, ProcessorArgs};
//! use tspump::processor::TsProcessor;
//!
//! # async fn run() -> tspump::Result<()> {
//! let args = ProcessorArgs::builder()
//!     .input(PluginOptions::with_args("file", ["input.ts"]))
//!     .plugin(PluginOptions::new("filter-null"))
//!     .output(PluginOptions::with_args("file", ["output.ts"]))
//!     .build();
//!
//! let mut processor = TsProcessor::new();
//! processor.start(args)?;
//! processor.wait_for_termination().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Custom plugins implement [`plugin::InputPlugin`],
//! [`plugin::ProcessorPlugin`], or [`plugin::OutputPlugin`] and register
//! on a [`plugin::PluginRegistry`].

#![warn(missing_docs)]

pub mod args;
pub mod buffer;
pub mod error;
pub mod event;
pub mod monitor;
pub mod packet;
pub mod plugin;
pub mod plugins;
pub mod processor;
pub mod stuffing;
pub mod termination;

mod stage;

pub use error::{Error, Result};

/// Commonly used types, for glob import.
pub mod prelude {
    pub use crate::args::{PluginOptions, PluginRole, ProcessorArgs, ProcessorArgsBuilder};
    pub use crate::error::{Error, Result};
    pub use crate::event::{EventReceiver, EventSender, ProcessorEvent};
    pub use crate::packet::{Packet, PacketMetadata};
    pub use crate::plugin::{InputPlugin, OutputPlugin, Plugin, PluginRegistry, ProcessorPlugin};
    pub use crate::processor::{AbortHandle, PipelineState, TsProcessor};
}
