//! Plugin capability interface.
//!
//! Every pipeline stage wraps one plugin. All plugins share a lifecycle
//! ([`Plugin`]: `start`/`stop`, joint-termination opt-in, declared
//! bitrate) and add exactly one role-specific data-movement hook:
//!
//! - [`InputPlugin`]: `receive` produces packets (head of the pipeline)
//! - [`ProcessorPlugin`]: `process` may drop, duplicate, or rewrite
//! - [`OutputPlugin`]: `send` consumes packets (tail of the pipeline)
//!
//! Data hooks are **synchronous**; the engine handles async scheduling,
//! backpressure, and cancellation around them. A plugin that cannot
//! continue returns an error, which stops its stage and aborts the
//! pipeline.

mod registry;
mod traits;

pub use registry::PluginRegistry;
pub use traits::{InputPlugin, OutputPlugin, Plugin, ProcessorPlugin};
