//! Built-in plugins.
//!
//! A small set of plugins that ship with the engine:
//!
//! - [`NullInput`]: generates null packets (stuffing source)
//! - [`FileInput`] / [`FileOutput`]: raw fixed-size packets on disk
//! - [`MemoryInput`] / [`MemoryOutput`]: in-memory packet vectors, for
//!   embedding and tests
//! - [`DropOutput`]: discards everything (benchmarking, draining)
//! - [`PassThrough`] / [`NullFilter`]: identity and stuffing-stripping
//!   processors
//!
//! Real deployments register their own plugins on a
//! [`PluginRegistry`](crate::plugin::PluginRegistry); these cover the
//! common scaffolding cases.

mod file;
mod memory;
mod null;
mod transform;

pub use file::{FileInput, FileOutput};
pub use memory::{MemoryInput, MemoryOutput, MemorySink};
pub use null::{DropOutput, NullInput};
pub use transform::{NullFilter, PassThrough};

use crate::plugin::PluginRegistry;

/// Register every built-in plugin on a registry under its usual name.
pub fn register_builtins(registry: &PluginRegistry) {
    registry.register_input("null", || NullInput::endless());
    registry.register_input("file", FileInput::new);
    registry.register_processor("pass", PassThrough::new);
    registry.register_processor("filter-null", NullFilter::new);
    registry.register_output("file", FileOutput::new);
    registry.register_output("drop", DropOutput::new);
}
