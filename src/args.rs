//! Pipeline configuration.
//!
//! The binding layer (CLI, FFI, embedding application) is responsible for
//! collecting and transferring configuration values; the engine only
//! re-validates what it owns: input and output plugin names must be
//! non-empty, and every negative numeric field is clamped to zero before
//! use. A zero buffer size falls back to [`DEFAULT_BUFFER_SIZE`].

use crate::error::{Error, Result};
use std::fmt;

/// Default inter-stage buffer capacity, in packets.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Default bound on packets moved by one processor/output cycle.
pub const DEFAULT_MAX_FLUSH_PKT: usize = 512;

/// Default bound on packets pulled from the input plugin per cycle.
pub const DEFAULT_MAX_INPUT_PKT: usize = 128;

/// Default bitrate adjustment interval in milliseconds.
pub const DEFAULT_BITRATE_ADJ: u64 = 5_000;

/// The role a plugin plays in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginRole {
    /// Produces packets (head of the pipeline).
    Input,
    /// Transforms packets in the middle of the pipeline.
    Processor,
    /// Consumes packets (tail of the pipeline).
    Output,
}

impl PluginRole {
    /// Command-line flag used when rendering a pipeline description.
    pub fn flag(&self) -> &'static str {
        match self {
            PluginRole::Input => "-I",
            PluginRole::Processor => "-P",
            PluginRole::Output => "-O",
        }
    }
}

/// Identifies a plugin implementation and its configuration arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginOptions {
    /// Registered plugin name. Must be non-empty for input and output.
    pub name: String,
    /// Ordered plugin arguments, passed verbatim to the plugin's `start`.
    pub args: Vec<String>,
}

impl PluginOptions {
    /// Create options for a plugin with no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Create options with arguments.
    pub fn with_args<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether no plugin name was supplied.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// Render as a command-line fragment for the given role,
    /// e.g. `-P filter-null`.
    pub fn to_command_line(&self, role: PluginRole) -> String {
        let mut out = format!("{} {}", role.flag(), self.name);
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

impl fmt::Display for PluginOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Aggregate configuration for one pipeline run.
///
/// Construct via [`ProcessorArgs::builder`] when values come from a
/// binding layer that may carry negative integers; the builder clamps
/// them to zero. Fields are public so embedding code can also fill the
/// struct directly.
#[derive(Debug, Clone)]
pub struct ProcessorArgs {
    /// Packet size in bytes, fixed for the lifetime of the pipeline
    /// instance. Zero means [`crate::packet::DEFAULT_PACKET_SIZE`].
    pub packet_size: usize,
    /// Inter-stage buffer size in packets. Zero means [`DEFAULT_BUFFER_SIZE`].
    pub buffer_size: usize,
    /// Max packets flushed by one processor/output cycle. Zero means default.
    pub max_flush_pkt: usize,
    /// Max packets pulled from the input plugin per cycle. Zero means default.
    pub max_input_pkt: usize,
    /// Packets pulled on the very first input cycle. Zero means `max_input_pkt`.
    pub init_input_pkt: usize,
    /// Null packets injected before the first real input packet.
    pub instuff_start: usize,
    /// Null packets injected after the last real packet on shutdown.
    pub instuff_stop: usize,
    /// Null packets per `instuff_inpkt` real input packets (ratio rule).
    pub instuff_nullpkt: usize,
    /// Real input packets per `instuff_nullpkt` null packets (ratio rule).
    pub instuff_inpkt: usize,
    /// Target bitrate in packets per second. Zero means unconstrained
    /// (the pipeline runs at the input plugin's natural rate).
    pub fixed_bitrate: u64,
    /// Bitrate adjustment window in milliseconds.
    pub bitrate_adj: u64,
    /// Timeout for a stage's wait on an empty buffer, in milliseconds.
    /// Zero means block indefinitely.
    pub receive_timeout: u64,
    /// Enable the periodic buffer/bitrate monitor.
    pub monitor: bool,
    /// Disable joint termination entirely.
    pub ignore_jt: bool,
    /// Distinguish stages by index in diagnostics.
    pub log_plugin_index: bool,
    /// Application name used in the assembled pipeline description.
    pub app_name: String,
    /// Input plugin description. Name must be non-empty.
    pub input: PluginOptions,
    /// Intermediate processor plugins, in pipeline order. May be empty.
    pub plugins: Vec<PluginOptions>,
    /// Output plugin description. Name must be non-empty.
    pub output: PluginOptions,
}

impl Default for ProcessorArgs {
    fn default() -> Self {
        Self {
            packet_size: 0,
            buffer_size: 0,
            max_flush_pkt: 0,
            max_input_pkt: 0,
            init_input_pkt: 0,
            instuff_start: 0,
            instuff_stop: 0,
            instuff_nullpkt: 0,
            instuff_inpkt: 0,
            fixed_bitrate: 0,
            bitrate_adj: DEFAULT_BITRATE_ADJ,
            receive_timeout: 0,
            monitor: false,
            ignore_jt: false,
            log_plugin_index: false,
            app_name: "tspump".to_string(),
            input: PluginOptions::default(),
            plugins: Vec::new(),
            output: PluginOptions::default(),
        }
    }
}

impl ProcessorArgs {
    /// Start building arguments from raw (possibly negative) values.
    pub fn builder() -> ProcessorArgsBuilder {
        ProcessorArgsBuilder::new()
    }

    /// Validate the parts of the configuration the engine owns.
    ///
    /// The engine does not second-guess the binding layer beyond this:
    /// input and output plugin names must be non-empty, and a non-zero
    /// target bitrate with a zero adjustment interval is rejected rather
    /// than dividing by it later.
    pub fn validate(&self) -> Result<()> {
        if self.input.is_empty() {
            return Err(Error::InvalidConfiguration(
                "input plugin name is empty".into(),
            ));
        }
        if self.output.is_empty() {
            return Err(Error::InvalidConfiguration(
                "output plugin name is empty".into(),
            ));
        }
        if self.fixed_bitrate > 0 && self.bitrate_adj == 0 {
            return Err(Error::InvalidConfiguration(
                "fixed bitrate requires a non-zero adjustment interval".into(),
            ));
        }
        Ok(())
    }

    /// Resolve zero/unset fields to their default constants.
    pub fn normalized(&self) -> Self {
        let mut args = self.clone();
        if args.packet_size == 0 {
            args.packet_size = crate::packet::DEFAULT_PACKET_SIZE;
        }
        if args.buffer_size == 0 {
            args.buffer_size = DEFAULT_BUFFER_SIZE;
        }
        if args.max_flush_pkt == 0 {
            args.max_flush_pkt = DEFAULT_MAX_FLUSH_PKT;
        }
        if args.max_input_pkt == 0 {
            args.max_input_pkt = DEFAULT_MAX_INPUT_PKT;
        }
        if args.init_input_pkt == 0 {
            args.init_input_pkt = args.max_input_pkt;
        }
        args
    }

    /// Whether the a-nulls-per-b-reals stuffing rule is active.
    pub fn input_stuffing_enabled(&self) -> bool {
        self.instuff_nullpkt > 0 && self.instuff_inpkt > 0
    }

    /// Assemble the command-line-equivalent description of the pipeline,
    /// e.g. `tspump -I file in.ts -P filter-null -O drop`.
    pub fn to_command_line(&self) -> String {
        let mut cmd = self.app_name.clone();
        cmd.push(' ');
        cmd.push_str(&self.input.to_command_line(PluginRole::Input));
        for plugin in &self.plugins {
            cmd.push(' ');
            cmd.push_str(&plugin.to_command_line(PluginRole::Processor));
        }
        cmd.push(' ');
        cmd.push_str(&self.output.to_command_line(PluginRole::Output));
        cmd
    }
}

/// Builder accepting raw signed integers from a binding layer.
///
/// Negative values are clamped to zero, matching the engine's numeric
/// policy; zero then falls through to the default constants at
/// normalization time.
#[derive(Debug, Default)]
pub struct ProcessorArgsBuilder {
    args: ProcessorArgs,
}

fn clamp(value: i64) -> usize {
    value.max(0) as usize
}

fn clamp_u64(value: i64) -> u64 {
    value.max(0) as u64
}

impl ProcessorArgsBuilder {
    /// Create a builder with all-default arguments.
    pub fn new() -> Self {
        Self {
            args: ProcessorArgs::default(),
        }
    }

    /// Packet size in bytes.
    pub fn packet_size(mut self, value: i64) -> Self {
        self.args.packet_size = clamp(value);
        self
    }

    /// Inter-stage buffer size in packets.
    pub fn buffer_size(mut self, value: i64) -> Self {
        self.args.buffer_size = clamp(value);
        self
    }

    /// Max packets flushed per cycle.
    pub fn max_flush_pkt(mut self, value: i64) -> Self {
        self.args.max_flush_pkt = clamp(value);
        self
    }

    /// Max packets read from the input plugin per cycle.
    pub fn max_input_pkt(mut self, value: i64) -> Self {
        self.args.max_input_pkt = clamp(value);
        self
    }

    /// Packets read on the first input cycle.
    pub fn init_input_pkt(mut self, value: i64) -> Self {
        self.args.init_input_pkt = clamp(value);
        self
    }

    /// Null packets injected at pipeline start.
    pub fn instuff_start(mut self, value: i64) -> Self {
        self.args.instuff_start = clamp(value);
        self
    }

    /// Null packets injected at pipeline stop.
    pub fn instuff_stop(mut self, value: i64) -> Self {
        self.args.instuff_stop = clamp(value);
        self
    }

    /// Null packets per `instuff_inpkt` real packets.
    pub fn instuff_nullpkt(mut self, value: i64) -> Self {
        self.args.instuff_nullpkt = clamp(value);
        self
    }

    /// Real packets per `instuff_nullpkt` null packets.
    pub fn instuff_inpkt(mut self, value: i64) -> Self {
        self.args.instuff_inpkt = clamp(value);
        self
    }

    /// Target bitrate in packets per second (0 = unconstrained).
    pub fn fixed_bitrate(mut self, value: i64) -> Self {
        self.args.fixed_bitrate = clamp_u64(value);
        self
    }

    /// Bitrate adjustment interval in milliseconds.
    pub fn bitrate_adj(mut self, value: i64) -> Self {
        self.args.bitrate_adj = clamp_u64(value);
        self
    }

    /// Receive timeout in milliseconds (0 = infinite).
    pub fn receive_timeout(mut self, value: i64) -> Self {
        self.args.receive_timeout = clamp_u64(value);
        self
    }

    /// Enable the monitor.
    pub fn monitor(mut self, value: bool) -> Self {
        self.args.monitor = value;
        self
    }

    /// Disable joint termination.
    pub fn ignore_jt(mut self, value: bool) -> Self {
        self.args.ignore_jt = value;
        self
    }

    /// Distinguish stages by index in diagnostics.
    pub fn log_plugin_index(mut self, value: bool) -> Self {
        self.args.log_plugin_index = value;
        self
    }

    /// Application name used in diagnostics.
    pub fn app_name(mut self, value: impl Into<String>) -> Self {
        self.args.app_name = value.into();
        self
    }

    /// Input plugin description.
    pub fn input(mut self, options: PluginOptions) -> Self {
        self.args.input = options;
        self
    }

    /// Append an intermediate processor plugin.
    pub fn plugin(mut self, options: PluginOptions) -> Self {
        self.args.plugins.push(options);
        self
    }

    /// Output plugin description.
    pub fn output(mut self, options: PluginOptions) -> Self {
        self.args.output = options;
        self
    }

    /// Finish building.
    pub fn build(self) -> ProcessorArgs {
        self.args
    }
}
