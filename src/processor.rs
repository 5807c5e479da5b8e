//! Pipeline orchestrator.
//!
//! [`TsProcessor`] owns a pipeline run end to end: it validates the
//! configuration, instantiates the plugins, wires the stage chain with
//! inter-stage buffers, launches one task per stage, and joins them on
//! termination. The instance is reusable: after a completed
//! `wait_for_termination` it is back in [`PipelineState::Idle`] and can be
//! started again with the same or a different configuration.

use crate::args::ProcessorArgs;
use crate::buffer::packet_buffer;
use crate::error::{Error, Result};
use crate::event::{EventReceiver, EventSender, ProcessorEvent};
use crate::monitor;
use crate::plugin::PluginRegistry;
use crate::stage::{
    self, InputStageParams, OutputStageParams, ProcessorStageParams,
};
use crate::stuffing::{BitrateRegulator, InputStuffer};
use crate::termination::JointTermination;
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lifecycle state of a pipeline instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PipelineState {
    /// No pipeline is active. The instance can be configured and started.
    #[default]
    Idle,
    /// All stages are launched and packets are moving.
    Running,
    /// Shutdown is in progress: an abort, error, or joint termination
    /// decision has been taken and stages are winding down.
    Terminating,
    /// All stages have exited and been joined. Transient; the instance
    /// returns to `Idle` before `wait_for_termination` returns.
    Terminated,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Idle => "idle",
            PipelineState::Running => "running",
            PipelineState::Terminating => "terminating",
            PipelineState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// State shared by the orchestrator and every stage task of one run.
pub(crate) struct PipelineShared {
    state: Arc<Mutex<PipelineState>>,
    pub(crate) events: EventSender,
    /// Hard cancellation: abort and stage failure. Unblocks every wait;
    /// in-flight packets may be dropped.
    pub(crate) cancel: CancellationToken,
    /// Graceful stop: joint termination. Only the input stage observes
    /// it; everything already in flight drains to the output.
    pub(crate) stop: CancellationToken,
    pub(crate) termination: JointTermination,
}

impl PipelineShared {
    fn set_terminating(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == PipelineState::Running {
            *state = PipelineState::Terminating;
            self.events
                .send_state_changed(PipelineState::Running, PipelineState::Terminating);
        }
    }

    /// Move to `Terminating` (if not already past `Running`) and cancel
    /// every blocking wait. Idempotent.
    pub(crate) fn enter_terminating(&self) {
        self.set_terminating();
        self.cancel.cancel();
    }

    /// Move to `Terminating` and ask the input stage to stop producing.
    /// The writer drop then propagates end of stream down the chain, so
    /// every packet already accepted still reaches the output plugin.
    /// Idempotent.
    pub(crate) fn enter_stopping(&self) {
        self.set_terminating();
        self.stop.cancel();
    }
}

/// A handle that can abort a running pipeline from another task.
///
/// Cheap to clone; outlives individual runs. Aborting an idle instance is
/// a no-op.
#[derive(Clone)]
pub struct AbortHandle {
    current: Arc<Mutex<Option<Arc<PipelineShared>>>>,
}

impl AbortHandle {
    /// Request an immediate, ungraceful stop of the current run.
    pub fn abort(&self) {
        let shared = self.current.lock().unwrap().clone();
        if let Some(shared) = shared {
            shared.enter_terminating();
        }
    }
}

struct ActiveRun {
    shared: Arc<PipelineShared>,
    tasks: Vec<JoinHandle<Result<()>>>,
    monitor: Option<JoinHandle<()>>,
}

/// The packet pipeline engine.
///
/// ```no_run
/// use tspump::args::{PluginOptions, ProcessorArgs};
/// use tspump::processor::TsProcessor;
///
/// # async fn run() -> tspump::Result<()> {
/// let args = ProcessorArgs::builder()
///     .input(PluginOptions::with_args("null", ["count=1000"]))
///     .plugin(PluginOptions::new("pass"))
///     .output(PluginOptions::new("drop"))
///     .build();
///
/// let mut processor = TsProcessor::new();
/// processor.start(args)?;
/// processor.wait_for_termination().await?;
/// # Ok(())
/// # }
/// ```
pub struct TsProcessor {
    registry: Arc<PluginRegistry>,
    events: EventSender,
    state: Arc<Mutex<PipelineState>>,
    args: Option<ProcessorArgs>,
    current: Arc<Mutex<Option<Arc<PipelineShared>>>>,
    run: Option<ActiveRun>,
}

impl TsProcessor {
    /// Create a processor with the built-in plugin registry.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(PluginRegistry::with_builtins()))
    }

    /// Create a processor reporting into the given event sender.
    ///
    /// Use this to share one diagnostic stream across several pipeline
    /// instances, or to subscribe before the processor exists.
    pub fn with_events(events: EventSender) -> Self {
        let mut processor = Self::new();
        processor.events = events;
        processor
    }

    /// Create a processor using the given plugin registry.
    pub fn with_registry(registry: Arc<PluginRegistry>) -> Self {
        Self {
            registry,
            events: EventSender::default(),
            state: Arc::new(Mutex::new(PipelineState::Idle)),
            args: None,
            current: Arc::new(Mutex::new(None)),
            run: None,
        }
    }

    /// The plugin registry used to instantiate plugins.
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Subscribe to the diagnostic event stream.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap()
    }

    /// A cloneable handle for aborting this instance from another task.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            current: Arc::clone(&self.current),
        }
    }

    /// Validate a configuration and store it for the next start.
    ///
    /// On failure nothing is stored and the previous configuration, if
    /// any, stays in effect.
    pub fn configure(&mut self, args: ProcessorArgs) -> Result<()> {
        if self.is_active() {
            return Err(Error::AlreadyRunning);
        }
        args.validate()?;
        self.args = Some(args);
        Ok(())
    }

    /// Configure and launch the pipeline.
    ///
    /// Fails synchronously, with no side effects, when the configuration
    /// is invalid, a plugin name is unknown, or a pipeline is already
    /// active. On success the instance is [`PipelineState::Running`] and
    /// the caller should eventually call
    /// [`wait_for_termination`](Self::wait_for_termination).
    pub fn start(&mut self, args: ProcessorArgs) -> Result<()> {
        self.configure(args)?;
        self.launch()
    }

    /// Launch the pipeline from the stored configuration.
    pub fn start_configured(&mut self) -> Result<()> {
        self.launch()
    }

    /// Request an immediate, ungraceful stop.
    ///
    /// Safe to call at any time, from any task, any number of times.
    /// Packets in flight may be dropped. A no-op when idle.
    pub fn abort(&self) {
        let shared = self.current.lock().unwrap().clone();
        if let Some(shared) = shared {
            shared.enter_terminating();
        }
    }

    /// Wait until every stage has exited, then release the run.
    ///
    /// Returns the first stage error, if any; a cancelled or cleanly
    /// finished stage is not an error. Afterwards the instance is back in
    /// [`PipelineState::Idle`] and can be started again. A no-op returning
    /// `Ok(())` when no run is active.
    pub async fn wait_for_termination(&mut self) -> Result<()> {
        let Some(run) = self.run.take() else {
            return Ok(());
        };

        let mut first_error: Option<Error> = None;
        for task in run.tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(join_error) => {
                    tracing::error!(error = %join_error, "stage task panicked");
                    if first_error.is_none() {
                        first_error = Some(Error::plugin(
                            "pipeline",
                            format!("stage task panicked: {join_error}"),
                        ));
                    }
                }
            }
        }

        // All stages are gone; take the monitor down with them.
        run.shared.cancel.cancel();
        if let Some(monitor) = run.monitor {
            let _ = monitor.await;
        }
        *self.current.lock().unwrap() = None;

        {
            let mut state = self.state.lock().unwrap();
            let from = *state;
            *state = PipelineState::Terminated;
            self.events
                .send_state_changed(from, PipelineState::Terminated);
        }
        self.events.send(ProcessorEvent::Stopped);
        {
            let mut state = self.state.lock().unwrap();
            *state = PipelineState::Idle;
            self.events
                .send_state_changed(PipelineState::Terminated, PipelineState::Idle);
        }
        tracing::debug!("pipeline terminated");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Whether a run is active (launched and not yet joined).
    fn is_active(&self) -> bool {
        self.run.is_some()
            || matches!(
                self.state(),
                PipelineState::Running | PipelineState::Terminating
            )
    }

    fn launch(&mut self) -> Result<()> {
        if self.is_active() {
            return Err(Error::AlreadyRunning);
        }
        let args = self
            .args
            .as_ref()
            .ok_or_else(|| Error::InvalidConfiguration("processor is not configured".into()))?
            .normalized();

        // Instantiate every plugin up front so an unknown name fails the
        // whole start before anything is spawned.
        let input = self.registry.create_input(&args.input.name)?;
        let processors = args
            .plugins
            .iter()
            .map(|options| self.registry.create_processor(&options.name))
            .collect::<Result<Vec<_>>>()?;
        let output = self.registry.create_output(&args.output.name)?;

        tracing::debug!(command = %args.to_command_line(), "starting pipeline");

        let shared = Arc::new(PipelineShared {
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            cancel: CancellationToken::new(),
            stop: CancellationToken::new(),
            termination: JointTermination::new(args.ignore_jt),
        });

        shared.termination.register(input.joint_termination());
        for plugin in &processors {
            shared.termination.register(plugin.joint_termination());
        }
        shared.termination.register(output.joint_termination());

        let receive_timeout =
            (args.receive_timeout > 0).then(|| Duration::from_millis(args.receive_timeout));
        let stage_count = processors.len() + 2;
        let mut tasks = Vec::with_capacity(stage_count);
        let mut probes = Vec::with_capacity(stage_count - 1);

        let (writer, mut reader) =
            packet_buffer(args.buffer_size, receive_timeout, shared.cancel.clone());
        probes.push(reader.probe());

        tasks.push(stage::spawn_input_stage(
            InputStageParams {
                name: stage::stage_label(&args.input.name, 0, args.log_plugin_index),
                plugin: input,
                args: args.input.args.clone(),
                writer,
                init_input_pkt: args.init_input_pkt,
                max_input_pkt: args.max_input_pkt,
                packet_size: args.packet_size,
                instuff_start: args.instuff_start,
                instuff_stop: args.instuff_stop,
                stuffer: InputStuffer::new(args.instuff_nullpkt, args.instuff_inpkt),
                regulator: BitrateRegulator::new(args.fixed_bitrate, args.bitrate_adj),
            },
            Arc::clone(&shared),
        ));

        for (index, (plugin, options)) in processors.into_iter().zip(&args.plugins).enumerate() {
            let (next_writer, next_reader) =
                packet_buffer(args.buffer_size, receive_timeout, shared.cancel.clone());
            probes.push(next_reader.probe());
            tasks.push(stage::spawn_processor_stage(
                ProcessorStageParams {
                    name: stage::stage_label(&options.name, index + 1, args.log_plugin_index),
                    plugin,
                    args: options.args.clone(),
                    reader,
                    writer: next_writer,
                    max_flush_pkt: args.max_flush_pkt,
                },
                Arc::clone(&shared),
            ));
            reader = next_reader;
        }

        let sent = Arc::new(AtomicU64::new(0));
        tasks.push(stage::spawn_output_stage(
            OutputStageParams {
                name: stage::stage_label(&args.output.name, stage_count - 1, args.log_plugin_index),
                plugin: output,
                args: args.output.args.clone(),
                reader,
                max_flush_pkt: args.max_flush_pkt,
                sent: Arc::clone(&sent),
            },
            Arc::clone(&shared),
        ));

        let monitor = args
            .monitor
            .then(|| monitor::spawn_monitor(probes, sent, shared.cancel.clone()));

        {
            let mut state = self.state.lock().unwrap();
            let from = *state;
            *state = PipelineState::Running;
            self.events.send_state_changed(from, PipelineState::Running);
        }
        self.events.send(ProcessorEvent::Started);

        *self.current.lock().unwrap() = Some(Arc::clone(&shared));
        self.run = Some(ActiveRun {
            shared,
            tasks,
            monitor,
        });
        Ok(())
    }
}

impl Default for TsProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TsProcessor {
    fn drop(&mut self) {
        // Detached stage tasks must not outlive the instance.
        self.abort();
    }
}
