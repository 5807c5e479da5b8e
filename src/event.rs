//! Processor event system: the injected reporting sink.
//!
//! The engine emits structured diagnostic events during a run; the
//! concrete subscriber may act on them or discard all of them. Events are
//! broadcast, so any number of receivers can watch the same run.

use crate::processor::PipelineState;
use std::fmt;
use tokio::sync::broadcast;

/// Events emitted by the processor during execution.
#[derive(Debug, Clone)]
pub enum ProcessorEvent {
    /// Pipeline lifecycle state has changed.
    StateChanged {
        /// Previous state.
        from: PipelineState,
        /// New state.
        to: PipelineState,
    },

    /// The pipeline started (all stages launched).
    Started,

    /// The pipeline stopped (all stages joined).
    Stopped,

    /// A stage started processing.
    StageStarted {
        /// Stage name (plugin name, with index when configured).
        stage: String,
    },

    /// A stage finished processing.
    StageFinished {
        /// Stage name.
        stage: String,
        /// Number of packets moved by the stage.
        packets: u64,
    },

    /// An error occurred in the pipeline.
    Error {
        /// The error message.
        message: String,
        /// The stage where the error occurred (if known).
        stage: Option<String>,
    },

    /// Warning (non-fatal issue).
    Warning {
        /// The warning message.
        message: String,
        /// The stage that emitted the warning (if known).
        stage: Option<String>,
    },
}

impl fmt::Display for ProcessorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessorEvent::StateChanged { from, to } => {
                write!(f, "StateChanged: {:?} -> {:?}", from, to)
            }
            ProcessorEvent::Started => write!(f, "Pipeline started"),
            ProcessorEvent::Stopped => write!(f, "Pipeline stopped"),
            ProcessorEvent::StageStarted { stage } => write!(f, "Stage {} started", stage),
            ProcessorEvent::StageFinished { stage, packets } => {
                write!(f, "Stage {} finished ({} packets)", stage, packets)
            }
            ProcessorEvent::Error { message, stage } => {
                if let Some(s) = stage {
                    write!(f, "Error in {}: {}", s, message)
                } else {
                    write!(f, "Error: {}", message)
                }
            }
            ProcessorEvent::Warning { message, stage } => {
                if let Some(s) = stage {
                    write!(f, "Warning in {}: {}", s, message)
                } else {
                    write!(f, "Warning: {}", message)
                }
            }
        }
    }
}

/// Sender for processor events.
///
/// Held by the orchestrator and stage tasks and used to emit events.
#[derive(Clone)]
pub struct EventSender {
    sender: broadcast::Sender<ProcessorEvent>,
}

impl EventSender {
    /// Create a new event sender with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send an event.
    ///
    /// Returns the number of receivers that received the event.
    /// Returns 0 if there are no receivers (which is fine).
    pub fn send(&self, event: ProcessorEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Send an error event.
    pub fn send_error(&self, message: impl Into<String>, stage: Option<String>) {
        self.send(ProcessorEvent::Error {
            message: message.into(),
            stage,
        });
    }

    /// Send a warning event.
    pub fn send_warning(&self, message: impl Into<String>, stage: Option<String>) {
        self.send(ProcessorEvent::Warning {
            message: message.into(),
            stage,
        });
    }

    /// Send a state changed event.
    pub fn send_state_changed(&self, from: PipelineState, to: PipelineState) {
        self.send(ProcessorEvent::StateChanged { from, to });
    }

    /// Send a stage started event.
    pub fn send_stage_started(&self, stage: impl Into<String>) {
        self.send(ProcessorEvent::StageStarted {
            stage: stage.into(),
        });
    }

    /// Send a stage finished event.
    pub fn send_stage_finished(&self, stage: impl Into<String>, packets: u64) {
        self.send(ProcessorEvent::StageFinished {
            stage: stage.into(),
            packets,
        });
    }

    /// Create a receiver for events.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Create a stream of events.
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Receiver for processor events.
///
/// Multiple receivers can be created from a single sender.
pub struct EventReceiver {
    receiver: broadcast::Receiver<ProcessorEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` if the sender has been dropped.
    pub async fn recv(&mut self) -> Option<ProcessorEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    // We missed some events, continue to get the next one
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without blocking.
    ///
    /// Returns `None` if no event is available or the sender has been dropped.
    pub fn try_recv(&mut self) -> Option<ProcessorEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    continue;
                }
                Err(_) => return None,
            }
        }
    }

    /// Wait until the pipeline stops or errors.
    ///
    /// Returns `Ok(())` on a clean stop, `Err(message)` on the first error.
    pub async fn wait_stopped(&mut self) -> Result<(), String> {
        while let Some(event) = self.recv().await {
            match event {
                ProcessorEvent::Stopped => return Ok(()),
                ProcessorEvent::Error { message, stage } => {
                    let full_msg = if let Some(s) = stage {
                        format!("Error in {}: {}", s, message)
                    } else {
                        message
                    };
                    return Err(full_msg);
                }
                _ => continue,
            }
        }
        Err("Event channel closed unexpectedly".to_string())
    }
}

/// A stream adapter for receiving events.
///
/// Implements `Stream` for use with async iteration.
pub struct EventStream {
    receiver: EventReceiver,
}

impl EventStream {
    /// Create a new event stream from a receiver.
    pub fn new(receiver: EventReceiver) -> Self {
        Self { receiver }
    }
}

impl futures::Stream for EventStream {
    type Item = ProcessorEvent;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::future::Future;

        let fut = self.receiver.recv();
        tokio::pin!(fut);
        fut.poll(cx)
    }
}
