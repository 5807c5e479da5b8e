//! Stage tasks.
//!
//! Each pipeline stage runs as one tokio task wrapping one plugin. The
//! plugin hooks themselves are synchronous; the stage owns all waiting:
//! buffer backpressure, regulator delays, and cancellation. Data moves in
//! batches bounded by the cycle budgets from the configuration.
//!
//! All three stage kinds share the same shape: start the plugin, loop
//! until end of stream or cancellation, stop the plugin, report. A
//! cancelled stage exits cleanly; a failing one emits an error event and
//! tears the pipeline down.

use crate::buffer::{BufferReader, BufferWriter};
use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::plugin::{InputPlugin, OutputPlugin, ProcessorPlugin};
use crate::processor::PipelineShared;
use crate::stuffing::{BitrateRegulator, InputStuffer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Label a stage for events and logs: the plugin name, optionally
/// prefixed with its position in the chain.
pub(crate) fn stage_label(name: &str, index: usize, with_index: bool) -> String {
    if with_index {
        format!("{}#{}", name, index)
    } else {
        name.to_string()
    }
}

/// Everything the input stage task needs.
pub(crate) struct InputStageParams {
    pub name: String,
    pub plugin: Box<dyn InputPlugin>,
    pub args: Vec<String>,
    pub writer: BufferWriter,
    /// Cycle budget for the very first receive call.
    pub init_input_pkt: usize,
    /// Cycle budget for every later receive call.
    pub max_input_pkt: usize,
    pub packet_size: usize,
    pub instuff_start: usize,
    pub instuff_stop: usize,
    pub stuffer: Option<InputStuffer>,
    pub regulator: Option<BitrateRegulator>,
}

/// Everything a processor stage task needs.
pub(crate) struct ProcessorStageParams {
    pub name: String,
    pub plugin: Box<dyn ProcessorPlugin>,
    pub args: Vec<String>,
    pub reader: BufferReader,
    pub writer: BufferWriter,
    pub max_flush_pkt: usize,
}

/// Everything the output stage task needs.
pub(crate) struct OutputStageParams {
    pub name: String,
    pub plugin: Box<dyn OutputPlugin>,
    pub args: Vec<String>,
    pub reader: BufferReader,
    pub max_flush_pkt: usize,
    /// Total packets delivered to the sink, read by the monitor.
    pub sent: Arc<AtomicU64>,
}

pub(crate) fn spawn_input_stage(
    mut params: InputStageParams,
    shared: Arc<PipelineShared>,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        let name = params.name.clone();
        tracing::debug!(stage = %name, "input stage started");
        shared.events.send_stage_started(&name);

        let mut moved = 0u64;
        let result = input_loop(&mut params, &shared, &mut moved).await;
        if let Err(e) = params.plugin.stop() {
            tracing::warn!(stage = %name, error = %e, "plugin stop failed");
            shared
                .events
                .send_warning(format!("plugin stop failed: {}", e), Some(name.clone()));
        }
        finish_stage(&name, moved, result, &shared)
    })
}

pub(crate) fn spawn_processor_stage(
    mut params: ProcessorStageParams,
    shared: Arc<PipelineShared>,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        let name = params.name.clone();
        tracing::debug!(stage = %name, "processor stage started");
        shared.events.send_stage_started(&name);

        let mut moved = 0u64;
        let result = processor_loop(&mut params, &shared, &mut moved).await;
        if let Err(e) = params.plugin.stop() {
            tracing::warn!(stage = %name, error = %e, "plugin stop failed");
            shared
                .events
                .send_warning(format!("plugin stop failed: {}", e), Some(name.clone()));
        }
        finish_stage(&name, moved, result, &shared)
    })
}

pub(crate) fn spawn_output_stage(
    mut params: OutputStageParams,
    shared: Arc<PipelineShared>,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        let name = params.name.clone();
        tracing::debug!(stage = %name, "output stage started");
        shared.events.send_stage_started(&name);

        let mut moved = 0u64;
        let result = output_loop(&mut params, &shared, &mut moved).await;
        if let Err(e) = params.plugin.stop() {
            tracing::warn!(stage = %name, error = %e, "plugin stop failed");
            shared
                .events
                .send_warning(format!("plugin stop failed: {}", e), Some(name.clone()));
        }
        finish_stage(&name, moved, result, &shared)
    })
}

/// Common stage epilogue. Cancellation is a clean exit; any other error
/// is reported and aborts the whole pipeline.
fn finish_stage(
    name: &str,
    moved: u64,
    result: Result<()>,
    shared: &PipelineShared,
) -> Result<()> {
    match result {
        Ok(()) => {
            tracing::debug!(stage = %name, packets = moved, "stage finished");
            shared.events.send_stage_finished(name, moved);
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            tracing::debug!(stage = %name, packets = moved, "stage cancelled");
            shared.events.send_stage_finished(name, moved);
            Ok(())
        }
        Err(e) => {
            tracing::error!(stage = %name, error = %e, "stage failed");
            shared.events.send_error(e.to_string(), Some(name.to_string()));
            shared.enter_terminating();
            Err(e)
        }
    }
}

/// Report an opted-in plugin as terminated, once. When this completes
/// the quorum the pipeline is stopped gracefully: the input stops
/// producing and the chain drains to end of stream, so nothing already
/// in flight is lost.
fn mark_jt(name: &str, jt_marked: &mut bool, shared: &PipelineShared) {
    if *jt_marked {
        return;
    }
    *jt_marked = true;
    if shared.termination.mark_terminated() {
        tracing::debug!(stage = %name, "joint termination quorum complete");
        shared.enter_stopping();
    }
}

async fn input_loop(
    params: &mut InputStageParams,
    shared: &PipelineShared,
    moved: &mut u64,
) -> Result<()> {
    params.plugin.start(&params.args)?;
    let opted_in = params.plugin.joint_termination();
    if let Some(rate) = params.plugin.bitrate() {
        tracing::debug!(stage = %params.name, rate, "input declares its bitrate");
    }
    let mut jt_marked = false;
    let mut sequence: u64 = 0;

    if params.instuff_start > 0 {
        let nulls = (0..params.instuff_start).map(|_| Packet::null(params.packet_size));
        *moved += params.writer.write(nulls).await? as u64;
    }

    // The first cycle may use a distinct budget so the pipeline primes
    // quickly (or slowly) regardless of the steady-state batch size.
    let mut budget = params.init_input_pkt;
    loop {
        if shared.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        // Graceful stop: exit through the stop-stuffing path as if the
        // input had hit its natural end of stream.
        if shared.stop.is_cancelled() {
            break;
        }

        let batch = params.plugin.receive(budget.max(1))?;
        budget = params.max_input_pkt;
        if batch.is_empty() {
            break;
        }

        let mut outgoing = Vec::with_capacity(batch.len());
        for mut packet in batch {
            packet.metadata_mut().sequence = sequence;
            sequence += 1;
            outgoing.push(packet);
            if let Some(stuffer) = params.stuffer.as_mut() {
                for _ in 0..stuffer.due_after_packet() {
                    outgoing.push(Packet::null(params.packet_size));
                }
            }
        }

        let mut hold = None;
        if let Some(regulator) = params.regulator.as_mut() {
            regulator.record(outgoing.len() as u64);
            let pace = regulator.pace();
            if pace.stuffing > 0 {
                regulator.record(pace.stuffing);
                outgoing.extend((0..pace.stuffing).map(|_| Packet::null(params.packet_size)));
            }
            hold = pace.delay;
        }

        *moved += params.writer.write(outgoing).await? as u64;

        if let Some(delay) = hold {
            tokio::select! {
                _ = shared.cancel.cancelled() => return Err(Error::Cancelled),
                _ = shared.stop.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if opted_in && !jt_marked && params.plugin.is_terminated() {
            mark_jt(&params.name, &mut jt_marked, shared);
        }
    }

    if params.instuff_stop > 0 {
        let nulls = (0..params.instuff_stop).map(|_| Packet::null(params.packet_size));
        *moved += params.writer.write(nulls).await? as u64;
    }

    // Natural end of stream counts as termination for the quorum.
    if opted_in {
        mark_jt(&params.name, &mut jt_marked, shared);
    }
    Ok(())
}

async fn processor_loop(
    params: &mut ProcessorStageParams,
    shared: &PipelineShared,
    moved: &mut u64,
) -> Result<()> {
    params.plugin.start(&params.args)?;
    let opted_in = params.plugin.joint_termination();
    let mut jt_marked = false;

    loop {
        let batch = params.reader.read(params.max_flush_pkt).await?;
        if batch.is_empty() {
            break;
        }
        *moved += batch.len() as u64;

        let outgoing = params.plugin.process(batch)?;
        if !outgoing.is_empty() {
            params.writer.write(outgoing).await?;
        }

        // A terminated plugin keeps forwarding packets until the whole
        // pipeline stops; only the quorum decision changes.
        if opted_in && !jt_marked && params.plugin.is_terminated() {
            mark_jt(&params.name, &mut jt_marked, shared);
        }
    }

    if opted_in {
        mark_jt(&params.name, &mut jt_marked, shared);
    }
    Ok(())
}

async fn output_loop(
    params: &mut OutputStageParams,
    shared: &PipelineShared,
    moved: &mut u64,
) -> Result<()> {
    params.plugin.start(&params.args)?;
    let opted_in = params.plugin.joint_termination();
    let mut jt_marked = false;

    loop {
        let batch = params.reader.read(params.max_flush_pkt).await?;
        if batch.is_empty() {
            break;
        }

        params.plugin.send(&batch)?;
        *moved += batch.len() as u64;
        params.sent.fetch_add(batch.len() as u64, Ordering::Relaxed);

        if opted_in && !jt_marked && params.plugin.is_terminated() {
            mark_jt(&params.name, &mut jt_marked, shared);
        }
    }

    if opted_in {
        mark_jt(&params.name, &mut jt_marked, shared);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_label() {
        assert_eq!(stage_label("file", 2, true), "file#2");
        assert_eq!(stage_label("file", 2, false), "file");
    }
}
