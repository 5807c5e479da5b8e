//! Periodic pipeline monitor.
//!
//! When enabled in the configuration, a sampler task wakes up once per
//! second, reads the occupancy of every inter-stage buffer and the output
//! packet counter, and publishes them as metrics and debug logs. The
//! monitor never touches the data path: it only reads counters.

use crate::buffer::OccupancyProbe;
use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Packets currently queued in an inter-stage buffer, per buffer index.
pub const BUFFER_OCCUPANCY: &str = "tspump_buffer_occupancy";

/// Capacity of an inter-stage buffer, per buffer index.
pub const BUFFER_CAPACITY: &str = "tspump_buffer_capacity";

/// Total packets delivered to the output plugin.
pub const OUTPUT_PACKETS_TOTAL: &str = "tspump_output_packets_total";

/// Output rate over the last sampling period, in packets per second.
pub const OUTPUT_PACKET_RATE: &str = "tspump_output_packet_rate";

/// Sampling period of the monitor task.
pub const MONITOR_PERIOD: Duration = Duration::from_secs(1);

/// Register metric descriptions with the installed recorder.
///
/// Optional; call once at startup when a recorder that surfaces
/// descriptions (Prometheus, ...) is installed.
pub fn describe_metrics() {
    describe_gauge!(
        BUFFER_OCCUPANCY,
        Unit::Count,
        "Packets queued in an inter-stage buffer"
    );
    describe_gauge!(
        BUFFER_CAPACITY,
        Unit::Count,
        "Capacity of an inter-stage buffer in packets"
    );
    describe_counter!(
        OUTPUT_PACKETS_TOTAL,
        Unit::Count,
        "Total packets delivered to the output plugin"
    );
    describe_gauge!(
        OUTPUT_PACKET_RATE,
        Unit::CountPerSecond,
        "Output rate over the last sampling period"
    );
}

pub(crate) fn spawn_monitor(
    probes: Vec<OccupancyProbe>,
    sent: Arc<AtomicU64>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(MONITOR_PERIOD);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick of an interval fires immediately.
        ticker.tick().await;

        let mut last_sent = sent.load(Ordering::Relaxed);
        let mut last_tick = Instant::now();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            for (index, probe) in probes.iter().enumerate() {
                let occupancy = probe.occupancy();
                gauge!(BUFFER_OCCUPANCY, "buffer" => index.to_string()).set(occupancy as f64);
                gauge!(BUFFER_CAPACITY, "buffer" => index.to_string())
                    .set(probe.capacity() as f64);
                tracing::debug!(
                    buffer = index,
                    occupancy,
                    capacity = probe.capacity(),
                    "buffer occupancy"
                );
            }

            let now = Instant::now();
            let total = sent.load(Ordering::Relaxed);
            let delta = total - last_sent;
            let elapsed = now.duration_since(last_tick).as_secs_f64();
            let rate = if elapsed > 0.0 {
                delta as f64 / elapsed
            } else {
                0.0
            };
            counter!(OUTPUT_PACKETS_TOTAL).absolute(total);
            gauge!(OUTPUT_PACKET_RATE).set(rate);
            tracing::debug!(total, rate = format_args!("{:.1}", rate), "output rate");

            last_sent = total;
            last_tick = now;
        }
    })
}
