//! Joint termination behavior through the public API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tspump::args::{PluginOptions, ProcessorArgs};
use tspump::packet::Packet;
use tspump::plugin::{Plugin, PluginRegistry, ProcessorPlugin};
use tspump::plugins::{MemoryOutput, MemorySink};
use tspump::processor::{PipelineState, TsProcessor};

/// Route engine logs into the test harness; `RUST_LOG` controls detail.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A processor that has seen enough after `limit` packets and opts into
/// joint termination. It keeps forwarding packets until the pipeline
/// actually stops. The counter is shared so tests can inspect it after
/// the run.
struct CountingProcessor {
    limit: u64,
    seen: Arc<AtomicU64>,
}

impl CountingProcessor {
    fn new(limit: u64, seen: Arc<AtomicU64>) -> Self {
        Self { limit, seen }
    }
}

impl Plugin for CountingProcessor {
    fn name(&self) -> &str {
        "count"
    }

    fn joint_termination(&self) -> bool {
        true
    }

    fn is_terminated(&self) -> bool {
        self.seen.load(Ordering::Relaxed) >= self.limit
    }
}

impl ProcessorPlugin for CountingProcessor {
    fn process(&mut self, packets: Vec<Packet>) -> tspump::Result<Vec<Packet>> {
        self.seen.fetch_add(packets.len() as u64, Ordering::Relaxed);
        Ok(packets)
    }
}

/// An endless input whose packets carry their own ordinal, so delivery
/// gaps are detectable at the sink.
struct NumberedInput {
    next: u64,
}

impl Plugin for NumberedInput {
    fn name(&self) -> &str {
        "numbered"
    }
}

impl tspump::plugin::InputPlugin for NumberedInput {
    fn receive(&mut self, max_count: usize) -> tspump::Result<Vec<Packet>> {
        let batch = (0..max_count as u64)
            .map(|i| {
                let mut payload = vec![0u8; 16];
                payload[..8].copy_from_slice(&(self.next + i).to_le_bytes());
                Packet::new(&payload[..])
            })
            .collect();
        self.next += max_count as u64;
        Ok(batch)
    }
}

fn endless_args() -> ProcessorArgs {
    ProcessorArgs::builder()
        .input(PluginOptions::with_args("null", ["size=16"]))
        .plugin(PluginOptions::new("count"))
        .output(PluginOptions::new("drop"))
        .buffer_size(16)
        .max_input_pkt(8)
        .build()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_stage_quorum_stops_endless_pipeline() {
    init_tracing();
    let seen = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&seen);
    let registry = PluginRegistry::with_builtins();
    registry.register_processor("count", move || {
        CountingProcessor::new(100, Arc::clone(&counter))
    });

    let mut processor = TsProcessor::with_registry(Arc::new(registry));
    processor.start(endless_args()).unwrap();

    // The input never ends; only the quorum decision can stop this.
    let result = tokio::time::timeout(Duration::from_secs(5), processor.wait_for_termination())
        .await
        .expect("joint termination must stop the pipeline");
    result.unwrap();
    assert_eq!(processor.state(), PipelineState::Idle);
    assert!(seen.load(Ordering::Relaxed) >= 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_quorum_requires_every_opted_in_stage() {
    init_tracing();
    // Two opted-in processors with different limits: the pipeline must
    // keep running until the slower one is done too.
    let slow_seen = Arc::new(AtomicU64::new(0));
    let fast = Arc::new(AtomicU64::new(0));
    let slow = Arc::clone(&slow_seen);

    let registry = PluginRegistry::with_builtins();
    registry.register_processor("count-fast", move || {
        CountingProcessor::new(10, Arc::clone(&fast))
    });
    registry.register_processor("count-slow", move || {
        CountingProcessor::new(500, Arc::clone(&slow))
    });

    let args = ProcessorArgs::builder()
        .input(PluginOptions::with_args("null", ["size=16"]))
        .plugin(PluginOptions::new("count-fast"))
        .plugin(PluginOptions::new("count-slow"))
        .output(PluginOptions::new("drop"))
        .buffer_size(16)
        .max_input_pkt(8)
        .build();

    let mut processor = TsProcessor::with_registry(Arc::new(registry));
    processor.start(args).unwrap();
    tokio::time::timeout(Duration::from_secs(5), processor.wait_for_termination())
        .await
        .expect("joint termination must stop the pipeline")
        .unwrap();

    // The slow stage's threshold gated the stop.
    assert!(slow_seen.load(Ordering::Relaxed) >= 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_non_opted_stages_do_not_gate_the_quorum() {
    init_tracing();
    // One opted-in stage among plain ones: its termination alone stops
    // the pipeline.
    let seen = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&seen);
    let registry = PluginRegistry::with_builtins();
    registry.register_processor("count", move || {
        CountingProcessor::new(50, Arc::clone(&counter))
    });

    let args = ProcessorArgs::builder()
        .input(PluginOptions::with_args("null", ["size=16"]))
        .plugin(PluginOptions::new("pass"))
        .plugin(PluginOptions::new("count"))
        .plugin(PluginOptions::new("pass"))
        .output(PluginOptions::new("drop"))
        .buffer_size(16)
        .max_input_pkt(8)
        .build();

    let mut processor = TsProcessor::with_registry(Arc::new(registry));
    processor.start(args).unwrap();
    tokio::time::timeout(Duration::from_secs(5), processor.wait_for_termination())
        .await
        .expect("joint termination must stop the pipeline")
        .unwrap();
    assert!(seen.load(Ordering::Relaxed) >= 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_joint_termination_drains_in_flight_packets() {
    init_tracing();
    // Joint termination is a graceful stop, not an abort: everything
    // already accepted into the inter-stage buffers must still reach the
    // output plugin, and the stop-stuffing burst must still be emitted.
    let seen = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&seen);
    let registry = PluginRegistry::with_builtins();
    registry.register_input("numbered", || NumberedInput { next: 0 });
    registry.register_processor("count", move || {
        CountingProcessor::new(100, Arc::clone(&counter))
    });
    let sink = MemorySink::new();
    let out = sink.clone();
    registry.register_output("memory", move || MemoryOutput::with_sink(out.clone()));

    let args = ProcessorArgs::builder()
        .input(PluginOptions::new("numbered"))
        .plugin(PluginOptions::new("count"))
        .output(PluginOptions::new("memory"))
        .packet_size(16)
        .buffer_size(16)
        .max_input_pkt(8)
        .instuff_stop(3)
        .build();

    let mut processor = TsProcessor::with_registry(Arc::new(registry));
    processor.start(args).unwrap();
    tokio::time::timeout(Duration::from_secs(5), processor.wait_for_termination())
        .await
        .expect("joint termination must stop the pipeline")
        .unwrap();

    let received = sink.packets();
    let reals: Vec<_> = received.iter().filter(|p| !p.is_null()).collect();
    assert!(reals.len() >= 100, "stopped short: {} packets", reals.len());

    // No gaps: every packet the input produced was delivered, in order.
    for (i, pkt) in reals.iter().enumerate() {
        let ordinal = u64::from_le_bytes(pkt.payload()[..8].try_into().unwrap());
        assert_eq!(ordinal, i as u64, "packet {} lost or reordered", i);
        assert_eq!(pkt.metadata().sequence, i as u64);
    }

    // The stop burst went out after the last real packet.
    assert_eq!(sink.null_count(), 3);
    assert!(received[received.len() - 3..].iter().all(|p| p.is_null()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ignore_jt_keeps_pipeline_running() {
    init_tracing();
    let seen = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&seen);
    let registry = PluginRegistry::with_builtins();
    registry.register_processor("count", move || {
        CountingProcessor::new(10, Arc::clone(&counter))
    });

    let mut args = endless_args();
    args.ignore_jt = true;

    let mut processor = TsProcessor::with_registry(Arc::new(registry));
    processor.start(args).unwrap();

    // Wait until the opted-in stage is well past its threshold; with
    // joint termination disabled the pipeline must still be running.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while seen.load(Ordering::Relaxed) < 100 {
        assert!(tokio::time::Instant::now() < deadline, "pipeline stalled");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(processor.state(), PipelineState::Running);

    processor.abort();
    tokio::time::timeout(Duration::from_secs(5), processor.wait_for_termination())
        .await
        .expect("abort must still work with joint termination disabled")
        .unwrap();
}
