//! End-to-end echo sanity: one source, one destination, real loopback TCP,
//! deterministic pacing, one engine instance driving both flows at once.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use flowbench_engine::flow::{DirectionSettings, FlowSettings};
use flowbench_engine::report::ReportQueue;
use flowbench_engine::request::{DestinationSpec, SourceSpec};
use flowbench_engine::{Engine, ReportKind};
use flowbench_engine::rng::EngineRng;

fn settings() -> FlowSettings {
    FlowSettings {
        write_rate: 10.0,
        poisson_distributed: false,
        write_block_size: 128,
        read_block_size: 128,
        direction: [
            DirectionSettings { delay: Duration::ZERO, duration: Some(Duration::from_secs(1)) },
            DirectionSettings { delay: Duration::ZERO, duration: Some(Duration::from_secs(1)) },
        ],
        reporting_interval: None,
        shutdown: true,
        cork: false,
        pushy: true,
        flow_control: true,
        late_connect: false,
        extra_socket_options: Vec::new(),
    }
}

#[test]
fn echo_sanity_reports_expected_block_and_reply_counts() {
    let reports = Arc::new(ReportQueue::default());
    let (mut engine, handle) = Engine::with_rng(reports.clone(), EngineRng::from_seed(1)).unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let engine_thread = {
        let running = running.clone();
        thread::spawn(move || engine.run(&running).unwrap())
    };

    let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
    let dest = handle.add_destination(DestinationSpec { bind_addr: SocketAddr::new(loopback, 0), settings: settings() });
    assert!(dest.error.is_none(), "add_destination failed: {:?}", dest.error);
    let reply_port = dest.reply_port.unwrap();
    let data_port = dest.data_port.unwrap();

    let source = handle.add_source(SourceSpec {
        reply_addr: SocketAddr::new(loopback, reply_port),
        data_addr: Some(SocketAddr::new(loopback, data_port)),
        settings: settings(),
    });
    assert!(source.error.is_none(), "add_source failed: {:?}", source.error);

    handle.start_flows();

    // Both flows run for 1s; give the engine generous real time to reap them.
    let mut saw_totals = Vec::new();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while saw_totals.len() < 2 && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
        let (batch, _) = reports.drain_batch();
        saw_totals.extend(batch.into_iter().filter(|r| r.kind == ReportKind::Total));
    }

    running.store(false, Ordering::Relaxed);
    engine_thread.join().unwrap();

    assert_eq!(saw_totals.len(), 2, "expected a TOTAL report from both the source and destination flow");

    for report in &saw_totals {
        let write_blocks = report.stats.bytes_written / 128;
        let read_blocks = report.stats.bytes_read / 128;
        // At rate 10/s for 1s, either side may complete 10 or 11 blocks
        // depending on scheduling slip; the side that never wrote (pure
        // destination with write disabled would write 0) isn't exercised
        // here since both flows are symmetric full-duplex.
        assert!(write_blocks <= 11, "wrote more blocks than the 1s/10Hz budget allows: {write_blocks}");
        assert!(read_blocks <= 11, "read more blocks than the 1s/10Hz budget allows: {read_blocks}");
        if report.stats.reply_blocks_read > 0 {
            assert!(report.stats.rtt_min >= 0.0);
        }
    }
}
