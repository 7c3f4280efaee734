//! Minimal demo binary wiring the flow engine end-to-end over loopback:
//! spins up one engine, adds a destination flow and a source flow that
//! connects to it, starts them, and prints reports as they arrive. A real
//! controller RPC transport and CLI live outside this crate; this binary
//! hardcodes one scenario as a hand-wired stand-in for manual
//! smoke-testing.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use flowbench_engine::flow::{DirectionSettings, FlowSettings};
use flowbench_engine::report::ReportQueue;
use flowbench_engine::request::{DestinationSpec, SourceSpec, StopTarget};
use flowbench_engine::{Engine, ReportKind};
use tracing::info;

const WRITE_RATE: f64 = 10.0;
const BLOCK_SIZE: usize = 128;
const DURATION: Duration = Duration::from_secs(3);
const REPORTING_INTERVAL: Duration = Duration::from_millis(500);

fn scenario_settings() -> FlowSettings {
    FlowSettings {
        write_rate: WRITE_RATE,
        poisson_distributed: false,
        write_block_size: BLOCK_SIZE,
        read_block_size: BLOCK_SIZE,
        direction: [
            DirectionSettings { delay: Duration::ZERO, duration: Some(DURATION) },
            DirectionSettings { delay: Duration::ZERO, duration: Some(DURATION) },
        ],
        reporting_interval: Some(REPORTING_INTERVAL),
        shutdown: true,
        cork: false,
        pushy: true,
        flow_control: true,
        late_connect: false,
        extra_socket_options: Vec::new(),
    }
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let reports = Arc::new(ReportQueue::default());
    let (mut engine, handle) = Engine::new(reports.clone()).expect("couldn't set up engine");

    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = running.clone();
    ctrlc::set_handler(move || running_for_handler.store(false, Ordering::Relaxed))
        .expect("couldn't install ctrl-c handler");

    let engine_thread = {
        let running = running.clone();
        thread::spawn(move || {
            if let Err(e) = engine.run(&running) {
                tracing::error!("engine loop aborted: {e}");
            }
        })
    };

    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
    let settings = scenario_settings();

    let dest = handle.add_destination(DestinationSpec { bind_addr, settings: settings.clone() });
    let (Some(reply_port), Some(data_port)) = (dest.reply_port, dest.data_port) else {
        tracing::error!(?dest.error, "couldn't add destination flow");
        running.store(false, Ordering::Relaxed);
        engine_thread.join().ok();
        return;
    };
    info!(reply_port, data_port, "destination flow listening");

    let source = handle.add_source(SourceSpec {
        reply_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), reply_port),
        data_addr: Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), data_port)),
        settings,
    });
    if source.error.is_some() {
        tracing::error!(?source.error, "couldn't add source flow");
        running.store(false, Ordering::Relaxed);
        engine_thread.join().ok();
        return;
    }

    handle.start_flows();
    info!("flows started");

    let deadline = std::time::Instant::now() + DURATION + Duration::from_secs(1);
    while running.load(Ordering::Relaxed) && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(100));
        let (batch, _has_more) = reports.drain_batch();
        for report in batch {
            match report.kind {
                ReportKind::Interval => info!(flow_id = report.flow_id, status = report.status, bytes_written = report.stats.bytes_written, bytes_read = report.stats.bytes_read, "interval report"),
                ReportKind::Total => info!(flow_id = report.flow_id, write_blocks = report.stats.bytes_written, replies = report.stats.reply_blocks_read, rtt_min = report.stats.rtt_min, "total report"),
            }
        }
    }

    handle.stop_flow(StopTarget::All);
    running.store(false, Ordering::Relaxed);
    engine_thread.join().ok();

    let (batch, _) = reports.drain_batch();
    for report in batch {
        info!(flow_id = report.flow_id, kind = ?report.kind, "final drained report");
    }
}
