//! `StopFlow(All)` mass-stop: add several source/destination pairs, start
//! them, then stop everything at once and check the table empties and
//! `started` clears. Exercises `FlowTable::drain_all`'s fix for the
//! original mass-stop iteration bug (removing index 0 repeatedly rather
//! than walking `0..len` while the vec shifts under the loop).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use flowbench_engine::flow::{DirectionSettings, FlowSettings};
use flowbench_engine::report::ReportQueue;
use flowbench_engine::request::{DestinationSpec, SourceSpec, StopTarget};
use flowbench_engine::Engine;

fn settings() -> FlowSettings {
    FlowSettings {
        write_rate: 50.0,
        poisson_distributed: false,
        write_block_size: 64,
        read_block_size: 64,
        direction: [
            DirectionSettings { delay: Duration::ZERO, duration: None },
            DirectionSettings { delay: Duration::ZERO, duration: None },
        ],
        reporting_interval: None,
        shutdown: true,
        cork: false,
        pushy: true,
        flow_control: false,
        late_connect: false,
        extra_socket_options: Vec::new(),
    }
}

#[test]
fn stop_all_empties_every_flow_regardless_of_table_position() {
    let reports = Arc::new(ReportQueue::default());
    let (mut engine, handle) = Engine::new(reports).unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let engine_thread = {
        let running = running.clone();
        thread::spawn(move || engine.run(&running).unwrap())
    };

    let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
    const PAIRS: usize = 3;
    for _ in 0..PAIRS {
        let dest = handle.add_destination(DestinationSpec { bind_addr: SocketAddr::new(loopback, 0), settings: settings() });
        assert!(dest.error.is_none());
        let source = handle.add_source(SourceSpec {
            reply_addr: SocketAddr::new(loopback, dest.reply_port.unwrap()),
            data_addr: Some(SocketAddr::new(loopback, dest.data_port.unwrap())),
            settings: settings(),
        });
        assert!(source.error.is_none());
    }

    handle.start_flows();
    thread::sleep(Duration::from_millis(100));

    let before = handle.get_status();
    assert_eq!(before.num_flows, Some(PAIRS * 2));
    assert_eq!(before.started, Some(true));

    handle.stop_flow(StopTarget::All);

    let after = handle.get_status();
    assert_eq!(after.num_flows, Some(0), "every flow should be gone after StopFlow(All)");
    assert_eq!(after.started, Some(false));

    running.store(false, Ordering::Relaxed);
    engine_thread.join().unwrap();
}
