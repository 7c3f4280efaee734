//! A reply block claiming a send timestamp in the future yields a negative
//! RTT and must be dropped without touching `reply_blocks_read` or the
//! RTT/IAT accumulators — exercises `reply_path::drive_reply` directly
//! against a real loopback socket pair, bypassing the full engine.

use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use flowbench_engine::flow::{DirectionSettings, Flow, FlowSettings, FlowState, Role};
use flowbench_engine::reply_path::drive_reply;
use flowbench_engine::wire::REPLY_BLOCK_SIZE;
use flowbench_time::Timestamp;

fn settings() -> FlowSettings {
    FlowSettings {
        write_rate: 0.0,
        poisson_distributed: false,
        write_block_size: 64,
        read_block_size: 64,
        direction: [DirectionSettings::disabled(), DirectionSettings::disabled()],
        reporting_interval: None,
        shutdown: false,
        cork: false,
        pushy: true,
        flow_control: false,
        late_connect: false,
        extra_socket_options: Vec::new(),
    }
}

#[test]
fn negative_rtt_reply_is_dropped() {
    let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    let (server, _) = listener.accept().unwrap();

    client.set_nonblocking(true).unwrap();
    let mut flow = Flow::new(1, Role::Source, FlowState::Running, settings());
    flow.reply = Some(mio::net::TcpStream::from_std(client));

    // sent = now + 1s => rtt = now - sent < 0, must be rejected.
    let sent = Timestamp::now() + Duration::from_secs(1);
    let mut reply_bytes = vec![0u8; REPLY_BLOCK_SIZE];
    reply_bytes[0] = 9;
    reply_bytes[1..9].copy_from_slice(&sent.as_nanos().to_ne_bytes());
    reply_bytes[9..17].copy_from_slice(&0.05f64.to_ne_bytes());

    {
        use std::io::Write;
        let mut server = server;
        server.write_all(&reply_bytes).unwrap();
    }

    // Give the reply a moment to actually land in the client's receive buffer.
    std::thread::sleep(Duration::from_millis(50));
    drive_reply(&mut flow, Timestamp::now());

    assert_eq!(flow.interval.reply_blocks_read, 0);
    assert_eq!(flow.total.reply_blocks_read, 0);
    assert!(flow.error.is_none());
}
