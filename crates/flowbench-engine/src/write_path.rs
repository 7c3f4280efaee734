//! Paced write path: block-based sends with an embedded send
//! timestamp, inter-packet pacing, and the congestion watchdog.

use std::io::{self, Write};

use flowbench_net::tcp::cork;
use flowbench_time::Timestamp;
use tracing::warn;

use crate::error::FlowError;
use crate::flow::Flow;
use crate::rng::EngineRng;
use crate::wire;

/// Drives one readiness event's worth of writing. Loops over blocks until
/// the kernel would block, a partial send leaves a block in progress, or
/// `settings.pushy` is false (in which case it stops after one completed
/// block). Failing the flow on error is handled in-place via [`Flow::fail`].
pub fn drive_write(flow: &mut Flow, rng: &mut EngineRng, now: Timestamp) {
    loop {
        if flow.write_cursor.bytes_written == 0 {
            wire::stamp_block_header(&mut flow.write_cursor.block, now);
        }

        let Some(stream) = flow.data.as_mut() else { return };
        let tail = &flow.write_cursor.block[flow.write_cursor.bytes_written..];
        match stream.write(tail) {
            Ok(0) => {
                flow.fail(FlowError::Write(io::Error::new(io::ErrorKind::WriteZero, "write returned 0")));
                return;
            }
            Ok(n) => {
                flow.write_cursor.bytes_written += n;
                flow.interval.bytes_written += n as u64;
                flow.total.bytes_written += n as u64;

                if flow.write_cursor.bytes_written < flow.write_cursor.block.len() {
                    // Partial send: wait for the next writable event.
                    return;
                }

                complete_block(flow, rng, now);
                if flow.error.is_some() || !flow.settings.pushy {
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                flow.fail(FlowError::Write(e));
                return;
            }
        }
    }
}

fn complete_block(flow: &mut Flow, rng: &mut EngineRng, now: Timestamp) {
    flow.write_cursor.bytes_written = 0;
    flow.write_block_count += 1;
    flow.last_block_written = now;

    if flow.settings.write_rate > 0.0 {
        let delay = rng.inter_packet_delay(flow.settings.write_rate, flow.settings.poisson_distributed);
        flow.next_write_block_timestamp = flow.next_write_block_timestamp + delay;

        if flow.last_block_written > flow.next_write_block_timestamp {
            flow.congestion_counter += 1;
            if flow.congestion_counter > 10_000 && flow.settings.flow_control {
                flow.fail(FlowError::Congestion(flow.congestion_counter));
                return;
            }
        }
    }

    if flow.settings.cork {
        if let Some(stream) = &flow.data {
            // Flush the corked segment, then re-cork for the next block.
            if let Err(e) = cork(stream, false).and_then(|()| cork(stream, true)) {
                warn!(flow_id = flow.id, "TCP_CORK toggle failed: {e}");
            }
        }
    }
}
