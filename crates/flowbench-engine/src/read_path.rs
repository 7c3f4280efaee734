//! Read path: server-side block reassembly and the embedded-IAT echo
//! back over the reply channel.

use std::io::{self, Read, Write};

use flowbench_time::Timestamp;
use tracing::warn;

use crate::error::FlowError;
use crate::flow::{Direction, Flow};
use crate::wire;

/// Drives one readiness event's worth of reading on the data socket. Loops
/// over complete blocks while `settings.pushy`; stops after the first on
/// EAGAIN, a partial read, or (when not pushy) a completed block.
pub fn drive_read(flow: &mut Flow, now: Timestamp) {
    if !crate::scheduler::read_due(flow) {
        return;
    }
    loop {
        let Some(stream) = flow.data.as_mut() else { return };
        let tail = &mut flow.read_cursor.block[flow.read_cursor.bytes_read..];
        match stream.read(tail) {
            Ok(0) => {
                handle_eof(flow);
                return;
            }
            Ok(n) => {
                flow.read_cursor.bytes_read += n;
                flow.interval.bytes_read += n as u64;
                flow.total.bytes_read += n as u64;

                if flow.read_cursor.bytes_read < flow.read_cursor.block.len() {
                    return;
                }

                complete_block(flow, now);
                if flow.error.is_some() || !flow.settings.pushy {
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                flow.fail(FlowError::Read(e));
                return;
            }
        }
    }
}

fn handle_eof(flow: &mut Flow) {
    let already_finished = flow.is_finished(Direction::Read);
    flow.set_finished(Direction::Read);
    let expected = already_finished || flow.settings.shutdown;
    if !expected {
        warn!(flow_id = flow.id, "unexpected EOF on data socket while still expecting reads");
    }
    if flow.is_finished(Direction::Write) {
        if expected {
            flow.complete_now();
        } else {
            flow.fail(FlowError::UnexpectedEof);
        }
    }
}

fn complete_block(flow: &mut Flow, now: Timestamp) {
    flow.read_block_count += 1;
    flow.read_cursor.bytes_read = 0;

    let (len, _sent) = wire::read_block_header(&flow.read_cursor.block);
    let iat = match flow.last_block_read {
        None => f64::NAN,
        Some(last) => now.signed_diff_secs(last),
    };
    flow.last_block_read = Some(now);

    wire::write_iat_into_block(&mut flow.read_cursor.block, len, iat);
    let reply_len = len as usize + 8;

    let Some(reply) = flow.reply.as_mut() else { return };
    match reply.write(&flow.read_cursor.block[..reply_len]) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            warn!(flow_id = flow.id, "reply channel would block, dropping this reply");
        }
        Err(e) => flow.fail(FlowError::Reply(e)),
    }
}
