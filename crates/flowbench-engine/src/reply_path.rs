//! Reply path: client-side consumption of echoed reply blocks into
//! RTT/IAT statistics.

use std::io::{self, Read};

use flowbench_time::Timestamp;
use tracing::warn;

use crate::error::FlowError;
use crate::flow::Flow;
use crate::wire;

/// Drives one readiness event's worth of reading on the reply socket.
pub fn drive_reply(flow: &mut Flow, now: Timestamp) {
    loop {
        let Some(stream) = flow.reply.as_mut() else { return };
        let tail = &mut flow.reply_cursor[flow.reply_bytes_read..];
        match stream.read(tail) {
            Ok(0) => {
                flow.fail(FlowError::Reply(io::Error::new(io::ErrorKind::UnexpectedEof, "reply socket closed")));
                return;
            }
            Ok(n) => {
                flow.reply_bytes_read += n;
                if flow.reply_bytes_read < flow.reply_cursor.len() {
                    return;
                }

                flow.reply_bytes_read = 0;
                let (sent, iat) = wire::parse_reply_block(&flow.reply_cursor);
                let rtt = now.signed_diff_secs(sent);
                if rtt <= 0.0 || (iat.is_finite() && iat <= 0.0) {
                    warn!(flow_id = flow.id, rtt, iat, "rejecting reply block with non-positive rtt/iat");
                } else {
                    flow.interval.record_rtt_iat(rtt, iat);
                    flow.total.record_rtt_iat(rtt, iat);
                }

                if !flow.settings.pushy {
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                flow.fail(FlowError::Reply(e));
                return;
            }
        }
    }
}
