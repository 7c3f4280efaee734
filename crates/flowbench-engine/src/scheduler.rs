//! Per-flow scheduling decisions: whether a flow is complete and should be
//! reaped, what read/write interest its data socket wants this tick, and the
//! delay/shutdown state transitions that happen purely from the passage of
//! time rather than from a socket event.

use std::net::Shutdown;

use flowbench_time::Timestamp;
use tracing::debug;

use crate::flow::{Direction, Flow};

/// A direction is "done" once it's explicitly finished, disabled outright
/// (`duration == Some(0)`), or has nothing left to do — not delayed, not
/// sending. For an unbounded direction (`duration: None`) the last
/// condition never holds while `started`, so it only ends via `finished`.
fn direction_done(flow: &Flow, dir: Direction, now: Timestamp) -> bool {
    flow.is_finished(dir) || flow.duration_disabled(dir) || (!flow.in_delay(dir, now) && !flow.is_sending(dir, now))
}

/// A started flow with nothing left to do in either direction
/// is complete and should be reaped (TOTAL report + removal).
#[must_use]
pub fn flow_is_complete(flow: &Flow, now: Timestamp) -> bool {
    flow.started && Direction::ALL.iter().all(|&d| direction_done(flow, d, now))
}

/// Detects the WRITE window having just elapsed and applies the
/// half-close/finish transition. Idempotent: once
/// `finished[WRITE]` is set this is a no-op on subsequent ticks.
pub fn note_write_window(flow: &mut Flow, now: Timestamp) {
    if flow.is_finished(Direction::Write) || flow.duration_disabled(Direction::Write) {
        return;
    }
    if flow.in_delay(Direction::Write, now) || flow.is_sending(Direction::Write, now) {
        return;
    }
    flow.set_finished(Direction::Write);
    if flow.settings.shutdown {
        if let Some(stream) = &flow.data {
            if let Err(e) = stream.shutdown(Shutdown::Write) {
                debug!(flow_id = flow.id, "half-close of write side failed: {e}");
            }
        }
    }
}

/// Mirror of [`note_write_window`] for the READ direction: once the window
/// has closed and `settings.shutdown` is set, proactively half-close the
/// read side and mark it finished, rather than waiting for an EOF read.
pub fn note_read_window(flow: &mut Flow, now: Timestamp) {
    if flow.is_finished(Direction::Read) || flow.duration_disabled(Direction::Read) {
        return;
    }
    if flow.in_delay(Direction::Read, now) || flow.is_sending(Direction::Read, now) {
        return;
    }
    if flow.settings.shutdown {
        flow.set_finished(Direction::Read);
        if let Some(stream) = &flow.data {
            if let Err(e) = stream.shutdown(Shutdown::Read) {
                debug!(flow_id = flow.id, "half-close of read side failed: {e}");
            }
        }
    }
}

/// The write-interest predicate: not in write-delay, still
/// sending in WRITE, and the pacer says a block is due (unthrottled, or the
/// scheduled send time has arrived).
#[must_use]
pub fn write_due(flow: &Flow, now: Timestamp) -> bool {
    !flow.in_delay(Direction::Write, now)
        && flow.is_sending(Direction::Write, now)
        && (flow.settings.write_rate == 0.0 || now >= flow.next_write_block_timestamp)
}

/// Whether the data socket should currently be read from: connected (not
/// waiting on a deferred late-connect) and not yet finished reading.
#[must_use]
pub fn read_due(flow: &Flow) -> bool {
    flow.connect_called && !flow.is_finished(Direction::Read)
}
