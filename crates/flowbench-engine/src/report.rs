use std::collections::VecDeque;
use std::sync::Mutex;

use flowbench_net::tcp::TcpInfoSnapshot;
use flowbench_time::Timestamp;

use crate::flow::{Direction, Flow, StatsBucket};

/// Maximum pending reports retained before INTERVAL reports start being
/// dropped. TOTAL reports are never dropped — this is the backpressure
/// rule.
pub const MAX_PENDING_REPORTS: usize = 100;

/// Batch size returned by a single `ReportQueue::drain` call.
pub const DRAIN_BATCH_SIZE: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportKind {
    Interval,
    Total,
}

/// One outgoing report. `status` packs the READ code in the high byte and
/// the WRITE code in the low byte (see [`status_code`]).
#[derive(Clone, Debug)]
pub struct Report {
    pub flow_id: u64,
    pub kind: ReportKind,
    pub begin: Timestamp,
    pub end: Timestamp,
    pub stats: StatsBucket,
    pub mtu: Option<i32>,
    pub mss: Option<i32>,
    pub tcp_info: Option<TcpInfoSnapshot>,
    pub status: u16,
}

/// One of the six direction-status letters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusCode {
    Delay = b'd',
    Live = b'l',
    Disabled = b'o',
    Finished = b'f',
    ClosedAfterData = b'c',
    NormalWithData = b'n',
}

/// Computes one direction's status letter for the interval `[begin, end)`
/// per the truth table:
///
/// - direction disabled (`duration == 0`) → `o`
/// - still inside the start delay at `end` → `d`
/// - moved data this interval → `c` if the direction has since finished,
///   else `n`
/// - otherwise, if the direction has finished (or `end` is past its stop
///   timestamp) → `f`
/// - otherwise → `l` (live, no data moved)
#[must_use]
pub fn status_code(flow: &Flow, dir: Direction, end: Timestamp) -> StatusCode {
    if flow.duration_disabled(dir) {
        return StatusCode::Disabled;
    }
    if flow.in_delay(dir, end) {
        return StatusCode::Delay;
    }
    let moved = match dir {
        Direction::Read => flow.interval.bytes_read > 0,
        Direction::Write => flow.interval.bytes_written >= flow.settings.write_block_size as u64,
    };
    if moved {
        return if flow.is_finished(dir) || !flow.is_sending(dir, end) {
            StatusCode::ClosedAfterData
        } else {
            StatusCode::NormalWithData
        };
    }
    if flow.is_finished(dir) || !flow.is_sending(dir, end) {
        return StatusCode::Finished;
    }
    StatusCode::Live
}

#[must_use]
pub fn pack_status(read: StatusCode, write: StatusCode) -> u16 {
    (u16::from(read as u8) << 8) | u16::from(write as u8)
}

/// Builds a report for `flow` covering `[begin, end)`, snapshotting the
/// chosen bucket and resetting it if it's an INTERVAL report.
pub fn build_report(flow: &mut Flow, kind: ReportKind, begin: Timestamp, end: Timestamp) -> Report {
    let read = status_code(flow, Direction::Read, end);
    let write = status_code(flow, Direction::Write, end);
    let status = pack_status(read, write);

    let stats = match kind {
        ReportKind::Interval => flow.interval,
        ReportKind::Total => flow.total,
    };

    let report = Report {
        flow_id: flow.id,
        kind,
        begin,
        end,
        stats,
        mtu: flow.mtu,
        mss: flow.mss,
        tcp_info: flow.tcp_info,
        status,
    };

    if kind == ReportKind::Interval {
        flow.interval = StatsBucket::default();
    }

    report
}

/// Engine-to-control-thread outbox. Protected by a single mutex; retrieval
/// happens in batches with a `has_more` flag so the control thread never
/// has to drain the whole queue in a single call.
#[derive(Default)]
pub struct ReportQueue {
    inner: Mutex<VecDeque<Report>>,
}

impl ReportQueue {
    pub fn push(&self, report: Report) {
        let mut inner = self.inner.lock().unwrap();
        if report.kind == ReportKind::Interval && inner.len() >= MAX_PENDING_REPORTS {
            return;
        }
        inner.push_back(report);
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// Pops up to [`DRAIN_BATCH_SIZE`] reports, returning them along with
    /// whether more remain.
    pub fn drain_batch(&self) -> (Vec<Report>, bool) {
        let mut inner = self.inner.lock().unwrap();
        let take = DRAIN_BATCH_SIZE.min(inner.len());
        let batch: Vec<Report> = inner.drain(..take).collect();
        let has_more = !inner.is_empty();
        (batch, has_more)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{DirectionSettings, FlowSettings, FlowState, Role};

    fn test_flow() -> Flow {
        let settings = FlowSettings {
            write_rate: 0.0,
            poisson_distributed: false,
            write_block_size: 64,
            read_block_size: 64,
            direction: [
                DirectionSettings { delay: std::time::Duration::ZERO, duration: Some(std::time::Duration::from_secs(1)) },
                DirectionSettings { delay: std::time::Duration::ZERO, duration: Some(std::time::Duration::from_secs(1)) },
            ],
            reporting_interval: None,
            shutdown: false,
            cork: false,
            pushy: true,
            flow_control: false,
            late_connect: false,
            extra_socket_options: Vec::new(),
        };
        let mut flow = Flow::new(1, Role::Source, FlowState::Running, settings);
        flow.started = true;
        flow.start_timestamp = [Timestamp::ZERO, Timestamp::ZERO];
        flow.stop_timestamp = [Some(Timestamp::from_nanos(1_000_000_000)), Some(Timestamp::from_nanos(1_000_000_000))];
        flow
    }

    #[test]
    fn disabled_direction_reports_o() {
        let mut flow = test_flow();
        flow.settings.direction[Direction::Read as usize] = DirectionSettings::disabled();
        let code = status_code(&flow, Direction::Read, Timestamp::from_nanos(500_000_000));
        assert_eq!(code, StatusCode::Disabled);
    }

    #[test]
    fn in_delay_reports_d() {
        let mut flow = test_flow();
        flow.start_timestamp[Direction::Write as usize] = Timestamp::from_nanos(2_000_000_000);
        let code = status_code(&flow, Direction::Write, Timestamp::from_nanos(500_000_000));
        assert_eq!(code, StatusCode::Delay);
    }

    #[test]
    fn live_with_no_data_reports_l() {
        let flow = test_flow();
        let code = status_code(&flow, Direction::Read, Timestamp::from_nanos(500_000_000));
        assert_eq!(code, StatusCode::Live);
    }

    #[test]
    fn data_moved_and_still_sending_reports_n() {
        let mut flow = test_flow();
        flow.interval.bytes_read = 10;
        let code = status_code(&flow, Direction::Read, Timestamp::from_nanos(500_000_000));
        assert_eq!(code, StatusCode::NormalWithData);
    }

    #[test]
    fn data_moved_but_finished_reports_c() {
        let mut flow = test_flow();
        flow.interval.bytes_read = 10;
        flow.set_finished(Direction::Read);
        let code = status_code(&flow, Direction::Read, Timestamp::from_nanos(500_000_000));
        assert_eq!(code, StatusCode::ClosedAfterData);
    }

    #[test]
    fn past_stop_with_no_data_reports_f() {
        let flow = test_flow();
        let code = status_code(&flow, Direction::Read, Timestamp::from_nanos(2_000_000_000));
        assert_eq!(code, StatusCode::Finished);
    }

    #[test]
    fn interval_report_resets_interval_bucket_not_total() {
        let mut flow = test_flow();
        flow.interval.bytes_read = 123;
        flow.total.bytes_read = 999;
        let report = build_report(&mut flow, ReportKind::Interval, Timestamp::ZERO, Timestamp::from_nanos(500_000_000));
        assert_eq!(report.stats.bytes_read, 123);
        assert_eq!(flow.interval.bytes_read, 0);
        assert_eq!(flow.interval.rtt_min, f64::INFINITY);
        assert_eq!(flow.total.bytes_read, 999);
    }

    #[test]
    fn backlog_drops_interval_but_keeps_total() {
        let queue = ReportQueue::default();
        for i in 0..MAX_PENDING_REPORTS + 10 {
            queue.push(Report {
                flow_id: i as u64,
                kind: ReportKind::Interval,
                begin: Timestamp::ZERO,
                end: Timestamp::ZERO,
                stats: StatsBucket::default(),
                mtu: None,
                mss: None,
                tcp_info: None,
                status: 0,
            });
        }
        assert_eq!(queue.pending(), MAX_PENDING_REPORTS);
        queue.push(Report {
            flow_id: 9999,
            kind: ReportKind::Total,
            begin: Timestamp::ZERO,
            end: Timestamp::ZERO,
            stats: StatsBucket::default(),
            mtu: None,
            mss: None,
            tcp_info: None,
            status: 0,
        });
        assert_eq!(queue.pending(), MAX_PENDING_REPORTS + 1);
    }

    #[test]
    fn drain_batch_caps_at_50_and_reports_has_more() {
        let queue = ReportQueue::default();
        for i in 0..75 {
            queue.push(Report {
                flow_id: i as u64,
                kind: ReportKind::Total,
                begin: Timestamp::ZERO,
                end: Timestamp::ZERO,
                stats: StatsBucket::default(),
                mtu: None,
                mss: None,
                tcp_info: None,
                status: 0,
            });
        }
        let (batch, has_more) = queue.drain_batch();
        assert_eq!(batch.len(), DRAIN_BATCH_SIZE);
        assert!(has_more);
        let (batch2, has_more2) = queue.drain_batch();
        assert_eq!(batch2.len(), 25);
        assert!(!has_more2);
    }
}
