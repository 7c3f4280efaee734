use std::net::SocketAddr;

use flowbench_net::tcp::{RawSockOpt, TcpInfoSnapshot};
use flowbench_time::Timestamp;
use mio::Token;
use mio::net::{TcpListener, TcpStream};

use crate::wire::REPLY_BLOCK_SIZE;

/// Which side of the measurement pair this flow plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Source,
    Destination,
}

/// A flow's position in its setup/run/teardown lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowState {
    /// Source: reply socket connected, still waiting to hear back (setup is
    /// synchronous today, so this is transient).
    WaitConnectReply,
    /// Destination: waiting to accept the reply-channel connection.
    WaitAcceptReply,
    /// Destination: reply accepted, waiting to accept the data channel.
    GrindWaitAccept,
    /// Both channels established; driven by the scheduler every tick.
    Running,
}

/// READ and WRITE are modeled as an index into fixed-size `[T; 2]` arrays
/// rather than two separately-named fields, so direction-generic logic
/// (scheduler, reporter) doesn't need to duplicate itself per side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Read = 0,
    Write = 1,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Read, Direction::Write];
}

/// Per-direction configuration. `duration: None` means unbounded; `Some(0)`
/// means the direction is disabled outright (status code `o`).
#[derive(Clone, Copy, Debug)]
pub struct DirectionSettings {
    pub delay: std::time::Duration,
    pub duration: Option<std::time::Duration>,
}

impl DirectionSettings {
    pub fn disabled() -> Self {
        Self { delay: std::time::Duration::ZERO, duration: Some(std::time::Duration::ZERO) }
    }
}

/// Immutable-after-construction per-flow configuration, supplied by the
/// (out of scope) controller.
#[derive(Clone, Debug)]
pub struct FlowSettings {
    pub write_rate: f64,
    pub poisson_distributed: bool,
    pub write_block_size: usize,
    pub read_block_size: usize,
    pub direction: [DirectionSettings; 2],
    pub reporting_interval: Option<std::time::Duration>,
    pub shutdown: bool,
    pub cork: bool,
    pub pushy: bool,
    pub flow_control: bool,
    pub late_connect: bool,
    pub extra_socket_options: Vec<RawSockOpt>,
}

impl FlowSettings {
    /// Smallest sane write-block size: must fit the echoed header plus at
    /// least one byte of payload so `stamp_block_header` never panics.
    pub fn min_write_block_size() -> usize {
        crate::wire::REPLY_HEADER_LEN as usize + 1
    }
}

/// One statistics bucket (either the per-interval window or the
/// flow-lifetime total).
#[derive(Clone, Copy, Debug)]
pub struct StatsBucket {
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub reply_blocks_read: u64,
    pub rtt_min: f64,
    pub rtt_max: f64,
    pub rtt_sum: f64,
    pub iat_min: f64,
    pub iat_max: f64,
    pub iat_sum: f64,
}

impl Default for StatsBucket {
    fn default() -> Self {
        Self {
            bytes_read: 0,
            bytes_written: 0,
            reply_blocks_read: 0,
            rtt_min: f64::INFINITY,
            rtt_max: f64::NEG_INFINITY,
            rtt_sum: 0.0,
            iat_min: f64::INFINITY,
            iat_max: f64::NEG_INFINITY,
            iat_sum: 0.0,
        }
    }
}

impl StatsBucket {
    pub fn record_rtt_iat(&mut self, rtt: f64, iat: f64) {
        self.reply_blocks_read += 1;
        self.rtt_min = self.rtt_min.min(rtt);
        self.rtt_max = self.rtt_max.max(rtt);
        self.rtt_sum += rtt;
        if !iat.is_nan() {
            self.iat_min = self.iat_min.min(iat);
            self.iat_max = self.iat_max.max(iat);
            self.iat_sum += iat;
        }
    }
}

/// Per-direction socket + reassembly state for the data channel.
pub struct ReadCursor {
    pub block: Vec<u8>,
    pub bytes_read: usize,
}

pub struct WriteCursor {
    pub block: Vec<u8>,
    pub bytes_written: usize,
}

/// A single measurement flow. Owns all four of its sockets (two are
/// single-use listeners, dropped once accepted) so that closing happens
/// exactly once, driven by `Drop` on the underlying `mio` types rather than
/// by caller discipline.
pub struct Flow {
    pub id: u64,
    pub role: Role,
    pub state: FlowState,
    pub settings: FlowSettings,

    pub data: Option<TcpStream>,
    pub reply: Option<TcpStream>,
    pub listen_reply: Option<TcpListener>,
    pub listen_data: Option<TcpListener>,
    pub peer_data_addr: Option<SocketAddr>,

    pub data_token: Option<Token>,
    pub reply_token: Option<Token>,
    pub listen_reply_token: Option<Token>,
    pub listen_data_token: Option<Token>,

    pub write_cursor: WriteCursor,
    pub read_cursor: ReadCursor,
    pub reply_cursor: Vec<u8>,
    pub reply_bytes_read: usize,

    pub write_block_count: u64,
    pub read_block_count: u64,

    pub start_timestamp: [Timestamp; 2],
    pub stop_timestamp: [Option<Timestamp>; 2],
    pub next_write_block_timestamp: Timestamp,
    pub last_block_written: Timestamp,
    pub last_block_read: Option<Timestamp>,

    pub first_report_time: Timestamp,
    pub last_report_time: Timestamp,
    pub next_report_time: Timestamp,

    pub connect_called: bool,
    pub finished: [bool; 2],
    pub congestion_counter: u32,

    pub mtu: Option<i32>,
    pub mss: Option<i32>,
    pub tcp_info: Option<TcpInfoSnapshot>,

    pub interval: StatsBucket,
    pub total: StatsBucket,

    pub error: Option<String>,
    pub started: bool,
}

impl Flow {
    pub fn new(id: u64, role: Role, state: FlowState, settings: FlowSettings) -> Self {
        let write_block_size = settings.write_block_size;
        let read_block_size = settings.read_block_size;
        Self {
            id,
            role,
            state,
            settings,
            data: None,
            reply: None,
            listen_reply: None,
            listen_data: None,
            peer_data_addr: None,
            data_token: None,
            reply_token: None,
            listen_reply_token: None,
            listen_data_token: None,
            write_cursor: WriteCursor { block: vec![0u8; write_block_size], bytes_written: 0 },
            read_cursor: ReadCursor { block: vec![0u8; read_block_size], bytes_read: 0 },
            reply_cursor: vec![0u8; REPLY_BLOCK_SIZE],
            reply_bytes_read: 0,
            write_block_count: 0,
            read_block_count: 0,
            start_timestamp: [Timestamp::ZERO; 2],
            stop_timestamp: [None; 2],
            next_write_block_timestamp: Timestamp::ZERO,
            last_block_written: Timestamp::ZERO,
            last_block_read: None,
            first_report_time: Timestamp::ZERO,
            last_report_time: Timestamp::ZERO,
            next_report_time: Timestamp::ZERO,
            connect_called: false,
            finished: [false, false],
            congestion_counter: 0,
            mtu: None,
            mss: None,
            tcp_info: None,
            interval: StatsBucket::default(),
            total: StatsBucket::default(),
            error: None,
            started: false,
        }
    }

    pub fn dir_settings(&self, dir: Direction) -> DirectionSettings {
        self.settings.direction[dir as usize]
    }

    pub fn is_finished(&self, dir: Direction) -> bool {
        self.finished[dir as usize]
    }

    pub fn set_finished(&mut self, dir: Direction) {
        self.finished[dir as usize] = true;
    }

    /// `true` once `now` has reached `start_timestamp[dir]` but we're not
    /// there yet; i.e. still in the configured start delay.
    pub fn in_delay(&self, dir: Direction, now: Timestamp) -> bool {
        self.started && now < self.start_timestamp[dir as usize]
    }

    /// `true` while the direction is inside its configured sending window
    /// and hasn't been marked finished.
    pub fn is_sending(&self, dir: Direction, now: Timestamp) -> bool {
        if !self.started || self.is_finished(dir) {
            return false;
        }
        if now < self.start_timestamp[dir as usize] {
            return false;
        }
        match self.stop_timestamp[dir as usize] {
            Some(stop) => now < stop,
            None => true,
        }
    }

    pub fn duration_disabled(&self, dir: Direction) -> bool {
        self.dir_settings(dir).duration == Some(std::time::Duration::ZERO)
    }

    pub fn has_sockets(&self) -> bool {
        self.data.is_some() || self.reply.is_some()
    }

    pub fn fail(&mut self, err: impl std::fmt::Display) {
        if self.error.is_none() {
            self.error = Some(err.to_string());
        }
        self.finished = [true, true];
    }

    /// Marks the flow done in both directions without attaching an error —
    /// used when a direction's EOF was expected (already finished, or
    /// `settings.shutdown` configured) but the peer is now gone too, so
    /// there's nothing left for this flow to do. The termination gate
    /// (`scheduler::flow_is_complete`) reaps it on the next tick.
    pub fn complete_now(&mut self) {
        self.finished = [true, true];
    }
}
