//! The event loop: multiplexes readiness over every active flow plus the
//! wakeup waker, drives the per-flow lifecycle, and drains/services the
//! request and report queues. Owns every socket in the daemon — the single
//! place per-flow mutation happens, so flow state needs no locking.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration as StdDuration;

use flowbench_net::tcp::{mtu_mss, tcp_info};
use flowbench_time::Timestamp;
use mio::{Events, Interest, Poll, Waker};
use tracing::{error, warn};

use crate::error::{EngineError, RequestError};
use crate::flow::Flow;
use crate::report::{ReportKind, ReportQueue, build_report};
use crate::request::{PendingRequest, RequestKind, RequestOutcome, RequestQueue, StopTarget};
use crate::rng::EngineRng;
use crate::scheduler;
use crate::table::FlowTable;
use crate::token::{SockKind, WAKE_TOKEN, decode_token};
use crate::{read_path, reply_path, setup, write_path};

/// The engine waits on its selector for at most this long per tick,
/// cooperative pacing — callers never rely on an exact
/// wake, just a bound on how stale the schedule can get.
const SELECTOR_TIMEOUT: StdDuration = StdDuration::from_millis(10);

/// A handle the control thread uses to submit requests and wake the
/// engine. Cloning is cheap (both fields are `Arc`s); every clone talks to
/// the same engine instance.
#[derive(Clone)]
pub struct Handle {
    requests: Arc<RequestQueue>,
    waker: Arc<Waker>,
}

impl Handle {
    fn submit(&self, kind: RequestKind) -> RequestOutcome {
        let req = self.requests.push(kind);
        if let Err(e) = self.waker.wake() {
            error!("wakeup waker failed: {e}");
        }
        req.wait()
    }

    pub fn add_source(&self, spec: crate::request::SourceSpec) -> RequestOutcome {
        self.submit(RequestKind::AddSource(spec))
    }

    pub fn add_destination(&self, spec: crate::request::DestinationSpec) -> RequestOutcome {
        self.submit(RequestKind::AddDestination(spec))
    }

    pub fn start_flows(&self) -> RequestOutcome {
        self.submit(RequestKind::StartFlows)
    }

    pub fn stop_flow(&self, target: StopTarget) -> RequestOutcome {
        self.submit(RequestKind::StopFlow(target))
    }

    pub fn get_status(&self) -> RequestOutcome {
        self.submit(RequestKind::GetStatus)
    }
}

pub struct Engine {
    poll: Poll,
    events: Events,
    flows: FlowTable,
    rng: EngineRng,
    next_flow_id: u64,
    started: bool,
    requests: Arc<RequestQueue>,
    reports: Arc<ReportQueue>,
    waker: Arc<Waker>,
}

impl Engine {
    pub fn new(reports: Arc<ReportQueue>) -> io::Result<(Self, Handle)> {
        Self::with_rng(reports, EngineRng::from_entropy())
    }

    pub fn with_rng(reports: Arc<ReportQueue>, rng: EngineRng) -> io::Result<(Self, Handle)> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        let requests = Arc::new(RequestQueue::default());
        let handle = Handle { requests: requests.clone(), waker: waker.clone() };
        let engine = Self {
            poll,
            events: Events::with_capacity(128),
            flows: FlowTable::default(),
            rng,
            next_flow_id: 1,
            started: false,
            requests,
            reports,
            waker,
        };
        Ok((engine, handle))
    }

    #[must_use]
    pub fn num_flows(&self) -> usize {
        self.flows.len()
    }

    #[must_use]
    pub fn started(&self) -> bool {
        self.started
    }

    /// Runs until `keep_running` is cleared, ticking the selector wait
    /// each iteration.
    pub fn run(&mut self, keep_running: &AtomicBool) -> Result<(), EngineError> {
        while keep_running.load(Ordering::Relaxed) {
            self.tick()?;
        }
        Ok(())
    }

    /// One iteration: drain requests, recompute interest, wait on the
    /// selector, dispatch events, and check the periodic report timer.
    pub fn tick(&mut self) -> Result<(), EngineError> {
        self.drain_requests();
        self.reap_completed_flows();
        self.rebuild_interest();

        match self.poll.poll(&mut self.events, Some(SELECTOR_TIMEOUT)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(EngineError::Selector(e)),
        }

        let now = Timestamp::now();
        let tokens: Vec<_> = self.events.iter().map(mio::event::Event::token).collect();
        for token in tokens {
            if token == WAKE_TOKEN {
                continue;
            }
            self.dispatch(token, now);
        }

        self.emit_periodic_reports(now);
        Ok(())
    }

    fn dispatch(&mut self, token: mio::Token, now: Timestamp) {
        let (id, kind) = decode_token(token);
        let Some(idx) = self.flows.index_of(id) else { return };

        match kind {
            SockKind::ListenReply => {
                let registry = self.poll.registry();
                if let Some(flow) = self.flows.get_mut(idx) {
                    if let Err(e) = setup::accept_reply(registry, flow) {
                        warn!(flow_id = id, "accept_reply failed: {e}");
                    }
                }
            }
            SockKind::ListenData => {
                let registry = self.poll.registry();
                if let Some(flow) = self.flows.get_mut(idx) {
                    if let Err(e) = setup::accept_data(registry, flow) {
                        warn!(flow_id = id, "accept_data failed: {e}");
                    }
                }
            }
            SockKind::Data => {
                if let Some(flow) = self.flows.get_mut(idx) {
                    read_path::drive_read(flow, now);
                    if flow.error.is_none() {
                        write_path::drive_write(flow, &mut self.rng, now);
                    }
                }
            }
            SockKind::Reply => {
                if let Some(flow) = self.flows.get_mut(idx) {
                    reply_path::drive_reply(flow, now);
                }
            }
        }
    }

    /// Rebuilds read/write interest for every running flow from
    /// scratch, applying the window-elapsed transitions (half-close,
    /// `finished`) and the deferred late-connect along the way.
    fn rebuild_interest(&mut self) {
        let now = Timestamp::now();
        for idx in 0..self.flows.len() {
            let Some(flow) = self.flows.get_mut(idx) else { continue };
            let awaiting_late_connect = flow.settings.late_connect && !flow.connect_called && flow.peer_data_addr.is_some();
            if flow.data.is_none() && flow.listen_data.is_none() && !awaiting_late_connect {
                continue;
            }
            if !flow.started {
                continue;
            }

            scheduler::note_write_window(flow, now);
            scheduler::note_read_window(flow, now);

            if flow.settings.late_connect && !flow.connect_called && flow.peer_data_addr.is_some() {
                let registry = self.poll.registry();
                if let Err(e) = setup::late_connect(registry, flow) {
                    flow.fail(crate::error::FlowError::LateConnect(e));
                }
                continue;
            }

            let Some(stream) = flow.data.as_mut() else { continue };
            let mut interest = Interest::READABLE;
            if scheduler::write_due(flow, now) {
                interest |= Interest::WRITABLE;
            }
            let token = crate::token::token_for(flow.id, SockKind::Data);
            if self.poll.registry().reregister(stream, token, interest).is_err() {
                let _ = self.poll.registry().register(stream, token, interest);
            }
        }
    }

    fn reap_completed_flows(&mut self) {
        let now = Timestamp::now();
        let mut idx = 0;
        while idx < self.flows.len() {
            let complete = {
                let Some(flow) = self.flows.get(idx) else { break };
                scheduler::flow_is_complete(flow, now) || flow.error.is_some()
            };
            if complete {
                let mut flow = self.flows.remove(idx);
                self.finalize(&mut flow, now);
            } else {
                idx += 1;
            }
        }
        if self.flows.is_empty() {
            self.started = false;
        }
    }

    fn finalize(&mut self, flow: &mut Flow, now: Timestamp) {
        if flow.has_sockets() {
            refresh_telemetry(flow);
            let report = build_report(flow, ReportKind::Total, flow.first_report_time, now);
            self.reports.push(report);
        }
    }

    fn emit_periodic_reports(&mut self, now: Timestamp) {
        for flow in self.flows.iter_mut() {
            let Some(interval) = flow.settings.reporting_interval else { continue };
            if interval.is_zero() || !flow.started {
                continue;
            }
            if now < flow.next_report_time {
                continue;
            }
            refresh_telemetry(flow);
            let report = build_report(flow, ReportKind::Interval, flow.last_report_time, now);
            self.reports.push(report);
            flow.last_report_time = now;
            while flow.next_report_time <= now {
                flow.next_report_time = flow.next_report_time + interval;
            }
        }
    }

    fn drain_requests(&mut self) {
        for pending in self.requests.drain() {
            let outcome = self.handle_request(&pending);
            pending.complete(outcome);
        }
    }

    fn handle_request(&mut self, pending: &PendingRequest) -> RequestOutcome {
        match &pending.kind {
            RequestKind::AddSource(spec) => self.handle_add_source(spec.clone()),
            RequestKind::AddDestination(spec) => self.handle_add_destination(spec.clone()),
            RequestKind::StartFlows => self.handle_start_flows(),
            RequestKind::StopFlow(target) => self.handle_stop_flow(*target),
            RequestKind::GetStatus => RequestOutcome {
                num_flows: Some(self.flows.len()),
                started: Some(self.started),
                ..Default::default()
            },
        }
    }

    fn handle_add_source(&mut self, spec: crate::request::SourceSpec) -> RequestOutcome {
        let id = self.next_flow_id;
        match setup::add_source(self.poll.registry(), id, spec) {
            Ok(flow) => {
                self.flows.insert(flow);
                self.next_flow_id += 1;
                RequestOutcome { flow_id: Some(id), ..Default::default() }
            }
            Err(e) => RequestOutcome { error: Some(e), ..Default::default() },
        }
    }

    fn handle_add_destination(&mut self, spec: crate::request::DestinationSpec) -> RequestOutcome {
        let id = self.next_flow_id;
        match setup::add_destination(self.poll.registry(), id, spec) {
            Ok((flow, reply_addr, data_addr)) => {
                self.flows.insert(flow);
                self.next_flow_id += 1;
                RequestOutcome {
                    flow_id: Some(id),
                    reply_port: Some(reply_addr.port()),
                    data_port: Some(data_addr.port()),
                    ..Default::default()
                }
            }
            Err(e) => RequestOutcome { error: Some(e), ..Default::default() },
        }
    }

    /// Stamps `start`/`stop`/report timestamps from one common `now`
    /// across every flow and arms the write scheduler.
    fn handle_start_flows(&mut self) -> RequestOutcome {
        let now = Timestamp::now();
        for flow in self.flows.iter_mut() {
            for dir in crate::flow::Direction::ALL {
                let settings = flow.dir_settings(dir);
                let start = now + settings.delay;
                flow.start_timestamp[dir as usize] = start;
                flow.stop_timestamp[dir as usize] = settings.duration.map(|d| start + d);
            }
            if flow.settings.write_rate > 0.0 {
                flow.next_write_block_timestamp = flow.start_timestamp[crate::flow::Direction::Write as usize];
            }
            flow.first_report_time = now;
            flow.last_report_time = now;
            if let Some(interval) = flow.settings.reporting_interval {
                if !interval.is_zero() {
                    flow.next_report_time = now + interval;
                }
            }
            flow.started = true;
        }
        self.started = true;
        RequestOutcome::default()
    }

    /// `StopFlow(-1)` drains by repeatedly removing index 0 rather
    /// than walking `0..num_flows` while `remove` shifts indices — the fix
    /// for the original's mass-stop iteration bug (see DESIGN.md).
    fn handle_stop_flow(&mut self, target: StopTarget) -> RequestOutcome {
        match target {
            StopTarget::All => {
                let now = Timestamp::now();
                let reports = self.reports.clone();
                self.flows.drain_all(|mut flow| {
                    if flow.has_sockets() {
                        refresh_telemetry(&mut flow);
                        let report = build_report(&mut flow, ReportKind::Total, flow.first_report_time, now);
                        reports.push(report);
                    }
                });
                self.started = false;
                RequestOutcome::default()
            }
            StopTarget::Id(id) => match self.flows.remove_by_id(id) {
                Some(mut flow) => {
                    let now = Timestamp::now();
                    self.finalize(&mut flow, now);
                    if self.flows.is_empty() {
                        self.started = false;
                    }
                    RequestOutcome::default()
                }
                None => RequestOutcome { error: Some(RequestError::UnknownFlowId(id)), ..Default::default() },
            },
        }
    }
}

fn refresh_telemetry(flow: &mut Flow) {
    if let Some(stream) = &flow.data {
        let (mtu, mss) = mtu_mss(stream);
        flow.mtu = mtu;
        flow.mss = mss;
        flow.tcp_info = tcp_info(stream);
    }
}
