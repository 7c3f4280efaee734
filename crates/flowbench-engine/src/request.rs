use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Condvar, Mutex};

use crate::error::RequestError;
use crate::flow::FlowSettings;

/// Where to stop: a single flow by id, or every flow (the mass-stop case).
#[derive(Clone, Copy, Debug)]
pub enum StopTarget {
    All,
    Id(u64),
}

/// A source flow's setup parameters: the destination's already-published
/// reply-channel address, its data-channel address (absent when
/// `late_connect` defers the data connect to the scheduler), and the flow's
/// settings.
#[derive(Clone, Debug)]
pub struct SourceSpec {
    pub reply_addr: SocketAddr,
    pub data_addr: Option<SocketAddr>,
    pub settings: FlowSettings,
}

/// A destination flow's setup parameters: the local address to bind both
/// single-use listeners on (port 0 for an ephemeral port).
#[derive(Clone, Debug)]
pub struct DestinationSpec {
    pub bind_addr: SocketAddr,
    pub settings: FlowSettings,
}

#[derive(Clone, Debug)]
pub enum RequestKind {
    AddSource(SourceSpec),
    AddDestination(DestinationSpec),
    StartFlows,
    StopFlow(StopTarget),
    GetStatus,
}

/// Result handed back to the requester. `reply_port`/`data_port` are only
/// meaningful for a successful `AddDestination`, echoing back the bound
/// ephemeral ports for the controller to relay to the peer.
#[derive(Clone, Debug, Default)]
pub struct RequestOutcome {
    pub error: Option<RequestError>,
    pub flow_id: Option<u64>,
    pub reply_port: Option<u16>,
    pub data_port: Option<u16>,
    /// Populated only for `GetStatus`.
    pub num_flows: Option<usize>,
    pub started: Option<bool>,
}

struct Slot {
    done: bool,
    outcome: RequestOutcome,
}

/// One inbox entry: the request itself plus the completion handshake the
/// control thread blocks on. A `Mutex` + `Condvar` pair per entry rather
/// than a shared global lock, since each request's completion is
/// independent of every other's.
pub struct PendingRequest {
    pub kind: RequestKind,
    slot: Mutex<Slot>,
    cvar: Condvar,
}

impl PendingRequest {
    fn new(kind: RequestKind) -> Arc<Self> {
        Arc::new(Self { kind, slot: Mutex::new(Slot { done: false, outcome: RequestOutcome::default() }), cvar: Condvar::new() })
    }

    pub fn complete(&self, outcome: RequestOutcome) {
        let mut slot = self.slot.lock().unwrap();
        slot.done = true;
        slot.outcome = outcome;
        self.cvar.notify_all();
    }

    #[must_use]
    pub fn wait(&self) -> RequestOutcome {
        let mut slot = self.slot.lock().unwrap();
        while !slot.done {
            slot = self.cvar.wait(slot).unwrap();
        }
        slot.outcome.clone()
    }
}

/// Control-thread-to-engine inbox. The control thread pushes and writes a
/// byte to the wakeup pipe (see `engine::WakeupPipe`); the engine drains
/// the whole queue every time it wakes.
#[derive(Default)]
pub struct RequestQueue {
    inner: Mutex<VecDeque<Arc<PendingRequest>>>,
}

impl RequestQueue {
    pub fn push(&self, kind: RequestKind) -> Arc<PendingRequest> {
        let req = PendingRequest::new(kind);
        self.inner.lock().unwrap().push_back(req.clone());
        req
    }

    /// Drains every currently-queued request. Requests enqueued after this
    /// call returns are left for the next drain.
    pub fn drain(&self) -> Vec<Arc<PendingRequest>> {
        let mut inner = self.inner.lock().unwrap();
        inner.drain(..).collect()
    }
}
