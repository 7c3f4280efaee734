//! Flow setup: `add_source`, `add_destination`, `accept_reply`,
//! `accept_data`. Sequences each destination flow's two-phase accept (reply
//! channel before data channel) and builds on the same non-blocking `mio`
//! listener/connector shape used throughout this crate.

use std::io;
use std::net::SocketAddr;

use flowbench_net::tcp::{accept_nonblocking, apply_extra_socket_options, bind_listener, connect_nonblocking, set_nodelay};
use mio::{Interest, Registry};

use crate::error::RequestError;
use crate::flow::{Flow, FlowState, Role};
use crate::request::{DestinationSpec, SourceSpec};
use crate::token::{SockKind, token_for};

/// Binds the two single-use listeners for a destination flow (reply channel
/// first, data channel second) and registers both for read-readiness.
/// Returns the new flow plus the bound `(reply_addr, data_addr)` so the
/// caller can relay them to the peer.
pub fn add_destination(registry: &Registry, id: u64, spec: DestinationSpec) -> Result<(Flow, SocketAddr, SocketAddr), RequestError> {
    let (mut listen_reply, reply_addr) =
        bind_listener(spec.bind_addr).map_err(|e| RequestError::Setup(e.to_string()))?;
    let (mut listen_data, data_addr) =
        bind_listener(spec.bind_addr).map_err(|e| RequestError::Setup(e.to_string()))?;

    registry
        .register(&mut listen_reply, token_for(id, SockKind::ListenReply), Interest::READABLE)
        .map_err(|e| RequestError::Setup(e.to_string()))?;
    registry
        .register(&mut listen_data, token_for(id, SockKind::ListenData), Interest::READABLE)
        .map_err(|e| RequestError::Setup(e.to_string()))?;

    let mut flow = Flow::new(id, Role::Destination, FlowState::WaitAcceptReply, spec.settings);
    flow.listen_reply = Some(listen_reply);
    flow.listen_data = Some(listen_data);
    flow.listen_reply_token = Some(token_for(id, SockKind::ListenReply));
    flow.listen_data_token = Some(token_for(id, SockKind::ListenData));
    Ok((flow, reply_addr, data_addr))
}

/// Connects the reply/control socket synchronously (this is setup, not the
/// hot loop — a brief block here is acceptable) to the peer's published
/// reply port. If `late_connect` is set, the data-socket connect is left to
/// the scheduler on a later tick; otherwise it's started here, non-blocking.
pub fn add_source(registry: &Registry, id: u64, spec: SourceSpec) -> Result<Flow, RequestError> {
    let reply_stream = std::net::TcpStream::connect(spec.reply_addr).map_err(|e| RequestError::Setup(e.to_string()))?;
    reply_stream.set_nonblocking(true).map_err(|e| RequestError::Setup(e.to_string()))?;
    let mut reply = mio::net::TcpStream::from_std(reply_stream);
    let _ = set_nodelay(&reply, true);

    registry
        .register(&mut reply, token_for(id, SockKind::Reply), Interest::READABLE)
        .map_err(|e| RequestError::Setup(e.to_string()))?;

    let mut flow = Flow::new(id, Role::Source, FlowState::WaitConnectReply, spec.settings.clone());
    flow.reply = Some(reply);
    flow.reply_token = Some(token_for(id, SockKind::Reply));

    match (spec.settings.late_connect, spec.data_addr) {
        (true, addr) => {
            flow.peer_data_addr = addr;
            flow.state = FlowState::Running;
        }
        (false, Some(addr)) => {
            let mut data = connect_nonblocking(addr).map_err(|e| RequestError::Setup(e.to_string()))?;
            apply_extra_socket_options(&data, &flow.settings.extra_socket_options);
            let _ = set_nodelay(&data, true);
            registry
                .register(&mut data, token_for(id, SockKind::Data), Interest::READABLE | Interest::WRITABLE)
                .map_err(|e| RequestError::Setup(e.to_string()))?;
            flow.data = Some(data);
            flow.data_token = Some(token_for(id, SockKind::Data));
            flow.connect_called = true;
            flow.peer_data_addr = Some(addr);
            flow.state = FlowState::Running;
        }
        (false, None) => return Err(RequestError::InvalidSettings("source flow needs a data address unless late_connect".into())),
    }
    Ok(flow)
}

/// Accepts the reply-channel connection, deregisters and drops the
/// single-use listener, and advances the flow into `GrindWaitAccept`.
pub fn accept_reply(registry: &Registry, flow: &mut Flow) -> io::Result<bool> {
    let Some(listener) = &flow.listen_reply else { return Ok(false) };
    let Some((mut stream, _peer)) = accept_nonblocking(listener)? else { return Ok(false) };

    let _ = registry.deregister(flow.listen_reply.as_mut().unwrap());
    flow.listen_reply = None;
    flow.listen_reply_token = None;

    apply_extra_socket_options(&stream, &flow.settings.extra_socket_options);
    let _ = set_nodelay(&stream, true);
    registry.register(&mut stream, token_for(flow.id, SockKind::Reply), Interest::READABLE)?;
    flow.reply = Some(stream);
    flow.reply_token = Some(token_for(flow.id, SockKind::Reply));
    flow.state = FlowState::GrindWaitAccept;
    Ok(true)
}

/// Accepts the data-channel connection, deregisters and drops the listener,
/// and advances the flow to `Running`.
pub fn accept_data(registry: &Registry, flow: &mut Flow) -> io::Result<bool> {
    let Some(listener) = &flow.listen_data else { return Ok(false) };
    let Some((mut stream, peer)) = accept_nonblocking(listener)? else { return Ok(false) };

    let _ = registry.deregister(flow.listen_data.as_mut().unwrap());
    flow.listen_data = None;
    flow.listen_data_token = None;

    apply_extra_socket_options(&stream, &flow.settings.extra_socket_options);
    let _ = set_nodelay(&stream, true);
    registry.register(&mut stream, token_for(flow.id, SockKind::Data), Interest::READABLE)?;
    flow.data = Some(stream);
    flow.data_token = Some(token_for(flow.id, SockKind::Data));
    flow.peer_data_addr = Some(peer);
    flow.connect_called = true;
    flow.state = FlowState::Running;
    Ok(true)
}

/// Starts the deferred data-socket connect for a `late_connect` source flow.
/// Called by the scheduler once the flow has actually started sending.
pub fn late_connect(registry: &Registry, flow: &mut Flow) -> io::Result<()> {
    let addr = flow.peer_data_addr.expect("late_connect flow must carry a target address");
    let mut data = connect_nonblocking(addr)?;
    apply_extra_socket_options(&data, &flow.settings.extra_socket_options);
    let _ = set_nodelay(&data, true);
    registry.register(&mut data, token_for(flow.id, SockKind::Data), Interest::READABLE | Interest::WRITABLE)?;
    flow.data = Some(data);
    flow.data_token = Some(token_for(flow.id, SockKind::Data));
    flow.connect_called = true;
    Ok(())
}
