use std::io;
use std::net::SocketAddr;

use mio::net::{TcpListener, TcpStream};
use tracing::warn;

/// Binds a single-use listener for one side (reply or data) of a flow's setup.
/// Port `0` asks the kernel for an ephemeral port; the bound address (with
/// the resolved port) is returned alongside the listener so it can be
/// relayed to the peer by the caller's control channel.
pub fn bind_listener(addr: SocketAddr) -> io::Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind(addr)
        .inspect_err(|e| warn!(%addr, "couldn't bind flow listener: {e}"))?;
    let bound = listener.local_addr()?;
    Ok((listener, bound))
}

/// Non-blocking accept. `Ok(None)` means "would block", not an error —
/// callers only reach here after the listener's readiness fired, but the
/// accept can still race with the connection being torn down first.
pub fn accept_nonblocking(listener: &TcpListener) -> io::Result<Option<(TcpStream, SocketAddr)>> {
    match listener.accept() {
        Ok((stream, peer)) => Ok(Some((stream, peer))),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(e),
    }
}

/// Starts a non-blocking connect. The returned stream is not necessarily
/// connected yet: callers must wait for it to become writable and then
/// check `take_error()` for a late `ECONNREFUSED`/timeout, exactly like the
/// scheduler's `late_connect` handling for the data socket.
pub fn connect_nonblocking(addr: SocketAddr) -> io::Result<TcpStream> {
    TcpStream::connect(addr).inspect_err(|e| warn!(%addr, "couldn't start connect: {e}"))
}
