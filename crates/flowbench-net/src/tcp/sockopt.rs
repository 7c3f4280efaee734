use std::io;
use std::os::fd::AsRawFd;

use tracing::debug;

/// An opaque `setsockopt(level, optname, value)` triple, as configured
/// per-flow by the (out of scope) controller. `value` is interpreted as a
/// raw `c_int` — this mirrors the handful of socket options the original
/// daemon exposes as pass-through integer knobs (e.g. `IP_TOS`, `SO_DEBUG`).
#[derive(Clone, Copy, Debug)]
pub struct RawSockOpt {
    pub level: libc::c_int,
    pub optname: libc::c_int,
    pub value: libc::c_int,
}

fn setsockopt_int(fd: libc::c_int, level: libc::c_int, optname: libc::c_int, value: libc::c_int) -> io::Result<()> {
    let rc = unsafe {
        libc::setsockopt(
            fd,
            level,
            optname,
            std::ptr::addr_of!(value).cast::<libc::c_void>(),
            core::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc == 0 { Ok(()) } else { Err(io::Error::last_os_error()) }
}

/// Sets kernel `SO_SNDBUF`/`SO_RCVBUF` on a non-blocking TCP stream.
pub fn set_buf_size<S: AsRawFd>(stream: &S, size: usize) -> io::Result<()> {
    let fd = stream.as_raw_fd();
    let size = size as libc::c_int;
    setsockopt_int(fd, libc::SOL_SOCKET, libc::SO_SNDBUF, size)?;
    setsockopt_int(fd, libc::SOL_SOCKET, libc::SO_RCVBUF, size)
}

pub fn set_nodelay<S: AsRawFd>(stream: &S, on: bool) -> io::Result<()> {
    setsockopt_int(stream.as_raw_fd(), libc::IPPROTO_TCP, libc::TCP_NODELAY, libc::c_int::from(on))
}

/// Best-effort `TCP_CORK` toggle. Linux-only; a no-op elsewhere, logged at
/// DEBUG so callers can tell the option was never applied rather than
/// silently assuming it was.
#[cfg(target_os = "linux")]
pub fn cork<S: AsRawFd>(stream: &S, on: bool) -> io::Result<()> {
    setsockopt_int(stream.as_raw_fd(), libc::IPPROTO_TCP, libc::TCP_CORK, libc::c_int::from(on))
}

#[cfg(not(target_os = "linux"))]
pub fn cork<S: AsRawFd>(_stream: &S, _on: bool) -> io::Result<()> {
    debug!("TCP_CORK unsupported on this platform");
    Ok(())
}

/// Applies the ordered list of raw per-flow socket options. A single
/// failing option only logs at DEBUG and does not abort the rest; exotic
/// socket tuning is always best-effort.
pub fn apply_extra_socket_options<S: AsRawFd>(stream: &S, opts: &[RawSockOpt]) {
    let fd = stream.as_raw_fd();
    for opt in opts {
        if let Err(e) = setsockopt_int(fd, opt.level, opt.optname, opt.value) {
            debug!(?opt, "couldn't apply socket option: {e}");
        }
    }
}

/// Best-effort MTU/MSS query. `None` means unsupported on this platform or
/// rejected by the kernel; absence is modeled with `Option` rather than a
/// sentinel value.
#[cfg(target_os = "linux")]
pub fn mtu_mss<S: AsRawFd>(stream: &S) -> (Option<i32>, Option<i32>) {
    let fd = stream.as_raw_fd();
    let mtu = getsockopt_int(fd, libc::IPPROTO_IP, libc::IP_MTU);
    let mss = getsockopt_int(fd, libc::IPPROTO_TCP, libc::TCP_MAXSEG);
    (mtu, mss)
}

#[cfg(not(target_os = "linux"))]
pub fn mtu_mss<S: AsRawFd>(_stream: &S) -> (Option<i32>, Option<i32>) {
    (None, None)
}

#[cfg(target_os = "linux")]
fn getsockopt_int(fd: libc::c_int, level: libc::c_int, optname: libc::c_int) -> Option<i32> {
    let mut value: libc::c_int = 0;
    let mut len = core::mem::size_of::<libc::c_int>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(fd, level, optname, std::ptr::addr_of_mut!(value).cast::<libc::c_void>(), &mut len)
    };
    if rc == 0 { Some(value) } else { None }
}

/// A small subset of `struct tcp_info`, snapshotted opportunistically for
/// reports. Linux-only; absent elsewhere (see the per-platform telemetry
/// design note).
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpInfoSnapshot {
    pub rtt_us: u32,
    pub retransmits: u8,
    pub snd_cwnd: u32,
}

#[cfg(target_os = "linux")]
pub fn tcp_info<S: AsRawFd>(stream: &S) -> Option<TcpInfoSnapshot> {
    let fd = stream.as_raw_fd();
    let mut info: libc::tcp_info = unsafe { core::mem::zeroed() };
    let mut len = core::mem::size_of::<libc::tcp_info>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::IPPROTO_TCP,
            libc::TCP_INFO,
            std::ptr::addr_of_mut!(info).cast::<libc::c_void>(),
            &mut len,
        )
    };
    if rc != 0 {
        return None;
    }
    Some(TcpInfoSnapshot {
        rtt_us: info.tcpi_rtt,
        retransmits: info.tcpi_retransmits,
        snd_cwnd: info.tcpi_snd_cwnd,
    })
}

#[cfg(not(target_os = "linux"))]
pub fn tcp_info<S: AsRawFd>(_stream: &S) -> Option<TcpInfoSnapshot> {
    None
}
