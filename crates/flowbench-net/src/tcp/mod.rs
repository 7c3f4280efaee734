mod listener;
mod sockopt;

pub use listener::{accept_nonblocking, bind_listener, connect_nonblocking};
pub use sockopt::{RawSockOpt, TcpInfoSnapshot, apply_extra_socket_options, cork, mtu_mss, set_buf_size, set_nodelay, tcp_info};
