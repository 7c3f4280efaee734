use thiserror::Error;

/// Flow-local failure. Carried as an attached string on the flow's final
/// TOTAL report for the controller to see; never propagated as a Rust
/// panic or process abort.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),
    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),
    #[error("reply socket failed: {0}")]
    Reply(#[source] std::io::Error),
    #[error("unexpected EOF while still expected to send")]
    UnexpectedEof,
    #[error("late connect failed: {0}")]
    LateConnect(#[source] std::io::Error),
    #[error("congestion watchdog tripped after {0} late completions")]
    Congestion(u32),
    #[error("socket setup failed: {0}")]
    Setup(#[source] std::io::Error),
}

/// Request-local failure, attached to the offending request and returned
/// to the waiting control-thread caller. Never fails the daemon itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("unknown flow id {0}")]
    UnknownFlowId(u64),
    #[error("unknown request type")]
    UnknownRequestType,
    #[error("socket setup failed: {0}")]
    Setup(String),
    #[error("invalid flow settings: {0}")]
    InvalidSettings(String),
}

/// Engine-fatal: the process cannot continue usefully. The only response
/// is to log at ERROR and abort — an unrecoverable readiness-selector
/// failure has no good retry path.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("readiness selector failed: {0}")]
    Selector(#[source] std::io::Error),
    #[error("wakeup pipe failed: {0}")]
    WakeupPipe(#[source] std::io::Error),
}
