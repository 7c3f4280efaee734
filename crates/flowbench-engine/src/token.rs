//! Maps between a flow's id and the `mio::Token`s its sockets are
//! registered under, so the event loop can recover "which flow, which
//! socket" from a bare `mio::Token` without keeping a side table.

use mio::Token;

/// Reserved token for the wakeup [`mio::Waker`]; never produced by
/// [`token_for`] since flow ids are shifted left before the kind is packed
/// in, and this value's low two bits (`11`) would decode to
/// [`SockKind::ListenData`] for flow id `usize::MAX >> 2`, a flow id this
/// engine will never reach.
pub const WAKE_TOKEN: Token = Token(usize::MAX);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SockKind {
    Data = 0,
    Reply = 1,
    ListenReply = 2,
    ListenData = 3,
}

impl SockKind {
    fn from_bits(bits: usize) -> Self {
        match bits {
            0 => SockKind::Data,
            1 => SockKind::Reply,
            2 => SockKind::ListenReply,
            _ => SockKind::ListenData,
        }
    }
}

#[must_use]
pub fn token_for(id: u64, kind: SockKind) -> Token {
    Token(((id as usize) << 2) | kind as usize)
}

#[must_use]
pub fn decode_token(token: Token) -> (u64, SockKind) {
    let bits = token.0;
    ((bits >> 2) as u64, SockKind::from_bits(bits & 0b11))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_kind() {
        for kind in [SockKind::Data, SockKind::Reply, SockKind::ListenReply, SockKind::ListenData] {
            let t = token_for(42, kind);
            assert_eq!(decode_token(t), (42, kind));
        }
    }

    #[test]
    fn never_collides_with_wake_token() {
        assert_ne!(token_for(u32::MAX as u64, SockKind::ListenData), WAKE_TOKEN);
    }
}
