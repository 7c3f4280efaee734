//! Wire format for the data-socket "block" and reply-socket "reply block".
//!
//! Transmitted in host byte order — see the endianness design note in
//! `DESIGN.md`. This is a deliberately preserved defect, not an oversight:
//! fixing it would change interoperability with nothing this crate is asked
//! to interoperate with.

use flowbench_time::Timestamp;

const TIMESTAMP_SIZE: usize = 8;

/// Length of the portion of a data block that gets echoed back verbatim:
/// one length byte plus the embedded send timestamp.
pub const REPLY_HEADER_LEN: u8 = 1 + TIMESTAMP_SIZE as u8;

/// Total size of a reply block: the echoed header plus a trailing `f64` IAT.
pub const REPLY_BLOCK_SIZE: usize = REPLY_HEADER_LEN as usize + 8;

/// Stamps a freshly-started write block's header (length byte + send time)
/// into its first `REPLY_HEADER_LEN` bytes. Panics if `block` is shorter
/// than that — callers are expected to enforce `write_block_size >=
/// REPLY_HEADER_LEN` at flow-construction time.
pub fn stamp_block_header(block: &mut [u8], now: Timestamp) {
    block[0] = REPLY_HEADER_LEN;
    block[1..1 + TIMESTAMP_SIZE].copy_from_slice(&now.as_nanos().to_ne_bytes());
}

/// Reads back a block's echoed length byte and its embedded send timestamp.
pub fn read_block_header(block: &[u8]) -> (u8, Timestamp) {
    let len = block[0];
    let nanos = u64::from_ne_bytes(block[1..1 + TIMESTAMP_SIZE].try_into().unwrap());
    (len, Timestamp::from_nanos(nanos))
}

/// Writes the computed IAT into the block at offset `len` (the echoed
/// header's length), in place, ready to be sliced out as `block[..len+8]`
/// and sent over the reply socket. Callers must ensure `read_block_size >=
/// len as usize + 8`.
pub fn write_iat_into_block(block: &mut [u8], len: u8, iat: f64) {
    let off = len as usize;
    block[off..off + 8].copy_from_slice(&iat.to_ne_bytes());
}

/// Parses a fully-reassembled reply block into `(sent, iat)`. `iat` is NaN
/// when the sender saw no prior block to diff against.
pub fn parse_reply_block(buf: &[u8]) -> (Timestamp, f64) {
    let sent = u64::from_ne_bytes(buf[1..1 + TIMESTAMP_SIZE].try_into().unwrap());
    let iat = f64::from_ne_bytes(buf[1 + TIMESTAMP_SIZE..REPLY_BLOCK_SIZE].try_into().unwrap());
    (Timestamp::from_nanos(sent), iat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_header_round_trips() {
        let mut block = vec![0u8; 64];
        let ts = Timestamp::from_nanos(123_456_789);
        stamp_block_header(&mut block, ts);
        let (len, got) = read_block_header(&block);
        assert_eq!(len, REPLY_HEADER_LEN);
        assert_eq!(got, ts);
    }

    #[test]
    fn reply_block_round_trips() {
        let mut block = vec![0u8; 64];
        let ts = Timestamp::from_nanos(42);
        stamp_block_header(&mut block, ts);
        let (len, _) = read_block_header(&block);
        write_iat_into_block(&mut block, len, 0.0125);
        let reply = &block[..len as usize + 8];
        let (sent, iat) = parse_reply_block(reply);
        assert_eq!(sent, ts);
        assert!((iat - 0.0125).abs() < 1e-12);
    }
}
