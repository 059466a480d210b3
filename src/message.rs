//! Message buffer with room at the front for the RFC 1057 record-mark
//! header: a 4-byte length/last-fragment word followed by the payload.
//! Grounded on `xdrpp/message.h`'s fixed buffer-plus-header-in-front
//! layout, reimplemented as a single growable `Vec<u8>` rather than a
//! hand-managed `alignas` buffer since Rust's allocator already gives the
//! alignment guarantee for free.

use crate::error::{Error, Result};

/// High bit of the record-mark word: set when the fragment is the last
/// (and, per the Non-goals, only) fragment of a record.
const LAST_FRAGMENT_BIT: u32 = 1 << 31;

#[derive(Clone, Debug, Default)]
pub struct Message {
    /// Includes the 4-byte record-mark header at offset 0.
    buf: Vec<u8>,
}

impl Message {
    /// Builds a message from a payload, prefixing it with a record mark.
    /// `payload.len()` must fit in 31 bits and be representable on the
    /// wire; callers that need padding should pad before calling this.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        if payload.len() as u64 > LAST_FRAGMENT_BIT as u64 - 1 {
            return Err(Error::BadMessageSize(format!(
                "payload of {} bytes exceeds maximum fragment size",
                payload.len()
            )));
        }
        let mut buf = Vec::with_capacity(payload.len() + 4);
        let header = payload.len() as u32 | LAST_FRAGMENT_BIT;
        buf.extend_from_slice(&header.to_be_bytes());
        buf.extend_from_slice(payload);
        Ok(Message { buf })
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[4..]
    }

    /// The bytes to hand straight to a socket write: header plus payload.
    pub fn raw(&self) -> &[u8] {
        &self.buf
    }

    pub fn raw_size(&self) -> usize {
        self.buf.len()
    }

    /// Parses a record-mark header, returning `(is_last, fragment_len)`.
    /// Per the Non-goals, a header with `is_last == false` is rejected:
    /// this runtime does not support multi-fragment records.
    pub fn parse_header(header: [u8; 4]) -> Result<(bool, u32)> {
        let word = u32::from_be_bytes(header);
        let is_last = word & LAST_FRAGMENT_BIT != 0;
        let len = word & !LAST_FRAGMENT_BIT;
        if !is_last {
            return Err(Error::BadMessageSize(
                "fragmented records are not supported".into(),
            ));
        }
        Ok((is_last, len))
    }

    pub fn encode_header(len: u32) -> [u8; 4] {
        (len | LAST_FRAGMENT_BIT).to_be_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_payload() {
        let msg = Message::from_payload(&[1, 2, 3, 4]).unwrap();
        assert_eq!(msg.data(), &[1, 2, 3, 4]);
        assert_eq!(msg.raw_size(), 8);
        let mut header = [0u8; 4];
        header.copy_from_slice(&msg.raw()[..4]);
        let (is_last, len) = Message::parse_header(header).unwrap();
        assert!(is_last);
        assert_eq!(len, 4);
    }

    #[test]
    fn rejects_fragmented_header() {
        let header = 10u32.to_be_bytes(); // high bit clear
        assert!(Message::parse_header(header).is_err());
    }
}
