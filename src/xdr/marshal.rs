//! The Put/Get archive: the entry points that turn an `XdrTraits` value
//! into bytes and back, bounded by a maximum message length.

use std::io::Cursor;

use crate::error::{Error, Result};
use crate::xdr::depth::check_depth;
use crate::xdr::traits::XdrTraits;

/// Serializes `value`, invoking its validator first (so a hand-written
/// validator runs on the marshal path as well as the unmarshal path).
pub fn to_bytes<T: XdrTraits>(value: &T) -> Result<Vec<u8>> {
    value.validate()?;
    let mut buf = Vec::with_capacity(value.serial_size());
    value.marshal(&mut buf)?;
    Ok(buf)
}

/// Deserializes a `T`, requiring the input to be consumed exactly —
/// trailing bytes are a `BadMessageSize` error, matching the synchronous
/// server/client requirement that a call or reply consume the whole
/// message.
pub fn from_bytes<T: XdrTraits>(bytes: &[u8]) -> Result<T> {
    let mut cur = Cursor::new(bytes);
    let value = T::unmarshal(&mut cur)?;
    value.validate()?;
    if (cur.position() as usize) != bytes.len() {
        return Err(Error::BadMessageSize(format!(
            "{} trailing bytes after decoding {}",
            bytes.len() - cur.position() as usize,
            T::TYPE_NAME
        )));
    }
    Ok(value)
}

/// Like [`from_bytes`] but permits trailing bytes, returning how many were
/// left over. Useful when a value is a prefix of a larger framed message.
pub fn from_bytes_prefix<T: XdrTraits>(bytes: &[u8]) -> Result<(T, usize)> {
    let mut cur = Cursor::new(bytes);
    let value = T::unmarshal(&mut cur)?;
    value.validate()?;
    Ok((value, bytes.len() - cur.position() as usize))
}

/// Like [`from_bytes`], but runs the depth-checker archive (§4.D) on the
/// decoded value before returning it, rejecting anything nested deeper
/// than `max_depth`. This is the entry point RPC dispatch uses for
/// procedure arguments, since those come straight off the wire from a
/// peer that can shape a pathologically deep union/container chain.
pub fn from_bytes_depth_checked<T: XdrTraits>(bytes: &[u8], max_depth: usize) -> Result<T> {
    let value: T = from_bytes(bytes)?;
    check_depth(&value, max_depth)?;
    Ok(value)
}
