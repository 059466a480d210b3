//! The depth-checker archive: rejects a value (usually just decoded) whose
//! nesting exceeds a configured limit, before any other code recurses into
//! it and risks overflowing the stack. Grounded on `depth_checker.h`'s
//! `max_depth`-bounded walk.

use crate::error::{Error, Result};
use crate::xdr::traits::XdrTraits;

pub const DEFAULT_MAX_DEPTH: usize = 200;

pub fn check_depth<T: XdrTraits>(value: &T, max_depth: usize) -> Result<()> {
    let depth = value.depth();
    if depth > max_depth {
        Err(Error::InvariantFailed(format!(
            "{} nests {depth} deep, exceeding the limit of {max_depth}",
            T::TYPE_NAME
        )))
    } else {
        Ok(())
    }
}
