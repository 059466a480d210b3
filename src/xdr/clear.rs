//! The Clear archive: reset a value to its type's zero state in place.
//! For a generated union this must destroy whatever arm is active and
//! default-construct arm zero, so no stale arm data is ever observable in
//! between — generated `XdrTraits::clear` impls do this by reassigning
//! `*self` to the zero-arm variant rather than mutating fields in place.

use crate::xdr::traits::XdrTraits;

pub fn clear<T: XdrTraits>(value: &mut T) {
    value.clear();
}
