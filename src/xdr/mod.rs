//! Generic XDR (RFC 4506) codec: bounded container types, the
//! [`traits::XdrTraits`] trait-record every generated type implements, and
//! the family of archives (put/get, clear, printer, compare,
//! depth-checker, generator) built on top of it.

pub mod clear;
pub mod compare;
pub mod container;
pub mod depth;
pub mod generator;
pub mod marshal;
pub mod printer;
pub mod traits;

pub use container::{BoundedVec, FixedArray, FixedOpaque, Opaque, Optional, XdrString};
pub use generator::Generator;
pub use marshal::{from_bytes, from_bytes_depth_checked, from_bytes_prefix, to_bytes};
pub use traits::XdrTraits;
