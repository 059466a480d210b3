//! The Printer archive: a recursive, indented dump used for `xdr_trace_*`
//! style logging and test failure output.

use std::io::Write;

use crate::xdr::traits::XdrTraits;

pub fn print_to_string<T: XdrTraits>(value: &T, name: &str) -> String {
    let mut buf = Vec::new();
    // unwrap: writing into a Vec<u8> cannot fail.
    value.print(&mut buf, name, 0).unwrap();
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn print<T: XdrTraits, W: Write>(value: &T, out: &mut W, name: &str) -> std::io::Result<()> {
    value.print(out, name, 0)
}
