use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::xdr::generator::Generator;

/// Per-type wire/runtime behavior, the thing the code generator emits one
/// impl of per generated struct/union/enum/typedef.
///
/// This is the trait-record idea: rather than a central dispatcher that
/// reflects on a type at runtime, every `XdrTraits` impl carries its own
/// marshal/unmarshal/size/clear/print/depth/generate behavior, resolved
/// statically at the call site. Containers (`FixedArray`, `BoundedVec`,
/// `Opaque`, `XdrString`, `Optional`) implement it generically over their
/// element type; generated structs and unions implement it by chaining
/// calls to their fields' impls in declaration order.
pub trait XdrTraits: Sized + Clone {
    /// Name used in `Printer` output and `BadDiscriminant`/`Overflow` messages.
    const TYPE_NAME: &'static str;

    /// `Some(n)` if every value of this type marshals to exactly `n` bytes.
    const FIXED_SIZE: Option<usize> = None;

    fn marshal<W: Write>(&self, out: &mut W) -> Result<()>;
    fn unmarshal<R: Read>(inp: &mut R) -> Result<Self>;

    /// Exact number of bytes `marshal` will write, including padding.
    fn serial_size(&self) -> usize {
        Self::FIXED_SIZE.unwrap_or_else(|| {
            let mut buf = Vec::new();
            self.marshal(&mut buf).expect("marshal into Vec cannot fail");
            buf.len()
        })
    }

    /// Reset to the type's default/zero value. For unions this must
    /// destroy the active arm and default-construct arm zero, exactly as
    /// `clear.h`'s archive does, so that no stale arm is ever observable.
    fn clear(&mut self) {
        *self = Self::generate(&mut Generator::deterministic(0)).zeroed();
    }

    /// Human-readable dump, one field per call, matching the indentation
    /// style of a pretty-printer archive.
    fn print(&self, out: &mut dyn Write, name: &str, indent: usize) -> std::io::Result<()> {
        writeln!(out, "{:indent$}{} = {:?}", "", name, self.serial_size(), indent = indent)
    }

    /// Maximum nesting depth reachable from this value, used by the
    /// depth-checker archive to reject pathological recursive inputs
    /// before they blow the stack.
    fn depth(&self) -> usize {
        1
    }

    /// Produce an arbitrary instance for property-based testing, bounded
    /// by `gen`'s remaining size budget.
    fn generate(gen: &mut Generator) -> Self;

    /// Optional user-defined structural check, invoked on both the
    /// marshal and unmarshal paths.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn zeroed(&self) -> Self {
        self.clone()
    }
}

macro_rules! xdr_numeric {
    ($t:ty, $write:ident, $read:ident, $size:expr) => {
        impl XdrTraits for $t {
            const TYPE_NAME: &'static str = stringify!($t);
            const FIXED_SIZE: Option<usize> = Some($size);

            fn marshal<W: Write>(&self, out: &mut W) -> Result<()> {
                out.$write::<BigEndian>(*self).map_err(Error::from)
            }
            fn unmarshal<R: Read>(inp: &mut R) -> Result<Self> {
                inp.$read::<BigEndian>().map_err(Error::from)
            }
            fn clear(&mut self) {
                *self = 0 as $t;
            }
            fn print(&self, out: &mut dyn Write, name: &str, indent: usize) -> std::io::Result<()> {
                writeln!(out, "{:indent$}{} = {}", "", name, self, indent = indent)
            }
            fn depth(&self) -> usize {
                0
            }
            fn generate(gen: &mut Generator) -> Self {
                gen.next_u64() as $t
            }
        }
    };
}

xdr_numeric!(i32, write_i32, read_i32, 4);
xdr_numeric!(u32, write_u32, read_u32, 4);
xdr_numeric!(i64, write_i64, read_i64, 8);
xdr_numeric!(u64, write_u64, read_u64, 8);
xdr_numeric!(f32, write_f32, read_f32, 4);
xdr_numeric!(f64, write_f64, read_f64, 8);

impl XdrTraits for bool {
    const TYPE_NAME: &'static str = "bool";
    const FIXED_SIZE: Option<usize> = Some(4);

    fn marshal<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_u32::<BigEndian>(*self as u32).map_err(Error::from)
    }
    fn unmarshal<R: Read>(inp: &mut R) -> Result<Self> {
        let v = inp.read_u32::<BigEndian>()?;
        match v {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::ShouldBeZero(format!(
                "bool discriminant must be 0 or 1, got {other}"
            ))),
        }
    }
    fn clear(&mut self) {
        *self = false;
    }
    fn print(&self, out: &mut dyn Write, name: &str, indent: usize) -> std::io::Result<()> {
        writeln!(out, "{:indent$}{} = {}", "", name, self, indent = indent)
    }
    fn depth(&self) -> usize {
        0
    }
    fn generate(gen: &mut Generator) -> Self {
        gen.next_u64() & 1 == 1
    }
}

/// Padding needed after `len` bytes of opaque/string data to reach a
/// 4-byte boundary, per RFC 4506 section 3.
pub(crate) fn pad_len(len: usize) -> usize {
    (4 - (len % 4)) % 4
}

pub(crate) fn write_padding<W: Write>(out: &mut W, len: usize) -> Result<()> {
    const ZEROS: [u8; 4] = [0; 4];
    let pad = pad_len(len);
    if pad > 0 {
        out.write_all(&ZEROS[..pad])?;
    }
    Ok(())
}

pub(crate) fn read_padding<R: Read>(inp: &mut R, len: usize) -> Result<()> {
    let pad = pad_len(len);
    if pad > 0 {
        let mut zeros = [0u8; 4];
        inp.read_exact(&mut zeros[..pad])?;
        if zeros[..pad].iter().any(|&b| b != 0) {
            return Err(Error::ShouldBeZero("non-zero padding bytes".into()));
        }
    }
    Ok(())
}
