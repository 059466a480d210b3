use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::xdr::generator::Generator;
use crate::xdr::traits::{pad_len, read_padding, write_padding, XdrTraits};

fn hex_dump(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ")
}

/// `opaque data[N]` — a fixed-length, unpadded-size-known byte array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixedOpaque<const N: usize>(pub [u8; N]);

impl<const N: usize> Default for FixedOpaque<N> {
    fn default() -> Self {
        FixedOpaque([0u8; N])
    }
}

impl<const N: usize> XdrTraits for FixedOpaque<N> {
    const TYPE_NAME: &'static str = "opaque[N]";
    const FIXED_SIZE: Option<usize> = Some(N + pad_len(N));

    fn marshal<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_all(&self.0)?;
        write_padding(out, N)
    }
    fn unmarshal<R: Read>(inp: &mut R) -> Result<Self> {
        let mut buf = [0u8; N];
        inp.read_exact(&mut buf)?;
        read_padding(inp, N)?;
        Ok(FixedOpaque(buf))
    }
    fn clear(&mut self) {
        self.0 = [0u8; N];
    }
    fn print(&self, out: &mut dyn Write, name: &str, indent: usize) -> std::io::Result<()> {
        writeln!(out, "{:indent$}{} = opaque[{N}] {{ {} }}", "", name, hex_dump(&self.0), indent = indent)
    }
    fn depth(&self) -> usize {
        0
    }
    fn generate(gen: &mut Generator) -> Self {
        let mut buf = [0u8; N];
        for b in buf.iter_mut() {
            *b = gen.next_byte();
        }
        FixedOpaque(buf)
    }
}

/// `T elems[N]` — a fixed-length array of an arbitrary `XdrTraits` type.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FixedArray<T, const N: usize>(pub [T; N]);

impl<T: XdrTraits, const N: usize> XdrTraits for FixedArray<T, N> {
    const TYPE_NAME: &'static str = "T[N]";

    fn marshal<W: Write>(&self, out: &mut W) -> Result<()> {
        for item in &self.0 {
            item.marshal(out)?;
        }
        Ok(())
    }
    fn unmarshal<R: Read>(inp: &mut R) -> Result<Self> {
        let mut items: Vec<T> = Vec::with_capacity(N);
        for _ in 0..N {
            items.push(T::unmarshal(inp)?);
        }
        let arr: [T; N] = items
            .try_into()
            .map_err(|_| Error::BadMessageSize("fixed array length mismatch".into()))?;
        Ok(FixedArray(arr))
    }
    fn clear(&mut self) {
        for item in self.0.iter_mut() {
            item.clear();
        }
    }
    fn print(&self, out: &mut dyn Write, name: &str, indent: usize) -> std::io::Result<()> {
        writeln!(out, "{:indent$}{} = [", "", name, indent = indent)?;
        for (i, item) in self.0.iter().enumerate() {
            item.print(out, &format!("[{i}]"), indent + 2)?;
        }
        writeln!(out, "{:indent$}]", "", indent = indent)
    }
    fn depth(&self) -> usize {
        1 + self.0.iter().map(|i| i.depth()).max().unwrap_or(0)
    }
    fn generate(gen: &mut Generator) -> Self {
        let items: Vec<T> = (0..N).map(|_| T::generate(&mut gen.descend())).collect();
        let arr: [T; N] = match items.try_into() {
            Ok(a) => a,
            Err(_) => unreachable!("Vec built with exactly N elements"),
        };
        FixedArray(arr)
    }
}

/// `opaque data<MAX>` — a variable-length, bounded byte vector.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Opaque<const MAX: u32>(pub Vec<u8>);

impl<const MAX: u32> XdrTraits for Opaque<MAX> {
    const TYPE_NAME: &'static str = "opaque<MAX>";

    fn marshal<W: Write>(&self, out: &mut W) -> Result<()> {
        self.validate()?;
        (self.0.len() as u32).marshal(out)?;
        out.write_all(&self.0)?;
        write_padding(out, self.0.len())
    }
    fn unmarshal<R: Read>(inp: &mut R) -> Result<Self> {
        let len = u32::unmarshal(inp)? as usize;
        if len > MAX as usize {
            return Err(Error::overflow(format!(
                "opaque<{MAX}> got length {len}"
            )));
        }
        let mut buf = vec![0u8; len];
        inp.read_exact(&mut buf)?;
        read_padding(inp, len)?;
        Ok(Opaque(buf))
    }
    fn clear(&mut self) {
        self.0.clear();
    }
    fn print(&self, out: &mut dyn Write, name: &str, indent: usize) -> std::io::Result<()> {
        writeln!(out, "{:indent$}{} = opaque<{MAX}>[{}] {{ {} }}", "", name, self.0.len(), hex_dump(&self.0), indent = indent)
    }
    fn depth(&self) -> usize {
        0
    }
    fn generate(gen: &mut Generator) -> Self {
        let n = gen.len_upto(MAX as usize);
        Opaque((0..n).map(|_| gen.next_byte()).collect())
    }
    fn validate(&self) -> Result<()> {
        if self.0.len() > MAX as usize {
            Err(Error::overflow(format!(
                "opaque<{MAX}> holds {} bytes",
                self.0.len()
            )))
        } else {
            Ok(())
        }
    }
}

/// `T elems<MAX>` — a variable-length, bounded vector of an arbitrary
/// `XdrTraits` element type.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct BoundedVec<T, const MAX: u32>(pub Vec<T>);

impl<T: XdrTraits, const MAX: u32> XdrTraits for BoundedVec<T, MAX> {
    const TYPE_NAME: &'static str = "T<MAX>";

    fn marshal<W: Write>(&self, out: &mut W) -> Result<()> {
        self.validate()?;
        (self.0.len() as u32).marshal(out)?;
        for item in &self.0 {
            item.marshal(out)?;
        }
        Ok(())
    }
    fn unmarshal<R: Read>(inp: &mut R) -> Result<Self> {
        let len = u32::unmarshal(inp)? as usize;
        if len > MAX as usize {
            return Err(Error::overflow(format!("vector<{MAX}> got length {len}")));
        }
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(T::unmarshal(inp)?);
        }
        Ok(BoundedVec(items))
    }
    fn clear(&mut self) {
        self.0.clear();
    }
    fn print(&self, out: &mut dyn Write, name: &str, indent: usize) -> std::io::Result<()> {
        writeln!(out, "{:indent$}{} = [", "", name, indent = indent)?;
        for (i, item) in self.0.iter().enumerate() {
            item.print(out, &format!("[{i}]"), indent + 2)?;
        }
        writeln!(out, "{:indent$}]", "", indent = indent)
    }
    fn depth(&self) -> usize {
        1 + self.0.iter().map(|i| i.depth()).max().unwrap_or(0)
    }
    fn generate(gen: &mut Generator) -> Self {
        let n = gen.len_upto(MAX as usize);
        let items = (0..n).map(|_| T::generate(&mut gen.descend())).collect();
        BoundedVec(items)
    }
    fn validate(&self) -> Result<()> {
        if self.0.len() > MAX as usize {
            Err(Error::overflow(format!(
                "vector<{MAX}> holds {} elements",
                self.0.len()
            )))
        } else {
            Ok(())
        }
    }
}

/// `string str<MAX>` — UTF-8-agnostic bounded text; stored as raw bytes
/// like the wire format, with a `str`-validating accessor for convenience.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct XdrString<const MAX: u32>(pub Vec<u8>);

impl<const MAX: u32> XdrString<MAX> {
    pub fn as_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.0)
            .map_err(|e| Error::InvariantFailed(format!("string is not valid utf8: {e}")))
    }
}

impl<const MAX: u32> XdrTraits for XdrString<MAX> {
    const TYPE_NAME: &'static str = "string<MAX>";

    fn marshal<W: Write>(&self, out: &mut W) -> Result<()> {
        self.validate()?;
        (self.0.len() as u32).marshal(out)?;
        out.write_all(&self.0)?;
        write_padding(out, self.0.len())
    }
    fn unmarshal<R: Read>(inp: &mut R) -> Result<Self> {
        let len = u32::unmarshal(inp)? as usize;
        if len > MAX as usize {
            return Err(Error::overflow(format!("string<{MAX}> got length {len}")));
        }
        let mut buf = vec![0u8; len];
        inp.read_exact(&mut buf)?;
        read_padding(inp, len)?;
        Ok(XdrString(buf))
    }
    fn clear(&mut self) {
        self.0.clear();
    }
    fn print(&self, out: &mut dyn Write, name: &str, indent: usize) -> std::io::Result<()> {
        writeln!(
            out,
            "{:indent$}{} = \"{}\"",
            "",
            name,
            String::from_utf8_lossy(&self.0),
            indent = indent
        )
    }
    fn depth(&self) -> usize {
        0
    }
    fn generate(gen: &mut Generator) -> Self {
        let n = gen.len_upto(MAX as usize);
        XdrString((0..n).map(|_| b'a' + (gen.next_byte() % 26)).collect())
    }
    fn validate(&self) -> Result<()> {
        if self.0.len() > MAX as usize {
            Err(Error::overflow(format!(
                "string<{MAX}> holds {} bytes",
                self.0.len()
            )))
        } else {
            Ok(())
        }
    }
}

/// `T *ptr` — an XDR "pointer", an optional value marshaled as a
/// discriminant bool followed by the value if present. Used both for
/// genuinely optional fields and to express recursive types (a linked
/// list is `struct node { T val; node *next; }`).
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Optional<T>(pub Option<Box<T>>);

impl<T> Optional<T> {
    pub fn some(v: T) -> Self {
        Optional(Some(Box::new(v)))
    }
    pub fn none() -> Self {
        Optional(None)
    }
}

impl<T: XdrTraits> XdrTraits for Optional<T> {
    const TYPE_NAME: &'static str = "T*";

    fn marshal<W: Write>(&self, out: &mut W) -> Result<()> {
        match &self.0 {
            None => false.marshal(out),
            Some(v) => {
                true.marshal(out)?;
                v.marshal(out)
            }
        }
    }
    fn unmarshal<R: Read>(inp: &mut R) -> Result<Self> {
        let present = u32::unmarshal(inp)?;
        match present {
            0 => Ok(Optional(None)),
            1 => Ok(Optional(Some(Box::new(T::unmarshal(inp)?)))),
            other => Err(Error::overflow(format!(
                "optional presence flag must be 0 or 1, got {other}"
            ))),
        }
    }
    fn clear(&mut self) {
        self.0 = None;
    }
    fn print(&self, out: &mut dyn Write, name: &str, indent: usize) -> std::io::Result<()> {
        match &self.0 {
            None => writeln!(out, "{:indent$}{} = NULL", "", name, indent = indent),
            Some(v) => v.print(out, name, indent),
        }
    }
    fn depth(&self) -> usize {
        1 + self.0.as_ref().map(|v| v.depth()).unwrap_or(0)
    }
    fn generate(gen: &mut Generator) -> Self {
        if gen.len_upto(1) == 1 {
            Optional(Some(Box::new(T::generate(&mut gen.descend()))))
        } else {
            Optional(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xdr::printer::print_to_string;

    #[test]
    fn optional_unmarshal_rejects_presence_flag_above_one() {
        let bytes = 2u32.to_be_bytes();
        let err = Optional::<u32>::unmarshal(&mut &bytes[..]).unwrap_err();
        assert!(matches!(err, Error::Overflow(_)), "{err:?}");
    }

    #[test]
    fn fixed_array_clear_zeroes_every_element() {
        let mut arr = FixedArray([1u32, 2, 3]);
        arr.clear();
        assert_eq!(arr.0, [0, 0, 0]);
    }

    #[test]
    fn fixed_array_print_lists_each_index() {
        let arr = FixedArray([5u32, 6]);
        let out = print_to_string(&arr, "vals");
        assert!(out.contains("vals = ["));
        assert!(out.contains("[0] = 5"));
        assert!(out.contains("[1] = 6"));
    }

    #[test]
    fn opaque_print_includes_hex_dump() {
        let v: Opaque<16> = Opaque(vec![0xde, 0xad]);
        let out = print_to_string(&v, "bytes");
        assert!(out.contains("de ad"));
    }

    #[test]
    fn bounded_vec_clear_empties_the_vector() {
        let mut v: BoundedVec<u32, 8> = BoundedVec(vec![1, 2, 3]);
        v.clear();
        assert!(v.0.is_empty());
    }

    #[test]
    fn xdr_string_print_shows_the_text() {
        let s: XdrString<16> = XdrString(b"hello".to_vec());
        let out = print_to_string(&s, "greeting");
        assert!(out.contains("greeting = \"hello\""));
    }

    #[test]
    fn optional_print_distinguishes_null_from_present() {
        let none: Optional<u32> = Optional::none();
        assert!(print_to_string(&none, "x").contains("NULL"));

        let some = Optional::some(7u32);
        assert!(print_to_string(&some, "x").contains("x = 7"));
    }

    #[test]
    fn optional_clear_resets_to_none() {
        let mut v = Optional::some(7u32);
        v.clear();
        assert!(v.0.is_none());
    }
}
