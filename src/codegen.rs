//! Turns a parsed [`ast::Ast`] into Rust source text: one `struct`/`enum`
//! per XDR struct/enum/union declaration, each with a hand-shaped
//! `impl XdrTraits` (no derive macro — the generator plays the role a
//! derive would, but the crate has no proc-macro crate of its own, so it
//! emits the impl bodies directly as text, the same way the original
//! compiler emits header text).

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::ast::*;
use crate::error::{Error, Result};

/// Maps an XDR builtin type name to the Rust type used on the wire.
fn builtin_rust_type(name: &str) -> Option<&'static str> {
    Some(match name {
        "int" => "i32",
        "unsigned int" | "unsigned" => "u32",
        "hyper" => "i64",
        "unsigned hyper" => "u64",
        "float" => "f32",
        "double" => "f64",
        "bool" => "bool",
        "void" => "()",
        _ => return None,
    })
}

fn bound_literal(bound: &Bound, consts: &HashMap<String, i64>) -> Result<u64> {
    match bound {
        Bound::Literal(n) => Ok(*n),
        Bound::Unbounded => Ok(u32::MAX as u64),
        Bound::Const(name) => consts
            .get(name)
            .map(|v| *v as u64)
            .ok_or_else(|| Error::InvariantFailed(format!("undefined constant `{name}`"))),
    }
}

struct Codegen<'a> {
    consts: &'a HashMap<String, i64>,
    out: String,
    /// Anonymous inline struct/enum/union bodies queued to be emitted as
    /// `_<field>_t` types before the type that embeds them.
    hoisted: Vec<String>,
    /// Whether a previously emitted named type can derive `Eq`/`Ord`: false
    /// for `float`/`double` and for anything that embeds one, since IEEE
    /// floats have no total order. Unknown names (forward references)
    /// default to orderable.
    orderable: HashMap<String, bool>,
}

impl<'a> Codegen<'a> {
    /// Whether every reachable leaf of `t` supports `Eq`/`Ord` (no
    /// `float`/`double` anywhere in it). Used to decide whether a
    /// generated struct/union can derive `Eq, Ord` or only `PartialOrd`.
    fn is_orderable_type_ref(&self, t: &TypeRef) -> bool {
        match t {
            TypeRef::Named(name) => *self.orderable.get(name).unwrap_or(&true),
            TypeRef::InlineStruct(fields) => {
                fields.iter().all(|f| self.is_orderable_type_ref(&f.type_name))
            }
            TypeRef::InlineEnum(_) => true,
            TypeRef::InlineUnion(body) => self.is_orderable_union_body(body),
        }
    }

    fn is_orderable_union_body(&self, body: &UnionBody) -> bool {
        body.cases
            .iter()
            .all(|c| c.decl.as_ref().map(|d| self.is_orderable_type_ref(&d.type_name)).unwrap_or(true))
            && body
                .default
                .as_ref()
                .map(|d| d.as_ref().map(|d| self.is_orderable_type_ref(&d.type_name)).unwrap_or(true))
                .unwrap_or(true)
    }

    fn type_ref_rust(&mut self, owner: &str, field: &str, t: &TypeRef) -> Result<String> {
        match t {
            TypeRef::Named(name) => {
                if let Some(rust) = builtin_rust_type(name) {
                    Ok(rust.to_string())
                } else {
                    Ok(name.clone())
                }
            }
            TypeRef::InlineStruct(fields) => {
                let hoisted_name = format!("_{owner}_{field}_t");
                let body = self.emit_struct_body(&hoisted_name, fields)?;
                self.hoisted.push(body);
                Ok(hoisted_name)
            }
            TypeRef::InlineEnum(tags) => {
                let hoisted_name = format!("_{owner}_{field}_t");
                let body = self.emit_enum_body(&hoisted_name, tags)?;
                self.hoisted.push(body);
                Ok(hoisted_name)
            }
            TypeRef::InlineUnion(body) => {
                let hoisted_name = format!("_{owner}_{field}_t");
                let text = self.emit_union_body(&hoisted_name, body)?;
                self.hoisted.push(text);
                Ok(hoisted_name)
            }
        }
    }

    fn decl_rust_type(&mut self, owner: &str, d: &Decl) -> Result<String> {
        let base = self.type_ref_rust(owner, &d.name, &d.type_name)?;
        let wire = match (&d.type_name, &d.qualifier) {
            (TypeRef::Named(n), Qualifier::VarArray(b)) if n == "opaque" => {
                format!("crate::xdr::Opaque<{}>", bound_literal(b, self.consts)?)
            }
            (TypeRef::Named(n), Qualifier::VarArray(b)) if n == "string" => {
                format!("crate::xdr::XdrString<{}>", bound_literal(b, self.consts)?)
            }
            (_, Qualifier::Scalar) => base,
            (_, Qualifier::Pointer) => format!("crate::xdr::Optional<{base}>"),
            (_, Qualifier::FixedArray(b)) => {
                format!("crate::xdr::FixedArray<{base}, {}>", bound_literal(b, self.consts)?)
            }
            (_, Qualifier::VarArray(b)) => {
                format!("crate::xdr::BoundedVec<{base}, {}>", bound_literal(b, self.consts)?)
            }
        };
        Ok(wire)
    }

    fn emit_struct_body(&mut self, name: &str, fields: &[Decl]) -> Result<String> {
        let mut s = String::new();
        let mut field_decls = Vec::new();
        let mut field_names = Vec::new();
        for f in fields {
            let ty = self.decl_rust_type(name, f)?;
            field_decls.push(format!("    pub {}: {},\n", f.name, ty));
            field_names.push(f.name.clone());
        }
        let orderable = fields.iter().all(|f| self.is_orderable_type_ref(&f.type_name));
        self.orderable.insert(name.to_string(), orderable);
        let ord_derive = if orderable { ", Eq, Ord" } else { "" };
        writeln!(s, "#[derive(Clone, Debug, Default, PartialEq, PartialOrd{ord_derive})]").ok();
        writeln!(s, "pub struct {name} {{").ok();
        for fd in &field_decls {
            s.push_str(fd);
        }
        writeln!(s, "}}").ok();
        writeln!(s, "impl crate::xdr::XdrTraits for {name} {{").ok();
        writeln!(s, "    const TYPE_NAME: &'static str = \"{name}\";").ok();
        writeln!(s, "    fn marshal<W: std::io::Write>(&self, out: &mut W) -> crate::error::Result<()> {{").ok();
        for n in &field_names {
            writeln!(s, "        self.{n}.marshal(out)?;").ok();
        }
        writeln!(s, "        Ok(())\n    }}").ok();
        writeln!(s, "    fn unmarshal<R: std::io::Read>(inp: &mut R) -> crate::error::Result<Self> {{").ok();
        writeln!(s, "        Ok({name} {{").ok();
        for (f, ty) in field_names.iter().zip(field_decls.iter()) {
            let _ = ty;
            writeln!(s, "            {f}: crate::xdr::XdrTraits::unmarshal(inp)?,").ok();
        }
        writeln!(s, "        }})\n    }}").ok();
        writeln!(s, "    fn depth(&self) -> usize {{").ok();
        if field_names.is_empty() {
            writeln!(s, "        0").ok();
        } else {
            let terms: Vec<String> = field_names.iter().map(|n| format!("self.{n}.depth()")).collect();
            writeln!(s, "        1 + [{}].into_iter().max().unwrap_or(0)", terms.join(", ")).ok();
        }
        writeln!(s, "    }}").ok();
        writeln!(
            s,
            "    fn generate(gen: &mut crate::xdr::Generator) -> Self {{"
        ).ok();
        writeln!(s, "        {name} {{").ok();
        for n in &field_names {
            writeln!(s, "            {n}: crate::xdr::XdrTraits::generate(&mut gen.descend()),").ok();
        }
        writeln!(s, "        }}\n    }}").ok();
        writeln!(s, "    fn clear(&mut self) {{").ok();
        for n in &field_names {
            writeln!(s, "        self.{n}.clear();").ok();
        }
        writeln!(s, "    }}").ok();
        writeln!(
            s,
            "    fn print(&self, out: &mut dyn std::io::Write, name: &str, indent: usize) -> std::io::Result<()> {{"
        ).ok();
        writeln!(s, "        writeln!(out, \"{{:indent$}}{{}} = {{{{\", \"\", name, indent = indent)?;").ok();
        for n in &field_names {
            writeln!(s, "        self.{n}.print(out, \"{n}\", indent + 2)?;").ok();
        }
        writeln!(s, "        writeln!(out, \"{{:indent$}}}}}}\", \"\", indent = indent)").ok();
        writeln!(s, "    }}").ok();
        writeln!(s, "}}").ok();
        Ok(s)
    }

    fn emit_enum_body(&mut self, name: &str, tags: &[EnumTag]) -> Result<String> {
        let mut s = String::new();
        writeln!(s, "#[allow(non_camel_case_types)]").ok();
        writeln!(s, "#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]").ok();
        writeln!(s, "#[repr(u32)]").ok();
        writeln!(s, "pub enum {name} {{").ok();
        let mut next_value = 0i64;
        let mut values = Vec::new();
        for tag in tags {
            let value = match &tag.value {
                Some(ConstExpr::Literal(n)) => *n,
                Some(ConstExpr::Named(c)) => *self
                    .consts
                    .get(c)
                    .ok_or_else(|| Error::InvariantFailed(format!("undefined constant `{c}`")))?,
                None => next_value,
            };
            next_value = value + 1;
            writeln!(s, "    {} = {},", tag.name, value).ok();
            values.push((tag.name.clone(), value));
        }
        writeln!(s, "}}").ok();
        writeln!(s, "impl Default for {name} {{").ok();
        let default_variant = values.first().map(|(n, _)| n.clone()).unwrap_or_default();
        writeln!(s, "    fn default() -> Self {{ {name}::{default_variant} }}").ok();
        writeln!(s, "}}").ok();
        writeln!(s, "impl crate::xdr::XdrTraits for {name} {{").ok();
        writeln!(s, "    const TYPE_NAME: &'static str = \"{name}\";").ok();
        writeln!(s, "    const FIXED_SIZE: Option<usize> = Some(4);").ok();
        writeln!(s, "    fn marshal<W: std::io::Write>(&self, out: &mut W) -> crate::error::Result<()> {{").ok();
        writeln!(s, "        (*self as u32).marshal(out)").ok();
        writeln!(s, "    }}").ok();
        writeln!(s, "    fn unmarshal<R: std::io::Read>(inp: &mut R) -> crate::error::Result<Self> {{").ok();
        writeln!(s, "        let v = u32::unmarshal(inp)?;").ok();
        writeln!(s, "        match v as i64 {{").ok();
        for (n, v) in &values {
            writeln!(s, "            {v} => Ok({name}::{n}),").ok();
        }
        writeln!(
            s,
            "            other => Err(crate::error::Error::bad_discriminant(format!(\"{name}: {{other}}\"))),"
        ).ok();
        writeln!(s, "        }}\n    }}").ok();
        writeln!(s, "    fn depth(&self) -> usize {{ 0 }}").ok();
        writeln!(s, "    fn generate(gen: &mut crate::xdr::Generator) -> Self {{").ok();
        writeln!(s, "        const VARIANTS: &[{name}] = &[{}];", values.iter().map(|(n, _)| format!("{name}::{n}")).collect::<Vec<_>>().join(", ")).ok();
        writeln!(s, "        VARIANTS[gen.len_upto(VARIANTS.len() - 1)]").ok();
        writeln!(s, "    }}").ok();
        writeln!(s, "    fn clear(&mut self) {{").ok();
        writeln!(s, "        *self = {name}::default();").ok();
        writeln!(s, "    }}").ok();
        writeln!(
            s,
            "    fn print(&self, out: &mut dyn std::io::Write, name: &str, indent: usize) -> std::io::Result<()> {{"
        ).ok();
        writeln!(s, "        writeln!(out, \"{{:indent$}}{{}} = {{:?}}\", \"\", name, self, indent = indent)").ok();
        writeln!(s, "    }}").ok();
        writeln!(s, "}}").ok();
        self.orderable.insert(name.to_string(), true);
        Ok(s)
    }

    /// Unions compile to a tagged-sum Rust enum (one variant per case,
    /// carrying that arm's payload), not the original's placement-new
    /// storage reuse: Rust's enum already guarantees only one variant's
    /// payload is live at a time, so there is nothing to gain from
    /// reimplementing manual arm construction/destruction. `fieldno`
    /// becomes the match in `unmarshal`/`marshal`, returning
    /// `BadDiscriminant` for a value with no matching arm and no default.
    fn emit_union_body(&mut self, name: &str, body: &UnionBody) -> Result<String> {
        let mut s = String::new();
        let disc_ty = self.decl_rust_type(name, &body.discriminant)?;
        let orderable = self.is_orderable_union_body(body);
        self.orderable.insert(name.to_string(), orderable);
        let ord_derive = if orderable { ", Eq, PartialOrd, Ord" } else { "" };
        writeln!(s, "#[derive(Clone, Debug, PartialEq{ord_derive})]").ok();
        writeln!(s, "pub enum {name} {{").ok();
        let mut arms: Vec<(String, Vec<ConstExpr>, Option<(String, String)>)> = Vec::new();
        for case in &body.cases {
            let variant_name = case
                .labels
                .iter()
                .map(label_ident)
                .collect::<Vec<_>>()
                .join("Or");
            let payload = match &case.decl {
                None => None,
                Some(d) if matches!(&d.type_name, TypeRef::Named(n) if n == "void") => None,
                Some(d) => {
                    let ty = self.decl_rust_type(name, d)?;
                    Some((d.name.clone(), ty))
                }
            };
            match &payload {
                None => writeln!(s, "    {variant_name},").ok(),
                Some((_, ty)) => writeln!(s, "    {variant_name}({ty}),").ok(),
            };
            arms.push((variant_name, case.labels.clone(), payload));
        }
        let default_arm = if let Some(default) = &body.default {
            let variant_name = "Default".to_string();
            match default {
                None => writeln!(s, "    {variant_name},").ok(),
                Some(d) => {
                    let ty = self.decl_rust_type(name, d)?;
                    writeln!(s, "    {variant_name}({ty}),").ok();
                }
            };
            Some(variant_name)
        } else {
            None
        };
        writeln!(s, "}}").ok();

        writeln!(s, "impl Default for {name} {{").ok();
        let (first_variant, _, first_payload) = &arms[0];
        match first_payload {
            None => writeln!(s, "    fn default() -> Self {{ {name}::{first_variant} }}").ok(),
            Some((_, ty)) => writeln!(
                s,
                "    fn default() -> Self {{ {name}::{first_variant}(<{ty} as Default>::default()) }}"
            ).ok(),
        };
        writeln!(s, "}}").ok();

        writeln!(s, "impl crate::xdr::XdrTraits for {name} {{").ok();
        writeln!(s, "    const TYPE_NAME: &'static str = \"{name}\";").ok();
        writeln!(s, "    fn marshal<W: std::io::Write>(&self, out: &mut W) -> crate::error::Result<()> {{").ok();
        writeln!(s, "        match self {{").ok();
        for (variant, labels, payload) in &arms {
            let disc_expr = disc_expr_for(&labels[0], &disc_ty);
            match payload {
                None => {
                    writeln!(s, "            {name}::{variant} => {{ ({disc_expr}).marshal(out) }}").ok()
                }
                Some((_, _)) => writeln!(
                    s,
                    "            {name}::{variant}(v) => {{ ({disc_expr}).marshal(out)?; v.marshal(out) }}"
                ).ok(),
            };
        }
        if let Some(variant) = &default_arm {
            writeln!(
                s,
                "            {name}::{variant}(v) => {{ unreachable!(\"default arm {variant} has no canonical discriminant to marshal: {{v:?}}\") }}",
            ).ok();
        }
        writeln!(s, "        }}\n    }}").ok();

        writeln!(s, "    fn unmarshal<R: std::io::Read>(inp: &mut R) -> crate::error::Result<Self> {{").ok();
        writeln!(s, "        let disc = <{disc_ty} as crate::xdr::XdrTraits>::unmarshal(inp)?;").ok();
        writeln!(s, "        match disc {{").ok();
        for (variant, labels, payload) in &arms {
            let pattern = labels
                .iter()
                .map(|l| disc_pattern_for(l, &disc_ty))
                .collect::<Vec<_>>()
                .join(" | ");
            match payload {
                None => writeln!(s, "            {pattern} => Ok({name}::{variant}),").ok(),
                Some((_, ty)) => writeln!(
                    s,
                    "            {pattern} => Ok({name}::{variant}(<{ty} as crate::xdr::XdrTraits>::unmarshal(inp)?)),"
                ).ok(),
            };
        }
        match &body.default {
            None => {
                writeln!(
                    s,
                    "            other => Err(crate::error::Error::bad_discriminant(format!(\"{name}: {{other:?}}\"))),"
                ).ok()
            }
            Some(None) => writeln!(s, "            _ => Ok({name}::Default),").ok(),
            Some(Some(d)) => {
                let ty = self.decl_rust_type(name, d)?;
                writeln!(
                    s,
                    "            _ => Ok({name}::Default(<{ty} as crate::xdr::XdrTraits>::unmarshal(inp)?)),"
                ).ok()
            }
        };
        writeln!(s, "        }}\n    }}").ok();

        writeln!(s, "    fn depth(&self) -> usize {{").ok();
        writeln!(s, "        match self {{").ok();
        for (variant, _, payload) in &arms {
            match payload {
                None => writeln!(s, "            {name}::{variant} => 0,").ok(),
                Some(_) => writeln!(s, "            {name}::{variant}(v) => 1 + v.depth(),").ok(),
            };
        }
        if let Some(variant) = &default_arm {
            writeln!(s, "            {name}::{variant}(v) => 1 + v.depth(),").ok();
        }
        writeln!(s, "        }}\n    }}").ok();

        writeln!(s, "    fn generate(gen: &mut crate::xdr::Generator) -> Self {{").ok();
        writeln!(s, "        Self::default()").ok();
        writeln!(s, "    }}").ok();

        // `clear` always reassigns to the zero arm rather than checking
        // whether the current discriminant already matches it, so arm
        // storage is re-initialized even when the discriminant doesn't
        // change (design note 9).
        writeln!(s, "    fn clear(&mut self) {{").ok();
        writeln!(s, "        *self = {name}::default();").ok();
        writeln!(s, "    }}").ok();

        // Only the active arm is ever printed; the discriminant itself is
        // not shown since the arm's presence already implies it.
        writeln!(
            s,
            "    fn print(&self, out: &mut dyn std::io::Write, name: &str, indent: usize) -> std::io::Result<()> {{"
        ).ok();
        writeln!(s, "        match self {{").ok();
        for (variant, _, payload) in &arms {
            match payload {
                None => writeln!(
                    s,
                    "            {name}::{variant} => writeln!(out, \"{{:indent$}}{{}} = {name}::{variant}\", \"\", name, indent = indent),"
                ).ok(),
                Some(_) => writeln!(
                    s,
                    "            {name}::{variant}(v) => v.print(out, name, indent),"
                ).ok(),
            };
        }
        if let Some(variant) = &default_arm {
            if matches!(&body.default, Some(Some(_))) {
                writeln!(
                    s,
                    "            {name}::{variant}(v) => v.print(out, name, indent),"
                ).ok();
            } else {
                writeln!(
                    s,
                    "            {name}::{variant} => writeln!(out, \"{{:indent$}}{{}} = {name}::{variant}\", \"\", name, indent = indent),"
                ).ok();
            }
        }
        writeln!(s, "        }}\n    }}").ok();
        writeln!(s, "}}").ok();

        // Per-arm typed accessors (design note 9): reading a field whose
        // arm isn't active is a caller bug, not malformed input, so it
        // returns `WrongUnion` rather than panicking or silently
        // returning a default. The active-arm-only invariant is enforced
        // by construction (matching a tagged-sum `enum` can only ever see
        // one payload), so there's nothing else to check here.
        let mut seen_fields: Vec<(String, String)> = Vec::new();
        let mut all_arms = arms.clone();
        if let (Some(variant), Some(Some(d))) = (&default_arm, &body.default) {
            if !matches!(&d.type_name, TypeRef::Named(n) if n == "void") {
                let ty = self.decl_rust_type(name, d)?;
                all_arms.push((variant.clone(), Vec::new(), Some((d.name.clone(), ty))));
            }
        }
        for (_, _, payload) in &all_arms {
            if let Some((field, ty)) = payload {
                if !seen_fields.iter().any(|(f, _)| f == field) {
                    seen_fields.push((field.clone(), ty.clone()));
                }
            }
        }
        if !seen_fields.is_empty() {
            writeln!(s, "impl {name} {{").ok();
            for (field, ty) in &seen_fields {
                let matching: Vec<&str> = all_arms
                    .iter()
                    .filter(|(_, _, p)| matches!(p, Some((f, _)) if f == field))
                    .map(|(v, _, _)| v.as_str())
                    .collect();
                writeln!(s, "    pub fn {field}(&self) -> crate::error::Result<&{ty}> {{").ok();
                writeln!(s, "        match self {{").ok();
                for variant in &matching {
                    writeln!(s, "            {name}::{variant}(v) => Ok(v),").ok();
                }
                writeln!(
                    s,
                    "            other => Err(crate::error::Error::WrongUnion(format!(\"{name}::{field}: active arm is {{other:?}}\"))),"
                ).ok();
                writeln!(s, "        }}\n    }}").ok();
            }
            writeln!(s, "}}").ok();
        }

        Ok(s)
    }
}

fn label_ident(c: &ConstExpr) -> String {
    match c {
        ConstExpr::Literal(n) => format!("V{n}").replace('-', "Neg"),
        ConstExpr::Named(n) => to_pascal_case(n),
    }
}

fn to_pascal_case(s: &str) -> String {
    s.split('_')
        .filter(|p| !p.is_empty())
        .map(|p| {
            let mut c = p.chars();
            match c.next() {
                Some(first) => first.to_uppercase().collect::<String>() + c.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

fn disc_expr_for(c: &ConstExpr, disc_ty: &str) -> String {
    match c {
        ConstExpr::Literal(n) if disc_ty == "bool" => (*n != 0).to_string(),
        ConstExpr::Literal(n) => format!("{n} as {disc_ty}"),
        ConstExpr::Named(n) => n.clone(),
    }
}

fn disc_pattern_for(c: &ConstExpr, disc_ty: &str) -> String {
    match c {
        ConstExpr::Literal(n) => format!("_ if disc as i64 == {n}"),
        ConstExpr::Named(n) => format!("{disc_ty}::{n}"),
    }
}

fn emit_program(prog: &ProgramDef) -> String {
    let mut s = String::new();
    writeln!(s, "#[allow(non_upper_case_globals)]").ok();
    writeln!(s, "pub mod {} {{", prog.name).ok();
    writeln!(s, "    use super::*;").ok();
    writeln!(
        s,
        "    pub const PROGRAM: u32 = {};",
        match &prog.number {
            ConstExpr::Literal(n) => n.to_string(),
            ConstExpr::Named(n) => n.clone(),
        }
    )
    .ok();
    for vers in &prog.versions {
        writeln!(
            s,
            "    pub const {}: u32 = {};",
            vers.name,
            match &vers.number {
                ConstExpr::Literal(n) => n.to_string(),
                ConstExpr::Named(n) => n.clone(),
            }
        )
        .ok();
        writeln!(s, "    pub trait {} {{", vers.name).ok();
        for proc in &vers.procs {
            let args: Vec<String> = proc
                .arg_types
                .iter()
                .enumerate()
                .map(|(i, t)| format!("arg{i}: {t}"))
                .collect();
            writeln!(
                s,
                "        fn {}(&mut self, {}) -> crate::error::Result<{}>;",
                proc.name,
                args.join(", "),
                proc.res_type
            )
            .ok();
        }
        writeln!(s, "    }}").ok();
    }
    writeln!(s, "}}").ok();
    s
}

/// Generates the full Rust module text for an AST, in declaration order.
pub fn generate(ast: &Ast) -> Result<String> {
    let mut consts = HashMap::new();
    for sym in ast {
        if let Symbol::Const(c) = sym {
            if let ConstExpr::Literal(n) = &c.value {
                consts.insert(c.name.clone(), *n);
            }
        }
    }

    let mut orderable = HashMap::new();
    orderable.insert("float".to_string(), false);
    orderable.insert("double".to_string(), false);

    let mut cg = Codegen { consts: &consts, out: String::new(), hoisted: Vec::new(), orderable };
    writeln!(cg.out, "// This file is generated. Do not edit by hand.").ok();
    writeln!(cg.out, "#![allow(non_camel_case_types, dead_code, clippy::all)]").ok();
    writeln!(cg.out, "use crate::xdr::XdrTraits as _;").ok();
    writeln!(cg.out).ok();

    for sym in ast {
        match sym {
            Symbol::Const(c) => {
                let v = match &c.value {
                    ConstExpr::Literal(n) => n.to_string(),
                    ConstExpr::Named(n) => n.clone(),
                };
                writeln!(cg.out, "pub const {}: i64 = {};", c.name, v).ok();
            }
            Symbol::Typedef(t) => {
                let ty = cg.decl_rust_type("typedef", &t.decl)?;
                writeln!(cg.out, "pub type {} = {};", t.decl.name, ty).ok();
            }
            Symbol::Struct(def) => {
                let body = cg.emit_struct_body(&def.name, &def.fields)?;
                flush_hoisted(&mut cg);
                cg.out.push_str(&body);
            }
            Symbol::Enum(def) => {
                let body = cg.emit_enum_body(&def.name, &def.tags)?;
                flush_hoisted(&mut cg);
                cg.out.push_str(&body);
            }
            Symbol::Union(def) => {
                let body = cg.emit_union_body(&def.name, &def.body)?;
                flush_hoisted(&mut cg);
                cg.out.push_str(&body);
            }
            Symbol::Program(def) => {
                cg.out.push_str(&emit_program(def));
            }
            Symbol::Literal(line) => {
                cg.out.push_str(line);
                cg.out.push('\n');
            }
            Symbol::NamespaceOpen(name) => {
                writeln!(cg.out, "#[allow(non_snake_case)]").ok();
                writeln!(cg.out, "pub mod {name} {{").ok();
                writeln!(cg.out, "    use super::*;").ok();
            }
            Symbol::NamespaceClose => {
                writeln!(cg.out, "}}").ok();
            }
        }
        cg.out.push('\n');
    }
    Ok(cg.out)
}

fn flush_hoisted(cg: &mut Codegen) {
    for h in cg.hoisted.drain(..) {
        cg.out.push_str(&h);
        cg.out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_file;

    #[test]
    fn struct_emits_traits_impl() {
        let (ast, errors) = parse_file("t.x", "struct point { int x; int y; };");
        assert!(errors.is_empty());
        let out = generate(&ast).unwrap();
        assert!(out.contains("pub struct point"));
        assert!(out.contains("impl crate::xdr::XdrTraits for point"));
        assert!(out.contains("self.x.marshal(out)?;"));
    }

    #[test]
    fn union_with_default_emits_bad_discriminant_fallback() {
        let (ast, errors) = parse_file(
            "t.x",
            "union u switch (int d) { case 1: int i; };",
        );
        assert!(errors.is_empty());
        let out = generate(&ast).unwrap();
        assert!(out.contains("pub enum u"));
        assert!(out.contains("bad_discriminant"));
    }

    #[test]
    fn namespace_wraps_members_in_a_module() {
        let (ast, errors) = parse_file("t.x", "namespace ns { const X = 1; }");
        assert!(errors.is_empty());
        let out = generate(&ast).unwrap();
        assert!(out.contains("pub mod ns {"));
        assert!(out.contains("pub const X: i64 = 1;"));
    }

    #[test]
    fn union_arm_accessor_returns_wrong_union_on_mismatch() {
        let (ast, errors) = parse_file(
            "t.x",
            "union u switch (int d) { case 1: int i; case 2: string s<16>; };",
        );
        assert!(errors.is_empty());
        let out = generate(&ast).unwrap();
        assert!(out.contains("pub fn i(&self) -> crate::error::Result<&i32>"));
        assert!(out.contains("pub fn s(&self) -> crate::error::Result<&crate::xdr::XdrString<16>>"));
        assert!(out.contains("Error::WrongUnion"));
    }

    #[test]
    fn undefined_constant_bound_is_an_error() {
        let (ast, errors) = parse_file("t.x", "struct s { opaque data<NOPE>; };");
        assert!(errors.is_empty());
        assert!(generate(&ast).is_err());
    }

    #[test]
    fn struct_of_orderable_fields_derives_ord() {
        let (ast, errors) = parse_file("t.x", "struct point { int x; int y; };");
        assert!(errors.is_empty());
        let out = generate(&ast).unwrap();
        assert!(out.contains("PartialOrd, Eq, Ord)]\npub struct point"));
    }

    #[test]
    fn struct_containing_a_float_does_not_derive_ord() {
        let (ast, errors) = parse_file("t.x", "struct p { float x; };");
        assert!(errors.is_empty());
        let out = generate(&ast).unwrap();
        assert!(out.contains("PartialOrd)]\npub struct p"));
        assert!(!out.contains(", Eq, Ord)]\npub struct p"));
    }

    #[test]
    fn union_of_orderable_arms_derives_ord() {
        let (ast, errors) = parse_file(
            "t.x",
            "union u switch (int d) { case 1: int i; case 2: string s<16>; };",
        );
        assert!(errors.is_empty());
        let out = generate(&ast).unwrap();
        assert!(out.contains("PartialEq, Eq, PartialOrd, Ord)]\npub enum u"));
    }

    #[test]
    fn union_containing_a_double_does_not_derive_ord() {
        let (ast, errors) = parse_file(
            "t.x",
            "union u switch (int d) { case 1: double amount; };",
        );
        assert!(errors.is_empty());
        let out = generate(&ast).unwrap();
        assert!(out.contains("PartialEq)]\npub enum u"));
    }

    #[test]
    fn struct_emits_real_clear_and_print() {
        let (ast, errors) = parse_file("t.x", "struct point { int x; int y; };");
        assert!(errors.is_empty());
        let out = generate(&ast).unwrap();
        assert!(out.contains("fn clear(&mut self) {\n        self.x.clear();\n        self.y.clear();\n    }"));
        assert!(out.contains("self.x.print(out, \"x\", indent + 2)?;"));
    }

    #[test]
    fn union_emits_real_clear_and_print() {
        let (ast, errors) = parse_file(
            "t.x",
            "union u switch (int d) { case 1: int i; };",
        );
        assert!(errors.is_empty());
        let out = generate(&ast).unwrap();
        assert!(out.contains("fn clear(&mut self) {\n        *self = u::default();\n    }"));
        assert!(out.contains("u::V1(v) => v.print(out, name, indent),"));
    }

    #[test]
    fn enum_emits_real_clear_and_print() {
        let (ast, errors) = parse_file("t.x", "enum color { RED, GREEN, BLUE };");
        assert!(errors.is_empty());
        let out = generate(&ast).unwrap();
        assert!(out.contains("fn clear(&mut self) {\n        *self = color::default();\n    }"));
    }
}
