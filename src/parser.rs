//! Parser for the XDR specification language (RFC 4506 section 6),
//! written with the `peg` parser-combinator crate rather than a
//! yacc/bison grammar. Input is assumed already preprocessed (`%`-prefixed
//! lines pass straight through as literals, matching the behavior of
//! feeding a file through `cpp` before handing it to the original
//! compiler).

use std::collections::HashMap;

use crate::ast::*;

#[derive(Clone, Debug)]
pub struct ParseError {
    pub file: String,
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parses a full `.x` file, returning the declarations that parsed
/// successfully along with errors for the declarations that didn't.
/// Unlike a fail-fast parser, a bad top-level declaration is skipped (by
/// scanning to the next top-level `;`) so later, unrelated errors in the
/// same file are also reported in one pass.
pub fn parse_file(file_name: &str, source: &str) -> (Ast, Vec<ParseError>) {
    let mut ast = Vec::new();
    let mut lines = Vec::new();
    let mut errors = Vec::new();
    for chunk in split_top_level(source) {
        let trimmed = chunk.text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(literal) = trimmed.strip_prefix('%') {
            ast.push(Symbol::Literal(literal.to_string()));
            lines.push(chunk.line);
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("namespace") {
            let name = rest.trim_end_matches('{').trim();
            ast.push(Symbol::NamespaceOpen(name.to_string()));
            lines.push(chunk.line);
            continue;
        }
        if trimmed == "}" {
            ast.push(Symbol::NamespaceClose);
            lines.push(chunk.line);
            continue;
        }
        match xdr_grammar::top_level_decl(chunk.text) {
            Ok(sym) => {
                ast.push(sym);
                lines.push(chunk.line);
            }
            Err(e) => errors.push(ParseError {
                file: file_name.to_string(),
                line: chunk.line,
                message: e.to_string(),
            }),
        }
    }
    errors.extend(validate_ast(file_name, &ast, &lines));
    (ast, errors)
}

/// Semantic checks the grammar itself can't express: every identifier
/// declared at the same namespace scope must be distinct, and every
/// union's case labels (including those of unions nested inline in
/// struct/typedef fields) must be pairwise disjoint.
fn validate_ast(file_name: &str, ast: &Ast, lines: &[usize]) -> Vec<ParseError> {
    let mut errors = Vec::new();
    let mut consts = HashMap::new();
    for sym in ast {
        if let Symbol::Const(c) = sym {
            if let ConstExpr::Literal(n) = &c.value {
                consts.insert(c.name.clone(), *n);
            }
        }
    }

    let mut scopes: Vec<HashMap<String, usize>> = vec![HashMap::new()];
    for (sym, &line) in ast.iter().zip(lines.iter()) {
        match sym {
            Symbol::NamespaceOpen(_) => scopes.push(HashMap::new()),
            Symbol::NamespaceClose => {
                if scopes.len() > 1 {
                    scopes.pop();
                }
            }
            Symbol::Const(c) => check_duplicate(&mut scopes, &c.name, line, file_name, &mut errors),
            Symbol::Typedef(t) => {
                check_duplicate(&mut scopes, &t.decl.name, line, file_name, &mut errors)
            }
            Symbol::Struct(s) => check_duplicate(&mut scopes, &s.name, line, file_name, &mut errors),
            Symbol::Enum(e) => check_duplicate(&mut scopes, &e.name, line, file_name, &mut errors),
            Symbol::Union(u) => check_duplicate(&mut scopes, &u.name, line, file_name, &mut errors),
            Symbol::Program(p) => check_duplicate(&mut scopes, &p.name, line, file_name, &mut errors),
            Symbol::Literal(_) => {}
        }

        let mut bodies = Vec::new();
        collect_union_bodies(sym, &mut bodies);
        for body in bodies {
            check_case_disjointness(file_name, line, body, &consts, &mut errors);
        }
    }
    errors
}

fn check_duplicate(
    scopes: &mut [HashMap<String, usize>],
    name: &str,
    line: usize,
    file_name: &str,
    errors: &mut Vec<ParseError>,
) {
    let scope = scopes.last_mut().expect("scope stack is never empty");
    if let Some(&first_line) = scope.get(name) {
        errors.push(ParseError {
            file: file_name.to_string(),
            line,
            message: format!("`{name}` redeclared (first declared at line {first_line})"),
        });
    } else {
        scope.insert(name.to_string(), line);
    }
}

fn collect_union_bodies<'a>(sym: &'a Symbol, out: &mut Vec<&'a UnionBody>) {
    match sym {
        Symbol::Typedef(t) => walk_decl(&t.decl, out),
        Symbol::Struct(s) => {
            for f in &s.fields {
                walk_decl(f, out);
            }
        }
        Symbol::Union(u) => walk_union_body(&u.body, out),
        Symbol::Const(_)
        | Symbol::Enum(_)
        | Symbol::Program(_)
        | Symbol::Literal(_)
        | Symbol::NamespaceOpen(_)
        | Symbol::NamespaceClose => {}
    }
}

fn walk_decl<'a>(d: &'a Decl, out: &mut Vec<&'a UnionBody>) {
    walk_type_ref(&d.type_name, out);
}

fn walk_type_ref<'a>(t: &'a TypeRef, out: &mut Vec<&'a UnionBody>) {
    match t {
        TypeRef::Named(_) => {}
        TypeRef::InlineStruct(fields) => {
            for f in fields {
                walk_decl(f, out);
            }
        }
        TypeRef::InlineEnum(_) => {}
        TypeRef::InlineUnion(body) => walk_union_body(body, out),
    }
}

fn walk_union_body<'a>(body: &'a UnionBody, out: &mut Vec<&'a UnionBody>) {
    out.push(body);
    for case in &body.cases {
        if let Some(d) = &case.decl {
            walk_decl(d, out);
        }
    }
    if let Some(Some(d)) = &body.default {
        walk_decl(d, out);
    }
}

/// A case label resolved far enough to compare for overlap: a literal
/// integer (after resolving named constants), or a name that couldn't be
/// resolved (an enum tag or forward reference), compared by spelling.
#[derive(PartialEq, Eq, Hash)]
enum LabelKey {
    Int(i64),
    Name(String),
}

fn resolve_label(c: &ConstExpr, consts: &HashMap<String, i64>) -> LabelKey {
    match c {
        ConstExpr::Literal(n) => LabelKey::Int(*n),
        ConstExpr::Named(name) => match consts.get(name) {
            Some(v) => LabelKey::Int(*v),
            None => LabelKey::Name(name.clone()),
        },
    }
}

fn check_case_disjointness(
    file_name: &str,
    line: usize,
    body: &UnionBody,
    consts: &HashMap<String, i64>,
    errors: &mut Vec<ParseError>,
) {
    let mut seen: std::collections::HashSet<LabelKey> = std::collections::HashSet::new();
    for case in &body.cases {
        for label in &case.labels {
            let key = resolve_label(label, consts);
            if !seen.insert(key) {
                errors.push(ParseError {
                    file: file_name.to_string(),
                    line,
                    message: format!("union case label `{label:?}` reused across arms"),
                });
            }
        }
    }
}

struct Chunk<'a> {
    text: &'a str,
    line: usize,
}

/// Splits the source into top-level declarations on semicolons that are
/// not nested inside `{ }`, single `%`-prefixed lines on their own, and
/// `namespace NAME {` / bare `}` namespace markers on their own. This lets
/// the real grammar parse one declaration at a time, so a syntax error in
/// one struct doesn't prevent parsing the rest of the file.
///
/// A `namespace` header has no terminating semicolon and its matching
/// close is a bare `}` rather than one balanced by an opening `{` inside
/// the same chunk, so both are recognized directly here rather than left
/// to the grammar: any `}` seen while `depth == 0` cannot belong to a
/// struct/union/enum body (those always balance their own braces before
/// `depth` returns to 0), so it must be closing a namespace.
fn split_top_level(source: &str) -> Vec<Chunk<'_>> {
    let mut chunks = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    let mut line = 1usize;
    let mut start_line = 1usize;
    let bytes = source.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c == '\n' {
            line += 1;
        }
        if c == '%' && depth == 0 && is_line_start(source, i) {
            // verbatim line: runs to end of line
            let line_end = source[i..].find('\n').map(|o| i + o).unwrap_or(source.len());
            if start < i {
                chunks.push(Chunk { text: &source[start..i], line: start_line });
            }
            chunks.push(Chunk { text: &source[i..line_end], line });
            start = line_end;
            start_line = line;
            i = line_end;
            continue;
        }
        if depth == 0 && c == 'n' && is_word_start(source, i) && source[i..].starts_with("namespace")
            && source.as_bytes().get(i + "namespace".len()).map(|b| !(*b as char).is_alphanumeric() && *b != b'_').unwrap_or(true)
        {
            if let Some(brace_off) = source[i..].find('{') {
                let brace_pos = i + brace_off;
                if start < i {
                    chunks.push(Chunk { text: &source[start..i], line: start_line });
                }
                line += source[i..=brace_pos].matches('\n').count();
                chunks.push(Chunk { text: &source[i..=brace_pos], line: start_line });
                start = brace_pos + 1;
                start_line = line;
                i = brace_pos + 1;
                continue;
            }
        }
        if depth == 0 && c == '}' {
            if start < i {
                chunks.push(Chunk { text: &source[start..i], line: start_line });
            }
            chunks.push(Chunk { text: &source[i..=i], line });
            start = i + 1;
            start_line = line;
            i += 1;
            continue;
        }
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            ';' if depth == 0 => {
                chunks.push(Chunk { text: &source[start..=i], line: start_line });
                start = i + 1;
                start_line = line;
            }
            _ => {}
        }
        i += 1;
    }
    if start < source.len() {
        chunks.push(Chunk { text: &source[start..], line: start_line });
    }
    chunks
}

fn is_line_start(source: &str, pos: usize) -> bool {
    pos == 0 || source.as_bytes()[pos - 1] == b'\n'
}

fn is_word_start(source: &str, pos: usize) -> bool {
    pos == 0 || !(source.as_bytes()[pos - 1] as char).is_alphanumeric() && source.as_bytes()[pos - 1] != b'_'
}

peg::parser! {
    grammar xdr_grammar() for str {
        rule _() = quiet!{ ([' ' | '\t' | '\r' | '\n'] / comment())* }

        rule comment()
            = "/*" (!"*/" [_])* "*/"
            / "//" (!['\n'] [_])* ['\n']?

        rule ident() -> String
            = quiet!{ s:$(['a'..='z' | 'A'..='Z' | '_'] ['a'..='z' | 'A'..='Z' | '0'..='9' | '_']*) } { s.to_string() }
            / expected!("identifier")

        rule number() -> i64
            = n:$(['-']? ['0'..='9']+) {? n.parse().or(Err("number")) }
            / "0x" n:$(['0'..='9' | 'a'..='f' | 'A'..='F']+) {? i64::from_str_radix(n, 16).or(Err("hex number")) }

        rule const_expr() -> ConstExpr
            = n:number() { ConstExpr::Literal(n) }
            / "TRUE" !['a'..='z' | 'A'..='Z' | '0'..='9' | '_'] { ConstExpr::Literal(1) }
            / "FALSE" !['a'..='z' | 'A'..='Z' | '0'..='9' | '_'] { ConstExpr::Literal(0) }
            / id:ident() { ConstExpr::Named(id) }

        rule bound() -> Bound
            = "<" _ b:(c:const_expr() {c})? _ ">" {
                match b {
                    None => Bound::Unbounded,
                    Some(ConstExpr::Literal(n)) => Bound::Literal(n as u64),
                    Some(ConstExpr::Named(s)) => Bound::Const(s),
                }
            }
            / "[" _ b:const_expr() _ "]" {
                match b {
                    ConstExpr::Literal(n) => Bound::Literal(n as u64),
                    ConstExpr::Named(s) => Bound::Const(s),
                }
            }

        rule type_name() -> TypeRef
            = "struct" _ "{" _ fields:(decl() ** (_ ";" _)) _ ";"? _ "}" { TypeRef::InlineStruct(fields) }
            / "enum" _ "{" _ tags:(enum_tag() ** (_ "," _)) _ "}" { TypeRef::InlineEnum(tags) }
            / "union" _ body:union_body() { TypeRef::InlineUnion(Box::new(body)) }
            / id:ident() { TypeRef::Named(id) }

        rule decl() -> Decl
            = "string" _ name:ident() _ b:bound() {
                Decl { name, type_name: TypeRef::Named("string".into()), qualifier: Qualifier::VarArray(b) }
            }
            / "opaque" _ name:ident() _ b:bound_brackets_or_angle() {
                Decl { name, type_name: TypeRef::Named("opaque".into()), qualifier: b }
            }
            / t:type_name() _ "*" _ name:ident() {
                Decl { name, type_name: t, qualifier: Qualifier::Pointer }
            }
            / t:type_name() _ name:ident() _ "<" _ b:(c:const_expr(){c})? _ ">" {
                let bound = match b {
                    None => Bound::Unbounded,
                    Some(ConstExpr::Literal(n)) => Bound::Literal(n as u64),
                    Some(ConstExpr::Named(s)) => Bound::Const(s),
                };
                Decl { name, type_name: t, qualifier: Qualifier::VarArray(bound) }
            }
            / t:type_name() _ name:ident() _ "[" _ b:const_expr() _ "]" {
                let bound = match b {
                    ConstExpr::Literal(n) => Bound::Literal(n as u64),
                    ConstExpr::Named(s) => Bound::Const(s),
                };
                Decl { name, type_name: t, qualifier: Qualifier::FixedArray(bound) }
            }
            / "void" { Decl { name: String::new(), type_name: TypeRef::Named("void".into()), qualifier: Qualifier::Scalar } }
            / t:type_name() _ name:ident() {
                Decl { name, type_name: t, qualifier: Qualifier::Scalar }
            }

        rule bound_brackets_or_angle() -> Qualifier
            = "<" _ b:(c:const_expr(){c})? _ ">" {
                let bound = match b {
                    None => Bound::Unbounded,
                    Some(ConstExpr::Literal(n)) => Bound::Literal(n as u64),
                    Some(ConstExpr::Named(s)) => Bound::Const(s),
                };
                Qualifier::VarArray(bound)
            }
            / "[" _ b:const_expr() _ "]" {
                let bound = match b {
                    ConstExpr::Literal(n) => Bound::Literal(n as u64),
                    ConstExpr::Named(s) => Bound::Const(s),
                };
                Qualifier::FixedArray(bound)
            }

        rule enum_tag() -> EnumTag
            = name:ident() _ v:("=" _ v:const_expr() { v })? { EnumTag { name, value: v } }

        rule union_body() -> UnionBody
            = "switch" _ "(" _ d:decl() _ ")" _ "{" _
              cases:(union_case())*
              def:("default" _ ":" _ d:decl() _ ";" { d })?
              _ "}" {
                UnionBody { discriminant: d, cases, default: def.map(Some) }
            }

        rule union_case() -> UnionCase
            = labels:("case" _ l:const_expr() _ ":" _ { l })+ decl:(d:decl() _ ";" { d })? {
                UnionCase { labels, decl }
            }

        rule const_decl() -> Symbol
            = "const" _ name:ident() _ "=" _ v:const_expr() _ ";"? _ {
                Symbol::Const(ConstDef { name, value: v })
            }

        rule typedef_decl() -> Symbol
            = "typedef" _ d:decl() _ ";"? _ { Symbol::Typedef(TypedefDef { decl: d }) }

        rule struct_decl() -> Symbol
            = "struct" _ name:ident() _ "{" _ fields:(f:decl() _ ";" _ { f })* "}" _ ";"? _ {
                Symbol::Struct(StructDef { name, fields })
            }

        rule enum_decl() -> Symbol
            = "enum" _ name:ident() _ "{" _ tags:(enum_tag() ** (_ "," _)) _ ","? _ "}" _ ";"? _ {
                Symbol::Enum(EnumDef { name, tags })
            }

        rule union_decl() -> Symbol
            = "union" _ name:ident() _ body:union_body() _ ";"? _ {
                Symbol::Union(UnionDef { name, body })
            }

        rule proc_decl() -> ProcDef
            = res:ident() _ name:ident() _ "(" _ args:(ident() ** (_ "," _)) _ ")" _ "=" _ n:const_expr() _ ";" _ {
                ProcDef { name, number: n, arg_types: args, res_type: res }
            }

        rule vers_decl() -> VersDef
            = "version" _ name:ident() _ "{" _ procs:(proc_decl())* "}" _ "=" _ n:const_expr() _ ";" _ {
                VersDef { name, number: n, procs }
            }

        rule program_decl() -> Symbol
            = "program" _ name:ident() _ "{" _ versions:(vers_decl())* "}" _ "=" _ n:const_expr() _ ";"? _ {
                Symbol::Program(ProgramDef { name, number: n, versions })
            }

        pub rule top_level_decl() -> Symbol
            = _ s:(const_decl() / typedef_decl() / struct_decl() / enum_decl() / union_decl() / program_decl()) _ { s }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_const_and_struct() {
        let src = "const MAXLEN = 16;\nstruct item { int id; opaque data<MAXLEN>; };";
        let (ast, errors) = parse_file("t.x", src);
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(ast.len(), 2);
        assert!(matches!(ast[0], Symbol::Const(_)));
        match &ast[1] {
            Symbol::Struct(s) => assert_eq!(s.fields.len(), 2),
            other => panic!("expected struct, got {other:?}"),
        }
    }

    #[test]
    fn recovers_past_a_bad_declaration() {
        let src = "struct good { int a; };\nstruct *** broken ***;\nconst X = 1;";
        let (ast, errors) = parse_file("t.x", src);
        assert_eq!(errors.len(), 1);
        assert_eq!(ast.len(), 2);
    }

    #[test]
    fn namespace_open_and_close_are_distinct_symbols() {
        let src = "namespace outer {\nconst X = 1;\n}\nconst Y = 2;";
        let (ast, errors) = parse_file("t.x", src);
        assert!(errors.is_empty(), "{errors:?}");
        assert!(matches!(ast[0], Symbol::NamespaceOpen(ref n) if n == "outer"));
        assert!(matches!(ast[1], Symbol::Const(_)));
        assert!(matches!(ast[2], Symbol::NamespaceClose));
        assert!(matches!(ast[3], Symbol::Const(_)));
    }

    #[test]
    fn union_with_default_parses() {
        let src = "union u switch (int d) { case 1: string s<16>; default: void; };";
        let (ast, errors) = parse_file("t.x", src);
        assert!(errors.is_empty(), "{errors:?}");
        match &ast[0] {
            Symbol::Union(u) => {
                assert_eq!(u.body.cases.len(), 1);
                assert!(u.body.default.is_some());
            }
            other => panic!("expected union, got {other:?}"),
        }
    }

    #[test]
    fn bool_case_labels_resolve_to_literals() {
        let src = "union u switch (bool b) { case TRUE: int x; case FALSE: void; };";
        let (ast, errors) = parse_file("t.x", src);
        assert!(errors.is_empty(), "{errors:?}");
        match &ast[0] {
            Symbol::Union(u) => {
                assert_eq!(u.body.cases[0].labels, vec![ConstExpr::Literal(1)]);
                assert_eq!(u.body.cases[1].labels, vec![ConstExpr::Literal(0)]);
            }
            other => panic!("expected union, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_top_level_name_is_an_error() {
        let src = "const X = 1;\nstruct X { int a; };";
        let (_, errors) = parse_file("t.x", src);
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert!(errors[0].message.contains("redeclared"));
    }

    #[test]
    fn duplicate_name_in_distinct_namespaces_is_allowed() {
        let src = "namespace a {\nconst X = 1;\n}\nnamespace b {\nconst X = 2;\n}";
        let (_, errors) = parse_file("t.x", src);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn overlapping_union_case_labels_are_an_error() {
        let src = "const ONE = 1;\nunion u switch (int d) { case 1: int x; case ONE: int y; };";
        let (_, errors) = parse_file("t.x", src);
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert!(errors[0].message.contains("reused"));
    }

    #[test]
    fn disjoint_union_case_labels_parse_cleanly() {
        let src = "union u switch (int d) { case 1: int x; case 2: int y; };";
        let (_, errors) = parse_file("t.x", src);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn inline_union_case_labels_are_checked_too() {
        let src = "struct s { union switch (int d) { case 1: int x; case 1: int y; } inner; };";
        let (_, errors) = parse_file("t.x", src);
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert!(errors[0].message.contains("reused"));
    }
}
