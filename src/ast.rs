//! The abstract syntax tree produced by [`crate::parser`] and consumed by
//! [`crate::codegen`]. Mirrors the symbol kinds an XDR specification file
//! can declare, in the order the grammar recognizes them.

/// A bound on an array/vector/string declaration: either a literal integer
/// or a named constant resolved later against the symbol table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Bound {
    Literal(u64),
    Const(String),
    /// No explicit bound was written (`<>`); the wire limit is `u32::MAX`.
    Unbounded,
}

/// How a declared field's type relates to its base type name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Qualifier {
    Scalar,
    Pointer,
    FixedArray(Bound),
    VarArray(Bound),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decl {
    pub name: String,
    pub type_name: TypeRef,
    pub qualifier: Qualifier,
}

/// A reference to a type: either a name already in scope, or one of the
/// anonymous struct/enum/union bodies embedded directly in a field
/// declaration (hoisted by the code generator into a `_<field>_t` type).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeRef {
    Named(String),
    InlineStruct(Vec<Decl>),
    InlineEnum(Vec<EnumTag>),
    InlineUnion(Box<UnionBody>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumTag {
    pub name: String,
    pub value: Option<ConstExpr>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConstExpr {
    Literal(i64),
    Named(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnionCase {
    /// One case label can cover several discriminant values
    /// (`case A: case B: arm;`).
    pub labels: Vec<ConstExpr>,
    pub decl: Option<Decl>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnionBody {
    pub discriminant: Decl,
    pub cases: Vec<UnionCase>,
    pub default: Option<Option<Decl>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Decl>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumDef {
    pub name: String,
    pub tags: Vec<EnumTag>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnionDef {
    pub name: String,
    pub body: UnionBody,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypedefDef {
    pub decl: Decl,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstDef {
    pub name: String,
    pub value: ConstExpr,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcDef {
    pub name: String,
    pub number: ConstExpr,
    pub arg_types: Vec<String>,
    pub res_type: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersDef {
    pub name: String,
    pub number: ConstExpr,
    pub procs: Vec<ProcDef>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramDef {
    pub name: String,
    pub number: ConstExpr,
    pub versions: Vec<VersDef>,
}

/// One top-level declaration. Order is preserved because later
/// declarations may reference earlier ones and the generator emits code
/// in the same order so forward references aren't required.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Symbol {
    Const(ConstDef),
    Typedef(TypedefDef),
    Struct(StructDef),
    Enum(EnumDef),
    Union(UnionDef),
    Program(ProgramDef),
    /// A `%`-prefixed verbatim line, passed through to the generated
    /// output unchanged.
    Literal(String),
    /// `namespace NAME {` — opens a namespace scope; every symbol until
    /// the matching [`Symbol::NamespaceClose`] nests under it.
    NamespaceOpen(String),
    /// The bare `}` that closes the innermost open namespace.
    NamespaceClose,
}

pub type Ast = Vec<Symbol>;
