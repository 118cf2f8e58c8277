//! Abstract syntax tree for Callisto.
//!
//! The tree is a closed set of variants; backends dispatch on the tag and
//! there is no visitor hierarchy. Every node carries the span of the tokens
//! it was parsed from. `Display` prints the canonical source form, which the
//! parser accepts back unchanged.

use std::fmt;

use crate::lexer::token::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Word(WordNode),
    Integer(IntegerNode),
    String(StringNode),
    Array(ArrayNode),
    FuncDef(FuncDefNode),
    Include(IncludeNode),
    Asm(AsmNode),
    If(IfNode),
    While(WhileNode),
    Let(LetNode),
    Enable(FeatureNode),
    Requires(FeatureNode),
    Restrict(FeatureNode),
    Version(VersionNode),
    Struct(StructNode),
    Const(ConstNode),
    Enum(EnumNode),
    Union(UnionNode),
    Alias(AliasNode),
    Extern(ExternNode),
    Addr(AddrNode),
    Implement(ImplementNode),
    Set(SetNode),
}

/// A bare identifier: a function call, variable load or constant push,
/// resolved during lowering.
#[derive(Debug, Clone, PartialEq)]
pub struct WordNode {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntegerNode {
    pub value: i64,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringNode {
    pub value: String,
    /// Set by the `c"..."` attribute: realised once in the data segment
    /// instead of copied onto the variable stack.
    pub constant: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayNode {
    pub element_type: String,
    pub elements: Vec<Node>,
    pub constant: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub type_name: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDefNode {
    pub name: String,
    pub inline: bool,
    pub raw: bool,
    pub params: Vec<Param>,
    pub body: Vec<Node>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncludeNode {
    pub path: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AsmNode {
    /// Raw assembly text, one line per string token, newline-terminated.
    pub code: String,
    pub span: Span,
}

/// One `if`/`elseif` arm. The parser guarantees at least one clause per
/// `IfNode`, so conditions and bodies always pair up.
#[derive(Debug, Clone, PartialEq)]
pub struct IfClause {
    pub condition: Vec<Node>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    pub clauses: Vec<IfClause>,
    pub else_body: Option<Vec<Node>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileNode {
    pub condition: Vec<Node>,
    pub body: Vec<Node>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LetNode {
    pub type_name: String,
    pub name: String,
    pub array: bool,
    pub array_size: usize,
    pub span: Span,
}

/// Shared shape of `enable`, `requires` and `restrict`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureNode {
    pub feature: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VersionNode {
    pub feature: String,
    pub not: bool,
    pub body: Vec<Node>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub type_name: String,
    pub name: String,
    pub array: bool,
    pub array_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructNode {
    pub name: String,
    pub parent: Option<String>,
    pub members: Vec<StructField>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstNode {
    pub name: String,
    pub value: i64,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumMember {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumNode {
    pub name: String,
    pub base_type: String,
    pub members: Vec<EnumMember>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionNode {
    pub name: String,
    pub members: Vec<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AliasNode {
    pub to: String,
    pub from: String,
    pub overwrite: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternKind {
    Native,
    Raw,
    C,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternNode {
    pub name: String,
    pub kind: ExternKind,
    /// Return type, C externs only.
    pub ret_type: Option<String>,
    /// Parameter types, C externs only.
    pub param_types: Vec<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddrNode {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImplementMethod {
    Init,
    Deinit,
}

impl ImplementMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImplementMethod::Init => "init",
            ImplementMethod::Deinit => "deinit",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImplementNode {
    pub struct_name: String,
    pub method: ImplementMethod,
    pub body: Vec<Node>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetNode {
    pub name: String,
    pub span: Span,
}

impl Node {
    pub fn span(&self) -> &Span {
        match self {
            Node::Word(n) => &n.span,
            Node::Integer(n) => &n.span,
            Node::String(n) => &n.span,
            Node::Array(n) => &n.span,
            Node::FuncDef(n) => &n.span,
            Node::Include(n) => &n.span,
            Node::Asm(n) => &n.span,
            Node::If(n) => &n.span,
            Node::While(n) => &n.span,
            Node::Let(n) => &n.span,
            Node::Enable(n) => &n.span,
            Node::Requires(n) => &n.span,
            Node::Restrict(n) => &n.span,
            Node::Version(n) => &n.span,
            Node::Struct(n) => &n.span,
            Node::Const(n) => &n.span,
            Node::Enum(n) => &n.span,
            Node::Union(n) => &n.span,
            Node::Alias(n) => &n.span,
            Node::Extern(n) => &n.span,
            Node::Addr(n) => &n.span,
            Node::Implement(n) => &n.span,
            Node::Set(n) => &n.span,
        }
    }
}

/// Re-escape a string body for printing inside quotes.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            '\u{1b}' => out.push_str("\\e"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(ch),
        }
    }
    out
}

fn write_each(f: &mut fmt::Formatter<'_>, nodes: &[Node]) -> fmt::Result {
    for node in nodes {
        write!(f, " {node}")?;
    }
    Ok(())
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Word(n) => write!(f, "{}", n.name),
            Node::Integer(n) => write!(f, "{}", n.value),
            Node::String(n) => {
                if n.constant {
                    write!(f, "c\"{}\"", escape(&n.value))
                } else {
                    write!(f, "\"{}\"", escape(&n.value))
                }
            }
            Node::Array(n) => {
                write!(f, "[")?;
                if n.constant {
                    write!(f, "c ")?;
                }
                write!(f, "{}", n.element_type)?;
                write_each(f, &n.elements)?;
                write!(f, "]")
            }
            Node::FuncDef(n) => {
                write!(f, "{}", if n.inline { "inline" } else { "func" })?;
                if n.raw {
                    write!(f, " raw")?;
                }
                write!(f, " {}", n.name)?;
                for param in &n.params {
                    write!(f, " {} {}", param.type_name, param.name)?;
                }
                write!(f, " begin")?;
                write_each(f, &n.body)?;
                write!(f, " end")
            }
            Node::Include(n) => write!(f, "include \"{}\"", escape(&n.path)),
            Node::Asm(n) => {
                write!(f, "asm")?;
                for line in n.code.lines() {
                    write!(f, " \"{}\"", escape(line))?;
                }
                write!(f, " end")
            }
            Node::If(n) => {
                for (i, clause) in n.clauses.iter().enumerate() {
                    write!(f, "{}", if i == 0 { "if" } else { " elseif" })?;
                    write_each(f, &clause.condition)?;
                    write!(f, " then")?;
                    write_each(f, &clause.body)?;
                }
                if let Some(else_body) = &n.else_body {
                    write!(f, " else")?;
                    write_each(f, else_body)?;
                }
                write!(f, " end")
            }
            Node::While(n) => {
                write!(f, "while")?;
                write_each(f, &n.condition)?;
                write!(f, " do")?;
                write_each(f, &n.body)?;
                write!(f, " end")
            }
            Node::Let(n) => {
                if n.array {
                    write!(f, "let array {} {} {}", n.array_size, n.type_name, n.name)
                } else {
                    write!(f, "let {} {}", n.type_name, n.name)
                }
            }
            Node::Enable(n) => write!(f, "enable {}", n.feature),
            Node::Requires(n) => write!(f, "requires {}", n.feature),
            Node::Restrict(n) => write!(f, "restrict {}", n.feature),
            Node::Version(n) => {
                write!(f, "version ")?;
                if n.not {
                    write!(f, "not ")?;
                }
                write!(f, "{}", n.feature)?;
                write_each(f, &n.body)?;
                write!(f, " end")
            }
            Node::Struct(n) => {
                write!(f, "struct {}", n.name)?;
                if let Some(parent) = &n.parent {
                    write!(f, " : {parent}")?;
                }
                for member in &n.members {
                    if member.array {
                        write!(f, " array {} {} {}", member.array_size, member.type_name, member.name)?;
                    } else {
                        write!(f, " {} {}", member.type_name, member.name)?;
                    }
                }
                write!(f, " end")
            }
            Node::Const(n) => write!(f, "const {} {}", n.name, n.value),
            Node::Enum(n) => {
                write!(f, "enum {} : {}", n.name, n.base_type)?;
                for member in &n.members {
                    write!(f, " {} = {}", member.name, member.value)?;
                }
                write!(f, " end")
            }
            Node::Union(n) => {
                write!(f, "union {}", n.name)?;
                for member in &n.members {
                    write!(f, " {member}")?;
                }
                write!(f, " end")
            }
            Node::Alias(n) => {
                if n.overwrite {
                    write!(f, "alias overwrite {} {}", n.to, n.from)
                } else {
                    write!(f, "alias {} {}", n.to, n.from)
                }
            }
            Node::Extern(n) => match n.kind {
                ExternKind::Native => write!(f, "extern {}", n.name),
                ExternKind::Raw => write!(f, "extern raw {}", n.name),
                ExternKind::C => {
                    let ret = n.ret_type.as_deref().unwrap_or("cell");
                    write!(f, "extern C {ret} {}", n.name)?;
                    for param in &n.param_types {
                        write!(f, " {param}")?;
                    }
                    write!(f, " end")
                }
            },
            Node::Addr(n) => write!(f, "&{}", n.name),
            Node::Implement(n) => {
                write!(f, "implement {} {}", n.struct_name, n.method.as_str())?;
                write_each(f, &n.body)?;
                write!(f, " end")
            }
            Node::Set(n) => write!(f, "-> {}", n.name),
        }
    }
}
