//! Lowering: AST to target assembly.
//!
//! The `Compiler` drives a `Backend` over the AST roots. Top-level
//! statements are emitted into a `calmain` entry section while definitions
//! (functions, types, constants, externs, implement blocks and globals)
//! contribute symbols regardless of where they appear. Version directives
//! are resolved before the backend sees a single node.

pub mod context;
pub mod uxn;


use std::path::Path;

use crate::lexer::token::Span;
use crate::parser::ast::*;

#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub message: String,
    pub span: Span,
}

impl CompileError {
    pub fn new(message: impl Into<String>, span: &Span) -> Self {
        Self {
            message: message.into(),
            span: span.clone(),
        }
    }
}

/// One subprocess the driver runs after the assembly has been written.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Cleanup commands are skipped when the driver keeps the assembly.
    pub cleanup: bool,
}

impl FinalCommand {
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
            cleanup: false,
        }
    }

    pub fn cleanup(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
            cleanup: true,
        }
    }
}

/// A code-generation target.
///
/// A backend owns its symbol tables and an append-only output buffer; the
/// `Compiler` only decides which operation to invoke for which node.
pub trait Backend {
    /// Emit the runtime preamble: virtual stack-pointer setup, reset vector
    /// and the jump into `calmain`.
    fn init(&mut self);

    /// Open the `calmain` entry section.
    fn begin_main(&mut self);

    /// Close `calmain` (running global deinit hooks) and emit the data
    /// segments for globals and realised arrays.
    fn end(&mut self);

    fn compile_word(&mut self, node: &WordNode) -> Result<(), CompileError>;
    fn compile_integer(&mut self, node: &IntegerNode) -> Result<(), CompileError>;
    fn compile_string(&mut self, node: &StringNode) -> Result<(), CompileError>;
    fn compile_array(&mut self, node: &ArrayNode) -> Result<(), CompileError>;
    fn compile_func_def(&mut self, node: &FuncDefNode) -> Result<(), CompileError>;
    fn compile_asm(&mut self, node: &AsmNode) -> Result<(), CompileError>;
    fn compile_if(&mut self, node: &IfNode) -> Result<(), CompileError>;
    fn compile_while(&mut self, node: &WhileNode) -> Result<(), CompileError>;
    fn compile_let(&mut self, node: &LetNode) -> Result<(), CompileError>;
    fn compile_struct(&mut self, node: &StructNode) -> Result<(), CompileError>;
    fn compile_const(&mut self, node: &ConstNode) -> Result<(), CompileError>;
    fn compile_enum(&mut self, node: &EnumNode) -> Result<(), CompileError>;
    fn compile_union(&mut self, node: &UnionNode) -> Result<(), CompileError>;
    fn compile_alias(&mut self, node: &AliasNode) -> Result<(), CompileError>;
    fn compile_extern(&mut self, node: &ExternNode) -> Result<(), CompileError>;
    fn compile_addr(&mut self, node: &AddrNode) -> Result<(), CompileError>;
    fn compile_implement(&mut self, node: &ImplementNode) -> Result<(), CompileError>;
    fn compile_set(&mut self, node: &SetNode) -> Result<(), CompileError>;
    fn compile_return(&mut self, span: &Span) -> Result<(), CompileError>;
    fn compile_break(&mut self, span: &Span) -> Result<(), CompileError>;
    fn compile_continue(&mut self, span: &Span) -> Result<(), CompileError>;
    /// The `call` word: invoke an address already on the working stack.
    fn compile_call(&mut self, span: &Span) -> Result<(), CompileError>;

    /// Feature tags this target declares.
    fn get_versions(&self) -> Vec<String>;

    /// Largest integer literal the target accepts.
    fn max_int(&self) -> i64;

    /// Text written before the generated assembly.
    fn default_header(&self) -> String;

    /// React to a driver option; may add feature tags. Returns false for
    /// options the backend does not know.
    fn handle_option(&mut self, name: &str, versions: &mut Vec<String>) -> bool;

    /// Subprocesses to run after the assembly file has been written.
    fn final_commands(&self, asm_path: &Path, output_path: &Path) -> Vec<FinalCommand>;

    /// Register a named constant.
    fn new_const(&mut self, name: &str, value: i64);

    /// Take the accumulated assembly text.
    fn output(&mut self) -> String;
}

/// Dispatch one node to its backend operation.
///
/// The reserved control verbs resolve here, before any symbol table is
/// consulted, so no user word can shadow them. Backends re-enter this
/// function for function bodies and inline expansion.
pub fn compile_node(backend: &mut dyn Backend, node: &Node) -> Result<(), CompileError> {
    match node {
        Node::Word(word) => match word.name.as_str() {
            "return" => backend.compile_return(&word.span),
            "break" => backend.compile_break(&word.span),
            "continue" => backend.compile_continue(&word.span),
            "call" => backend.compile_call(&word.span),
            _ => backend.compile_word(word),
        },
        Node::Integer(node) => {
            let max = backend.max_int();
            let min = -(max + 1) / 2;
            if node.value > max || node.value < min {
                return Err(CompileError::new(
                    format!("integer {} is out of range for this target", node.value),
                    &node.span,
                ));
            }
            backend.compile_integer(node)
        }
        Node::String(node) => backend.compile_string(node),
        Node::Array(node) => backend.compile_array(node),
        Node::FuncDef(node) => backend.compile_func_def(node),
        Node::Asm(node) => backend.compile_asm(node),
        Node::If(node) => backend.compile_if(node),
        Node::While(node) => backend.compile_while(node),
        Node::Let(node) => backend.compile_let(node),
        Node::Struct(node) => backend.compile_struct(node),
        Node::Const(node) => backend.compile_const(node),
        Node::Enum(node) => backend.compile_enum(node),
        Node::Union(node) => backend.compile_union(node),
        Node::Alias(node) => backend.compile_alias(node),
        Node::Extern(node) => backend.compile_extern(node),
        Node::Addr(node) => backend.compile_addr(node),
        Node::Implement(node) => backend.compile_implement(node),
        Node::Set(node) => backend.compile_set(node),
        Node::Include(node) => Err(CompileError::new(
            format!("unresolved include \"{}\"", node.path),
            &node.span,
        )),
        Node::Version(node) => Err(CompileError::new(
            "unresolved version block",
            &node.span,
        )),
        Node::Enable(node) | Node::Requires(node) | Node::Restrict(node) => Err(CompileError::new(
            "unresolved feature directive",
            &node.span,
        )),
    }
}

fn is_definition(node: &Node) -> bool {
    matches!(
        node,
        Node::FuncDef(_)
            | Node::Struct(_)
            | Node::Const(_)
            | Node::Enum(_)
            | Node::Union(_)
            | Node::Alias(_)
            | Node::Extern(_)
            | Node::Implement(_)
            | Node::Let(_)
    )
}

/// Drives one backend over a parsed program.
pub struct Compiler {
    backend: Box<dyn Backend>,
    versions: Vec<String>,
}

impl Compiler {
    pub fn new(backend: Box<dyn Backend>) -> Self {
        let versions = backend.get_versions();
        Self { backend, versions }
    }

    /// The active feature tags: the backend's plus anything `enable`d or
    /// added through options.
    pub fn versions(&self) -> &[String] {
        &self.versions
    }

    pub fn handle_option(&mut self, name: &str) -> bool {
        self.backend.handle_option(name, &mut self.versions)
    }

    pub fn default_header(&self) -> String {
        self.backend.default_header()
    }

    pub fn final_commands(&self, asm_path: &Path, output_path: &Path) -> Vec<FinalCommand> {
        self.backend.final_commands(asm_path, output_path)
    }

    /// Lower a whole program to assembly text.
    pub fn compile(&mut self, nodes: Vec<Node>) -> Result<String, CompileError> {
        let nodes = Self::resolve_versions(&mut self.versions, nodes)?;

        let mut definitions = Vec::new();
        let mut main = Vec::new();
        for node in nodes {
            if is_definition(&node) {
                definitions.push(node);
            } else {
                main.push(node);
            }
        }

        self.backend.init();
        for node in &definitions {
            compile_node(self.backend.as_mut(), node)?;
        }
        self.backend.begin_main();
        for node in &main {
            compile_node(self.backend.as_mut(), node)?;
        }
        self.backend.end();

        Ok(self.backend.output())
    }

    /// Expand version blocks against the active tag set and apply feature
    /// directives, in source order, through every statement list.
    fn resolve_versions(
        versions: &mut Vec<String>,
        nodes: Vec<Node>,
    ) -> Result<Vec<Node>, CompileError> {
        let mut resolved = Vec::new();

        for node in nodes {
            match node {
                Node::Version(version) => {
                    let active = versions.iter().any(|v| v == &version.feature);
                    if active != version.not {
                        resolved.extend(Self::resolve_versions(versions, version.body)?);
                    }
                }
                Node::Enable(feature) => {
                    if !versions.contains(&feature.feature) {
                        versions.push(feature.feature);
                    }
                }
                Node::Requires(feature) => {
                    if !versions.contains(&feature.feature) {
                        return Err(CompileError::new(
                            format!("this program requires version '{}'", feature.feature),
                            &feature.span,
                        ));
                    }
                }
                Node::Restrict(feature) => {
                    if versions.contains(&feature.feature) {
                        return Err(CompileError::new(
                            format!("this program cannot be compiled for version '{}'", feature.feature),
                            &feature.span,
                        ));
                    }
                }
                Node::FuncDef(mut func) => {
                    func.body = Self::resolve_versions(versions, func.body)?;
                    resolved.push(Node::FuncDef(func));
                }
                Node::Implement(mut imp) => {
                    imp.body = Self::resolve_versions(versions, imp.body)?;
                    resolved.push(Node::Implement(imp));
                }
                Node::If(mut node) => {
                    for clause in &mut node.clauses {
                        clause.condition =
                            Self::resolve_versions(versions, std::mem::take(&mut clause.condition))?;
                        clause.body =
                            Self::resolve_versions(versions, std::mem::take(&mut clause.body))?;
                    }
                    if let Some(body) = node.else_body.take() {
                        node.else_body = Some(Self::resolve_versions(versions, body)?);
                    }
                    resolved.push(Node::If(node));
                }
                Node::While(mut node) => {
                    node.condition = Self::resolve_versions(versions, node.condition)?;
                    node.body = Self::resolve_versions(versions, node.body)?;
                    resolved.push(Node::While(node));
                }
                other => resolved.push(other),
            }
        }

        Ok(resolved)
    }
}
