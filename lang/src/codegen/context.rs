//! Shared lowering state: the symbol tables every backend keeps, the
//! variable-stack offset model and the append-only output buffer.

use std::collections::HashMap;
use std::rc::Rc;

use super::CompileError;
use crate::parser::ast::{Node, StructNode};

/// A named type. Primitives and enums have no members; structs carry their
/// flattened member list, inherited fields first.
#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    pub name: String,
    pub size: usize,
    pub is_struct: bool,
    pub members: Vec<StructMember>,
    pub has_init: bool,
    pub has_deinit: bool,
}

impl Type {
    pub fn primitive(name: &str, size: usize) -> Self {
        Self {
            name: name.to_string(),
            size,
            is_struct: false,
            members: Vec::new(),
            has_init: false,
            has_deinit: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructMember {
    pub name: String,
    pub type_name: String,
    pub offset: usize,
    /// Total bytes, including array repetition.
    pub size: usize,
    pub array: bool,
    pub array_size: usize,
}

/// A callable word: a defined function or an extern.
#[derive(Debug, Clone)]
pub struct Word {
    /// Raw words are called through their unmangled source name.
    pub raw: bool,
    /// Inline words carry their captured body; expansion shares it by
    /// reference, no symbol is ever emitted.
    pub inline: Option<Rc<Vec<Node>>>,
}

/// A local on the variable stack. Offsets are measured from the virtual
/// stack pointer; offset 0 is the most recently allocated local.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Empty for anonymous allocations (array literals).
    pub name: String,
    pub ty: Type,
    pub offset: usize,
    /// Bytes this local reserved on the variable stack. For arrays this is
    /// the element copy plus the metadata block; for parameters it is one
    /// cell regardless of the declared type.
    pub size: usize,
    pub array: bool,
    pub array_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    pub ty: Type,
    pub array: bool,
    pub array_size: usize,
}

impl Global {
    /// Bytes reserved in the data segment, metadata excluded.
    pub fn size(&self) -> usize {
        if self.array {
            self.array_size * self.ty.size
        } else {
            self.ty.size
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub name: String,
    pub value: i64,
}

/// An array literal captured for the data segment, with its assigned ordinal.
#[derive(Debug, Clone, PartialEq)]
pub struct RealizedArray {
    pub values: Vec<i64>,
    pub type_name: String,
    pub element_size: usize,
    pub global: bool,
}

/// Symbol tables and emission state owned by a backend for the duration of
/// one compile.
#[derive(Debug)]
pub struct CodegenContext {
    pub output: String,
    pub cell_size: usize,
    pub types: Vec<Type>,
    pub words: HashMap<String, Word>,
    pub variables: Vec<Variable>,
    pub globals: Vec<Global>,
    pub consts: Vec<Constant>,
    pub arrays: Vec<RealizedArray>,
    /// True within a function or implement body.
    pub in_scope: bool,
    pub in_while: bool,
    /// Block id of the innermost loop, only valid while `in_while`.
    pub current_loop: usize,
    /// Number of locals live when the innermost loop body opened; `break`
    /// releases everything allocated past it.
    pub loop_scope_depth: usize,
    pub block_counter: usize,
    pub this_func: String,
}

impl CodegenContext {
    pub fn new(cell_size: usize) -> Self {
        let mut ctx = Self {
            output: String::new(),
            cell_size,
            types: Vec::new(),
            words: HashMap::new(),
            variables: Vec::new(),
            globals: Vec::new(),
            consts: Vec::new(),
            arrays: Vec::new(),
            in_scope: false,
            in_while: false,
            current_loop: 0,
            loop_scope_depth: 0,
            block_counter: 0,
            this_func: String::new(),
        };

        for (name, size) in [
            ("u8", 1),
            ("i8", 1),
            ("u16", 2),
            ("i16", 2),
            ("addr", cell_size),
            ("size", cell_size),
            ("usize", cell_size),
            ("cell", cell_size),
        ] {
            ctx.types.push(Type::primitive(name, size));
        }

        let meta_members = [("length", "usize"), ("memberSize", "usize"), ("elements", "addr")]
            .iter()
            .enumerate()
            .map(|(i, (name, type_name))| StructMember {
                name: name.to_string(),
                type_name: type_name.to_string(),
                offset: i * cell_size,
                size: cell_size,
                array: false,
                array_size: 0,
            })
            .collect();
        ctx.types.push(Type {
            name: "Array".to_string(),
            size: ctx.array_meta_size(),
            is_struct: true,
            members: meta_members,
            has_init: false,
            has_deinit: false,
        });

        ctx
    }

    /// Size of a realised array's metadata block: length, memberSize and the
    /// elements pointer, one cell each.
    pub fn array_meta_size(&self) -> usize {
        3 * self.cell_size
    }

    // Lookups ----------------------------------------------------------------

    pub fn get_type(&self, name: &str) -> Option<&Type> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn get_type_mut(&mut self, name: &str) -> Option<&mut Type> {
        self.types.iter_mut().find(|t| t.name == name)
    }

    pub fn get_variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn get_global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }

    pub fn get_const(&self, name: &str) -> Option<&Constant> {
        self.consts.iter().find(|c| c.name == name)
    }

    /// Whether a word, local, global or constant already claims this name.
    pub fn name_in_use(&self, name: &str) -> bool {
        self.words.contains_key(name)
            || self.get_variable(name).is_some()
            || self.get_global(name).is_some()
            || self.get_const(name).is_some()
    }

    // Variable stack ---------------------------------------------------------

    /// Allocate a new local at offset 0, shifting every existing local up by
    /// the new local's size.
    pub fn push_variable(&mut self, mut var: Variable) {
        for existing in &mut self.variables {
            existing.offset += var.size;
        }
        var.offset = 0;
        self.variables.push(var);
    }

    pub fn scope_depth(&self) -> usize {
        self.variables.len()
    }

    /// Locals introduced after the given depth, most recent first.
    pub fn locals_since(&self, depth: usize) -> Vec<Variable> {
        self.variables[depth..].iter().rev().cloned().collect()
    }

    pub fn scope_size_since(&self, depth: usize) -> usize {
        self.variables[depth..].iter().map(|v| v.size).sum()
    }

    /// Drop every local past the given depth and shift the survivors' offsets
    /// back down. Returns the number of bytes released.
    pub fn truncate_scope(&mut self, depth: usize) -> usize {
        let released = self.scope_size_since(depth);
        self.variables.truncate(depth);
        for var in &mut self.variables {
            var.offset -= released;
        }
        released
    }

    pub fn next_block_id(&mut self) -> usize {
        self.block_counter += 1;
        self.block_counter
    }

    // Struct layout ----------------------------------------------------------

    /// Compute sequential field offsets for a struct declaration, inherited
    /// members first in declared parent order.
    pub fn layout_struct(&self, node: &StructNode) -> Result<Type, CompileError> {
        let mut members: Vec<StructMember> = Vec::new();

        if let Some(parent_name) = &node.parent {
            let parent = self.get_type(parent_name).ok_or_else(|| {
                CompileError::new(format!("undefined type '{parent_name}'"), &node.span)
            })?;
            if !parent.is_struct {
                return Err(CompileError::new(
                    format!("cannot inherit from non-struct type '{parent_name}'"),
                    &node.span,
                ));
            }
            members.extend(parent.members.iter().cloned());
        }

        let mut offset = members.last().map(|m| m.offset + m.size).unwrap_or(0);
        for field in &node.members {
            if members.iter().any(|m| m.name == field.name) {
                return Err(CompileError::new(
                    format!("duplicate struct member '{}'", field.name),
                    &node.span,
                ));
            }
            let ty = self.get_type(&field.type_name).ok_or_else(|| {
                CompileError::new(format!("undefined type '{}'", field.type_name), &node.span)
            })?;
            let size = if field.array {
                ty.size * field.array_size
            } else {
                ty.size
            };
            members.push(StructMember {
                name: field.name.clone(),
                type_name: field.type_name.clone(),
                offset,
                size,
                array: field.array,
                array_size: field.array_size,
            });
            offset += size;
        }

        Ok(Type {
            name: node.name.clone(),
            size: offset,
            is_struct: true,
            members,
            has_init: false,
            has_deinit: false,
        })
    }

    // Output buffer ----------------------------------------------------------

    /// Append an indented line of assembly.
    pub fn emit(&mut self, code: &str) {
        self.output.push('\t');
        self.output.push_str(code);
        self.output.push('\n');
    }

    /// Append an unindented line (labels, padding directives, data).
    pub fn emit_raw(&mut self, text: &str) {
        self.output.push_str(text);
        self.output.push('\n');
    }
}

/// Whether a value is representable in `size` bytes, allowing both the
/// signed and unsigned interpretation.
pub fn value_fits(value: i64, size: usize) -> bool {
    if size >= 8 {
        return true;
    }
    let bits = 8 * size as u32;
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << bits) - 1;
    (min..=max).contains(&value)
}
