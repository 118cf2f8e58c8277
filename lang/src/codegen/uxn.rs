//! UXN backend: lowers the AST to Uxntal for the Varvara/UXN virtual
//! machine, a 16-bit stack CPU with zero-page addressing.
//!
//! Values on the working stack are always one cell (two bytes, big-endian).
//! Locals live in a downward-growing region addressed through the `vsp`
//! zero-page word; offset 0 is the most recently allocated local. 8-bit
//! loads zero-extend onto the stack and 8-bit stores truncate with `NIP`.

use std::path::Path;
use std::rc::Rc;

use super::context::{value_fits, CodegenContext, Constant, Global, RealizedArray, Type, Variable, Word};
use super::{compile_node, Backend, CompileError, FinalCommand};
use crate::language;
use crate::lexer::token::Span;
use crate::parser::ast::*;

const CELL_SIZE: usize = 2;
const MAX_INT: i64 = 0xffff;

/// Escape a source name into an assembler-safe symbol. Alphanumerics pass
/// through, `_` doubles, anything else becomes `_` plus two hex digits, so
/// the mapping is reversible.
pub fn mangle(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
        } else if ch == '_' {
            out.push_str("__");
        } else {
            let mut buf = [0u8; 4];
            for byte in ch.encode_utf8(&mut buf).as_bytes() {
                out.push('_');
                out.push_str(&format!("{byte:02x}"));
            }
        }
    }
    out
}

pub struct UxnBackend {
    pub ctx: CodegenContext,
}

impl Default for UxnBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl UxnBackend {
    pub fn new() -> Self {
        Self {
            ctx: CodegenContext::new(CELL_SIZE),
        }
    }

    // Emission helpers -------------------------------------------------------

    fn push_int(&mut self, value: i64) {
        self.ctx.emit(&format!("#{:04x}", value & 0xffff));
    }

    /// Push the address of a local: the VSP plus its current offset.
    fn push_variable_address(&mut self, offset: usize) {
        if offset == 0 {
            self.ctx.emit(".vsp LDZ2");
        } else {
            self.ctx.emit(&format!(".vsp LDZ2 #{offset:04x} ADD2"));
        }
    }

    /// Grow the local-variable region; the stack grows downward.
    fn vsp_alloc(&mut self, bytes: usize) {
        if bytes > 0 {
            self.ctx.emit(&format!(".vsp LDZ2 #{bytes:04x} SUB2 .vsp STZ2"));
        }
    }

    fn vsp_release(&mut self, bytes: usize) {
        if bytes > 0 {
            self.ctx.emit(&format!(".vsp LDZ2 #{bytes:04x} ADD2 .vsp STZ2"));
        }
    }

    /// Load the value at the address on the stack, pushing one cell.
    fn load_value(&mut self, ty: &Type, span: &Span) -> Result<(), CompileError> {
        match ty.size {
            1 => self.ctx.emit("LDA #00 SWP"),
            2 => self.ctx.emit("LDA2"),
            n => {
                return Err(CompileError::new(
                    format!("cannot load a {n}-byte value onto the stack"),
                    span,
                ))
            }
        }
        Ok(())
    }

    fn store_local(&mut self, var: &Variable, span: &Span) -> Result<(), CompileError> {
        match var.ty.size {
            1 => {
                self.ctx.emit("NIP");
                self.push_variable_address(var.offset);
                self.ctx.emit("STA");
            }
            2 => {
                self.push_variable_address(var.offset);
                self.ctx.emit("STA2");
            }
            n => {
                return Err(CompileError::new(
                    format!("cannot store a {n}-byte value from the stack"),
                    span,
                ))
            }
        }
        Ok(())
    }

    fn store_global(&mut self, global: &Global, span: &Span) -> Result<(), CompileError> {
        let symbol = format!("global_{}", mangle(&global.name));
        match global.ty.size {
            1 => {
                self.ctx.emit("NIP");
                self.ctx.emit(&format!(";{symbol} STA"));
            }
            2 => self.ctx.emit(&format!(";{symbol} STA2")),
            n => {
                return Err(CompileError::new(
                    format!("cannot store a {n}-byte value from the stack"),
                    span,
                ))
            }
        }
        Ok(())
    }

    /// Zero the freshly allocated slot at the VSP.
    fn zero_fill(&mut self, size: usize) {
        let mut offset = 0;
        while offset + 2 <= size {
            if offset == 0 {
                self.ctx.emit("#0000 .vsp LDZ2 STA2");
            } else {
                self.ctx.emit(&format!("#0000 .vsp LDZ2 #{offset:04x} ADD2 STA2"));
            }
            offset += 2;
        }
        if offset < size {
            if offset == 0 {
                self.ctx.emit("#00 .vsp LDZ2 STA");
            } else {
                self.ctx.emit(&format!("#00 .vsp LDZ2 #{offset:04x} ADD2 STA"));
            }
        }
    }

    /// Write the metadata block for an array whose elements sit directly
    /// above it: length, member size, then the elements pointer.
    fn write_array_metadata(&mut self, length: usize, element_size: usize) {
        let meta = self.ctx.array_meta_size();
        self.ctx.emit(&format!("#{length:04x} .vsp LDZ2 STA2"));
        self.ctx.emit(&format!("#{element_size:04x} .vsp LDZ2 INC2 INC2 STA2"));
        self.ctx.emit(&format!(
            ".vsp LDZ2 #{meta:04x} ADD2 .vsp LDZ2 #0004 ADD2 STA2"
        ));
    }

    /// Emit deinit hooks and one VSP release for every local past `depth`,
    /// most recent first, without touching the variable table. `return` and
    /// `break` use this directly since they leave the lexical scope open.
    fn emit_scope_cleanup(&mut self, depth: usize) {
        let locals = self.ctx.locals_since(depth);
        for var in &locals {
            if var.ty.has_deinit && !var.array {
                self.push_variable_address(var.offset);
                self.ctx
                    .emit(&format!(";type_deinit_{} JSR2", mangle(&var.ty.name)));
            }
        }
        let total = locals.iter().map(|v| v.size).sum();
        self.vsp_release(total);
    }

    /// Emit cleanup and restore the variable table to the pre-scope state.
    fn close_scope(&mut self, depth: usize) {
        self.emit_scope_cleanup(depth);
        self.ctx.truncate_scope(depth);
    }
}

impl Backend for UxnBackend {
    fn init(&mut self) {
        self.ctx.emit_raw("|0");
        self.ctx.emit_raw("@vsp $2");
        self.ctx.emit_raw("@arraySrc $2");
        self.ctx.emit_raw("@arrayDest $2");
        self.ctx.emit_raw("");
        self.ctx.emit_raw("|100");
        self.ctx.emit_raw("@on-reset");
        self.ctx.emit("#ffff .vsp STZ2");
        self.ctx.emit(";calmain JSR2");
        self.ctx.emit("BRK");
        self.ctx.emit_raw("");
    }

    fn begin_main(&mut self) {
        self.ctx.emit_raw("@calmain");
        let globals = self.ctx.globals.clone();
        for global in &globals {
            if global.ty.has_init && !global.array {
                self.ctx.emit(&format!(
                    ";global_{} ;type_init_{} JSR2",
                    mangle(&global.name),
                    mangle(&global.ty.name)
                ));
            }
        }
    }

    fn end(&mut self) {
        // The entry point convention: a defined `main` word is invoked after
        // the top-level statements have run.
        if let Some(word) = self.ctx.words.get("main").cloned() {
            if word.inline.is_none() {
                if word.raw {
                    self.ctx.emit(";main JSR2");
                } else {
                    self.ctx.emit(";func__main JSR2");
                }
            }
        }

        let globals = self.ctx.globals.clone();
        for global in globals.iter().rev() {
            if global.ty.has_deinit && !global.array {
                self.ctx.emit(&format!(
                    ";global_{} ;type_deinit_{} JSR2",
                    mangle(&global.name),
                    mangle(&global.ty.name)
                ));
            }
        }
        self.ctx.emit("JMP2r");
        self.ctx.emit_raw("");

        self.ctx.emit_raw("@copy_array ( length* -- )");
        self.ctx.emit("&loop");
        self.ctx.emit("DUP2 #0000 EQU2 ,&done JCN");
        self.ctx.emit("#0001 SUB2");
        self.ctx.emit(".arraySrc LDZ2 LDA .arrayDest LDZ2 STA");
        self.ctx.emit(".arraySrc LDZ2 INC2 .arraySrc STZ2");
        self.ctx.emit(".arrayDest LDZ2 INC2 .arrayDest STZ2");
        self.ctx.emit(",&loop JMP");
        self.ctx.emit("&done POP2 JMP2r");
        self.ctx.emit_raw("");

        for global in &globals {
            let symbol = format!("global_{}", mangle(&global.name));
            self.ctx.emit_raw(&format!("@{symbol} ${:x}", global.size()));
            if global.array {
                self.ctx.emit_raw(&format!(
                    "@{symbol}_meta {:04x} {:04x} ={symbol}",
                    global.array_size, global.ty.size
                ));
            }
        }

        let arrays = self.ctx.arrays.clone();
        for (index, array) in arrays.iter().enumerate() {
            let mut line = format!("@array_{index}");
            for value in &array.values {
                match array.element_size {
                    1 => line.push_str(&format!(" {:02x}", value & 0xff)),
                    _ => line.push_str(&format!(" {:04x}", value & 0xffff)),
                }
            }
            self.ctx.emit_raw(&line);
            self.ctx.emit_raw(&format!(
                "@array_{index}_meta {:04x} {:04x} =array_{index}",
                array.values.len(),
                array.element_size
            ));
        }

        self.ctx.emit_raw("");
        self.ctx.emit_raw("|e000");
    }

    fn compile_word(&mut self, node: &WordNode) -> Result<(), CompileError> {
        let name = &node.name;

        if let Some(word) = self.ctx.words.get(name).cloned() {
            if let Some(body) = &word.inline {
                let body = Rc::clone(body);
                for inner in body.iter() {
                    compile_node(self, inner)?;
                }
            } else if word.raw {
                self.ctx.emit(&format!(";{name} JSR2"));
            } else {
                self.ctx.emit(&format!(";func__{} JSR2", mangle(name)));
            }
            return Ok(());
        }

        if let Some(var) = self.ctx.get_variable(name).cloned() {
            if var.array {
                self.push_variable_address(var.offset);
            } else if var.ty.is_struct {
                return Err(CompileError::new(
                    format!("'{name}' is a struct value and cannot be loaded; take its address with &"),
                    &node.span,
                ));
            } else {
                self.push_variable_address(var.offset);
                self.load_value(&var.ty, &node.span)?;
            }
            return Ok(());
        }

        if let Some(global) = self.ctx.get_global(name).cloned() {
            let symbol = format!("global_{}", mangle(name));
            if global.array {
                self.ctx.emit(&format!(";{symbol}_meta"));
            } else if global.ty.is_struct {
                return Err(CompileError::new(
                    format!("'{name}' is a struct value and cannot be loaded; take its address with &"),
                    &node.span,
                ));
            } else {
                self.ctx.emit(&format!(";{symbol}"));
                self.load_value(&global.ty, &node.span)?;
            }
            return Ok(());
        }

        if let Some(constant) = self.ctx.get_const(name).cloned() {
            self.push_int(constant.value);
            return Ok(());
        }

        Err(CompileError::new(
            format!("undefined identifier '{name}'"),
            &node.span,
        ))
    }

    fn compile_integer(&mut self, node: &IntegerNode) -> Result<(), CompileError> {
        self.push_int(node.value);
        Ok(())
    }

    fn compile_string(&mut self, node: &StringNode) -> Result<(), CompileError> {
        let elements = node
            .value
            .bytes()
            .map(|byte| {
                Node::Integer(IntegerNode {
                    value: byte as i64,
                    span: node.span.clone(),
                })
            })
            .collect();
        let array = ArrayNode {
            element_type: "u8".to_string(),
            elements,
            constant: node.constant,
            span: node.span.clone(),
        };
        self.compile_array(&array)
    }

    fn compile_array(&mut self, node: &ArrayNode) -> Result<(), CompileError> {
        let ty = self.ctx.get_type(&node.element_type).cloned().ok_or_else(|| {
            CompileError::new(format!("undefined type '{}'", node.element_type), &node.span)
        })?;
        if ty.is_struct {
            return Err(CompileError::new(
                format!("'{}' is a struct type and cannot be an array literal element", ty.name),
                &node.span,
            ));
        }
        if node.elements.is_empty() {
            return Err(CompileError::new("array length must be at least 1", &node.span));
        }

        let mut values = Vec::with_capacity(node.elements.len());
        for element in &node.elements {
            match element {
                Node::Integer(int) => {
                    if !value_fits(int.value, ty.size) {
                        return Err(CompileError::new(
                            format!("array element {} does not fit in {}", int.value, ty.name),
                            &int.span,
                        ));
                    }
                    values.push(int.value);
                }
                Node::Word(word) => {
                    return Err(CompileError::new(
                        "word addresses are not supported in array literals on this target",
                        &word.span,
                    ))
                }
                other => {
                    return Err(CompileError::new("illegal array element", other.span()))
                }
            }
        }

        let length = values.len();
        let global = !self.ctx.in_scope || node.constant;
        let index = self.ctx.arrays.len();
        self.ctx.arrays.push(RealizedArray {
            values,
            type_name: ty.name.clone(),
            element_size: ty.size,
            global,
        });

        if global {
            self.ctx.emit(&format!(";array_{index}_meta"));
            return Ok(());
        }

        // Copy the realised bytes onto the variable stack, then build the
        // metadata block directly below the copy.
        let total = length * ty.size;
        self.vsp_alloc(total);
        self.ctx.emit(&format!(";array_{index} .arraySrc STZ2"));
        self.ctx.emit(".vsp LDZ2 .arrayDest STZ2");
        self.ctx.emit(&format!("#{total:04x} ;copy_array JSR2"));
        self.vsp_alloc(self.ctx.array_meta_size());
        self.write_array_metadata(length, ty.size);

        let size = total + self.ctx.array_meta_size();
        self.ctx.push_variable(Variable {
            name: String::new(),
            ty,
            offset: 0,
            size,
            array: true,
            array_size: length,
        });

        self.ctx.emit(".vsp LDZ2");
        Ok(())
    }

    fn compile_func_def(&mut self, node: &FuncDefNode) -> Result<(), CompileError> {
        if language::is_reserved(&node.name) {
            return Err(CompileError::new(
                format!("'{}' is a reserved name", node.name),
                &node.span,
            ));
        }
        if self.ctx.name_in_use(&node.name) {
            return Err(CompileError::new(
                format!("redefinition of '{}'", node.name),
                &node.span,
            ));
        }

        if node.inline {
            if !node.params.is_empty() {
                return Err(CompileError::new(
                    "inline functions cannot take parameters",
                    &node.span,
                ));
            }
            self.ctx.words.insert(
                node.name.clone(),
                Word {
                    raw: false,
                    inline: Some(Rc::new(node.body.clone())),
                },
            );
            return Ok(());
        }

        let symbol = if node.raw {
            node.name.clone()
        } else {
            format!("func__{}", mangle(&node.name))
        };
        self.ctx.words.insert(
            node.name.clone(),
            Word {
                raw: node.raw,
                inline: None,
            },
        );

        self.ctx.emit_raw(&format!("@{symbol}"));
        self.ctx.in_scope = true;
        self.ctx.this_func = node.name.clone();
        let depth = self.ctx.scope_depth();

        if !node.params.is_empty() {
            self.vsp_alloc(node.params.len() * CELL_SIZE);
            for param in &node.params {
                let ty = self.ctx.get_type(&param.type_name).cloned().ok_or_else(|| {
                    CompileError::new(
                        format!("undefined type '{}'", param.type_name),
                        &node.span,
                    )
                })?;
                if ty.is_struct {
                    return Err(CompileError::new(
                        format!("struct '{}' cannot be passed as a parameter", ty.name),
                        &node.span,
                    ));
                }
                if language::is_reserved(&param.name) {
                    return Err(CompileError::new(
                        format!("'{}' is a reserved name", param.name),
                        &node.span,
                    ));
                }
                if self.ctx.name_in_use(&param.name) {
                    return Err(CompileError::new(
                        format!("redefinition of '{}'", param.name),
                        &node.span,
                    ));
                }
                self.ctx.push_variable(Variable {
                    name: param.name.clone(),
                    ty,
                    offset: 0,
                    size: CELL_SIZE,
                    array: false,
                    array_size: 0,
                });
            }
            // Arguments arrive on the working stack in declared order, so
            // they are moved into their slots last-first.
            for param in node.params.iter().rev() {
                let set = SetNode {
                    name: param.name.clone(),
                    span: node.span.clone(),
                };
                self.compile_set(&set)?;
            }
        }

        for inner in &node.body {
            compile_node(self, inner)?;
        }

        self.close_scope(depth);
        self.ctx.emit("JMP2r");
        self.ctx.emit_raw("");
        self.ctx.in_scope = false;
        self.ctx.this_func.clear();
        Ok(())
    }

    fn compile_asm(&mut self, node: &AsmNode) -> Result<(), CompileError> {
        for line in node.code.lines() {
            self.ctx.emit(line);
        }
        Ok(())
    }

    fn compile_if(&mut self, node: &IfNode) -> Result<(), CompileError> {
        let id = self.ctx.next_block_id();

        for (index, clause) in node.clauses.iter().enumerate() {
            for inner in &clause.condition {
                compile_node(self, inner)?;
            }
            self.ctx
                .emit(&format!("#0000 EQU2 ;if_{id}_{} JCN2", index + 1));

            let depth = self.ctx.scope_depth();
            for inner in &clause.body {
                compile_node(self, inner)?;
            }
            self.close_scope(depth);

            self.ctx.emit(&format!(";if_{id}_end JMP2"));
            self.ctx.emit_raw(&format!("@if_{id}_{}", index + 1));
        }

        if let Some(else_body) = &node.else_body {
            let depth = self.ctx.scope_depth();
            for inner in else_body {
                compile_node(self, inner)?;
            }
            self.close_scope(depth);
        }

        self.ctx.emit_raw(&format!("@if_{id}_end"));
        Ok(())
    }

    fn compile_while(&mut self, node: &WhileNode) -> Result<(), CompileError> {
        let id = self.ctx.next_block_id();

        self.ctx.emit(&format!(";while_{id}_condition JMP2"));
        self.ctx.emit_raw(&format!("@while_{id}"));

        let was_in_while = self.ctx.in_while;
        let previous_loop = self.ctx.current_loop;
        let previous_depth = self.ctx.loop_scope_depth;
        self.ctx.in_while = true;
        self.ctx.current_loop = id;
        let depth = self.ctx.scope_depth();
        self.ctx.loop_scope_depth = depth;

        for inner in &node.body {
            compile_node(self, inner)?;
        }

        self.ctx.emit_raw(&format!("@while_{id}_next"));
        self.close_scope(depth);

        self.ctx.in_while = was_in_while;
        self.ctx.current_loop = previous_loop;
        self.ctx.loop_scope_depth = previous_depth;

        self.ctx.emit_raw(&format!("@while_{id}_condition"));
        for inner in &node.condition {
            compile_node(self, inner)?;
        }
        self.ctx.emit(&format!("#0000 NEQ2 ;while_{id} JCN2"));
        self.ctx.emit_raw(&format!("@while_{id}_end"));
        Ok(())
    }

    fn compile_let(&mut self, node: &LetNode) -> Result<(), CompileError> {
        if language::is_reserved(&node.name) {
            return Err(CompileError::new(
                format!("'{}' is a reserved name", node.name),
                &node.span,
            ));
        }
        if self.ctx.name_in_use(&node.name) {
            return Err(CompileError::new(
                format!("redefinition of '{}'", node.name),
                &node.span,
            ));
        }
        let ty = self.ctx.get_type(&node.type_name).cloned().ok_or_else(|| {
            CompileError::new(format!("undefined type '{}'", node.type_name), &node.span)
        })?;
        if node.array && node.array_size == 0 {
            return Err(CompileError::new("array length must be at least 1", &node.span));
        }

        if !self.ctx.in_scope {
            self.ctx.globals.push(Global {
                name: node.name.clone(),
                ty,
                array: node.array,
                array_size: node.array_size,
            });
            return Ok(());
        }

        if node.array {
            let total = node.array_size * ty.size;
            self.vsp_alloc(total);
            self.zero_fill(total);
            self.vsp_alloc(self.ctx.array_meta_size());
            self.write_array_metadata(node.array_size, ty.size);
            let size = total + self.ctx.array_meta_size();
            self.ctx.push_variable(Variable {
                name: node.name.clone(),
                ty,
                offset: 0,
                size,
                array: true,
                array_size: node.array_size,
            });
        } else {
            self.vsp_alloc(ty.size);
            self.zero_fill(ty.size);
            let has_init = ty.has_init;
            let type_name = ty.name.clone();
            self.ctx.push_variable(Variable {
                name: node.name.clone(),
                ty: ty.clone(),
                offset: 0,
                size: ty.size,
                array: false,
                array_size: 0,
            });
            if has_init {
                self.ctx.emit(".vsp LDZ2");
                self.ctx
                    .emit(&format!(";type_init_{} JSR2", mangle(&type_name)));
            }
        }
        Ok(())
    }

    fn compile_struct(&mut self, node: &StructNode) -> Result<(), CompileError> {
        if self.ctx.get_type(&node.name).is_some() {
            return Err(CompileError::new(
                format!("redefinition of type '{}'", node.name),
                &node.span,
            ));
        }

        let ty = self.ctx.layout_struct(node)?;
        for member in &ty.members {
            self.new_const(&format!("{}.{}", node.name, member.name), member.offset as i64);
        }
        self.new_const(&format!("{}.sizeof", node.name), ty.size as i64);
        self.ctx.types.push(ty);
        Ok(())
    }

    fn compile_const(&mut self, node: &ConstNode) -> Result<(), CompileError> {
        if language::is_reserved(&node.name) {
            return Err(CompileError::new(
                format!("'{}' is a reserved name", node.name),
                &node.span,
            ));
        }
        if self.ctx.name_in_use(&node.name) {
            return Err(CompileError::new(
                format!("redefinition of '{}'", node.name),
                &node.span,
            ));
        }
        let max = self.max_int();
        if node.value > max || node.value < -(max + 1) / 2 {
            return Err(CompileError::new(
                format!("integer {} is out of range for this target", node.value),
                &node.span,
            ));
        }
        self.new_const(&node.name, node.value);
        Ok(())
    }

    fn compile_enum(&mut self, node: &EnumNode) -> Result<(), CompileError> {
        if self.ctx.get_type(&node.name).is_some() {
            return Err(CompileError::new(
                format!("redefinition of type '{}'", node.name),
                &node.span,
            ));
        }
        let base = self.ctx.get_type(&node.base_type).cloned().ok_or_else(|| {
            CompileError::new(format!("undefined type '{}'", node.base_type), &node.span)
        })?;
        if base.is_struct {
            return Err(CompileError::new(
                format!("cannot use struct '{}' as an enum base type", base.name),
                &node.span,
            ));
        }

        for (index, member) in node.members.iter().enumerate() {
            if node.members[..index].iter().any(|m| m.name == member.name) {
                return Err(CompileError::new(
                    format!("duplicate enum member '{}'", member.name),
                    &node.span,
                ));
            }
            if !value_fits(member.value, base.size) {
                return Err(CompileError::new(
                    format!("enum value {} does not fit in {}", member.value, base.name),
                    &node.span,
                ));
            }
        }

        for member in &node.members {
            self.new_const(&format!("{}.{}", node.name, member.name), member.value);
        }
        let min = node.members.iter().map(|m| m.value).min().unwrap_or(0);
        let max = node.members.iter().map(|m| m.value).max().unwrap_or(0);
        self.new_const(&format!("{}.min", node.name), min);
        self.new_const(&format!("{}.max", node.name), max);
        self.new_const(&format!("{}.sizeof", node.name), base.size as i64);

        self.ctx.types.push(Type {
            name: node.name.clone(),
            size: base.size,
            is_struct: false,
            members: Vec::new(),
            has_init: false,
            has_deinit: false,
        });
        Ok(())
    }

    fn compile_union(&mut self, node: &UnionNode) -> Result<(), CompileError> {
        if self.ctx.get_type(&node.name).is_some() {
            return Err(CompileError::new(
                format!("redefinition of type '{}'", node.name),
                &node.span,
            ));
        }

        let mut size = 0;
        for (index, member) in node.members.iter().enumerate() {
            if node.members[..index].contains(member) {
                return Err(CompileError::new(
                    format!("duplicate union member '{member}'"),
                    &node.span,
                ));
            }
            let ty = self.ctx.get_type(member).ok_or_else(|| {
                CompileError::new(format!("undefined type '{member}'"), &node.span)
            })?;
            size = size.max(ty.size);
        }

        self.ctx.types.push(Type {
            name: node.name.clone(),
            size,
            is_struct: false,
            members: Vec::new(),
            has_init: false,
            has_deinit: false,
        });
        Ok(())
    }

    fn compile_alias(&mut self, node: &AliasNode) -> Result<(), CompileError> {
        let from = self.ctx.get_type(&node.from).cloned().ok_or_else(|| {
            CompileError::new(format!("undefined type '{}'", node.from), &node.span)
        })?;

        let mut ty = from;
        ty.name = node.to.clone();

        if self.ctx.get_type(&node.to).is_some() {
            if !node.overwrite {
                return Err(CompileError::new(
                    format!("type '{}' already exists (use 'alias overwrite')", node.to),
                    &node.span,
                ));
            }
            if let Some(existing) = self.ctx.get_type_mut(&node.to) {
                *existing = ty;
            }
        } else {
            self.ctx.types.push(ty);
        }
        Ok(())
    }

    fn compile_extern(&mut self, node: &ExternNode) -> Result<(), CompileError> {
        if node.kind == ExternKind::C {
            return Err(CompileError::new(
                "C externs are not supported by the uxn backend",
                &node.span,
            ));
        }
        if language::is_reserved(&node.name) {
            return Err(CompileError::new(
                format!("'{}' is a reserved name", node.name),
                &node.span,
            ));
        }
        if self.ctx.name_in_use(&node.name) {
            return Err(CompileError::new(
                format!("redefinition of '{}'", node.name),
                &node.span,
            ));
        }
        self.ctx.words.insert(
            node.name.clone(),
            Word {
                raw: node.kind == ExternKind::Raw,
                inline: None,
            },
        );
        Ok(())
    }

    fn compile_addr(&mut self, node: &AddrNode) -> Result<(), CompileError> {
        let name = &node.name;

        if let Some(word) = self.ctx.words.get(name).cloned() {
            if word.inline.is_some() {
                return Err(CompileError::new(
                    format!("cannot take the address of inline function '{name}'"),
                    &node.span,
                ));
            }
            if word.raw {
                self.ctx.emit(&format!(";{name}"));
            } else {
                self.ctx.emit(&format!(";func__{}", mangle(name)));
            }
            return Ok(());
        }

        if let Some(var) = self.ctx.get_variable(name).cloned() {
            self.push_variable_address(var.offset);
            return Ok(());
        }

        if self.ctx.get_global(name).is_some() {
            self.ctx.emit(&format!(";global_{}", mangle(name)));
            return Ok(());
        }

        Err(CompileError::new(
            format!("undefined identifier '{name}'"),
            &node.span,
        ))
    }

    fn compile_implement(&mut self, node: &ImplementNode) -> Result<(), CompileError> {
        let ty = self.ctx.get_type(&node.struct_name).cloned().ok_or_else(|| {
            CompileError::new(format!("undefined type '{}'", node.struct_name), &node.span)
        })?;
        if !ty.is_struct {
            return Err(CompileError::new(
                format!("cannot implement methods on non-struct type '{}'", ty.name),
                &node.span,
            ));
        }
        let already = match node.method {
            ImplementMethod::Init => ty.has_init,
            ImplementMethod::Deinit => ty.has_deinit,
        };
        if already {
            return Err(CompileError::new(
                format!(
                    "duplicate {} implementation for '{}'",
                    node.method.as_str(),
                    node.struct_name
                ),
                &node.span,
            ));
        }

        let symbol = format!(
            "type_{}_{}",
            node.method.as_str(),
            mangle(&node.struct_name)
        );
        self.ctx.emit_raw(&format!("@{symbol}"));
        self.ctx.in_scope = true;
        self.ctx.this_func = symbol;
        let depth = self.ctx.scope_depth();

        for inner in &node.body {
            compile_node(self, inner)?;
        }

        self.close_scope(depth);
        self.ctx.emit("JMP2r");
        self.ctx.emit_raw("");
        self.ctx.in_scope = false;
        self.ctx.this_func.clear();

        // Flagged only after emission: a local of this type inside its own
        // init body must not call the hook recursively.
        if let Some(ty) = self.ctx.get_type_mut(&node.struct_name) {
            match node.method {
                ImplementMethod::Init => ty.has_init = true,
                ImplementMethod::Deinit => ty.has_deinit = true,
            }
        }
        Ok(())
    }

    fn compile_set(&mut self, node: &SetNode) -> Result<(), CompileError> {
        if let Some(var) = self.ctx.get_variable(&node.name).cloned() {
            if var.array {
                return Err(CompileError::new(
                    format!("cannot store to array '{}'", node.name),
                    &node.span,
                ));
            }
            if var.ty.is_struct {
                return Err(CompileError::new(
                    format!("cannot store a struct value into '{}'", node.name),
                    &node.span,
                ));
            }
            return self.store_local(&var, &node.span);
        }

        if let Some(global) = self.ctx.get_global(&node.name).cloned() {
            if global.array {
                return Err(CompileError::new(
                    format!("cannot store to array '{}'", node.name),
                    &node.span,
                ));
            }
            if global.ty.is_struct {
                return Err(CompileError::new(
                    format!("cannot store a struct value into '{}'", node.name),
                    &node.span,
                ));
            }
            return self.store_global(&global, &node.span);
        }

        Err(CompileError::new(
            format!("undefined identifier '{}'", node.name),
            &node.span,
        ))
    }

    fn compile_return(&mut self, span: &Span) -> Result<(), CompileError> {
        if !self.ctx.in_scope {
            return Err(CompileError::new("return outside of a function", span));
        }
        self.emit_scope_cleanup(0);
        self.ctx.emit("JMP2r");
        Ok(())
    }

    fn compile_break(&mut self, span: &Span) -> Result<(), CompileError> {
        if !self.ctx.in_while {
            return Err(CompileError::new("break outside of a loop", span));
        }
        self.emit_scope_cleanup(self.ctx.loop_scope_depth);
        self.ctx
            .emit(&format!(";while_{}_end JMP2", self.ctx.current_loop));
        Ok(())
    }

    fn compile_continue(&mut self, span: &Span) -> Result<(), CompileError> {
        if !self.ctx.in_while {
            return Err(CompileError::new("continue outside of a loop", span));
        }
        self.ctx
            .emit(&format!(";while_{}_next JMP2", self.ctx.current_loop));
        Ok(())
    }

    fn compile_call(&mut self, _span: &Span) -> Result<(), CompileError> {
        self.ctx.emit("JSR2");
        Ok(())
    }

    fn get_versions(&self) -> Vec<String> {
        ["UXN", "IO", "16Bit", "BigEndian"]
            .iter()
            .map(|v| v.to_string())
            .collect()
    }

    fn max_int(&self) -> i64 {
        MAX_INT
    }

    fn default_header(&self) -> String {
        String::new()
    }

    fn handle_option(&mut self, _name: &str, _versions: &mut Vec<String>) -> bool {
        false
    }

    fn final_commands(&self, asm_path: &Path, output_path: &Path) -> Vec<FinalCommand> {
        vec![
            FinalCommand::new(
                "uxnasm",
                vec![
                    asm_path.display().to_string(),
                    output_path.display().to_string(),
                ],
            ),
            FinalCommand::cleanup("rm", vec![asm_path.display().to_string()]),
        ]
    }

    fn new_const(&mut self, name: &str, value: i64) {
        self.ctx.consts.push(Constant {
            name: name.to_string(),
            value,
        });
    }

    fn output(&mut self) -> String {
        std::mem::take(&mut self.ctx.output)
    }
}
