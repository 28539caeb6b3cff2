//! Code generator (spec §4.6): a second AST traversal that emits opcodes
//! into a [`tiny_core::Image`], back-patching jump targets and recording
//! `FILE`/`LINE` debug opcodes at each statement.
//!
//! Loops keep their break/continue patch sites on an explicit stack rather
//! than stashed on the AST node itself: since emission is a single forward
//! pass, the innermost open loop's pending jumps are always the top of this
//! stack, and they're patched the moment that loop's exit/condition PC is
//! known. This produces the same bytecode as a two-pass
//! record-then-patch-by-walking-the-body scheme, without a second AST walk.

use crate::ast::*;
use crate::pool::{FloatPool, StringPool};
use crate::pos::Pos;
use crate::symtab::{Symbol, SymbolId, SymbolTable};
use std::rc::Rc;
use tiny_core::{BinOp, Image, Tag};

#[derive(Debug, Clone, PartialEq)]
pub struct CodeGenError {
    pub pos: Pos,
    pub message: String,
}

impl std::fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl std::error::Error for CodeGenError {}

type CResult<T> = Result<T, CodeGenError>;

struct LoopCtx {
    break_patches: Vec<usize>,
    continue_patches: Vec<usize>,
}

pub struct CodeGen<'a> {
    image: &'a mut Image,
    symtab: &'a mut SymbolTable,
    strings: &'a mut StringPool,
    floats: &'a FloatPool,
    file_pool_idx: u32,
    current_function_locals: usize,
    loops: Vec<LoopCtx>,
    emit_debug_info: bool,
}

impl<'a> CodeGen<'a> {
    pub fn new(
        image: &'a mut Image,
        symtab: &'a mut SymbolTable,
        strings: &'a mut StringPool,
        floats: &'a FloatPool,
        file_name: Rc<str>,
    ) -> Self {
        let file_pool_idx = strings.intern(&file_name);
        CodeGen {
            image,
            symtab,
            strings,
            floats,
            file_pool_idx,
            current_function_locals: 0,
            loops: Vec::new(),
            emit_debug_info: true,
        }
    }

    /// Controls whether `FILE`/`LINE` opcodes are emitted ahead of every
    /// statement (spec §10.3's `CompilerConfig::emit_debug_info`).
    pub fn set_emit_debug_info(&mut self, enabled: bool) {
        self.emit_debug_info = enabled;
    }

    fn err(pos: &Pos, message: impl Into<String>) -> CodeGenError {
        CodeGenError {
            pos: pos.clone(),
            message: message.into(),
        }
    }

    pub fn compile_program(&mut self, program: &Program) -> CResult<()> {
        self.image.remove_trailing_halt();
        for stmt in &program.top_level {
            self.compile_stmt(stmt)?;
        }
        self.image.emit_tag(Tag::Halt);
        self.check_initialized()?;
        Ok(())
    }

    fn emit_debug(&mut self, stmt: &Stmt) {
        if !self.emit_debug_info {
            return;
        }
        self.image.emit_tag(Tag::File);
        self.image.emit_u32(self.file_pool_idx);
        self.image.emit_tag(Tag::Line);
        self.image.emit_u32(stmt.line as u32);
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> CResult<()> {
        self.emit_debug(stmt);
        match &stmt.kind {
            StmtKind::Expr(e) => {
                self.compile_expr(e)?;
                self.image.emit_tag(Tag::Pop);
            }
            StmtKind::VarDecl { init, symbol, .. } => {
                self.compile_expr(init)?;
                let symbol = symbol.expect("parser always assigns a symbol to a var decl");
                self.emit_store(symbol, &stmt.pos)?;
            }
            StmtKind::ConstDecl { .. } => {}
            StmtKind::Assign {
                target,
                compound,
                value,
            } => {
                self.compile_assign(target, *compound, value, &stmt.pos)?;
            }
            StmtKind::Block(stmts) => {
                for s in stmts {
                    self.compile_stmt(s)?;
                }
            }
            StmtKind::FuncDef {
                symbol,
                body,
                ..
            } => {
                self.compile_func_def(*symbol, body, &stmt.pos)?;
            }
            StmtKind::StructDef { .. } => {}
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.compile_expr(cond)?;
                self.image.emit_tag(Tag::GotoFalse);
                let skip_then = self.image.emit_i32(0);

                for s in then_branch {
                    self.compile_stmt(s)?;
                }
                self.image.emit_tag(Tag::Goto);
                let skip_else = self.image.emit_i32(0);

                let else_pc = self.image.pos();
                self.image.patch_i32(skip_then, else_pc as i32);

                if let Some(else_branch) = else_branch {
                    for s in else_branch {
                        self.compile_stmt(s)?;
                    }
                }
                let end_pc = self.image.pos();
                self.image.patch_i32(skip_else, end_pc as i32);
            }
            StmtKind::While { cond, body } => {
                let cond_pc = self.image.pos();
                self.compile_expr(cond)?;
                self.image.emit_tag(Tag::GotoFalse);
                let exit_patch = self.image.emit_i32(0);

                self.loops.push(LoopCtx {
                    break_patches: Vec::new(),
                    continue_patches: Vec::new(),
                });
                for s in body {
                    self.compile_stmt(s)?;
                }
                self.image.emit_tag(Tag::Goto);
                self.image.emit_i32(cond_pc as i32);

                let exit_pc = self.image.pos();
                self.image.patch_i32(exit_patch, exit_pc as i32);
                self.patch_loop_exits(exit_pc, cond_pc);
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                if let Some(init) = init {
                    self.compile_stmt(init)?;
                }
                let cond_pc = self.image.pos();
                let exit_patch = if let Some(cond) = cond {
                    self.compile_expr(cond)?;
                    self.image.emit_tag(Tag::GotoFalse);
                    Some(self.image.emit_i32(0))
                } else {
                    None
                };

                self.loops.push(LoopCtx {
                    break_patches: Vec::new(),
                    continue_patches: Vec::new(),
                });
                for s in body {
                    self.compile_stmt(s)?;
                }
                if let Some(step) = step {
                    self.compile_stmt(step)?;
                }
                self.image.emit_tag(Tag::Goto);
                self.image.emit_i32(cond_pc as i32);

                let exit_pc = self.image.pos();
                if let Some(patch) = exit_patch {
                    self.image.patch_i32(patch, exit_pc as i32);
                }
                self.patch_loop_exits(exit_pc, cond_pc);
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.compile_expr(value)?;
                    self.image.emit_tag(Tag::ReturnValue);
                } else {
                    self.image.emit_tag(Tag::Return);
                }
            }
            StmtKind::Break => {
                self.image.emit_tag(Tag::Goto);
                let patch = self.image.emit_i32(0);
                let ctx = self
                    .loops
                    .last_mut()
                    .ok_or_else(|| Self::err(&stmt.pos, "'break' outside of a loop"))?;
                ctx.break_patches.push(patch);
            }
            StmtKind::Continue => {
                self.image.emit_tag(Tag::Goto);
                let patch = self.image.emit_i32(0);
                let ctx = self
                    .loops
                    .last_mut()
                    .ok_or_else(|| Self::err(&stmt.pos, "'continue' outside of a loop"))?;
                ctx.continue_patches.push(patch);
            }
        }
        Ok(())
    }

    fn patch_loop_exits(&mut self, exit_pc: usize, cond_pc: usize) {
        let ctx = self.loops.pop().expect("loop context pushed at loop entry");
        for patch in ctx.break_patches {
            self.image.patch_i32(patch, exit_pc as i32);
        }
        for patch in ctx.continue_patches {
            self.image.patch_i32(patch, cond_pc as i32);
        }
    }

    fn compile_func_def(&mut self, symbol: SymbolId, body: &[Stmt], pos: &Pos) -> CResult<()> {
        self.image.emit_tag(Tag::Goto);
        let skip_patch = self.image.emit_i32(0);

        let entry_pc = self.image.pos();
        let local_count = match self.symtab.get(symbol) {
            Symbol::Function(f) => f.locals.len(),
            _ => unreachable!("FuncDef symbol must be a function"),
        };
        if local_count > 0xff {
            return Err(Self::err(pos, "exceeded maximum number of local variables (255)"));
        }
        self.image.emit_tag(Tag::PushNullN);
        self.image.emit_u8(local_count as u8);

        let prev_locals = self.current_function_locals;
        self.current_function_locals = local_count;
        let body_result = (|| -> CResult<()> {
            for s in body {
                self.compile_stmt(s)?;
            }
            Ok(())
        })();
        self.current_function_locals = prev_locals;
        body_result?;

        self.image.emit_tag(Tag::Return);

        let after = self.image.pos();
        self.image.patch_i32(skip_patch, after as i32);

        if let Symbol::Function(f) = self.symtab.get_mut(symbol) {
            f.entry_pc = Some(entry_pc as u32);
        }
        Ok(())
    }

    fn emit_store(&mut self, id: SymbolId, pos: &Pos) -> CResult<()> {
        match self.symtab.get_mut(id) {
            Symbol::Global(g) => {
                g.initialized = true;
                let idx = g.index;
                self.image.emit_tag(Tag::Set);
                self.image.emit_u32(idx);
                Ok(())
            }
            Symbol::Local(l) => {
                let slot = l.slot;
                self.image.emit_tag(Tag::SetLocal);
                self.image.emit_i32(slot);
                Ok(())
            }
            _ => Err(Self::err(pos, "cannot assign to this symbol")),
        }
    }

    fn compile_assign(
        &mut self,
        target: &AssignTarget,
        compound: Option<BinOpKind>,
        value: &Expr,
        pos: &Pos,
    ) -> CResult<()> {
        match target {
            AssignTarget::Ident(_, symbol) => {
                let id = symbol.expect("resolver fills in every assignment target's symbol");
                if let Some(op) = compound {
                    self.emit_load(id, pos)?;
                    self.compile_expr(value)?;
                    self.image.emit_tag(Self::binop_tag(op));
                } else {
                    self.compile_expr(value)?;
                }
                self.emit_store(id, pos)
            }
            AssignTarget::Dot(receiver, field) => {
                self.compile_expr(receiver)?;
                let field_idx = self.resolve_field_index(receiver, field, pos)?;
                if compound.is_some() {
                    return Err(Self::err(pos, "compound assignment to a field is not supported"));
                }
                self.compile_expr(value)?;
                self.image.emit_tag(Tag::StructSet);
                self.image.emit_u8(field_idx);
                Ok(())
            }
        }
    }

    fn emit_load(&mut self, id: SymbolId, pos: &Pos) -> CResult<()> {
        match self.symtab.get(id) {
            Symbol::Global(g) => {
                self.image.emit_tag(Tag::Get);
                self.image.emit_u32(g.index);
                Ok(())
            }
            Symbol::Local(l) => {
                self.image.emit_tag(Tag::GetLocal);
                self.image.emit_i32(l.slot);
                Ok(())
            }
            Symbol::Constant { value, .. } => {
                self.emit_const_value(value.clone());
                Ok(())
            }
            _ => Err(Self::err(pos, "cannot read this symbol as a value")),
        }
    }

    fn emit_const_value(&mut self, value: crate::symtab::ConstValue) {
        use crate::symtab::ConstValue;
        match value {
            ConstValue::Bool(true) => {
                self.image.emit_tag(Tag::PushTrue);
            }
            ConstValue::Bool(false) => {
                self.image.emit_tag(Tag::PushFalse);
            }
            ConstValue::Int(0) => {
                self.image.emit_tag(Tag::PushZero);
            }
            ConstValue::Int(1) => {
                self.image.emit_tag(Tag::PushOne);
            }
            ConstValue::Int(i) => {
                self.image.emit_tag(Tag::PushInt);
                self.image.emit_i32(i);
            }
            ConstValue::Float(f) => {
                self.image.emit_tag(Tag::PushFloat);
                self.image.emit_f32(f);
            }
            ConstValue::Str(s) => {
                let idx = self.strings.intern(&s);
                self.emit_push_string(idx);
            }
        }
    }

    fn emit_push_string(&mut self, idx: u32) {
        if idx <= 0xff {
            self.image.emit_tag(Tag::PushStringShort);
            self.image.emit_u8(idx as u8);
        } else {
            self.image.emit_tag(Tag::PushString);
            self.image.emit_u32(idx);
        }
    }

    fn resolve_field_index(&self, receiver: &Expr, field: &str, pos: &Pos) -> CResult<u8> {
        let Some(ty) = &receiver.ty else {
            return Err(Self::err(pos, "dot access on an unresolved expression"));
        };
        let crate::types::Type::Struct(tag) = ty else {
            return Err(Self::err(pos, "dot access on a non-struct value"));
        };
        let Some(id) = self.symtab.reference_struct(tag) else {
            return Err(Self::err(pos, format!("unknown struct '{tag}'")));
        };
        let Symbol::StructTag(tag_sym) = self.symtab.get(id) else {
            return Err(Self::err(pos, format!("'{tag}' is not a struct")));
        };
        tag_sym
            .fields
            .iter()
            .position(|f| f.name == field)
            .map(|i| i as u8)
            .ok_or_else(|| Self::err(pos, format!("struct '{tag}' has no field '{field}'")))
    }

    fn binop_tag(op: BinOpKind) -> Tag {
        let bin = match op {
            BinOpKind::Add => BinOp::Add,
            BinOpKind::Sub => BinOp::Sub,
            BinOpKind::Mul => BinOp::Mul,
            BinOpKind::Div => BinOp::Div,
            BinOpKind::Mod => BinOp::Mod,
            BinOpKind::BitAnd => BinOp::BitAnd,
            BinOpKind::BitOr => BinOp::BitOr,
            BinOpKind::LogAnd => BinOp::LogAnd,
            BinOpKind::LogOr => BinOp::LogOr,
            BinOpKind::Lt => BinOp::Lt,
            BinOpKind::Lte => BinOp::Lte,
            BinOpKind::Gt => BinOp::Gt,
            BinOpKind::Gte => BinOp::Gte,
            BinOpKind::Eq => BinOp::Equ,
            BinOpKind::Ne => BinOp::Equ, // followed by LogNot at the call site
        };
        bin.tag()
    }

    fn compile_expr(&mut self, expr: &Expr) -> CResult<()> {
        match &expr.kind {
            ExprKind::Null => {
                self.image.emit_tag(Tag::PushNull);
            }
            ExprKind::Bool(true) => {
                self.image.emit_tag(Tag::PushTrue);
            }
            ExprKind::Bool(false) => {
                self.image.emit_tag(Tag::PushFalse);
            }
            ExprKind::Char(c) => {
                self.emit_int_literal(*c as i64);
            }
            ExprKind::Int(i) => {
                self.emit_int_literal(*i);
            }
            ExprKind::Float(idx) => {
                let v = self.floats.get(*idx);
                self.image.emit_tag(Tag::PushFloat);
                self.image.emit_f32(v);
            }
            ExprKind::Str(idx) => {
                self.emit_push_string(*idx);
            }
            ExprKind::Ident(_, symbol) => {
                let id = symbol.expect("resolver fills in every identifier's symbol");
                self.emit_load(id, &expr.pos)?;
            }
            ExprKind::Call {
                symbol, args, ..
            } => {
                for a in args {
                    self.compile_expr(a)?;
                }
                let id = symbol.expect("resolver fills in every call's symbol");
                match self.symtab.get(id) {
                    Symbol::Function(f) => {
                        let idx = f.index;
                        self.image.emit_tag(Tag::Call);
                        self.image.emit_u8(args.len() as u8);
                        self.image.emit_u32(idx);
                        self.image.emit_tag(Tag::GetRetval);
                    }
                    Symbol::ForeignFunction(f) => {
                        let idx = f.index;
                        self.image.emit_tag(Tag::Callf);
                        self.image.emit_u8(args.len() as u8);
                        self.image.emit_u32(idx);
                        self.image.emit_tag(Tag::GetRetval);
                    }
                    _ => return Err(Self::err(&expr.pos, "called value is not a function")),
                }
            }
            ExprKind::Unary(UnaryOp::Neg, operand) => {
                if let ExprKind::Int(i) = &operand.kind {
                    self.emit_int_literal(-*i);
                } else {
                    self.compile_expr(operand)?;
                    self.emit_int_literal(-1);
                    self.image.emit_tag(Tag::Mul);
                }
            }
            ExprKind::Unary(UnaryOp::Not, operand) => {
                self.compile_expr(operand)?;
                self.image.emit_tag(Tag::LogNot);
            }
            ExprKind::Binary(op, lhs, rhs) => {
                self.compile_expr(lhs)?;
                self.compile_expr(rhs)?;
                self.image.emit_tag(Self::binop_tag(*op));
                if *op == BinOpKind::Ne {
                    self.image.emit_tag(Tag::LogNot);
                }
            }
            ExprKind::Paren(inner) => {
                self.compile_expr(inner)?;
            }
            ExprKind::Dot { receiver, field } => {
                self.compile_expr(receiver)?;
                let field_idx = self.resolve_field_index(receiver, field, &expr.pos)?;
                self.image.emit_tag(Tag::StructGet);
                self.image.emit_u8(field_idx);
            }
            ExprKind::New { args, .. } => {
                for a in args {
                    self.compile_expr(a)?;
                }
                self.image.emit_tag(Tag::PushStruct);
                self.image.emit_u8(args.len() as u8);
            }
            ExprKind::Cast { expr: inner, .. } => {
                // Compile-time-only reinterpretation of `any`; no opcode.
                self.compile_expr(inner)?;
            }
        }
        Ok(())
    }

    fn emit_int_literal(&mut self, i: i64) {
        match i {
            0 => {
                self.image.emit_tag(Tag::PushZero);
            }
            1 => {
                self.image.emit_tag(Tag::PushOne);
            }
            _ => {
                self.image.emit_tag(Tag::PushInt);
                self.image.emit_i32(i as i32);
            }
        }
    }

    /// spec §3: "each global variable must be assigned at least once along
    /// every path before any read". We approximate this with the simpler,
    /// conservative check the spec itself describes: every global symbol's
    /// `initialized` flag must be set by the time compilation finishes.
    fn check_initialized(&self) -> CResult<()> {
        let unassigned = self.symtab.unassigned_globals();
        if let Some(name) = unassigned.into_iter().next() {
            return Err(CodeGenError {
                pos: Pos::new(Rc::from("<program>"), 0),
                message: format!("global '{name}' is never assigned a value"),
            });
        }
        Ok(())
    }
}
