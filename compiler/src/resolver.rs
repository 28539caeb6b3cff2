//! Type resolver (spec §4.5): a single post-order walk that attaches a
//! [`Type`] to every expression, checks operand compatibility, resolves
//! forward-referenced identifiers, and validates casts.

use crate::ast::*;
use crate::pool::FloatPool;
use crate::pos::Pos;
use crate::symtab::{Symbol, SymbolId, SymbolTable};
use crate::types::Type;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolveError {
    pub pos: Pos,
    pub message: String,
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl std::error::Error for ResolveError {}

type RResult<T> = Result<T, ResolveError>;

pub struct Resolver<'a> {
    symtab: &'a mut SymbolTable,
    floats: &'a FloatPool,
}

impl<'a> Resolver<'a> {
    pub fn new(symtab: &'a mut SymbolTable, floats: &'a FloatPool) -> Self {
        Resolver { symtab, floats }
    }

    fn err(pos: &Pos, message: impl Into<String>) -> ResolveError {
        ResolveError {
            pos: pos.clone(),
            message: message.into(),
        }
    }

    pub fn resolve_program(&mut self, program: &mut Program) -> RResult<()> {
        for stmt in &mut program.top_level {
            self.resolve_stmt(stmt)?;
        }
        let undefined = self.symtab.undefined_structs();
        if let Some(name) = undefined.into_iter().next() {
            return Err(ResolveError {
                pos: Pos::new(std::rc::Rc::from("<program>"), 0),
                message: format!("struct '{name}' is referenced but never defined"),
            });
        }
        Ok(())
    }

    fn resolve_stmt(&mut self, stmt: &mut Stmt) -> RResult<()> {
        match &mut stmt.kind {
            StmtKind::Expr(e) => {
                self.resolve_expr(e)?;
            }
            StmtKind::VarDecl {
                declared_ty,
                init,
                symbol,
                ..
            } => {
                self.resolve_expr(init)?;
                let init_ty = init.ty.clone().unwrap();
                if init_ty == Type::Void {
                    return Err(Self::err(&stmt.pos, "cannot initialize a variable from a void expression"));
                }
                let final_ty = match declared_ty {
                    Some(t) => {
                        if !init_ty.assignable_to(t) {
                            return Err(Self::err(
                                &stmt.pos,
                                format!("cannot assign {init_ty} to declared type {t}"),
                            ));
                        }
                        t.clone()
                    }
                    None => init_ty,
                };
                if let Some(id) = symbol {
                    self.set_symbol_type(*id, final_ty);
                    self.mark_initialized(*id);
                }
            }
            StmtKind::ConstDecl { .. } => {}
            StmtKind::Assign {
                target,
                value,
                ..
            } => {
                self.resolve_expr(value)?;
                let value_ty = value.ty.clone().unwrap();
                match target {
                    AssignTarget::Ident(name, symbol) => {
                        let id = self.resolve_ident_symbol(name, symbol, &stmt.pos)?;
                        let target_ty = self.symtab.get(id).ty();
                        if !value_ty.assignable_to(&target_ty) {
                            return Err(Self::err(
                                &stmt.pos,
                                format!("cannot assign {value_ty} to {target_ty}"),
                            ));
                        }
                        self.mark_initialized(id);
                    }
                    AssignTarget::Dot(receiver, field) => {
                        self.resolve_expr(receiver)?;
                        let field_ty = self.resolve_field_access(receiver, field, &stmt.pos)?;
                        if !value_ty.assignable_to(&field_ty) {
                            return Err(Self::err(
                                &stmt.pos,
                                format!("cannot assign {value_ty} to field of type {field_ty}"),
                            ));
                        }
                    }
                }
            }
            StmtKind::Block(stmts) => {
                for s in stmts {
                    self.resolve_stmt(s)?;
                }
            }
            StmtKind::FuncDef { body, .. } => {
                for s in body {
                    self.resolve_stmt(s)?;
                }
            }
            StmtKind::StructDef { .. } => {}
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(cond)?;
                for s in then_branch {
                    self.resolve_stmt(s)?;
                }
                if let Some(else_branch) = else_branch {
                    for s in else_branch {
                        self.resolve_stmt(s)?;
                    }
                }
            }
            StmtKind::While { cond, body } => {
                self.resolve_expr(cond)?;
                for s in body {
                    self.resolve_stmt(s)?;
                }
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                if let Some(init) = init {
                    self.resolve_stmt(init)?;
                }
                if let Some(cond) = cond {
                    self.resolve_expr(cond)?;
                }
                for s in body {
                    self.resolve_stmt(s)?;
                }
                if let Some(step) = step {
                    self.resolve_stmt(step)?;
                }
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.resolve_expr(value)?;
                }
            }
            StmtKind::Break | StmtKind::Continue => {}
        }
        Ok(())
    }

    fn mark_initialized(&mut self, id: SymbolId) {
        match self.symtab.get_mut(id) {
            Symbol::Global(g) => g.initialized = true,
            Symbol::Local(_) => {}
            _ => {}
        }
    }

    fn set_symbol_type(&mut self, id: SymbolId, ty: Type) {
        match self.symtab.get_mut(id) {
            Symbol::Global(g) => g.ty = ty,
            Symbol::Local(l) => l.ty = ty,
            _ => {}
        }
    }

    fn resolve_ident_symbol(
        &mut self,
        name: &str,
        symbol: &mut Option<SymbolId>,
        pos: &Pos,
    ) -> RResult<SymbolId> {
        if let Some(id) = symbol {
            return Ok(*id);
        }
        match self.symtab.reference_variable(name) {
            Some(id) => {
                *symbol = Some(id);
                Ok(id)
            }
            None => Err(Self::err(pos, format!("unresolved identifier '{name}'"))),
        }
    }

    fn resolve_field_access(&self, receiver: &Expr, field: &str, pos: &Pos) -> RResult<Type> {
        let recv_ty = receiver.ty.clone().unwrap();
        let Type::Struct(tag) = &recv_ty else {
            return Err(Self::err(pos, format!("'{field}' accessed on non-struct type {recv_ty}")));
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
            .find(|f| f.name == field)
            .map(|f| f.ty.clone())
            .ok_or_else(|| Self::err(pos, format!("struct '{tag}' has no field '{field}'")))
    }

    fn resolve_expr(&mut self, expr: &mut Expr) -> RResult<()> {
        if expr.ty.is_some() {
            return Ok(());
        }
        let ty = match &mut expr.kind {
            ExprKind::Null => Type::Any,
            ExprKind::Bool(_) => Type::Bool,
            ExprKind::Char(_) => Type::Int,
            ExprKind::Int(_) => Type::Int,
            ExprKind::Float(idx) => {
                let _ = self.floats.get(*idx);
                Type::Float
            }
            ExprKind::Str(_) => Type::Str,
            ExprKind::Ident(name, symbol) => {
                let id = self.resolve_ident_symbol(name, symbol, &expr.pos)?;
                self.symtab.get(id).ty()
            }
            ExprKind::Call {
                callee,
                symbol,
                args,
            } => {
                for a in args.iter_mut() {
                    self.resolve_expr(a)?;
                }
                let id = match symbol {
                    Some(id) => *id,
                    None => {
                        let id = self
                            .symtab
                            .reference_function(callee)
                            .ok_or_else(|| Self::err(&expr.pos, format!("unresolved function '{callee}'")))?;
                        *symbol = Some(id);
                        id
                    }
                };
                self.check_call_args(id, args, &expr.pos)?
            }
            ExprKind::Unary(op, operand) => {
                self.resolve_expr(operand)?;
                let operand_ty = operand.ty.clone().unwrap();
                match op {
                    UnaryOp::Neg => {
                        if !operand_ty.is_numeric() {
                            return Err(Self::err(
                                &expr.pos,
                                format!("unary '-' requires a numeric operand, found {operand_ty}"),
                            ));
                        }
                        operand_ty
                    }
                    UnaryOp::Not => {
                        if operand_ty != Type::Bool {
                            return Err(Self::err(
                                &expr.pos,
                                format!("unary '!' requires a bool operand, found {operand_ty}"),
                            ));
                        }
                        Type::Bool
                    }
                }
            }
            ExprKind::Binary(op, lhs, rhs) => {
                self.resolve_expr(lhs)?;
                self.resolve_expr(rhs)?;
                let lty = lhs.ty.clone().unwrap();
                let rty = rhs.ty.clone().unwrap();
                self.check_binary(*op, &lty, &rty, &expr.pos)?
            }
            ExprKind::Paren(inner) => {
                self.resolve_expr(inner)?;
                inner.ty.clone().unwrap()
            }
            ExprKind::Dot { receiver, field } => {
                self.resolve_expr(receiver)?;
                self.resolve_field_access(receiver, field, &expr.pos)?
            }
            ExprKind::New { tag, symbol, args } => {
                for a in args.iter_mut() {
                    self.resolve_expr(a)?;
                }
                let id = match symbol {
                    Some(id) => *id,
                    None => {
                        let id = self.symtab.declare_struct(tag);
                        *symbol = Some(id);
                        id
                    }
                };
                let Symbol::StructTag(tag_sym) = self.symtab.get(id) else {
                    return Err(Self::err(&expr.pos, format!("'{tag}' is not a struct")));
                };
                if tag_sym.fields.len() != args.len() {
                    return Err(Self::err(
                        &expr.pos,
                        format!(
                            "struct '{tag}' expects {} field(s), got {}",
                            tag_sym.fields.len(),
                            args.len()
                        ),
                    ));
                }
                for (i, (field, arg)) in tag_sym.fields.iter().zip(args.iter()).enumerate() {
                    let arg_ty = arg.ty.clone().unwrap();
                    if !arg_ty.assignable_to(&field.ty) {
                        return Err(Self::err(
                            &expr.pos,
                            format!(
                                "field {} of '{tag}' expects {} but got {arg_ty}",
                                i + 1,
                                field.ty
                            ),
                        ));
                    }
                }
                Type::Struct(tag.clone())
            }
            ExprKind::Cast { expr: inner, target } => {
                self.resolve_expr(inner)?;
                let inner_ty = inner.ty.clone().unwrap();
                if inner_ty != Type::Any {
                    return Err(Self::err(
                        &expr.pos,
                        format!("cast source must have type 'any', found {inner_ty}"),
                    ));
                }
                target.clone()
            }
        };
        expr.ty = Some(ty);
        Ok(())
    }

    fn check_call_args(&self, id: SymbolId, args: &[Expr], pos: &Pos) -> RResult<Type> {
        match self.symtab.get(id) {
            Symbol::Function(f) => {
                if args.len() != f.args.len() {
                    return Err(Self::err(
                        pos,
                        format!(
                            "function '{}' expects {} argument(s), got {}",
                            f.name,
                            f.args.len(),
                            args.len()
                        ),
                    ));
                }
                let arg_syms = f.args.clone();
                let return_ty = f.return_ty.clone();
                for (i, (sym_id, arg)) in arg_syms.iter().zip(args.iter()).enumerate() {
                    let expected = self.symtab.get(*sym_id).ty();
                    let got = arg.ty.clone().unwrap();
                    if !got.assignable_to(&expected) {
                        return Err(Self::err(
                            pos,
                            format!(
                                "Argument {} is supposed to be {expected} but you supplied a {got}.",
                                i + 1
                            ),
                        ));
                    }
                }
                Ok(return_ty)
            }
            Symbol::ForeignFunction(f) => {
                if !f.variadic && args.len() != f.arg_types.len() {
                    return Err(Self::err(
                        pos,
                        format!(
                            "foreign function '{}' expects {} argument(s), got {}",
                            f.name,
                            f.arg_types.len(),
                            args.len()
                        ),
                    ));
                }
                if f.variadic && args.len() < f.arg_types.len() {
                    return Err(Self::err(
                        pos,
                        format!(
                            "foreign function '{}' expects at least {} argument(s), got {}",
                            f.name,
                            f.arg_types.len(),
                            args.len()
                        ),
                    ));
                }
                let return_ty = f.return_ty.clone();
                for (i, (expected, arg)) in f.arg_types.iter().zip(args.iter()).enumerate() {
                    let got = arg.ty.clone().unwrap();
                    if !got.assignable_to(expected) {
                        return Err(Self::err(
                            pos,
                            format!(
                                "Argument {} is supposed to be {expected} but you supplied a {got}.",
                                i + 1
                            ),
                        ));
                    }
                }
                Ok(return_ty)
            }
            _ => Err(Self::err(pos, "called value is not a function")),
        }
    }

    fn check_binary(&self, op: BinOpKind, lty: &Type, rty: &Type, pos: &Pos) -> RResult<Type> {
        use BinOpKind::*;
        match op {
            Add | Sub | Mul | Div => Type::arith_result(lty, rty)
                .ok_or_else(|| Self::err(pos, format!("operator requires numeric operands, found {lty} and {rty}"))),
            Mod | BitAnd | BitOr => {
                if lty == &Type::Int && rty == &Type::Int {
                    Ok(Type::Int)
                } else {
                    Err(Self::err(pos, format!("operator requires int operands, found {lty} and {rty}")))
                }
            }
            LogAnd | LogOr => {
                if lty == &Type::Bool && rty == &Type::Bool {
                    Ok(Type::Bool)
                } else {
                    Err(Self::err(pos, format!("operator requires bool operands, found {lty} and {rty}")))
                }
            }
            Lt | Lte | Gt | Gte => {
                if lty.is_numeric() && rty.is_numeric() {
                    Ok(Type::Bool)
                } else {
                    Err(Self::err(pos, format!("comparison requires numeric operands, found {lty} and {rty}")))
                }
            }
            Eq | Ne => {
                if lty == &Type::Void || rty == &Type::Void {
                    return Err(Self::err(pos, "'==' operands must be non-void"));
                }
                if lty != rty && lty != &Type::Any && rty != &Type::Any {
                    return Err(Self::err(
                        pos,
                        format!("cannot compare mismatched types {lty} and {rty}"),
                    ));
                }
                Ok(Type::Bool)
            }
        }
    }
}
