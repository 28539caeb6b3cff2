//! Recursive-descent parser with a Pratt-style precedence climb for binary
//! operators (spec §4.4). Declares symbols as it parses: `:=`/`:` inside a
//! function body create a local, the same forms at top level create a
//! global, `::` always declares a (hoisted) constant.

use crate::ast::*;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::pool::{FloatPool, StringPool};
use crate::pos::Pos;
use crate::symtab::{ConstValue, FieldSym, Symbol, SymbolId, SymbolTable};
use crate::types::{primitive_from_name, Type};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub pos: Pos,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl std::error::Error for ParseError {}

type PResult<T> = Result<T, ParseError>;

/// Tracks the function currently being parsed, so locals are declared with
/// the right slot index and nested function/struct definitions can be
/// rejected (spec §4.4: definitions are not allowed inside other functions).
struct FunctionScope {
    next_local_slot: i32,
    locals: Vec<SymbolId>,
}

pub struct Parser<'a> {
    tokens: Vec<Token>,
    idx: usize,
    source: &'a str,
    pub symtab: &'a mut SymbolTable,
    pub strings: &'a mut StringPool,
    pub floats: &'a mut FloatPool,
    current_function: Option<FunctionScope>,
    loop_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(
        file: Rc<str>,
        source: &'a str,
        symtab: &'a mut SymbolTable,
        strings: &'a mut StringPool,
        floats: &'a mut FloatPool,
    ) -> PResult<Self> {
        let tokens = Lexer::new(file, source)
            .tokenize()
            .map_err(|e| ParseError {
                pos: e.pos,
                message: e.message,
            })?;
        Ok(Parser {
            tokens,
            idx: 0,
            source,
            symtab,
            strings,
            floats,
            current_function: None,
            loop_depth: 0,
        })
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.idx].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let i = (self.idx + offset).min(self.tokens.len() - 1);
        &self.tokens[i].kind
    }

    fn pos(&self) -> Pos {
        self.tokens[self.idx].pos.clone()
    }

    fn line_of(&self, pos: &Pos) -> usize {
        pos.line_col(self.source).0
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.idx].clone();
        if self.idx + 1 < self.tokens.len() {
            self.idx += 1;
        }
        tok
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            pos: self.pos(),
            message: message.into(),
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> PResult<Token> {
        if self.peek() == kind {
            Ok(self.bump())
        } else {
            Err(self.err(format!("expected {what}, found {:?}", self.peek())))
        }
    }

    fn expect_ident(&mut self) -> PResult<(String, Pos)> {
        let pos = self.pos();
        match self.bump().kind {
            TokenKind::Ident(name) => Ok((name, pos)),
            other => Err(ParseError {
                pos,
                message: format!("expected identifier, found {other:?}"),
            }),
        }
    }

    fn stmt(&self, kind: StmtKind, pos: Pos) -> Stmt {
        let line = self.line_of(&pos);
        Stmt::new(kind, pos, line)
    }

    fn expr(&self, kind: ExprKind, pos: Pos) -> Expr {
        let line = self.line_of(&pos);
        Expr::new(kind, pos, line)
    }

    pub fn parse_program(&mut self) -> PResult<Program> {
        let mut top_level = Vec::new();
        while self.peek() != &TokenKind::Sub {
            top_level.push(self.parse_top_level_stmt()?);
        }
        Ok(Program { top_level })
    }

    fn parse_top_level_stmt(&mut self) -> PResult<Stmt> {
        match self.peek() {
            TokenKind::KwFunc => self.parse_func_def(),
            TokenKind::KwStruct => self.parse_struct_def(),
            _ => self.parse_stmt(),
        }
    }

    fn parse_type(&mut self) -> PResult<Type> {
        let (name, _) = self.expect_ident()?;
        if let Some(t) = primitive_from_name(&name) {
            return Ok(t);
        }
        if self.symtab.is_foreign_type(&name) {
            return Ok(Type::Foreign(name));
        }
        // Forward reference to a struct type: declare the tag now, define
        // it later when (if) its `struct` block is parsed.
        self.symtab.declare_struct(&name);
        Ok(Type::Struct(name))
    }

    fn parse_func_def(&mut self) -> PResult<Stmt> {
        let pos = self.pos();
        self.bump(); // func
        let (name, _) = self.expect_ident()?;
        let symbol = self
            .symtab
            .declare_function(&name)
            .map_err(|m| self.err(m))?;

        self.expect(&TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if self.peek() != &TokenKind::RParen {
            loop {
                let (pname, _) = self.expect_ident()?;
                self.expect(&TokenKind::Colon, "':'")?;
                let ty = self.parse_type()?;
                params.push(Param { name: pname, ty });
                if self.peek() == &TokenKind::Comma {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        self.expect(&TokenKind::Colon, "':' return type")?;
        let return_ty = self.parse_type()?;

        if let Symbol::Function(f) = self.symtab.get_mut(symbol) {
            f.return_ty = return_ty.clone();
        }

        if self.current_function.is_some() {
            return Err(self.err("function definitions cannot be nested"));
        }

        self.symtab.open_scope();
        let total_args = params.len();
        let mut arg_syms = Vec::new();
        for (i, p) in params.iter().enumerate() {
            let sym = self
                .symtab
                .declare_argument(&p.name, p.ty.clone(), i, total_args)
                .map_err(|m| self.err(m))?;
            arg_syms.push(sym);
        }
        if let Symbol::Function(f) = self.symtab.get_mut(symbol) {
            f.args = arg_syms;
        }

        self.current_function = Some(FunctionScope {
            next_local_slot: 0,
            locals: Vec::new(),
        });
        let body_result = self.parse_block_stmts();
        let locals = self
            .current_function
            .take()
            .map(|f| f.locals)
            .unwrap_or_default();
        self.symtab.close_scope();
        let body = body_result?;
        if let Symbol::Function(f) = self.symtab.get_mut(symbol) {
            f.locals = locals;
        }

        Ok(self.stmt(
            StmtKind::FuncDef {
                symbol,
                params,
                return_ty,
                body,
            },
            pos,
        ))
    }

    fn parse_struct_def(&mut self) -> PResult<Stmt> {
        let pos = self.pos();
        self.bump(); // struct
        let (name, _) = self.expect_ident()?;
        if self.current_function.is_some() {
            return Err(self.err("struct definitions are only allowed at top level"));
        }
        let symbol = self.symtab.declare_struct(&name);
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut fields = Vec::new();
        while self.peek() != &TokenKind::RBrace {
            let (fname, _) = self.expect_ident()?;
            self.expect(&TokenKind::Colon, "':'")?;
            let ty = self.parse_type()?;
            fields.push(FieldDecl { name: fname, ty });
            if self.peek() == &TokenKind::Comma {
                self.bump();
            }
        }
        self.expect(&TokenKind::RBrace, "'}'")?;

        let field_syms = fields
            .iter()
            .map(|f| FieldSym {
                name: f.name.clone(),
                ty: f.ty.clone(),
            })
            .collect();
        self.symtab.define_struct(symbol, field_syms);

        Ok(self.stmt(StmtKind::StructDef { symbol, fields }, pos))
    }

    fn parse_block_stmts(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        self.symtab.open_scope();
        let result = self.parse_block_stmts_inner();
        self.symtab.close_scope();
        result
    }

    fn parse_block_stmts_inner(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while self.peek() != &TokenKind::RBrace {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(stmts)
    }

    fn next_local_slot(&mut self) -> i32 {
        let scope = self
            .current_function
            .as_mut()
            .expect("locals can only be declared inside a function");
        let slot = scope.next_local_slot;
        scope.next_local_slot += 1;
        slot
    }

    fn record_local(&mut self, id: SymbolId) {
        if let Some(scope) = self.current_function.as_mut() {
            scope.locals.push(id);
        }
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        let pos = self.pos();
        match self.peek().clone() {
            TokenKind::LBrace => {
                let stmts = self.parse_block_stmts()?;
                Ok(self.stmt(StmtKind::Block(stmts), pos))
            }
            TokenKind::KwIf => self.parse_if(),
            TokenKind::KwWhile => self.parse_while(),
            TokenKind::KwFor => self.parse_for(),
            TokenKind::KwReturn => {
                self.bump();
                let value = if self.stmt_terminator_ahead() {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                Ok(self.stmt(StmtKind::Return(value), pos))
            }
            TokenKind::KwBreak => {
                self.bump();
                if self.loop_depth == 0 {
                    return Err(ParseError {
                        pos,
                        message: "'break' outside of a loop".to_string(),
                    });
                }
                Ok(self.stmt(StmtKind::Break, pos))
            }
            TokenKind::KwContinue => {
                self.bump();
                if self.loop_depth == 0 {
                    return Err(ParseError {
                        pos,
                        message: "'continue' outside of a loop".to_string(),
                    });
                }
                Ok(self.stmt(StmtKind::Continue, pos))
            }
            TokenKind::Ident(name)
                if matches!(self.peek_at(1), TokenKind::ColonEq | TokenKind::ColonColon)
                    || (self.peek_at(1) == &TokenKind::Colon
                        && !matches!(self.peek_at(2), TokenKind::Colon)) =>
            {
                self.parse_decl(name, pos)
            }
            _ => self.parse_assign_or_expr_stmt(pos),
        }
    }

    /// True if we're at a token that can legally end a bare `return`
    /// (anything that isn't the start of an expression).
    fn stmt_terminator_ahead(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::RBrace | TokenKind::Sub | TokenKind::KwBreak | TokenKind::KwContinue
        )
    }

    fn parse_decl(&mut self, name: String, pos: Pos) -> PResult<Stmt> {
        self.bump(); // the identifier
        match self.bump().kind {
            TokenKind::ColonEq => {
                let init = self.parse_expr()?;
                let symbol = self.declare_var(&name, None)?;
                Ok(self.stmt(
                    StmtKind::VarDecl {
                        name,
                        declared_ty: None,
                        init,
                        symbol: Some(symbol),
                    },
                    pos,
                ))
            }
            TokenKind::Colon => {
                let ty = self.parse_type()?;
                self.expect(&TokenKind::Eq, "'='")?;
                let init = self.parse_expr()?;
                let symbol = self.declare_var(&name, Some(ty.clone()))?;
                Ok(self.stmt(
                    StmtKind::VarDecl {
                        name,
                        declared_ty: Some(ty),
                        init,
                        symbol: Some(symbol),
                    },
                    pos,
                ))
            }
            TokenKind::ColonColon => {
                let lit_pos = self.pos();
                let value = self.parse_const_literal(&lit_pos)?;
                let ty = value.ty();
                let inside_fn = self.current_function.is_some();
                let symbol = self
                    .symtab
                    .declare_constant(&name, ty, value)
                    .map_err(|m| self.err(m))?;
                if inside_fn {
                    eprintln!(
                        "warning: constant '{name}' declared inside a function is hoisted to global scope"
                    );
                }
                Ok(self.stmt(StmtKind::ConstDecl { name, symbol }, pos))
            }
            other => Err(ParseError {
                pos,
                message: format!("expected ':=', ':' or '::', found {other:?}"),
            }),
        }
    }

    fn declare_var(&mut self, name: &str, ty: Option<Type>) -> PResult<SymbolId> {
        if self.current_function.is_some() {
            let slot = self.next_local_slot();
            let id = self
                .symtab
                .declare_local(name, ty.unwrap_or(Type::Any), slot)
                .map_err(|m| self.err(m))?;
            self.record_local(id);
            Ok(id)
        } else {
            self.symtab
                .declare_global(name, ty.unwrap_or(Type::Any))
                .map_err(|m| self.err(m))
        }
    }

    fn parse_const_literal(&mut self, pos: &Pos) -> PResult<ConstValue> {
        match self.bump().kind {
            TokenKind::Bool(b) => Ok(ConstValue::Bool(b)),
            TokenKind::Int(i) => Ok(ConstValue::Int(i as i32)),
            TokenKind::Float(f) => Ok(ConstValue::Float(f as f32)),
            TokenKind::Str(s) => Ok(ConstValue::Str(s)),
            other => Err(ParseError {
                pos: pos.clone(),
                message: format!("'::' requires a literal value, found {other:?}"),
            }),
        }
    }

    fn compound_op(kind: &TokenKind) -> Option<BinOpKind> {
        Some(match kind {
            TokenKind::PlusEq => BinOpKind::Add,
            TokenKind::MinusEq => BinOpKind::Sub,
            TokenKind::StarEq => BinOpKind::Mul,
            TokenKind::SlashEq => BinOpKind::Div,
            TokenKind::PercentEq => BinOpKind::Mod,
            TokenKind::AmpEq => BinOpKind::BitAnd,
            TokenKind::PipeEq => BinOpKind::BitOr,
            _ => return None,
        })
    }

    fn parse_assign_or_expr_stmt(&mut self, pos: Pos) -> PResult<Stmt> {
        let expr = self.parse_unary()?;
        if self.peek() == &TokenKind::Eq || Self::compound_op(self.peek()).is_some() {
            let compound = Self::compound_op(self.peek());
            self.bump();
            let value = self.parse_expr()?;
            let target = match expr.kind {
                ExprKind::Ident(name, sym) => AssignTarget::Ident(name, sym),
                ExprKind::Dot { receiver, field } => AssignTarget::Dot(receiver, field),
                _ => {
                    return Err(ParseError {
                        pos,
                        message: "invalid assignment target".to_string(),
                    })
                }
            };
            return Ok(self.stmt(
                StmtKind::Assign {
                    target,
                    compound,
                    value,
                },
                pos,
            ));
        }
        Ok(self.stmt(StmtKind::Expr(expr), pos))
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        let pos = self.pos();
        self.bump(); // if
        let cond = self.parse_expr()?;
        let then_branch = self.parse_block_stmts()?;
        let else_branch = if self.peek() == &TokenKind::KwElse {
            self.bump();
            if self.peek() == &TokenKind::KwIf {
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_block_stmts()?)
            }
        } else {
            None
        };
        Ok(self.stmt(
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            },
            pos,
        ))
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let pos = self.pos();
        self.bump(); // while
        let cond = self.parse_expr()?;
        self.loop_depth += 1;
        let body = self.parse_block_stmts();
        self.loop_depth -= 1;
        Ok(self.stmt(StmtKind::While { cond, body: body? }, pos))
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        let pos = self.pos();
        self.bump(); // for
        self.expect(&TokenKind::LParen, "'('")?;
        self.symtab.open_scope();

        let result = self.parse_for_inner();
        self.symtab.close_scope();
        let (init, cond, step, body) = result?;

        Ok(self.stmt(
            StmtKind::For {
                init,
                cond,
                step,
                body,
            },
            pos,
        ))
    }

    #[allow(clippy::type_complexity)]
    fn parse_for_inner(
        &mut self,
    ) -> PResult<(Option<Box<Stmt>>, Option<Expr>, Option<Box<Stmt>>, Vec<Stmt>)> {
        let init = if self.peek() == &TokenKind::Semi || self.peek() == &TokenKind::RParen {
            None
        } else {
            Some(Box::new(self.parse_for_clause_stmt()?))
        };
        self.expect(&TokenKind::Semi, "';' after for-init")?;
        let cond = if self.peek() == &TokenKind::Semi {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&TokenKind::Semi, "';' after for-condition")?;
        let step = if self.peek() == &TokenKind::RParen {
            None
        } else {
            Some(Box::new(self.parse_for_clause_stmt()?))
        };
        self.expect(&TokenKind::RParen, "')'")?;

        self.loop_depth += 1;
        let body = self.parse_block_stmts();
        self.loop_depth -= 1;
        Ok((init, cond, step, body?))
    }

    /// A `for`-clause is either a declaration or an assignment/expression,
    /// without the loop-wide statement terminators.
    fn parse_for_clause_stmt(&mut self) -> PResult<Stmt> {
        let pos = self.pos();
        if let TokenKind::Ident(name) = self.peek().clone() {
            if matches!(self.peek_at(1), TokenKind::ColonEq | TokenKind::Colon) {
                return self.parse_decl(name, pos);
            }
        }
        self.parse_assign_or_expr_stmt(pos)
    }

    // ---- Expressions ----

    pub fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_binary(2)
    }

    fn precedence(kind: &TokenKind) -> Option<(u8, BinOpKind)> {
        Some(match kind {
            TokenKind::AmpAmp => (2, BinOpKind::LogAnd),
            TokenKind::PipePipe => (2, BinOpKind::LogOr),
            TokenKind::EqEq => (3, BinOpKind::Eq),
            TokenKind::BangEq => (3, BinOpKind::Ne),
            TokenKind::Lt => (3, BinOpKind::Lt),
            TokenKind::Lte => (3, BinOpKind::Lte),
            TokenKind::Gt => (3, BinOpKind::Gt),
            TokenKind::Gte => (3, BinOpKind::Gte),
            TokenKind::Plus => (4, BinOpKind::Add),
            TokenKind::Minus => (4, BinOpKind::Sub),
            TokenKind::Star => (5, BinOpKind::Mul),
            TokenKind::Slash => (5, BinOpKind::Div),
            TokenKind::Percent => (5, BinOpKind::Mod),
            TokenKind::Amp => (5, BinOpKind::BitAnd),
            TokenKind::Pipe => (5, BinOpKind::BitOr),
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        while let Some((prec, op)) = Self::precedence(self.peek()) {
            if prec < min_prec {
                break;
            }
            let pos = self.pos();
            self.bump();
            let rhs = self.parse_binary(prec + 1)?;
            lhs = self.expr(ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)), pos);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let pos = self.pos();
        match self.peek() {
            TokenKind::Minus => {
                self.bump();
                let operand = self.parse_unary()?;
                Ok(self.expr(ExprKind::Unary(UnaryOp::Neg, Box::new(operand)), pos))
            }
            TokenKind::Bang => {
                self.bump();
                let operand = self.parse_unary()?;
                Ok(self.expr(ExprKind::Unary(UnaryOp::Not, Box::new(operand)), pos))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.peek() == &TokenKind::Dot {
                let pos = self.pos();
                self.bump();
                let (field, _) = self.expect_ident()?;
                expr = self.expr(
                    ExprKind::Dot {
                        receiver: Box::new(expr),
                        field,
                    },
                    pos,
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let pos = self.pos();
        match self.bump().kind {
            TokenKind::Int(i) => Ok(self.expr(ExprKind::Int(i), pos)),
            TokenKind::Float(f) => {
                let idx = self.floats.intern(f as f32);
                Ok(self.expr(ExprKind::Float(idx), pos))
            }
            TokenKind::Bool(b) => Ok(self.expr(ExprKind::Bool(b), pos)),
            TokenKind::Char(c) => Ok(self.expr(ExprKind::Char(c), pos)),
            TokenKind::Str(s) => {
                let idx = self.strings.intern(&s);
                Ok(self.expr(ExprKind::Str(idx), pos))
            }
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(self.expr(ExprKind::Paren(Box::new(inner)), pos))
            }
            TokenKind::KwNew => {
                let (tag, _) = self.expect_ident()?;
                let symbol = self.symtab.reference_struct(&tag);
                let symbol = Some(symbol.unwrap_or_else(|| self.symtab.declare_struct(&tag)));
                self.expect(&TokenKind::LBrace, "'{'")?;
                let mut args = Vec::new();
                if self.peek() != &TokenKind::RBrace {
                    loop {
                        args.push(self.parse_expr()?);
                        if self.peek() == &TokenKind::Comma {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RBrace, "'}'")?;
                Ok(self.expr(ExprKind::New { tag, symbol, args }, pos))
            }
            TokenKind::KwCast => {
                self.expect(&TokenKind::LParen, "'('")?;
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::Comma, "','")?;
                let target = self.parse_type()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(self.expr(
                    ExprKind::Cast {
                        expr: Box::new(expr),
                        target,
                    },
                    pos,
                ))
            }
            TokenKind::Ident(name) => {
                if self.peek() == &TokenKind::LParen {
                    self.bump();
                    let mut args = Vec::new();
                    if self.peek() != &TokenKind::RParen {
                        loop {
                            args.push(self.parse_expr()?);
                            if self.peek() == &TokenKind::Comma {
                                self.bump();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::RParen, "')'")?;
                    let symbol = self.symtab.reference_function(&name);
                    Ok(self.expr(
                        ExprKind::Call {
                            callee: name,
                            symbol,
                            args,
                        },
                        pos,
                    ))
                } else {
                    let symbol = self.symtab.reference_variable(&name);
                    Ok(self.expr(ExprKind::Ident(name, symbol), pos))
                }
            }
            other => Err(ParseError {
                pos,
                message: format!("unexpected token {other:?}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> PResult<Program> {
        let mut symtab = SymbolTable::new();
        let mut strings = StringPool::new();
        let mut floats = FloatPool::new();
        let mut p = Parser::new(
            Rc::from("test.tiny"),
            src,
            &mut symtab,
            &mut strings,
            &mut floats,
        )?;
        p.parse_program()
    }

    #[test]
    fn parses_a_function_and_a_call() {
        let prog = parse("func add(a: int, b: int): int { return a + b }\nadd(1, 2)").unwrap();
        assert_eq!(prog.top_level.len(), 2);
        assert!(matches!(prog.top_level[0].kind, StmtKind::FuncDef { .. }));
        assert!(matches!(prog.top_level[1].kind, StmtKind::Expr(_)));
    }

    #[test]
    fn inferred_var_decl_assigns_a_slot() {
        let prog = parse("func f(): int { x := 1 y := 2 return x + y }").unwrap();
        if let StmtKind::FuncDef { body, .. } = &prog.top_level[0].kind {
            assert!(matches!(body[0].kind, StmtKind::VarDecl { .. }));
            assert!(matches!(body[1].kind, StmtKind::VarDecl { .. }));
        } else {
            panic!("expected FuncDef");
        }
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let err = parse("func f(): void { break }").unwrap_err();
        assert!(err.message.contains("break"));
    }

    #[test]
    fn struct_fields_need_no_commas() {
        let prog = parse("struct P { x: int y: int }").unwrap();
        if let StmtKind::StructDef { fields, .. } = &prog.top_level[0].kind {
            assert_eq!(fields.len(), 2);
        } else {
            panic!("expected StructDef");
        }
    }

    #[test]
    fn compound_assignment_parses_with_target() {
        let prog = parse("func f(): void { x := 1 x += 2 }").unwrap();
        if let StmtKind::FuncDef { body, .. } = &prog.top_level[0].kind {
            match &body[1].kind {
                StmtKind::Assign { compound, .. } => assert_eq!(*compound, Some(BinOpKind::Add)),
                other => panic!("expected Assign, got {other:?}"),
            }
        } else {
            panic!("expected FuncDef");
        }
    }

    #[test]
    fn precedence_climbs_correctly() {
        // 1 + 2 * 3 should parse as 1 + (2 * 3).
        let prog = parse("func f(): int { return 1 + 2 * 3 }").unwrap();
        if let StmtKind::FuncDef { body, .. } = &prog.top_level[0].kind {
            if let StmtKind::Return(Some(e)) = &body[0].kind {
                match &e.kind {
                    ExprKind::Binary(BinOpKind::Add, _, rhs) => {
                        assert!(matches!(rhs.kind, ExprKind::Binary(BinOpKind::Mul, _, _)));
                    }
                    other => panic!("expected top-level Add, got {other:?}"),
                }
            } else {
                panic!("expected return expression");
            }
        } else {
            panic!("expected FuncDef");
        }
    }

    #[test]
    fn for_clauses_are_semicolon_separated() {
        let prog = parse("func f(): void { for (i := 0; i < 10; i += 1) { } }").unwrap();
        if let StmtKind::FuncDef { body, .. } = &prog.top_level[0].kind {
            match &body[0].kind {
                StmtKind::For { init, cond, step, .. } => {
                    assert!(init.is_some());
                    assert!(cond.is_some());
                    assert!(step.is_some());
                }
                other => panic!("expected For, got {other:?}"),
            }
        } else {
            panic!("expected FuncDef");
        }
    }
}
