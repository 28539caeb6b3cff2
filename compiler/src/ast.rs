//! Abstract syntax tree (spec §3 "AST node").
//!
//! Every expression node carries its source position and (once the resolver
//! has run) a resolved type; every statement carries its originating line
//! number so codegen can emit the `FILE`/`LINE` debug opcodes described in
//! spec §4.6.

use crate::pos::Pos;
use crate::symtab::SymbolId;
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    LogAnd,
    LogOr,
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Null,
    Bool(bool),
    Char(u32),
    Int(i64),
    /// Index into the float intern pool.
    Float(u32),
    /// Index into the string intern pool.
    Str(u32),
    /// An identifier reference. `symbol` is filled in by the resolver (it
    /// may already be set by the parser for non-forward-referenced globals
    /// and all locals, since those are declared eagerly as encountered).
    Ident(String, Option<SymbolId>),
    Call {
        callee: String,
        symbol: Option<SymbolId>,
        args: Vec<Expr>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOpKind, Box<Expr>, Box<Expr>),
    Paren(Box<Expr>),
    Dot {
        receiver: Box<Expr>,
        field: String,
    },
    New {
        tag: String,
        symbol: Option<SymbolId>,
        args: Vec<Expr>,
    },
    Cast {
        expr: Box<Expr>,
        target: Type,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
    pub line: usize,
    /// Filled in by the type resolver; `None` until then.
    pub ty: Option<Type>,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Pos, line: usize) -> Self {
        Expr {
            kind,
            pos,
            line,
            ty: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Ident(String, Option<SymbolId>),
    Dot(Box<Expr>, String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    VarDecl {
        name: String,
        declared_ty: Option<Type>,
        init: Expr,
        symbol: Option<SymbolId>,
    },
    ConstDecl {
        name: String,
        symbol: SymbolId,
    },
    Assign {
        target: AssignTarget,
        compound: Option<BinOpKind>,
        value: Expr,
    },
    Block(Vec<Stmt>),
    FuncDef {
        symbol: SymbolId,
        params: Vec<Param>,
        return_ty: Type,
        body: Vec<Stmt>,
    },
    StructDef {
        symbol: SymbolId,
        fields: Vec<FieldDecl>,
    },
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Box<Stmt>>,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Pos,
    pub line: usize,
}

impl Stmt {
    pub fn new(kind: StmtKind, pos: Pos, line: usize) -> Self {
        Stmt { kind, pos, line }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub top_level: Vec<Stmt>,
}
