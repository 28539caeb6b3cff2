//! The Tiny instruction set.
//!
//! Each [`Opcode`] corresponds to exactly one byte tag in the bytecode
//! image (see [`crate::image`]). Instructions that carry a 32-bit immediate
//! are preceded by 0-3 [`Tag::MisalignedPadding`] bytes so the immediate
//! starts at a 4-aligned offset from the start of the image; readers rely on
//! this and never perform an unaligned read.

/// One-byte opcode tag as it appears in the bytecode image.
///
/// The numeric values are part of the on-disk/in-memory format: once a
/// `State` has been compiled, its image bytes are read back against this
/// table, so reordering variants is a breaking change to anyone holding a
/// compiled image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    PushNull = 0,
    PushTrue = 1,
    PushFalse = 2,
    PushZero = 3,
    PushOne = 4,
    PushInt = 5,
    PushFloat = 6,
    PushStringShort = 7,
    PushString = 8,
    PushNullN = 9,
    PushStruct = 10,
    StructGet = 11,
    StructSet = 12,
    Pop = 13,

    Add = 14,
    Sub = 15,
    Mul = 16,
    Div = 17,
    Mod = 18,
    BitAnd = 19,
    BitOr = 20,
    LogAnd = 21,
    LogOr = 22,
    LogNot = 23,
    Lt = 24,
    Lte = 25,
    Gt = 26,
    Gte = 27,
    Equ = 28,

    Get = 29,
    Set = 30,
    GetLocal = 31,
    SetLocal = 32,

    Goto = 33,
    GotoFalse = 34,

    Call = 35,
    Callf = 36,
    Return = 37,
    ReturnValue = 38,

    File = 39,
    Line = 40,
    Halt = 41,
    /// Pushes the return-value register (spec §4.8); emitted by the code
    /// generator immediately after every compiled `CALL`/`CALLF`, since a
    /// call is an expression and its result must land back on the operand
    /// stack for whatever consumes it (an arithmetic op, an assignment, or
    /// a bare `Pop` if the call is used as a statement).
    GetRetval = 42,

    MisalignedPadding = 255,
}

impl Tag {
    pub fn from_byte(b: u8) -> Option<Tag> {
        use Tag::*;
        Some(match b {
            0 => PushNull,
            1 => PushTrue,
            2 => PushFalse,
            3 => PushZero,
            4 => PushOne,
            5 => PushInt,
            6 => PushFloat,
            7 => PushStringShort,
            8 => PushString,
            9 => PushNullN,
            10 => PushStruct,
            11 => StructGet,
            12 => StructSet,
            13 => Pop,
            14 => Add,
            15 => Sub,
            16 => Mul,
            17 => Div,
            18 => Mod,
            19 => BitAnd,
            20 => BitOr,
            21 => LogAnd,
            22 => LogOr,
            23 => LogNot,
            24 => Lt,
            25 => Lte,
            26 => Gt,
            27 => Gte,
            28 => Equ,
            29 => Get,
            30 => Set,
            31 => GetLocal,
            32 => SetLocal,
            33 => Goto,
            34 => GotoFalse,
            35 => Call,
            36 => Callf,
            37 => Return,
            38 => ReturnValue,
            39 => File,
            40 => Line,
            41 => Halt,
            42 => GetRetval,
            255 => MisalignedPadding,
            _ => return None,
        })
    }
}

/// Which binary arithmetic/comparison opcode a source-level operator lowers to.
///
/// Used by the code generator to go from a parsed operator token straight to
/// a `Tag` without a second match in every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
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
    Equ,
}

impl BinOp {
    pub fn tag(self) -> Tag {
        match self {
            BinOp::Add => Tag::Add,
            BinOp::Sub => Tag::Sub,
            BinOp::Mul => Tag::Mul,
            BinOp::Div => Tag::Div,
            BinOp::Mod => Tag::Mod,
            BinOp::BitAnd => Tag::BitAnd,
            BinOp::BitOr => Tag::BitOr,
            BinOp::LogAnd => Tag::LogAnd,
            BinOp::LogOr => Tag::LogOr,
            BinOp::Lt => Tag::Lt,
            BinOp::Lte => Tag::Lte,
            BinOp::Gt => Tag::Gt,
            BinOp::Gte => Tag::Gte,
            BinOp::Equ => Tag::Equ,
        }
    }
}
