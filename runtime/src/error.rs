//! Runtime (state-thread) errors.
//!
//! These are never panics: a fault sets the thread's program counter to -1
//! and is returned to the host as a value (spec §7, tier 3). They are a
//! plain enum with a hand-written `Display`, not `thiserror`, matching
//! every other error type in this workspace.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// A `CALL` pushed a frame past `max_frames`.
    FrameStackOverflow,
    /// A push grew the value stack past its fixed size.
    ValueStackOverflow,
    /// PC landed on a `MisalignedPadding` byte — only possible if bytecode
    /// outside a `GOTO`/`CALL` target or a legitimately decoded instruction
    /// stream was jumped into directly.
    MisalignedInstruction { pc: usize },
    /// An opcode read a byte it doesn't recognize.
    UnknownOpcode { pc: usize, byte: u8 },
    /// `GOTO_FALSE`, a struct opcode, or an arithmetic/compare opcode found
    /// a value of the wrong kind on the stack.
    TypeMismatch { expected: &'static str, found: &'static str },
    /// `GET`/`SET`/`GET_LOCAL`/`SET_LOCAL`/`CALL`/`CALLF` referenced an index
    /// outside the allocated table.
    IndexOutOfBounds { what: &'static str, index: i64 },
    /// The value stack underflowed a pop.
    StackUnderflow,
    /// Division or modulo by zero.
    DivideByZero,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::FrameStackOverflow => write!(f, "call frame stack overflow"),
            RuntimeError::ValueStackOverflow => write!(f, "value stack overflow"),
            RuntimeError::MisalignedInstruction { pc } => {
                write!(f, "fetched a misaligned-padding byte as an instruction at pc={pc}")
            }
            RuntimeError::UnknownOpcode { pc, byte } => {
                write!(f, "unknown opcode 0x{byte:02x} at pc={pc}")
            }
            RuntimeError::TypeMismatch { expected, found } => {
                write!(f, "expected a {expected} value but found {found}")
            }
            RuntimeError::IndexOutOfBounds { what, index } => {
                write!(f, "{what} index {index} is out of bounds")
            }
            RuntimeError::StackUnderflow => write!(f, "value stack underflow"),
            RuntimeError::DivideByZero => write!(f, "division by zero"),
        }
    }
}
impl std::error::Error for RuntimeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_detail() {
        let err = RuntimeError::TypeMismatch {
            expected: "bool",
            found: "int",
        };
        assert!(err.to_string().contains("bool"));
        assert!(err.to_string().contains("int"));
    }
}
