//! `tiny-core`: the representation shared by the Tiny compiler and runtime.
//!
//! This crate owns the wire format both sides agree on — the bytecode
//! image, the opcode table, the runtime `Value`, and the heap/GC — but not
//! the lexer/parser/resolver/codegen (that's `tinyc`) or the fetch-decode-
//! execute loop (that's `tiny-runtime`). Splitting it out this way means the
//! compiler can be linked into tooling (a disassembler, an LSP) without
//! pulling in the VM, and the runtime can load a precompiled image without
//! linking the front end.

pub mod heap;
pub mod image;
pub mod opcode;
pub mod value;

pub use heap::{Heap, HeapData, HeapObject, NativeObject, NativeProps};
pub use image::Image;
pub use opcode::{BinOp, Tag};
pub use value::Value;
