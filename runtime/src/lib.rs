//! `tiny-runtime`: the bytecode VM and host embedding interface for the Tiny
//! language (spec §4.7-§4.9, §5-§7).
//!
//! `tinyc` turns source into a [`host::Program`]; this crate loads that
//! program into one or more [`vm::Vm`] state-threads and drives them to
//! completion. Nothing here depends on the compiler — a host may ship a
//! precompiled image and link only this crate.

pub mod error;
pub mod host;
pub mod vm;

pub use error::RuntimeError;
pub use host::{ForeignFn, NativeTable, Program, ThreadConfig};
pub use vm::Vm;
