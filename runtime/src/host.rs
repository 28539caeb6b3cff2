//! The host-facing half of the embedding interface (spec §4.9, §5, §6).
//!
//! A [`Program`] is the immutable artifact a `tinyc::State` hands to the
//! runtime once compilation finishes; it is cheap to share across many
//! state-threads (spec §5: "the compiled state itself is read-only
//! post-compilation and may be shared freely"). [`NativeTable`] is the
//! host's registry of foreign-function callbacks, indexed the same way the
//! compiler assigned foreign-function indices via `bind_function`.

use crate::vm::Vm;
use tiny_core::{Image, Value};

/// A foreign function the host installs at the index `bind_function`
/// assigned its signature. Receives the VM (so a native may, e.g., call
/// back into script code, or halt the thread by driving `pc` to -1 through
/// [`Vm::halt`]) and the popped argument slots in call order.
pub type ForeignFn = fn(&mut Vm, args: &[Value]) -> Value;

/// Registry of foreign-function callbacks, indexed by the foreign-function
/// index the compiler assigned during `bind_function`. A slot left `None`
/// faults the thread the first time a `CALLF` targets it.
#[derive(Default)]
pub struct NativeTable {
    fns: Vec<Option<ForeignFn>>,
}

impl NativeTable {
    pub fn new(foreign_count: u32) -> Self {
        NativeTable {
            fns: vec![None; foreign_count as usize],
        }
    }

    /// Install `f` at `index` (the value `tinyc::State::bind_function`
    /// returned for this signature).
    pub fn register(&mut self, index: u32, f: ForeignFn) {
        if index as usize >= self.fns.len() {
            self.fns.resize(index as usize + 1, None);
        }
        self.fns[index as usize] = Some(f);
    }

    pub fn get(&self, index: u32) -> Option<ForeignFn> {
        self.fns.get(index as usize).copied().flatten()
    }
}

/// The compiled artifact a state-thread executes: bytecode image, every
/// script function's entry PC (indexed by function index), the global
/// count, and the string pool (needed at runtime to read `ConstString`
/// bytes for printing and equality).
pub struct Program {
    pub image: Image,
    pub function_pcs: Vec<u32>,
    pub global_count: u32,
    pub strings: Vec<String>,
}

/// Resource limits for a state-thread (spec §3's suggested defaults: a
/// 128-slot value stack, a 64-frame call stack, and a GC threshold of 8
/// objects before the first collection).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadConfig {
    pub stack_size: usize,
    pub max_frames: usize,
    pub gc_threshold: usize,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        ThreadConfig {
            stack_size: 128,
            max_frames: 64,
            gc_threshold: 8,
        }
    }
}
