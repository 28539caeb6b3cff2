//! State-thread VM: fetch-decode-execute loop, frame stack, GC triggering,
//! and host re-entrancy (spec §4.8).
//!
//! A thread owns its value stack, frame stack, heap and globals; nothing is
//! shared with another thread compiled from the same [`Program`] (spec §5).

use crate::error::RuntimeError;
use crate::host::{NativeTable, Program, ThreadConfig};
use std::rc::Rc;
use tiny_core::image::Reader;
use tiny_core::{Heap, Tag, Value};

struct Frame {
    /// PC to resume the caller at once this call returns.
    return_pc: i64,
    /// Caller's frame pointer, restored on return.
    saved_fp: i32,
    /// Argument count, so `RETURN`/`RETURN_VALUE` know how far past the
    /// frame pointer to unwind the value stack.
    nargs: u8,
}

pub struct Vm {
    program: Rc<Program>,
    natives: Rc<NativeTable>,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    /// -1 once halted; otherwise a valid opcode offset into the image.
    pc: i64,
    fp: i32,
    return_value: Value,
    heap: Heap,
    globals: Vec<Value>,
    current_file: Option<u32>,
    current_line: u32,
    max_stack: usize,
    max_frames: usize,
    started: bool,
}

impl Vm {
    /// `init_thread` (spec §4.9): allocate a thread against `program`, ready
    /// to `start`.
    pub fn new(program: Rc<Program>, natives: Rc<NativeTable>, config: ThreadConfig) -> Self {
        Vm {
            program,
            natives,
            stack: Vec::with_capacity(config.stack_size),
            frames: Vec::with_capacity(config.max_frames),
            pc: -1,
            fp: 0,
            return_value: Value::Null,
            heap: Heap::new(config.gc_threshold),
            globals: Vec::new(),
            current_file: None,
            current_line: 0,
            max_stack: config.stack_size,
            max_frames: config.max_frames,
            started: false,
        }
    }

    /// `start_thread`: allocate globals lazily and set the PC to the start
    /// of the image. Idempotent — a second call is a no-op.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.ensure_globals_allocated();
        self.pc = 0;
        self.started = true;
    }

    fn ensure_globals_allocated(&mut self) {
        if self.globals.len() < self.program.global_count as usize {
            self.globals.resize(self.program.global_count as usize, Value::Null);
        }
    }

    pub fn is_live(&self) -> bool {
        self.pc >= 0
    }

    pub fn current_file_line(&self) -> (Option<&str>, u32) {
        let file = self
            .current_file
            .and_then(|idx| self.program.strings.get(idx as usize))
            .map(|s| s.as_str());
        (file, self.current_line)
    }

    pub fn return_value(&self) -> Value {
        self.return_value
    }

    pub fn get_global(&self, idx: u32) -> Value {
        self.globals[idx as usize]
    }

    pub fn set_global(&mut self, idx: u32, value: Value) {
        self.globals[idx as usize] = value;
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// A native callback's documented way to abort execution (spec §7):
    /// "host callbacks ... may set `pc = -1` to halt the thread from
    /// within".
    pub fn halt(&mut self) {
        self.pc = -1;
    }

    /// Read a string value's bytes, whether interned (`ConstString`) or
    /// heap-allocated (`HeapString`).
    pub fn string_bytes<'s>(&'s self, v: &Value) -> Option<&'s str> {
        match v {
            Value::ConstString(idx) => self.program.strings.get(*idx as usize).map(|s| s.as_str()),
            Value::HeapString(p) => unsafe { (**p).as_str() },
            _ => None,
        }
    }

    /// `execute_cycle`: run exactly one opcode. Returns whether the thread
    /// is still live. A runtime fault sets `pc = -1` and is returned as an
    /// error; the thread must not be stepped again afterward.
    pub fn execute_cycle(&mut self) -> Result<bool, RuntimeError> {
        if !self.is_live() {
            return Ok(false);
        }
        if let Err(e) = self.step() {
            self.pc = -1;
            return Err(e);
        }
        if self.heap.object_count >= self.heap.gc_threshold {
            self.collect();
        }
        Ok(self.is_live())
    }

    fn collect(&mut self) {
        unsafe {
            for v in &self.stack {
                if let Some(p) = v.heap_ptr() {
                    self.heap.mark(p);
                }
            }
            for v in &self.globals {
                if let Some(p) = v.heap_ptr() {
                    self.heap.mark(p);
                }
            }
            if let Some(p) = self.return_value.heap_ptr() {
                self.heap.mark(p);
            }
        }
        self.heap.sweep();
    }

    /// `call_function`: drive the VM to completion of a single script-level
    /// call, re-entrantly (spec §4.8 "Host re-entrancy"). Globals are
    /// allocated lazily here too, in case the host never called `start`.
    pub fn call_function(&mut self, func_idx: u32, args: &[Value]) -> Result<Value, RuntimeError> {
        self.ensure_globals_allocated();
        let entry = *self
            .program
            .function_pcs
            .get(func_idx as usize)
            .ok_or(RuntimeError::IndexOutOfBounds {
                what: "function",
                index: func_idx as i64,
            })?;

        let saved_pc = self.pc;
        let saved_fp = self.fp;
        let saved_file = self.current_file;
        let saved_line = self.current_line;
        let saved_return = self.return_value;
        let baseline_frames = self.frames.len();

        for &a in args {
            self.push(a)?;
        }
        self.frames.push(Frame {
            return_pc: saved_pc,
            saved_fp,
            nargs: args.len() as u8,
        });
        if self.frames.len() > self.max_frames {
            self.pc = -1;
            return Err(RuntimeError::FrameStackOverflow);
        }
        self.fp = self.stack.len() as i32;
        self.pc = entry as i64;

        while self.frames.len() > baseline_frames {
            match self.execute_cycle() {
                Ok(true) => {}
                Ok(false) => break, // HALT inside the called function
                Err(e) => return Err(e),
            }
        }

        let result = self.return_value;
        self.pc = saved_pc;
        self.fp = saved_fp;
        self.current_file = saved_file;
        self.current_line = saved_line;
        self.return_value = saved_return;
        Ok(result)
    }

    fn push(&mut self, v: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= self.max_stack {
            return Err(RuntimeError::ValueStackOverflow);
        }
        self.stack.push(v);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    fn local_slot(&self, slot: i32) -> usize {
        (self.fp + slot) as usize
    }

    fn step(&mut self) -> Result<(), RuntimeError> {
        let program = Rc::clone(&self.program);
        let mut r = Reader::at(&program.image, self.pc as usize);
        let byte = r.read_u8();
        let tag = Tag::from_byte(byte).ok_or(RuntimeError::UnknownOpcode {
            pc: self.pc as usize,
            byte,
        })?;
        if tag == Tag::MisalignedPadding {
            return Err(RuntimeError::MisalignedInstruction { pc: self.pc as usize });
        }

        match tag {
            Tag::PushNull => {
                self.push(Value::Null)?;
                self.pc = r.pc() as i64;
            }
            Tag::PushTrue => {
                self.push(Value::Bool(true))?;
                self.pc = r.pc() as i64;
            }
            Tag::PushFalse => {
                self.push(Value::Bool(false))?;
                self.pc = r.pc() as i64;
            }
            Tag::PushZero => {
                self.push(Value::Int(0))?;
                self.pc = r.pc() as i64;
            }
            Tag::PushOne => {
                self.push(Value::Int(1))?;
                self.pc = r.pc() as i64;
            }
            Tag::PushInt => {
                let v = r.read_i32();
                self.push(Value::Int(v))?;
                self.pc = r.pc() as i64;
            }
            Tag::PushFloat => {
                let v = r.read_f32();
                self.push(Value::Float(v))?;
                self.pc = r.pc() as i64;
            }
            Tag::PushStringShort => {
                let idx = r.read_u8();
                self.push(Value::ConstString(idx as u32))?;
                self.pc = r.pc() as i64;
            }
            Tag::PushString => {
                let idx = r.read_u32();
                self.push(Value::ConstString(idx))?;
                self.pc = r.pc() as i64;
            }
            Tag::PushNullN => {
                let n = r.read_u8();
                for _ in 0..n {
                    self.push(Value::Null)?;
                }
                self.pc = r.pc() as i64;
            }
            Tag::PushStruct => {
                let n = r.read_u8() as usize;
                if self.stack.len() < n {
                    return Err(RuntimeError::StackUnderflow);
                }
                let fields: Vec<Value> = self.stack.split_off(self.stack.len() - n);
                let ptr = self.heap.alloc_struct(fields);
                self.push(Value::Struct(ptr))?;
                self.pc = r.pc() as i64;
            }
            Tag::StructGet => {
                let idx = r.read_u8() as usize;
                let recv = self.pop()?;
                let Value::Struct(ptr) = recv else {
                    return Err(RuntimeError::TypeMismatch {
                        expected: "struct",
                        found: recv.type_name(),
                    });
                };
                let field = unsafe { (*ptr).as_struct() }
                    .and_then(|fields| fields.get(idx).copied())
                    .ok_or(RuntimeError::IndexOutOfBounds {
                        what: "struct field",
                        index: idx as i64,
                    })?;
                self.push(field)?;
                self.pc = r.pc() as i64;
            }
            Tag::StructSet => {
                let idx = r.read_u8() as usize;
                let value = self.pop()?;
                let recv = self.pop()?;
                let Value::Struct(ptr) = recv else {
                    return Err(RuntimeError::TypeMismatch {
                        expected: "struct",
                        found: recv.type_name(),
                    });
                };
                let slot = unsafe { (*ptr).as_struct_mut() }
                    .and_then(|fields| fields.get_mut(idx))
                    .ok_or(RuntimeError::IndexOutOfBounds {
                        what: "struct field",
                        index: idx as i64,
                    })?;
                *slot = value;
                self.pc = r.pc() as i64;
            }
            Tag::Pop => {
                self.pop()?;
                self.pc = r.pc() as i64;
            }
            Tag::Add | Tag::Sub | Tag::Mul | Tag::Div => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                let result = arith(tag, lhs, rhs)?;
                self.push(result)?;
                self.pc = r.pc() as i64;
            }
            Tag::Mod | Tag::BitAnd | Tag::BitOr => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                let result = int_binop(tag, lhs, rhs)?;
                self.push(result)?;
                self.pc = r.pc() as i64;
            }
            Tag::LogAnd | Tag::LogOr => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                let (a, b) = (as_bool(lhs)?, as_bool(rhs)?);
                let result = if tag == Tag::LogAnd { a && b } else { a || b };
                self.push(Value::Bool(result))?;
                self.pc = r.pc() as i64;
            }
            Tag::LogNot => {
                let v = as_bool(self.pop()?)?;
                self.push(Value::Bool(!v))?;
                self.pc = r.pc() as i64;
            }
            Tag::Lt | Tag::Lte | Tag::Gt | Tag::Gte => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                let result = compare(tag, lhs, rhs)?;
                self.push(Value::Bool(result))?;
                self.pc = r.pc() as i64;
            }
            Tag::Equ => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                let result = self.values_equal(&lhs, &rhs);
                self.push(Value::Bool(result))?;
                self.pc = r.pc() as i64;
            }
            Tag::Get => {
                let idx = r.read_u32();
                let v = *self.globals.get(idx as usize).ok_or(RuntimeError::IndexOutOfBounds {
                    what: "global",
                    index: idx as i64,
                })?;
                self.push(v)?;
                self.pc = r.pc() as i64;
            }
            Tag::Set => {
                let idx = r.read_u32();
                let v = self.pop()?;
                if idx as usize >= self.globals.len() {
                    return Err(RuntimeError::IndexOutOfBounds {
                        what: "global",
                        index: idx as i64,
                    });
                }
                self.globals[idx as usize] = v;
                self.pc = r.pc() as i64;
            }
            Tag::GetLocal => {
                let slot = r.read_i32();
                let addr = self.local_slot(slot);
                let v = *self.stack.get(addr).ok_or(RuntimeError::IndexOutOfBounds {
                    what: "local slot",
                    index: slot as i64,
                })?;
                self.push(v)?;
                self.pc = r.pc() as i64;
            }
            Tag::SetLocal => {
                let slot = r.read_i32();
                let v = self.pop()?;
                let addr = self.local_slot(slot);
                if addr >= self.stack.len() {
                    return Err(RuntimeError::IndexOutOfBounds {
                        what: "local slot",
                        index: slot as i64,
                    });
                }
                self.stack[addr] = v;
                self.pc = r.pc() as i64;
            }
            Tag::Goto => {
                let target = r.read_i32();
                self.pc = target as i64;
            }
            Tag::GotoFalse => {
                let target = r.read_i32();
                let cond = as_bool(self.pop()?)?;
                self.pc = if cond { r.pc() as i64 } else { target as i64 };
            }
            Tag::Call => {
                let nargs = r.read_u8();
                let func_idx = r.read_u32();
                let entry =
                    *self
                        .program
                        .function_pcs
                        .get(func_idx as usize)
                        .ok_or(RuntimeError::IndexOutOfBounds {
                            what: "function",
                            index: func_idx as i64,
                        })?;
                if self.frames.len() >= self.max_frames {
                    return Err(RuntimeError::FrameStackOverflow);
                }
                self.frames.push(Frame {
                    return_pc: r.pc() as i64,
                    saved_fp: self.fp,
                    nargs,
                });
                self.fp = self.stack.len() as i32;
                self.pc = entry as i64;
            }
            Tag::Callf => {
                let nargs = r.read_u8() as usize;
                let idx = r.read_u32();
                if self.stack.len() < nargs {
                    return Err(RuntimeError::StackUnderflow);
                }
                let args = self.stack.split_off(self.stack.len() - nargs);
                let f = self
                    .natives
                    .get(idx)
                    .ok_or(RuntimeError::IndexOutOfBounds { what: "foreign function", index: idx as i64 })?;
                self.pc = r.pc() as i64;
                self.return_value = f(self, &args);
            }
            Tag::Return => {
                let frame = self.frames.pop().ok_or(RuntimeError::StackUnderflow)?;
                let base = self.fp as usize - frame.nargs as usize;
                self.stack.truncate(base);
                self.fp = frame.saved_fp;
                self.pc = frame.return_pc;
            }
            Tag::ReturnValue => {
                let v = self.pop()?;
                self.return_value = v;
                let frame = self.frames.pop().ok_or(RuntimeError::StackUnderflow)?;
                let base = self.fp as usize - frame.nargs as usize;
                self.stack.truncate(base);
                self.fp = frame.saved_fp;
                self.pc = frame.return_pc;
            }
            Tag::GetRetval => {
                let v = self.return_value;
                self.push(v)?;
                self.pc = r.pc() as i64;
            }
            Tag::File => {
                let idx = r.read_u32();
                self.current_file = Some(idx);
                self.pc = r.pc() as i64;
            }
            Tag::Line => {
                let line = r.read_u32();
                self.current_line = line;
                self.pc = r.pc() as i64;
            }
            Tag::Halt => {
                self.pc = -1;
                self.current_file = None;
                self.current_line = 0;
            }
            Tag::MisalignedPadding => unreachable!("handled above"),
        }
        Ok(())
    }

    fn values_equal(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y,
            (Value::ConstString(_) | Value::HeapString(_), Value::ConstString(_) | Value::HeapString(_)) => {
                self.string_bytes(a) == self.string_bytes(b)
            }
            (Value::LightNative(x), Value::LightNative(y)) => x == y,
            (Value::HeapNative(x), Value::HeapNative(y)) => x == y,
            (Value::Struct(x), Value::Struct(y)) => x == y,
            _ => false,
        }
    }
}

fn as_bool(v: Value) -> Result<bool, RuntimeError> {
    v.as_bool().ok_or(RuntimeError::TypeMismatch {
        expected: "bool",
        found: v.type_name(),
    })
}

enum NumPair {
    Int(i32, i32),
    Float(f32, f32),
}

fn numeric_pair(lhs: Value, rhs: Value) -> Result<NumPair, RuntimeError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(NumPair::Int(a, b)),
        (Value::Int(a), Value::Float(b)) => Ok(NumPair::Float(a as f32, b)),
        (Value::Float(a), Value::Int(b)) => Ok(NumPair::Float(a, b as f32)),
        (Value::Float(a), Value::Float(b)) => Ok(NumPair::Float(a, b)),
        (a, b) => {
            let found = if matches!(a, Value::Int(_) | Value::Float(_)) {
                b.type_name()
            } else {
                a.type_name()
            };
            Err(RuntimeError::TypeMismatch {
                expected: "int or float",
                found,
            })
        }
    }
}

fn arith(tag: Tag, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    match numeric_pair(lhs, rhs)? {
        NumPair::Int(a, b) => {
            let v = match tag {
                Tag::Add => a.wrapping_add(b),
                Tag::Sub => a.wrapping_sub(b),
                Tag::Mul => a.wrapping_mul(b),
                Tag::Div => {
                    if b == 0 {
                        return Err(RuntimeError::DivideByZero);
                    }
                    a.wrapping_div(b)
                }
                _ => unreachable!(),
            };
            Ok(Value::Int(v))
        }
        NumPair::Float(a, b) => {
            let v = match tag {
                Tag::Add => a + b,
                Tag::Sub => a - b,
                Tag::Mul => a * b,
                Tag::Div => a / b,
                _ => unreachable!(),
            };
            Ok(Value::Float(v))
        }
    }
}

fn int_binop(tag: Tag, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    let (a, b) = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => (a, b),
        (a, b) => {
            let found = if matches!(a, Value::Int(_)) { b.type_name() } else { a.type_name() };
            return Err(RuntimeError::TypeMismatch { expected: "int", found });
        }
    };
    let v = match tag {
        Tag::Mod => {
            if b == 0 {
                return Err(RuntimeError::DivideByZero);
            }
            a.wrapping_rem(b)
        }
        Tag::BitAnd => a & b,
        Tag::BitOr => a | b,
        _ => unreachable!(),
    };
    Ok(Value::Int(v))
}

fn compare(tag: Tag, lhs: Value, rhs: Value) -> Result<bool, RuntimeError> {
    let result = match numeric_pair(lhs, rhs)? {
        NumPair::Int(a, b) => match tag {
            Tag::Lt => a < b,
            Tag::Lte => a <= b,
            Tag::Gt => a > b,
            Tag::Gte => a >= b,
            _ => unreachable!(),
        },
        NumPair::Float(a, b) => match tag {
            Tag::Lt => a < b,
            Tag::Lte => a <= b,
            Tag::Gt => a > b,
            Tag::Gte => a >= b,
            _ => unreachable!(),
        },
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny_core::{Image, Tag as T};

    fn program_from(image: Image, function_pcs: Vec<u32>, global_count: u32) -> Rc<Program> {
        Rc::new(Program {
            image,
            function_pcs,
            global_count,
            strings: Vec::new(),
        })
    }

    #[test]
    fn add_returns_sum_of_two_pushed_ints() {
        let mut img = Image::new();
        img.emit_tag(T::PushInt);
        img.emit_i32(10);
        img.emit_tag(T::PushInt);
        img.emit_i32(20);
        img.emit_tag(T::Add);
        img.emit_tag(T::Halt);

        let program = program_from(img, Vec::new(), 0);
        let natives = Rc::new(NativeTable::new(0));
        let mut vm = Vm::new(program, natives, ThreadConfig::default());
        vm.start();
        while vm.execute_cycle().unwrap() {}
        assert_eq!(vm.stack.last().copied(), Some(Value::Int(30)));
    }

    #[test]
    fn call_and_return_value_round_trips_through_call_function() {
        // func(): int { return 7 }  — single function at entry pc 0.
        let mut img = Image::new();
        img.emit_tag(T::PushInt);
        img.emit_i32(7);
        img.emit_tag(T::ReturnValue);
        img.emit_tag(T::Halt);

        let program = program_from(img, vec![0], 0);
        let natives = Rc::new(NativeTable::new(0));
        let mut vm = Vm::new(program, natives, ThreadConfig::default());
        vm.start();
        let result = vm.call_function(0, &[]).unwrap();
        assert_eq!(result, Value::Int(7));
        assert!(vm.is_live(), "host re-entrancy must restore the caller's pc");
    }

    #[test]
    fn call_followed_by_get_retval_leaves_the_result_on_the_stack() {
        // Mirrors what codegen emits for `1 + add(10, 20)`: a CALL to a
        // function at pc 4 immediately followed by GET_RETVAL, then an ADD
        // against a value already on the stack. If GET_RETVAL didn't push
        // the callee's result back, ADD would consume the wrong operand.
        let mut img = Image::new();
        img.emit_tag(T::PushInt); // [0] the "1" operand of the surrounding add
        img.emit_i32(1);
        img.emit_tag(T::Goto); // jump over the callee body
        let skip_patch = img.emit_i32(0);

        let entry = img.pos();
        img.emit_tag(T::PushInt);
        img.emit_i32(30);
        img.emit_tag(T::ReturnValue);

        let after = img.pos();
        img.patch_i32(skip_patch, after as i32);

        img.emit_tag(T::Call);
        img.emit_u8(0);
        img.emit_u32(0);
        img.emit_tag(T::GetRetval);
        img.emit_tag(T::Add);
        img.emit_tag(T::Halt);

        let program = program_from(img, vec![entry as u32], 0);
        let natives = Rc::new(NativeTable::new(0));
        let mut vm = Vm::new(program, natives, ThreadConfig::default());
        vm.start();
        while vm.execute_cycle().unwrap() {}
        assert_eq!(vm.stack.last().copied(), Some(Value::Int(31)));
    }

    #[test]
    fn division_by_zero_faults_the_thread() {
        let mut img = Image::new();
        img.emit_tag(T::PushInt);
        img.emit_i32(1);
        img.emit_tag(T::PushZero);
        img.emit_tag(T::Div);
        img.emit_tag(T::Halt);

        let program = program_from(img, Vec::new(), 0);
        let natives = Rc::new(NativeTable::new(0));
        let mut vm = Vm::new(program, natives, ThreadConfig::default());
        vm.start();
        let err = vm.execute_cycle().unwrap_err();
        assert_eq!(err, RuntimeError::DivideByZero);
        assert!(!vm.is_live());
    }

    #[test]
    fn struct_construction_and_field_read_round_trip() {
        let mut img = Image::new();
        img.emit_tag(T::PushInt);
        img.emit_i32(3);
        img.emit_tag(T::PushInt);
        img.emit_i32(4);
        img.emit_tag(T::PushStruct);
        img.emit_u8(2);
        img.emit_tag(T::StructGet);
        img.emit_u8(1);
        img.emit_tag(T::Halt);

        let program = program_from(img, Vec::new(), 0);
        let natives = Rc::new(NativeTable::new(0));
        let mut vm = Vm::new(program, natives, ThreadConfig::default());
        vm.start();
        while vm.execute_cycle().unwrap() {}
        assert_eq!(vm.stack.last().copied(), Some(Value::Int(4)));
    }
}
