//! The Tiny compiler: lexer, parser, type resolver and code generator
//! (spec §2, §4), plus the host-facing half of the binding interface
//! (spec §4.9) that a runtime crate wires up to actual function pointers.

pub mod ast;
pub mod codegen;
pub mod config;
pub mod diagnostic;
pub mod disasm;
pub mod lexer;
pub mod parser;
pub mod pool;
pub mod pos;
pub mod resolver;
pub mod signature;
pub mod symtab;
pub mod types;

pub use config::CompilerConfig;
pub use symtab::SymbolId;
pub use types::Type;

use codegen::{CodeGen, CodeGenError};
use lexer::LexError;
use parser::{ParseError, Parser};
use pool::{FloatPool, StringPool};
use resolver::{ResolveError, Resolver};
use signature::ParsedSignature;
use std::path::Path;
use std::rc::Rc;
use symtab::SymbolTable;
use tiny_core::Image;
use tiny_runtime::host::Program;

/// Errors from any compiler phase, carrying enough to render a diagnostic
/// via [`diagnostic::render`] (spec §7: "errors ... carry a source position
/// and a message").
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    Io(String),
    Lex(LexError),
    Parse(ParseError),
    Resolve(ResolveError),
    CodeGen(CodeGenError),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Io(msg) => write!(f, "{msg}"),
            CompileError::Lex(e) => write!(f, "{e}"),
            CompileError::Parse(e) => write!(f, "{e}"),
            CompileError::Resolve(e) => write!(f, "{e}"),
            CompileError::CodeGen(e) => write!(f, "{e}"),
        }
    }
}
impl std::error::Error for CompileError {}

impl From<LexError> for CompileError {
    fn from(e: LexError) -> Self {
        CompileError::Lex(e)
    }
}
impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        CompileError::Parse(e)
    }
}
impl From<ResolveError> for CompileError {
    fn from(e: ResolveError) -> Self {
        CompileError::Resolve(e)
    }
}
impl From<CodeGenError> for CompileError {
    fn from(e: CodeGenError) -> Self {
        CompileError::CodeGen(e)
    }
}

impl CompileError {
    /// Position this error is anchored to, for [`diagnostic::render`].
    pub fn pos(&self) -> Option<&pos::Pos> {
        match self {
            CompileError::Io(_) => None,
            CompileError::Lex(e) => Some(&e.pos),
            CompileError::Parse(e) => Some(&e.pos),
            CompileError::Resolve(e) => Some(&e.pos),
            CompileError::CodeGen(e) => Some(&e.pos),
        }
    }
}

/// A compiled program (spec §3 "State"): bytecode image, intern pools,
/// symbol table, function-PC table (held inside the symbol table's function
/// symbols) and foreign-function table. Immutable once compilation
/// finishes, but more source may be appended via [`State::compile_string`].
pub struct State {
    pub image: Image,
    pub symtab: SymbolTable,
    pub strings: StringPool,
    pub floats: FloatPool,
    pub config: CompilerConfig,
    last_source: String,
    last_file: Rc<str>,
}

impl State {
    pub fn new(config: CompilerConfig) -> Self {
        let last_file = Rc::from(config.default_file_name.as_str());
        State {
            image: Image::new(),
            symtab: SymbolTable::new(),
            strings: StringPool::with_capacity(config.intern_pool_capacity),
            floats: FloatPool::with_capacity(config.intern_pool_capacity),
            config,
            last_source: String::new(),
            last_file,
        }
    }

    /// Declare an opaque foreign type tag (spec §4.9 `register_type`).
    pub fn register_type(&mut self, name: &str) {
        self.symtab.register_foreign_type(name);
    }

    /// Parse a `bind_function` signature and declare the foreign-function
    /// symbol. Returns the assigned foreign-function index so the host can
    /// install the matching callback at that index in its own dispatch
    /// table (spec §4.9 `bind_function`).
    pub fn bind_function(&mut self, signature: &str) -> Result<u32, String> {
        let ParsedSignature {
            name,
            arg_types,
            variadic,
            return_ty,
        } = signature::parse_signature(signature, |n| self.symtab.is_foreign_type(n))?;
        let id = self
            .symtab
            .declare_foreign_function(&name, arg_types, variadic, return_ty)?;
        match self.symtab.get(id) {
            symtab::Symbol::ForeignFunction(f) => Ok(f.index),
            _ => unreachable!(),
        }
    }

    pub fn bind_const_bool(&mut self, name: &str, value: bool) -> Result<(), String> {
        self.symtab
            .declare_constant(name, Type::Bool, symtab::ConstValue::Bool(value))
            .map(|_| ())
    }

    pub fn bind_const_int(&mut self, name: &str, value: i32) -> Result<(), String> {
        self.symtab
            .declare_constant(name, Type::Int, symtab::ConstValue::Int(value))
            .map(|_| ())
    }

    pub fn bind_const_float(&mut self, name: &str, value: f32) -> Result<(), String> {
        self.symtab
            .declare_constant(name, Type::Float, symtab::ConstValue::Float(value))
            .map(|_| ())
    }

    pub fn bind_const_string(&mut self, name: &str, value: &str) -> Result<(), String> {
        self.symtab
            .declare_constant(name, Type::Str, symtab::ConstValue::Str(value.to_string()))
            .map(|_| ())
    }

    /// Run the full pipeline over `text`, appending to any already-compiled
    /// bytecode (spec §4.9 `compile_string`).
    pub fn compile_string(&mut self, file_name: &str, text: &str) -> Result<(), CompileError> {
        self.last_source = text.to_string();
        self.last_file = Rc::from(file_name);

        let mut program = {
            let mut parser = Parser::new(
                self.last_file.clone(),
                &self.last_source,
                &mut self.symtab,
                &mut self.strings,
                &mut self.floats,
            )?;
            parser.parse_program()?
        };

        Resolver::new(&mut self.symtab, &self.floats).resolve_program(&mut program)?;

        let mut codegen = CodeGen::new(
            &mut self.image,
            &mut self.symtab,
            &mut self.strings,
            &self.floats,
            self.last_file.clone(),
        );
        codegen.set_emit_debug_info(self.config.emit_debug_info);
        codegen.compile_program(&program)?;

        Ok(())
    }

    pub fn compile_file(&mut self, path: impl AsRef<Path>) -> Result<(), CompileError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CompileError::Io(format!("{}: {e}", path.display())))?;
        let file_name = path.to_string_lossy().into_owned();
        self.compile_string(&file_name, &text)
    }

    /// Render a diagnostic for `err` against the most recently compiled
    /// source text (spec §7: "includes the offending line's text and a
    /// caret").
    pub fn render_error(&self, err: &CompileError) -> String {
        match err.pos() {
            Some(pos) => diagnostic::render(&self.last_source, pos, &err.to_string()),
            None => err.to_string(),
        }
    }

    pub fn get_global_index(&self, name: &str) -> Option<u32> {
        match self.symtab.reference_variable(name)? {
            id => match self.symtab.get(id) {
                symtab::Symbol::Global(g) => Some(g.index),
                _ => None,
            },
        }
    }

    pub fn get_function_index(&self, name: &str) -> Option<u32> {
        let id = self.symtab.reference_function(name)?;
        match self.symtab.get(id) {
            symtab::Symbol::Function(f) => Some(f.index),
            _ => None,
        }
    }

    /// Number of foreign-function slots a host's `NativeTable` must be sized
    /// to before running any thread compiled against this state.
    pub fn foreign_function_count(&self) -> u32 {
        self.symtab.foreign_function_count()
    }

    /// Hand the compiled bytecode to a `tiny-runtime` state-thread (spec
    /// §4.9: the boundary between `State` and a running thread). Clones the
    /// image and string pool, since `State` may go on to compile more
    /// source afterward.
    pub fn export_program(&self) -> Program {
        let strings = (0..self.strings.len() as u32)
            .map(|i| self.strings.get(i).to_string())
            .collect();
        Program {
            image: self.image.clone(),
            function_pcs: self.symtab.function_entry_pcs(),
            global_count: self.symtab.global_count(),
            strings,
        }
    }
}
