//! Symbol table: nested scopes, globals, locals, functions, foreign
//! functions, struct tags and fields (spec §3 "Symbol", §4.2).
//!
//! Symbols are stored in a flat arena and referenced by [`SymbolId`] so the
//! AST and the resolver can hold cheap, stable handles instead of copying
//! symbol data around. Closing a scope never removes its locals — it only
//! flips their `scope_ended` flag — because codegen still needs to resolve
//! slot indices from AST nodes that were parsed while the scope was open.

use crate::types::Type;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Str(String),
}

impl ConstValue {
    pub fn ty(&self) -> Type {
        match self {
            ConstValue::Bool(_) => Type::Bool,
            ConstValue::Int(_) => Type::Int,
            ConstValue::Float(_) => Type::Float,
            ConstValue::Str(_) => Type::Str,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GlobalSym {
    pub ty: Type,
    pub index: u32,
    pub initialized: bool,
}

#[derive(Debug, Clone)]
pub struct LocalSym {
    pub ty: Type,
    /// Slot relative to the frame pointer: negative for arguments, `>= 0`
    /// for locals declared in the function body.
    pub slot: i32,
    pub depth: usize,
    pub scope_ended: bool,
}

#[derive(Debug, Clone)]
pub struct FunctionSym {
    pub name: String,
    pub index: u32,
    pub args: Vec<SymbolId>,
    pub locals: Vec<SymbolId>,
    pub return_ty: Type,
    /// Filled in by codegen once the function's entry point is known.
    pub entry_pc: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ForeignFunctionSym {
    pub name: String,
    pub index: u32,
    pub arg_types: Vec<Type>,
    pub variadic: bool,
    pub return_ty: Type,
}

#[derive(Debug, Clone)]
pub struct FieldSym {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct StructTagSym {
    pub name: String,
    pub defined: bool,
    pub fields: Vec<FieldSym>,
}

#[derive(Debug, Clone)]
pub enum Symbol {
    Global(GlobalSym),
    Local(LocalSym),
    Constant { ty: Type, value: ConstValue },
    Function(FunctionSym),
    ForeignFunction(ForeignFunctionSym),
    StructTag(StructTagSym),
}

impl Symbol {
    pub fn ty(&self) -> Type {
        match self {
            Symbol::Global(g) => g.ty.clone(),
            Symbol::Local(l) => l.ty.clone(),
            Symbol::Constant { ty, .. } => ty.clone(),
            Symbol::Function(f) => f.return_ty.clone(),
            Symbol::ForeignFunction(f) => f.return_ty.clone(),
            Symbol::StructTag(s) => Type::Struct(s.name.clone()),
        }
    }
}

pub struct SymbolTable {
    arena: Vec<Symbol>,
    /// One HashMap per open local scope, innermost last.
    scopes: Vec<HashMap<String, SymbolId>>,
    globals: HashMap<String, SymbolId>,
    functions: HashMap<String, SymbolId>,
    foreign_functions: HashMap<String, SymbolId>,
    structs: HashMap<String, SymbolId>,
    foreign_types: std::collections::HashSet<String>,
    next_global_index: u32,
    next_function_index: u32,
    next_foreign_index: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            arena: Vec::new(),
            scopes: Vec::new(),
            globals: HashMap::new(),
            functions: HashMap::new(),
            foreign_functions: HashMap::new(),
            structs: HashMap::new(),
            foreign_types: std::collections::HashSet::new(),
            next_global_index: 0,
            next_function_index: 0,
            next_foreign_index: 0,
        }
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.arena[id.0]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.arena[id.0]
    }

    fn push(&mut self, sym: Symbol) -> SymbolId {
        self.arena.push(sym);
        SymbolId(self.arena.len() - 1)
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn open_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Close the innermost scope, marking every local declared in it as
    /// scope-ended rather than deleting it.
    pub fn close_scope(&mut self) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };
        for id in scope.values() {
            if let Symbol::Local(l) = self.get_mut(*id) {
                l.scope_ended = true;
            }
        }
    }

    pub fn register_foreign_type(&mut self, name: &str) {
        self.foreign_types.insert(name.to_string());
    }

    pub fn is_foreign_type(&self, name: &str) -> bool {
        self.foreign_types.contains(name)
    }

    pub fn declare_global(&mut self, name: &str, ty: Type) -> Result<SymbolId, String> {
        if self.globals.contains_key(name) {
            return Err(format!("global '{name}' is already declared"));
        }
        let index = self.next_global_index;
        self.next_global_index += 1;
        let id = self.push(Symbol::Global(GlobalSym {
            ty,
            index,
            initialized: false,
        }));
        self.globals.insert(name.to_string(), id);
        Ok(id)
    }

    /// True if a *still-live* local named `name` exists in the innermost
    /// open scope (spec: declaring over a live local in the same scope is
    /// an error; a scope-ended local with the same name is not a conflict).
    fn live_local_in_top_scope(&self, name: &str) -> Option<SymbolId> {
        let scope = self.scopes.last()?;
        let id = *scope.get(name)?;
        match self.get(id) {
            Symbol::Local(l) if !l.scope_ended => Some(id),
            _ => None,
        }
    }

    pub fn declare_local(&mut self, name: &str, ty: Type, slot: i32) -> Result<SymbolId, String> {
        if let Some(existing) = self.live_local_in_top_scope(name) {
            let _ = existing;
            return Err(format!(
                "local '{name}' is already declared in this scope"
            ));
        }
        let depth = self.scopes.len();
        let id = self.push(Symbol::Local(LocalSym {
            ty,
            slot,
            depth,
            scope_ended: false,
        }));
        self.scopes
            .last_mut()
            .expect("declare_local called outside any scope")
            .insert(name.to_string(), id);
        Ok(id)
    }

    /// Declare argument `index_in_list` of `total_args`; its slot is
    /// `index_in_list - total_args`, placing the first argument at
    /// `frame_pointer - total_args` (spec §4.2).
    pub fn declare_argument(
        &mut self,
        name: &str,
        ty: Type,
        index_in_list: usize,
        total_args: usize,
    ) -> Result<SymbolId, String> {
        if self.live_local_in_top_scope(name).is_some() {
            return Err(format!("argument '{name}' is already declared"));
        }
        let slot = index_in_list as i32 - total_args as i32;
        let depth = self.scopes.len();
        let id = self.push(Symbol::Local(LocalSym {
            ty,
            slot,
            depth,
            scope_ended: false,
        }));
        self.scopes
            .last_mut()
            .expect("declare_argument called outside any scope")
            .insert(name.to_string(), id);
        Ok(id)
    }

    /// Constants are hoisted to global scope regardless of where they were
    /// declared (spec §4.2); the caller is responsible for warning when
    /// `inside_function` is true.
    pub fn declare_constant(
        &mut self,
        name: &str,
        ty: Type,
        value: ConstValue,
    ) -> Result<SymbolId, String> {
        if self.globals.contains_key(name) {
            return Err(format!("'{name}' is already declared"));
        }
        let id = self.push(Symbol::Constant { ty, value });
        self.globals.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn declare_function(&mut self, name: &str) -> Result<SymbolId, String> {
        if self.functions.contains_key(name) {
            return Err(format!("function '{name}' is already declared"));
        }
        let index = self.next_function_index;
        self.next_function_index += 1;
        let id = self.push(Symbol::Function(FunctionSym {
            name: name.to_string(),
            index,
            args: Vec::new(),
            locals: Vec::new(),
            return_ty: Type::Void,
            entry_pc: None,
        }));
        self.functions.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn declare_foreign_function(
        &mut self,
        name: &str,
        arg_types: Vec<Type>,
        variadic: bool,
        return_ty: Type,
    ) -> Result<SymbolId, String> {
        if self.foreign_functions.contains_key(name) || self.functions.contains_key(name) {
            return Err(format!("function '{name}' is already declared"));
        }
        let index = self.next_foreign_index;
        self.next_foreign_index += 1;
        let id = self.push(Symbol::ForeignFunction(ForeignFunctionSym {
            name: name.to_string(),
            index,
            arg_types,
            variadic,
            return_ty,
        }));
        self.foreign_functions.insert(name.to_string(), id);
        Ok(id)
    }

    /// Declare (or re-reference) a struct tag by name, allowing forward
    /// references: calling this twice with the same name returns the same
    /// symbol id both times.
    pub fn declare_struct(&mut self, name: &str) -> SymbolId {
        if let Some(id) = self.structs.get(name) {
            return *id;
        }
        let id = self.push(Symbol::StructTag(StructTagSym {
            name: name.to_string(),
            defined: false,
            fields: Vec::new(),
        }));
        self.structs.insert(name.to_string(), id);
        id
    }

    pub fn define_struct(&mut self, id: SymbolId, fields: Vec<FieldSym>) {
        if let Symbol::StructTag(s) = self.get_mut(id) {
            s.defined = true;
            s.fields = fields;
        }
    }

    /// Every struct referenced via `declare_struct` must be `defined` by
    /// end of compilation (spec §3, §8).
    pub fn undefined_structs(&self) -> Vec<String> {
        self.arena
            .iter()
            .filter_map(|s| match s {
                Symbol::StructTag(s) if !s.defined => Some(s.name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Resolve a variable reference from the innermost live scope outward,
    /// then globals/constants.
    pub fn reference_variable(&self, name: &str) -> Option<SymbolId> {
        for scope in self.scopes.iter().rev() {
            if let Some(id) = scope.get(name) {
                if let Symbol::Local(l) = self.get(*id) {
                    if !l.scope_ended {
                        return Some(*id);
                    }
                } else {
                    return Some(*id);
                }
            }
        }
        self.globals.get(name).copied()
    }

    pub fn reference_function(&self, name: &str) -> Option<SymbolId> {
        self.functions
            .get(name)
            .or_else(|| self.foreign_functions.get(name))
            .copied()
    }

    pub fn reference_struct(&self, name: &str) -> Option<SymbolId> {
        self.structs.get(name).copied()
    }

    pub fn global_count(&self) -> u32 {
        self.next_global_index
    }

    /// Names of every global never assigned a value — spec §3: "each global
    /// variable must be assigned at least once along every path before any
    /// read; the compiler detects trivially-unassigned globals."
    pub fn unassigned_globals(&self) -> Vec<String> {
        self.globals
            .iter()
            .filter_map(|(name, id)| match self.get(*id) {
                Symbol::Global(g) if !g.initialized => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn function_count(&self) -> u32 {
        self.next_function_index
    }

    pub fn foreign_function_count(&self) -> u32 {
        self.next_foreign_index
    }

    /// Entry PC of every script function, indexed by function index — the
    /// table `CALL`'s `func_idx` operand addresses at runtime (spec §4.8).
    /// Panics if called before every declared function has been code
    /// generated (every `entry_pc` is `Some`).
    pub fn function_entry_pcs(&self) -> Vec<u32> {
        let mut pcs = vec![0u32; self.next_function_index as usize];
        for sym in &self.arena {
            if let Symbol::Function(f) = sym {
                pcs[f.index as usize] = f
                    .entry_pc
                    .expect("function_entry_pcs called before codegen finished");
            }
        }
        pcs
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redeclaring_a_live_local_fails() {
        let mut st = SymbolTable::new();
        st.open_scope();
        st.declare_local("x", Type::Int, 0).unwrap();
        let err = st.declare_local("x", Type::Int, 1).unwrap_err();
        assert!(err.contains("already declared"));
    }

    #[test]
    fn parallel_scopes_may_reuse_names() {
        let mut st = SymbolTable::new();
        st.open_scope();
        st.declare_local("x", Type::Int, 0).unwrap();
        st.close_scope();
        st.open_scope();
        // Should succeed: the prior `x` has scope_ended = true.
        st.declare_local("x", Type::Bool, 0).unwrap();
    }

    #[test]
    fn argument_slots_are_negative_offsets_from_fp() {
        let mut st = SymbolTable::new();
        st.open_scope();
        let a0 = st.declare_argument("a", Type::Int, 0, 2).unwrap();
        let a1 = st.declare_argument("b", Type::Int, 1, 2).unwrap();
        match st.get(a0) {
            Symbol::Local(l) => assert_eq!(l.slot, -2),
            _ => panic!(),
        }
        match st.get(a1) {
            Symbol::Local(l) => assert_eq!(l.slot, -1),
            _ => panic!(),
        }
    }

    #[test]
    fn forward_referenced_struct_must_be_defined() {
        let mut st = SymbolTable::new();
        st.declare_struct("Point");
        assert_eq!(st.undefined_structs(), vec!["Point".to_string()]);
        let id = st.declare_struct("Point");
        st.define_struct(
            id,
            vec![FieldSym {
                name: "x".into(),
                ty: Type::Int,
            }],
        );
        assert!(st.undefined_structs().is_empty());
    }
}
