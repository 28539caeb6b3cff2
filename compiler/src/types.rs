//! The Tiny type system (spec §3 "Type", §4.5).
//!
//! Types are structural for primitives and nominal (compared by interned
//! tag) for structs and foreign types. `Any` is the top type: everything
//! converts *to* `Any`, but converting *from* `Any` requires an explicit
//! `cast`.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Bool,
    Int,
    Float,
    Str,
    Any,
    /// A struct tag, compared nominally by name.
    Struct(String),
    /// An opaque type registered by the host, compared nominally by name.
    Foreign(String),
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Str => write!(f, "str"),
            Type::Any => write!(f, "any"),
            Type::Struct(name) => write!(f, "{name}"),
            Type::Foreign(name) => write!(f, "{name}"),
        }
    }
}

impl Type {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    /// Can a value of `self` be used where `target` is expected, without an
    /// explicit cast? (spec §4.5 assignment/argument compatibility)
    ///
    /// Every type converts to `Any`. Otherwise types must match exactly;
    /// converting *from* `Any` to anything else requires `cast`, which is
    /// handled separately in the resolver (`cast` is the only way to go the
    /// other direction).
    pub fn assignable_to(&self, target: &Type) -> bool {
        if target == &Type::Any {
            return true;
        }
        self == target
    }

    /// Result type of `+ - * /` given both operand types, or `None` if the
    /// combination is illegal.
    pub fn arith_result(a: &Type, b: &Type) -> Option<Type> {
        match (a, b) {
            (Type::Int, Type::Int) => Some(Type::Int),
            (Type::Int, Type::Float) | (Type::Float, Type::Int) | (Type::Float, Type::Float) => {
                Some(Type::Float)
            }
            _ => None,
        }
    }
}

/// Built-in primitive type names as spelled in source.
pub fn primitive_from_name(name: &str) -> Option<Type> {
    Some(match name {
        "void" => Type::Void,
        "bool" => Type::Bool,
        "int" => Type::Int,
        "float" => Type::Float,
        "str" => Type::Str,
        "any" => Type::Any,
        _ => return None,
    })
}
