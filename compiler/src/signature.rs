//! Parser for the `bind_function` signature grammar (spec §6):
//!
//! ```text
//! sig       := name [ "(" params ")" [ ":" type ] ]
//! params    := /* empty */ | "..." | type ("," type)* [ "," "..." ]
//! type      := identifier
//! ```
//!
//! A bare name with no parameter list means fully untyped (`any...) : any`).
//! Whitespace around tokens is ignored.

use crate::types::{primitive_from_name, Type};

#[derive(Debug)]
pub struct ParsedSignature {
    pub name: String,
    pub arg_types: Vec<Type>,
    pub variadic: bool,
    pub return_ty: Type,
}

pub fn parse_signature(
    sig: &str,
    is_foreign_type: impl Fn(&str) -> bool,
) -> Result<ParsedSignature, String> {
    let sig = sig.trim();
    let Some(paren) = sig.find('(') else {
        let name = sig.trim().to_string();
        if name.is_empty() {
            return Err("empty function signature".to_string());
        }
        return Ok(ParsedSignature {
            name,
            arg_types: Vec::new(),
            variadic: true,
            return_ty: Type::Any,
        });
    };

    let name = sig[..paren].trim().to_string();
    if name.is_empty() {
        return Err("function signature is missing a name".to_string());
    }
    let close = sig.find(')').ok_or("unterminated parameter list")?;
    if close < paren {
        return Err("malformed parameter list".to_string());
    }
    let params_str = sig[paren + 1..close].trim();

    let mut arg_types = Vec::new();
    let mut variadic = false;
    if !params_str.is_empty() {
        for part in params_str.split(',') {
            let part = part.trim();
            if part == "..." {
                variadic = true;
                continue;
            }
            if variadic {
                return Err("'...' must be the last parameter".to_string());
            }
            arg_types.push(resolve_type(part, &is_foreign_type)?);
        }
    }

    let rest = sig[close + 1..].trim();
    let return_ty = if let Some(ty_str) = rest.strip_prefix(':') {
        resolve_type(ty_str.trim(), &is_foreign_type)?
    } else if rest.is_empty() {
        Type::Any
    } else {
        return Err(format!("unexpected trailing text '{rest}' in signature"));
    };

    Ok(ParsedSignature {
        name,
        arg_types,
        variadic,
        return_ty,
    })
}

fn resolve_type(name: &str, is_foreign_type: &impl Fn(&str) -> bool) -> Result<Type, String> {
    if let Some(t) = primitive_from_name(name) {
        return Ok(t);
    }
    if is_foreign_type(name) {
        return Ok(Type::Foreign(name.to_string()));
    }
    Err(format!("unknown type '{name}' in signature"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_is_fully_untyped() {
        let sig = parse_signature("puts", |_| false).unwrap();
        assert_eq!(sig.name, "puts");
        assert!(sig.arg_types.is_empty());
        assert!(sig.variadic);
        assert_eq!(sig.return_ty, Type::Any);
    }

    #[test]
    fn typed_signature_with_return_type() {
        let sig = parse_signature("add(int, int): int", |_| false).unwrap();
        assert_eq!(sig.arg_types, vec![Type::Int, Type::Int]);
        assert!(!sig.variadic);
        assert_eq!(sig.return_ty, Type::Int);
    }

    #[test]
    fn trailing_ellipsis_marks_variadic() {
        let sig = parse_signature("printf(str, ...): void", |_| false).unwrap();
        assert_eq!(sig.arg_types, vec![Type::Str]);
        assert!(sig.variadic);
    }

    #[test]
    fn foreign_type_name_is_accepted_when_registered() {
        let sig = parse_signature("wrap(Widget): void", |n| n == "Widget").unwrap();
        assert_eq!(sig.arg_types, vec![Type::Foreign("Widget".to_string())]);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = parse_signature("f(Bogus): void", |_| false).unwrap_err();
        assert!(err.contains("unknown type"));
    }
}
