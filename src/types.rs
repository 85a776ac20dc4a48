//! Structural types and the signature matcher used to guard core functions.
//!
//! Every value has a derived [`Type`]. Atomic values map to a single tag; a quote's
//! type records the element type of its pattern and of its body, computed by folding
//! the element types with [`consistent_type`]. Equal element types stay as they are,
//! differing ones widen to `Any`, and nested quote types widen position by position
//! so a list of quotes is still known to be a list of quotes.
//!
//! Matching is asymmetric: the signature side may use the wildcards `Any` and
//! `NotEmpty`, the actual side is always a derived type.

use std::fmt;

use crate::ast::{Quote, Value, quote, sym};

/// A structural type tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Num,
    Atom,
    Sym,
    Str,
    /// Element type of an empty sequence
    Empty,
    /// Wildcard in signatures; also the widened element type of mixed sequences
    Any,
    /// Signature-only wildcard matching anything except `Empty`
    NotEmpty,
    /// Quote with the given pattern element type and body element type
    Quote(Box<Type>, Box<Type>),
}

impl Type {
    pub fn quote(pattern: Type, body: Type) -> Self {
        Type::Quote(Box::new(pattern), Box::new(body))
    }

    /// `Quote(Any, Any)`: any quote at all
    pub fn any_quote() -> Self {
        Type::quote(Type::Any, Type::Any)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Num => write!(f, "Num"),
            Type::Atom => write!(f, "Atom"),
            Type::Sym => write!(f, "Sym"),
            Type::Str => write!(f, "Str"),
            Type::Empty => write!(f, "Empty"),
            Type::Any => write!(f, "Any"),
            Type::NotEmpty => write!(f, "NotEmpty"),
            Type::Quote(p, b) => write!(f, "Quote({p}, {b})"),
        }
    }
}

/// Render a type list for diagnostics, e.g. `[Num, Quote(Any, Any)]`
pub(crate) fn display_types(types: &[Type]) -> String {
    let inner = types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{inner}]")
}

/// Combine two element types into the narrowest type describing both
pub fn consistent_type(x: Type, y: Type) -> Type {
    match (x, y) {
        (Type::Quote(p1, b1), Type::Quote(p2, b2)) => {
            Type::quote(consistent_type(*p1, *p2), consistent_type(*b1, *b2))
        }
        (x, y) if x == y => x,
        _ => Type::Any,
    }
}

fn element_type(items: &[Value]) -> Type {
    items
        .iter()
        .map(Value::qtype)
        .reduce(consistent_type)
        .unwrap_or(Type::Empty)
}

impl Quote {
    pub fn qtype(&self) -> Type {
        Type::quote(element_type(&self.pattern), element_type(&self.body))
    }
}

impl Value {
    /// Derive the structural type of this value
    pub fn qtype(&self) -> Type {
        match self {
            Value::Num(_) => Type::Num,
            Value::Atom(_) => Type::Atom,
            Value::Sym(_) => Type::Sym,
            Value::Str(_) => Type::Str,
            Value::Quote(q) => q.qtype(),
        }
    }
}

/// Check whether an actual type satisfies a signature type
pub fn type_matches(signature: &Type, actual: &Type) -> bool {
    match (signature, actual) {
        (Type::Any, _) => true,
        (Type::NotEmpty, actual) => *actual != Type::Empty,
        (Type::Quote(p1, b1), Type::Quote(p2, b2)) => type_matches(p1, p2) && type_matches(b1, b2),
        (signature, actual) => signature == actual,
    }
}

/// The expected and actual types of a failed signature check
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMismatch {
    pub expected: Vec<Type>,
    pub actual: Vec<Type>,
}

/// Match a signature against the top of a stack.
///
/// The first signature entry describes the deepest of the consumed items, the last
/// entry describes the current top of the stack.
pub fn type_check(stack: &[Value], signature: &[Type]) -> Result<(), TypeMismatch> {
    if signature.is_empty() {
        return Ok(());
    }

    let start = stack.len().saturating_sub(signature.len());
    let actual: Vec<Type> = stack[start..].iter().map(Value::qtype).collect();

    let matches = actual.len() == signature.len()
        && signature
            .iter()
            .zip(actual.iter())
            .all(|(sig, ty)| type_matches(sig, ty));

    if matches {
        Ok(())
    } else {
        Err(TypeMismatch {
            expected: signature.to_vec(),
            actual,
        })
    }
}

/// Reify a type as a Quark value: tags become symbols, quote types become
/// `[ :Quote P B ]`
pub fn type_to_value(ty: &Type) -> Value {
    match ty {
        Type::Quote(p, b) => quote([sym("Quote"), type_to_value(p), type_to_value(b)]),
        atomic => sym(atomic.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{atom, quote_with, val};

    fn q(p: Type, b: Type) -> Type {
        Type::quote(p, b)
    }

    #[test]
    fn test_derived_types() {
        use Type::*;

        let test_cases = vec![
            (val(1), Num),
            (atom("x"), Atom),
            (sym("ok"), Sym),
            (val("s"), Str),
            (quote([]), q(Empty, Empty)),
            (quote([val(1), val(2)]), q(Empty, Num)),
            (quote([val(1), val("a")]), q(Empty, Any)),
            (quote_with([atom("x")], [atom("x"), atom("x")]), q(Atom, Atom)),
            (quote_with([val(0), atom("n")], []), q(Any, Empty)),
            // Nested quotes widen positionally rather than collapsing to Any
            (
                quote([quote_with([val(0)], [val("zero")]), quote_with([atom("n")], [val(1)])]),
                q(Empty, q(Any, Any)),
            ),
            (
                quote([quote([val(1)]), quote([val(2)])]),
                q(Empty, q(Empty, Num)),
            ),
            (quote([quote([]), val(1)]), q(Empty, Any)),
        ];

        for (i, (value, expected)) in test_cases.iter().enumerate() {
            assert_eq!(value.qtype(), *expected, "Test case {} failed for {value}", i + 1);
        }
    }

    #[test]
    fn test_type_matches_is_asymmetric() {
        use Type::*;

        let all = vec![Num, Atom, Sym, Str, Empty, Any, NotEmpty, q(Num, Empty)];
        for t in &all {
            assert!(type_matches(&Any, t), "Any should match {t}");
        }

        assert!(!type_matches(&Empty, &Any));
        assert!(!type_matches(&Num, &Any));
        assert!(type_matches(&NotEmpty, &Num));
        assert!(!type_matches(&NotEmpty, &Empty));
        assert!(type_matches(&q(Any, NotEmpty), &q(Empty, Num)));
        assert!(!type_matches(&q(Any, NotEmpty), &q(Num, Empty)));
        assert!(type_matches(&q(Empty, q(Any, Any)), &q(Empty, q(Num, Str))));
        assert!(!type_matches(&q(Empty, q(Any, Any)), &q(Empty, Num)));
        assert!(!type_matches(&q(Any, Any), &Num));
        assert!(!type_matches(&Num, &Str));
    }

    #[test]
    fn test_type_check_against_stack() {
        use Type::*;

        let stack = vec![val("a"), val(1), val(2)];

        assert_eq!(type_check(&stack, &[]), Ok(()));
        assert_eq!(type_check(&[], &[]), Ok(()));
        assert_eq!(type_check(&stack, &[Num, Num]), Ok(()));
        assert_eq!(type_check(&stack, &[Str, Num, Num]), Ok(()));
        assert_eq!(type_check(&stack, &[Any, Num]), Ok(()));

        assert_eq!(
            type_check(&stack, &[Str, Num]),
            Err(TypeMismatch {
                expected: vec![Str, Num],
                actual: vec![Num, Num],
            })
        );

        // Too few items is a mismatch, reporting what is there
        assert_eq!(
            type_check(&[val(1)], &[Num, Num]),
            Err(TypeMismatch {
                expected: vec![Num, Num],
                actual: vec![Num],
            })
        );
        assert!(type_check(&[], &[Any]).is_err());
    }

    #[test]
    fn test_type_to_value() {
        assert_eq!(type_to_value(&Type::Num), sym("Num"));
        assert_eq!(
            type_to_value(&q(Type::Empty, q(Type::Atom, Type::Any))),
            quote([
                sym("Quote"),
                sym("Empty"),
                quote([sym("Quote"), sym("Atom"), sym("Any")]),
            ])
        );
    }

    #[test]
    fn test_display_types() {
        assert_eq!(
            display_types(&[Type::Num, Type::any_quote()]),
            "[Num, Quote(Any, Any)]"
        );
        assert_eq!(display_types(&[]), "[]");
    }
}
