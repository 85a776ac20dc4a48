//! This module defines the value model shared by the parser, the type system and the
//! evaluator. The main enum, [`Value`], covers every Quark datum: numbers, atoms
//! (unevaluated names), symbols, strings and quotes. A [`Quote`] is a code/data block
//! with a formal-argument pattern and a body; both halves are growable buffers so
//! quotes double as mutable containers. Ergonomic helpers such as [`val`], [`atom`],
//! [`sym`] and [`quote`] are provided for building values in code and tests, and the
//! `Display` implementation produces text the parser accepts again.

/// Characters that can never appear in an atom or symbol name (besides digits and whitespace)
pub(crate) const NAME_EXCLUDED_CHARS: &str = "[]|:'\"";

/// Whitespace recognised as a token separator
pub(crate) fn is_separator(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// Check if a character may appear in an atom or symbol name
pub(crate) fn is_name_char(c: char) -> bool {
    !c.is_ascii_digit() && !is_separator(c) && !NAME_EXCLUDED_CHARS.contains(c)
}

/// Symbol payloads with a fixed meaning for core functions
pub const SYM_TRUE: &str = "true";
pub const SYM_NIL: &str = "nil";
pub const SYM_OK: &str = "ok";
pub const SYM_NOT_OK: &str = "not-ok";

/// A first-class code/data block.
///
/// `pattern` is the formal-argument list consumed when the quote is invoked, `body`
/// is the sequence executed (or inspected as data). Pushing and popping happen at
/// the end of either sequence.
#[derive(Clone, PartialEq, Default)]
pub struct Quote {
    pub pattern: Vec<Value>,
    pub body: Vec<Value>,
}

impl Quote {
    pub fn new(pattern: Vec<Value>, body: Vec<Value>) -> Self {
        Quote { pattern, body }
    }

    /// A quote with an empty pattern
    pub fn from_body(body: Vec<Value>) -> Self {
        Quote {
            pattern: Vec::new(),
            body,
        }
    }

    pub fn push(&mut self, value: Value) {
        self.body.push(value);
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.body.pop()
    }

    pub fn push_pattern(&mut self, value: Value) {
        self.pattern.push(value);
    }

    pub fn pop_pattern(&mut self) -> Option<Value> {
        self.pattern.pop()
    }
}

/// Core value type of the interpreter
///
/// To build values, use the helper functions:
/// - `val(42)` for numbers, `val("text")` for strings
/// - `atom("dup")` for names, `sym("ok")` for symbols
/// - `quote([...])` / `quote_with([...], [...])` for quotes
#[derive(Clone, PartialEq)]
pub enum Value {
    /// Numbers (double precision)
    Num(f64),
    /// Unevaluated names: pattern variables or function references
    Atom(String),
    /// Opaque literal tags, rendered with a leading `:`
    Sym(String),
    /// Text literals
    Str(String),
    /// Code/data blocks
    Quote(Quote),
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Num(n) => write!(f, "Num({n})"),
            Value::Atom(a) => write!(f, "Atom({a})"),
            Value::Sym(s) => write!(f, "Sym({s})"),
            Value::Str(s) => write!(f, "Str(\"{s}\")"),
            Value::Quote(q) => write!(f, "{q:?}"),
        }
    }
}

impl std::fmt::Debug for Quote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Quote(pattern=[")?;
        for (i, v) in self.pattern.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v:?}")?;
        }
        write!(f, "], body=[")?;
        for (i, v) in self.body.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v:?}")?;
        }
        write!(f, "])")
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

impl From<Quote> for Value {
    fn from(q: Quote) -> Self {
        Value::Quote(q)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Num(f64::from(n))
            }
        }
    };
}

// Integer types that convert to f64 without loss
impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl Value {
    /// The boolean encoding used by comparison functions: `:true` or `:nil`
    pub fn truth(b: bool) -> Self {
        Value::Sym(if b { SYM_TRUE } else { SYM_NIL }.to_owned())
    }

    pub fn nil() -> Self {
        Value::Sym(SYM_NIL.to_owned())
    }

    pub fn ok() -> Self {
        Value::Sym(SYM_OK.to_owned())
    }

    pub fn not_ok() -> Self {
        Value::Sym(SYM_NOT_OK.to_owned())
    }

    pub fn as_quote_mut(&mut self) -> Option<&mut Quote> {
        match self {
            Value::Quote(q) => Some(q),
            _ => None,
        }
    }
}

/// Helper function for creating Values from Rust literals
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating atoms (names)
pub fn atom<S: AsRef<str>>(name: S) -> Value {
    Value::Atom(name.as_ref().to_owned())
}

/// Helper function for creating symbols; the name excludes the leading `:`
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Sym(name.as_ref().to_owned())
}

/// Helper function for creating a quote with an empty pattern
pub fn quote<I: IntoIterator<Item = Value>>(body: I) -> Value {
    Value::Quote(Quote::from_body(body.into_iter().collect()))
}

/// Helper function for creating a quote with both a pattern and a body
pub fn quote_with<P, B>(pattern: P, body: B) -> Value
where
    P: IntoIterator<Item = Value>,
    B: IntoIterator<Item = Value>,
{
    Value::Quote(Quote::new(
        pattern.into_iter().collect(),
        body.into_iter().collect(),
    ))
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Num(n) => write!(f, "{n}"),
            Value::Atom(a) => write!(f, "{a}"),
            Value::Sym(s) => write!(f, ":{s}"),
            Value::Str(s) => {
                // No escapes exist in the grammar, so pick a delimiter the text lacks
                if s.contains('"') {
                    write!(f, "'{s}'")
                } else {
                    write!(f, "\"{s}\"")
                }
            }
            Value::Quote(q) => write!(f, "{q}"),
        }
    }
}

impl std::fmt::Display for Quote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        if !self.pattern.is_empty() {
            for item in &self.pattern {
                write!(f, " {item}")?;
            }
            write!(f, " |")?;
        }
        for item in &self.body {
            write!(f, " {item}")?;
        }
        write!(f, " ]")
    }
}

/// Render a sequence the way the REPL and `.` show a stack
pub fn display_values(values: &[Value]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod helper_function_tests {
    use super::*;

    #[test]
    fn test_helper_functions_data_driven() {
        let test_cases = vec![
            (val(42), Value::Num(42.0)),
            (val(-17), Value::Num(-17.0)),
            (val(2.5), Value::Num(2.5)),
            (val(255u8), Value::Num(255.0)),
            (val(u32::MAX), Value::Num(4_294_967_295.0)),
            (val("hello"), Value::Str("hello".to_owned())),
            (val(String::new()), Value::Str(String::new())),
            (atom("dup"), Value::Atom("dup".to_owned())),
            (sym("ok"), Value::Sym("ok".to_owned())),
            (Value::truth(true), Value::Sym("true".to_owned())),
            (Value::truth(false), Value::Sym("nil".to_owned())),
            (Value::not_ok(), Value::Sym("not-ok".to_owned())),
            (quote([]), Value::Quote(Quote::default())),
            (
                quote_with([atom("x")], [atom("x"), atom("x")]),
                Value::Quote(Quote::new(
                    vec![Value::Atom("x".to_owned())],
                    vec![Value::Atom("x".to_owned()), Value::Atom("x".to_owned())],
                )),
            ),
        ];

        for (i, (actual, expected)) in test_cases.iter().enumerate() {
            assert_eq!(actual, expected, "Test case {} failed", i + 1);
        }
    }

    #[test]
    fn test_display_rendering() {
        let test_cases = vec![
            (val(5), "5"),
            (val(-2.5), "-2.5"),
            (val(0.125), "0.125"),
            (atom("dup"), "dup"),
            (sym("not-ok"), ":not-ok"),
            (val("hi there"), "\"hi there\""),
            (val(""), "\"\""),
            (val("say \"hi\""), "'say \"hi\"'"),
            (quote([]), "[ ]"),
            (quote([val(1), val(2)]), "[ 1 2 ]"),
            (quote_with([atom("x")], []), "[ x | ]"),
            (
                quote_with([atom("x")], [atom("x"), atom("x")]),
                "[ x | x x ]",
            ),
            (
                quote([quote_with([val(0)], [val("zero")]), quote([])]),
                "[ [ 0 | \"zero\" ] [ ] ]",
            ),
        ];

        for (i, (value, expected)) in test_cases.iter().enumerate() {
            assert_eq!(value.to_string(), *expected, "Test case {} failed", i + 1);
        }
    }

    #[test]
    fn test_quote_buffer_operations() {
        let mut q = Quote::from_body(vec![val(1)]);
        q.push(val(2));
        assert_eq!(q.pop(), Some(val(2)));
        assert_eq!(q.pop(), Some(val(1)));
        assert_eq!(q.pop(), None);

        q.push_pattern(atom("x"));
        assert_eq!(q.pattern, vec![atom("x")]);
        assert_eq!(q.pop_pattern(), Some(atom("x")));
        assert_eq!(q.pop_pattern(), None);
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(val(1), val(1.0));
        assert_ne!(val("1"), val(1));
        assert_ne!(sym("a"), atom("a"));
        assert_eq!(
            quote_with([atom("x")], [quote([val(1)])]),
            quote_with([atom("x")], [quote([val(1)])])
        );
        assert_ne!(quote_with([atom("x")], []), quote([atom("x")]));
    }

    #[test]
    fn test_display_values_joins_with_spaces() {
        assert_eq!(display_values(&[]), "");
        assert_eq!(
            display_values(&[val(1), sym("ok"), quote([val("a")])]),
            "1 :ok [ \"a\" ]"
        );
    }
}
