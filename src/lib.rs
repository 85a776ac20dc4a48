//! Quark - a concatenative, self-modifying, pattern-matching language
//!
//! This crate implements a small stack language in which code and data share one
//! representation. A program is a sequence of values; literals push themselves and
//! names dispatch to core functions or to user definitions. Quotes are both data
//! (inspectable, mutable buffers) and programs (invoked by `call`, `match`, or a
//! named binding).
//!
//! ```text
//! 1 2 +                          ; 3
//! [x | x x] :dup def  5 dup      ; 5 5
//! 7 [ [0 | "zero"] [n | "nonzero"] ] match   ; "nonzero"
//! ```
//!
//! ## Evaluation model
//!
//! The engine owns a stack, a program queue and a table of user bindings. Invoking a
//! user word never recurses natively: its quote is queued in front of the program
//! followed by `call`, and `call` splices the bound body back into the queue. Deeply
//! recursive Quark code therefore grows the heap, not the native stack.
//!
//! ## Types
//!
//! Values carry structural types (`Num`, `Sym`, `Quote(Num, Any)`, ...) that guard
//! every core function before it runs. A mismatch aborts the current run with a
//! [`Error::TypeError`]; there is no coercion.
//!
//! ## Modules
//!
//! - `ast`: values, quotes and their textual rendering
//! - `types`: structural types and the signature matcher
//! - `quark`: source text parsing
//! - `pattern`: pattern matching and substitution into quote bodies
//! - `evaluator`: machine state and the trampolined run loop
//! - `builtinops`: the registry of type-guarded core functions
//! - `host`: I/O collaborators used by `print`, `load`, `cmd`, `write` and `exit`

use std::fmt;

use crate::types::Type;

/// Maximum quote nesting accepted by the parser by default.
/// Parsing recurses once per nesting level, so this bounds native stack use.
///
/// Quotes nested deeper than this can still be built at runtime with `<<` and `<@`.
/// Cloning, comparing, rendering and dropping a quote all recurse once per level,
/// so nesting in the tens of thousands exhausts the native stack.
pub const MAX_PARSE_DEPTH: usize = 128;

/// Maximum nesting of `eval` runs inside one another.
/// Each nested `eval` re-enters the engine on the native stack; past this depth it
/// fails with an evaluation error instead.
pub const MAX_EVAL_DEPTH: usize = 64;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, stray `|`, etc.)
    InvalidSyntax,
    /// Input ended before the program was complete (unterminated string, unclosed quote)
    Incomplete,
    /// Quote nesting exceeded the configured maximum depth
    TooDeeplyNested,
    /// Unparseable input left after a valid prefix
    TrailingContent,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic character encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    /// Create a ParseError with all fields
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    /// Create a simple ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError with context extracted from input at a given byte offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        let found = input
            .get(error_offset..)
            .and_then(|rest| rest.chars().next())
            .map(String::from);

        // Show a little of what came before the failure, on a char boundary
        let mut context_start = error_offset.saturating_sub(20).min(input.len());
        while !input.is_char_boundary(context_start) {
            context_start -= 1;
        }

        let context_str: String = input[context_start..].chars().take(MAX_CONTEXT).collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.len() < input.len() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), found)
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    ParseError(ParseError),
    /// A core function's signature did not match the top of the stack
    TypeError {
        function: String,
        expected: Vec<Type>,
        actual: Vec<Type>,
    },
    /// An atom named neither a core function nor a user binding
    UnknownFunction(String),
    /// Engine failures outside the language itself (step limit, corrupted stack)
    EvalError(String),
}

impl Error {
    /// Shorthand for the stack-underflow guard used inside core functions
    pub(crate) fn underflow(function: &str) -> Self {
        Error::EvalError(format!("stack underflow in {function}"))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ParseError(e) => {
                write!(f, "ParseError: {}", e.message)?;
                if let Some(found) = &e.found {
                    write!(f, "\nFound: {found}")?;
                }
                if let Some(context) = &e.context {
                    write!(f, "\nContext: {context}")?;
                }
                Ok(())
            }
            Error::TypeError {
                function,
                expected,
                actual,
            } => write!(
                f,
                "Type error with function {function}\n  expected a stack of {}\n  but got {}",
                types::display_types(expected),
                types::display_types(actual)
            ),
            Error::UnknownFunction(name) => write!(f, "No such function: {name}"),
            Error::EvalError(msg) => write!(f, "EvaluationError: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod host;
pub mod pattern;
pub mod quark;
pub mod types;
