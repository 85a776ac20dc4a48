//! Pattern matching against stack arguments and substitution into quote bodies.
//!
//! A pattern is matched position by position against the same number of stack items,
//! deepest first. Atoms in the pattern are variables; anything else must be equal to
//! the stack item. A variable that appears more than once must bind equal values.

use std::collections::HashMap;

use crate::ast::{Quote, Value};

/// Variable bindings produced by a successful match
pub type Bindings = HashMap<String, Value>;

/// Match `pattern` against `stack_args`, both ordered deepest first.
///
/// Returns `None` when the argument count differs from the pattern length or when
/// any position fails to match. Callers pass exactly the slice they intend to consume.
pub fn pattern_match(stack_args: &[Value], pattern: &[Value]) -> Option<Bindings> {
    if stack_args.len() != pattern.len() {
        return None;
    }

    let mut bindings = Bindings::new();
    for (expected, actual) in pattern.iter().zip(stack_args) {
        match expected {
            Value::Atom(name) => match bindings.get(name) {
                Some(bound) if bound != actual => return None,
                Some(_) => {}
                None => {
                    bindings.insert(name.clone(), actual.clone());
                }
            },
            literal if literal != actual => return None,
            _ => {}
        }
    }
    Some(bindings)
}

fn substitute(value: &Value, bindings: &Bindings) -> Value {
    match value {
        Value::Atom(name) => bindings.get(name).cloned().unwrap_or_else(|| value.clone()),
        Value::Quote(inner) => Value::Quote(inner.bind(bindings)),
        other => other.clone(),
    }
}

impl Quote {
    /// Produce a copy of this quote with every bound atom in the body replaced.
    ///
    /// All variables are replaced in a single pass, so an atom inside a substituted
    /// value is never itself substituted. Nested quote bodies are rewritten too;
    /// patterns are left as written.
    pub fn bind(&self, bindings: &Bindings) -> Quote {
        if bindings.is_empty() {
            return self.clone();
        }
        Quote {
            pattern: self.pattern.clone(),
            body: self
                .body
                .iter()
                .map(|item| substitute(item, bindings))
                .collect(),
        }
    }
}
