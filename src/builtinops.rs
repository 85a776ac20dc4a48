//! Core-function registry.
//!
//! Every core function is a name, a type signature and an effect over the machine.
//! The evaluator checks the signature against the top of the stack before the effect
//! runs, so a function body can rely on the shape of the items it pops.
//!
//! ```text
//! 1 2 +              ; 3
//! 3 2 /              ; 0.666...  (top divided into the one below, reversed)
//! [1 2] >>           ; [ 1 ] 2
//! [x | x x] :dup def ; binds `dup`
//! "1 +" eval         ; runs nested; pushes :ok or :not-ok
//! ```
//!
//! ## Pop order
//!
//! Binary functions pop the top item first (`x2`) and then the one below it (`x1`).
//! `+` and `*` push `x1 op x2`, `/` pushes `x2 / x1`, and `<` pushes `:true` when
//! `x2 > x1`. `weld` and `@+` join in stack order (`x1` then `x2`).
//!
//! ## Soft failures
//!
//! `call` pushes `:nil` when its pattern does not match. `parse`, `eval` and the I/O
//! functions push `:not-ok` on failure. None of these abort the run.
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with the signature `fn(&mut Machine, &mut dyn Host) -> Result<(), Error>`
//! 2. **Add to BUILTIN_OPS** with its name and type signature
//! 3. **Add tests** covering the stack effect and the signature

use crate::Error;
use crate::ast::{Quote, Value, display_values};
use crate::evaluator::Machine;
use crate::host::Host;
use crate::pattern::pattern_match;
use crate::quark::parse_quark;
use crate::types::{Type, type_to_value};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

/// Effect of a core function over the machine
pub type BuiltinFn = fn(&mut Machine, &mut dyn Host) -> Result<(), Error>;

/// Definition of a core function
#[derive(Clone)]
pub struct BuiltinOp {
    /// The Quark name of this function
    pub id: &'static str,
    /// Types required on top of the stack, deepest first
    pub signature: Vec<Type>,
    pub func: BuiltinFn,
}

impl std::fmt::Debug for BuiltinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinOp")
            .field("id", &self.id)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        // Names are unique within the registry
        self.id == other.id
    }
}

macro_rules! arithmetic_op {
    ($name:ident, $id:literal, |$x1:ident, $x2:ident| $result:expr) => {
        fn $name(m: &mut Machine, _host: &mut dyn Host) -> Result<(), Error> {
            let $x2 = m.pop_num($id)?;
            let $x1 = m.pop_num($id)?;
            m.stack.push($result);
            Ok(())
        }
    };
}

arithmetic_op!(builtin_add, "+", |x1, x2| Value::Num(x1 + x2));
arithmetic_op!(builtin_mul, "*", |x1, x2| Value::Num(x1 * x2));
arithmetic_op!(builtin_div, "/", |x1, x2| Value::Num(x2 / x1));
arithmetic_op!(builtin_less, "<", |x1, x2| Value::truth(x2 > x1));

fn builtin_print(m: &mut Machine, host: &mut dyn Host) -> Result<(), Error> {
    let text = m.pop_str("print")?;
    host.print(&text);
    Ok(())
}

fn builtin_show_stack(m: &mut Machine, host: &mut dyn Host) -> Result<(), Error> {
    host.print(&format!("{}\n", display_values(&m.stack)));
    Ok(())
}

// Quote buffer operations

fn builtin_body_pop(m: &mut Machine, _host: &mut dyn Host) -> Result<(), Error> {
    let item = m
        .top_quote_mut(">>")?
        .pop()
        .ok_or_else(|| Error::underflow(">>"))?;
    m.stack.push(item);
    Ok(())
}

fn builtin_body_push(m: &mut Machine, _host: &mut dyn Host) -> Result<(), Error> {
    let item = m.pop("<<")?;
    m.top_quote_mut("<<")?.push(item);
    Ok(())
}

fn builtin_pattern_pop(m: &mut Machine, _host: &mut dyn Host) -> Result<(), Error> {
    let item = m
        .top_quote_mut("@>")?
        .pop_pattern()
        .ok_or_else(|| Error::underflow("@>"))?;
    m.stack.push(item);
    Ok(())
}

fn builtin_pattern_push(m: &mut Machine, _host: &mut dyn Host) -> Result<(), Error> {
    let item = m.pop("<@")?;
    m.top_quote_mut("<@")?.push_pattern(item);
    Ok(())
}

fn builtin_join(m: &mut Machine, _host: &mut dyn Host) -> Result<(), Error> {
    let top = m.pop_quote("@+")?;
    let below = m.pop_quote("@+")?;
    let mut body = below.body;
    body.extend(top.body);
    m.stack.push(Value::Quote(Quote::from_body(body)));
    Ok(())
}

fn builtin_split(m: &mut Machine, _host: &mut dyn Host) -> Result<(), Error> {
    let quote = m.pop_quote("@-")?;
    m.stack.push(Value::Quote(Quote::from_body(quote.pattern)));
    m.stack.push(Value::Quote(Quote::from_body(quote.body)));
    Ok(())
}

fn builtin_show(m: &mut Machine, _host: &mut dyn Host) -> Result<(), Error> {
    let value = m.pop("show")?;
    m.stack.push(Value::Str(value.to_string()));
    Ok(())
}

// Invocation

fn builtin_call(m: &mut Machine, _host: &mut dyn Host) -> Result<(), Error> {
    let quote = m.pop_quote("call")?;
    let count = quote.pattern.len().min(m.stack.len());
    let args = m.stack.split_off(m.stack.len() - count);

    match pattern_match(&args, &quote.pattern) {
        Some(bindings) => m.prepend_program(quote.bind(&bindings).body),
        None => m.stack.push(Value::nil()),
    }
    Ok(())
}

fn builtin_match(m: &mut Machine, _host: &mut dyn Host) -> Result<(), Error> {
    let clauses = m.pop_quote("match")?;

    for clause in clauses.body {
        let Value::Quote(clause) = clause else {
            continue;
        };
        let Some(start) = m.stack.len().checked_sub(clause.pattern.len()) else {
            continue;
        };
        if let Some(bindings) = pattern_match(&m.stack[start..], &clause.pattern) {
            m.stack.truncate(start);
            m.prepend_program(clause.bind(&bindings).body);
            return Ok(());
        }
    }
    Ok(())
}

// Strings and definitions

fn builtin_chars(m: &mut Machine, _host: &mut dyn Host) -> Result<(), Error> {
    let text = m.pop_str("chars")?;
    let chars = text.chars().map(|c| Value::Str(c.to_string())).collect();
    m.stack.push(Value::Quote(Quote::from_body(chars)));
    Ok(())
}

fn builtin_weld(m: &mut Machine, _host: &mut dyn Host) -> Result<(), Error> {
    let x2 = m.pop_str("weld")?;
    let mut x1 = m.pop_str("weld")?;
    x1.push_str(&x2);
    m.stack.push(Value::Str(x1));
    Ok(())
}

fn builtin_def(m: &mut Machine, _host: &mut dyn Host) -> Result<(), Error> {
    let name = m.pop_sym("def")?;
    let quote = m.pop_quote("def")?;
    debug!(%name, quote = %quote, "def");
    m.env.define(name, quote);
    Ok(())
}

fn builtin_type(m: &mut Machine, _host: &mut dyn Host) -> Result<(), Error> {
    let value = m.pop("type")?;
    m.stack.push(type_to_value(&value.qtype()));
    Ok(())
}

// Meta evaluation

fn builtin_parse(m: &mut Machine, _host: &mut dyn Host) -> Result<(), Error> {
    let source = m.pop_str("parse")?;
    match parse_quark(&source) {
        Ok(items) => {
            m.stack.push(Value::Quote(Quote::from_body(items)));
            m.stack.push(Value::ok());
        }
        Err(err) => {
            debug!(error = %err, "parse failed");
            m.stack.push(Value::not_ok());
        }
    }
    Ok(())
}

fn builtin_eval(m: &mut Machine, host: &mut dyn Host) -> Result<(), Error> {
    let source = m.pop_str("eval")?;
    debug!(%source, "nested eval");
    match m.eval_source(&source, host) {
        Ok(()) => m.stack.push(Value::ok()),
        Err(err) => {
            debug!(error = %err, "nested eval failed");
            m.stack.push(Value::not_ok());
        }
    }
    Ok(())
}

// Host I/O

/// Push a produced string then `:ok`, or only `:not-ok`
fn push_io_result(m: &mut Machine, result: std::io::Result<String>) {
    match result {
        Ok(text) => {
            m.stack.push(Value::Str(text));
            m.stack.push(Value::ok());
        }
        Err(err) => {
            debug!(error = %err, "host operation failed");
            m.stack.push(Value::not_ok());
        }
    }
}

fn builtin_load(m: &mut Machine, host: &mut dyn Host) -> Result<(), Error> {
    let path = m.pop_str("load")?;
    let result = host.read_file(&path);
    push_io_result(m, result);
    Ok(())
}

fn builtin_cmd(m: &mut Machine, host: &mut dyn Host) -> Result<(), Error> {
    let command = m.pop_str("cmd")?;
    let result = host.run_command(&command);
    push_io_result(m, result);
    Ok(())
}

fn builtin_write(m: &mut Machine, host: &mut dyn Host) -> Result<(), Error> {
    let filename = m.pop_str("write")?;
    let contents = m.pop_str("write")?;
    match host.write_file(&filename, &contents) {
        Ok(()) => m.stack.push(Value::ok()),
        Err(err) => {
            debug!(error = %err, %filename, "write failed");
            m.stack.push(Value::not_ok());
        }
    }
    Ok(())
}

fn builtin_exit(m: &mut Machine, host: &mut dyn Host) -> Result<(), Error> {
    host.exit();
    m.halt();
    Ok(())
}

/// Global registry of all core functions
///
/// This static array contains every core function. It is initialized once on first
/// use; lookups go through the name index below.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    use Type::{Any, Empty, NotEmpty, Num, Str, Sym};

    let quote = Type::quote;
    let any_quote = Type::any_quote;

    vec![
        // Arithmetic and comparison
        BuiltinOp {
            id: "+",
            signature: vec![Num, Num],
            func: builtin_add,
        },
        BuiltinOp {
            id: "*",
            signature: vec![Num, Num],
            func: builtin_mul,
        },
        BuiltinOp {
            id: "/",
            signature: vec![Num, Num],
            func: builtin_div,
        },
        BuiltinOp {
            id: "<",
            signature: vec![Num, Num],
            func: builtin_less,
        },
        // Output
        BuiltinOp {
            id: "print",
            signature: vec![Str],
            func: builtin_print,
        },
        BuiltinOp {
            id: ".",
            signature: vec![],
            func: builtin_show_stack,
        },
        // Quote buffers
        BuiltinOp {
            id: ">>",
            signature: vec![quote(Any, NotEmpty)],
            func: builtin_body_pop,
        },
        BuiltinOp {
            id: "<<",
            signature: vec![any_quote(), Any],
            func: builtin_body_push,
        },
        BuiltinOp {
            id: "@>",
            signature: vec![quote(NotEmpty, Any)],
            func: builtin_pattern_pop,
        },
        BuiltinOp {
            id: "<@",
            signature: vec![any_quote(), Any],
            func: builtin_pattern_push,
        },
        BuiltinOp {
            id: "@+",
            signature: vec![any_quote(), any_quote()],
            func: builtin_join,
        },
        BuiltinOp {
            id: "@-",
            signature: vec![any_quote()],
            func: builtin_split,
        },
        BuiltinOp {
            id: "show",
            signature: vec![Any],
            func: builtin_show,
        },
        // Invocation
        BuiltinOp {
            id: "call",
            signature: vec![any_quote()],
            func: builtin_call,
        },
        BuiltinOp {
            id: "match",
            signature: vec![quote(Empty, any_quote())],
            func: builtin_match,
        },
        // Strings, definitions and types
        BuiltinOp {
            id: "chars",
            signature: vec![Str],
            func: builtin_chars,
        },
        BuiltinOp {
            id: "weld",
            signature: vec![Str, Str],
            func: builtin_weld,
        },
        BuiltinOp {
            id: "def",
            signature: vec![any_quote(), Sym],
            func: builtin_def,
        },
        BuiltinOp {
            id: "type",
            signature: vec![Any],
            func: builtin_type,
        },
        // Meta evaluation
        BuiltinOp {
            id: "parse",
            signature: vec![Str],
            func: builtin_parse,
        },
        BuiltinOp {
            id: "eval",
            signature: vec![Str],
            func: builtin_eval,
        },
        // Host I/O
        BuiltinOp {
            id: "load",
            signature: vec![Str],
            func: builtin_load,
        },
        BuiltinOp {
            id: "cmd",
            signature: vec![Str],
            func: builtin_cmd,
        },
        BuiltinOp {
            id: "write",
            signature: vec![Str, Str],
            func: builtin_write,
        },
        BuiltinOp {
            id: "exit",
            signature: vec![],
            func: builtin_exit,
        },
    ]
});

/// Lazy static map from name to BuiltinOp (private - use find_op)
static BUILTIN_INDEX: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.id, op)).collect()
});

/// Get all core functions, in registry order
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a core function by name
pub fn find_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_INDEX.get(id).copied()
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{atom, quote, quote_with, sym, val};
    use crate::evaluator::run_program;
    use crate::host::SandboxHost;

    /// Expected outcome of running a program on a fresh machine
    #[derive(Debug)]
    enum Expect {
        Stack(Vec<Value>),
        TypeError(&'static str), // TypeError raised by the named function
    }
    use Expect::*;

    fn stack<I: IntoIterator<Item = Value>>(items: I) -> Expect {
        Stack(items.into_iter().collect())
    }

    fn run_builtin_tests(test_cases: Vec<(&str, Expect)>) {
        for (i, (program, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Builtin test #{} ({program:?})", i + 1);
            let mut host = SandboxHost::new();
            let result = run_program(program, &mut host);

            match (result, expected) {
                (Ok(machine), Stack(expected_stack)) => {
                    assert_eq!(machine.stack, *expected_stack, "{test_id}: stack mismatch");
                }
                (Err(Error::TypeError { function, .. }), TypeError(expected_fn)) => {
                    assert_eq!(function, *expected_fn, "{test_id}: wrong function in type error");
                }
                (Ok(machine), TypeError(_)) => {
                    panic!("{test_id}: expected type error, got stack {:?}", machine.stack);
                }
                (Err(err), _) => panic!("{test_id}: unexpected error {err}"),
            }
        }
    }

    #[test]
    fn test_registry_lookup() {
        let add = find_op("+").unwrap();
        assert_eq!(add.id, "+");
        assert_eq!(add.signature, vec![Type::Num, Type::Num]);

        let matcher = find_op("match").unwrap();
        assert_eq!(
            matcher.signature,
            vec![Type::quote(Type::Empty, Type::any_quote())]
        );

        assert!(find_op("dup").is_none());
        assert!(find_op("").is_none());

        // Every registered name resolves to its own entry
        let all_ops = get_builtin_ops();
        assert_eq!(all_ops.len(), 25);
        for op in all_ops {
            assert!(std::ptr::eq(find_op(op.id).unwrap(), op), "{} lookup", op.id);
        }
    }

    #[test]
    fn test_arithmetic_pop_order() {
        let test_cases = vec![
            ("1 2 +", stack([val(3)])),
            ("2.5 -1 +", stack([val(1.5)])),
            ("3 4 *", stack([val(12)])),
            ("3 2 /", stack([val(2.0 / 3.0)])),
            ("2 8 /", stack([val(4)])),
            ("1 2 <", stack([Value::truth(true)])),
            ("2 1 <", stack([Value::truth(false)])),
            ("2 2 <", stack([sym("nil")])),
            ("5 1 2 +", stack([val(5), val(3)])),
            ("1 :a +", TypeError("+")),
            ("1 *", TypeError("*")),
            ("\"1\" \"2\" <", TypeError("<")),
        ];
        run_builtin_tests(test_cases);
    }

    #[test]
    fn test_quote_buffer_operations() {
        let test_cases = vec![
            (">>", TypeError(">>")),
            ("[1 2] >>", stack([quote([val(1)]), val(2)])),
            ("[ ] >>", TypeError(">>")),
            ("[x | ] >>", TypeError(">>")),
            ("[ ] 1 <<", stack([quote([val(1)])])),
            ("[1] [2] <<", stack([quote([val(1), quote([val(2)])])])),
            ("1 <<", TypeError("<<")),
            ("[a b | 1] @>", stack([quote_with([atom("a")], [val(1)]), atom("b")])),
            ("[1 2] @>", TypeError("@>")),
            ("[ ] :x <@", stack([quote_with([sym("x")], [])])),
            (
                "[1 | 2] [3 | 4] @+",
                stack([quote([val(2), val(4)])]),
            ),
            ("[1] 2 @+", TypeError("@+")),
            (
                "[x y | y x] @-",
                stack([quote([atom("x"), atom("y")]), quote([atom("y"), atom("x")])]),
            ),
            ("[ ] @-", stack([quote([]), quote([])])),
        ];
        run_builtin_tests(test_cases);
    }

    #[test]
    fn test_call_and_match() {
        let test_cases = vec![
            ("5 [x | x x] call", stack([val(5), val(5)])),
            ("[1 2 +] call", stack([val(3)])),
            ("[x | x x] call", stack([sym("nil")])),
            ("call", TypeError("call")),
            ("5 call", TypeError("call")),
            // A failed match consumes the arguments and pushes :nil
            ("1 2 [x x | :same] call", stack([sym("nil")])),
            ("2 2 [x x | :same] call", stack([sym("same")])),
            ("7 [0 | :zero] call", stack([sym("nil")])),
            ("9 1 2 [a b | b a] call", stack([val(9), val(2), val(1)])),
            // Bound values are substituted into nested quotes
            ("4 [n | [n n]] call", stack([quote([val(4), val(4)])])),
            (
                "0 [ [0 | \"zero\"] [n | \"nonzero\"] ] match",
                stack([val("zero")]),
            ),
            (
                "7 [ [0 | \"zero\"] [n | \"nonzero\"] ] match",
                stack([val("nonzero")]),
            ),
            // First listed clause wins
            ("3 [ [n | :first] [n | :second] ] match", stack([sym("first")])),
            // No clause applies: stack untouched, nothing pushed
            ("7 [ [0 | :zero] ] match", stack([val(7)])),
            ("[ [x y | :two] ] match", stack([])),
            ("[ [ | :always] ] match", stack([sym("always")])),
            ("[1 2] match", TypeError("match")),
            ("[x | [y | y]] match", TypeError("match")),
        ];
        run_builtin_tests(test_cases);
    }

    #[test]
    fn test_strings_definitions_and_types() {
        let test_cases = vec![
            ("\"abc\" chars", stack([quote([val("a"), val("b"), val("c")])])),
            ("\"\" chars", stack([quote([])])),
            ("\"foo\" \"bar\" weld", stack([val("foobar")])),
            ("\"foo\" 1 weld", TypeError("weld")),
            ("42 show", stack([val("42")])),
            ("[x | x :y \"z\"] show", stack([val("[ x | x :y \"z\" ]")])),
            ("\"q\" show", stack([val("\"q\"")])),
            ("[x | x x] :dup def 1 dup", stack([val(1), val(1)])),
            ("[ ] \"name\" def", TypeError("def")),
            (":name [ ] def", TypeError("def")),
            ("1 type", stack([sym("Num")])),
            (":a type", stack([sym("Sym")])),
            ("\"a\" type", stack([sym("Str")])),
            (
                "[x | 1 2] type",
                stack([quote([sym("Quote"), sym("Atom"), sym("Num")])]),
            ),
            (
                "[ ] type",
                stack([quote([sym("Quote"), sym("Empty"), sym("Empty")])]),
            ),
        ];
        run_builtin_tests(test_cases);
    }

    #[test]
    fn test_parse_and_eval() {
        let test_cases = vec![
            (
                "\"1 foo\" parse",
                stack([quote([val(1), atom("foo")]), sym("ok")]),
            ),
            ("\"1 [\" parse", stack([sym("not-ok")])),
            ("1 \"2 +\" eval", stack([val(3), sym("ok")])),
            ("\"[x | x x] :dup def\" eval 3 dup", stack([sym("ok"), val(3), val(3)])),
            // Failure leaves everything as it was, plus :not-ok
            ("1 2 \"'a' 1 +\" eval", stack([val(1), val(2), sym("not-ok")])),
            ("1 \"+ +\" eval", stack([val(1), sym("not-ok")])),
            ("1 \"[\" eval", stack([val(1), sym("not-ok")])),
            ("\"[ ] :w def 1 :x +\" eval", stack([sym("not-ok")])),
            ("\"\" eval", stack([sym("ok")])),
            // Nested eval inside eval
            ("\"'2 3 *' eval\" eval", stack([val(6), sym("ok"), sym("ok")])),
        ];
        run_builtin_tests(test_cases);

        // Bindings from a failed eval are discarded
        let err = run_program("\"[ ] :w def 1 :x +\" eval w", &mut SandboxHost::new());
        assert_eq!(err.unwrap_err(), Error::UnknownFunction("w".to_owned()));
    }

    #[test]
    fn test_host_operations() {
        let mut host = SandboxHost::with_files([("lib.qrk", "[x | x x] :dup def")]);

        let machine = run_program(
            "\"hi\" print \"lib.qrk\" load . \"missing\" load",
            &mut host,
        )
        .unwrap();
        assert_eq!(
            machine.stack,
            vec![val("[x | x x] :dup def"), sym("ok"), sym("not-ok")]
        );
        assert_eq!(host.take_output(), "hi\"[x | x x] :dup def\" :ok\n");

        let machine = run_program("\"data\" \"out.txt\" write \"ls\" cmd", &mut host).unwrap();
        assert_eq!(machine.stack, vec![sym("ok"), sym("not-ok")]);
        assert_eq!(host.files["out.txt"], "data");

        let machine = run_program(
            "\"lib.qrk\" load [ text :ok | text eval ] call 2 dup",
            &mut host,
        )
        .unwrap();
        assert_eq!(machine.stack, vec![sym("ok"), val(2), val(2)]);

        assert!(!host.exited);
        let machine = run_program("1 exit 2", &mut host).unwrap();
        assert!(host.exited);
        assert_eq!(machine.stack, vec![val(1)]);
    }
}
