use quark::ast::display_values;
use quark::evaluator::Machine;
use quark::host::{Host, StdHost};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::panic;
use std::process;

fn main() {
    let result = panic::catch_unwind(|| {
        run_repl();
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

/// Install a log subscriber when `RUST_LOG` is set, e.g. `RUST_LOG=quark=debug`
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

fn run_repl() {
    init_tracing();

    let mut machine = Machine::new();
    let mut host = StdHost;

    // An optional script runs first; its definitions stay available at the prompt
    if let Some(path) = std::env::args().nth(1) {
        let source = match std::fs::read_to_string(&path) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("Could not read {path}: {e}");
                process::exit(1);
            }
        };
        if let Err(e) = machine.eval_source(&source, &mut host) {
            println!("{e}");
        }
        if machine.halted {
            return;
        }
    }

    println!("Quark - concatenative, self-modifying, pattern matching");
    println!("Type *h for help, *q or Ctrl+D to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Could not initialize REPL: {e}");
            process::exit(1);
        }
    };

    loop {
        match rl.readline(":> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match handle_line(&mut machine, &mut host, line) {
                    Some(output) => print!("{output}"),
                    None => break,
                }

                if machine.halted {
                    break;
                }
            }

            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => break,
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn help_text() -> String {
    [
        "Quark REPL:",
        "  *h         - Show this help message",
        "  *f         - List all user definitions",
        "  *f NAME    - Show one definition",
        "  *q         - Exit the interpreter",
        "",
        "Values:",
        "  Numbers: 42, -1.5        Symbols: :ok, :nil",
        "  Strings: \"text\", 'text'  Quotes: [ x y | y x ]",
        "",
        "Examples:",
        "  1 2 +",
        "  [x | x x] :dup def  5 dup",
        "  7 [ [0 | \"zero\"] [n | \"nonzero\"] ] match",
        "",
        "A line that fails leaves the stack and definitions unchanged.",
        "",
    ]
    .join("\n")
}

/// Run one input line and return what the REPL should print, or `None` to quit.
///
/// Meta-commands and evaluated lines both end by showing the stack; a failed line
/// shows only the error and leaves the machine as it was.
fn handle_line(machine: &mut Machine, host: &mut dyn Host, line: &str) -> Option<String> {
    let mut output = match line {
        "*q" => return None,
        "*h" => help_text(),
        "*f" => bindings_text(machine),
        _ => {
            if let Some(name) = line.strip_prefix("*f ") {
                binding_text(machine, name.trim())
            } else {
                // Each line commits only if it runs to completion
                match machine.eval_source(line, host) {
                    Ok(()) => String::new(),
                    Err(e) => return Some(format!("{e}\n")),
                }
            }
        }
    };
    output.push_str(&display_values(&machine.stack));
    output.push('\n');
    Some(output)
}

fn bindings_text(machine: &Machine) -> String {
    let bindings = machine.env.get_all_bindings();

    if bindings.is_empty() {
        return "No definitions.\n".to_owned();
    }

    bindings
        .into_iter()
        .map(|(name, quote)| format!("{name}\n    {quote}\n\n"))
        .collect()
}

fn binding_text(machine: &Machine, name: &str) -> String {
    match machine.env.get(name) {
        Some(quote) => format!("{quote}\n"),
        None => format!("No such function: {name}\n"),
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use quark::host::SandboxHost;

    #[test]
    fn test_every_input_shows_the_stack() {
        let mut machine = Machine::new();
        let mut host = SandboxHost::new();

        let test_cases = vec![
            ("1 2", "1 2\n"),
            ("[x | x x] :dup def", "1 2\n"),
            ("*f", "dup\n    [ x | x x ]\n\n1 2\n"),
            ("*f dup", "[ x | x x ]\n1 2\n"),
            ("*f nope", "No such function: nope\n1 2\n"),
            ("dup", "1 2 2\n"),
            (":a +", "Type error with function +\n  expected a stack of [Num, Num]\n  but got [Num, Sym]\n"),
        ];

        for (i, (line, expected)) in test_cases.into_iter().enumerate() {
            let output = handle_line(&mut machine, &mut host, line).unwrap();
            assert_eq!(output, expected, "Line #{} ({line})", i + 1);
        }

        assert_eq!(machine.stack.len(), 3);
        assert!(handle_line(&mut machine, &mut host, "*q").is_none());
    }

    #[test]
    fn test_empty_definition_list() {
        let mut machine = Machine::new();
        let output = handle_line(&mut machine, &mut SandboxHost::new(), "*f").unwrap();
        assert_eq!(output, "No definitions.\n\n");
    }
}
