use crate::{Error, MAX_EVAL_DEPTH};
use crate::ast::{Quote, Value};
use crate::builtinops::find_op;
use crate::host::Host;
use crate::quark::parse_quark;
use crate::types::type_check;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, trace};

/// The atom a user word expands to after its quote is pushed
const CALL: &str = "call";

/// User definitions created by `def`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Environment {
    bindings: HashMap<String, Quote>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            bindings: HashMap::new(),
        }
    }

    /// Bind a name, replacing any previous definition
    pub fn define(&mut self, name: impl Into<String>, quote: Quote) {
        self.bindings.insert(name.into(), quote);
    }

    pub fn get(&self, name: &str) -> Option<&Quote> {
        self.bindings.get(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Get all bindings
    /// Returns a Vec of (name, quote) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Quote)> {
        let mut result: Vec<_> = self
            .bindings
            .iter()
            .map(|(name, quote)| (name.clone(), quote.clone()))
            .collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

/// Limits applied to a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    /// Maximum number of program items dispatched by one top-level run, nested
    /// `eval` runs included; `None` is unbounded
    pub step_limit: Option<u64>,
    /// Maximum nesting of `eval` runs
    pub max_eval_depth: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            step_limit: None,
            max_eval_depth: MAX_EVAL_DEPTH,
        }
    }
}

/// Machine state for one execution: stack, program queue and user bindings.
///
/// The program queue is consumed from the front. Literals are pushed onto the stack;
/// atoms dispatch to a core function or to a user binding. Invoking a user word
/// queues its quote followed by `call` instead of recursing, so deep Quark recursion
/// only grows the queue and the stack.
#[derive(Debug, Clone, Default)]
pub struct Machine {
    pub stack: Vec<Value>,
    pub program: VecDeque<Value>,
    pub env: Environment,
    pub config: RunConfig,
    /// Set once `exit` runs; the remaining program is discarded
    pub halted: bool,
    /// Number of `eval` runs this machine is nested in; 0 for a top-level machine
    eval_depth: usize,
    /// Items dispatched so far, shared with nested runs
    steps: u64,
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RunConfig) -> Self {
        Machine {
            config,
            ..Self::default()
        }
    }

    /// Start from an existing stack and set of bindings
    pub fn with_state(stack: Vec<Value>, env: Environment) -> Self {
        Machine {
            stack,
            env,
            ..Self::default()
        }
    }

    /// Queue items at the front of the program, keeping their order
    pub fn prepend_program(&mut self, items: Vec<Value>) {
        for item in items.into_iter().rev() {
            self.program.push_front(item);
        }
    }

    /// Stop the current run; the rest of the program is dropped
    pub fn halt(&mut self) {
        self.halted = true;
        self.program.clear();
    }

    /// Run until the program queue is empty or an error aborts the run
    pub fn run(&mut self, host: &mut dyn Host) -> Result<(), Error> {
        if self.eval_depth == 0 {
            self.steps = 0;
        }
        while !self.halted {
            let Some(item) = self.program.pop_front() else {
                break;
            };

            if let Some(limit) = self.config.step_limit
                && self.steps >= limit
            {
                return Err(Error::EvalError(format!(
                    "Step limit exceeded (max: {limit})"
                )));
            }
            self.steps += 1;

            self.dispatch(item, host)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, item: Value, host: &mut dyn Host) -> Result<(), Error> {
        let Value::Atom(name) = item else {
            self.stack.push(item);
            return Ok(());
        };

        trace!(atom = %name, stack_depth = self.stack.len(), queued = self.program.len(), "dispatch");

        if let Some(op) = find_op(&name) {
            type_check(&self.stack, &op.signature).map_err(|mismatch| Error::TypeError {
                function: name.clone(),
                expected: mismatch.expected,
                actual: mismatch.actual,
            })?;
            return (op.func)(self, host);
        }

        if let Some(quote) = self.env.get(&name) {
            let quote = quote.clone();
            self.program.push_front(Value::Atom(CALL.to_owned()));
            self.program.push_front(Value::Quote(quote));
            return Ok(());
        }

        Err(Error::UnknownFunction(name))
    }

    /// Parse `source` and run it against a copy of this machine's stack and bindings.
    ///
    /// On success the copy's stack and bindings replace this machine's; on any error
    /// this machine is left exactly as it was. The caller's own program queue is never
    /// touched, which makes this usable both per REPL line and from inside a run.
    ///
    /// Called on a top-level machine this starts a fresh step budget; called from
    /// inside a run (by `eval`) the nested run draws on the caller's budget, and the
    /// nesting depth is bounded by [`RunConfig::max_eval_depth`].
    #[tracing::instrument(level = "debug", skip_all, fields(source_len = source.len(), depth = self.eval_depth))]
    pub fn eval_source(&mut self, source: &str, host: &mut dyn Host) -> Result<(), Error> {
        if self.eval_depth >= self.config.max_eval_depth {
            return Err(Error::EvalError(format!(
                "Evaluation depth limit exceeded (max: {})",
                self.config.max_eval_depth
            )));
        }

        let program = parse_quark(source)?;
        let nested = self.eval_depth > 0;

        let mut scratch = Machine {
            stack: self.stack.clone(),
            program: program.into(),
            env: self.env.clone(),
            config: self.config,
            halted: false,
            eval_depth: self.eval_depth + 1,
            steps: if nested { self.steps } else { 0 },
        };

        let result = scratch.run(host);
        if nested {
            // Work done by a rolled-back run still counts
            self.steps = scratch.steps;
        }

        match result {
            Ok(()) => {
                debug!(stack_depth = scratch.stack.len(), "commit");
                self.stack = scratch.stack;
                self.env = scratch.env;
                if scratch.halted {
                    self.halt();
                }
                Ok(())
            }
            Err(err) => {
                debug!(error = %err, "rollback");
                Err(err)
            }
        }
    }

    /// Pop the top value; `function` names the caller for diagnostics
    pub(crate) fn pop(&mut self, function: &str) -> Result<Value, Error> {
        self.stack.pop().ok_or_else(|| Error::underflow(function))
    }

    pub(crate) fn pop_num(&mut self, function: &str) -> Result<f64, Error> {
        match self.pop(function)? {
            Value::Num(n) => Ok(n),
            other => Err(unexpected(function, "a number", &other)),
        }
    }

    pub(crate) fn pop_str(&mut self, function: &str) -> Result<String, Error> {
        match self.pop(function)? {
            Value::Str(s) => Ok(s),
            other => Err(unexpected(function, "a string", &other)),
        }
    }

    pub(crate) fn pop_sym(&mut self, function: &str) -> Result<String, Error> {
        match self.pop(function)? {
            Value::Sym(s) => Ok(s),
            other => Err(unexpected(function, "a symbol", &other)),
        }
    }

    pub(crate) fn pop_quote(&mut self, function: &str) -> Result<Quote, Error> {
        match self.pop(function)? {
            Value::Quote(q) => Ok(q),
            other => Err(unexpected(function, "a quote", &other)),
        }
    }

    /// Borrow the quote on top of the stack for in-place edits
    pub(crate) fn top_quote_mut(&mut self, function: &str) -> Result<&mut Quote, Error> {
        self.stack
            .last_mut()
            .ok_or_else(|| Error::underflow(function))?
            .as_quote_mut()
            .ok_or_else(|| Error::EvalError(format!("{function}: expected a quote on the stack")))
    }
}

fn unexpected(function: &str, expected: &str, found: &Value) -> Error {
    Error::EvalError(format!("{function}: expected {expected}, found {found}"))
}

/// Run a complete program on a fresh machine
pub fn run_program(source: &str, host: &mut dyn Host) -> Result<Machine, Error> {
    let mut machine = Machine::new();
    machine.eval_source(source, host)?;
    Ok(machine)
}
