//! Quark source parsing.
//!
//! A program is a whitespace-separated sequence of items:
//!
//! ```text
//! 42  -1.5             ; numbers
//! :ok                  ; symbols
//! dup  +  weld         ; atoms
//! "text"  'text'       ; strings (no escapes)
//! [ x y | y x ]        ; quotes: optional pattern before `|`, then body
//! ```
//!
//! Numbers and symbols are tried before atoms, so an atom can never start with a
//! digit or `:`. Atoms never contain digits at all, so `a1` is the atom `a` followed
//! by the number `1`. The whole input must be consumed; otherwise a [`ParseError`]
//! describing the first unparseable position is returned.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{opt, recognize},
    error::ErrorKind,
    multi::many0,
    sequence::{delimited, pair, preceded, terminated},
};

use crate::ast::{Quote, Value, is_name_char};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Parser settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseConfig {
    /// Maximum quote nesting; deeper input is rejected as `TooDeeplyNested`
    pub max_depth: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            max_depth: MAX_PARSE_DEPTH,
        }
    }
}

/// Parse a number: optional `-`, digits, optional fractional part
fn parse_number(input: &str) -> IResult<&str, Value> {
    let (remaining, text) =
        recognize((opt(char('-')), digit1, opt(pair(char('.'), digit1)))).parse(input)?;

    match text.parse::<f64>() {
        Ok(n) => Ok((remaining, Value::Num(n))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Float,
        ))),
    }
}

/// Parse a symbol (`:name`)
fn parse_symbol(input: &str) -> IResult<&str, Value> {
    let (remaining, name) = preceded(char(':'), take_while1(is_name_char)).parse(input)?;
    Ok((remaining, Value::Sym(name.to_owned())))
}

/// Parse an atom (function or variable name)
fn parse_atom(input: &str) -> IResult<&str, Value> {
    let (remaining, name) = take_while1(is_name_char).parse(input)?;
    Ok((remaining, Value::Atom(name.to_owned())))
}

/// Parse a string literal delimited by `'` or `"`
fn parse_string(input: &str) -> IResult<&str, Value> {
    let (remaining, text) = alt((
        delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
        delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
    ))
    .parse(input)?;
    Ok((remaining, Value::Str(text.to_owned())))
}

/// Parse a quote. The first item run is the pattern if a `|` follows it,
/// otherwise it is the body; each nesting level is parsed exactly once.
fn parse_quote<'a>(
    input: &'a str,
    config: &ParseConfig,
    depth: usize,
) -> IResult<&'a str, Value> {
    let (input, _) = char('[').parse(input)?;

    if depth >= config.max_depth {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::TooLarge,
        )));
    }

    let (input, first) = parse_items(input, config, depth + 1)?;
    let (input, bar) = opt(char('|')).parse(input)?;

    let (input, quote) = if bar.is_some() {
        let (input, body) = parse_items(input, config, depth + 1)?;
        (input, Quote::new(first, body))
    } else {
        (input, Quote::from_body(first))
    };

    let (input, _) = char(']').parse(input)?;
    Ok((input, Value::Quote(quote)))
}

/// Parse a single item at the current position (no leading whitespace)
fn parse_item<'a>(input: &'a str, config: &ParseConfig, depth: usize) -> IResult<&'a str, Value> {
    alt((
        parse_number,
        parse_symbol,
        parse_string,
        |input| parse_quote(input, config, depth),
        parse_atom,
    ))
    .parse(input)
}

/// Parse zero or more items, consuming surrounding whitespace
fn parse_items<'a>(
    input: &'a str,
    config: &ParseConfig,
    depth: usize,
) -> IResult<&'a str, Vec<Value>> {
    terminated(
        many0(preceded(multispace0, |input| {
            parse_item(input, config, depth)
        })),
        multispace0,
    )
    .parse(input)
}

/// Explain why parsing stopped at `remaining`
fn diagnose_remaining(input: &str, remaining: &str) -> ParseError {
    let offset = input.len() - remaining.len();
    let (kind, message) = match remaining.chars().next() {
        Some(delim @ ('\'' | '"')) if !remaining[1..].contains(delim) => (
            ParseErrorKind::Incomplete,
            format!("Unterminated string starting at position {offset}"),
        ),
        Some('[') if !brackets_balance(remaining) => (
            ParseErrorKind::Incomplete,
            format!("Unclosed quote starting at position {offset}"),
        ),
        Some('[') => (
            ParseErrorKind::InvalidSyntax,
            format!("Malformed quote at position {offset}"),
        ),
        Some(']') => (
            ParseErrorKind::InvalidSyntax,
            format!("Unexpected ']' at position {offset}"),
        ),
        Some('|') => (
            ParseErrorKind::InvalidSyntax,
            format!("Unexpected '|' outside a quote at position {offset}"),
        ),
        Some(':') => (
            ParseErrorKind::InvalidSyntax,
            format!("Expected a symbol name after ':' at position {offset}"),
        ),
        _ => (
            ParseErrorKind::TrailingContent,
            format!("Unexpected input at position {offset}"),
        ),
    };
    ParseError::with_context(kind, message, input, offset)
}

/// Whether every `[` in `text` is closed, ignoring brackets inside strings
fn brackets_balance(text: &str) -> bool {
    let mut depth = 0usize;
    let mut in_string: Option<char> = None;
    for c in text.chars() {
        match (in_string, c) {
            (Some(delim), c) if c == delim => in_string = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => in_string = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, _) => {}
        }
    }
    depth == 0 && in_string.is_none()
}

/// Parse a complete Quark program from input.
pub fn parse_quark(input: &str) -> Result<Vec<Value>, Error> {
    parse_quark_with_config(input, &ParseConfig::default())
}

/// Parse a complete Quark program with explicit parser settings.
pub fn parse_quark_with_config(input: &str, config: &ParseConfig) -> Result<Vec<Value>, Error> {
    match parse_items(input, config, 0) {
        Ok(("", items)) => Ok(items),
        Ok((remaining, _)) => Err(Error::ParseError(diagnose_remaining(input, remaining))),
        Err(nom::Err::Failure(e)) if e.code == ErrorKind::TooLarge => {
            Err(Error::ParseError(ParseError::with_context(
                ParseErrorKind::TooDeeplyNested,
                format!(
                    "Quote nesting too deep (max depth: {})",
                    config.max_depth
                ),
                input,
                input.len() - e.input.len(),
            )))
        }
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
            Err(Error::ParseError(diagnose_remaining(input, e.input)))
        }
        Err(nom::Err::Incomplete(_)) => Err(Error::ParseError(ParseError::from_message(
            ParseErrorKind::Incomplete,
            "Unexpected end of input",
        ))),
    }
}
