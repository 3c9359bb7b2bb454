//! Reader: tokenizer, recursive-descent parser and the balance check used by
//! interactive front ends.
//!
//! Tokenization treats `(`, `)`, `'` and `"` as self-delimiting and splits everything
//! else on whitespace. Parsing consumes the token sequence from the front with a single
//! shared cursor. String literals are read at the token level, so the words between
//! two `"` tokens are joined with single spaces and no escape processing happens.

use std::collections::VecDeque;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_till1, take_while},
    character::complete::one_of,
    combinator::recognize,
    multi::many0,
    sequence::{preceded, terminated},
};

use crate::ast::{Symbol, Value};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Characters that always form a token of their own
const DELIMITERS: &str = "()'\"";

/// Reader options
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseConfig {
    /// Treat `;` outside string literals as the start of a line comment
    pub handle_comments: bool,
}

/// Completeness of accumulated source text, as seen by a line-oriented front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Balance {
    /// Every open paren is closed; the text can be handed to [`parse`].
    Complete,
    /// More input is needed. `depth` counts unclosed parens.
    Open { depth: usize },
}

fn whitespace(input: &str) -> IResult<&str, &str> {
    take_while(char::is_whitespace).parse(input)
}

fn token(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(one_of(DELIMITERS)),
        take_till1(|c: char| c.is_whitespace() || DELIMITERS.contains(c)),
    ))
    .parse(input)
}

/// Split source text into tokens.
pub fn tokenize(text: &str) -> Result<Vec<String>, Error> {
    match terminated(many0(preceded(whitespace, token)), whitespace).parse(text) {
        Ok(("", tokens)) => Ok(tokens.into_iter().map(str::to_owned).collect()),
        Ok((remaining, _)) => Err(Error::Parse(ParseError::new(
            ParseErrorKind::InvalidSyntax,
            "unrecognized input",
            Some(remaining.chars().take(10).collect()),
        ))),
        Err(e) => Err(Error::syntax(
            ParseErrorKind::InvalidSyntax,
            format!("tokenizer failed: {e}"),
        )),
    }
}

/// Remove `;` line comments that are not inside a string literal.
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut in_comment = false;

    for ch in text.chars() {
        if in_comment {
            if ch == '\n' {
                in_comment = false;
                out.push(ch);
            }
            continue;
        }
        match ch {
            '"' => in_string = !in_string,
            ';' if !in_string => {
                in_comment = true;
                continue;
            }
            _ => {}
        }
        out.push(ch);
    }
    out
}

/// Parse a single complete expression.
pub fn parse(text: &str) -> Result<Value, Error> {
    parse_with_config(text, ParseConfig::default())
}

/// Parse a single complete expression with reader options.
pub fn parse_with_config(text: &str, config: ParseConfig) -> Result<Value, Error> {
    let tokens = if config.handle_comments {
        tokenize(&strip_comments(text))?
    } else {
        tokenize(text)?
    };

    if tokens.is_empty() {
        return Err(Error::syntax(ParseErrorKind::InvalidSyntax, "no input"));
    }

    let mut tokens = VecDeque::from(tokens);
    let form = read_form(&mut tokens, 0)?;

    if let Some(first) = tokens.front() {
        let rest: Vec<&str> = tokens.iter().map(String::as_str).collect();
        return Err(Error::Parse(ParseError::new(
            ParseErrorKind::TrailingContent,
            format!("unexpected data after parse: {}", rest.join(" ")),
            Some(first.clone()),
        )));
    }

    Ok(form)
}

fn read_form(tokens: &mut VecDeque<String>, depth: usize) -> Result<Value, Error> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(Error::syntax(
            ParseErrorKind::TooDeeplyNested,
            format!("expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
        ));
    }

    let Some(token) = tokens.pop_front() else {
        return Err(Error::syntax(
            ParseErrorKind::Incomplete,
            "unexpected end of input",
        ));
    };

    match token.as_str() {
        "'" => {
            let quoted = read_form(tokens, depth + 1)?;
            Ok(Value::List(vec![
                Value::Symbol(Symbol::new("quote")),
                quoted,
            ]))
        }
        "\"" => read_string(tokens),
        "(" => read_sequence(tokens, depth),
        ")" => Err(Error::Parse(ParseError::new(
            ParseErrorKind::InvalidSyntax,
            "unexpected close paren",
            Some(token),
        ))),
        _ => Ok(parse_atom(&token)),
    }
}

fn read_sequence(tokens: &mut VecDeque<String>, depth: usize) -> Result<Value, Error> {
    let mut elements = Vec::new();
    loop {
        match tokens.front().map(String::as_str) {
            None => {
                return Err(Error::syntax(
                    ParseErrorKind::Incomplete,
                    "unclosed '(': unexpected end of input",
                ));
            }
            Some(")") => {
                tokens.pop_front();
                return Ok(Value::List(elements));
            }
            Some(_) => elements.push(read_form(tokens, depth + 1)?),
        }
    }
}

fn read_string(tokens: &mut VecDeque<String>) -> Result<Value, Error> {
    let mut words = Vec::new();
    loop {
        match tokens.pop_front() {
            None => {
                return Err(Error::syntax(
                    ParseErrorKind::Incomplete,
                    "unterminated string literal",
                ));
            }
            Some(word) if word == "\"" => return Ok(Value::String(words.join(" "))),
            Some(word) => words.push(word),
        }
    }
}

/// Integer, then float (only when the token carries a digit, so `inf` and `nan`
/// stay symbols), otherwise a symbol.
fn parse_atom(token: &str) -> Value {
    if let Ok(n) = token.parse::<i64>() {
        return Value::Integer(n);
    }
    if token.bytes().any(|b| b.is_ascii_digit())
        && let Ok(x) = token.parse::<f64>()
    {
        return Value::Float(x);
    }
    Value::Symbol(Symbol::new(token))
}

/// Report whether `text` holds a complete expression or needs more lines.
pub fn balance(text: &str) -> Balance {
    balance_with_config(text, ParseConfig::default())
}

/// [`balance`] with reader options, so comments are ignored the same way the
/// parser ignores them.
pub fn balance_with_config(text: &str, config: ParseConfig) -> Balance {
    let tokens = if config.handle_comments {
        tokenize(&strip_comments(text))
    } else {
        tokenize(text)
    };
    // Let the parser report whatever the tokenizer could not handle.
    let Ok(tokens) = tokens else {
        return Balance::Complete;
    };

    let mut depth: usize = 0;
    let mut in_string = false;
    for token in &tokens {
        match token.as_str() {
            "\"" => in_string = !in_string,
            "(" if !in_string => depth += 1,
            ")" if !in_string => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    if depth > 0 || in_string {
        Balance::Open { depth }
    } else {
        Balance::Complete
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{sym, val};

    /// Test result variants for comprehensive parsing tests
    #[derive(Debug)]
    enum ParseTestResult {
        Success(Value),                // Parsing should succeed with this value
        SpecificError(&'static str),   // Parsing should fail with error containing this string
        ErrorKind(ParseErrorKind),     // Parsing should fail with this kind
    }
    use ParseTestResult::*;

    fn success<T: Into<Value>>(value: T) -> ParseTestResult {
        Success(value.into())
    }

    fn quoted(value: Value) -> Value {
        val(vec![sym("quote"), value])
    }

    fn run_parse_tests(test_cases: Vec<(&str, ParseTestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Parse test #{} ({input:?})", i + 1);
            match (parse(input), expected) {
                (Ok(actual), Success(expected_val)) => {
                    assert_eq!(actual, *expected_val, "{test_id}: value mismatch");
                }
                (Err(e), SpecificError(text)) => {
                    let msg = e.to_string();
                    assert!(msg.contains(text), "{test_id}: error should contain '{text}', got: {msg}");
                }
                (Err(Error::Parse(e)), ErrorKind(kind)) => {
                    assert_eq!(e.kind, *kind, "{test_id}: wrong parse error kind: {e}");
                }
                (Err(e), ErrorKind(_)) => panic!("{test_id}: expected parse error, got {e:?}"),
                (Ok(actual), _) => panic!("{test_id}: expected error, got {actual:?}"),
                (Err(e), Success(expected_val)) => {
                    panic!("{test_id}: expected {expected_val:?}, got error {e:?}")
                }
            }
        }
    }

    #[test]
    fn test_tokenize() {
        let cases: Vec<(&str, Vec<&str>)> = vec![
            ("(+ 2 3)", vec!["(", "+", "2", "3", ")"]),
            ("(- 3 2)", vec!["(", "-", "3", "2", ")"]),
            ("'(a b)", vec!["'", "(", "a", "b", ")"]),
            ("(f \"hi there\")", vec!["(", "f", "\"", "hi", "there", "\"", ")"]),
            ("  \n\t x  ", vec!["x"]),
            ("((a))", vec!["(", "(", "a", ")", ")"]),
            ("a'b", vec!["a", "'", "b"]),
            ("", vec![]),
        ];

        for (input, expected) in cases {
            assert_eq!(tokenize(input).unwrap(), expected, "tokenizing {input:?}");
        }
    }

    #[test]
    fn test_parse_data_driven() {
        let test_cases = vec![
            // === ATOMS ===
            ("42", success(42)),
            ("-271", success(-271)),
            ("+5", success(5)),
            ("2.5", success(2.5)),
            ("-0.5", success(-0.5)),
            ("1e3", success(1000.0)),
            ("9223372036854775807", success(i64::MAX)),
            ("99999999999999999999", success(99999999999999999999.0)),
            ("foo", Success(sym("foo"))),
            ("<=", Success(sym("<="))),
            ("-", Success(sym("-"))),
            ("inf", Success(sym("inf"))),
            ("nan", Success(sym("nan"))),
            ("True", Success(sym("True"))),
            // === STRINGS ===
            ("\"hello\"", success("hello")),
            ("\"hello   world\"", success("hello world")),
            ("\"\"", success("")),
            ("\"a(b\"", success("a ( b")),
            // === SEQUENCES ===
            ("()", Success(val(Vec::<Value>::new()))),
            ("(+ 2 3)", Success(val(vec![sym("+"), val(2), val(3)]))),
            (
                "(define x (lambda (y) y))",
                Success(val(vec![
                    sym("define"),
                    sym("x"),
                    val(vec![sym("lambda"), val(vec![sym("y")]), sym("y")]),
                ])),
            ),
            ("  ( a  ( b ) )  ", Success(val(vec![sym("a"), val(vec![sym("b")])]))),
            // === QUOTE SHORTHAND ===
            ("'x", Success(quoted(sym("x")))),
            (
                "'(a b c)",
                Success(quoted(val(vec![sym("a"), sym("b"), sym("c")]))),
            ),
            ("''x", Success(quoted(quoted(sym("x"))))),
            (
                "(f '(1 2) 'y)",
                Success(val(vec![
                    sym("f"),
                    quoted(val([1, 2])),
                    quoted(sym("y")),
                ])),
            ),
            // === ERRORS ===
            ("", SpecificError("no input")),
            ("   ", ErrorKind(ParseErrorKind::InvalidSyntax)),
            ("(+ 1 2", ErrorKind(ParseErrorKind::Incomplete)),
            ("((a)", ErrorKind(ParseErrorKind::Incomplete)),
            (")", SpecificError("unexpected close paren")),
            ("(a))", ErrorKind(ParseErrorKind::TrailingContent)),
            ("(a) (b)", SpecificError("unexpected data after parse: ( b )")),
            ("1 2", ErrorKind(ParseErrorKind::TrailingContent)),
            ("\"open", SpecificError("unterminated string")),
            ("'", ErrorKind(ParseErrorKind::Incomplete)),
            ("')", ErrorKind(ParseErrorKind::InvalidSyntax)),
        ];

        run_parse_tests(test_cases);
    }

    #[test]
    fn test_quote_shorthand_matches_long_form() {
        assert_eq!(parse("'(a b c)").unwrap(), parse("(quote (a b c))").unwrap());
    }

    #[test]
    fn test_nesting_limit() {
        let ok = format!("{}x{}", "(".repeat(100), ")".repeat(100));
        assert!(parse(&ok).is_ok());

        let deep = format!("{}x{}", "(".repeat(MAX_PARSE_DEPTH + 1), ")".repeat(MAX_PARSE_DEPTH + 1));
        match parse(&deep) {
            Err(Error::Parse(e)) => assert_eq!(e.kind, ParseErrorKind::TooDeeplyNested),
            other => panic!("expected nesting error, got {other:?}"),
        }
    }

    #[test]
    fn test_comments() {
        let config = ParseConfig {
            handle_comments: true,
        };
        let source = "(+ 1 ; first operand\n 2) ; trailing";
        assert_eq!(
            parse_with_config(source, config).unwrap(),
            val(vec![sym("+"), val(1), val(2)])
        );
        assert_eq!(
            parse_with_config("\"a ; b\"", config).unwrap(),
            val("a ; b")
        );
        // Without comment handling ';' is an ordinary symbol character.
        assert_eq!(parse("(a;b)").unwrap(), val(vec![sym("a;b")]));
    }

    #[test]
    fn test_balance() {
        let cases = vec![
            ("(+ 2 3)", Balance::Complete),
            ("42", Balance::Complete),
            ("", Balance::Complete),
            ("(define f", Balance::Open { depth: 1 }),
            ("(define f (lambda (x)", Balance::Open { depth: 2 }),
            ("(f \"(\"", Balance::Open { depth: 1 }),
            ("(f \")\")", Balance::Complete),
            ("(f \"open", Balance::Open { depth: 1 }),
            ("\"open", Balance::Open { depth: 0 }),
            ("(a))", Balance::Complete),
        ];

        for (input, expected) in cases {
            assert_eq!(balance(input), expected, "balance of {input:?}");
        }

        let config = ParseConfig {
            handle_comments: true,
        };
        assert_eq!(balance_with_config("(a ; )", config), Balance::Open { depth: 1 });
    }
}
