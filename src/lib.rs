//! sexpeval - a small embeddable S-expression interpreter
//!
//! This crate reads textual S-expressions, builds an expression tree, and evaluates
//! it against a chain of lexically scoped environments. It supports user-defined
//! closures, a fixed set of special forms, and a small builtin library:
//!
//! ```lisp
//! (+ 2 3)                                         ; 5
//! (define fact (lambda (x) (if (<= x 2) x (* x (fact (- x 1))))))
//! (fact 6)                                        ; 720
//! (map (lambda (x y) (* x y)) '(1 2 3) '(9 20 7)) ; (9 40 21)
//! (let ((x 22) (y 11)) (* x y))                   ; 242
//! ```
//!
//! ## Truthiness
//!
//! `nil` is the only falsy value the language surfaces. Builtins that produce a
//! boolean `false` (comparisons, `not`, `null?`) have it canonicalized to `nil`
//! before the result reaches the caller, and every other value is truthy.
//!
//! ## Entry points
//!
//! ```
//! use sexpeval::evaluator::create_global_env;
//! use sexpeval::ast::Value;
//!
//! let env = create_global_env();
//! let value = sexpeval::evaluate_source("(* 6 7)", &env).unwrap();
//! assert_eq!(value, Value::Integer(42));
//! ```
//!
//! ## Modules
//!
//! - `ast`: value model shared by code and data
//! - `reader`: tokenizer, recursive-descent parser and balance check
//! - `evaluator`: environments, special forms and procedure application
//! - `builtinops`: builtin function library and the special-form table

use crate::builtinops::Arity;

/// Maximum parsing depth to prevent stack overflow on deeply nested input
pub const MAX_PARSE_DEPTH: usize = 256;

/// Maximum evaluation depth to prevent stack overflow in recursive evaluation.
/// Every nested evaluation step counts, so a recursive procedure uses a few
/// levels per call; simple recursions get several hundred calls deep.
pub const MAX_EVAL_DEPTH: usize = 3000;

/// Stack size for a thread that may evaluate up to [`MAX_EVAL_DEPTH`] levels,
/// with headroom for unoptimized builds.
pub const EVAL_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Longest list `seq` will build
pub const MAX_SEQ_LENGTH: usize = 1 << 24;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (empty input, stray close paren)
    InvalidSyntax,
    /// Input ended before the expression was complete (unclosed parens or string)
    Incomplete,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Extra input found after a complete, valid expression
    TrailingContent,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
#[error("{message}{}", found_suffix(.found))]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// The problematic token encountered, if identifiable
    pub found: Option<String>,
}

fn found_suffix(found: &Option<String>) -> String {
    match found {
        Some(token) => format!(" (found '{token}')"),
        None => String::new(),
    }
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, found: Option<String>) -> Self {
        ParseError {
            kind,
            message: message.into(),
            found,
        }
    }

    /// Create a ParseError with a kind and message but no offending token
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None)
    }
}

/// Language-level error categories, independent of the message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SyntaxError,
    UndefinedSymbol,
    AlreadyDefined,
    TypeMismatch,
    ArityOrShape,
    Arithmetic,
    EvalLimit,
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("SyntaxError: {0}")]
    Parse(#[from] ParseError),
    #[error("Undefined symbol: {0}")]
    UndefinedSymbol(String),
    #[error("Symbol already defined in this scope: {0}")]
    AlreadyDefined(String),
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    #[error("ArityError: {}expected {expected} arguments, got {got}", expression_prefix(.expression))]
    ArityError {
        expected: Arity,
        got: usize,
        expression: Option<String>, // Optional expression context
    },
    #[error("Malformed form: {0}")]
    MalformedForm(String),
    #[error("Arithmetic error: {0}")]
    Arithmetic(String),
    #[error("Evaluation depth limit exceeded (max: {0})")]
    EvalLimit(usize),
}

fn expression_prefix(expression: &Option<String>) -> String {
    match expression {
        Some(expr) => format!("expression {expr}: "),
        None => String::new(),
    }
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: Arity, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityError with expression context
    pub fn arity_error_with_expr(expected: Arity, got: usize, expression: String) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: Some(expression),
        }
    }

    /// TypeMismatch naming the expected type and the offending value with its type
    pub fn type_mismatch(expected: &str, found: &ast::Value) -> Self {
        Error::TypeMismatch(format!("expected {expected}, got {} {found}", found.type_name()))
    }

    /// Shorthand for a syntax error of the given kind
    pub(crate) fn syntax(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Error::Parse(ParseError::from_message(kind, message))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Parse(_) => ErrorKind::SyntaxError,
            Error::UndefinedSymbol(_) => ErrorKind::UndefinedSymbol,
            Error::AlreadyDefined(_) => ErrorKind::AlreadyDefined,
            Error::TypeMismatch(_) => ErrorKind::TypeMismatch,
            Error::ArityError { .. } | Error::MalformedForm(_) => ErrorKind::ArityOrShape,
            Error::Arithmetic(_) => ErrorKind::Arithmetic,
            Error::EvalLimit(_) => ErrorKind::EvalLimit,
        }
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod reader;

/// Parse `source` and evaluate the resulting expression in `env`.
pub fn evaluate_source(
    source: &str,
    env: &evaluator::Environment,
) -> Result<ast::Value, Error> {
    let expr = reader::parse(source)?;
    evaluator::eval(&expr, env)
}
