pub mod environment;
pub mod intooperation;

pub use environment::Environment;

use std::rc::Rc;
use std::sync::Arc;

use crate::Error;
use crate::{MAX_EVAL_DEPTH, MAX_SEQ_LENGTH};
use crate::ast::{Closure, HashTable, Symbol, Value};
use crate::builtinops::{CONSTANTS, OpKind, PRELUDE, SpecialForm, find_special_form, get_builtin_ops};

/// Evaluate an expression (public API)
pub fn eval(expr: &Value, env: &Environment) -> Result<Value, Error> {
    eval_with_depth_tracking(expr, env, 0)
}

/// Invoke a procedure value on already-evaluated arguments.
///
/// Hosts use this to call closures or builtins obtained from an evaluation.
pub fn apply(func: &Value, args: Vec<Value>) -> Result<Value, Error> {
    apply_with_depth_tracking(func, args, 0)
}

/// Evaluate an expression with depth tracking to prevent stack overflow
fn eval_with_depth_tracking(expr: &Value, env: &Environment, depth: usize) -> Result<Value, Error> {
    if depth >= MAX_EVAL_DEPTH {
        return Err(Error::EvalLimit(MAX_EVAL_DEPTH));
    }
    match expr {
        // Variable lookup
        Value::Symbol(name) => env.lookup(name.as_str()),

        // Special form or procedure application
        Value::List(elements) => {
            eval_list(elements, env, depth).map_err(|err| add_context(err, expr))
        }

        // Everything else evaluates to itself
        Value::Integer(_)
        | Value::Float(_)
        | Value::String(_)
        | Value::Bool(_)
        | Value::Nil
        | Value::BuiltinFunction { .. }
        | Value::Closure(_)
        | Value::Table(_) => Ok(expr.clone()),
    }
}

const CONTEXT_MARKER: &str = "\n  Context: ";

/// Attach the innermost failing expression to type and arithmetic errors
fn add_context(error: Error, expr: &Value) -> Error {
    match error {
        Error::TypeMismatch(msg) if !msg.contains(CONTEXT_MARKER) => {
            Error::TypeMismatch(format!("{msg}{CONTEXT_MARKER}while evaluating: {expr}"))
        }
        Error::Arithmetic(msg) if !msg.contains(CONTEXT_MARKER) => {
            Error::Arithmetic(format!("{msg}{CONTEXT_MARKER}while evaluating: {expr}"))
        }
        other => other,
    }
}

/// Helper function to evaluate a list of argument expressions with depth tracking
fn eval_args(args: &[Value], env: &Environment, depth: usize) -> Result<Vec<Value>, Error> {
    args.iter()
        .map(|arg| eval_with_depth_tracking(arg, env, depth + 1))
        .collect()
}

/// Evaluate a sequence: the empty sequence is nil, a reserved head is a
/// special form, anything else is a procedure application.
fn eval_list(elements: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    let [head, arg_exprs @ ..] = elements else {
        return Ok(Value::Nil);
    };

    if let Value::Symbol(name) = head {
        if let Some((form, op)) = find_special_form(name.as_str()) {
            op.validate_arity(arg_exprs.len()).map_err(|_| {
                Error::arity_error_with_expr(
                    op.arity,
                    arg_exprs.len(),
                    Value::List(elements.to_vec()).to_string(),
                )
            })?;
            return eval_special_form(form, arg_exprs, env, depth);
        }
    }

    let func = eval_with_depth_tracking(head, env, depth + 1)?;
    let args = eval_args(arg_exprs, env, depth)?;
    apply_with_depth_tracking(&func, args, depth + 1)
}

fn eval_special_form(
    form: SpecialForm,
    args: &[Value],
    env: &Environment,
    depth: usize,
) -> Result<Value, Error> {
    match form {
        SpecialForm::Quote => eval_quote(args),
        SpecialForm::Lambda => eval_lambda(args, env),
        SpecialForm::Define => eval_define(args, env, depth),
        SpecialForm::Set => eval_set(args, env, depth),
        SpecialForm::If => eval_if(args, env, depth),
        SpecialForm::Cond => eval_cond(args, env, depth),
        SpecialForm::And => eval_and(args, env, depth),
        SpecialForm::Or => eval_or(args, env, depth),
        SpecialForm::Let => eval_let(args, env, depth),
        SpecialForm::Map => eval_map(args, env, depth),
        SpecialForm::Seq => eval_seq(args, env, depth),
        SpecialForm::GetHash => eval_gethash(args, env, depth),
    }
}

fn apply_with_depth_tracking(func: &Value, args: Vec<Value>, depth: usize) -> Result<Value, Error> {
    if depth >= MAX_EVAL_DEPTH {
        return Err(Error::EvalLimit(MAX_EVAL_DEPTH));
    }
    match func {
        Value::BuiltinFunction { func, .. } => func(args).map(Value::canonicalize),
        Value::Closure(closure) => {
            tracing::trace!(
                params = closure.params.len(),
                args = args.len(),
                depth,
                "apply closure"
            );
            // Extra arguments are ignored, missing parameters stay unbound.
            let frame = Environment::with_parent(&closure.env);
            for (param, arg) in closure.params.iter().zip(args) {
                frame.define(param.as_str(), arg)?;
            }
            eval_with_depth_tracking(&closure.body, &frame, depth + 1)
        }
        other => Err(Error::TypeMismatch(format!(
            "cannot apply non-procedure: {} {other}",
            other.type_name()
        ))),
    }
}

//
// Special forms. Arity has been checked against the registry before dispatch.
//

fn eval_quote(args: &[Value]) -> Result<Value, Error> {
    match args {
        [expr] => Ok(expr.clone()),
        _ => Err(Error::MalformedForm("quote takes one expression".to_owned())),
    }
}

fn eval_lambda(args: &[Value], env: &Environment) -> Result<Value, Error> {
    let [param_list, body] = args else {
        return Err(Error::MalformedForm(
            "lambda requires a parameter list and a body".to_owned(),
        ));
    };
    let param_exprs: &[Value] = match param_list {
        Value::List(params) => params,
        Value::Nil => &[],
        other => {
            return Err(Error::MalformedForm(format!(
                "lambda parameters must be a sequence of symbols, got {other}"
            )));
        }
    };

    let mut params: Vec<Symbol> = Vec::with_capacity(param_exprs.len());
    for param in param_exprs {
        match param {
            Value::Symbol(name) => {
                if params.contains(name) {
                    return Err(Error::MalformedForm(format!(
                        "duplicate parameter name: {name}"
                    )));
                }
                params.push(name.clone());
            }
            other => {
                return Err(Error::MalformedForm(format!(
                    "lambda parameters must be symbols, got {other}"
                )));
            }
        }
    }

    Ok(Value::Closure(Rc::new(Closure {
        params,
        body: body.clone(),
        env: env.clone(),
    })))
}

fn eval_define(args: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let value = eval_with_depth_tracking(expr, env, depth + 1)?;
            env.define(name.as_str(), value)?;
            Ok(Value::Symbol(name.clone()))
        }
        [other, _] => Err(Error::MalformedForm(format!(
            "define requires a symbol, got {other}"
        ))),
        _ => Err(Error::MalformedForm("define requires a name and a value".to_owned())),
    }
}

/// `(set name expr)` or `(set (gethash key table) expr)`; returns the stored value.
fn eval_set(args: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    let [place, expr] = args else {
        return Err(Error::MalformedForm("set requires a place and a value".to_owned()));
    };
    match place {
        Value::Symbol(name) => {
            let value = eval_with_depth_tracking(expr, env, depth + 1)?;
            env.set(name.as_str(), value.clone())?;
            Ok(value)
        }
        Value::List(elements) => match elements.as_slice() {
            [Value::Symbol(head), key_expr, table_expr] if head.as_str() == "gethash" => {
                let key = eval_with_depth_tracking(key_expr, env, depth + 1)?;
                let table = eval_table(table_expr, env, depth)?;
                let value = eval_with_depth_tracking(expr, env, depth + 1)?;
                table.insert(&key, value.clone())?;
                Ok(value)
            }
            _ => Err(invalid_place(place)),
        },
        _ => Err(invalid_place(place)),
    }
}

fn invalid_place(place: &Value) -> Error {
    Error::TypeMismatch(format!(
        "set target must be a symbol or (gethash key table), got {place}"
    ))
}

fn eval_table(expr: &Value, env: &Environment, depth: usize) -> Result<HashTable, Error> {
    HashTable::try_from(eval_with_depth_tracking(expr, env, depth + 1)?)
}

fn eval_if(args: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    let (condition_expr, then_expr, else_expr) = match args {
        [condition, then] => (condition, then, None),
        [condition, then, otherwise] => (condition, then, Some(otherwise)),
        _ => return Err(Error::MalformedForm("if requires 2 or 3 expressions".to_owned())),
    };

    if eval_with_depth_tracking(condition_expr, env, depth + 1)?.is_truthy() {
        eval_with_depth_tracking(then_expr, env, depth + 1)
    } else {
        match else_expr {
            Some(expr) => eval_with_depth_tracking(expr, env, depth + 1),
            None => Ok(Value::Nil),
        }
    }
}

fn eval_cond(args: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    let clauses = args
        .iter()
        .map(|clause| match clause {
            Value::List(parts) => match parts.as_slice() {
                [test, result] => Ok((test, result)),
                _ => Err(malformed_clause(clause)),
            },
            _ => Err(malformed_clause(clause)),
        })
        .collect::<Result<Vec<_>, Error>>()?;

    for (test, result) in clauses {
        if eval_with_depth_tracking(test, env, depth + 1)?.is_truthy() {
            return eval_with_depth_tracking(result, env, depth + 1);
        }
    }
    Ok(Value::Nil)
}

fn malformed_clause(clause: &Value) -> Error {
    Error::MalformedForm(format!("cond clause must be (test expr), got {clause}"))
}

fn eval_and(args: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    let mut last = Value::Bool(true);
    for arg in args {
        last = eval_with_depth_tracking(arg, env, depth + 1)?;
        if !last.is_truthy() {
            return Ok(Value::Nil);
        }
    }
    Ok(last)
}

fn eval_or(args: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    for arg in args {
        let value = eval_with_depth_tracking(arg, env, depth + 1)?;
        if value.is_truthy() {
            return Ok(value);
        }
    }
    Ok(Value::Nil)
}

/// `(let ((name expr) ...) body ...)`: all `expr`s are evaluated in the outer
/// environment before any binding is made.
fn eval_let(args: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    let [bindings, body @ ..] = args else {
        return Err(Error::MalformedForm("let requires a binding list".to_owned()));
    };
    let binding_exprs: &[Value] = match bindings {
        Value::List(items) => items,
        Value::Nil => &[],
        other => {
            return Err(Error::MalformedForm(format!(
                "let bindings must be a sequence, got {other}"
            )));
        }
    };

    let mut values = Vec::with_capacity(binding_exprs.len());
    for binding in binding_exprs {
        match binding {
            Value::List(parts) => match parts.as_slice() {
                [Value::Symbol(name), expr] => {
                    values.push((name, eval_with_depth_tracking(expr, env, depth + 1)?));
                }
                _ => return Err(malformed_binding(binding)),
            },
            _ => return Err(malformed_binding(binding)),
        }
    }

    let frame = Environment::with_parent(env);
    for (name, value) in values {
        frame.define(name.as_str(), value)?;
    }

    let mut result = Value::Nil;
    for expr in body {
        result = eval_with_depth_tracking(expr, &frame, depth + 1)?;
    }
    Ok(result)
}

fn malformed_binding(binding: &Value) -> Error {
    Error::MalformedForm(format!("let binding must be (name expr), got {binding}"))
}

/// `(map proc seq ...)`: apply `proc` across the sequences, stopping at the shortest.
fn eval_map(args: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    let [proc_expr, seq_exprs @ ..] = args else {
        return Err(Error::MalformedForm("map requires a procedure".to_owned()));
    };
    let procedure = eval_with_depth_tracking(proc_expr, env, depth + 1)?;

    let mut sequences = Vec::with_capacity(seq_exprs.len());
    for expr in seq_exprs {
        match eval_with_depth_tracking(expr, env, depth + 1)? {
            Value::List(items) => sequences.push(items),
            Value::Nil => sequences.push(Vec::new()),
            other => {
                return Err(Error::TypeMismatch(format!(
                    "map requires sequences, got {} {other}",
                    other.type_name()
                )));
            }
        }
    }

    let count = sequences.iter().map(Vec::len).min().unwrap_or(0);
    let mut results = Vec::with_capacity(count);
    for i in 0..count {
        let call_args = sequences.iter().map(|seq| seq[i].clone()).collect();
        results.push(apply_with_depth_tracking(&procedure, call_args, depth + 1)?);
    }
    Ok(Value::List(results))
}

/// `(seq n)` is `[0, n)`, `(seq start n)` is `[start, n)`.
fn eval_seq(args: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    let bounds: Vec<i64> = eval_args(args, env, depth)?
        .into_iter()
        .map(TryInto::try_into)
        .collect::<Result<_, Error>>()?;
    let (start, end) = match bounds.as_slice() {
        [end] => (0, *end),
        [start, end] => (*start, *end),
        _ => return Err(Error::MalformedForm("seq requires 1 or 2 bounds".to_owned())),
    };
    let length = i128::from(end) - i128::from(start);
    if length > 0 && usize::try_from(length).ok().is_none_or(|n| n > MAX_SEQ_LENGTH) {
        return Err(Error::Arithmetic(format!(
            "seq range of {length} elements exceeds the maximum of {MAX_SEQ_LENGTH}"
        )));
    }
    Ok(Value::List((start..end).map(Value::Integer).collect()))
}

fn eval_gethash(args: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    let [key_expr, table_expr] = args else {
        return Err(Error::MalformedForm("gethash requires a key and a table".to_owned()));
    };
    let key = eval_with_depth_tracking(key_expr, env, depth + 1)?;
    let table = eval_table(table_expr, env, depth)?;
    Ok(table.get(&key)?.unwrap_or(Value::Nil))
}

/// Create a fresh top-level environment.
///
/// Builtins, constants and the standard procedures live in a library frame;
/// the returned frame is its child, so user definitions shadow library names
/// instead of colliding with them. Every call builds an independent pair.
pub fn create_global_env() -> Environment {
    let library = Environment::new();

    for builtin_op in get_builtin_ops() {
        if let OpKind::Function(func) = &builtin_op.op_kind {
            library.bind(
                builtin_op.id,
                Value::BuiltinFunction {
                    id: builtin_op.id.to_owned(),
                    func: Arc::clone(func),
                },
            );
        }
    }

    for (name, value) in CONSTANTS {
        library.bind(name, value());
    }

    for source in PRELUDE {
        if let Err(err) = crate::evaluate_source(source, &library) {
            tracing::error!(%err, source, "failed to load standard procedure");
        }
    }

    tracing::debug!(
        bindings = library.get_all_bindings().len(),
        "library environment ready"
    );
    Environment::with_parent(&library)
}
