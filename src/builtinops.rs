//! Built-in operations registry: the native function library and the table of
//! reserved special-form heads.
//!
//! ## Functions vs Special Forms
//!
//! - **Functions**: evaluate all arguments before application (e.g. `+`, `car`,
//!   `make-hash-table`). They are installed into the library frame by
//!   [`create_global_env`](crate::evaluator::create_global_env) and can be passed
//!   around, shadowed, or called through any expression that evaluates to them.
//! - **Special Forms**: control evaluation of their arguments (e.g. `if`, `let`,
//!   `and`). They are resolved by exact head name before any environment lookup,
//!   so a user binding can never replace them.
//!
//! ## Error Handling
//!
//! - **Arity**: every entry carries an [`Arity`] that is checked before the
//!   implementation runs.
//! - **Types**: arguments are converted through the typed adapter layer, so a
//!   wrong argument type is a `TypeMismatch` rather than a silent coercion.
//! - **Arithmetic**: integer operations are checked; overflow and division by zero
//!   are reported instead of wrapping. Mixed integer/float arithmetic yields floats.
//!
//! ## Adding New Operations
//!
//! 1. Implement the function with typed parameters (`Number`, `Value`, `&str`,
//!    `HashTable`, or a rest iterator such as `NumIter<'_>`)
//! 2. Add it to `BUILTIN_OPS` with its identifier and arity
//! 3. Add tests covering edge cases and error conditions

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::Error;
use crate::ast::{HashTable, Number, Value};
use crate::evaluator::intooperation::{
    IntoOperation, IntoVariadicOperation, NumIter, OperationFn, StringIter, ValueIter,
};

/// Number of arguments an operation accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive bounds
    Range(usize, usize),
}

impl Arity {
    pub fn validate(&self, arg_count: usize) -> Result<(), Error> {
        let ok = match *self {
            Arity::Exact(n) => arg_count == n,
            Arity::AtLeast(n) => arg_count >= n,
            Arity::Range(min, max) => (min..=max).contains(&arg_count),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::arity_error(*self, arg_count))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "between {min} and {max}"),
        }
    }
}

/// Reserved heads with their own evaluation rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialForm {
    Quote,
    Lambda,
    Define,
    Set,
    If,
    Cond,
    And,
    Or,
    Let,
    Map,
    Seq,
    GetHash,
}

/// Represents the implementation of a built-in operation (function or special form)
#[derive(Clone)]
pub enum OpKind {
    /// Regular function over evaluated arguments, via the canonical erased signature
    Function(Arc<OperationFn>),
    /// Special form handled by the evaluator on unevaluated arguments
    SpecialForm(SpecialForm),
}

impl fmt::Debug for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(form) => write!(f, "SpecialForm({form:?})"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The identifier this operation is bound to
    pub id: &'static str,
    pub op_kind: OpKind,
    /// Expected number of arguments
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl BuiltinOp {
    pub fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }

    /// Check if the given number of arguments is valid for this operation
    pub(crate) fn validate_arity(&self, arg_count: usize) -> Result<(), Error> {
        self.arity.validate(arg_count)
    }
}

//
// Builtin Function Implementations
//

fn overflow(operation: &str) -> Error {
    Error::Arithmetic(format!("integer overflow in {operation}"))
}

fn division_by_zero() -> Error {
    Error::Arithmetic("division by zero".to_owned())
}

/// Apply an integer operation when both operands are integers, else the float one.
fn arithmetic(
    a: Number,
    b: Number,
    operation: &str,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Number, Error> {
    match (a, b) {
        (Number::Integer(x), Number::Integer(y)) => int_op(x, y)
            .map(Number::Integer)
            .ok_or_else(|| overflow(operation)),
        _ => Ok(Number::Float(float_op(a.as_f64(), b.as_f64()))),
    }
}

fn builtin_add(args: NumIter<'_>) -> Result<Number, Error> {
    let mut sum = Number::Integer(0);
    for n in args {
        sum = arithmetic(sum, n, "addition", i64::checked_add, |x, y| x + y)?;
    }
    Ok(sum)
}

fn builtin_sub(first: Number, rest: NumIter<'_>) -> Result<Number, Error> {
    let mut iter = rest.peekable();

    if iter.peek().is_none() {
        return match first {
            Number::Integer(n) => n
                .checked_neg()
                .map(Number::Integer)
                .ok_or_else(|| overflow("negation")),
            Number::Float(x) => Ok(Number::Float(-x)),
        };
    }

    let mut result = first;
    for n in iter {
        result = arithmetic(result, n, "subtraction", i64::checked_sub, |x, y| x - y)?;
    }
    Ok(result)
}

fn builtin_mul(args: NumIter<'_>) -> Result<Number, Error> {
    let mut product = Number::Integer(1);
    for n in args {
        product = arithmetic(product, n, "multiplication", i64::checked_mul, |x, y| x * y)?;
    }
    Ok(product)
}

/// Integer operands use floor division; anything else divides as floats.
fn builtin_div(a: Number, b: Number) -> Result<Number, Error> {
    if b.as_f64() == 0.0 {
        return Err(division_by_zero());
    }
    arithmetic(
        a,
        b,
        "division",
        |x, y| {
            let q = x.checked_div(y)?;
            if x % y != 0 && ((x < 0) != (y < 0)) {
                Some(q - 1)
            } else {
                Some(q)
            }
        },
        |x, y| x / y,
    )
}

/// Remainder takes the sign of the divisor.
fn builtin_mod(a: Number, b: Number) -> Result<Number, Error> {
    if b.as_f64() == 0.0 {
        return Err(division_by_zero());
    }
    arithmetic(
        a,
        b,
        "modulo",
        |x, y| {
            let r = x.wrapping_rem(y);
            if r != 0 && ((r < 0) != (y < 0)) {
                Some(r + y)
            } else {
                Some(r)
            }
        },
        |x, y| {
            let r = x % y;
            if r != 0.0 && ((r < 0.0) != (y < 0.0)) {
                r + y
            } else {
                r
            }
        },
    )
}

fn builtin_pow(base: Number, exponent: Number) -> Result<Number, Error> {
    match (base, exponent) {
        (Number::Integer(b), Number::Integer(e)) if e >= 0 => {
            let e = u32::try_from(e).map_err(|_| overflow("exponentiation"))?;
            b.checked_pow(e)
                .map(Number::Integer)
                .ok_or_else(|| overflow("exponentiation"))
        }
        _ => Ok(Number::Float(base.as_f64().powf(exponent.as_f64()))),
    }
}

// Chained numeric comparisons: all adjacent pairs must satisfy the comparison.
macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(first: Number, rest: NumIter<'_>) -> bool {
            let mut prev = first;
            for current in rest {
                if !(prev $op current) {
                    return false;
                }
                prev = current;
            }
            true
        }
    };
}

numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_le, <=);
numeric_comparison!(builtin_ge, >=);

fn builtin_equal(first: Value, rest: ValueIter<'_>) -> bool {
    let mut prev = &first;
    for current in rest {
        if !prev.equals(current) {
            return false;
        }
        prev = current;
    }
    true
}

fn builtin_not(value: Value) -> bool {
    !value.is_truthy()
}

fn builtin_abs(n: Number) -> Result<Number, Error> {
    match n {
        Number::Integer(i) => i
            .checked_abs()
            .map(Number::Integer)
            .ok_or_else(|| overflow("abs")),
        Number::Float(x) => Ok(Number::Float(x.abs())),
    }
}

fn builtin_sqrt(n: Number) -> Result<Number, Error> {
    let x = n.as_f64();
    if x < 0.0 {
        return Err(Error::Arithmetic(format!("square root of negative number {x}")));
    }
    Ok(Number::Float(x.sqrt()))
}

fn builtin_max(first: Number, rest: NumIter<'_>) -> Number {
    rest.fold(first, |acc, n| if n > acc { n } else { acc })
}

fn builtin_min(first: Number, rest: NumIter<'_>) -> Number {
    rest.fold(first, |acc, n| if n < acc { n } else { acc })
}

fn builtin_list(args: ValueIter<'_>) -> Value {
    Value::List(args.cloned().collect())
}

fn builtin_car(mut list: ValueIter<'_>) -> Result<Value, Error> {
    match list.next() {
        Some(first) => Ok(first.clone()),
        None => Err(Error::TypeMismatch("car of empty sequence".into())),
    }
}

fn builtin_cdr(mut list: ValueIter<'_>) -> Result<Value, Error> {
    let Some(_) = list.next() else {
        return Err(Error::TypeMismatch("cdr of empty sequence".into()));
    };
    Ok(Value::List(list.cloned().collect()))
}

fn builtin_cons(first: Value, rest: Value) -> Result<Value, Error> {
    match rest {
        Value::List(tail) => {
            let mut new_list = Vec::with_capacity(tail.len() + 1);
            new_list.push(first);
            new_list.extend(tail);
            Ok(Value::List(new_list))
        }
        Value::Nil => Ok(Value::List(vec![first])),
        other => Err(Error::TypeMismatch(format!(
            "cons requires a sequence as second argument, got {} {other}",
            other.type_name()
        ))),
    }
}

fn builtin_append(args: ValueIter<'_>) -> Result<Value, Error> {
    let mut result = Vec::new();
    for arg in args {
        match arg {
            Value::List(items) => result.extend(items.iter().cloned()),
            Value::Nil => {}
            other => {
                return Err(Error::TypeMismatch(format!(
                    "append requires sequences, got {} {other}",
                    other.type_name()
                )));
            }
        }
    }
    Ok(Value::List(result))
}

fn builtin_length(value: Value) -> Result<usize, Error> {
    match value {
        Value::List(items) => Ok(items.len()),
        Value::String(s) => Ok(s.chars().count()),
        Value::Nil => Ok(0),
        other => Err(Error::TypeMismatch(format!(
            "length requires a sequence or string, got {} {other}",
            other.type_name()
        ))),
    }
}

fn builtin_null(value: Value) -> bool {
    value.is_nil()
}

fn builtin_string_append(args: StringIter<'_>) -> String {
    args.collect()
}

fn builtin_make_hash_table() -> HashTable {
    HashTable::new()
}

fn builtin_remhash(key: Value, table: HashTable) -> Result<bool, Error> {
    Ok(table.remove(&key)?.is_some())
}

fn builtin_hash_table_count(table: HashTable) -> usize {
    table.len()
}

fn builtin_fixed<Args, F>(f: F) -> Arc<OperationFn>
where
    F: IntoOperation<Args>,
{
    <F as IntoOperation<Args>>::into_operation(f)
}

/// Variadic adapters only know their fixed prefix, so the declared
/// arity is enforced here before the arguments are converted.
fn builtin_variadic<Args, F>(arity: Arity, f: F) -> Arc<OperationFn>
where
    F: IntoVariadicOperation<Args>,
{
    let inner = <F as IntoVariadicOperation<Args>>::into_variadic_operation(f);
    Arc::new(move |args: Vec<Value>| {
        arity.validate(args.len())?;
        inner(args)
    })
}

fn special_form(id: &'static str, form: SpecialForm, arity: Arity) -> BuiltinOp {
    BuiltinOp {
        id,
        op_kind: OpKind::SpecialForm(form),
        arity,
    }
}

fn function(id: &'static str, arity: Arity, func: Arc<OperationFn>) -> BuiltinOp {
    BuiltinOp {
        id,
        op_kind: OpKind::Function(func),
        arity,
    }
}

/// Global registry of all built-in operations, built once on first use.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    use Arity::{AtLeast, Exact, Range};

    vec![
        // Special forms
        special_form("quote", SpecialForm::Quote, Exact(1)),
        special_form("lambda", SpecialForm::Lambda, Exact(2)),
        special_form("define", SpecialForm::Define, Exact(2)),
        special_form("set", SpecialForm::Set, Exact(2)),
        special_form("if", SpecialForm::If, Range(2, 3)),
        special_form("cond", SpecialForm::Cond, AtLeast(0)),
        special_form("and", SpecialForm::And, AtLeast(0)),
        special_form("or", SpecialForm::Or, AtLeast(0)),
        special_form("let", SpecialForm::Let, AtLeast(1)),
        special_form("map", SpecialForm::Map, AtLeast(2)),
        special_form("seq", SpecialForm::Seq, Range(1, 2)),
        special_form("gethash", SpecialForm::GetHash, Exact(2)),
        // Arithmetic
        function(
            "+",
            AtLeast(0),
            builtin_variadic::<(NumIter<'static>,), _>(AtLeast(0), builtin_add),
        ),
        function(
            "-",
            AtLeast(1),
            builtin_variadic::<(Number, NumIter<'static>), _>(AtLeast(1), builtin_sub),
        ),
        function(
            "*",
            AtLeast(0),
            builtin_variadic::<(NumIter<'static>,), _>(AtLeast(0), builtin_mul),
        ),
        function("/", Exact(2), builtin_fixed::<(Number, Number), _>(builtin_div)),
        function("%", Exact(2), builtin_fixed::<(Number, Number), _>(builtin_mod)),
        function("^", Exact(2), builtin_fixed::<(Number, Number), _>(builtin_pow)),
        function("abs", Exact(1), builtin_fixed::<(Number,), _>(builtin_abs)),
        function("sqrt", Exact(1), builtin_fixed::<(Number,), _>(builtin_sqrt)),
        function(
            "max",
            AtLeast(1),
            builtin_variadic::<(Number, NumIter<'static>), _>(AtLeast(1), builtin_max),
        ),
        function(
            "min",
            AtLeast(1),
            builtin_variadic::<(Number, NumIter<'static>), _>(AtLeast(1), builtin_min),
        ),
        // Comparison
        function(
            "<",
            AtLeast(2),
            builtin_variadic::<(Number, NumIter<'static>), _>(AtLeast(2), builtin_lt),
        ),
        function(
            ">",
            AtLeast(2),
            builtin_variadic::<(Number, NumIter<'static>), _>(AtLeast(2), builtin_gt),
        ),
        function(
            "<=",
            AtLeast(2),
            builtin_variadic::<(Number, NumIter<'static>), _>(AtLeast(2), builtin_le),
        ),
        function(
            ">=",
            AtLeast(2),
            builtin_variadic::<(Number, NumIter<'static>), _>(AtLeast(2), builtin_ge),
        ),
        function(
            "=",
            AtLeast(2),
            builtin_variadic::<(Value, ValueIter<'static>), _>(AtLeast(2), builtin_equal),
        ),
        function("not", Exact(1), builtin_fixed::<(Value,), _>(builtin_not)),
        // Sequences
        function(
            "list",
            AtLeast(0),
            builtin_variadic::<(ValueIter<'static>,), _>(AtLeast(0), builtin_list),
        ),
        function("car", Exact(1), builtin_fixed::<(ValueIter<'static>,), _>(builtin_car)),
        function("first", Exact(1), builtin_fixed::<(ValueIter<'static>,), _>(builtin_car)),
        function("cdr", Exact(1), builtin_fixed::<(ValueIter<'static>,), _>(builtin_cdr)),
        function("rest", Exact(1), builtin_fixed::<(ValueIter<'static>,), _>(builtin_cdr)),
        function("cons", Exact(2), builtin_fixed::<(Value, Value), _>(builtin_cons)),
        function(
            "append",
            AtLeast(0),
            builtin_variadic::<(ValueIter<'static>,), _>(AtLeast(0), builtin_append),
        ),
        function("length", Exact(1), builtin_fixed::<(Value,), _>(builtin_length)),
        function("null?", Exact(1), builtin_fixed::<(Value,), _>(builtin_null)),
        // Strings
        function(
            "string-append",
            AtLeast(0),
            builtin_variadic::<(StringIter<'static>,), _>(AtLeast(0), builtin_string_append),
        ),
        // Hash tables
        function(
            "make-hash-table",
            Exact(0),
            builtin_fixed::<(), _>(builtin_make_hash_table),
        ),
        function(
            "remhash",
            Exact(2),
            builtin_fixed::<(Value, HashTable), _>(builtin_remhash),
        ),
        function(
            "hash-table-count",
            Exact(1),
            builtin_fixed::<(HashTable,), _>(builtin_hash_table_count),
        ),
    ]
});

/// Lazy static map from id to BuiltinOp (private - use find_op)
static BUILTIN_INDEX: LazyLock<HashMap<&'static str, &'static BuiltinOp>> =
    LazyLock::new(|| {
        let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
        ops.iter().map(|op| (op.id, op)).collect()
    });

/// Constants bound next to the builtin functions in the library frame
pub(crate) const CONSTANTS: &[(&str, fn() -> Value)] = &[
    ("True", || Value::Bool(true)),
    ("None", || Value::Nil),
    ("nil", || Value::Nil),
];

/// Standard procedures evaluated against the library frame at startup
pub(crate) const PRELUDE: &[&str] = &[
    "(define fact (lambda (x) (if (< x 2) x (* x (fact (- x 1))))))",
    "(define fib (lambda (x) (if (< x 2) x (+ (fib (- x 1)) (fib (- x 2))))))",
];

/// Get all builtin operations (for internal use by evaluator)
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by its identifier
pub fn find_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_INDEX.get(id).copied()
}

/// Resolve a reserved head symbol to its special form
pub(crate) fn find_special_form(id: &str) -> Option<(SpecialForm, &'static BuiltinOp)> {
    let op = find_op(id)?;
    match op.op_kind {
        OpKind::SpecialForm(form) => Some((form, op)),
        OpKind::Function(_) => None,
    }
}
