//! This module defines the core value types shared by code and data. The main enum,
//! [`Value`], covers every datum an expression can evaluate to: numbers, symbols,
//! strings, booleans, nil, sequences, builtin functions, closures and hash tables.
//! Parsed programs use the same representation, which is why `quote` can hand back a
//! sub-tree of the program as data. Ergonomic helper functions such as [`val`],
//! [`sym`], and [`nil`] are provided for convenient construction in code and tests,
//! and conversion traits for common Rust types make it easy to build values from
//! literals, arrays and vectors.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::Error;
use crate::evaluator::Environment;
use crate::evaluator::intooperation::OperationFn;

/// A symbol name. Two symbols are equal iff their names are equal.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(Rc<str>);

impl Symbol {
    pub fn new(name: &str) -> Self {
        Symbol(Rc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A user-defined procedure: parameters, an unevaluated body, and the
/// environment that was active when the `lambda` form was evaluated.
pub struct Closure {
    pub params: Vec<Symbol>,
    pub body: Value,
    pub env: Environment,
}

/// Shared, mutable hash table. Clones refer to the same table.
#[derive(Clone, Default)]
pub struct HashTable(Rc<RefCell<HashMap<HashKey, Value>>>);

impl HashTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Value) -> Result<Option<Value>, Error> {
        let key = HashKey::try_from(key)?;
        Ok(self.0.borrow().get(&key).cloned())
    }

    pub fn insert(&self, key: &Value, value: Value) -> Result<(), Error> {
        let key = HashKey::try_from(key)?;
        self.0.borrow_mut().insert(key, value);
        Ok(())
    }

    pub fn remove(&self, key: &Value) -> Result<Option<Value>, Error> {
        let key = HashKey::try_from(key)?;
        Ok(self.0.borrow_mut().remove(&key))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &HashTable) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Hashable projection of the atom values that may key a [`HashTable`].
///
/// Floats holding an exact integer are folded into `Integer` so that `1` and
/// `1.0` address the same entry, matching the numeric equality of `=`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Integer(i64),
    Float(u64),
    String(String),
    Symbol(Symbol),
    Bool(bool),
    Nil,
}

impl TryFrom<&Value> for HashKey {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self, Error> {
        match value {
            Value::Integer(n) => Ok(HashKey::Integer(*n)),
            Value::Float(x) => {
                let truncated = x.trunc();
                if x.is_finite()
                    && truncated == *x
                    && truncated >= i64::MIN as f64
                    && truncated < i64::MAX as f64
                {
                    Ok(HashKey::Integer(truncated as i64))
                } else {
                    Ok(HashKey::Float(x.to_bits()))
                }
            }
            Value::String(s) => Ok(HashKey::String(s.clone())),
            Value::Symbol(s) => Ok(HashKey::Symbol(s.clone())),
            Value::Bool(b) => Ok(HashKey::Bool(*b)),
            Value::Nil => Ok(HashKey::Nil),
            other => Err(Error::TypeMismatch(format!(
                "unhashable {} used as table key: {other}",
                other.type_name()
            ))),
        }
    }
}

/// Typed numeric view of a [`Value`], used by arithmetic builtins.
///
/// Comparison is numeric across variants: `Integer(1) == Float(1.0)`.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Integer(n) => n as f64,
            Number::Float(x) => x,
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(std::cmp::Ordering::Equal)
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => Some(a.cmp(b)),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        match n {
            Number::Integer(n) => Value::Integer(n),
            Number::Float(x) => Value::Float(x),
        }
    }
}

impl TryFrom<Value> for Number {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Error> {
        match value {
            Value::Integer(n) => Ok(Number::Integer(n)),
            Value::Float(x) => Ok(Number::Float(x)),
            other => Err(Error::type_mismatch("number", &other)),
        }
    }
}

/// Core value type of the interpreter, used for both code and data.
///
/// To build values, use the ergonomic helper functions:
/// - `val(42)` for values, `sym("name")` for symbols, `nil()` for nil
/// - `val([1, 2, 3])` for homogeneous sequences
/// - `val(vec![sym("op"), val(42)])` for mixed sequences
#[derive(Clone)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
    Bool(bool),
    /// The single falsy value
    Nil,
    Symbol(Symbol),
    /// Sequences: quoted data and unevaluated compound forms alike
    List(Vec<Value>),
    /// Native functions. Compared by id, not by function pointer.
    BuiltinFunction {
        id: String,
        // Stored as an Arc so typed Rust functions can be wrapped into the
        // canonical evaluator signature and shared by the static registry.
        func: Arc<OperationFn>,
    },
    Closure(Rc<Closure>),
    Table(HashTable),
}

impl Value {
    /// Everything except nil (and a boolean false) is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Check if a value represents nil or an empty sequence
    pub(crate) fn is_nil(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::List(list) => list.is_empty(),
            _ => false,
        }
    }

    /// Map a boolean `false` to nil so only one falsy value is ever observed.
    pub(crate) fn canonicalize(self) -> Value {
        match self {
            Value::Bool(false) => Value::Nil,
            other => other,
        }
    }

    /// Equality as seen by the `=` builtin: numbers compare numerically across
    /// integer and float, sequences element-wise, everything else as `==`.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                *a as f64 == *b
            }
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y))
            }
            _ => self == other,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Nil => "nil",
            Value::Symbol(_) => "symbol",
            Value::List(_) => "sequence",
            Value::BuiltinFunction { .. } => "builtin",
            Value::Closure(_) => "closure",
            Value::Table(_) => "hash-table",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "Integer({n})"),
            Value::Float(x) => write!(f, "Float({x:?})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Nil => write!(f, "Nil"),
            Value::Symbol(s) => write!(f, "{s:?}"),
            Value::List(list) => {
                write!(f, "List(")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::BuiltinFunction { id, .. } => write!(f, "BuiltinFunction({id})"),
            // The captured environment is left out: it usually contains the closure itself.
            Value::Closure(closure) => write!(
                f,
                "Closure(params={:?}, body={:?})",
                closure.params, closure.body
            ),
            Value::Table(table) => write!(f, "Table(len={})", table.len()),
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<HashTable> for Value {
    fn from(table: HashTable) -> Self {
        Value::Table(table)
    }
}

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Self {
        Value::Symbol(s)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Integer(n as i64)
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(i64);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Integer(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(|x| x.into()).collect())
    }
}

// Fallible conversions from `Value` back into primitive Rust types.

impl std::convert::TryInto<i64> for Value {
    type Error = Error;

    fn try_into(self) -> Result<i64, Error> {
        if let Value::Integer(n) = self {
            Ok(n)
        } else {
            Err(Error::type_mismatch("integer", &self))
        }
    }
}

impl TryFrom<Value> for HashTable {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Error> {
        if let Value::Table(table) = value {
            Ok(table)
        } else {
            Err(Error::type_mismatch("hash-table", &value))
        }
    }
}

/// Helper function for creating symbols - works great in mixed lists!
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(Symbol::new(name.as_ref()))
}

/// Helper function for creating Values - works great in mixed lists!
/// Accepts any type that can be converted to Value
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for the nil value
pub fn nil() -> Value {
    Value::Nil
}

fn write_float(f: &mut fmt::Formatter<'_>, x: f64) -> fmt::Result {
    // Keep a decimal point on integral floats so they read back as floats.
    if x.is_finite() && x.fract() == 0.0 {
        write!(f, "{x:.1}")
    } else {
        write!(f, "{x}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(x) => write_float(f, *x),
            Value::String(s) => write!(f, "\"{s}\""),
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Nil => write!(f, "nil"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::List(elements) => {
                write!(f, "(")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, ")")
            }
            Value::BuiltinFunction { id, .. } => write!(f, "#<builtin:{id}>"),
            Value::Closure(closure) => {
                write!(f, "#<lambda (")?;
                for (i, param) in closure.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ")>")
            }
            Value::Table(table) => write!(f, "#<hash-table:{}>", table.len()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::BuiltinFunction { id: id1, .. }, Value::BuiltinFunction { id: id2, .. }) => {
                // Compare BuiltinFunctions by id string, not function pointer
                id1 == id2
            }
            // Procedures and tables have identity, not structure
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Table(a), Value::Table(b)) => a.ptr_eq(b),
            _ => false, // Different variants are never equal
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod helper_function_tests {
    use super::*;

    #[test]
    fn test_helper_functions_data_driven() {
        // Test cases as (helper_result, expected_value)
        let test_cases = vec![
            (val(42), Value::Integer(42)),
            (val(-17), Value::Integer(-17)),
            (val(255u8), Value::Integer(255)),
            (val(-32768i16), Value::Integer(-32768)),
            (val(i64::MAX), Value::Integer(i64::MAX)),
            (val(2.5), Value::Float(2.5)),
            (val(true), Value::Bool(true)),
            (val("hello"), Value::String("hello".to_owned())),
            (val(""), Value::String(String::new())),
            (sym("foo-bar?"), Value::Symbol(Symbol::new("foo-bar?"))),
            (sym(String::from("test")), Value::Symbol(Symbol::new("test"))),
            (nil(), Value::Nil),
            (
                val([1, 2, 3]),
                Value::List(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]),
            ),
            (
                val(vec![sym("operation"), val(42), val("result")]),
                Value::List(vec![
                    Value::Symbol(Symbol::new("operation")),
                    Value::Integer(42),
                    Value::String("result".to_owned()),
                ]),
            ),
        ];

        for (i, (actual, expected)) in test_cases.iter().enumerate() {
            assert_eq!(actual, expected, "Test case {} failed", i + 1);
        }
    }

    #[test]
    fn test_display() {
        let cases = vec![
            (val(42), "42"),
            (val(-3), "-3"),
            (val(2.5), "2.5"),
            (val(3.0), "3.0"),
            (val(-0.0), "-0.0"),
            (val(1e21), "1000000000000000000000.0"),
            (val("two words"), "\"two words\""),
            (val(true), "True"),
            (nil(), "nil"),
            (sym("fact"), "fact"),
            (val(vec![sym("a"), val(vec![val(1), val(2.0)]), nil()]), "(a (1 2.0) nil)"),
            (val(Vec::<Value>::new()), "()"),
            (Value::Table(HashTable::new()), "#<hash-table:0>"),
        ];

        for (value, expected) in cases {
            assert_eq!(value.to_string(), expected);
        }
    }

    #[test]
    fn test_truthiness_and_canonical_false() {
        assert!(!nil().is_truthy());
        assert!(!val(false).is_truthy());
        assert!(val(0).is_truthy());
        assert!(val("").is_truthy());
        assert!(val(Vec::<Value>::new()).is_truthy());
        assert_eq!(val(false).canonicalize(), nil());
        assert_eq!(val(true).canonicalize(), val(true));
    }

    #[test]
    fn test_numeric_equality() {
        assert!(val(1).equals(&val(1.0)));
        assert!(val(vec![val(1), val(2)]).equals(&val(vec![val(1.0), val(2)])));
        assert!(!val(1).equals(&val("1")));
        assert_ne!(val(1), val(1.0));
    }

    #[test]
    fn test_hash_table_keys() {
        let table = HashTable::new();
        table.insert(&val(1), val("one")).unwrap();
        table.insert(&sym("k"), val(2)).unwrap();
        table.insert(&val("k"), val(3)).unwrap();

        assert_eq!(table.get(&val(1.0)).unwrap(), Some(val("one")));
        assert_eq!(table.get(&sym("k")).unwrap(), Some(val(2)));
        assert_eq!(table.get(&val("k")).unwrap(), Some(val(3)));
        assert_eq!(table.get(&val(2)).unwrap(), None);
        assert_eq!(table.len(), 3);

        let err = table.insert(&val([1, 2]), val(0)).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::TypeMismatch);

        let alias = table.clone();
        alias.remove(&val(1)).unwrap();
        assert_eq!(table.len(), 2);
        assert!(alias.ptr_eq(&table));
        assert_eq!(Value::Table(alias), Value::Table(table));
    }
}
