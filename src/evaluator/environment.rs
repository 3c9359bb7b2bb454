use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::Error;
use crate::ast::Value;
use crate::builtinops::Arity;

use super::intooperation::{IntoOperation, IntoVariadicOperation};

#[derive(Default)]
struct Frame {
    bindings: HashMap<String, Value>,
    parent: Option<Environment>,
}

/// A shared frame of variable bindings plus an optional enclosing frame.
///
/// Cloning an `Environment` yields another handle to the same frame, so
/// closures that captured it observe later `define` and `set` operations.
#[derive(Clone, Default)]
pub struct Environment(Rc<RefCell<Frame>>);

impl Environment {
    /// Create a root frame with no parent and no bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty child frame of `parent`
    pub fn with_parent(parent: &Environment) -> Self {
        Environment(Rc::new(RefCell::new(Frame {
            bindings: HashMap::new(),
            parent: Some(parent.clone()),
        })))
    }

    /// Resolve `name`, walking from this frame outward.
    pub fn lookup(&self, name: &str) -> Result<Value, Error> {
        let mut current = self.clone();
        loop {
            let next = {
                let frame = current.0.borrow();
                if let Some(value) = frame.bindings.get(name) {
                    return Ok(value.clone());
                }
                frame.parent.clone()
            };
            match next {
                Some(parent) => current = parent,
                None => return Err(Error::UndefinedSymbol(name.to_owned())),
            }
        }
    }

    /// Bind `name` in this frame. Fails if the frame already binds it;
    /// bindings in enclosing frames are shadowed.
    pub fn define(&self, name: &str, value: Value) -> Result<(), Error> {
        let mut frame = self.0.borrow_mut();
        if frame.bindings.contains_key(name) {
            return Err(Error::AlreadyDefined(name.to_owned()));
        }
        tracing::debug!(name, "define");
        frame.bindings.insert(name.to_owned(), value);
        Ok(())
    }

    /// Overwrite the nearest existing binding of `name`.
    pub fn set(&self, name: &str, value: Value) -> Result<(), Error> {
        let mut current = self.clone();
        loop {
            let next = {
                let mut frame = current.0.borrow_mut();
                if let Some(slot) = frame.bindings.get_mut(name) {
                    *slot = value;
                    return Ok(());
                }
                frame.parent.clone()
            };
            match next {
                Some(parent) => current = parent,
                None => return Err(Error::UndefinedSymbol(name.to_owned())),
            }
        }
    }

    /// Bind without the redefinition check (host registration)
    pub(crate) fn bind(&self, name: &str, value: Value) {
        self.0.borrow_mut().bindings.insert(name.to_owned(), value);
    }

    pub fn is_bound_locally(&self, name: &str) -> bool {
        self.0.borrow().bindings.contains_key(name)
    }

    /// Whether both handles refer to the same frame
    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn parent(&self) -> Option<Environment> {
        self.0.borrow().parent.clone()
    }

    /// Register a custom builtin function in this frame.
    ///
    /// This is the low-level API: it accepts a function that already
    /// works on `&[Value]` and returns `Result<Value, Error>`. For most new
    /// code, prefer [`Environment::register_builtin_operation`], which
    /// converts arguments and checks arity for you.
    ///
    /// # Example
    /// ```
    /// use sexpeval::evaluator::create_global_env;
    /// use sexpeval::ast::Value;
    /// use sexpeval::Error;
    ///
    /// fn count_args(args: &[Value]) -> Result<Value, Error> {
    ///     Ok(Value::from(args.len()))
    /// }
    ///
    /// let env = create_global_env();
    /// env.register_builtin_function("count-args", count_args);
    /// let result = sexpeval::evaluate_source("(count-args 1 2 3)", &env).unwrap();
    /// assert_eq!(result, Value::Integer(3));
    /// ```
    pub fn register_builtin_function(
        &self,
        name: &str,
        func: fn(&[Value]) -> Result<Value, Error>,
    ) {
        self.bind(
            name,
            Value::BuiltinFunction {
                id: name.to_owned(),
                func: Arc::new(move |args: Vec<Value>| func(&args)),
            },
        );
    }

    /// Register a strongly-typed Rust function as a builtin operation using
    /// automatic argument extraction and result conversion.
    ///
    /// ```
    /// use sexpeval::evaluator::create_global_env;
    /// use sexpeval::ast::Value;
    ///
    /// fn add(a: i64, b: i64) -> i64 {
    ///     a + b
    /// }
    ///
    /// let env = create_global_env();
    /// env.register_builtin_operation::<(i64, i64), _>("add", add);
    /// let result = sexpeval::evaluate_source("(add 2 3)", &env).unwrap();
    /// assert_eq!(result, Value::Integer(5));
    /// ```
    ///
    /// Supported parameter types:
    /// - `i64`, `Number` and `HashTable` (by value)
    /// - `&str` (borrowed string slices)
    /// - `Value` (owned access to the raw value)
    /// - `ValueIter<'_>`, `NumIter<'_>`, `StringIter<'_>` (elements of a sequence argument)
    ///
    /// Additional scalar parameter types can be supported by implementing
    /// `TryFrom<Value>` with `Error = Error`; those participate automatically.
    ///
    /// Supported return types are any `R: Into<Value>` and
    /// `Result<R, Error>`. Arity is enforced automatically and conversion
    /// failures yield `TypeMismatch`.
    pub fn register_builtin_operation<Args, F>(&self, name: &str, func: F)
    where
        F: IntoOperation<Args>,
    {
        self.bind(
            name,
            Value::BuiltinFunction {
                id: name.to_owned(),
                func: func.into_operation(),
            },
        );
    }

    /// Register a variadic builtin operation with explicit arity metadata.
    ///
    /// This is intended for functions whose Rust signature ends in a rest
    /// parameter:
    /// - all arguments as values: `fn(ValueIter<'_>) -> R`
    /// - numeric tail: `fn(NumIter<'_>) -> R`
    /// - fixed prefix plus numeric tail: `fn(Number, NumIter<'_>) -> R`
    ///
    /// The provided [`Arity`] validates the total number of arguments at call
    /// time, since a maximum is not derivable from the Rust signature alone.
    pub fn register_variadic_builtin_operation<Args, F>(&self, name: &str, arity: Arity, func: F)
    where
        F: IntoVariadicOperation<Args>,
    {
        let inner = func.into_variadic_operation();
        self.bind(
            name,
            Value::BuiltinFunction {
                id: name.to_owned(),
                func: Arc::new(move |args: Vec<Value>| {
                    arity.validate(args.len())?;
                    inner(args)
                }),
            },
        );
    }

    /// Get all bindings visible from this frame, innermost winning,
    /// as (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = match self.parent() {
            Some(parent) => parent.get_all_bindings().into_iter().collect(),
            None => HashMap::new(),
        };

        for (name, value) in &self.0.borrow().bindings {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

// Frames are usually cyclic through closures, so only names are printed.
impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frame = self.0.borrow();
        let mut names: Vec<&String> = frame.bindings.keys().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("has_parent", &frame.parent.is_some())
            .finish()
    }
}
