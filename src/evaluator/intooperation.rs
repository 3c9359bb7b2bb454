use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::Error;
use crate::ast::{Number, Value};
use crate::builtinops::Arity;

/// Erased builtin signature stored in `Value::BuiltinFunction`.
///
/// The argument vector is handed over by value, so a builtin may move
/// arguments out instead of cloning them.
pub type OperationFn = dyn Fn(Vec<Value>) -> Result<Value, Error> + Send + Sync;

/// One typed parameter taken from an argument slot.
///
/// `Out<'a>` either borrows the slot (`&str`, sequence iterators) or
/// moves the value out of it, leaving `nil` behind.
pub(crate) trait ArgSlot {
    type Out<'a>;

    fn take<'a>(slot: &'a mut Value) -> Result<Self::Out<'a>, Error>;
}

impl ArgSlot for Value {
    type Out<'a> = Value;

    fn take<'a>(slot: &'a mut Value) -> Result<Self::Out<'a>, Error> {
        Ok(std::mem::replace(slot, Value::Nil))
    }
}

// i64, Number and HashTable arrive through their TryInto impls
impl<T> ArgSlot for T
where
    Value: std::convert::TryInto<T, Error = Error>,
{
    type Out<'a> = T;

    fn take<'a>(slot: &'a mut Value) -> Result<Self::Out<'a>, Error> {
        std::mem::replace(slot, Value::Nil).try_into()
    }
}

impl ArgSlot for &str {
    type Out<'a> = &'a str;

    fn take<'a>(slot: &'a mut Value) -> Result<Self::Out<'a>, Error> {
        match slot {
            Value::String(s) => Ok(s.as_str()),
            other => Err(Error::type_mismatch("string", other)),
        }
    }
}

/// A sequence argument viewed element by element. `nil` reads as empty.
impl<'b, E> ArgSlot for ElementIter<'b, E>
where
    E: ElementType,
{
    type Out<'a> = ElementIter<'a, E>;

    fn take<'a>(slot: &'a mut Value) -> Result<Self::Out<'a>, Error> {
        match slot {
            Value::List(items) => ElementIter::checked(items.as_slice()),
            Value::Nil => ElementIter::checked(&[]),
            other => Err(Error::type_mismatch("sequence", other)),
        }
    }
}

/// Element types a builtin can iterate over.
#[doc(hidden)]
pub trait ElementType {
    /// Used in the mismatch message when an element has the wrong type.
    const NAME: &'static str;

    type Item<'a>;

    fn view(value: &Value) -> Option<Self::Item<'_>>;
}

#[doc(hidden)]
pub struct AnyValue;

impl ElementType for AnyValue {
    const NAME: &'static str = "value";

    type Item<'a> = &'a Value;

    fn view(value: &Value) -> Option<Self::Item<'_>> {
        Some(value)
    }
}

#[doc(hidden)]
pub struct Numeric;

impl ElementType for Numeric {
    const NAME: &'static str = "number";

    type Item<'a> = Number;

    fn view(value: &Value) -> Option<Self::Item<'_>> {
        match value {
            Value::Integer(n) => Some(Number::Integer(*n)),
            Value::Float(x) => Some(Number::Float(*x)),
            _ => None,
        }
    }
}

#[doc(hidden)]
pub struct Text;

impl ElementType for Text {
    const NAME: &'static str = "string";

    type Item<'a> = &'a str;

    fn view(value: &Value) -> Option<Self::Item<'_>> {
        match value {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Iterator over a slice whose elements were all checked against `E`
/// before the builtin runs, so iteration itself cannot fail.
#[doc(hidden)]
pub struct ElementIter<'a, E: ElementType> {
    values: std::slice::Iter<'a, Value>,
    _element: PhantomData<E>,
}

impl<'a, E: ElementType> ElementIter<'a, E> {
    pub(crate) fn checked(values: &'a [Value]) -> Result<Self, Error> {
        if let Some(bad) = values.iter().find(|value| E::view(value).is_none()) {
            return Err(Error::type_mismatch(E::NAME, bad));
        }
        Ok(ElementIter {
            values: values.iter(),
            _element: PhantomData,
        })
    }
}

impl<'a, E: ElementType> Iterator for ElementIter<'a, E> {
    type Item = E::Item<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.values.next().and_then(E::view)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.values.size_hint()
    }
}

impl<E: ElementType> ExactSizeIterator for ElementIter<'_, E> {}
impl<E: ElementType> FusedIterator for ElementIter<'_, E> {}

/// Arguments or sequence elements of any type.
pub type ValueIter<'a> = ElementIter<'a, AnyValue>;

/// Numeric arguments or elements.
pub type NumIter<'a> = ElementIter<'a, Numeric>;

/// String arguments or elements.
pub type StringIter<'a> = ElementIter<'a, Text>;

/// The trailing arguments of a variadic builtin, gathered into one iterator.
pub(crate) trait RestArgs {
    type Out<'a>;

    fn gather(tail: &[Value]) -> Result<Self::Out<'_>, Error>;
}

impl<E: ElementType> RestArgs for ElementIter<'static, E> {
    type Out<'a> = ElementIter<'a, E>;

    fn gather(tail: &[Value]) -> Result<Self::Out<'_>, Error> {
        ElementIter::checked(tail)
    }
}

/// Builtins may return a plain value or a `Result` of one.
pub(crate) trait IntoReturn {
    fn into_return(self) -> Result<Value, Error>;
}

impl<T: Into<Value>> IntoReturn for Result<T, Error> {
    fn into_return(self) -> Result<Value, Error> {
        self.map(Into::into)
    }
}

impl<T: Into<Value>> IntoReturn for T {
    fn into_return(self) -> Result<Value, Error> {
        Ok(self.into())
    }
}

/// Wraps a Rust function with typed parameters as an [`OperationFn`].
/// `Args` is the tuple of parameter types and only drives impl selection.
pub trait IntoOperation<Args> {
    fn into_operation(self) -> Arc<OperationFn>;
}

/// Like [`IntoOperation`], for functions ending in a rest iterator
/// (`ValueIter`, `NumIter` or `StringIter`), optionally after one fixed parameter.
pub trait IntoVariadicOperation<Args> {
    fn into_variadic_operation(self) -> Arc<OperationFn>;
}

impl<F, I, R> IntoVariadicOperation<(I,)> for F
where
    I: RestArgs,
    F: for<'a> Fn(I::Out<'a>) -> R + Send + Sync + 'static,
    R: IntoReturn,
{
    fn into_variadic_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Value>| (self)(I::gather(&args)?).into_return())
    }
}

impl<F, A, I, R> IntoVariadicOperation<(A, I)> for F
where
    A: ArgSlot,
    I: RestArgs,
    F: for<'a> Fn(A::Out<'a>, I::Out<'a>) -> R + Send + Sync + 'static,
    R: IntoReturn,
{
    fn into_variadic_operation(self) -> Arc<OperationFn> {
        Arc::new(move |mut args: Vec<Value>| {
            let count = args.len();
            let Some((first, rest)) = args.split_first_mut() else {
                return Err(Error::arity_error(Arity::AtLeast(1), count));
            };
            let first = A::take(first)?;
            let rest = I::gather(rest)?;
            (self)(first, rest).into_return()
        })
    }
}

impl<F, R> IntoOperation<()> for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: IntoReturn,
{
    fn into_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Value>| match args.len() {
            0 => (self)().into_return(),
            count => Err(Error::arity_error(Arity::Exact(0), count)),
        })
    }
}

/// Moves the arguments into a fixed-size array so every parameter gets its
/// own slot to borrow from.
macro_rules! fixed_arity_operation {
    ($count:literal => $( $slot:ident : $A:ident ),+) => {
        impl<F, R, $( $A ),+> IntoOperation<( $( $A, )+ )> for F
        where
            $( $A: ArgSlot, )+
            F: for<'a> Fn( $( $A::Out<'a> ),+ ) -> R + Send + Sync + 'static,
            R: IntoReturn,
        {
            fn into_operation(self) -> Arc<OperationFn> {
                Arc::new(move |args: Vec<Value>| {
                    let [ $( mut $slot ),+ ] = <[Value; $count]>::try_from(args)
                        .map_err(|args| Error::arity_error(Arity::Exact($count), args.len()))?;
                    (self)( $( $A::take(&mut $slot)? ),+ ).into_return()
                })
            }
        }
    };
}

fixed_arity_operation!(1 => a: A);
fixed_arity_operation!(2 => a: A, b: B);
