//! A value-or-failure container: "a computation that may have thrown."
//!
//! Grounded on `examples/original_source/src/common/Try.hh`, reworked as a
//! two-variant Rust enum instead of a C++ template over a tagged union.

use crate::error::{Failure, UserError};
use std::fmt;

/// Either a computed value of type `T`, or a captured [`Failure`].
///
/// Exactly one state is active, same as `R1` in `SPEC_FULL.md`. Unlike the
/// C++ original, dereferencing an `Outcome` is not "raise on every access":
/// Rust has no implicit coercions to paper over that, so callers explicitly
/// choose [`Outcome::into_result`] (consumes, yields `Result`) or
/// [`Outcome::as_result`] (borrows).
pub enum Outcome<T> {
    /// The computation produced a value.
    Value(T),
    /// The computation failed.
    Failure(Failure),
}

impl<T> Outcome<T> {
    /// Constructs a successful outcome.
    pub fn from_value(value: T) -> Self {
        Outcome::Value(value)
    }

    /// Constructs a failed outcome from an already-captured [`Failure`].
    pub fn from_failure(failure: Failure) -> Self {
        Outcome::Failure(failure)
    }

    /// Evaluates `f`, catching any error it returns and storing it as a
    /// [`Failure::User`].
    pub fn try_of<F, E>(f: F) -> Self
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        match f() {
            Ok(value) => Outcome::Value(value),
            Err(error) => Outcome::Failure(Failure::User(UserError::new(error))),
        }
    }

    /// Returns `true` iff this outcome holds a value.
    pub fn has_value(&self) -> bool {
        matches!(self, Outcome::Value(_))
    }

    /// Consumes the outcome, returning the standard library's `Result`.
    pub fn into_result(self) -> std::result::Result<T, Failure> {
        match self {
            Outcome::Value(v) => Ok(v),
            Outcome::Failure(f) => Err(f),
        }
    }

    /// Borrows the outcome as a `Result`.
    pub fn as_result(&self) -> std::result::Result<&T, &Failure> {
        match self {
            Outcome::Value(v) => Ok(v),
            Outcome::Failure(f) => Err(f),
        }
    }

    /// Maps the value, leaving a failure untouched. Any error raised by `f`
    /// becomes the new [`Failure`], matching [`crate::future`]'s `map`.
    pub fn map<U, F, E>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> std::result::Result<U, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        match self {
            Outcome::Value(v) => Outcome::try_of(|| f(v)),
            Outcome::Failure(e) => Outcome::Failure(e),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Outcome::Failure(e) => f.debug_tuple("Failure").field(e).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Boom;
    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "boom")
        }
    }
    impl std::error::Error for Boom {}

    #[test]
    fn from_value_has_value() {
        let o = Outcome::from_value(5);
        assert!(o.has_value());
        assert_eq!(o.into_result().unwrap(), 5);
    }

    #[test]
    fn try_of_catches_error() {
        let o: Outcome<i32> = Outcome::try_of(|| Err(Boom));
        assert!(!o.has_value());
        assert!(o.into_result().is_err());
    }

    #[test]
    fn map_propagates_failure_without_calling_f() {
        let o: Outcome<i32> = Outcome::from_failure(Failure::Domain(3));
        let mapped = o.map(|_: i32| -> std::result::Result<i32, Boom> {
            panic!("must not be called")
        });
        assert!(!mapped.has_value());
    }

    #[test]
    fn map_success_applies_f() {
        let o = Outcome::from_value(2);
        let mapped: Outcome<i32> = o.map(|v| Ok::<_, Boom>(v * 10));
        assert_eq!(mapped.into_result().unwrap(), 20);
    }
}
