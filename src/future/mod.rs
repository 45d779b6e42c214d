//! Future/Promise combinators: the composable handles onto a [`Delay`] cell.
//!
//! Grounded on `examples/original_source/src/async/Future.hh` and
//! `Promise.hh`. The C++ original tracks a runtime "invalidated" flag on
//! each handle because a `Future`/`Promise` could otherwise be reused after
//! a terminal operation; Rust's move semantics make that a compile error
//! instead, so `then`/`map`/`recover`/... all take `self` by value and no
//! runtime invalidation flag is needed (see `DESIGN.md`, Open Question
//! "R3 invalidation").

use crate::delay::Delay;
use crate::error::Failure;
use crate::outcome::Outcome;
use std::rc::Rc;

/// The producer end of a future/promise pair.
pub struct Promise<T: 'static> {
    delay: Rc<Delay<T>>,
}

/// The consumer end of a future/promise pair.
pub struct Future<T: 'static> {
    delay: Rc<Delay<T>>,
}

/// Creates a new, associated promise/future pair (`R3` pairing invariant:
/// exactly one promise and one future refer to the same cell).
pub fn promise_future_pair<T: 'static>() -> (Promise<T>, Future<T>) {
    let delay = Delay::new();
    (
        Promise {
            delay: Rc::clone(&delay),
        },
        Future { delay },
    )
}

/// A future whose result has already been computed by evaluating `f`. Any
/// error `f` returns is captured as the future's failure.
pub fn future_from<F, T, E>(f: F) -> Future<T>
where
    F: FnOnce() -> std::result::Result<T, E>,
    E: std::error::Error + Send + Sync + 'static,
{
    let (promise, future) = promise_future_pair();
    promise.set_result_from(f);
    future
}

/// A future whose result is already the given value.
pub fn future_of<T>(value: T) -> Future<T> {
    let (promise, future) = promise_future_pair();
    promise.set_value(value);
    future
}

/// A future that has already failed with `failure`.
pub fn failed_future<T>(failure: Failure) -> Future<T> {
    let (promise, future) = promise_future_pair();
    promise.fail(failure);
    future
}

impl<T: 'static> Promise<T> {
    /// Sets the result to `value`. Terminal: consumes the promise.
    pub fn set_value(self, value: T) {
        self.delay.set_result(Outcome::from_value(value));
    }

    /// Sets the result to the outcome of evaluating `f`, catching any error
    /// it returns. Terminal: consumes the promise.
    pub fn set_result_from<F, E>(self, f: F)
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.delay.set_result(Outcome::try_of(f));
    }

    /// Sets the result to the given failure. Terminal: consumes the
    /// promise.
    pub fn fail(self, failure: Failure) {
        self.delay.set_result(Outcome::from_failure(failure));
    }

    /// Sets the result to the given outcome verbatim. Terminal: consumes
    /// the promise.
    pub fn set_outcome(self, outcome: Outcome<T>) {
        self.delay.set_result(outcome);
    }
}

impl<T: 'static> Future<T> {
    /// Installs `cb` as the terminal callback. Terminal: consumes the
    /// future.
    pub fn then<F>(self, cb: F)
    where
        F: FnOnce(Outcome<T>) + 'static,
    {
        self.delay.set_callback(Box::new(cb));
    }

    /// On success, applies `f` to the value; on failure, propagates
    /// unchanged. Any error `f` returns becomes the new failure.
    pub fn map<U, F, E>(self, f: F) -> Future<U>
    where
        F: FnOnce(T) -> std::result::Result<U, E> + 'static,
        U: 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let (promise, future) = promise_future_pair();
        self.then(move |outcome| {
            let mapped = outcome.map(f);
            promise.set_outcome(mapped);
        });
        future
    }

    /// Like [`Future::map`] but `f` observes both branches.
    pub fn then_with_conversion<U, F, E>(self, f: F) -> Future<U>
    where
        F: FnOnce(Outcome<T>) -> std::result::Result<U, E> + 'static,
        U: 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let (promise, future) = promise_future_pair();
        self.then(move |outcome| {
            promise.set_result_from(move || f(outcome));
        });
        future
    }

    /// On success, passes the value through unchanged; on failure, calls
    /// `f` with the failure to recover a value. Any error `f` itself
    /// returns becomes the new failure.
    pub fn recover<F, E>(self, f: F) -> Future<T>
    where
        F: FnOnce(Failure) -> std::result::Result<T, E> + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let (promise, future) = promise_future_pair();
        self.then(move |outcome| match outcome {
            Outcome::Value(v) => promise.set_value(v),
            Outcome::Failure(e) => promise.set_result_from(move || f(e)),
        });
        future
    }

    /// Routes this future's result verbatim into `target`.
    pub fn forward(self, target: Promise<T>) {
        self.then(move |outcome| target.set_outcome(outcome));
    }

    /// Materialises this future as the value of an outer future. A failure
    /// of this future propagates to the outer future directly rather than
    /// becoming a successful outer future holding a failed inner one.
    pub fn wrap(self) -> Future<Future<T>> {
        let (outer_promise, outer_future) = promise_future_pair::<Future<T>>();
        let (inner_promise, inner_future) = promise_future_pair::<T>();

        self.then(move |outcome| match outcome {
            Outcome::Value(v) => {
                inner_promise.set_value(v);
                outer_promise.set_value(inner_future);
            }
            Outcome::Failure(e) => outer_promise.fail(e),
        });

        outer_future
    }

    /// Composition of [`Future::map`] and [`Future::unwrap`] with
    /// short-circuit on failure: on success, calls `f` to obtain a new
    /// future and sequences it; on failure, propagates unchanged.
    pub fn flat_map<U, F>(self, f: F) -> Future<U>
    where
        F: FnOnce(T) -> Future<U> + 'static,
        U: 'static,
    {
        let (promise, future) = promise_future_pair();
        self.then(move |outcome| match outcome {
            Outcome::Value(v) => f(v).forward(promise),
            Outcome::Failure(e) => promise.fail(e),
        });
        future
    }
}

impl<T: 'static> Future<Future<T>> {
    /// Sequences two layers of future nesting: either layer's failure is
    /// the result's failure. Only defined for `Future<Future<T>>`, matching
    /// the C++ original's specialization on the nested-future case.
    pub fn unwrap(self) -> Future<T> {
        let (promise, future) = promise_future_pair();
        self.then(move |outcome| match outcome {
            Outcome::Value(inner) => inner.forward(promise),
            Outcome::Failure(e) => promise.fail(e),
        });
        future
    }
}
