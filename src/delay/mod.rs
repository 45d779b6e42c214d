//! The shared rendezvous cell between a [`crate::future::Future`] and a
//! [`crate::future::Promise`].
//!
//! Grounded on `examples/original_source/src/async/Delay.hh` (the result/
//! callback slot pair) and `src/async/continuation.hh` (the trampoline that
//! keeps a deep chain of `fire` calls from recursing on the native stack).

use crate::outcome::Outcome;
use std::cell::RefCell;
use std::rc::Rc;

type Callback<T> = Box<dyn FnOnce(Outcome<T>)>;

thread_local! {
    /// Work queue for the `fire` trampoline. A callback that itself sets a
    /// result or installs a callback on another delay pushes that delay's
    /// firing onto this queue instead of recursing, so a chain of
    /// thousands of `then`s does not grow the native stack.
    static RUN_QUEUE: RefCell<Vec<Box<dyn FnOnce()>>> = RefCell::new(Vec::new());
    static DRAINING: RefCell<bool> = RefCell::new(false);
}

/// Schedules `work` to run, trampolining through the thread-local run queue
/// if a drain is already in progress on this call stack.
fn schedule(work: Box<dyn FnOnce()>) {
    RUN_QUEUE.with(|q| q.borrow_mut().push(work));

    let already_draining = DRAINING.with(|d| *d.borrow());
    if already_draining {
        return;
    }

    DRAINING.with(|d| *d.borrow_mut() = true);
    loop {
        let next = RUN_QUEUE.with(|q| q.borrow_mut().pop());
        match next {
            Some(work) => work(),
            None => break,
        }
    }
    DRAINING.with(|d| *d.borrow_mut() = false);
}

/// A heap-allocated, single-producer/single-consumer cell. See `R2` in
/// `SPEC_FULL.md`: the result slot and the continuation slot are each
/// written at most once, and the continuation fires synchronously the
/// moment both are non-empty.
pub struct Delay<T> {
    result: RefCell<Option<Outcome<T>>>,
    callback: RefCell<Option<Callback<T>>>,
}

impl<T: 'static> Delay<T> {
    /// Creates a new, empty delay cell.
    pub fn new() -> Rc<Self> {
        Rc::new(Delay {
            result: RefCell::new(None),
            callback: RefCell::new(None),
        })
    }

    fn fire_if_ready(self: &Rc<Self>) {
        let has_both = self.result.borrow().is_some() && self.callback.borrow().is_some();
        if !has_both {
            return;
        }

        let this = Rc::clone(self);
        schedule(Box::new(move || {
            let result = this
                .result
                .borrow_mut()
                .take()
                .expect("fire_if_ready scheduled without a result");
            let callback = this
                .callback
                .borrow_mut()
                .take()
                .expect("fire_if_ready scheduled without a callback");
            callback(result);
        }));
    }

    /// Stores `outcome` in the result slot. Panics (debug-assertion parity
    /// with the C++ `assert(!mResult.hasValue())`) if a result has already
    /// been set.
    pub fn set_result(self: &Rc<Self>, outcome: Outcome<T>) {
        {
            let mut slot = self.result.borrow_mut();
            assert!(slot.is_none(), "Delay::set_result called twice");
            *slot = Some(outcome);
        }
        self.fire_if_ready();
    }

    /// Installs the continuation. Panics if a callback has already been
    /// installed.
    pub fn set_callback(self: &Rc<Self>, callback: Callback<T>) {
        {
            let mut slot = self.callback.borrow_mut();
            assert!(slot.is_none(), "Delay::set_callback called twice");
            *slot = Some(callback);
        }
        self.fire_if_ready();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Failure;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn fires_once_result_then_callback() {
        let delay = Delay::<i32>::new();
        let seen = Rc::new(Cell::new(None));
        delay.set_result(Outcome::from_value(42));

        let seen2 = Rc::clone(&seen);
        delay.set_callback(Box::new(move |outcome| {
            seen2.set(Some(outcome.into_result().unwrap()));
        }));

        assert_eq!(seen.get(), Some(42));
    }

    #[test]
    fn fires_once_callback_then_result() {
        let delay = Delay::<i32>::new();
        let seen = Rc::new(Cell::new(None));

        let seen2 = Rc::clone(&seen);
        delay.set_callback(Box::new(move |outcome| {
            seen2.set(Some(outcome.into_result().unwrap()));
        }));
        assert_eq!(seen.get(), None);

        delay.set_result(Outcome::from_value(7));
        assert_eq!(seen.get(), Some(7));
    }

    #[test]
    #[should_panic(expected = "twice")]
    fn setting_result_twice_panics() {
        let delay = Delay::<i32>::new();
        delay.set_result(Outcome::from_value(1));
        delay.set_result(Outcome::from_value(2));
    }

    #[test]
    #[should_panic(expected = "twice")]
    fn setting_callback_twice_panics() {
        let delay = Delay::<i32>::new();
        delay.set_callback(Box::new(|_| {}));
        delay.set_callback(Box::new(|_| {}));
    }

    #[test]
    fn failure_propagates_through_callback() {
        let delay = Delay::<i32>::new();
        delay.set_result(Outcome::from_failure(Failure::Domain(9)));

        let observed = Rc::new(Cell::new(false));
        let observed2 = Rc::clone(&observed);
        delay.set_callback(Box::new(move |outcome| {
            observed2.set(outcome.into_result().is_err());
        }));
        assert!(observed.get());
    }

    /// Chains thousands of delays firing one another to confirm the
    /// trampoline does not grow the native stack (`continuation_test.cc`
    /// in `examples/original_source` stresses the same property).
    #[test]
    fn trampoline_does_not_recurse_on_deep_chains() {
        const DEPTH: usize = 50_000;

        let delays: Vec<Rc<Delay<i32>>> = (0..DEPTH).map(|_| Delay::<i32>::new()).collect();

        for i in 0..DEPTH - 1 {
            let next = Rc::clone(&delays[i + 1]);
            delays[i].set_callback(Box::new(move |outcome| {
                let v = outcome.into_result().unwrap();
                next.set_result(Outcome::from_value(v + 1));
            }));
        }

        let final_seen = Rc::new(Cell::new(None));
        let final_seen2 = Rc::clone(&final_seen);
        delays[DEPTH - 1].set_callback(Box::new(move |outcome| {
            final_seen2.set(Some(outcome.into_result().unwrap()));
        }));

        delays[0].set_result(Outcome::from_value(0));
        assert_eq!(final_seen.get(), Some((DEPTH - 1) as i32));
    }
}
