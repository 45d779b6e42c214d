//! Crate-wide error taxonomy.
//!
//! [`Failure`] is the single failure type threaded through [`crate::outcome`]
//! and [`crate::future`]. It distinguishes failures raised by user callbacks
//! from failures surfaced by the OS primitives in [`crate::sys`], so that
//! callers can match on the distinguished variants described by the
//! signal-handler configuration's reconciliation policy.

use std::fmt;
use std::os::unix::io::RawFd;

/// A type-erased failure captured from a user-supplied closure or callback.
///
/// User callbacks in this crate are ordinary Rust closures that return
/// `Result<T, E>`; there is no panic-catching equivalent of C++'s
/// `std::exception_ptr` in the combinator API (see `REDESIGN FLAGS` in
/// `SPEC_FULL.md`). `UserError` exists only to give [`Failure::User`] a
/// single boxed representation regardless of the concrete `E`.
#[derive(Debug)]
pub struct UserError(Box<dyn std::error::Error + Send + Sync + 'static>);

impl UserError {
    /// Boxes an arbitrary error as a [`UserError`].
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        UserError(Box::new(error))
    }
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for UserError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

/// The failure arm of an [`crate::outcome::Outcome`], or the error returned
/// by the signal-handler configuration API.
///
/// See `SPEC_FULL.md` §7 for the propagation policy: a [`Failure`] flows
/// through `map`, `forward`, `wrap`, and `flat_map` unchanged; only
/// `recover` may consume it.
#[derive(Debug, thiserror::Error)]
pub enum Failure {
    /// Raised by a user-supplied callback or value factory.
    #[error("user callback failed: {0}")]
    User(#[from] UserError),

    /// A non-zero return from `pselect`, `sigaction`, or `sigprocmask`.
    #[error("OS call failed: {0}")]
    Os(#[source] std::io::Error),

    /// A file descriptor exceeded the platform's `fd_set` capacity.
    #[error("file descriptor {0} exceeds platform capacity")]
    Domain(RawFd),

    /// `set_trap` was called with `FailIfIgnored` on a signal whose
    /// inherited disposition was `Ignore`.
    #[error("signal {0} was initially ignored")]
    InitiallyIgnored(i32),
}

impl Failure {
    /// Wraps the current `errno` (as read by `std::io::Error::last_os_error`)
    /// as a [`Failure::Os`].
    pub fn last_os_error() -> Self {
        Failure::Os(std::io::Error::last_os_error())
    }
}

/// Convenience alias for `Result<T, Failure>`, used throughout the `sys` and
/// `signal` modules for OS-call fallibility.
pub type Result<T> = std::result::Result<T, Failure>;
