//! A single-threaded future/promise core coupled to a `pselect`-based event
//! proactor and process-wide POSIX signal-handler configuration.
//!
//! The three pieces are meant to be read together: [`event::Awaiter`]
//! produces [`future::Future`]s that the rest of a program composes with the
//! combinators in [`future`]; the awaiter suspends the process through one
//! `pselect` call whose signal-mask argument is computed by
//! [`signal::SignalConfiguration`]; the signal configuration is, in turn,
//! the only place that runs async-signal-unsafe work, and it does so only
//! when the awaiter asks it to drain pending counts.
//!
//! See `SPEC_FULL.md` for the full requirements this crate implements and
//! `DESIGN.md` for the grounding ledger.

pub mod delay;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod future;
pub mod outcome;
pub mod signal;
pub mod sys;

pub use error::{Failure, Result};
pub use event::{Awaiter, Trigger, UserProvided};
pub use future::{failed_future, future_from, future_of, promise_future_pair, Future, Promise};
pub use outcome::Outcome;
pub use signal::{Canceler, SettingPolicy, SignalConfiguration, TrapAction};
pub use sys::{RealApi, SysApi};
