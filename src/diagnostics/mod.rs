//! Structured logging support.
//!
//! Grounded on the teacher's own use of `log`: plain
//! `log::{trace, debug, warn, error}!` calls at the call site (see
//! `hotdrink-rs/src/scheduler/scheduler.rs`, `src/data/constraint_system.rs`),
//! no target strings or custom macros. The log calls themselves live in
//! `signal::SignalConfiguration::reconcile` and `event::Awaiter`'s wait and
//! dispatch steps; this module holds the one formatting helper both share,
//! so log lines name a signal rather than printing its raw number.

/// A human-readable name for a signal number, for log messages only —
/// never used for dispatch decisions. Falls back to the bare number for
/// anything outside the common POSIX set.
pub(crate) fn signal_name(n: i32) -> String {
    let name = match n {
        libc::SIGHUP => "SIGHUP",
        libc::SIGINT => "SIGINT",
        libc::SIGQUIT => "SIGQUIT",
        libc::SIGILL => "SIGILL",
        libc::SIGABRT => "SIGABRT",
        libc::SIGFPE => "SIGFPE",
        libc::SIGKILL => "SIGKILL",
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGPIPE => "SIGPIPE",
        libc::SIGALRM => "SIGALRM",
        libc::SIGTERM => "SIGTERM",
        libc::SIGUSR1 => "SIGUSR1",
        libc::SIGUSR2 => "SIGUSR2",
        libc::SIGCHLD => "SIGCHLD",
        libc::SIGCONT => "SIGCONT",
        libc::SIGSTOP => "SIGSTOP",
        libc::SIGTSTP => "SIGTSTP",
        libc::SIGTTIN => "SIGTTIN",
        libc::SIGTTOU => "SIGTTOU",
        _ => return format!("signal {}", n),
    };
    name.to_string()
}
