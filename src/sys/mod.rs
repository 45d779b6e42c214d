//! OS-primitive trait and the real `libc`-backed implementation.
//!
//! Grounded on `examples/original_source/src/os/event/PselectApi.hh` and
//! `src/os/signaling/HandlerConfigurationApi.hh`: the original factors the
//! kernel surface the awaiter and the signal-handler configuration need
//! behind an abstract API class so that tests can substitute a fake. Same
//! role here: [`SysApi`] is the trait [`crate::event`] and [`crate::signal`]
//! depend on, [`RealApi`] is the `libc`-backed production implementation,
//! and [`mock::MockApi`] is the test double.

mod fd_set;
mod signal_set;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use fd_set::FdSet;
pub use signal_set::SignalSet;

use std::os::unix::io::RawFd;
use std::time::{Duration, Instant, SystemTime};

/// The `how` argument to `sigprocmask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskChangeHow {
    Block,
    Unblock,
    Replace,
}

/// A signal disposition, as passed to or read back from `sigaction`.
#[derive(Clone, Copy)]
pub enum SignalAction {
    /// The OS-dependent default action.
    Default,
    /// Ignore the signal.
    Ignore,
    /// Deliver the signal to the given native handler function.
    Handler(extern "C" fn(i32)),
}

impl PartialEq for SignalAction {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SignalAction::Default, SignalAction::Default) => true,
            (SignalAction::Ignore, SignalAction::Ignore) => true,
            (SignalAction::Handler(a), SignalAction::Handler(b)) => {
                *a as usize == *b as usize
            }
            _ => false,
        }
    }
}

impl Eq for SignalAction {}

impl std::fmt::Debug for SignalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalAction::Default => f.write_str("Default"),
            SignalAction::Ignore => f.write_str("Ignore"),
            SignalAction::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

/// Abstraction of the kernel primitives the async core depends on: clocks,
/// `pselect`, and the `sigaction`/`sigprocmask` pair.
///
/// `pselect` returns the raw `std::io::Result` rather than [`crate::error::Failure`]
/// so that callers (only [`crate::event`]) can special-case `EINTR` as a
/// legitimate wake before converting any other error into a `Failure`.
pub trait SysApi {
    /// A monotonic clock reading, used for timeout arithmetic.
    fn steady_now(&self) -> Instant;

    /// A wall-clock reading, exposed for completeness; the core does not
    /// use it for scheduling decisions.
    fn system_now(&self) -> SystemTime;

    /// Creates a new, empty file-descriptor set compatible with this API.
    fn create_fd_set(&self) -> FdSet {
        FdSet::new()
    }

    /// Creates a new, empty signal-number set compatible with this API.
    fn create_signal_set(&self) -> SignalSet {
        SignalSet::new()
    }

    /// Waits for readiness on the given descriptor sets, a timeout, or a
    /// signal outside `mask`. `timeout = None` blocks indefinitely.
    /// Returns the number of ready descriptors.
    #[allow(clippy::too_many_arguments)]
    fn pselect(
        &self,
        fd_bound: RawFd,
        reads: Option<&mut FdSet>,
        writes: Option<&mut FdSet>,
        errors: Option<&mut FdSet>,
        timeout: Option<Duration>,
        mask: Option<&SignalSet>,
    ) -> std::io::Result<i32>;

    /// Changes the process signal mask.
    fn sigprocmask(
        &self,
        how: MaskChangeHow,
        new: Option<&SignalSet>,
        old: Option<&mut SignalSet>,
    ) -> std::io::Result<()>;

    /// Installs a signal disposition, returning the previous one in `old`.
    fn sigaction(
        &self,
        signal: i32,
        new: Option<SignalAction>,
        old: Option<&mut SignalAction>,
    ) -> std::io::Result<()>;
}

/// The production [`SysApi`] implementation, backed directly by `libc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealApi;

impl SysApi for RealApi {
    fn steady_now(&self) -> Instant {
        Instant::now()
    }

    fn system_now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn pselect(
        &self,
        fd_bound: RawFd,
        reads: Option<&mut FdSet>,
        writes: Option<&mut FdSet>,
        errors: Option<&mut FdSet>,
        timeout: Option<Duration>,
        mask: Option<&SignalSet>,
    ) -> std::io::Result<i32> {
        let reads_ptr = reads.map_or(std::ptr::null_mut(), FdSet::as_mut_ptr);
        let writes_ptr = writes.map_or(std::ptr::null_mut(), FdSet::as_mut_ptr);
        let errors_ptr = errors.map_or(std::ptr::null_mut(), FdSet::as_mut_ptr);
        let mask_ptr = mask.map_or(std::ptr::null(), SignalSet::as_ptr);

        let ts = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: libc::c_long::from(d.subsec_nanos() as i32),
        });
        let ts_ptr = ts
            .as_ref()
            .map_or(std::ptr::null(), |t| t as *const libc::timespec);

        // SAFETY: `reads_ptr`/`writes_ptr`/`errors_ptr` are either null or
        // point at a live `fd_set` owned by the caller for the duration of
        // this call; same for `mask_ptr`/`ts_ptr`. `fd_bound` is supplied by
        // the caller as one plus the highest descriptor present in any set.
        let rc = unsafe {
            libc::pselect(
                fd_bound,
                reads_ptr,
                writes_ptr,
                errors_ptr,
                ts_ptr,
                mask_ptr,
            )
        };

        if rc < 0 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(rc)
        }
    }

    fn sigprocmask(
        &self,
        how: MaskChangeHow,
        new: Option<&SignalSet>,
        old: Option<&mut SignalSet>,
    ) -> std::io::Result<()> {
        let how = match how {
            MaskChangeHow::Block => libc::SIG_BLOCK,
            MaskChangeHow::Unblock => libc::SIG_UNBLOCK,
            MaskChangeHow::Replace => libc::SIG_SETMASK,
        };
        let new_ptr = new.map_or(std::ptr::null(), SignalSet::as_ptr);
        let old_ptr = old.map_or(std::ptr::null_mut(), SignalSet::as_mut_ptr);

        // SAFETY: `new_ptr`/`old_ptr` are either null or point at a live,
        // initialized `sigset_t` owned by the caller.
        let rc = unsafe { libc::pthread_sigmask(how, new_ptr, old_ptr) };
        if rc != 0 {
            Err(std::io::Error::from_raw_os_error(rc))
        } else {
            Ok(())
        }
    }

    fn sigaction(
        &self,
        signal: i32,
        new: Option<SignalAction>,
        old: Option<&mut SignalAction>,
    ) -> std::io::Result<()> {
        let mut previous: libc::sigaction = unsafe { std::mem::zeroed() };

        if let Some(action) = new {
            let mut sa: libc::sigaction = unsafe { std::mem::zeroed() };
            sa.sa_sigaction = match action {
                SignalAction::Default => libc::SIG_DFL,
                SignalAction::Ignore => libc::SIG_IGN,
                SignalAction::Handler(f) => f as usize,
            };
            sa.sa_flags = libc::SA_RESTART;
            // SAFETY: `signal` is the caller-supplied signal number, `sa` is
            // a fully initialized `sigaction`, and `previous` is a valid
            // out-pointer of the same type.
            let rc = unsafe { libc::sigaction(signal, &sa, &mut previous) };
            if rc != 0 {
                return Err(std::io::Error::last_os_error());
            }
        } else if old.is_some() {
            // Query only: pass a null new-action pointer.
            // SAFETY: `signal` is caller-supplied, the new-action pointer is
            // null (query-only), and `previous` is a valid out-pointer.
            let rc = unsafe { libc::sigaction(signal, std::ptr::null(), &mut previous) };
            if rc != 0 {
                return Err(std::io::Error::last_os_error());
            }
        }

        if let Some(slot) = old {
            *slot = if previous.sa_sigaction == libc::SIG_DFL {
                SignalAction::Default
            } else if previous.sa_sigaction == libc::SIG_IGN {
                SignalAction::Ignore
            } else {
                // SAFETY: any value other than SIG_DFL/SIG_IGN stored by a
                // prior call to this same function was itself a valid
                // `extern "C" fn(i32)` cast to `usize`.
                let f: extern "C" fn(i32) =
                    unsafe { std::mem::transmute(previous.sa_sigaction) };
                SignalAction::Handler(f)
            };
        }

        Ok(())
    }
}
