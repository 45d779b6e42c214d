//! Bit-set over signal numbers, grounded on
//! `examples/original_source/src/os/signaling/SignalNumberSet.hh`.

/// A bit-set over POSIX signal numbers. Wraps `libc::sigset_t`.
#[derive(Clone)]
pub struct SignalSet {
    raw: libc::sigset_t,
}

impl SignalSet {
    /// Creates a new, empty set.
    pub fn new() -> Self {
        let mut raw = std::mem::MaybeUninit::uninit();
        // SAFETY: `raw` is a valid, properly aligned out-pointer for
        // `sigemptyset`, which fully initializes it.
        unsafe {
            libc::sigemptyset(raw.as_mut_ptr());
        }
        SignalSet {
            // SAFETY: `sigemptyset` above initialized `raw`.
            raw: unsafe { raw.assume_init() },
        }
    }

    /// Returns a set containing every signal.
    pub fn full() -> Self {
        let mut raw = std::mem::MaybeUninit::uninit();
        // SAFETY: `raw` is a valid out-pointer for `sigfillset`.
        unsafe {
            libc::sigfillset(raw.as_mut_ptr());
        }
        SignalSet {
            // SAFETY: `sigfillset` above initialized `raw`.
            raw: unsafe { raw.assume_init() },
        }
    }

    /// Adds or removes `signal` from the set.
    pub fn set(&mut self, signal: i32, value: bool) -> &mut Self {
        // SAFETY: `self.raw` is a valid, initialized `sigset_t`.
        unsafe {
            if value {
                libc::sigaddset(&mut self.raw, signal);
            } else {
                libc::sigdelset(&mut self.raw, signal);
            }
        }
        self
    }

    /// Removes `signal` from the set.
    pub fn reset(&mut self, signal: i32) -> &mut Self {
        self.set(signal, false)
    }

    /// Returns `true` iff `signal` is present in the set.
    pub fn test(&self, signal: i32) -> bool {
        // SAFETY: `self.raw` is a valid, initialized `sigset_t`.
        unsafe { libc::sigismember(&self.raw, signal) == 1 }
    }

    pub(crate) fn as_ptr(&self) -> *const libc::sigset_t {
        &self.raw
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut libc::sigset_t {
        &mut self.raw
    }
}

impl Default for SignalSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_test() {
        let mut set = SignalSet::new();
        assert!(!set.test(libc::SIGUSR1));
        set.set(libc::SIGUSR1, true);
        assert!(set.test(libc::SIGUSR1));
        set.reset(libc::SIGUSR1);
        assert!(!set.test(libc::SIGUSR1));
    }

    #[test]
    fn full_contains_everything_tested() {
        let full = SignalSet::full();
        assert!(full.test(libc::SIGUSR2));
    }
}
