//! Bit-set over file descriptor values, grounded on
//! `examples/original_source/src/os/io/FileDescriptorSet.hh`.

use crate::error::Failure;
use std::os::unix::io::RawFd;

/// A bit-set over file descriptor values `0..MAX_FDS`.
///
/// Wraps `libc::fd_set`. Inserting a descriptor at or beyond
/// [`FdSet::MAX_FDS`] is a domain error rather than undefined behaviour,
/// unlike raw `FD_SET`.
pub struct FdSet {
    raw: libc::fd_set,
    highest: Option<RawFd>,
}

impl FdSet {
    /// The platform's `fd_set` capacity (`FD_SETSIZE`).
    pub const MAX_FDS: RawFd = libc::FD_SETSIZE as RawFd;

    /// Creates a new, empty set.
    pub fn new() -> Self {
        // SAFETY: `fd_set` is a POD bitmap type; zero-initializing is the
        // same as `FD_ZERO`.
        let raw = unsafe { std::mem::zeroed() };
        FdSet { raw, highest: None }
    }

    /// Inserts `fd`. Returns [`Failure::Domain`] if `fd` is negative or at
    /// or beyond [`FdSet::MAX_FDS`].
    pub fn insert(&mut self, fd: RawFd) -> Result<(), Failure> {
        if fd < 0 || fd >= Self::MAX_FDS {
            return Err(Failure::Domain(fd));
        }
        // SAFETY: `fd` was just checked to be within `0..FD_SETSIZE`, and
        // `self.raw` is a valid, owned `fd_set`.
        unsafe { libc::FD_SET(fd, &mut self.raw) };
        self.highest = Some(self.highest.map_or(fd, |h| h.max(fd)));
        Ok(())
    }

    /// Returns `true` iff `fd` is present in the set.
    pub fn contains(&self, fd: RawFd) -> bool {
        if fd < 0 || fd >= Self::MAX_FDS {
            return false;
        }
        // SAFETY: `fd` is within range and `self.raw` is a valid `fd_set`.
        unsafe { libc::FD_ISSET(fd, &self.raw) }
    }

    /// The highest descriptor inserted so far, if any.
    pub fn highest(&self) -> Option<RawFd> {
        self.highest
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut libc::fd_set {
        &mut self.raw
    }
}

impl Default for FdSet {
    fn default() -> Self {
        Self::new()
    }
}
