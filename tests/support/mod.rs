//! Shared test helpers for the black-box suite under `tests/`.
//!
//! Grounded on the teacher's `env_logger::init()` calls at the top of its
//! integration tests and on `original_source/src/os/event/AwaiterTestHelper.hh`
//! for the pipe-pair setup used by the FD-condition tests.

use std::os::unix::io::RawFd;

/// Initializes `env_logger` once per test binary. Safe to call from every
/// test; `env_logger::init()` itself is idempotent-safe to call repeatedly
/// within a process (later calls are no-ops after the first succeeds).
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A connected pipe pair, closed automatically when dropped.
pub struct Pipe {
    pub read_fd: RawFd,
    pub write_fd: RawFd,
}

impl Pipe {
    pub fn new() -> Self {
        let mut fds = [0 as RawFd; 2];
        // SAFETY: `fds` is a valid, properly sized out-pointer for `pipe(2)`.
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0, "pipe(2) failed: {}", std::io::Error::last_os_error());
        Pipe {
            read_fd: fds[0],
            write_fd: fds[1],
        }
    }

    pub fn write_byte(&self) {
        let byte = [0u8; 1];
        // SAFETY: `write_fd` is an open, writable pipe end owned by `self`.
        let rc = unsafe { libc::write(self.write_fd, byte.as_ptr() as *const _, 1) };
        assert_eq!(rc, 1, "write(2) failed: {}", std::io::Error::last_os_error());
    }

    pub fn drain(&self) {
        let mut buf = [0u8; 64];
        // SAFETY: `read_fd` is an open, readable pipe end owned by `self`.
        unsafe { libc::read(self.read_fd, buf.as_mut_ptr() as *mut _, buf.len()) };
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        // SAFETY: both descriptors were opened by `Pipe::new` and are closed
        // exactly once, here.
        unsafe {
            libc::close(self.read_fd);
            libc::close(self.write_fd);
        }
    }
}
