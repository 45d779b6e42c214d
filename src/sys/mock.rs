//! A scriptable, in-memory [`SysApi`] double used by the `signal` and
//! `event` unit tests, the same role `HandlerConfigurationApiTestHelper.hh`
//! plays for the C++ original.

use super::{FdSet, MaskChangeHow, SignalAction, SignalSet, SysApi};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant, SystemTime};

/// One scripted response to a `pselect` call.
pub struct PselectResponse {
    pub ready_reads: Vec<RawFd>,
    pub ready_writes: Vec<RawFd>,
    pub ready_errors: Vec<RawFd>,
    /// How far to advance the mock steady clock before returning, modelling
    /// the time actually spent blocked in the kernel.
    pub advance: Duration,
    pub result: std::io::Result<i32>,
}

impl PselectResponse {
    /// A response with no ready descriptors, just a clock advance.
    pub fn timeout(advance: Duration) -> Self {
        PselectResponse {
            ready_reads: Vec::new(),
            ready_writes: Vec::new(),
            ready_errors: Vec::new(),
            advance,
            result: Ok(0),
        }
    }

    /// A response reporting `fd` readable.
    pub fn readable(fd: RawFd, advance: Duration) -> Self {
        PselectResponse {
            ready_reads: vec![fd],
            ready_writes: Vec::new(),
            ready_errors: Vec::new(),
            advance,
            result: Ok(1),
        }
    }

    /// A response simulating an interrupted syscall (`EINTR`).
    pub fn interrupted() -> Self {
        PselectResponse {
            ready_reads: Vec::new(),
            ready_writes: Vec::new(),
            ready_errors: Vec::new(),
            advance: Duration::from_secs(0),
            result: Err(std::io::Error::from_raw_os_error(libc::EINTR)),
        }
    }
}

/// A deterministic [`SysApi`] implementation driven by a pre-loaded script
/// of `pselect` responses and a manually advanced steady clock.
pub struct MockApi {
    base: Instant,
    elapsed: Cell<Duration>,
    script: RefCell<VecDeque<PselectResponse>>,
    pselect_calls: RefCell<Vec<(RawFd, Option<Duration>)>>,
    dispositions: RefCell<HashMap<i32, SignalAction>>,
    mask: RefCell<SignalSet>,
}

impl MockApi {
    pub fn new() -> Self {
        MockApi {
            base: Instant::now(),
            elapsed: Cell::new(Duration::from_secs(0)),
            script: RefCell::new(VecDeque::new()),
            pselect_calls: RefCell::new(Vec::new()),
            dispositions: RefCell::new(HashMap::new()),
            mask: RefCell::new(SignalSet::new()),
        }
    }

    /// Queues a response to be returned by the next `pselect` call.
    pub fn push_response(&self, response: PselectResponse) {
        self.script.borrow_mut().push_back(response);
    }

    /// The `(fd_bound, timeout)` arguments observed by every `pselect` call
    /// so far, in order.
    pub fn pselect_calls(&self) -> Vec<(RawFd, Option<Duration>)> {
        self.pselect_calls.borrow().clone()
    }

    /// Advances the mock steady clock directly, without a `pselect` call.
    pub fn advance(&self, by: Duration) {
        self.elapsed.set(self.elapsed.get() + by);
    }

    /// The disposition currently installed for `signal`, if any.
    pub fn disposition(&self, signal: i32) -> Option<SignalAction> {
        self.dispositions.borrow().get(&signal).copied()
    }
}

impl Default for MockApi {
    fn default() -> Self {
        Self::new()
    }
}

impl SysApi for MockApi {
    fn steady_now(&self) -> Instant {
        self.base + self.elapsed.get()
    }

    fn system_now(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH + self.elapsed.get()
    }

    fn pselect(
        &self,
        fd_bound: RawFd,
        reads: Option<&mut FdSet>,
        writes: Option<&mut FdSet>,
        errors: Option<&mut FdSet>,
        timeout: Option<Duration>,
        _mask: Option<&SignalSet>,
    ) -> std::io::Result<i32> {
        self.pselect_calls.borrow_mut().push((fd_bound, timeout));

        let response = self
            .script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| PselectResponse::timeout(timeout.unwrap_or_default()));

        self.advance(response.advance);

        if let Some(set) = reads {
            *set = FdSet::new();
            for fd in &response.ready_reads {
                let _ = set.insert(*fd);
            }
        }
        if let Some(set) = writes {
            *set = FdSet::new();
            for fd in &response.ready_writes {
                let _ = set.insert(*fd);
            }
        }
        if let Some(set) = errors {
            *set = FdSet::new();
            for fd in &response.ready_errors {
                let _ = set.insert(*fd);
            }
        }

        response.result
    }

    fn sigprocmask(
        &self,
        how: MaskChangeHow,
        new: Option<&SignalSet>,
        old: Option<&mut SignalSet>,
    ) -> std::io::Result<()> {
        if let Some(slot) = old {
            *slot = self.mask.borrow().clone();
        }
        if let Some(new) = new {
            let mut mask = self.mask.borrow_mut();
            for signal in 1..64 {
                match how {
                    MaskChangeHow::Block => {
                        if new.test(signal) {
                            mask.set(signal, true);
                        }
                    }
                    MaskChangeHow::Unblock => {
                        if new.test(signal) {
                            mask.set(signal, false);
                        }
                    }
                    MaskChangeHow::Replace => {
                        mask.set(signal, new.test(signal));
                    }
                }
            }
        }
        Ok(())
    }

    fn sigaction(
        &self,
        signal: i32,
        new: Option<SignalAction>,
        old: Option<&mut SignalAction>,
    ) -> std::io::Result<()> {
        let mut dispositions = self.dispositions.borrow_mut();
        let previous = dispositions
            .get(&signal)
            .copied()
            .unwrap_or(SignalAction::Default);
        if let Some(slot) = old {
            *slot = previous;
        }
        if let Some(action) = new {
            dispositions.insert(signal, action);
        }
        Ok(())
    }
}
