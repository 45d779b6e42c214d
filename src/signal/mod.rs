//! Process-wide signal-handler configuration.
//!
//! Grounded on `examples/original_source/src/os/signaling/handler_configuration.cc`
//! (the `signal_configuration`/`signal_data`/`handler_configuration_impl`
//! reconciliation algorithm) and `SignalNumberSet.hh`. The native
//! catch-function/weak-pointer dance in the original is replaced by a pair
//! of file-scope atomics: a signal handler is not an async-signal-safe
//! place to take a lock, so there is no `Mutex` anywhere on this path (see
//! `DESIGN.md`).

use crate::error::{Failure, Result};
use crate::sys::{MaskChangeHow, SignalAction as NativeAction, SignalSet, SysApi};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

const NSIG: usize = 64;

static ACTIVE: AtomicBool = AtomicBool::new(false);
const ZERO_COUNT: AtomicU64 = AtomicU64::new(0);
static CATCH_COUNTS: [AtomicU64; NSIG] = [ZERO_COUNT; NSIG];

/// Called from the native signal handler. Async-signal-safe: a single
/// bounds check and a relaxed atomic increment, nothing else.
extern "C" fn native_catch_signal(signal: i32) {
    if !ACTIVE.load(Ordering::Relaxed) {
        return;
    }
    if let Ok(idx) = usize::try_from(signal) {
        if idx < NSIG {
            CATCH_COUNTS[idx].fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Test-only hook that invokes the native catch function directly, standing
/// in for an actual signal delivery. Exposed outside `#[cfg(test)]` behind
/// the `test-util` feature so the black-box suite under `tests/` can drive
/// it too.
#[cfg(any(test, feature = "test-util"))]
pub fn catch_for_test(signal: i32) {
    native_catch_signal(signal);
}

/// The single per-signal action set by [`SignalConfiguration::set_trap`].
/// Runs after user handlers, per the glossary in `SPEC_FULL.md`.
#[derive(Clone)]
pub enum TrapAction {
    /// Resort to the OS-dependent default action.
    Default,
    /// Ignore the signal.
    Ignore,
    /// Call the given function when the trap runs.
    Handler(Rc<dyn Fn(i32)>),
}

/// The condition under which [`SignalConfiguration::set_trap`] should fail.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum SettingPolicy {
    /// Overwrite any pre-existing action.
    Force,
    /// Fail if the signal's inherited disposition was `Ignore`.
    FailIfIgnored,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ActionType {
    Default,
    Ignore,
    Handler,
}

fn needs_blocking(a: ActionType) -> bool {
    a == ActionType::Handler
}

fn native_action_for(a: ActionType) -> NativeAction {
    match a {
        ActionType::Default => NativeAction::Default,
        ActionType::Ignore => NativeAction::Ignore,
        ActionType::Handler => NativeAction::Handler(native_catch_signal),
    }
}

/// A canceler for a single handler registered via
/// [`SignalConfiguration::add_handler`]. Idempotent: calling it more than
/// once after the first is a no-op.
pub struct Canceler {
    signal: i32,
    handler_id: u64,
    config: Rc<SignalConfiguration>,
    canceled: std::cell::Cell<bool>,
}

impl Canceler {
    /// Removes the handler and reconciles the native disposition.
    pub fn cancel(&self) -> Result<()> {
        if self.canceled.get() {
            return Ok(());
        }
        self.canceled.set(true);
        self.config.remove_handler(self.signal, self.handler_id);
        self.config.reconcile(self.signal)
    }
}

impl Drop for Canceler {
    fn drop(&mut self) {
        let _ = self.cancel();
    }
}

struct SignalEntry {
    handlers: Vec<(u64, Rc<dyn Fn(i32)>)>,
    next_handler_id: u64,
    trap: TrapAction,
    initial_action: Option<NativeAction>,
    native_action: Option<ActionType>,
}

impl SignalEntry {
    fn new() -> Self {
        SignalEntry {
            handlers: Vec::new(),
            next_handler_id: 0,
            trap: TrapAction::Default,
            initial_action: None,
            native_action: None,
        }
    }

    fn desired_action_type(&self) -> ActionType {
        if !self.handlers.is_empty() {
            return ActionType::Handler;
        }
        match &self.trap {
            TrapAction::Default => ActionType::Default,
            TrapAction::Ignore => ActionType::Ignore,
            TrapAction::Handler(_) => ActionType::Handler,
        }
    }

    fn call_handlers(&self, signal: i32) {
        for (_, handler) in &self.handlers {
            handler(signal);
        }
        if let TrapAction::Handler(trap) = &self.trap {
            trap(signal);
        }
    }
}

/// Process-wide registry mapping each signal number to a stack of handlers
/// and one trap action; owns the native signal disposition and the
/// blocking mask the awaiter must pass to `pselect`.
///
/// `SPEC_FULL.md` R7: at most one live instance should exist at a time;
/// the native catch function is process-global state and cannot
/// distinguish between coexisting instances.
pub struct SignalConfiguration {
    api: Rc<dyn SysApi>,
    entries: RefCell<HashMap<i32, SignalEntry>>,
    initial_mask: RefCell<Option<SignalSet>>,
    mask_for_wait: RefCell<Option<SignalSet>>,
}

impl SignalConfiguration {
    /// Creates a new handler configuration backed by `api`. Marks the
    /// process-wide native catch function active.
    pub fn new(api: Rc<dyn SysApi>) -> Rc<Self> {
        ACTIVE.store(true, Ordering::Relaxed);
        Rc::new(SignalConfiguration {
            api,
            entries: RefCell::new(HashMap::new()),
            initial_mask: RefCell::new(None),
            mask_for_wait: RefCell::new(None),
        })
    }

    fn initialize_masks(&self) -> Result<()> {
        if self.mask_for_wait.borrow().is_some() {
            return Ok(());
        }
        let mut initial = self.api.create_signal_set();
        self.api
            .sigprocmask(MaskChangeHow::Block, None, Some(&mut initial))
            .map_err(Failure::Os)?;
        *self.mask_for_wait.borrow_mut() = Some(initial.clone());
        *self.initial_mask.borrow_mut() = Some(initial);
        Ok(())
    }

    /// Pushes a handler onto signal `n`'s stack. Returns a [`Canceler`]
    /// that removes it and reconciles the native disposition.
    pub fn add_handler(
        self: &Rc<Self>,
        n: i32,
        handler: Rc<dyn Fn(i32)>,
    ) -> Result<Canceler> {
        let handler_id = {
            let mut entries = self.entries.borrow_mut();
            let entry = entries.entry(n).or_insert_with(SignalEntry::new);
            let id = entry.next_handler_id;
            entry.next_handler_id += 1;
            entry.handlers.push((id, handler));
            id
        };

        if let Err(e) = self.reconcile(n) {
            self.remove_handler(n, handler_id);
            return Err(e);
        }

        Ok(Canceler {
            signal: n,
            handler_id,
            config: Rc::clone(self),
            canceled: std::cell::Cell::new(false),
        })
    }

    fn remove_handler(&self, n: i32, handler_id: u64) {
        if let Some(entry) = self.entries.borrow_mut().get_mut(&n) {
            entry.handlers.retain(|(id, _)| *id != handler_id);
        }
    }

    /// Sets (or clears) the trap action for signal `n`.
    pub fn set_trap(&self, n: i32, action: TrapAction, policy: SettingPolicy) -> Result<()> {
        if policy == SettingPolicy::FailIfIgnored {
            let initial = self.observe_initial_action(n)?;
            if initial == NativeAction::Ignore {
                log::warn!(
                    "refusing to set a trap for {}: inherited disposition was Ignore",
                    crate::diagnostics::signal_name(n)
                );
                return Err(Failure::InitiallyIgnored(n));
            }
        }

        self.entries
            .borrow_mut()
            .entry(n)
            .or_insert_with(SignalEntry::new)
            .trap = action;
        self.reconcile(n)
    }

    fn observe_initial_action(&self, n: i32) -> Result<NativeAction> {
        {
            let entries = self.entries.borrow();
            if let Some(entry) = entries.get(&n) {
                if let Some(initial) = entry.initial_action {
                    return Ok(initial);
                }
            }
        }

        let mut old = NativeAction::Default;
        self.api
            .sigaction(n, None, Some(&mut old))
            .map_err(Failure::Os)?;

        self.entries
            .borrow_mut()
            .entry(n)
            .or_insert_with(SignalEntry::new)
            .initial_action = Some(old);
        Ok(old)
    }

    /// The reconciliation algorithm in `SPEC_FULL.md` §4.4: brings the
    /// native disposition and the `pselect` mask bit for `n` in line with
    /// the current handler stack and trap action.
    fn reconcile(&self, n: i32) -> Result<()> {
        self.initialize_masks()?;

        let desired = {
            let entries = self.entries.borrow();
            entries
                .get(&n)
                .map(SignalEntry::desired_action_type)
                .unwrap_or(ActionType::Default)
        };

        let already_applied = self
            .entries
            .borrow()
            .get(&n)
            .and_then(|e| e.native_action)
            == Some(desired);
        if already_applied {
            log::trace!(
                "{} disposition already {:?}, nothing to reconcile",
                crate::diagnostics::signal_name(n),
                desired
            );
            return Ok(());
        }

        log::debug!(
            "reconciling {} to {:?}",
            crate::diagnostics::signal_name(n),
            desired
        );

        if needs_blocking(desired) {
            let mut block_n = self.api.create_signal_set();
            block_n.set(n, true);
            self.api
                .sigprocmask(MaskChangeHow::Block, Some(&block_n), None)
                .map_err(Failure::Os)?;
        }

        let native = native_action_for(desired);
        let mut old = NativeAction::Default;
        self.api
            .sigaction(n, Some(native), Some(&mut old))
            .map_err(Failure::Os)?;

        let initial_had_n = self
            .initial_mask
            .borrow()
            .as_ref()
            .map(|m| m.test(n))
            .unwrap_or(false);

        if !needs_blocking(desired) && !initial_had_n {
            let mut unblock_n = self.api.create_signal_set();
            unblock_n.set(n, true);
            self.api
                .sigprocmask(MaskChangeHow::Unblock, Some(&unblock_n), None)
                .map_err(Failure::Os)?;
        }

        if let Some(mask) = self.mask_for_wait.borrow_mut().as_mut() {
            mask.set(n, desired == ActionType::Default && initial_had_n);
        }

        {
            let mut entries = self.entries.borrow_mut();
            let entry = entries.entry(n).or_insert_with(SignalEntry::new);
            if entry.initial_action.is_none() {
                entry.initial_action = Some(old);
            }
            entry.native_action = Some(desired);
        }

        Ok(())
    }

    /// The signal mask the awaiter must pass to `pselect`. `None` until
    /// the first configuration change ("use the current process mask").
    pub fn mask_for_wait(&self) -> Option<SignalSet> {
        self.mask_for_wait.borrow().clone()
    }

    /// Drains the received-but-undelivered counters and invokes handlers
    /// and the trap for each count, on the caller's task.
    pub fn run_pending_handlers(&self) {
        let signals: Vec<i32> = self.entries.borrow().keys().copied().collect();
        for n in signals {
            let idx = match usize::try_from(n) {
                Ok(idx) if idx < NSIG => idx,
                _ => continue,
            };
            let count = CATCH_COUNTS[idx].swap(0, Ordering::Relaxed);
            if count == 0 {
                continue;
            }
            log::trace!(
                "draining {} catch(es) of {}",
                count,
                crate::diagnostics::signal_name(n)
            );
            let entries = self.entries.borrow();
            if let Some(entry) = entries.get(&n) {
                for _ in 0..count {
                    entry.call_handlers(n);
                }
            }
        }
    }
}

impl Drop for SignalConfiguration {
    fn drop(&mut self) {
        ACTIVE.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::mock::MockApi;
    use std::cell::Cell;
    use std::sync::Mutex;

    // Signal handler state is process-global; serialize tests that touch it.
    static TEST_GUARD: Mutex<()> = Mutex::new(());

    fn config() -> (Rc<SignalConfiguration>, Rc<MockApi>) {
        let api = Rc::new(MockApi::new());
        let config = SignalConfiguration::new(api.clone() as Rc<dyn SysApi>);
        (config, api)
    }

    #[test]
    fn add_handler_installs_native_handler_disposition() {
        let _guard = TEST_GUARD.lock().unwrap();
        let (config, api) = config();
        let calls = Rc::new(Cell::new(0));
        let calls2 = Rc::clone(&calls);
        let _canceler = config
            .add_handler(libc::SIGUSR1, Rc::new(move |_| calls2.set(calls2.get() + 1)))
            .unwrap();

        assert_eq!(
            api.disposition(libc::SIGUSR1),
            Some(crate::sys::SignalAction::Handler(native_catch_signal))
        );
    }

    #[test]
    fn canceler_restores_native_disposition() {
        let _guard = TEST_GUARD.lock().unwrap();
        let (config, api) = config();
        let canceler = config
            .add_handler(libc::SIGUSR1, Rc::new(|_| {}))
            .unwrap();
        canceler.cancel().unwrap();

        assert_eq!(
            api.disposition(libc::SIGUSR1),
            Some(crate::sys::SignalAction::Default)
        );
    }

    #[test]
    fn canceler_is_idempotent() {
        let _guard = TEST_GUARD.lock().unwrap();
        let (config, _api) = config();
        let canceler = config
            .add_handler(libc::SIGUSR1, Rc::new(|_| {}))
            .unwrap();
        canceler.cancel().unwrap();
        canceler.cancel().unwrap();
    }

    #[test]
    fn run_pending_handlers_invokes_exactly_k_times_in_insertion_order() {
        let _guard = TEST_GUARD.lock().unwrap();
        let (config, _api) = config();
        let order = Rc::new(RefCell::new(Vec::new()));

        let order1 = Rc::clone(&order);
        let _c1 = config
            .add_handler(libc::SIGUSR2, Rc::new(move |_| order1.borrow_mut().push(1)))
            .unwrap();
        let order2 = Rc::clone(&order);
        let _c2 = config
            .add_handler(libc::SIGUSR2, Rc::new(move |_| order2.borrow_mut().push(2)))
            .unwrap();

        catch_for_test(libc::SIGUSR2);
        catch_for_test(libc::SIGUSR2);
        config.run_pending_handlers();

        assert_eq!(*order.borrow(), vec![1, 2, 1, 2]);
    }

    #[test]
    fn set_trap_fail_if_ignored_refuses_on_ignored_signal() {
        let _guard = TEST_GUARD.lock().unwrap();
        let (config, api) = config();
        api.sigaction(libc::SIGPIPE, Some(crate::sys::SignalAction::Ignore), None)
            .unwrap();

        let err = config
            .set_trap(libc::SIGPIPE, TrapAction::Default, SettingPolicy::FailIfIgnored)
            .unwrap_err();
        assert!(matches!(err, Failure::InitiallyIgnored(n) if n == libc::SIGPIPE));
    }

    #[test]
    fn set_trap_force_overwrites_ignored_signal() {
        let _guard = TEST_GUARD.lock().unwrap();
        let (config, api) = config();
        api.sigaction(libc::SIGPIPE, Some(crate::sys::SignalAction::Ignore), None)
            .unwrap();

        config
            .set_trap(libc::SIGPIPE, TrapAction::Handler(Rc::new(|_| {})), SettingPolicy::Force)
            .unwrap();
        assert_eq!(
            api.disposition(libc::SIGPIPE),
            Some(crate::sys::SignalAction::Handler(native_catch_signal))
        );
    }
}
