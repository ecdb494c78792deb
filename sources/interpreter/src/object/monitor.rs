use std::{
    collections::{HashSet, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::thread::ThreadId;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorError {
    #[error("current thread {thread} is not the owner of this monitor")]
    NotOwner { thread: ThreadId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Notified,
    TimedOut,
    Interrupted,
}

#[derive(Debug, Default)]
struct MonitorState {
    owner: Option<ThreadId>,
    count: usize,
    entering: VecDeque<ThreadId>,
    waiting: VecDeque<Waiter>,
    notified: HashSet<u64>,
    next_ticket: u64,
}

#[derive(Debug)]
struct Waiter {
    thread: ThreadId,
    ticket: u64,
}

impl MonitorState {
    fn forget_waiter(&mut self, ticket: u64) {
        self.waiting.retain(|w| w.ticket != ticket);
    }

    fn leave_entry_queue(&mut self, thread: ThreadId) {
        if let Some(pos) = self.entering.iter().position(|t| *t == thread) {
            self.entering.remove(pos);
        }
    }
}

#[derive(Debug, Default)]
struct MonitorInner {
    state: Mutex<MonitorState>,
    cond: Condvar,
}

/// A reentrant lock with a wait-set, one per object and per class.
/// Cloning produces another handle to the same monitor.
#[derive(Debug, Clone, Default)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn same_as(&self, other: &Monitor) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn enter(&self, thread: ThreadId) {
        let mut state = self.inner.state.lock();

        if state.owner.is_none() || state.owner == Some(thread) {
            state.owner = Some(thread);
            state.count += 1;
            return;
        }

        state.entering.push_back(thread);
        while state.owner.is_some() {
            self.inner.cond.wait(&mut state);
        }

        state.leave_entry_queue(thread);
        state.owner = Some(thread);
        state.count = 1;
    }

    pub fn try_enter(&self, thread: ThreadId) -> bool {
        let mut state = self.inner.state.lock();

        if state.owner.is_none() || state.owner == Some(thread) {
            state.owner = Some(thread);
            state.count += 1;
            true
        } else {
            false
        }
    }

    pub fn exit(&self, thread: ThreadId) -> Result<(), MonitorError> {
        let mut state = self.inner.state.lock();
        if state.owner != Some(thread) {
            return Err(MonitorError::NotOwner { thread });
        }

        state.count -= 1;
        if state.count == 0 {
            state.owner = None;
            // Entrants re-race for the lock, nobody is handed it directly
            self.inner.cond.notify_all();
        }

        Ok(())
    }

    /// Release the monitor, sleep in the wait-set, then take it back with the
    /// same reentrancy count. `None` waits until notified or interrupted.
    pub fn wait(
        &self,
        thread: ThreadId,
        timeout: Option<Duration>,
        interrupt: &Interrupt,
    ) -> Result<WaitOutcome, MonitorError> {
        // Registered before taking the state lock, raise() locks in the same order
        interrupt.park_on(self.clone());

        let mut state = self.inner.state.lock();
        if state.owner != Some(thread) {
            drop(state);
            interrupt.unpark();
            return Err(MonitorError::NotOwner { thread });
        }

        if interrupt.is_set() {
            drop(state);
            interrupt.unpark();
            interrupt.clear();
            return Ok(WaitOutcome::Interrupted);
        }

        let saved = state.count;
        state.owner = None;
        state.count = 0;

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waiting.push_back(Waiter { thread, ticket });
        self.inner.cond.notify_all();

        let deadline = timeout.map(|t| Instant::now() + t);
        let outcome = loop {
            if state.notified.remove(&ticket) {
                break WaitOutcome::Notified;
            }

            if interrupt.is_set() {
                state.forget_waiter(ticket);
                break WaitOutcome::Interrupted;
            }

            match deadline {
                Some(deadline) => {
                    if self.inner.cond.wait_until(&mut state, deadline).timed_out() {
                        if state.notified.remove(&ticket) {
                            break WaitOutcome::Notified;
                        }

                        state.forget_waiter(ticket);
                        break WaitOutcome::TimedOut;
                    }
                }
                None => self.inner.cond.wait(&mut state),
            }
        };

        state.entering.push_back(thread);
        while state.owner.is_some() {
            self.inner.cond.wait(&mut state);
        }

        state.leave_entry_queue(thread);
        state.owner = Some(thread);
        state.count = saved;
        drop(state);

        interrupt.unpark();
        if outcome == WaitOutcome::Interrupted {
            interrupt.clear();
        }

        Ok(outcome)
    }

    /// Wake the longest waiting thread, if any
    pub fn notify(&self, thread: ThreadId) -> Result<(), MonitorError> {
        let mut state = self.inner.state.lock();
        if state.owner != Some(thread) {
            return Err(MonitorError::NotOwner { thread });
        }

        if let Some(waiter) = state.waiting.pop_front() {
            state.notified.insert(waiter.ticket);
            self.inner.cond.notify_all();
        }

        Ok(())
    }

    pub fn notify_all(&self, thread: ThreadId) -> Result<(), MonitorError> {
        let mut state = self.inner.state.lock();
        if state.owner != Some(thread) {
            return Err(MonitorError::NotOwner { thread });
        }

        while let Some(waiter) = state.waiting.pop_front() {
            state.notified.insert(waiter.ticket);
        }
        self.inner.cond.notify_all();

        Ok(())
    }

    fn wake(&self) {
        let _state = self.inner.state.lock();
        self.inner.cond.notify_all();
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.inner.state.lock().owner
    }

    pub fn holds(&self, thread: ThreadId) -> bool {
        self.owner() == Some(thread)
    }

    pub fn entry_count(&self) -> usize {
        self.inner.state.lock().count
    }

    pub fn waiting(&self) -> Vec<ThreadId> {
        self.inner
            .state
            .lock()
            .waiting
            .iter()
            .map(|w| w.thread)
            .collect()
    }

    pub fn entering(&self) -> Vec<ThreadId> {
        self.inner.state.lock().entering.iter().copied().collect()
    }
}

/// A thread's interruption signal. Raising it wakes the monitor wait or the
/// sleep the thread is blocked in, if any.
#[derive(Debug, Default)]
pub struct Interrupt {
    flag: AtomicBool,
    parked_on: Mutex<Option<Monitor>>,
    sleep_lock: Mutex<()>,
    sleep_cond: Condvar,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.flag.store(true, Ordering::SeqCst);

        if let Some(monitor) = self.parked_on.lock().as_ref() {
            monitor.wake();
        }

        let _sleeping = self.sleep_lock.lock();
        self.sleep_cond.notify_all();
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Read and clear the flag
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }

    /// Sleep for `duration`, returning `true` if cut short by an interrupt.
    /// The flag is cleared when that happens.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = self.sleep_lock.lock();

        loop {
            if self.take() {
                return true;
            }

            if self.sleep_cond.wait_until(&mut guard, deadline).timed_out() {
                return self.take();
            }
        }
    }

    fn park_on(&self, monitor: Monitor) {
        *self.parked_on.lock() = Some(monitor);
    }

    fn unpark(&self) {
        *self.parked_on.lock() = None;
    }
}
