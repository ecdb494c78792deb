use std::{collections::VecDeque, sync::Arc};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use crate::{
    error::Throwable,
    internal,
    object::value::{ObjectRef, RuntimeValue},
    thread::{Outcome, Thread, ThreadHandle, ThreadInfo},
    vm::VM,
};

/// The completion record of a VM thread
#[derive(Debug)]
pub struct ThreadResult {
    pub thread: ThreadInfo,
    /// A host-level failure that ended the thread
    pub error: Option<Throwable>,
    /// A guest exception nothing caught
    pub uncaught: Option<ObjectRef>,
    pub value: Option<RuntimeValue>,
}

impl ThreadResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.uncaught.is_none()
    }
}

#[derive(Debug, Default)]
struct ExecutorState {
    running: usize,
    daemons: usize,
    finished: VecDeque<ThreadResult>,
}

impl ExecutorState {
    fn non_daemons(&self) -> usize {
        self.running - self.daemons
    }
}

/// Runs every VM thread on a host thread of its own, and collects their results
#[derive(Debug)]
pub struct Executor {
    state: Mutex<ExecutorState>,
    changed: Condvar,
    stack_size: usize,
}

impl Executor {
    pub fn new(stack_size: usize) -> Self {
        Self {
            state: Mutex::new(ExecutorState::default()),
            changed: Condvar::new(),
            stack_size,
        }
    }

    /// Start `body` on a new host thread. The VM thread counts as alive as soon
    /// as this returns.
    pub fn spawn<F>(&self, vm: Arc<VM>, handle: Arc<ThreadHandle>, body: F) -> Result<ThreadInfo, Throwable>
    where
        F: FnOnce(&mut Thread) -> Result<Outcome, Throwable> + Send + 'static,
    {
        let daemon = handle.is_daemon();
        let info = ThreadInfo {
            id: handle.id(),
            name: handle.name().to_string(),
            daemon,
        };

        {
            let mut state = self.state.lock();
            state.running += 1;
            if daemon {
                state.daemons += 1;
            }
        }
        handle.set_alive(true);

        let spawned = std::thread::Builder::new()
            .name(info.name.clone())
            .stack_size(self.stack_size)
            .spawn({
                let handle = handle.clone();
                move || {
                    let mut thread = Thread::new(vm.clone(), handle);
                    debug!("Thread \"{}\" started", thread.handle().name());

                    let outcome = body(&mut thread);
                    let result = thread.finish(outcome);
                    vm.executor().finished(result);
                }
            });

        if let Err(e) = spawned {
            error!("Could not spawn host thread for \"{}\": {}", info.name, e);
            handle.set_alive(false);
            self.release(daemon);
            return Err(internal!("failed to spawn thread {}: {}", info.name, e));
        }

        Ok(info)
    }

    fn release(&self, daemon: bool) {
        let mut state = self.state.lock();
        state.running -= 1;
        if daemon {
            state.daemons -= 1;
        }

        self.changed.notify_all();
    }

    pub(crate) fn finished(&self, result: ThreadResult) {
        let mut state = self.state.lock();
        state.running -= 1;
        if result.thread.daemon {
            state.daemons -= 1;
        }

        state.finished.push_back(result);
        self.changed.notify_all();
    }

    pub fn running(&self) -> usize {
        self.state.lock().running
    }

    /// Completion records as threads finish. Ends once nothing is queued and
    /// no non-daemon thread is left running.
    pub fn completions(&self) -> Completions<'_> {
        Completions { executor: self }
    }
}

pub struct Completions<'a> {
    executor: &'a Executor,
}

impl Iterator for Completions<'_> {
    type Item = ThreadResult;

    fn next(&mut self) -> Option<Self::Item> {
        let mut state = self.executor.state.lock();

        loop {
            if let Some(result) = state.finished.pop_front() {
                return Some(result);
            }

            if state.non_daemons() == 0 {
                return None;
            }

            self.executor.changed.wait(&mut state);
        }
    }
}
