//! Minimal worker-execution manager.
//!
//! Each [`ManagedWorker`] owns one background thread. The manager starts and
//! stops them as a group and enforces the lifecycle
//! `Idle -> Running <-> Stopped -> Terminated`.

use crate::errors::{AdapterError, AdapterResult};

/// A component with its own background thread.
pub trait ManagedWorker: Send {
    fn name(&self) -> &str;

    /// Spawn the worker thread. Only called while not running.
    ///
    /// # Errors
    /// Returns `Err` if the thread could not be spawned.
    fn launch(&mut self) -> AdapterResult<()>;

    /// Ask the thread to finish and join it. Only called while running.
    fn halt(&mut self);

    fn is_running(&self) -> bool;
}

/// Lifecycle state of a [`WorkerManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Idle,
    Running,
    Stopped,
    Terminated,
}

pub struct WorkerManager {
    workers: Vec<Box<dyn ManagedWorker>>,
    state: ManagerState,
    launches: usize,
}

impl Default for WorkerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerManager {
    pub fn new() -> Self {
        Self {
            workers: Vec::new(),
            state: ManagerState::Idle,
            launches: 0,
        }
    }

    /// Register a worker. It is not started until the next `start_all`.
    ///
    /// # Errors
    /// Returns `Err` after `terminate`.
    pub fn add_object(&mut self, worker: Box<dyn ManagedWorker>) -> AdapterResult<()> {
        self.ensure_not_terminated()?;
        tracing::debug!(worker = worker.name(), "worker registered");
        self.workers.push(worker);
        Ok(())
    }

    /// Launch every worker that is not already running.
    ///
    /// # Errors
    /// Returns `Err` after `terminate`, or the first launch failure. Workers
    /// launched before the failure keep running.
    pub fn start_all(&mut self) -> AdapterResult<()> {
        self.ensure_not_terminated()?;
        for worker in &mut self.workers {
            if worker.is_running() {
                tracing::trace!(worker = worker.name(), "already running");
                continue;
            }
            worker.launch()?;
            self.launches += 1;
            tracing::debug!(worker = worker.name(), "worker launched");
        }
        self.state = ManagerState::Running;
        Ok(())
    }

    /// Halt every running worker. A no-op when nothing runs.
    pub fn stop_all(&mut self) {
        if self.state == ManagerState::Terminated {
            return;
        }
        self.halt_running();
        if self.state == ManagerState::Running {
            self.state = ManagerState::Stopped;
        }
    }

    /// Halt everything for good. Later starts fail.
    pub fn terminate(&mut self) {
        if self.state == ManagerState::Terminated {
            return;
        }
        self.halt_running();
        self.state = ManagerState::Terminated;
        tracing::info!(workers = self.workers.len(), "worker manager terminated");
    }

    /// `true` while at least one worker thread is alive.
    pub fn is_running(&self) -> bool {
        self.workers.iter().any(|w| w.is_running())
    }

    pub const fn state(&self) -> ManagerState {
        self.state
    }

    /// Number of worker threads launched so far.
    pub const fn launches(&self) -> usize {
        self.launches
    }

    fn halt_running(&mut self) {
        for worker in &mut self.workers {
            if worker.is_running() {
                worker.halt();
                tracing::debug!(worker = worker.name(), "worker halted");
            }
        }
    }

    fn ensure_not_terminated(&self) -> AdapterResult<()> {
        if self.state == ManagerState::Terminated {
            return Err(AdapterError::InvalidState(
                "worker manager has been terminated".into(),
            ));
        }
        Ok(())
    }
}

impl Drop for WorkerManager {
    fn drop(&mut self) {
        self.halt_running();
    }
}
