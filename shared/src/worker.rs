//! Worker threads with cooperative cancellation.
//!
//! Loops running on a [`Worker`] check their [`StopFlag`] every time they
//! wake up. Stopping a worker never interrupts it mid-send; it returns at its
//! next wake-up and is then joined.

use crate::error::WorkerError;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// Locks `mutex`, recovering the data if another thread panicked while
/// holding it. Roster mutations keep their columns aligned at every point a
/// panic could occur, so the data is still consistent.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared flag telling one or more workers to return.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A named OS thread running a loop that observes a [`StopFlag`].
///
/// Dropping a worker raises its flag and joins it.
#[derive(Debug)]
pub struct Worker<T> {
    name: String,
    stop: StopFlag,
    handle: Option<JoinHandle<T>>,
}

impl<T: Send + 'static> Worker<T> {
    pub fn spawn<F>(name: impl Into<String>, stop: StopFlag, body: F) -> Result<Self, WorkerError>
    where
        F: FnOnce(StopFlag) -> T + Send + 'static,
    {
        let name = name.into();
        let flag = stop.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || body(flag))
            .map_err(|source| WorkerError::Spawn {
                name: name.clone(),
                source,
            })?;
        debug!("spawned worker `{}`", name);

        Ok(Self {
            name,
            stop,
            handle: Some(handle),
        })
    }
}

impl<T> Worker<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raises the stop flag. Every worker sharing the flag sees it.
    pub fn stop(&self) {
        self.stop.raise();
    }

    /// True once the thread body has returned.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the thread body to return and hands back its result.
    pub fn join(mut self) -> Result<T, WorkerError> {
        self.join_inner()
    }

    pub fn stop_and_join(self) -> Result<T, WorkerError> {
        self.stop();
        self.join()
    }

    fn join_inner(&mut self) -> Result<T, WorkerError> {
        let handle = self.handle.take().ok_or_else(|| WorkerError::Panicked {
            name: self.name.clone(),
        })?;
        let result = handle.join().map_err(|_| WorkerError::Panicked {
            name: self.name.clone(),
        });
        debug!("joined worker `{}`", self.name);
        result
    }
}

impl<T> Drop for Worker<T> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop.raise();
            if self.join_inner().is_err() {
                warn!("worker `{}` panicked before it was dropped", self.name);
            }
        }
    }
}
