//! Cancellable timers and background tasks
//!
//! Each pending wait (a timeout, a backoff, an in-flight `play()`) is a tokio
//! task keyed by what it is waiting for. Re-arming a key aborts the task it
//! replaces, and everything left is aborted on drop.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Keyed set of abortable tasks
pub struct PendingTasks<K: Eq + Hash> {
    tasks: HashMap<K, JoinHandle<()>>,
}

impl<K: Eq + Hash + Copy> PendingTasks<K> {
    pub fn new() -> Self {
        Self { tasks: HashMap::new() }
    }

    /// Run `fire` after `delay` under `key`
    pub fn arm<F>(&mut self, key: K, delay: Duration, fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn(key, async move {
            tokio::time::sleep(delay).await;
            fire();
        });
    }

    /// Run `task` under `key`
    pub fn spawn<F>(&mut self, key: K, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(previous) = self.tasks.insert(key, tokio::spawn(task)) {
            previous.abort();
        }
    }

    /// Abort the task under `key`, if any
    pub fn cancel(&mut self, key: K) {
        if let Some(task) = self.tasks.remove(&key) {
            task.abort();
        }
    }

    /// True if a task under `key` has not finished yet
    pub fn is_armed(&self, key: K) -> bool {
        self.tasks.get(&key).map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Abort everything
    pub fn cancel_all(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }

    /// Number of tasks still running
    pub fn len(&self) -> usize {
        self.tasks.values().filter(|t| !t.is_finished()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Copy> Default for PendingTasks<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash> Drop for PendingTasks<K> {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}
