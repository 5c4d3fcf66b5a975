//! Keyed update debouncer.
//!
//! # Responsibility
//! - Coalesce rapid submits into one action call per key after a quiet
//!   period.
//!
//! # Invariants
//! - Within one key, only the last value submitted during a quiet window
//!   is ever delivered; earlier values are dropped.
//! - Different keys never cancel each other. The debounce state is a map
//!   keyed by the logical update stream, not a single shared timer.
//! - Dropping the debouncer discards pending entries without firing.

use log::debug;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

enum Command<K, V> {
    Submit(K, V),
    Flush(Sender<()>),
    Shutdown,
}

struct Pending<V> {
    value: V,
    due: Instant,
}

/// Delay-and-coalesce dispatcher with one pending slot per key.
pub struct Debouncer<K, V> {
    tx: Sender<Command<K, V>>,
    worker: Option<JoinHandle<()>>,
}

impl<K, V> Debouncer<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Send + 'static,
{
    /// Creates a debouncer firing `action` once a key has been quiet for
    /// `quiet`.
    pub fn new(quiet: Duration, action: impl Fn(K, V) + Send + 'static) -> Self {
        let (tx, rx) = channel::<Command<K, V>>();

        let worker = thread::spawn(move || {
            let mut pending: HashMap<K, Pending<V>> = HashMap::new();

            loop {
                let now = Instant::now();
                let next_due = pending.values().map(|entry| entry.due).min();

                let command = match next_due {
                    Some(due) => match rx.recv_timeout(due.saturating_duration_since(now)) {
                        Ok(command) => Some(command),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    },
                    None => match rx.recv() {
                        Ok(command) => Some(command),
                        Err(_) => break,
                    },
                };

                match command {
                    Some(Command::Submit(key, value)) => {
                        pending.insert(
                            key,
                            Pending {
                                value,
                                due: Instant::now() + quiet,
                            },
                        );
                    }
                    Some(Command::Flush(done)) => {
                        let keys: Vec<K> = pending.keys().cloned().collect();
                        for key in keys {
                            if let Some(entry) = pending.remove(&key) {
                                action(key, entry.value);
                            }
                        }
                        let _ = done.send(());
                    }
                    Some(Command::Shutdown) => break,
                    None => {}
                }

                let now = Instant::now();
                let due_keys: Vec<K> = pending
                    .iter()
                    .filter(|(_, entry)| entry.due <= now)
                    .map(|(key, _)| key.clone())
                    .collect();
                for key in due_keys {
                    if let Some(entry) = pending.remove(&key) {
                        debug!("event=debounce_fire module=debounce pending={}", pending.len());
                        action(key, entry.value);
                    }
                }
            }
        });

        Self {
            tx,
            worker: Some(worker),
        }
    }

    /// Schedules `value` under `key`, replacing that key's pending value
    /// and restarting its quiet window.
    pub fn submit(&self, key: K, value: V) {
        let _ = self.tx.send(Command::Submit(key, value));
    }

    /// Fires every pending entry immediately and waits for completion.
    pub fn flush(&self) {
        let (done_tx, done_rx) = channel();
        if self.tx.send(Command::Flush(done_tx)).is_ok() {
            let _ = done_rx.recv();
        }
    }
}

impl<K, V> Drop for Debouncer<K, V> {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
