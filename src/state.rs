//! Shared connection-facing state: the blocking-waiter registry and the
//! per-connection transaction contexts.
//!
//! Waiters are referenced from key queues by a generational id, with the
//! waiter itself held in a side table. Waking a waiter through its id
//! removes it from every key queue it was registered on, so a multi-key
//! BLPOP never fires twice.

use std::collections::{HashMap, VecDeque};

use thiserror::Error;
use tokio::sync::oneshot;

use crate::commands::CommandHandler;

#[derive(Error, Debug, PartialEq)]
pub enum StateError {
    #[error("transaction already started")]
    TransactionAlreadyStarted,
    #[error("no transaction in progress")]
    NoTransaction,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum WaiterKind {
    /// Consumes data on wake-up; one pushed element wakes one waiter.
    List,
    /// Only observes data; one appended entry wakes every waiter.
    Stream,
}

#[derive(Debug)]
struct Waiter {
    keys: Vec<String>,
    kind: WaiterKind,
    sender: oneshot::Sender<()>,
}

/// Commands queued between MULTI and EXEC for one connection.
#[derive(Debug, Default, PartialEq)]
pub struct Transaction {
    pub queued: Vec<CommandHandler>,
    pub poisoned: bool,
}

#[derive(Debug, Default)]
pub struct State {
    next_waiter_id: u64,
    waiters: HashMap<u64, Waiter>,
    list_queues: HashMap<String, VecDeque<u64>>,
    stream_queues: HashMap<String, VecDeque<u64>>,
    transactions: HashMap<String, Transaction>,
}

impl State {
    pub fn new() -> Self {
        State::default()
    }

    /// Registers a waiter for list data on `keys`. The returned receiver
    /// resolves once one of the keys receives a push earmarked for this
    /// waiter.
    pub fn register_list_waiter(&mut self, keys: &[String]) -> (u64, oneshot::Receiver<()>) {
        self.register_waiter(keys, WaiterKind::List)
    }

    /// Registers a waiter for new stream entries on `keys`.
    pub fn register_stream_waiter(&mut self, keys: &[String]) -> (u64, oneshot::Receiver<()>) {
        self.register_waiter(keys, WaiterKind::Stream)
    }

    fn register_waiter(
        &mut self,
        keys: &[String],
        kind: WaiterKind,
    ) -> (u64, oneshot::Receiver<()>) {
        let waiter_id = self.next_waiter_id;
        self.next_waiter_id += 1;

        let (sender, receiver) = oneshot::channel();

        let queues = match kind {
            WaiterKind::List => &mut self.list_queues,
            WaiterKind::Stream => &mut self.stream_queues,
        };

        for key in keys {
            queues.entry(key.clone()).or_default().push_back(waiter_id);
        }

        self.waiters.insert(
            waiter_id,
            Waiter {
                keys: keys.to_vec(),
                kind,
                sender,
            },
        );

        (waiter_id, receiver)
    }

    /// Removes a waiter from every queue it is registered on. Called by
    /// the waiting task after its wait resolves, times out, or is
    /// abandoned.
    pub fn remove_waiter(&mut self, waiter_id: u64) {
        let Some(waiter) = self.waiters.remove(&waiter_id) else {
            return;
        };

        let queues = match waiter.kind {
            WaiterKind::List => &mut self.list_queues,
            WaiterKind::Stream => &mut self.stream_queues,
        };

        for key in &waiter.keys {
            if let Some(queue) = queues.get_mut(key) {
                queue.retain(|id| *id != waiter_id);

                if queue.is_empty() {
                    queues.remove(key);
                }
            }
        }
    }

    /// Wakes up to `available` list waiters on `key`, oldest first.
    /// Returns the number of waiters actually woken.
    pub fn notify_list_key(&mut self, key: &str, available: usize) -> usize {
        let mut woken = 0;

        while woken < available {
            let Some(queue) = self.list_queues.get_mut(key) else {
                break;
            };
            let Some(waiter_id) = queue.pop_front() else {
                break;
            };

            if queue.is_empty() {
                self.list_queues.remove(key);
            }

            if self.complete_waiter(waiter_id) {
                woken += 1;
            }
        }

        woken
    }

    /// Wakes every stream waiter on `key`.
    pub fn notify_stream_key(&mut self, key: &str) -> usize {
        let Some(queue) = self.stream_queues.remove(key) else {
            return 0;
        };

        let mut woken = 0;

        for waiter_id in queue {
            if self.complete_waiter(waiter_id) {
                woken += 1;
            }
        }

        woken
    }

    fn complete_waiter(&mut self, waiter_id: u64) -> bool {
        let Some(waiter) = self.waiters.remove(&waiter_id) else {
            return false;
        };

        let queues = match waiter.kind {
            WaiterKind::List => &mut self.list_queues,
            WaiterKind::Stream => &mut self.stream_queues,
        };

        for key in &waiter.keys {
            if let Some(queue) = queues.get_mut(key) {
                queue.retain(|id| *id != waiter_id);

                if queue.is_empty() {
                    queues.remove(key);
                }
            }
        }

        // A dropped receiver means the waiting task is gone; report the
        // slot as unused so the caller can wake the next one.
        waiter.sender.send(()).is_ok()
    }

    pub fn waiter_count(&self, key: &str) -> usize {
        self.list_queues.get(key).map_or(0, VecDeque::len)
            + self.stream_queues.get(key).map_or(0, VecDeque::len)
    }

    pub fn start_transaction(&mut self, connection_id: &str) -> Result<(), StateError> {
        if self.transactions.contains_key(connection_id) {
            return Err(StateError::TransactionAlreadyStarted);
        }

        self.transactions
            .insert(connection_id.to_string(), Transaction::default());

        Ok(())
    }

    pub fn in_transaction(&self, connection_id: &str) -> bool {
        self.transactions.contains_key(connection_id)
    }

    pub fn queue_command(
        &mut self,
        connection_id: &str,
        command: CommandHandler,
    ) -> Result<(), StateError> {
        let transaction = self
            .transactions
            .get_mut(connection_id)
            .ok_or(StateError::NoTransaction)?;

        transaction.queued.push(command);

        Ok(())
    }

    /// Marks the connection's transaction as failed; the next EXEC
    /// aborts instead of running the queue.
    pub fn poison_transaction(&mut self, connection_id: &str) {
        if let Some(transaction) = self.transactions.get_mut(connection_id) {
            transaction.poisoned = true;
        }
    }

    pub fn take_transaction(&mut self, connection_id: &str) -> Result<Transaction, StateError> {
        self.transactions
            .remove(connection_id)
            .ok_or(StateError::NoTransaction)
    }

    /// Drops all per-connection state when a client disconnects.
    pub fn remove_connection(&mut self, connection_id: &str) {
        self.transactions.remove(connection_id);
    }
}
