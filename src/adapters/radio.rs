//! In-memory radio queue.
//!
//! Implements [`RadioPort`] by appending submitted transactions to a FIFO.
//! A host pulls them off with [`QueuedRadio::pop`] and executes the ops in
//! order against its real stack.

use std::collections::VecDeque;

use log::debug;

use crate::error::LinkError;
use crate::link::transport::{Op, RadioPort, Transaction};

#[derive(Debug, Default)]
pub struct QueuedRadio {
    queue: VecDeque<Transaction>,
    /// Refuse submissions, e.g. while the host's stack is down.
    offline: bool,
}

impl QueuedRadio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    pub fn pop(&mut self) -> Option<Transaction> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Every queued op, flattened in execution order.
    pub fn ops(&self) -> impl Iterator<Item = &Op> {
        self.queue.iter().flat_map(|tx| tx.ops.iter())
    }
}

impl RadioPort for QueuedRadio {
    fn submit(&mut self, tx: Transaction) -> Result<(), LinkError> {
        if self.offline {
            return Err(LinkError::Radio);
        }
        debug!("radio: queued '{}' ({} ops)", tx.name, tx.ops.len());
        self.queue.push_back(tx);
        Ok(())
    }
}
