//! Inbound delivery queue.
//!
//! The radio stack calls back from its own context with each socket read or
//! characteristic notification. Those callbacks only enqueue; the session
//! drains the queue from its processing context, one item at a time, so a
//! handler always runs to completion before the next item is looked at.
//!
//! A read is queued whole or not at all. After a drop the next accepted
//! read is flagged `resync`, so the link discards whatever partial input
//! it held from before the gap.
//!
//! ```text
//! ┌──────────────┐  InboundChunk  ┌──────────────┐
//! │ radio thread │───────────────▶│   Session    │
//! │  (callback)  │                │ process_*()  │
//! └──────────────┘                └──────────────┘
//! ```

// Links the std-backed critical-section implementation.
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section as _;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;
use log::warn;

use super::transport::Endpoint;

/// Largest slice carried by one queue entry. Longer reads are split.
pub const CHUNK_CAPACITY: usize = 512;

/// Queue depth.
const INBOUND_DEPTH: usize = 32;

/// One received slice of radio data.
pub struct InboundChunk {
    pub endpoint: Endpoint,
    pub data: Vec<u8, CHUNK_CAPACITY>,
    /// Input before this chunk was lost; drop any partial frame first.
    pub resync: bool,
}

pub struct InboundQueue {
    channel: Channel<CriticalSectionRawMutex, InboundChunk, INBOUND_DEPTH>,
    lost: AtomicBool,
}

impl InboundQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            lost: AtomicBool::new(false),
        }
    }

    /// Enqueue received bytes. Stream reads longer than one entry are split
    /// across consecutive entries; a split notification would be
    /// meaningless, so oversized notifications are refused. Returns `false`
    /// if the read was dropped, in which case nothing of it was queued.
    pub fn deliver(&self, endpoint: Endpoint, data: &[u8]) -> bool {
        if endpoint != Endpoint::Stream && data.len() > CHUNK_CAPACITY {
            warn!("queue: {}-byte notification exceeds {CHUNK_CAPACITY}", data.len());
            return false;
        }

        if data.is_empty() {
            return true;
        }
        let needed = data.len().div_ceil(CHUNK_CAPACITY);
        if needed > self.channel.free_capacity() {
            warn!(
                "queue: no room for {} bytes from {endpoint:?} ({needed} entries, {} free)",
                data.len(),
                self.channel.free_capacity()
            );
            self.lost.store(true, Ordering::Release);
            return false;
        }

        let mut resync = self.lost.swap(false, Ordering::AcqRel);
        for piece in data.chunks(CHUNK_CAPACITY) {
            let Ok(data) = Vec::from_slice(piece) else {
                warn!("queue: {}-byte piece exceeds {CHUNK_CAPACITY}", piece.len());
                self.lost.store(true, Ordering::Release);
                return false;
            };
            let chunk = InboundChunk {
                endpoint,
                data,
                resync,
            };
            if self.channel.try_send(chunk).is_err() {
                // Another producer took the room we counted on.
                warn!("queue: full mid-read, dropping the rest from {endpoint:?}");
                self.lost.store(true, Ordering::Release);
                return false;
            }
            resync = false;
        }
        true
    }

    /// Mark input as lost outside the queue (a read the processing context
    /// could not take). The next queued read carries `resync`.
    pub fn mark_lost(&self) {
        self.lost.store(true, Ordering::Release);
    }

    /// Take the pending loss mark, if any.
    pub fn take_lost(&self) -> bool {
        self.lost.swap(false, Ordering::AcqRel)
    }

    pub fn next(&self) -> Option<InboundChunk> {
        self.channel.try_receive().ok()
    }

    /// Drop everything queued (used on disconnect).
    pub fn clear(&self) {
        while self.channel.try_receive().is_ok() {}
        self.lost.store(false, Ordering::Release);
    }
}

impl Default for InboundQueue {
    fn default() -> Self {
        Self::new()
    }
}
