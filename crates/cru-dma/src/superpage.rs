//! Superpage bookkeeping.
//!
//! Every live superpage sits in a registry keyed by its buffer offset and is
//! referenced from up to two of three offset queues: `pushing` (still has
//! pages to place into the ring), `arrivals` (has pages in flight), `filled`
//! (every page confirmed, waiting to be popped). Transitions are
//! one-directional: a new superpage enters `pushing` and `arrivals` together,
//! leaves `pushing` once fully placed, moves from `arrivals` to `filled` once
//! fully confirmed, and leaves the registry when popped.
//!
//! All queues are FIFO in submission order; since the ring completes strictly
//! in order, `arrivals` order and fill order coincide.

use std::collections::{HashMap, VecDeque};

use crate::error::{CruError, Result};

/// Point-in-time view of one superpage's transfer progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperpageStatus {
    /// Byte offset of the superpage in the DMA buffer.
    pub offset: usize,
    /// Pages the hardware has reported arrived.
    pub confirmed_pages: usize,
    /// Total pages in this superpage.
    pub max_pages: usize,
}

/// Registry entry for one live superpage.
#[derive(Debug, Clone)]
pub struct SuperpageEntry {
    /// Device-visible address of the superpage base, fixed at enqueue.
    pub bus_address: u64,
    /// Pages already placed into the descriptor ring.
    pub pushed_pages: usize,
    pub status: SuperpageStatus,
}

impl SuperpageEntry {
    pub fn new(offset: usize, bus_address: u64, max_pages: usize) -> Self {
        Self {
            bus_address,
            pushed_pages: 0,
            status: SuperpageStatus {
                offset,
                confirmed_pages: 0,
                max_pages,
            },
        }
    }
}

/// Ordered collection of all live superpages. See the module docs for the
/// queue discipline.
#[derive(Debug)]
pub struct SuperpageQueue {
    capacity: usize,
    entries: HashMap<usize, SuperpageEntry>,
    pushing: VecDeque<usize>,
    arrivals: VecDeque<usize>,
    filled: VecDeque<usize>,
}

impl SuperpageQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            pushing: VecDeque::with_capacity(capacity),
            arrivals: VecDeque::with_capacity(capacity),
            filled: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live superpages, filled ones included.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn available(&self) -> usize {
        self.capacity - self.entries.len()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.entries.contains_key(&offset)
    }

    /// Admits a new superpage into the pushing and arrival orders.
    pub fn add(&mut self, entry: SuperpageEntry) -> Result<()> {
        if self.is_full() {
            return Err(CruError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        let offset = entry.status.offset;
        if self.entries.contains_key(&offset) {
            return Err(CruError::DuplicateSuperpage { offset });
        }
        self.entries.insert(offset, entry);
        self.pushing.push_back(offset);
        self.arrivals.push_back(offset);
        Ok(())
    }

    /// Oldest superpage that still has pages to place into the ring.
    pub fn pushing_front(&self) -> Option<usize> {
        self.pushing.front().copied()
    }

    /// Oldest superpage with unconfirmed pages; the next arrival belongs to it.
    pub fn arrivals_front(&self) -> Option<usize> {
        self.arrivals.front().copied()
    }

    pub fn entry(&self, offset: usize) -> Option<&SuperpageEntry> {
        self.entries.get(&offset)
    }

    pub fn entry_mut(&mut self, offset: usize) -> Option<&mut SuperpageEntry> {
        self.entries.get_mut(&offset)
    }

    /// Retires the front of the pushing order once all its pages are placed.
    pub fn remove_from_pushing_queue(&mut self) -> Option<usize> {
        self.pushing.pop_front()
    }

    /// Moves the front of the arrival order to the filled queue.
    pub fn move_front_arrival_to_filled(&mut self) -> Option<usize> {
        let offset = self.arrivals.pop_front()?;
        self.filled.push_back(offset);
        Some(offset)
    }

    /// Removes and returns the oldest filled superpage.
    pub fn pop_filled(&mut self) -> Option<SuperpageEntry> {
        let offset = self.filled.pop_front()?;
        self.entries.remove(&offset)
    }

    /// Progress snapshot of the oldest live superpage: the filled front if
    /// one is waiting, otherwise the oldest still awaiting arrivals.
    pub fn front_status(&self) -> Option<SuperpageStatus> {
        self.filled
            .front()
            .or_else(|| self.arrivals.front())
            .and_then(|offset| self.entries.get(offset))
            .map(|entry| entry.status)
    }

    /// All live entries, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = &SuperpageEntry> {
        self.entries.values()
    }

    /// Drops every superpage. Used when (re)starting DMA; in-flight transfers
    /// do not survive a restart.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.pushing.clear();
        self.arrivals.clear();
        self.filled.clear();
    }
}
