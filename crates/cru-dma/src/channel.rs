//! The channel master: descriptor ring orchestration and DMA lifecycle.

use std::thread;
use std::time::Duration;

use cru_bar::{CruBar, GeneratorPattern, RegisterInterface};
use cru_fifo::{CruFifoTable, DESCRIPTOR_ENTRIES, DMA_ALIGNMENT, FW_BUFFERS};

use crate::error::{CruError, Result};
use crate::parameters::{BufferProvider, ChannelParameters, DMA_PAGE_SIZE, SUPERPAGE_GRANULARITY};
use crate::superpage::{SuperpageEntry, SuperpageQueue, SuperpageStatus};

/// Page length in 32-bit words, as written into descriptor ctrl words.
const DMA_PAGE_LENGTH_WORDS: u32 = (DMA_PAGE_SIZE / 4) as u32;

/// Settle time after each reset register write. Hardware requirement; do not
/// shorten.
const RESET_SETTLE: Duration = Duration::from_millis(100);

/// Settle time after enabling the data emulator.
const ENABLE_SETTLE: Duration = Duration::from_millis(10);

/// DMA lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaState {
    Uninitialized,
    Started,
    Stopped,
}

/// How much of the channel to reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetLevel {
    /// Reset nothing; [`CruChannelMaster::reset_channel`] is a no-op.
    Nothing,
    /// Reset the card channel and the data generator counter.
    Card,
}

/// Master of one DMA channel on one card.
///
/// Owns the BAR, the descriptor table, and the superpage queue for its
/// channel. One instance per (card, channel) pair; concurrent instances over
/// the same hardware channel are undefined behavior and must be excluded by
/// an external advisory lock.
///
/// Not internally synchronized: `push_superpage`, `pop_superpage` and
/// `fill_superpages` must all be called from one thread (or under one
/// caller-owned lock).
pub struct CruChannelMaster<B: RegisterInterface, P: BufferProvider> {
    bar: CruBar<B>,
    buffer: P,
    fifo: CruFifoTable,
    fifo_bus_address: u64,
    queue: SuperpageQueue,
    generator_pattern: GeneratorPattern,
    /// Maximum descriptors outstanding at once; also the priming threshold
    /// for the buffer-ready gate.
    ring_window: usize,
    /// Slots pushed but not yet confirmed.
    fifo_size: usize,
    /// Oldest outstanding slot; the next arrival lands here.
    fifo_back: usize,
    /// Next slot to write.
    fifo_front: usize,
    buffer_ready: bool,
    state: DmaState,
}

impl<B: RegisterInterface, P: BufferProvider> CruChannelMaster<B, P> {
    /// Builds a channel master over an already-mapped BAR, descriptor table
    /// and DMA buffer.
    ///
    /// Fails fast on unsupported configuration (page size, disabled data
    /// generator, bad window) and on a misaligned descriptor table bus
    /// address.
    pub fn new(
        parameters: ChannelParameters,
        bar: B,
        fifo: CruFifoTable,
        fifo_bus_address: u64,
        buffer: P,
    ) -> Result<Self> {
        parameters.validate()?;
        if fifo_bus_address % DMA_ALIGNMENT as u64 != 0 {
            return Err(CruError::BadAlignment {
                address: fifo_bus_address,
                required: DMA_ALIGNMENT,
            });
        }

        let mut channel = Self {
            bar: CruBar::new(bar),
            buffer,
            fifo,
            fifo_bus_address,
            queue: SuperpageQueue::new(parameters.superpage_capacity),
            generator_pattern: parameters.generator_pattern,
            ring_window: parameters.ring_window,
            fifo_size: 0,
            fifo_back: 0,
            fifo_front: 0,
            buffer_ready: false,
            state: DmaState::Uninitialized,
        };
        channel.fifo.reset_status_entries();
        Ok(channel)
    }

    /// Resets and initializes the card, then arms the channel.
    ///
    /// Superpages from a previous run are discarded; nothing in flight
    /// survives a restart. Calling this on an already started channel logs a
    /// warning and does nothing.
    pub fn start_dma(&mut self) -> Result<()> {
        if self.state == DmaState::Started {
            tracing::warn!("DMA already started");
            return Ok(());
        }
        tracing::info!("starting DMA");
        self.reset_cru();
        self.init_cru();
        self.queue.clear();
        self.fifo.reset_status_entries();
        self.fifo_size = 0;
        self.fifo_back = 0;
        self.fifo_front = 0;
        self.state = DmaState::Started;
        Ok(())
    }

    /// Unconditionally closes the ready gate and stops the channel.
    ///
    /// Immediate, not drained: outstanding pages are simply abandoned.
    /// Idempotent.
    pub fn stop_dma(&mut self) {
        self.set_buffer_non_ready();
        self.state = DmaState::Stopped;
        tracing::info!("DMA stopped");
    }

    /// Reissues the hardware reset sequence. [`ResetLevel::Nothing`] is a
    /// no-op.
    pub fn reset_channel(&mut self, level: ResetLevel) -> Result<()> {
        if level == ResetLevel::Nothing {
            return Ok(());
        }
        tracing::info!(?level, "resetting channel");
        self.reset_cru();
        Ok(())
    }

    /// Enqueues a superpage: `size` bytes of the DMA buffer starting at
    /// byte `offset`, to be filled page by page.
    ///
    /// Non-blocking; a failed push leaves the queue untouched.
    pub fn push_superpage(&mut self, offset: usize, size: usize) -> Result<()> {
        if self.queue.is_full() {
            return Err(CruError::CapacityExceeded {
                capacity: self.queue.capacity(),
            });
        }
        if size == 0 || size % SUPERPAGE_GRANULARITY != 0 {
            return Err(CruError::InvalidSize { size });
        }

        let entry = SuperpageEntry::new(
            offset,
            self.buffer.bus_address(offset),
            size / DMA_PAGE_SIZE,
        );
        self.queue.add(entry)
    }

    /// Removes and returns the oldest completely filled superpage.
    pub fn pop_superpage(&mut self) -> Result<SuperpageStatus> {
        self.queue
            .pop_filled()
            .map(|entry| entry.status)
            .ok_or(CruError::NotReady)
    }

    /// One fill/poll step. Drive this repeatedly from the acquisition loop.
    ///
    /// Push phase: places pages of the oldest pending superpage into free
    /// ring slots, up to the window, and opens the ready gate once the window
    /// is primed. Arrival phase: retires arrived slots strictly from the ring
    /// tail, stopping at the first slot still pending — the engine completes
    /// in submission order, so nothing later can have arrived either. If that
    /// assumption ever falls (out-of-order completion), this scan must be
    /// rethought.
    ///
    /// Never blocks; arrival checks are plain volatile reads.
    pub fn fill_superpages(&mut self) {
        // Push phase.
        if let Some(offset) = self.queue.pushing_front() {
            let free_slots = self.ring_window - self.fifo_size;
            let entry = self
                .queue
                .entry_mut(offset)
                .expect("pushing queue out of sync with registry");
            let remaining_pages = entry.status.max_pages - entry.pushed_pages;

            for _ in 0..free_slots.min(remaining_pages) {
                let page_bus = entry.bus_address + (entry.pushed_pages * DMA_PAGE_SIZE) as u64;
                let index = self.fifo_front;
                // The engine cycles its internal buffers per slot.
                let source = ((index % FW_BUFFERS) * DMA_PAGE_SIZE) as u64;
                self.fifo
                    .set_descriptor(index, DMA_PAGE_LENGTH_WORDS, source, page_bus);
                if self.buffer_ready {
                    self.bar.send_acknowledge();
                }
                self.fifo_front = (self.fifo_front + 1) % DESCRIPTOR_ENTRIES;
                self.fifo_size += 1;
                entry.pushed_pages += 1;
            }

            if entry.pushed_pages == entry.status.max_pages {
                self.queue.remove_from_pushing_queue();
            }

            // Only open the gate with the window fully primed: the card may
            // consume every descriptor as soon as the ready signal is given.
            if self.fifo_size >= self.ring_window {
                self.set_buffer_ready();
            }
        }

        // Arrival phase.
        while self.fifo_size > 0 {
            let Some(offset) = self.queue.arrivals_front() else {
                break;
            };
            if !self.fifo.is_arrived(self.fifo_back) {
                // In-order completion: later slots cannot have arrived.
                break;
            }
            self.fifo.reset(self.fifo_back);
            self.fifo_size -= 1;
            self.fifo_back = (self.fifo_back + 1) % DESCRIPTOR_ENTRIES;

            let entry = self
                .queue
                .entry_mut(offset)
                .expect("arrival queue out of sync with registry");
            entry.status.confirmed_pages += 1;
            if entry.status.confirmed_pages == entry.status.max_pages {
                self.queue.move_front_arrival_to_filled();
            }
        }
    }

    pub fn superpage_queue_count(&self) -> usize {
        self.queue.count()
    }

    pub fn superpage_queue_available(&self) -> usize {
        self.queue.available()
    }

    pub fn superpage_queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Progress snapshot of the oldest live superpage, without removing it.
    pub fn front_superpage_status(&self) -> Result<SuperpageStatus> {
        self.queue.front_status().ok_or(CruError::NotReady)
    }

    /// Slots currently outstanding (pushed but not confirmed).
    pub fn ring_occupancy(&self) -> usize {
        self.fifo_size
    }

    pub fn buffer_ready(&self) -> bool {
        self.buffer_ready
    }

    pub fn state(&self) -> DmaState {
        self.state
    }

    /// Debug copy of the raw descriptor table.
    pub fn fifo_snapshot(&self) -> Vec<u32> {
        self.fifo.snapshot()
    }

    pub fn firmware_version(&self) -> u32 {
        self.bar.firmware_version()
    }

    pub fn set_led_state(&mut self, on: bool) {
        self.bar.set_led_state(on);
    }

    /// Sum of in-flight pages over all superpages; equals the ring occupancy
    /// at every step. Exposed for sanity checks and tests.
    pub fn in_flight_pages(&self) -> usize {
        self.queue
            .entries()
            .map(|entry| entry.pushed_pages - entry.status.confirmed_pages)
            .sum()
    }

    fn reset_cru(&mut self) {
        self.bar.reset_data_generator_counter();
        thread::sleep(RESET_SETTLE);
        self.bar.reset_card();
        thread::sleep(RESET_SETTLE);
    }

    fn init_cru(&mut self) {
        self.bar.set_data_generator_pattern(self.generator_pattern);

        if self.fifo_bus_address >> 32 != 0 {
            tracing::warn!(
                address = self.fifo_bus_address,
                "64-bit descriptor table bus address; may be unsupported by PCI/BIOS configuration"
            );
        } else {
            tracing::debug!(
                address = self.fifo_bus_address,
                "32-bit descriptor table bus address"
            );
        }
        self.bar.set_fifo_bus_address(self.fifo_bus_address);

        // Firmware will take these over eventually; program them host-side
        // until then.
        self.bar.set_fifo_card_address();
        self.bar.set_descriptor_table_size(DESCRIPTOR_ENTRIES as u32);
        self.bar.set_done_control();
    }

    fn set_buffer_ready(&mut self) {
        if !self.buffer_ready {
            self.buffer_ready = true;
            self.bar.set_data_emulator_enabled(true);
            tracing::debug!("ring primed, data emulator enabled");
            thread::sleep(ENABLE_SETTLE);
        }
    }

    fn set_buffer_non_ready(&mut self) {
        if self.buffer_ready {
            self.buffer_ready = false;
            self.bar.set_data_emulator_enabled(false);
        }
    }
}

impl<B: RegisterInterface, P: BufferProvider> Drop for CruChannelMaster<B, P> {
    fn drop(&mut self) {
        // Never leave the engine running against a buffer we're releasing.
        self.set_buffer_non_ready();
    }
}
