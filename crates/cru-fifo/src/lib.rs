//! Descriptor table ("ready FIFO") layout for the CRU DMA engine.
//!
//! The table is a fixed block of memory shared with the card: 128 descriptor
//! entries the driver writes and the engine reads, followed by 128 status
//! words the engine writes on page arrival. The firmware consumes entries in
//! blocks of 4 pages over 32 internal buffers, for 128 pages total.
//!
//! The table region is allocated and bus-mapped by someone else (shared
//! memory in production, [`FifoBuffer`] in tests and process-local use).
//! [`CruFifoTable`] overlays that raw region; every volatile access in the
//! workspace happens in this crate, and slots are addressed by index only.

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::fmt;
use std::ptr::NonNull;

use bitflags::bitflags;

/// Pages per firmware transfer block.
pub const FIFO_FW_ENTRIES: usize = 4;
/// Internal firmware buffers cycled through by the engine.
pub const FW_BUFFERS: usize = 32;
/// Total descriptor entries in the table.
pub const DESCRIPTOR_ENTRIES: usize = FIFO_FW_ENTRIES * FW_BUFFERS;

/// Required alignment of the table base, in bytes (DMA engine constraint).
pub const DMA_ALIGNMENT: usize = 32;

/// One descriptor entry: ctrl word, source address, destination address,
/// three reserved words. 8 words / 32 bytes.
const DESCRIPTOR_WORDS: usize = 8;
const DESCRIPTOR_BYTES: usize = DESCRIPTOR_WORDS * 4;
/// One status word per entry, packed after the descriptor array.
const STATUS_BYTES: usize = 4;

/// Size in bytes of the whole table.
pub const TABLE_BYTES: usize = DESCRIPTOR_ENTRIES * (DESCRIPTOR_BYTES + STATUS_BYTES);

const STATUS_ARRAY_OFFSET: usize = DESCRIPTOR_ENTRIES * DESCRIPTOR_BYTES;

/// Byte offset of a slot's status word within the table region.
///
/// Exposed so whatever plays the hardware role (tests, emulators) can write
/// arrival flags into the same region the table reads.
pub const fn status_entry_offset(index: usize) -> usize {
    STATUS_ARRAY_OFFSET + index * STATUS_BYTES
}

bitflags! {
    /// Hardware-written bits of a status entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u32 {
        /// Set by the engine once the page for this slot has been written.
        const PAGE_ARRIVED = 1;
    }
}

/// Rejected descriptor table region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoLayoutError {
    /// Base address not aligned to [`DMA_ALIGNMENT`].
    Misaligned { address: usize },
    /// Region shorter than [`TABLE_BYTES`].
    RegionTooSmall { len: usize },
}

impl fmt::Display for FifoLayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Misaligned { address } => write!(
                f,
                "table base {address:#x} not aligned to {DMA_ALIGNMENT} bytes"
            ),
            Self::RegionTooSmall { len } => {
                write!(f, "table region of {len} bytes, need {TABLE_BYTES}")
            }
        }
    }
}

impl std::error::Error for FifoLayoutError {}

/// The descriptor table overlaid on a raw region.
///
/// Writes to descriptor entries become hardware-visible as soon as they land;
/// the caller must never rewrite a slot that is still outstanding. Status
/// reads are volatile snapshots of the engine's last write.
pub struct CruFifoTable {
    base: NonNull<u8>,
}

// The table points into a region the owning channel has exclusive (host-side)
// access to; the channel itself is single-threaded but may be moved.
unsafe impl Send for CruFifoTable {}

impl CruFifoTable {
    /// Overlays the table on `base .. base + len`.
    ///
    /// # Safety
    ///
    /// `base` must point to a region of at least `len` bytes that stays
    /// valid and is not accessed through safe Rust references for the table's
    /// lifetime. The hardware is the only other writer.
    pub unsafe fn new(base: *mut u8, len: usize) -> Result<Self, FifoLayoutError> {
        let address = base as usize;
        if address % DMA_ALIGNMENT != 0 {
            return Err(FifoLayoutError::Misaligned { address });
        }
        if len < TABLE_BYTES {
            return Err(FifoLayoutError::RegionTooSmall { len });
        }
        let base = NonNull::new(base).ok_or(FifoLayoutError::RegionTooSmall { len: 0 })?;
        Ok(Self { base })
    }

    fn word_ptr(&self, byte_offset: usize) -> *mut u32 {
        debug_assert!(byte_offset + 4 <= TABLE_BYTES);
        // Safety: offset checked against TABLE_BYTES, region validity is a
        // constructor precondition, and all table word offsets are 4-aligned.
        unsafe { self.base.as_ptr().add(byte_offset).cast::<u32>() }
    }

    fn descriptor_word(&self, index: usize, word: usize) -> *mut u32 {
        assert!(index < DESCRIPTOR_ENTRIES, "descriptor index out of range");
        debug_assert!(word < DESCRIPTOR_WORDS);
        self.word_ptr(index * DESCRIPTOR_BYTES + word * 4)
    }

    fn status_word(&self, index: usize) -> *mut u32 {
        assert!(index < DESCRIPTOR_ENTRIES, "status index out of range");
        self.word_ptr(STATUS_ARRAY_OFFSET + index * STATUS_BYTES)
    }

    /// Writes a descriptor: page length in 32-bit words, card-side source
    /// address, host bus destination address.
    pub fn set_descriptor(&mut self, index: usize, length_words: u32, source: u64, destination: u64) {
        let write = |word, value| unsafe { self.descriptor_word(index, word).write_volatile(value) };
        write(0, length_words);
        write(1, source as u32);
        write(2, (source >> 32) as u32);
        write(3, destination as u32);
        write(4, (destination >> 32) as u32);
        write(5, 0);
        write(6, 0);
        write(7, 0);
    }

    /// Whether the engine has marked this slot's page as arrived.
    pub fn is_arrived(&self, index: usize) -> bool {
        let status = unsafe { self.status_word(index).read_volatile() };
        StatusFlags::from_bits_truncate(status).contains(StatusFlags::PAGE_ARRIVED)
    }

    /// Clears a slot's status word, making the slot logically free again.
    pub fn reset(&mut self, index: usize) {
        unsafe { self.status_word(index).write_volatile(0) };
    }

    /// Clears every status word. Done once before the engine is enabled.
    pub fn reset_status_entries(&mut self) {
        for index in 0..DESCRIPTOR_ENTRIES {
            self.reset(index);
        }
    }

    /// Copies the whole table out as words, for debug printing and sanity
    /// checks. Not synchronized with the engine; a live table may tear.
    pub fn snapshot(&self) -> Vec<u32> {
        (0..TABLE_BYTES / 4)
            .map(|word| unsafe { self.word_ptr(word * 4).read_volatile() })
            .collect()
    }
}

impl fmt::Debug for CruFifoTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CruFifoTable")
            .field("base", &self.base.as_ptr())
            .field("entries", &DESCRIPTOR_ENTRIES)
            .finish()
    }
}

/// Owned, correctly aligned allocation for a process-local descriptor table.
///
/// Production channels overlay shared memory instead; tests use this and poke
/// status words through [`FifoBuffer::base`] to play the hardware role.
pub struct FifoBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

unsafe impl Send for FifoBuffer {}

impl FifoBuffer {
    pub fn new() -> Self {
        let layout = Layout::from_size_align(TABLE_BYTES, DMA_ALIGNMENT)
            .expect("table layout is statically valid");
        // Zeroed so status entries start out non-arrived.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => handle_alloc_error(layout),
        };
        Self { ptr, layout }
    }

    pub fn base(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        TABLE_BYTES
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for FifoBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FifoBuffer {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(buffer: &FifoBuffer) -> CruFifoTable {
        unsafe { CruFifoTable::new(buffer.base(), buffer.len()) }.expect("aligned buffer")
    }

    /// Poke a status word the way the DMA engine would.
    fn mark_arrived(buffer: &FifoBuffer, index: usize) {
        unsafe {
            buffer
                .base()
                .add(STATUS_ARRAY_OFFSET + index * STATUS_BYTES)
                .cast::<u32>()
                .write_volatile(StatusFlags::PAGE_ARRIVED.bits());
        }
    }

    #[test]
    fn table_layout_constants() {
        assert_eq!(DESCRIPTOR_ENTRIES, 128);
        assert_eq!(TABLE_BYTES, 128 * 32 + 128 * 4);
        assert_eq!(STATUS_ARRAY_OFFSET, 4096);
    }

    #[test]
    fn descriptor_words_land_at_expected_offsets() {
        let buffer = FifoBuffer::new();
        let mut table = table(&buffer);
        table.set_descriptor(2, 2048, 0x8000, 0x1_2345_6780);

        let words = table.snapshot();
        let base = 2 * DESCRIPTOR_WORDS;
        assert_eq!(words[base], 2048); // length
        assert_eq!(words[base + 1], 0x8000); // source low
        assert_eq!(words[base + 2], 0); // source high
        assert_eq!(words[base + 3], 0x2345_6780); // destination low
        assert_eq!(words[base + 4], 0x1); // destination high
        assert_eq!(&words[base + 5..base + 8], &[0, 0, 0]);
    }

    #[test]
    fn arrival_flag_reads_back_and_resets() {
        let buffer = FifoBuffer::new();
        let mut table = table(&buffer);
        assert!(!table.is_arrived(7));

        mark_arrived(&buffer, 7);
        assert!(table.is_arrived(7));
        assert!(!table.is_arrived(8));

        table.reset(7);
        assert!(!table.is_arrived(7));
    }

    #[test]
    fn reset_status_entries_clears_every_slot() {
        let buffer = FifoBuffer::new();
        let mut table = table(&buffer);
        for index in [0, 1, 63, 127] {
            mark_arrived(&buffer, index);
        }
        table.reset_status_entries();
        assert!((0..DESCRIPTOR_ENTRIES).all(|index| !table.is_arrived(index)));
    }

    #[test]
    fn misaligned_base_is_rejected() {
        let buffer = FifoBuffer::new();
        let err = unsafe { CruFifoTable::new(buffer.base().add(4), buffer.len() - 4) };
        assert!(matches!(err, Err(FifoLayoutError::Misaligned { .. })));
    }

    #[test]
    fn short_region_is_rejected() {
        let buffer = FifoBuffer::new();
        let err = unsafe { CruFifoTable::new(buffer.base(), TABLE_BYTES - 1) };
        assert_eq!(err.err(), Some(FifoLayoutError::RegionTooSmall {
            len: TABLE_BYTES - 1
        }));
    }
}
