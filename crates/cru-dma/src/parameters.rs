use cru_bar::GeneratorPattern;
use cru_fifo::DESCRIPTOR_ENTRIES;

use crate::error::{CruError, Result};

/// DMA page size in bytes. Firmware-defined; the card supports nothing else.
pub const DMA_PAGE_SIZE: usize = 8 * 1024;

/// Superpage sizes must be a multiple of this.
pub const SUPERPAGE_GRANULARITY: usize = 1024 * 1024;

/// Default capacity of the superpage queue.
pub const DEFAULT_SUPERPAGE_CAPACITY: usize = 32;

/// Translates host buffer offsets into device-visible bus addresses.
///
/// The channel never allocates or maps the DMA buffer; it only adds
/// page-relative offsets to what this trait hands back, once per superpage at
/// enqueue time.
pub trait BufferProvider {
    /// Bus address of the given byte offset into the DMA buffer.
    fn bus_address(&self, offset: usize) -> u64;

    /// Size of the DMA buffer in bytes.
    fn size(&self) -> usize;
}

/// Buffer provider for a physically contiguous (or IOMMU-contiguous) buffer:
/// one fixed base translation.
#[derive(Debug, Clone, Copy)]
pub struct ContiguousBufferProvider {
    bus_base: u64,
    size: usize,
}

impl ContiguousBufferProvider {
    pub fn new(bus_base: u64, size: usize) -> Self {
        Self { bus_base, size }
    }
}

impl BufferProvider for ContiguousBufferProvider {
    fn bus_address(&self, offset: usize) -> u64 {
        self.bus_base + offset as u64
    }

    fn size(&self) -> usize {
        self.size
    }
}

/// Channel configuration.
///
/// `Default` gives the only fully supported setup: 8 KiB pages, data
/// generator enabled with the incremental pattern, the full descriptor ring
/// as in-flight window.
#[derive(Debug, Clone)]
pub struct ChannelParameters {
    /// DMA page size in bytes. Must equal [`DMA_PAGE_SIZE`].
    pub dma_page_size: usize,
    /// Whether the on-card data generator drives the channel. Must stay
    /// enabled; real-detector input is not implemented.
    pub generator_enabled: bool,
    /// Pattern written by the data generator.
    pub generator_pattern: GeneratorPattern,
    /// Maximum descriptors outstanding at once, 1..=128. Smaller windows
    /// trade pipeline depth for bounded in-flight data.
    pub ring_window: usize,
    /// Maximum superpages tracked at once.
    pub superpage_capacity: usize,
}

impl Default for ChannelParameters {
    fn default() -> Self {
        Self {
            dma_page_size: DMA_PAGE_SIZE,
            generator_enabled: true,
            generator_pattern: GeneratorPattern::default(),
            ring_window: DESCRIPTOR_ENTRIES,
            superpage_capacity: DEFAULT_SUPERPAGE_CAPACITY,
        }
    }
}

impl ChannelParameters {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.dma_page_size != DMA_PAGE_SIZE {
            return Err(CruError::UnsupportedConfiguration(format!(
                "CRU only supports a {DMA_PAGE_SIZE} byte page size, got {}",
                self.dma_page_size
            )));
        }
        if !self.generator_enabled {
            return Err(CruError::UnsupportedConfiguration(
                "CRU does not yet support non-data-generator operation".into(),
            ));
        }
        if self.ring_window == 0 || self.ring_window > DESCRIPTOR_ENTRIES {
            return Err(CruError::UnsupportedConfiguration(format!(
                "ring window {} outside 1..={DESCRIPTOR_ENTRIES}",
                self.ring_window
            )));
        }
        if self.superpage_capacity == 0 {
            return Err(CruError::UnsupportedConfiguration(
                "superpage queue capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
