use thiserror::Error;

use crate::parameters::SUPERPAGE_GRANULARITY;

/// Errors of the DMA channel core.
///
/// All of these are synchronous and leave queue and ring state exactly as it
/// was before the failing call.
#[derive(Debug, Error)]
pub enum CruError {
    /// The superpage queue is at capacity. Recoverable: pop or wait, then retry.
    #[error("superpage queue at capacity ({capacity})")]
    CapacityExceeded { capacity: usize },

    /// Superpage size is zero or not a multiple of the granularity. Caller bug.
    #[error("superpage size {size} invalid, must be a non-zero multiple of {SUPERPAGE_GRANULARITY} bytes")]
    InvalidSize { size: usize },

    /// A superpage at this buffer offset is already tracked.
    #[error("superpage at offset {offset:#x} already enqueued")]
    DuplicateSuperpage { offset: usize },

    /// The channel cannot be used as configured. Raised at construction only.
    #[error("unsupported channel configuration: {0}")]
    UnsupportedConfiguration(String),

    /// No filled superpage to pop. Recoverable: keep polling.
    #[error("no filled superpage available")]
    NotReady,

    /// A device-visible address missed its required alignment. Indicates a
    /// buffer-provider bug; the channel is not usable.
    #[error("bus address {address:#x} not aligned to {required} bytes")]
    BadAlignment { address: u64, required: usize },

    /// The descriptor table region was rejected.
    #[error("descriptor table region invalid: {0}")]
    FifoLayout(#[from] cru_fifo::FifoLayoutError),
}

pub type Result<T> = std::result::Result<T, CruError>;
