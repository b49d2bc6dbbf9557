//! DMA channel core for the CRU (Common Readout Unit).
//!
//! The channel master keeps a hardware descriptor ring of 128 fixed-size
//! pages fed from caller-supplied "superpages": large (1 MiB-multiple) host
//! buffer regions filled by the card across many pages. Callers enqueue
//! superpages, drive [`CruChannelMaster::fill_superpages`] from a polling
//! loop, and pop superpages back out once every page has arrived.
//!
//! Supported configuration is intentionally narrow: the firmware-defined
//! 8 KiB page size and the on-card data generator as source. Anything else is
//! rejected at construction.
//!
//! The core is single-threaded by design. `push_superpage`, `pop_superpage`
//! and `fill_superpages` must be serialized by the caller, and nothing in
//! here blocks or times out: a page that never arrives parks its superpage in
//! the arrival queue forever, and the caller's timeout policy decides when to
//! stop and reset the channel.

mod channel;
mod error;
mod parameters;
mod superpage;

pub use channel::{CruChannelMaster, DmaState, ResetLevel};
pub use error::{CruError, Result};
pub use parameters::{
    BufferProvider, ChannelParameters, ContiguousBufferProvider, DMA_PAGE_SIZE,
    SUPERPAGE_GRANULARITY,
};
pub use superpage::{SuperpageEntry, SuperpageQueue, SuperpageStatus};

#[cfg(test)]
mod tests;
