//! BAR register access for the CRU (Common Readout Unit).
//!
//! The card is controlled entirely through a memory-mapped register window
//! (BAR) of 32-bit registers. This crate defines the access trait, the
//! register map, and a typed wrapper exposing the operations the DMA channel
//! master needs. How the window gets mapped (UIO, sysfs resource files, a
//! test array) is the implementor's business.

#![forbid(unsafe_code)]

pub mod registers;

/// 32-bit word-indexed access to a BAR register window.
///
/// Register reads may have hardware side effects and writes always do, so
/// writes take `&mut self`. Implementations must not buffer or reorder
/// accesses.
pub trait RegisterInterface {
    /// Reads the register at the given word index.
    fn read_register(&self, index: usize) -> u32;

    /// Writes the register at the given word index.
    fn write_register(&mut self, index: usize, value: u32);
}

impl<T: RegisterInterface + ?Sized> RegisterInterface for &mut T {
    fn read_register(&self, index: usize) -> u32 {
        (**self).read_register(index)
    }

    fn write_register(&mut self, index: usize, value: u32) {
        (**self).write_register(index, value)
    }
}

/// On-card data generator pattern. The discriminants are the register
/// encoding written to [`registers::DATA_GENERATOR_CONTROL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum GeneratorPattern {
    Constant = 1,
    Alternating = 2,
    Flying0 = 3,
    Flying1 = 4,
    #[default]
    Incremental = 5,
    Decremental = 6,
    Random = 7,
}

impl GeneratorPattern {
    pub fn encoding(self) -> u32 {
        self as u32
    }
}

/// Typed view over a CRU BAR.
///
/// Thin wrapper: every method is a fixed register write or read from
/// [`registers`]. Settle delays between writes are the caller's
/// responsibility; this type only orders the accesses within one operation.
pub struct CruBar<B> {
    bar: B,
}

impl<B: RegisterInterface> CruBar<B> {
    pub fn new(bar: B) -> Self {
        Self { bar }
    }

    pub fn inner(&self) -> &B {
        &self.bar
    }

    pub fn inner_mut(&mut self) -> &mut B {
        &mut self.bar
    }

    pub fn into_inner(self) -> B {
        self.bar
    }

    /// Resets the card channel logic.
    pub fn reset_card(&mut self) {
        self.bar
            .write_register(registers::RESET_CONTROL, registers::RESET_CARD);
    }

    /// Resets the data generator's event counter.
    pub fn reset_data_generator_counter(&mut self) {
        self.bar.write_register(
            registers::RESET_CONTROL,
            registers::RESET_DATA_GENERATOR_COUNTER,
        );
    }

    /// Enables or disables the data emulator. Enabling opens the buffer-ready
    /// gate: the engine may start consuming descriptors immediately.
    pub fn set_data_emulator_enabled(&mut self, enabled: bool) {
        let value = if enabled {
            registers::DATA_EMULATOR_ENABLE
        } else {
            0
        };
        self.bar
            .write_register(registers::DATA_EMULATOR_CONTROL, value);
    }

    pub fn set_data_generator_pattern(&mut self, pattern: GeneratorPattern) {
        self.bar
            .write_register(registers::DATA_GENERATOR_CONTROL, pattern.encoding());
    }

    /// Programs the bus address of the descriptor table.
    pub fn set_fifo_bus_address(&mut self, address: u64) {
        self.bar.write_register(
            registers::STATUS_BASE_BUS_HIGH,
            (address >> 32) as u32,
        );
        self.bar
            .write_register(registers::STATUS_BASE_BUS_LOW, address as u32);
    }

    /// Programs the card-side address of the descriptor table. Fixed value;
    /// newer firmware is expected to take this over.
    pub fn set_fifo_card_address(&mut self) {
        self.bar.write_register(
            registers::STATUS_BASE_CARD_HIGH,
            registers::CARD_FIFO_ADDRESS_HIGH,
        );
        self.bar.write_register(
            registers::STATUS_BASE_CARD_LOW,
            registers::CARD_FIFO_ADDRESS_LOW,
        );
    }

    /// Programs the descriptor table entry count. The register takes N - 1.
    pub fn set_descriptor_table_size(&mut self, entries: u32) {
        self.bar
            .write_register(registers::DESCRIPTOR_TABLE_SIZE, entries - 1);
    }

    /// Tells the DMA engine to write every status entry, not just the last
    /// of a block.
    pub fn set_done_control(&mut self) {
        self.bar.write_register(
            registers::DONE_CONTROL,
            registers::DONE_CONTROL_PER_ENTRY,
        );
    }

    /// Acknowledges one descriptor handover while the engine is running.
    pub fn send_acknowledge(&mut self) {
        self.bar
            .write_register(registers::SEND_STATUS, registers::SEND_STATUS_ACK);
    }

    /// Build id of the loaded firmware.
    pub fn firmware_version(&self) -> u32 {
        self.bar.read_register(registers::FIRMWARE_COMPILE_INFO)
    }

    /// Drives the user LED. The register is active-low.
    pub fn set_led_state(&mut self, on: bool) {
        let value = if on {
            registers::LED_ON
        } else {
            registers::LED_OFF
        };
        self.bar.write_register(registers::LED_STATUS, value);
    }
}
