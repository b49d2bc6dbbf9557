//! CRU BAR register map.
//!
//! Registers are 32 bits wide and indexed per word: register `n` lives at
//! byte offset `n * 4` in the BAR. Where a register takes a magic value, the
//! value constant is defined next to it.

/// Upper 32 bits of the descriptor table ("status") base bus address.
pub const STATUS_BASE_BUS_HIGH: usize = 0;
/// Lower 32 bits of the descriptor table base bus address.
pub const STATUS_BASE_BUS_LOW: usize = 1;

/// Upper 32 bits of the descriptor table address in the card's own address space.
pub const STATUS_BASE_CARD_HIGH: usize = 2;
/// Lower 32 bits of the descriptor table address in the card's address space.
pub const STATUS_BASE_CARD_LOW: usize = 3;

/// Number of descriptor table entries, programmed as N - 1.
pub const DESCRIPTOR_TABLE_SIZE: usize = 5;

/// Done-control: instructs the DMA engine to write every status entry,
/// not only the final one of a transfer block.
pub const DONE_CONTROL: usize = 6;
/// Value written to [`DONE_CONTROL`] to enable per-entry status writes.
pub const DONE_CONTROL_PER_ENTRY: u32 = 0x1;

/// Data emulator (on-card data generator) control. Non-zero enables the
/// engine; this doubles as the buffer-ready gate for the DMA pipeline.
pub const DATA_EMULATOR_CONTROL: usize = 128;
/// Enable value: run the emulator and allow descriptor consumption.
pub const DATA_EMULATOR_ENABLE: u32 = 0x3;

/// Data generator pattern select. Takes a [`crate::GeneratorPattern`] encoding.
pub const DATA_GENERATOR_CONTROL: usize = 129;

/// Reset control. Write-only; bits select what is reset.
pub const RESET_CONTROL: usize = 130;
/// [`RESET_CONTROL`] bit: reset the card channel logic.
pub const RESET_CARD: u32 = 0x1;
/// [`RESET_CONTROL`] bit: reset the data generator's event counter.
pub const RESET_DATA_GENERATOR_COUNTER: u32 = 0x2;

/// Software acknowledge towards the DMA engine: one descriptor slot has been
/// handed over while the engine is running.
pub const SEND_STATUS: usize = 192;
/// Value written to [`SEND_STATUS`] per acknowledged descriptor.
pub const SEND_STATUS_ACK: u32 = 0x1;

/// Firmware compilation info (read-only build id of the loaded firmware).
pub const FIRMWARE_COMPILE_INFO: usize = 224;

/// User LED control. Active-low: 0x00 turns the LED on, 0xff off.
pub const LED_STATUS: usize = 225;
/// LED on value (yes, zero is the on state).
pub const LED_ON: u32 = 0x00;
/// LED off value.
pub const LED_OFF: u32 = 0xff;

/// Fixed card-side descriptor table address, until firmware programs this
/// itself. High word.
pub const CARD_FIFO_ADDRESS_HIGH: u32 = 0x0;
/// Fixed card-side descriptor table address, low word.
pub const CARD_FIFO_ADDRESS_LOW: u32 = 0x8000;
