//! Shared test doubles: a register-map BAR and a fake DMA engine that marks
//! ring slots arrived in submission order.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use cru_bar::{registers, RegisterInterface};
use cru_dma::{ChannelParameters, ContiguousBufferProvider, CruChannelMaster};
use cru_fifo::{status_entry_offset, CruFifoTable, FifoBuffer, DESCRIPTOR_ENTRIES};

pub const FIFO_BUS_ADDRESS: u64 = 0x4000_0000;
pub const BUFFER_BUS_BASE: u64 = 0x2000_0000;
pub const BUFFER_SIZE: usize = 512 * 1024 * 1024;
pub const MIB: usize = 1024 * 1024;

#[derive(Default)]
pub struct BarState {
    pub regs: HashMap<usize, u32>,
    pub emulator_enable_writes: usize,
}

#[derive(Clone, Default)]
pub struct TestBar(pub Rc<RefCell<BarState>>);

impl TestBar {
    pub fn register(&self, index: usize) -> u32 {
        *self.0.borrow().regs.get(&index).unwrap_or(&0)
    }

    pub fn set_register(&self, index: usize, value: u32) {
        self.0.borrow_mut().regs.insert(index, value);
    }

    pub fn emulator_enable_writes(&self) -> usize {
        self.0.borrow().emulator_enable_writes
    }
}

impl RegisterInterface for TestBar {
    fn read_register(&self, index: usize) -> u32 {
        self.register(index)
    }

    fn write_register(&mut self, index: usize, value: u32) {
        let mut state = self.0.borrow_mut();
        if index == registers::DATA_EMULATOR_CONTROL && value != 0 {
            state.emulator_enable_writes += 1;
        }
        state.regs.insert(index, value);
    }
}

pub struct FakeEngine {
    buffer: FifoBuffer,
    next_slot: usize,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            buffer: FifoBuffer::new(),
            next_slot: 0,
        }
    }

    pub fn table(&self) -> CruFifoTable {
        unsafe { CruFifoTable::new(self.buffer.base(), self.buffer.len()) }
            .expect("FifoBuffer is aligned")
    }

    /// Marks the next `count` outstanding slots as arrived.
    pub fn arrive(&mut self, count: usize) {
        for _ in 0..count {
            unsafe {
                self.buffer
                    .base()
                    .add(status_entry_offset(self.next_slot))
                    .cast::<u32>()
                    .write_volatile(1);
            }
            self.next_slot = (self.next_slot + 1) % DESCRIPTOR_ENTRIES;
        }
    }
}

pub type TestChannel = CruChannelMaster<TestBar, ContiguousBufferProvider>;

/// Channel over the doubles. The engine owns the table's backing memory, so
/// keep it alive for as long as the channel.
pub fn test_channel(parameters: ChannelParameters) -> (TestChannel, TestBar, FakeEngine) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let engine = FakeEngine::new();
    let bar = TestBar::default();
    let channel = CruChannelMaster::new(
        parameters,
        bar.clone(),
        engine.table(),
        FIFO_BUS_ADDRESS,
        ContiguousBufferProvider::new(BUFFER_BUS_BASE, BUFFER_SIZE),
    )
    .expect("supported parameters");
    (channel, bar, engine)
}

/// Runs fill/arrive rounds until the channel has a filled superpage to pop,
/// or gives up after `max_rounds`.
pub fn drive_until_filled(channel: &mut TestChannel, engine: &mut FakeEngine, max_rounds: usize) {
    for _ in 0..max_rounds {
        channel.fill_superpages();
        if channel
            .front_superpage_status()
            .map(|status| status.confirmed_pages == status.max_pages)
            .unwrap_or(false)
        {
            return;
        }
        let outstanding = channel.ring_occupancy();
        engine.arrive(outstanding);
    }
    panic!("superpage did not complete within {max_rounds} rounds");
}
