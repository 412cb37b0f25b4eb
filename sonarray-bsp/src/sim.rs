//! In-memory doubles of the FPGA window and the EtherCAT regions.
//!
//! The simulated FPGA models the paging the real design performs: writes
//! into the MOD and STM regions land in the page currently selected by the
//! `MOD_ADDR_OFFSET` / `STM_ADDR_OFFSET` controller registers, so tests can
//! check full streams across segment boundaries through the flat
//! inspection accessors.

use std::cell::{Cell, RefCell};

use crate::bram::{regs, Bram, BramSelect};
use crate::ecat::{Ecat, HEADER_LEN};

/// Words per MOD/STM page, the span reachable through the 14-bit window.
pub const PAGE_WORDS: usize = 1 << 14;

const CONTROLLER_WORDS: usize = 1 << 10;
const NORMAL_WORDS: usize = 1 << 10;
const PAGES: usize = 4;

pub struct SimFpga {
    controller: RefCell<Vec<u16>>,
    normal: RefCell<Vec<u16>>,
    mod_mem: RefCell<Vec<u16>>,
    stm_mem: RefCell<Vec<u16>>,
}

impl SimFpga {
    pub fn new() -> Self {
        SimFpga {
            controller: RefCell::new(vec![0; CONTROLLER_WORDS]),
            normal: RefCell::new(vec![0; NORMAL_WORDS]),
            mod_mem: RefCell::new(vec![0; PAGES * PAGE_WORDS]),
            stm_mem: RefCell::new(vec![0; PAGES * PAGE_WORDS]),
        }
    }

    fn paged(&self, page_reg: u16, offset: u16) -> usize {
        let page = self.controller.borrow()[page_reg as usize] as usize;
        page * PAGE_WORDS + (offset & 0x3FFF) as usize
    }

    /// Controller register, for test assertions.
    pub fn controller(&self, offset: u16) -> u16 {
        self.controller.borrow()[offset as usize]
    }

    /// Seed a controller register (e.g. `VERSION_NUM`, `FPGA_INFO`).
    pub fn set_controller(&self, offset: u16, value: u16) {
        self.controller.borrow_mut()[offset as usize] = value;
    }

    /// Word of the flat (de-paged) modulation memory.
    pub fn mod_word(&self, index: usize) -> u16 {
        self.mod_mem.borrow()[index]
    }

    /// Word of the flat (de-paged) STM memory.
    pub fn stm_word(&self, index: usize) -> u16 {
        self.stm_mem.borrow()[index]
    }

    pub fn normal_word(&self, index: usize) -> u16 {
        self.normal.borrow()[index]
    }
}

impl Default for SimFpga {
    fn default() -> Self {
        Self::new()
    }
}

impl Bram for SimFpga {
    fn read(&self, select: BramSelect, offset: u16) -> u16 {
        let offset = (offset & 0x3FFF) as usize;
        match select {
            BramSelect::Controller => self.controller.borrow()[offset],
            BramSelect::Normal => self.normal.borrow()[offset],
            BramSelect::Mod => {
                let i = self.paged(regs::MOD_ADDR_OFFSET, offset as u16);
                self.mod_mem.borrow()[i]
            }
            BramSelect::Stm => {
                let i = self.paged(regs::STM_ADDR_OFFSET, offset as u16);
                self.stm_mem.borrow()[i]
            }
        }
    }

    fn write(&self, select: BramSelect, offset: u16, value: u16) {
        match select {
            BramSelect::Controller => {
                self.controller.borrow_mut()[(offset & 0x3FFF) as usize] = value
            }
            BramSelect::Normal => self.normal.borrow_mut()[(offset & 0x3FFF) as usize] = value,
            BramSelect::Mod => {
                let i = self.paged(regs::MOD_ADDR_OFFSET, offset);
                self.mod_mem.borrow_mut()[i] = value;
            }
            BramSelect::Stm => {
                let i = self.paged(regs::STM_ADDR_OFFSET, offset);
                self.stm_mem.borrow_mut()[i] = value;
            }
        }
    }
}

/// Simulated RX/TX regions: one pending frame plus the published ack.
pub struct SimEcat {
    header: RefCell<[u8; HEADER_LEN]>,
    body: RefCell<Vec<u16>>,
    ack: Cell<u16>,
    dc_cyc_start_time: Cell<u64>,
}

impl SimEcat {
    pub fn new() -> Self {
        SimEcat {
            header: RefCell::new([0; HEADER_LEN]),
            body: RefCell::new(Vec::new()),
            ack: Cell::new(0),
            dc_cyc_start_time: Cell::new(0),
        }
    }

    /// Land a frame in the RX regions.
    pub fn set_frame(&self, header: &[u8; HEADER_LEN], body: &[u16]) {
        *self.header.borrow_mut() = *header;
        *self.body.borrow_mut() = body.to_vec();
    }

    pub fn set_dc_cyc_start_time(&self, time: u64) {
        self.dc_cyc_start_time.set(time);
    }

    /// The last ack published into TX.
    pub fn ack(&self) -> u16 {
        self.ack.get()
    }
}

impl Default for SimEcat {
    fn default() -> Self {
        Self::new()
    }
}

impl Ecat for SimEcat {
    fn copy_header(&self, out: &mut [u8; HEADER_LEN]) {
        *out = *self.header.borrow();
    }

    fn copy_body(&self, out: &mut [u16]) {
        let body = self.body.borrow();
        let n = out.len().min(body.len());
        out[..n].copy_from_slice(&body[..n]);
    }

    fn write_ack(&self, ack: u16) {
        self.ack.set(ack);
    }

    fn dc_cyc_start_time(&self) -> u64 {
        self.dc_cyc_start_time.get()
    }
}
