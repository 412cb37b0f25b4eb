// Copyright 2025 Sonarray Project Developers
// Dual licensed under the Apache 2.0 and MIT licenses.

//! EtherCAT shared-memory regions.
//!
//! The bus controller lands each datagram in two RX regions (RX1 carries
//! the fixed-size header, RX0 the body) and reads the 16-bit
//! acknowledgement word back from the TX region. A device register
//! publishes the distributed-clock start time of the next synchronized
//! tick.

use core::ptr;

/// Byte length of the fixed-size frame header in RX1.
pub const HEADER_LEN: usize = 128;

pub trait Ecat {
    /// Copy the 128-byte header out of RX1.
    fn copy_header(&self, out: &mut [u8; HEADER_LEN]);

    /// Copy the body words out of RX0. Reads `out.len()` words.
    fn copy_body(&self, out: &mut [u16]);

    /// Publish the acknowledgement word into the TX region.
    fn write_ack(&self, ack: u16);

    /// The `DC_CYC_START_TIME` device register.
    fn dc_cyc_start_time(&self) -> u64;
}

/// The memory-mapped RX/TX regions of the EtherCAT controller.
pub struct EcatRegs {
    rx0: *const u16,
    rx1: *const u8,
    tx: *mut u16,
    dc_cyc_start_time: *const u32,
}

impl EcatRegs {
    /// # Safety
    ///
    /// The pointers must reference the device RX0/RX1/TX regions and the
    /// `DC_CYC_START_TIME` register, each valid for volatile access of the
    /// sizes used by this module.
    pub const unsafe fn new(
        rx0: *const u16,
        rx1: *const u8,
        tx: *mut u16,
        dc_cyc_start_time: *const u32,
    ) -> Self {
        EcatRegs {
            rx0,
            rx1,
            tx,
            dc_cyc_start_time,
        }
    }
}

unsafe impl Send for EcatRegs {}
unsafe impl Sync for EcatRegs {}

impl Ecat for EcatRegs {
    fn copy_header(&self, out: &mut [u8; HEADER_LEN]) {
        for (i, b) in out.iter_mut().enumerate() {
            *b = unsafe { ptr::read_volatile(self.rx1.add(i)) };
        }
    }

    fn copy_body(&self, out: &mut [u16]) {
        for (i, w) in out.iter_mut().enumerate() {
            *w = unsafe { ptr::read_volatile(self.rx0.add(i)) };
        }
    }

    fn write_ack(&self, ack: u16) {
        unsafe { ptr::write_volatile(self.tx, ack) }
    }

    fn dc_cyc_start_time(&self) -> u64 {
        let lo = unsafe { ptr::read_volatile(self.dc_cyc_start_time) };
        let hi = unsafe { ptr::read_volatile(self.dc_cyc_start_time.add(1)) };
        ((hi as u64) << 32) | lo as u64
    }
}
