//! State shared between the receive ISR and the periodic task.
//!
//! Everything here is a word-sized atomic: last-writer-wins is the
//! intended semantics for `ack`, and the stream counters are only ever
//! touched by the periodic task except for the reset performed by the
//! clear routine in the receive context.

use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU32};

use crate::NUM_TRANSDUCERS;

pub struct SharedState {
    /// High byte echoes the served `msg_id`, low byte carries version or
    /// FPGA info. Mirrored into the EtherCAT TX region by both contexts.
    pub ack: AtomicU16,
    /// Latched from the READS_FPGA_INFO header flag; tells the periodic
    /// task to refresh the ack low byte from the FPGA info register.
    pub read_fpga_info: AtomicBool,
    /// Modulation samples appended so far in the current upload.
    pub mod_cycle: AtomicU32,
    /// STM entries appended so far in the current stream upload.
    pub stm_cycle: AtomicU32,
    /// Per-channel cycle table cached at synchronization. Holds one guard
    /// slot past the last channel: the gain-STM phase-full raw path reads
    /// the cycle of channel i+1 for channel i's duty word, including one
    /// past the end (see DESIGN.md), and the guard keeps that read at a
    /// well-defined zero.
    pub cycles: [AtomicU16; NUM_TRANSDUCERS + 1],
}

impl SharedState {
    pub const fn new() -> Self {
        const ZERO: AtomicU16 = AtomicU16::new(0);
        SharedState {
            ack: AtomicU16::new(0),
            read_fpga_info: AtomicBool::new(false),
            mod_cycle: AtomicU32::new(0),
            stm_cycle: AtomicU32::new(0),
            cycles: [ZERO; NUM_TRANSDUCERS + 1],
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
