// Copyright 2025 Sonarray Project Developers
// Dual licensed under the Apache 2.0 and MIT licenses.

//! Receive-context classifier.
//!
//! Runs from the EtherCAT frame-arrival interrupt. Version queries,
//! clear and synchronization are served synchronously; everything else is
//! copied into the frame ring for the periodic task.

use core::sync::atomic::Ordering;

use log::{debug, info, warn};

use sonarray_bsp::bram::{regs, Bram, BramSelect};
use sonarray_bsp::ecat::{Ecat, HEADER_LEN};
use crate::frame::{fpga_ctl, Body, HeadOp, Header, MsgId, MSG_END};
use crate::ring::Producer;
use crate::state::SharedState;
use crate::{CPU_VERSION, NUM_TRANSDUCERS};

pub struct Receiver<'a, F, E> {
    fpga: &'a F,
    ecat: &'a E,
    shared: &'a SharedState,
    queue: Producer<'a>,
    msg_id_last: u8,
    full_spins: u32,
}

impl<'a, F: Bram, E: Ecat> Receiver<'a, F, E> {
    pub fn new(fpga: &'a F, ecat: &'a E, shared: &'a SharedState, queue: Producer<'a>) -> Self {
        Receiver {
            fpga,
            ecat,
            shared,
            queue,
            msg_id_last: 0,
            full_spins: 0,
        }
    }

    /// Number of ring-full spin iterations seen so far. Stays zero on the
    /// wire: the bus cycle is slower than the 1 ms drain.
    pub fn full_spins(&self) -> u32 {
        self.full_spins
    }

    /// Frame-arrival interrupt body.
    pub fn on_frame(&mut self) {
        let mut raw = [0u8; HEADER_LEN];
        self.ecat.copy_header(&mut raw);
        let header = Header::from_bytes(&raw);

        if header.msg_id == self.msg_id_last {
            return;
        }
        self.msg_id_last = header.msg_id;

        let reads_info = header.reads_fpga_info();
        self.shared.read_fpga_info.store(reads_info, Ordering::Relaxed);
        let mut ack = (header.msg_id as u16) << 8;
        if reads_info {
            ack |= self.fpga.read(BramSelect::Controller, regs::FPGA_INFO) & 0x00FF;
        }

        match MsgId::try_from(header.msg_id) {
            Ok(MsgId::Clear) => self.clear(),
            Ok(MsgId::RdCpuVersion) => {
                ack = (ack & 0xFF00) | (CPU_VERSION & 0x00FF);
            }
            Ok(MsgId::RdFpgaVersion) => {
                let version = self.fpga.read(BramSelect::Controller, regs::VERSION_NUM);
                ack = (ack & 0xFF00) | (version & 0x00FF);
            }
            Ok(MsgId::RdFpgaFunction) => {
                let version = self.fpga.read(BramSelect::Controller, regs::VERSION_NUM);
                ack = (ack & 0xFF00) | ((version >> 8) & 0x00FF);
            }
            Err(_) if header.msg_id > MSG_END => {
                debug!("dropping frame with msg_id {:#04x}", header.msg_id);
            }
            Err(_) => {
                let mut body = Body::ZERO;
                self.ecat.copy_body(body.words_mut());
                match header.op() {
                    HeadOp::Config { sync: true, .. } => self.synchronize(&header, &body),
                    _ => self.enqueue(&header, &body),
                }
            }
        }

        self.shared.ack.store(ack, Ordering::Relaxed);
        self.ecat.write_ack(ack);
    }

    fn enqueue(&mut self, header: &Header, body: &Body) {
        let mut spins = 0u32;
        while self.queue.push(header, body).is_err() {
            spins += 1;
            core::hint::spin_loop();
        }
        if spins > 0 {
            self.full_spins = self.full_spins.wrapping_add(spins);
            warn!("frame ring full, spun {} times", spins);
        }
    }

    /// Program per-channel cycles and the EC sync time, then latch the
    /// SYNC bit. Serviced here rather than through the ring so the FPGA
    /// catches the distributed-clock tick the header refers to.
    fn synchronize(&mut self, header: &Header, body: &Body) {
        let cycles = body.words();
        self.fpga
            .copy_in(BramSelect::Controller, regs::CYCLE_BASE, cycles);

        let time = self.ecat.dc_cyc_start_time();
        let time_words = [
            time as u16,
            (time >> 16) as u16,
            (time >> 32) as u16,
            (time >> 48) as u16,
        ];
        self.fpga
            .copy_in(BramSelect::Controller, regs::EC_SYNC_TIME_0, &time_words);

        self.fpga.write(
            BramSelect::Controller,
            regs::CTL_REG,
            (header.fpga_ctl | fpga_ctl::SYNC) as u16,
        );

        for (cached, &cycle) in self.shared.cycles.iter().zip(cycles.iter()) {
            cached.store(cycle, Ordering::Relaxed);
        }
        info!("synchronized {} channels", cycles.len());
    }

    /// Reset the device to its power-on defaults. Also run by board init
    /// before interrupts are enabled.
    pub fn clear(&mut self) {
        self.fpga.write(
            BramSelect::Controller,
            regs::CTL_REG,
            fpga_ctl::LEGACY_MODE as u16,
        );
        self.fpga.write(BramSelect::Controller, regs::SILENT_STEP, 10);
        self.fpga
            .write(BramSelect::Controller, regs::SILENT_CYCLE, 4096);

        self.shared.stm_cycle.store(0, Ordering::Relaxed);

        // Default envelope: two samples of silence at 4 kHz.
        let freq_div: u32 = 40960;
        self.shared.mod_cycle.store(2, Ordering::Relaxed);
        self.fpga.write(BramSelect::Controller, regs::MOD_CYCLE, 1);
        self.fpga.copy_in(
            BramSelect::Controller,
            regs::MOD_FREQ_DIV_0,
            &[freq_div as u16, (freq_div >> 16) as u16],
        );
        self.fpga
            .write(BramSelect::Controller, regs::MOD_ADDR_OFFSET, 0);
        self.fpga.write(BramSelect::Mod, 0, 0x0000);

        self.fpga
            .fill(BramSelect::Normal, 0, 0x0000, NUM_TRANSDUCERS * 2);

        self.queue.scrub();
        self.shared.read_fpga_info.store(false, Ordering::Relaxed);
        info!("cleared");
    }
}
