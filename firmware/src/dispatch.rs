// Copyright 2025 Sonarray Project Developers
// Dual licensed under the Apache 2.0 and MIT licenses.

//! Periodic-context dispatcher.
//!
//! Runs once per 1 ms tick: drains at most one frame from the ring,
//! routes it to the writer selected by the control flags, and refreshes
//! the acknowledgement word in the EtherCAT TX region.

use core::sync::atomic::Ordering;

use sonarray_bsp::bram::{regs, Bram, BramSelect};
use sonarray_bsp::ecat::Ecat;
use crate::frame::{Body, HeadOp, Header, MsgId};
use crate::ring::Consumer;
use crate::state::SharedState;
use crate::stm::GainStmMode;
use crate::{MOD_SEG_MASK, MOD_SEG_SIZE, MOD_SEG_WIDTH};

pub struct Dispatcher<'a, F, E> {
    pub(crate) fpga: &'a F,
    ecat: &'a E,
    pub(crate) shared: &'a SharedState,
    queue: Consumer<'a>,
    pub(crate) gain_mode: GainStmMode,
}

impl<'a, F: Bram, E: Ecat> Dispatcher<'a, F, E> {
    pub fn new(fpga: &'a F, ecat: &'a E, shared: &'a SharedState, queue: Consumer<'a>) -> Self {
        Dispatcher {
            fpga,
            ecat,
            shared,
            queue,
            gain_mode: GainStmMode::PhaseDutyFull,
        }
    }

    /// 1 ms tick body.
    pub fn tick(&mut self) {
        if let Some(frame) = self.queue.pop() {
            self.dispatch(&frame.header, &frame.body);
        }
        self.refresh_ack();
    }

    fn dispatch(&mut self, header: &Header, body: &Body) {
        self.fpga
            .write(BramSelect::Controller, regs::CTL_REG, header.fpga_ctl as u16);

        match header.op() {
            HeadOp::Modulation { begin, end } => self.write_mod(header, begin, end),
            HeadOp::Config { silencer: true, .. } => self.config_silencer(header),
            HeadOp::Config { .. } => {}
        }

        if !header.write_body() {
            return;
        }
        if header.mod_delay() {
            self.write_mod_delay(body);
            return;
        }
        if !header.is_stm() {
            self.write_gain(header, body);
        } else if header.is_gain_stm() {
            self.write_gain_stm(header, body);
        } else {
            self.write_focus_stm(header, body);
        }
    }

    /// Re-publish the ack word, refreshing its low byte from the FPGA
    /// info register when requested. Version replies keep their payload.
    fn refresh_ack(&mut self) {
        let mut ack = self.shared.ack.load(Ordering::Relaxed);
        let id = (ack >> 8) as u8;
        let version_reply = matches!(
            MsgId::try_from(id),
            Ok(MsgId::RdCpuVersion | MsgId::RdFpgaVersion | MsgId::RdFpgaFunction)
        );
        if !version_reply && self.shared.read_fpga_info.load(Ordering::Relaxed) {
            let info = self.fpga.read(BramSelect::Controller, regs::FPGA_INFO);
            ack = (ack & 0xFF00) | (info & 0x00FF);
            self.shared.ack.store(ack, Ordering::Relaxed);
        }
        self.ecat.write_ack(ack);
    }

    fn config_silencer(&mut self, header: &Header) {
        let (cycle, step) = header.silencer();
        self.fpga
            .write(BramSelect::Controller, regs::SILENT_STEP, step);
        self.fpga
            .write(BramSelect::Controller, regs::SILENT_CYCLE, cycle);
    }

    fn write_mod_delay(&mut self, body: &Body) {
        self.fpga
            .copy_in(BramSelect::Controller, regs::MOD_DELAY_BASE, body.words());
    }

    /// N gain words at stride 2: each channel owns a {phase, duty} word
    /// pair. Legacy mode packs both halves into the phase word; raw mode
    /// fills one half per frame, selected by IS_DUTY.
    fn write_gain(&mut self, header: &Header, body: &Body) {
        let offset = if !header.legacy_mode() && header.is_duty() {
            1
        } else {
            0
        };
        for (i, &word) in body.words().iter().enumerate() {
            self.fpga
                .write(BramSelect::Normal, ((i as u16) << 1) + offset, word);
        }
    }

    /// Append modulation samples into the segmented envelope buffer.
    fn write_mod(&mut self, header: &Header, begin: bool, end: bool) {
        let mut cycle = self.shared.mod_cycle.load(Ordering::Relaxed);

        let data = if begin {
            cycle = 0;
            self.fpga
                .write(BramSelect::Controller, regs::MOD_ADDR_OFFSET, 0);
            let (freq_div, samples) = header.mod_head();
            self.fpga.copy_in(
                BramSelect::Controller,
                regs::MOD_FREQ_DIV_0,
                &[freq_div as u16, (freq_div >> 16) as u16],
            );
            samples
        } else {
            header.mod_body()
        };

        let write = header.size as u32;
        let capacity = ((cycle & !MOD_SEG_MASK) + MOD_SEG_SIZE) - cycle;
        if write <= capacity {
            self.copy_mod_samples(cycle, data, write);
            cycle += write;
        } else {
            self.copy_mod_samples(cycle, data, capacity);
            cycle += capacity;
            self.fpga.write(
                BramSelect::Controller,
                regs::MOD_ADDR_OFFSET,
                (cycle >> MOD_SEG_WIDTH) as u16,
            );
            let tail = &data[(capacity as usize).min(data.len())..];
            self.copy_mod_samples(cycle, tail, write - capacity);
            cycle += write - capacity;
        }

        if end {
            self.fpga.write(
                BramSelect::Controller,
                regs::MOD_CYCLE,
                (cycle.max(1) - 1) as u16,
            );
        }
        self.shared.mod_cycle.store(cycle, Ordering::Relaxed);
    }

    /// Pack byte samples into words and store them at the write position
    /// inside the current segment.
    fn copy_mod_samples(&mut self, cycle: u32, data: &[u8], n_samples: u32) {
        let addr = ((cycle & MOD_SEG_MASK) >> 1) as u16;
        let n_words = ((n_samples + 1) >> 1) as usize;
        for (i, pair) in data.chunks(2).take(n_words).enumerate() {
            let word = if pair.len() == 2 {
                u16::from_le_bytes([pair[0], pair[1]])
            } else {
                pair[0] as u16
            };
            self.fpga.write(BramSelect::Mod, addr + i as u16, word);
        }
    }
}
