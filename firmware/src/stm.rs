// Copyright 2025 Sonarray Project Developers
// Dual licensed under the Apache 2.0 and MIT licenses.

//! Spatio-temporal stream writers.
//!
//! Point streams append 4-word focal points at stride-8 slots; gain
//! streams append whole transducer frames into 2^9-word slots, encoded in
//! one of three wire formats crossed with the legacy/raw FPGA mode. Both
//! share the segmented STM buffer: whenever an append fills a segment,
//! the address-offset register moves the window before the next word
//! lands.

use core::sync::atomic::Ordering;

use log::debug;
use num_enum::TryFromPrimitive;

use sonarray_bsp::bram::{regs, Bram, BramSelect};
use sonarray_bsp::ecat::Ecat;
use crate::dispatch::Dispatcher;
use crate::frame::{Body, Header};
use crate::{
    FOCUS_SEG_MASK, FOCUS_SEG_SIZE, FOCUS_SEG_WIDTH, GAIN_FRAME_WIDTH, GAIN_SEG_MASK,
    GAIN_SEG_WIDTH,
};

/// Gain-stream wire encoding, latched by the stream header frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u16)]
pub(crate) enum GainStmMode {
    PhaseDutyFull = 0x0001,
    PhaseFull = 0x0002,
    PhaseHalf = 0x0004,
}

impl<'a, F: Bram, E: Ecat> Dispatcher<'a, F, E> {
    /// Append focal points to the point stream.
    pub(crate) fn write_focus_stm(&mut self, header: &Header, body: &Body) {
        let mut cycle = self.shared.stm_cycle.load(Ordering::Relaxed);
        let words = body.words();

        let (size, points) = if header.stm_begin() {
            cycle = 0;
            self.fpga
                .write(BramSelect::Controller, regs::STM_ADDR_OFFSET, 0);
            self.fpga
                .copy_in(BramSelect::Controller, regs::STM_FREQ_DIV_0, &words[1..3]);
            self.fpga
                .copy_in(BramSelect::Controller, regs::SOUND_SPEED_0, &words[3..5]);
            (words[0] as u32, &words[5..])
        } else {
            (words[0] as u32, &words[1..])
        };

        let capacity = ((cycle & !FOCUS_SEG_MASK) + FOCUS_SEG_SIZE) - cycle;
        if size <= capacity {
            self.copy_points(cycle, points, size);
            cycle += size;
        } else {
            self.copy_points(cycle, points, capacity);
            cycle += capacity;
            self.fpga.write(
                BramSelect::Controller,
                regs::STM_ADDR_OFFSET,
                (cycle >> FOCUS_SEG_WIDTH) as u16,
            );
            let consumed = ((capacity as usize) * 4).min(points.len());
            self.copy_points(cycle, &points[consumed..], size - capacity);
            cycle += size - capacity;
        }

        if header.stm_end() {
            self.fpga.write(
                BramSelect::Controller,
                regs::STM_CYCLE,
                (cycle.max(1) - 1) as u16,
            );
        }
        self.shared.stm_cycle.store(cycle, Ordering::Relaxed);
    }

    /// Four data words per point, eight-word slots.
    fn copy_points(&mut self, cycle: u32, points: &[u16], n_points: u32) {
        let mut dst = ((cycle & FOCUS_SEG_MASK) << 3) as u16;
        for point in points.chunks_exact(4).take(n_points as usize) {
            self.fpga.copy_in(BramSelect::Stm, dst, point);
            dst += 8;
        }
    }

    /// Append one encoded gain frame (or latch the stream setup) to the
    /// gain stream.
    pub(crate) fn write_gain_stm(&mut self, header: &Header, body: &Body) {
        let words = body.words();

        if header.stm_begin() {
            self.shared.stm_cycle.store(0, Ordering::Relaxed);
            self.fpga
                .write(BramSelect::Controller, regs::STM_ADDR_OFFSET, 0);
            self.fpga
                .copy_in(BramSelect::Controller, regs::STM_FREQ_DIV_0, &words[0..2]);
            self.gain_mode = GainStmMode::try_from(words[2]).unwrap_or_else(|_| {
                debug!("unknown gain stream mode {:#06x}", words[2]);
                GainStmMode::PhaseDutyFull
            });
            return;
        }

        let mut cycle = self.shared.stm_cycle.load(Ordering::Relaxed);
        let legacy = header.legacy_mode();

        match self.gain_mode {
            GainStmMode::PhaseDutyFull => {
                if legacy {
                    self.copy_gain_frame(cycle, words, 0, |w| w);
                    cycle = self.gain_advance(cycle);
                } else if header.is_duty() {
                    self.copy_gain_frame(cycle, words, 1, |w| w);
                    cycle = self.gain_advance(cycle);
                } else {
                    // Phase half of the pair; the matching duty frame
                    // advances the stream.
                    self.copy_gain_frame(cycle, words, 0, |w| w);
                }
            }
            GainStmMode::PhaseFull => {
                if legacy {
                    self.copy_gain_frame(cycle, words, 0, |w| 0xFF00 | (w & 0x00FF));
                    cycle = self.gain_advance(cycle);
                    self.copy_gain_frame(cycle, words, 0, |w| 0xFF00 | ((w >> 8) & 0x00FF));
                    cycle = self.gain_advance(cycle);
                } else if !header.is_duty() {
                    // Full duty cycle per channel, taken from the cycle
                    // cache at the successor index (see DESIGN.md).
                    let base = ((cycle & GAIN_SEG_MASK) << GAIN_FRAME_WIDTH) as u16;
                    for (i, &word) in words.iter().enumerate() {
                        let duty = self.shared.cycles[i + 1].load(Ordering::Relaxed) >> 1;
                        self.fpga
                            .write(BramSelect::Stm, base + ((i as u16) << 1), word);
                        self.fpga
                            .write(BramSelect::Stm, base + ((i as u16) << 1) + 1, duty);
                    }
                    cycle = self.gain_advance(cycle);
                }
                // Raw duty frames carry nothing new and are skipped.
            }
            GainStmMode::PhaseHalf => {
                if legacy {
                    for shift in [0u16, 4, 8, 12] {
                        self.copy_gain_frame(cycle, words, 0, move |w| {
                            let phase = (w >> shift) & 0x000F;
                            0xFF00 | (phase << 4) | phase
                        });
                        cycle = self.gain_advance(cycle);
                    }
                }
                // No raw encoding exists for half-width phases.
            }
        }

        if header.stm_end() {
            self.fpga.write(
                BramSelect::Controller,
                regs::STM_CYCLE,
                (cycle.max(1) - 1) as u16,
            );
        }
        self.shared.stm_cycle.store(cycle, Ordering::Relaxed);
    }

    /// One word per channel at stride 2 into the slot of `cycle`.
    fn copy_gain_frame(
        &mut self,
        cycle: u32,
        words: &[u16],
        offset: u16,
        encode: impl Fn(u16) -> u16,
    ) {
        let base = ((cycle & GAIN_SEG_MASK) << GAIN_FRAME_WIDTH) as u16 + offset;
        for (i, &word) in words.iter().enumerate() {
            self.fpga
                .write(BramSelect::Stm, base + ((i as u16) << 1), encode(word));
        }
    }

    /// Advance the gain stream by one frame, moving the window at
    /// segment boundaries.
    fn gain_advance(&mut self, cycle: u32) -> u32 {
        let cycle = cycle + 1;
        if cycle & GAIN_SEG_MASK == 0 {
            self.fpga.write(
                BramSelect::Controller,
                regs::STM_ADDR_OFFSET,
                (cycle >> GAIN_SEG_WIDTH) as u16,
            );
        }
        cycle
    }
}
