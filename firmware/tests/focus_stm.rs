//! Point-stream uploads: stride-8 slots with segment wrap handling.

mod common;

use std::sync::atomic::Ordering;

use common::{header, with_bench};
use sonarray_bsp::bram::regs;
use sonarray_firmware::frame::{cpu_ctl, fpga_ctl};
use sonarray_firmware::{FOCUS_SEG_SIZE, NUM_TRANSDUCERS};

const STM_POINT: u8 = fpga_ctl::OP_MODE;

fn point_word(point: usize, i: usize) -> u16 {
    (point * 4 + i + 1) as u16
}

/// Body of a point-stream frame: leading size word (after the stream
/// setup words on the first frame), then four words per point.
fn stm_body(first: Option<(u32, u32)>, points: std::ops::Range<usize>) -> Vec<u16> {
    let mut words = vec![0u16; NUM_TRANSDUCERS];
    let mut at = 0;
    words[at] = points.len() as u16;
    at += 1;
    if let Some((freq_div, sound_speed)) = first {
        words[at] = freq_div as u16;
        words[at + 1] = (freq_div >> 16) as u16;
        words[at + 2] = sound_speed as u16;
        words[at + 3] = (sound_speed >> 16) as u16;
        at += 4;
    }
    for point in points {
        for i in 0..4 {
            words[at] = point_word(point, i);
            at += 1;
        }
    }
    words
}

#[test]
fn single_point_stream() {
    with_bench(|mut b| {
        let raw = header(
            0x50,
            STM_POINT,
            cpu_ctl::WRITE_BODY | cpu_ctl::STM_BEGIN | cpu_ctl::STM_END,
            0,
        );
        b.send(&raw, &stm_body(Some((1000, 340_000)), 0..1));

        for i in 0..4 {
            assert_eq!(b.fpga.stm_word(i), point_word(0, i));
        }
        for i in 4..8 {
            assert_eq!(b.fpga.stm_word(i), 0);
        }
        assert_eq!(b.fpga.controller(regs::STM_CYCLE), 0);
        assert_eq!(b.fpga.controller(regs::STM_FREQ_DIV_0), 1000);
        assert_eq!(b.fpga.controller(regs::STM_FREQ_DIV_0 + 1), 0);
        assert_eq!(b.fpga.controller(regs::SOUND_SPEED_0), 0x3020);
        assert_eq!(b.fpga.controller(regs::SOUND_SPEED_0 + 1), 0x0005);
        assert_eq!(b.shared.stm_cycle.load(Ordering::Relaxed), 1);
    });
}

#[test]
fn multi_frame_stream_crosses_the_segment_boundary() {
    with_bench(|mut b| {
        const HEAD: usize = 60;
        const CHUNK: usize = 61;
        const FRAMES: usize = 33;
        const TOTAL: usize = HEAD + FRAMES * CHUNK;
        assert!(TOTAL > FOCUS_SEG_SIZE as usize);

        let raw = header(
            0x05,
            STM_POINT,
            cpu_ctl::WRITE_BODY | cpu_ctl::STM_BEGIN,
            0,
        );
        b.send(&raw, &stm_body(Some((1000, 340_000)), 0..HEAD));

        let mut sent = HEAD;
        for frame in 0..FRAMES {
            let last = frame == FRAMES - 1;
            let flags = if last {
                cpu_ctl::WRITE_BODY | cpu_ctl::STM_END
            } else {
                cpu_ctl::WRITE_BODY
            };
            let raw = header(0x06 + (frame % 2) as u8, STM_POINT, flags, 0);
            b.send(&raw, &stm_body(None, sent..sent + CHUNK));
            sent += CHUNK;
        }

        for point in 0..TOTAL {
            for i in 0..4 {
                assert_eq!(
                    b.fpga.stm_word(point * 8 + i),
                    point_word(point, i),
                    "point {} word {}",
                    point,
                    i
                );
            }
            for i in 4..8 {
                assert_eq!(b.fpga.stm_word(point * 8 + i), 0);
            }
        }
        assert_eq!(b.fpga.controller(regs::STM_ADDR_OFFSET), 1);
        assert_eq!(b.fpga.controller(regs::STM_CYCLE), (TOTAL - 1) as u16);
    });
}
