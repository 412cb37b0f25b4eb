#![allow(dead_code)]

//! Test bench: the full receive/dispatch pair wired to the simulated
//! FPGA window and EtherCAT regions.

use sonarray_bsp::ecat::HEADER_LEN;
use sonarray_bsp::sim::{SimEcat, SimFpga};
use sonarray_firmware::dispatch::Dispatcher;
use sonarray_firmware::recv::Receiver;
use sonarray_firmware::ring::FrameQueue;
use sonarray_firmware::state::SharedState;
use sonarray_firmware::NUM_TRANSDUCERS;

pub struct Bench<'a> {
    pub fpga: &'a SimFpga,
    pub ecat: &'a SimEcat,
    pub shared: &'a SharedState,
    pub recv: Receiver<'a, SimFpga, SimEcat>,
    pub disp: Dispatcher<'a, SimFpga, SimEcat>,
}

pub fn with_bench(f: impl FnOnce(Bench<'_>)) {
    let fpga = SimFpga::new();
    let ecat = SimEcat::new();
    let shared = SharedState::new();
    let mut queue = FrameQueue::new();
    let (tx, rx) = queue.split();
    f(Bench {
        fpga: &fpga,
        ecat: &ecat,
        shared: &shared,
        recv: Receiver::new(&fpga, &ecat, &shared, tx),
        disp: Dispatcher::new(&fpga, &ecat, &shared, rx),
    });
}

impl Bench<'_> {
    /// Land a frame and run the receive interrupt.
    pub fn recv_frame(&mut self, header: &[u8; HEADER_LEN], body: &[u16]) {
        self.ecat.set_frame(header, body);
        self.recv.on_frame();
    }

    /// One 1 ms tick of the periodic task.
    pub fn step(&mut self) {
        self.disp.tick();
    }

    /// Receive a frame and let the periodic task dispatch it.
    pub fn send(&mut self, header: &[u8; HEADER_LEN], body: &[u16]) {
        self.recv_frame(header, body);
        self.step();
    }
}

pub fn header(msg_id: u8, fpga_ctl: u8, cpu_ctl: u8, size: u8) -> [u8; HEADER_LEN] {
    let mut raw = [0u8; HEADER_LEN];
    raw[0] = msg_id;
    raw[1] = fpga_ctl;
    raw[2] = cpu_ctl;
    raw[3] = size;
    raw
}

/// A full-length body built per channel.
pub fn body(f: impl Fn(usize) -> u16) -> Vec<u16> {
    (0..NUM_TRANSDUCERS).map(f).collect()
}
