// Copyright 2025 Sonarray Project Developers
// Dual licensed under the Apache 2.0 and MIT licenses.

//! Bounded single-producer/single-consumer frame ring.
//!
//! Hands complete frames from the EtherCAT receive ISR to the 1 ms
//! periodic task by value. Two monotone cursors taken modulo the depth;
//! the slot payload is published with a release store of the write cursor
//! and acquired by the consumer before it copies the slot out, so the
//! handoff is sound on weakly-ordered cores as well.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::frame::{Body, Header};

pub const DEPTH: usize = 32;

/// One queued datagram.
#[derive(Copy, Clone)]
pub struct Frame {
    pub header: Header,
    pub body: Body,
}

impl Frame {
    const EMPTY: Frame = Frame {
        header: Header::EMPTY,
        body: Body::ZERO,
    };
}

/// Returned by [`Producer::push`] when all slots are occupied.
#[derive(Copy, Clone, Debug)]
pub struct QueueFull;

pub struct FrameQueue {
    write: AtomicUsize,
    read: AtomicUsize,
    slots: UnsafeCell<[Frame; DEPTH]>,
}

// Slot access is governed by the cursors: the producer only writes the
// slot at `write` before publishing it, the consumer only reads a slot
// the producer has published.
unsafe impl Sync for FrameQueue {}

impl FrameQueue {
    pub const fn new() -> Self {
        FrameQueue {
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
            slots: UnsafeCell::new([Frame::EMPTY; DEPTH]),
        }
    }

    /// Split into the ISR-side producer and the task-side consumer.
    pub fn split(&mut self) -> (Producer<'_>, Consumer<'_>) {
        let q: &FrameQueue = self;
        (Producer { q }, Consumer { q })
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Producer<'a> {
    q: &'a FrameQueue,
}

impl Producer<'_> {
    /// Copy a frame into the next free slot. Fails when one slot short of
    /// the read cursor; the caller retries.
    pub fn push(&mut self, header: &Header, body: &Body) -> Result<(), QueueFull> {
        let write = self.q.write.load(Ordering::Relaxed);
        let next = (write + 1) % DEPTH;
        if next == self.q.read.load(Ordering::Acquire) {
            return Err(QueueFull);
        }
        unsafe {
            let slot = &mut (*self.q.slots.get())[write];
            slot.header = *header;
            slot.body = *body;
        }
        self.q.write.store(next, Ordering::Release);
        Ok(())
    }

    /// Zero the slot storage. Part of the clear routine; the protocol
    /// guarantees no frames are in flight when clear arrives.
    pub fn scrub(&mut self) {
        for slot in unsafe { (*self.q.slots.get()).iter_mut() } {
            *slot = Frame::EMPTY;
        }
    }
}

pub struct Consumer<'a> {
    q: &'a FrameQueue,
}

impl Consumer<'_> {
    /// Copy out the oldest published frame, if any.
    pub fn pop(&mut self) -> Option<Frame> {
        let read = self.q.read.load(Ordering::Relaxed);
        if read == self.q.write.load(Ordering::Acquire) {
            return None;
        }
        let frame = unsafe { (*self.q.slots.get())[read] };
        self.q.read.store((read + 1) % DEPTH, Ordering::Release);
        Some(frame)
    }
}
