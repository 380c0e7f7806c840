//! Read side of the continuous ADC scan.
//!
//! The ADC converts channels 0..7 back to back and the DMA controller copies
//! each result into a ring of eight half-words, wrapping forever. Nothing
//! here synchronizes with the DMA: every read is a single aligned u16 load,
//! which the bus performs atomically, so a reader sees either the previous
//! or the current conversion of a channel but never a mix.

use crate::{Channel, NUM_CHANNELS};

/// Right-aligned 12-bit data.
const RAW_MASK: u16 = 0x0FFF;

/// Anything that can report the latest raw count of a channel.
pub trait SampleSource {
    fn raw(&self, channel: Channel) -> u16;
}

impl SampleSource for [u16; NUM_CHANNELS] {
    fn raw(&self, channel: Channel) -> u16 {
        self[channel.index()]
    }
}

impl<S: SampleSource + ?Sized> SampleSource for &S {
    fn raw(&self, channel: Channel) -> u16 {
        (**self).raw(channel)
    }
}

/// View over the DMA destination buffer.
pub struct DmaReader {
    base: *const u16,
}

// The buffer is only ever read through this handle; the writer is the DMA
// engine, not another thread.
unsafe impl Send for DmaReader {}

impl DmaReader {
    /// # Safety
    ///
    /// `base` must point to `NUM_CHANNELS` consecutive, 2-byte aligned `u16`
    /// slots that stay valid for as long as the reader exists, and nothing
    /// but the DMA controller may write them. If a `&mut` to the slots is
    /// handed on after `base` was taken, its holder must not read or write
    /// through it while the reader is in use.
    pub const unsafe fn new(base: *const u16) -> Self {
        Self { base }
    }
}

impl SampleSource for DmaReader {
    fn raw(&self, channel: Channel) -> u16 {
        // SAFETY: `channel` is below NUM_CHANNELS and `new` guarantees the
        // slots are valid and aligned. Volatile so every call reloads.
        let raw = unsafe { self.base.add(channel.index()).read_volatile() };
        raw & RAW_MASK
    }
}
