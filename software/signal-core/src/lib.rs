#![cfg_attr(not(test), no_std)] // Disable the standard library when not testing.

//! Hardware-independent half of the signal board: turns eight raw ADC counts
//! into calibrated device-input millivolts and publishes them on CAN.
//!
//! The board crate owns the peripherals and plugs them in through
//! [`SampleSource`], [`CanTransmit`] and [`Clock`].

mod channel;
mod error;

pub mod calibrator;
pub mod config;
pub mod intake;
pub mod pipeline;
pub mod platform;
pub mod publisher;
pub mod sampler;

pub use calibrator::Calibrator;
pub use channel::{Channel, ChannelConfig, OutOfRange};
pub use config::{Bitrate, BoardConfig};
pub use error::{Error, IntakeError};
pub use intake::{ConfigUpdate, Intake};
pub use pipeline::Pipeline;
pub use platform::{CanTransmit, Clock};
pub use publisher::{Publish, Publisher};
pub use sampler::{DmaReader, SampleSource};

/// Number of analog inputs handled (ADC_IN0..ADC_IN7).
pub const NUM_CHANNELS: usize = 8;

/// ADC reference voltage in volts.
pub const V_REF: f32 = 3.3;

/// Largest 12-bit conversion result.
pub const FULL_SCALE: f32 = 4095.0;

/// Published in place of a reading when its channel is disabled.
pub const DISABLED_SENTINEL: u16 = 0xFFFF;

/// Capacity of the inbound configuration queue. `heapless` keeps one slot
/// free, so this holds up to seven pending updates.
pub const CONFIG_QUEUE_LEN: usize = 8;

/// Queue carrying decoded configuration frames from the CAN RX interrupt to
/// the main loop.
pub type ConfigQueue = heapless::spsc::Queue<ConfigUpdate, CONFIG_QUEUE_LEN>;
