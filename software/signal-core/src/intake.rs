//! Inbound channel configuration.
//!
//! Wire layout of the configuration frame (standard ID, DLC >= 6):
//!
//! | byte | content                                  |
//! |------|------------------------------------------|
//! | 0    | channel index, 0..7                      |
//! | 1..4 | gain, IEEE-754 f32, little-endian        |
//! | 5    | enable flag, 0 = disabled, else enabled  |
//!
//! Bytes past the sixth are ignored. Malformed frames are dropped without any
//! reply on the bus.
//!
//! [`Intake`] runs in the CAN RX interrupt. It never touches the calibrator:
//! it decodes and pushes a [`ConfigUpdate`] into a single-producer queue that
//! the main loop drains before each update, so channel configuration is only
//! ever written from one context.

use bxcan::{Frame, Id, StandardId};
use heapless::spsc::Producer;

use crate::{Channel, IntakeError, CONFIG_QUEUE_LEN};

/// Default identifier of the configuration frame.
pub const DEFAULT_CONFIG_ID: u16 = 0x200;

const FRAME_LEN: usize = 6;

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigUpdate {
    pub channel: Channel,
    pub gain: f32,
    pub enabled: bool,
}

impl ConfigUpdate {
    pub fn decode(data: &[u8]) -> Result<Self, IntakeError> {
        if data.len() < FRAME_LEN {
            return Err(IntakeError::TooShort(data.len() as u8));
        }

        let channel = Channel::new(data[0]).ok_or(IntakeError::InvalidChannel(data[0]))?;
        let gain = f32::from_le_bytes([data[1], data[2], data[3], data[4]]);

        Ok(Self {
            channel,
            gain,
            enabled: data[5] != 0,
        })
    }

    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let gain = self.gain.to_le_bytes();
        [
            self.channel.raw(),
            gain[0],
            gain[1],
            gain[2],
            gain[3],
            self.enabled as u8,
        ]
    }
}

pub struct Intake<'a> {
    config_id: StandardId,
    producer: Producer<'a, ConfigUpdate, CONFIG_QUEUE_LEN>,
    accepted: u32,
    dropped: u32,
    overflowed: u32,
}

impl<'a> Intake<'a> {
    pub fn new(config_id: StandardId, producer: Producer<'a, ConfigUpdate, CONFIG_QUEUE_LEN>) -> Self {
        Self {
            config_id,
            producer,
            accepted: 0,
            dropped: 0,
            overflowed: 0,
        }
    }

    /// Validates a received frame and queues the update it carries.
    pub fn on_frame(&mut self, frame: &Frame) -> Result<ConfigUpdate, IntakeError> {
        let result = self.decode(frame).and_then(|update| {
            self.producer
                .enqueue(update)
                .map(|()| update)
                .map_err(|_| IntakeError::QueueFull)
        });

        match result {
            Ok(_) => self.accepted = self.accepted.wrapping_add(1),
            Err(IntakeError::QueueFull) => self.overflowed = self.overflowed.wrapping_add(1),
            Err(_) => self.dropped = self.dropped.wrapping_add(1),
        }

        result
    }

    /// Checks identifier and frame kind, then decodes the payload.
    pub fn decode(&self, frame: &Frame) -> Result<ConfigUpdate, IntakeError> {
        match frame.id() {
            Id::Standard(id) if id == self.config_id => {}
            _ => return Err(IntakeError::WrongId),
        }

        let data = frame.data().ok_or(IntakeError::RemoteFrame)?;
        ConfigUpdate::decode(data.as_ref())
    }

    pub fn config_id(&self) -> StandardId {
        self.config_id
    }

    pub fn accepted(&self) -> u32 {
        self.accepted
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    pub fn overflowed(&self) -> u32 {
        self.overflowed
    }
}
