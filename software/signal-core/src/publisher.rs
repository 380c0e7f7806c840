//! Periodic publication of the eight device-input readings.
//!
//! Two data frames per period, DLC 8, four big-endian u16 millivolt values
//! each:
//!
//! ```text
//! node_id + 1: ch0 ch1 ch2 ch3
//! node_id + 2: ch4 ch5 ch6 ch7
//! ```
//!
//! A disabled channel is sent as `0xFFFF`. With the status frame turned on,
//! `node_id + 3` follows with `[out_of_range, enabled]` bitmasks.

use bxcan::{Frame, StandardId};

use crate::{
    platform::send_blocking, BoardConfig, Calibrator, CanTransmit, Channel, Clock, Error,
    DISABLED_SENTINEL, NUM_CHANNELS,
};

const FRAME_A_OFFSET: u16 = 1;
const FRAME_B_OFFSET: u16 = 2;
const STATUS_OFFSET: u16 = 3;

/// Channels carried by each data frame.
const PER_FRAME: usize = 4;

const _: () = assert!(2 * PER_FRAME == NUM_CHANNELS);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Publish {
    /// The period has not elapsed; nothing was sent.
    NotDue,
    Sent,
}

/// Packs four readings big-endian, high byte first, replacing disabled ones
/// with the sentinel.
pub fn encode_values(millivolts: [u16; PER_FRAME], enabled: [bool; PER_FRAME]) -> [u8; 8] {
    let mut data = [0u8; 8];
    for (i, chunk) in data.chunks_exact_mut(2).enumerate() {
        let value = if enabled[i] { millivolts[i] } else { DISABLED_SENTINEL };
        chunk.copy_from_slice(&value.to_be_bytes());
    }
    data
}

/// Inverse of [`encode_values`] for receivers and tests.
pub fn decode_values(data: &[u8; 8]) -> [u16; PER_FRAME] {
    let mut values = [0u16; PER_FRAME];
    for (value, chunk) in values.iter_mut().zip(data.chunks_exact(2)) {
        *value = u16::from_be_bytes([chunk[0], chunk[1]]);
    }
    values
}

fn offset_id(node_id: u8, offset: u16) -> Result<StandardId, Error> {
    StandardId::new(u16::from(node_id) + offset).ok_or(Error::InvalidFrameId)
}

pub struct Publisher {
    node_id: u8,
    frame_a_id: StandardId,
    frame_b_id: StandardId,
    status_id: Option<StandardId>,
    period_ms: u32,
    timeout_ms: u32,
    last_send_ms: u32,
}

impl Publisher {
    /// The first publication is due `period_ms` after `now_ms`.
    pub fn new(config: &BoardConfig, now_ms: u32) -> Result<Self, Error> {
        let status_id = if config.status_frame {
            Some(offset_id(config.node_id, STATUS_OFFSET)?)
        } else {
            None
        };

        Ok(Self {
            node_id: config.node_id,
            frame_a_id: offset_id(config.node_id, FRAME_A_OFFSET)?,
            frame_b_id: offset_id(config.node_id, FRAME_B_OFFSET)?,
            status_id,
            period_ms: config.period_ms,
            timeout_ms: config.tx_timeout_ms,
            last_send_ms: now_ms,
        })
    }

    /// Sends the frames if at least `period_ms` passed since the last
    /// successful publication.
    ///
    /// On a send failure the error is returned and the cadence does not
    /// advance, so the next call retries straight away.
    pub fn maybe_publish<T, C>(
        &mut self,
        now_ms: u32,
        calibrator: &Calibrator,
        tx: &mut T,
        clock: &C,
    ) -> Result<Publish, Error>
    where
        T: CanTransmit + ?Sized,
        C: Clock + ?Sized,
    {
        if now_ms.wrapping_sub(self.last_send_ms) < self.period_ms {
            return Ok(Publish::NotDue);
        }

        self.publish(calibrator, tx, clock)?;
        self.last_send_ms = now_ms;

        #[cfg(feature = "defmt")]
        defmt::trace!("published at {} ms", now_ms);

        Ok(Publish::Sent)
    }

    /// Sends every frame of one cycle, stopping at the first failure.
    pub fn publish<T, C>(&self, calibrator: &Calibrator, tx: &mut T, clock: &C) -> Result<(), Error>
    where
        T: CanTransmit + ?Sized,
        C: Clock + ?Sized,
    {
        for frame in self.frames(calibrator) {
            send_blocking(tx, clock, &frame, self.timeout_ms)?;
        }

        if let Some(frame) = self.status_frame(calibrator) {
            send_blocking(tx, clock, &frame, self.timeout_ms)?;
        }

        Ok(())
    }

    pub fn frames(&self, calibrator: &Calibrator) -> [Frame; 2] {
        [
            Frame::new_data(self.frame_a_id, Self::payload(calibrator, 0)),
            Frame::new_data(self.frame_b_id, Self::payload(calibrator, PER_FRAME)),
        ]
    }

    pub fn status_frame(&self, calibrator: &Calibrator) -> Option<Frame> {
        let id = self.status_id?;
        let data = [calibrator.out_of_range().bits(), calibrator.enabled_mask()];
        Some(Frame::new_data(id, data))
    }

    fn payload(calibrator: &Calibrator, first: usize) -> [u8; 8] {
        let millivolts = calibrator.millivolts();
        let mut values = [0u16; PER_FRAME];
        let mut enabled = [false; PER_FRAME];

        for i in 0..PER_FRAME {
            values[i] = millivolts[first + i];
            enabled[i] = calibrator.is_enabled(Channel::ALL[first + i]);
        }

        encode_values(values, enabled)
    }

    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    pub fn last_send_ms(&self) -> u32 {
        self.last_send_ms
    }
}
