use crate::{Error, NUM_CHANNELS};

/// Index of one analog input, always in `0..NUM_CHANNELS`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct Channel(u8);

impl Channel {
    pub const ALL: [Channel; NUM_CHANNELS] = [
        Channel(0),
        Channel(1),
        Channel(2),
        Channel(3),
        Channel(4),
        Channel(5),
        Channel(6),
        Channel(7),
    ];

    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < NUM_CHANNELS {
            Some(Channel(index))
        } else {
            None
        }
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn raw(self) -> u8 {
        self.0
    }
}

/// Per-channel calibration: `V_in = gain * V_pin + offset`, plus the window
/// outside of which the channel is reported out of range.
///
/// `v_min <= v_max` is not enforced. An inverted window flags every sample,
/// which is a legitimate way to mark a channel as always bad.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelConfig {
    pub gain: f32,
    /// Volts.
    pub offset: f32,
    /// Device-input volts.
    pub v_min: f32,
    /// Device-input volts.
    pub v_max: f32,
    /// Disabled channels are still converted but published as
    /// [`DISABLED_SENTINEL`](crate::DISABLED_SENTINEL).
    pub enabled: bool,
}

impl ChannelConfig {
    pub const DEFAULT_V_MIN: f32 = 0.5;
    pub const DEFAULT_V_MAX: f32 = 4.5;

    pub const fn new() -> Self {
        Self {
            gain: 1.0,
            offset: 0.0,
            v_min: Self::DEFAULT_V_MIN,
            v_max: Self::DEFAULT_V_MAX,
            enabled: true,
        }
    }

    /// Gain for a resistive divider, `(r_top + r_bottom) / r_bottom`, with
    /// the offset cleared.
    pub fn with_divider(mut self, r_top: f32, r_bottom: f32) -> Result<Self, Error> {
        self.gain = divider_gain(r_top, r_bottom)?;
        self.offset = 0.0;
        Ok(self)
    }

    pub const fn with_gain_offset(mut self, gain: f32, offset: f32) -> Self {
        self.gain = gain;
        self.offset = offset;
        self
    }

    pub const fn with_thresholds(mut self, v_min: f32, v_max: f32) -> Self {
        self.v_min = v_min;
        self.v_max = v_max;
        self
    }

    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Pin volts to device-input volts.
    pub fn apply(&self, v_pin: f32) -> f32 {
        self.gain * v_pin + self.offset
    }

    /// NaN compares false on both sides, so a NaN reading is never flagged.
    pub fn is_out_of_range(&self, v_in: f32) -> bool {
        v_in < self.v_min || v_in > self.v_max
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn divider_gain(r_top: f32, r_bottom: f32) -> Result<f32, Error> {
    // Written so that a NaN `r_bottom` is rejected as well.
    if !(r_bottom > 0.0) {
        return Err(Error::InvalidDivider);
    }

    Ok((r_top + r_bottom) / r_bottom)
}

/// Bit `i` set means channel `i` was outside its window on the last update.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct OutOfRange(u8);

impl OutOfRange {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn with(self, channel: Channel) -> Self {
        Self(self.0 | (1 << channel.0))
    }

    pub const fn contains(self, channel: Channel) -> bool {
        self.0 & (1 << channel.0) != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_rejects_out_of_range_index() {
        assert_eq!(Channel::new(7).map(Channel::index), Some(7));
        assert_eq!(Channel::new(8), None);
        assert_eq!(Channel::new(255), None);
    }

    #[test]
    fn defaults_match_power_on_state() {
        let config = ChannelConfig::default();
        assert_eq!(config.gain, 1.0);
        assert_eq!(config.offset, 0.0);
        assert_eq!(config.v_min, 0.5);
        assert_eq!(config.v_max, 4.5);
        assert!(config.enabled);
    }

    #[test]
    fn divider_sets_gain_and_clears_offset() {
        let config = ChannelConfig::new()
            .with_gain_offset(1.0, 0.25)
            .with_divider(10_000.0, 5_000.0)
            .unwrap();
        assert_eq!(config.gain, 3.0);
        assert_eq!(config.offset, 0.0);
    }

    #[test]
    fn builders_compose() {
        let config = ChannelConfig::new()
            .with_gain_offset(2.0, -0.1)
            .with_thresholds(0.0, 10.0)
            .with_enabled(false);
        assert!((config.apply(1.0) - 1.9).abs() < 1e-6);
        assert!(!config.is_out_of_range(9.9));
        assert!(!config.enabled);
    }

    #[test]
    fn divider_rejects_non_positive_bottom() {
        assert_eq!(divider_gain(10.0, 0.0), Err(Error::InvalidDivider));
        assert_eq!(divider_gain(10.0, -1.0), Err(Error::InvalidDivider));
        assert_eq!(divider_gain(10.0, f32::NAN), Err(Error::InvalidDivider));
    }

    #[test]
    fn window_is_inclusive_on_both_edges() {
        let config = ChannelConfig::new();
        assert!(!config.is_out_of_range(0.5));
        assert!(!config.is_out_of_range(4.5));
        assert!(config.is_out_of_range(0.499));
        assert!(config.is_out_of_range(4.501));
        assert!(!config.is_out_of_range(f32::NAN));
    }

    #[test]
    fn inverted_window_flags_everything() {
        let config = ChannelConfig::new().with_thresholds(4.0, 1.0);
        for v in [0.0, 1.0, 2.5, 4.0, 5.0] {
            assert!(config.is_out_of_range(v), "{} should be out of range", v);
        }
    }

    #[test]
    fn out_of_range_mask_bits() {
        let mask = OutOfRange::empty()
            .with(Channel::ALL[0])
            .with(Channel::ALL[5]);
        assert_eq!(mask.bits(), 0b0010_0001);
        assert!(mask.contains(Channel::ALL[5]));
        assert!(!mask.contains(Channel::ALL[4]));
        assert!(!mask.is_empty());
    }
}
