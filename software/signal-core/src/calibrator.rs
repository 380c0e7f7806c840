//! Raw counts to device-input volts.
//!
//! ```text
//! v_pin = V_REF * raw / FULL_SCALE
//! v_in  = gain * v_pin + offset
//! mV    = saturate_u16(round(v_in * 1000))
//! ```
//!
//! Channel configuration is owned here and only changed from the main loop,
//! either through the setters at boot or by folding in queued
//! [`ConfigUpdate`]s.

use crate::{
    channel::divider_gain, Channel, ChannelConfig, ConfigUpdate, Error, OutOfRange,
    SampleSource, FULL_SCALE, NUM_CHANNELS, V_REF,
};

/// Volts at the MCU pin for a raw 12-bit count.
pub fn raw_to_pin_volts(raw: u16) -> f32 {
    (V_REF * raw as f32) / FULL_SCALE
}

/// Saturating, round-half-up conversion to millivolts for transport.
///
/// Anything at or below zero is 0, anything at or above 65.535 V is 65535.
/// NaN lands on 0 through the saturating float cast.
pub fn volts_to_millivolts(volts: f32) -> u16 {
    if volts <= 0.0 {
        return 0;
    }

    let millivolts = volts * 1000.0;
    if millivolts >= u16::MAX as f32 {
        return u16::MAX;
    }

    (millivolts + 0.5) as u16
}

/// Results of the most recent [`Calibrator::update`].
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Snapshot {
    pub raw: [u16; NUM_CHANNELS],
    pub pin_volts: [f32; NUM_CHANNELS],
    pub input_volts: [f32; NUM_CHANNELS],
    pub millivolts: [u16; NUM_CHANNELS],
    pub out_of_range: OutOfRange,
}

impl Snapshot {
    pub const fn new() -> Self {
        Self {
            raw: [0; NUM_CHANNELS],
            pin_volts: [0.0; NUM_CHANNELS],
            input_volts: [0.0; NUM_CHANNELS],
            millivolts: [0; NUM_CHANNELS],
            out_of_range: OutOfRange::empty(),
        }
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Calibrator {
    channels: [ChannelConfig; NUM_CHANNELS],
    snapshot: Snapshot,
}

impl Calibrator {
    /// All channels at their power-on defaults.
    pub const fn new() -> Self {
        Self::with_channels([ChannelConfig::new(); NUM_CHANNELS])
    }

    pub const fn with_channels(channels: [ChannelConfig; NUM_CHANNELS]) -> Self {
        Self {
            channels,
            snapshot: Snapshot::new(),
        }
    }

    /// `gain = (r_top + r_bottom) / r_bottom`, `offset = 0`.
    ///
    /// Leaves the channel untouched when `r_bottom` is not positive.
    pub fn set_divider(&mut self, channel: Channel, r_top: f32, r_bottom: f32) -> Result<(), Error> {
        let gain = divider_gain(r_top, r_bottom)?;

        let config = &mut self.channels[channel.index()];
        config.gain = gain;
        config.offset = 0.0;
        Ok(())
    }

    pub fn set_gain_offset(&mut self, channel: Channel, gain: f32, offset: f32) {
        let config = &mut self.channels[channel.index()];
        config.gain = gain;
        config.offset = offset;
    }

    pub fn set_min_max(&mut self, channel: Channel, v_min: f32, v_max: f32) {
        let config = &mut self.channels[channel.index()];
        config.v_min = v_min;
        config.v_max = v_max;
    }

    pub fn set_enabled(&mut self, channel: Channel, enabled: bool) {
        self.channels[channel.index()].enabled = enabled;
    }

    /// Folds in an update received over CAN. Only gain and enable travel on
    /// the wire; offset and thresholds keep their current values.
    pub fn apply(&mut self, update: ConfigUpdate) {
        let config = &mut self.channels[update.channel.index()];
        config.gain = update.gain;
        config.enabled = update.enabled;
    }

    /// Recomputes the snapshot from the latest conversions.
    ///
    /// Channels are processed in index order; the out-of-range mask is
    /// stored last, in one write.
    pub fn update<S: SampleSource + ?Sized>(&mut self, source: &S) {
        let mut out_of_range = OutOfRange::empty();

        for channel in Channel::ALL {
            let i = channel.index();
            let config = &self.channels[i];

            let raw = source.raw(channel);
            let v_pin = raw_to_pin_volts(raw);
            let v_in = config.apply(v_pin);

            self.snapshot.raw[i] = raw;
            self.snapshot.pin_volts[i] = v_pin;
            self.snapshot.input_volts[i] = v_in;
            self.snapshot.millivolts[i] = volts_to_millivolts(v_in);

            if config.is_out_of_range(v_in) {
                out_of_range = out_of_range.with(channel);
            }
        }

        self.snapshot.out_of_range = out_of_range;
    }

    pub fn config(&self, channel: Channel) -> &ChannelConfig {
        &self.channels[channel.index()]
    }

    pub fn thresholds(&self, channel: Channel) -> (f32, f32) {
        let config = self.config(channel);
        (config.v_min, config.v_max)
    }

    pub fn is_enabled(&self, channel: Channel) -> bool {
        self.channels[channel.index()].enabled
    }

    /// Bit `i` set when channel `i` is enabled.
    pub fn enabled_mask(&self) -> u8 {
        Channel::ALL
            .iter()
            .filter(|ch| self.is_enabled(**ch))
            .fold(0, |mask, ch| mask | (1 << ch.raw()))
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn raw(&self, channel: Channel) -> u16 {
        self.snapshot.raw[channel.index()]
    }

    pub fn raws(&self) -> &[u16; NUM_CHANNELS] {
        &self.snapshot.raw
    }

    pub fn pin_volts(&self, channel: Channel) -> f32 {
        self.snapshot.pin_volts[channel.index()]
    }

    pub fn pin_volts_all(&self) -> &[f32; NUM_CHANNELS] {
        &self.snapshot.pin_volts
    }

    pub fn input_volts(&self, channel: Channel) -> f32 {
        self.snapshot.input_volts[channel.index()]
    }

    pub fn input_volts_all(&self) -> &[f32; NUM_CHANNELS] {
        &self.snapshot.input_volts
    }

    pub fn input_millivolts(&self, channel: Channel) -> u16 {
        self.snapshot.millivolts[channel.index()]
    }

    pub fn millivolts(&self) -> &[u16; NUM_CHANNELS] {
        &self.snapshot.millivolts
    }

    pub fn out_of_range(&self) -> OutOfRange {
        self.snapshot.out_of_range
    }
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(index: u8) -> Channel {
        Channel::new(index).unwrap()
    }

    #[test]
    fn pin_volts_track_reference_formula() {
        for raw in 0..=4095u16 {
            let expected = 3.3f64 * raw as f64 / 4095.0;
            let actual = raw_to_pin_volts(raw) as f64;
            let tolerance = f32::EPSILON as f64 * expected.max(f32::MIN_POSITIVE as f64) * 2.0;
            assert!(
                (actual - expected).abs() <= tolerance,
                "raw {}: {} vs {}",
                raw,
                actual,
                expected
            );
        }
        assert_eq!(raw_to_pin_volts(0), 0.0);
        assert_eq!(raw_to_pin_volts(4095), 3.3);
    }

    #[test]
    fn millivolts_saturate_at_both_ends() {
        assert_eq!(volts_to_millivolts(-0.001), 0);
        assert_eq!(volts_to_millivolts(0.0), 0);
        assert_eq!(volts_to_millivolts(65.536), 65535);
        assert_eq!(volts_to_millivolts(1000.0), 65535);
    }

    #[test]
    fn millivolts_round_half_up() {
        assert_eq!(volts_to_millivolts(1.2344), 1234);
        assert_eq!(volts_to_millivolts(1.2346), 1235);
        assert_eq!(volts_to_millivolts(0.0005), 1);
        assert_eq!(volts_to_millivolts(0.0004), 0);
    }

    #[test]
    fn non_finite_values_are_absorbed() {
        assert_eq!(volts_to_millivolts(f32::NAN), 0);
        assert_eq!(volts_to_millivolts(f32::INFINITY), 65535);
        assert_eq!(volts_to_millivolts(f32::NEG_INFINITY), 0);
    }

    #[test]
    fn defaults_pass_pin_volts_through() {
        let mut calibrator = Calibrator::new();
        calibrator.update(&[2048u16; NUM_CHANNELS]);

        for channel in Channel::ALL {
            assert_eq!(calibrator.raw(channel), 2048);
            assert_eq!(calibrator.input_volts(channel), calibrator.pin_volts(channel));
            assert_eq!(calibrator.input_millivolts(channel), 1650);
        }
        assert!(calibrator.out_of_range().is_empty());
    }

    #[test]
    fn whole_array_views_match_per_channel_getters() {
        let mut calibrator = Calibrator::new();
        calibrator.set_gain_offset(ch(4), 2.0, 0.0);
        let raw = [0, 500, 1000, 1500, 2000, 2500, 3000, 4095];
        calibrator.update(&raw);

        assert_eq!(calibrator.raws(), &raw);
        for channel in Channel::ALL {
            let i = channel.index();
            assert_eq!(calibrator.pin_volts_all()[i], calibrator.pin_volts(channel));
            assert_eq!(calibrator.input_volts_all()[i], calibrator.input_volts(channel));
            assert_eq!(calibrator.millivolts()[i], calibrator.input_millivolts(channel));
        }

        let snapshot = calibrator.snapshot();
        assert_eq!(snapshot.raw, raw);
        assert_eq!(snapshot.input_volts[4], 2.0 * snapshot.pin_volts[4]);
        assert_eq!(snapshot.out_of_range, calibrator.out_of_range());
        assert!(snapshot.out_of_range.contains(ch(0)));
    }

    #[test]
    fn gain_and_offset_are_applied() {
        let mut calibrator = Calibrator::new();
        calibrator.set_gain_offset(ch(2), 2.5, -0.25);
        calibrator.update(&[1000u16; NUM_CHANNELS]);

        let v_pin = calibrator.pin_volts(ch(2));
        let expected = 2.5 * v_pin - 0.25;
        assert!((calibrator.input_volts(ch(2)) - expected).abs() < 1e-6);
        assert_eq!(calibrator.input_volts(ch(1)), v_pin);
    }

    #[test]
    fn equal_divider_doubles_pin_volts() {
        let mut calibrator = Calibrator::new();
        calibrator.set_divider(ch(6), 4_700.0, 4_700.0).unwrap();
        calibrator.update(&[1500u16; NUM_CHANNELS]);

        let v_pin = calibrator.pin_volts(ch(6));
        assert!((calibrator.input_volts(ch(6)) - 2.0 * v_pin).abs() < 1e-6);
    }

    #[test]
    fn rejected_divider_changes_nothing() {
        let mut calibrator = Calibrator::new();
        calibrator.set_gain_offset(ch(1), 4.0, 0.5);

        assert_eq!(calibrator.set_divider(ch(1), 10_000.0, 0.0), Err(Error::InvalidDivider));
        assert_eq!(calibrator.set_divider(ch(1), 10_000.0, -5.0), Err(Error::InvalidDivider));

        let config = calibrator.config(ch(1));
        assert_eq!(config.gain, 4.0);
        assert_eq!(config.offset, 0.5);
    }

    #[test]
    fn raw_extremes() {
        let mut calibrator = Calibrator::new();
        calibrator.set_gain_offset(ch(0), 1.0, 0.75);
        calibrator.set_gain_offset(ch(1), 2.0, 0.1);

        let mut raw = [0u16; NUM_CHANNELS];
        raw[1] = 4095;
        calibrator.update(&raw);

        assert_eq!(calibrator.pin_volts(ch(0)), 0.0);
        assert_eq!(calibrator.input_millivolts(ch(0)), 750);
        assert_eq!(calibrator.pin_volts(ch(1)), 3.3);
        assert_eq!(calibrator.input_millivolts(ch(1)), 6700);
    }

    #[test]
    fn out_of_range_mask_follows_thresholds() {
        let mut calibrator = Calibrator::new();
        calibrator.set_min_max(ch(4), 0.0, 1.0);
        // Inverted window: always flagged.
        calibrator.set_min_max(ch(7), 3.0, 1.0);

        let mut raw = [2048u16; NUM_CHANNELS];
        raw[5] = 100;
        calibrator.update(&raw);

        let mask = calibrator.out_of_range();
        assert_eq!(mask.bits(), 0b1011_0000);
        assert_eq!(calibrator.input_millivolts(ch(5)), 81);

        raw[5] = 2048;
        calibrator.set_min_max(ch(4), 0.5, 4.5);
        calibrator.set_min_max(ch(7), 0.5, 4.5);
        calibrator.update(&raw);
        assert!(calibrator.out_of_range().is_empty());
    }

    #[test]
    fn non_finite_configuration_stays_on_the_wire_range() {
        let mut calibrator = Calibrator::new();
        calibrator.set_gain_offset(ch(0), f32::NAN, 0.0);
        calibrator.set_gain_offset(ch(1), f32::INFINITY, 0.0);
        calibrator.set_gain_offset(ch(2), 1.0, f32::NEG_INFINITY);
        calibrator.set_min_max(ch(3), f32::NAN, f32::NAN);
        calibrator.update(&[2048u16; NUM_CHANNELS]);

        assert_eq!(calibrator.input_millivolts(ch(0)), 0);
        assert_eq!(calibrator.input_millivolts(ch(1)), 65535);
        assert_eq!(calibrator.input_millivolts(ch(2)), 0);
        // NaN thresholds never compare true.
        assert!(!calibrator.out_of_range().contains(ch(3)));
    }

    #[test]
    fn disabled_channels_are_still_converted() {
        let mut calibrator = Calibrator::new();
        calibrator.set_enabled(ch(0), false);
        calibrator.update(&[2048u16; NUM_CHANNELS]);

        assert!(!calibrator.is_enabled(ch(0)));
        assert_eq!(calibrator.input_millivolts(ch(0)), 1650);
        assert_eq!(calibrator.enabled_mask(), 0b1111_1110);
    }

    #[test]
    fn applied_update_keeps_offset_and_thresholds() {
        let mut calibrator = Calibrator::new();
        calibrator.set_gain_offset(ch(3), 1.0, 0.2);
        calibrator.set_min_max(ch(3), 1.0, 2.0);

        calibrator.apply(ConfigUpdate {
            channel: ch(3),
            gain: 3.0,
            enabled: false,
        });

        let config = calibrator.config(ch(3));
        assert_eq!(config.gain, 3.0);
        assert_eq!(config.offset, 0.2);
        assert!(!config.enabled);
        assert_eq!(calibrator.thresholds(ch(3)), (1.0, 2.0));
    }
}
