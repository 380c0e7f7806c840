//! Board-level configuration. Everything here is set at boot; nothing is
//! persisted across resets.

use crate::{intake::DEFAULT_CONFIG_ID, ChannelConfig, NUM_CHANNELS};

/// Supported CAN bit rates.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bitrate {
    Kbps125,
    Kbps250,
    Kbps500,
    Kbps1000,
}

impl Bitrate {
    /// APB1 clock the BTR values below are computed for.
    pub const PCLK1_HZ: u32 = 16_000_000;

    pub const fn from_kbps(kbps: u32) -> Option<Self> {
        match kbps {
            125 => Some(Bitrate::Kbps125),
            250 => Some(Bitrate::Kbps250),
            500 => Some(Bitrate::Kbps500),
            1000 => Some(Bitrate::Kbps1000),
            _ => None,
        }
    }

    pub const fn kbps(self) -> u32 {
        match self {
            Bitrate::Kbps125 => 125,
            Bitrate::Kbps250 => 250,
            Bitrate::Kbps500 => 500,
            Bitrate::Kbps1000 => 1000,
        }
    }

    /// bxCAN BTR register value at [`Self::PCLK1_HZ`]: 16 time quanta per
    /// bit, TS1 = 13, TS2 = 2, SJW = 1, so the sample point sits at 87.5%.
    /// Only the prescaler changes between rates.
    ///
    /// Values were calculated with http://www.bittiming.can-wiki.info/
    pub const fn btr(self) -> u32 {
        match self {
            Bitrate::Kbps125 => 0x001c_0007,
            Bitrate::Kbps250 => 0x001c_0003,
            Bitrate::Kbps500 => 0x001c_0001,
            Bitrate::Kbps1000 => 0x001c_0000,
        }
    }
}

impl Default for Bitrate {
    fn default() -> Self {
        Bitrate::Kbps500
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BoardConfig {
    /// Frames go out on `node_id + 1` and `node_id + 2`.
    pub node_id: u8,
    /// Publication period. Zero publishes on every loop iteration.
    pub period_ms: u32,
    /// How long each frame may wait for a transmit mailbox.
    pub tx_timeout_ms: u32,
    /// Standard ID of the inbound configuration frame.
    pub config_id: u16,
    pub bitrate: Bitrate,
    /// Also send `[out_of_range, enabled]` on `node_id + 3`, so receivers can
    /// tell a disabled channel from a saturated one.
    pub status_frame: bool,
    pub channels: [ChannelConfig; NUM_CHANNELS],
}

impl BoardConfig {
    pub const DEFAULT_PERIOD_MS: u32 = 100;
    pub const DEFAULT_TX_TIMEOUT_MS: u32 = 2;

    pub const fn new(node_id: u8) -> Self {
        Self {
            node_id,
            period_ms: Self::DEFAULT_PERIOD_MS,
            tx_timeout_ms: Self::DEFAULT_TX_TIMEOUT_MS,
            config_id: DEFAULT_CONFIG_ID,
            bitrate: Bitrate::Kbps500,
            status_frame: false,
            channels: [ChannelConfig::new(); NUM_CHANNELS],
        }
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_lookup() {
        assert_eq!(Bitrate::from_kbps(500), Some(Bitrate::Kbps500));
        assert_eq!(Bitrate::from_kbps(100), None);
        assert_eq!(Bitrate::default().kbps(), 500);
    }

    #[test]
    fn btr_fields_give_sixteen_quanta() {
        for bitrate in [Bitrate::Kbps125, Bitrate::Kbps250, Bitrate::Kbps500, Bitrate::Kbps1000] {
            let btr = bitrate.btr();
            let brp = (btr & 0x3ff) + 1;
            let ts1 = ((btr >> 16) & 0xf) + 1;
            let ts2 = ((btr >> 20) & 0x7) + 1;
            let sjw = ((btr >> 24) & 0x3) + 1;

            let quanta = 1 + ts1 + ts2;
            assert_eq!(quanta, 16);
            assert_eq!(sjw, 1);
            // Sample point at 87.5%.
            assert_eq!((1 + ts1) * 1000 / quanta, 875);
            assert_eq!(Bitrate::PCLK1_HZ / (brp * quanta), bitrate.kbps() * 1000);
        }
    }

    #[test]
    fn power_on_defaults() {
        let config = BoardConfig::new(10);
        assert_eq!(config.node_id, 10);
        assert_eq!(config.period_ms, 100);
        assert_eq!(config.config_id, 0x200);
        assert_eq!(config.bitrate, Bitrate::Kbps500);
        assert!(!config.status_frame);
        assert!(config.channels.iter().all(|ch| *ch == ChannelConfig::new()));
    }
}
