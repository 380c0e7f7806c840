//! Per-board constants. Change these when flashing a different node.

use signal_core::{Bitrate, BoardConfig, Error};

/// Data frames go out on `NODE_ID + 1` and `NODE_ID + 2`.
pub const NODE_ID: u8 = 0x10;

pub const PERIOD_MS: u32 = 100;

pub const BITRATE: Bitrate = Bitrate::Kbps500;

/// Send `[out_of_range, enabled]` on `NODE_ID + 3` after the data frames.
pub const STATUS_FRAME: bool = false;

/// `(r_top, r_bottom)` in ohms for channels fitted with an input divider.
/// `None` reads the pin directly.
const DIVIDERS: [Option<(f32, f32)>; 8] = [None; 8];

pub fn board_config() -> Result<BoardConfig, Error> {
    let mut config = BoardConfig::new(NODE_ID);
    config.period_ms = PERIOD_MS;
    config.bitrate = BITRATE;
    config.status_frame = STATUS_FRAME;

    for (channel, divider) in config.channels.iter_mut().zip(DIVIDERS) {
        if let Some((r_top, r_bottom)) = divider {
            *channel = channel.with_divider(r_top, r_bottom)?;
        }
    }

    Ok(config)
}
