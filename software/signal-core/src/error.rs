use core::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The ADC or its DMA channel could not be brought up.
    AdcInit,
    /// The CAN controller did not leave initialization mode.
    CanInit,
    /// `r_bottom` was zero, negative or NaN.
    InvalidDivider,
    /// A derived frame identifier does not fit in 11 bits.
    InvalidFrameId,
    /// No transmit mailbox became free within the timeout.
    TxTimeout,
    /// The controller is bus-off and refused the frame.
    BusOff,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AdcInit => f.write_str("ADC initialization failed"),
            Error::CanInit => f.write_str("CAN initialization failed"),
            Error::InvalidDivider => f.write_str("divider bottom resistor must be positive"),
            Error::InvalidFrameId => f.write_str("frame identifier exceeds 11 bits"),
            Error::TxTimeout => f.write_str("timed out waiting for a transmit mailbox"),
            Error::BusOff => f.write_str("CAN controller is bus-off"),
        }
    }
}

/// Reasons an inbound configuration frame is dropped. None of these are
/// acknowledged on the bus.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IntakeError {
    /// Standard ID other than the configuration ID, or an extended ID.
    WrongId,
    RemoteFrame,
    /// Fewer than six data bytes; carries the DLC.
    TooShort(u8),
    /// Channel byte was not in `0..8`.
    InvalidChannel(u8),
    /// The main loop has not drained the queue yet.
    QueueFull,
}

impl fmt::Display for IntakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntakeError::WrongId => f.write_str("not a configuration frame"),
            IntakeError::RemoteFrame => f.write_str("remote frame carries no configuration"),
            IntakeError::TooShort(dlc) => write!(f, "configuration frame too short (dlc {})", dlc),
            IntakeError::InvalidChannel(ch) => write!(f, "invalid channel {}", ch),
            IntakeError::QueueFull => f.write_str("configuration queue full"),
        }
    }
}
