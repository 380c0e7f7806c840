use bxcan::{filter::Mask32, Frame, Interrupts, Rx, StandardId, Tx};
use signal_core::{Bitrate, CanTransmit, Error};
use stm32f1xx_hal::{can::Can, pac::CAN1};

/// How long to wait for the controller to see the bus idle.
const ENABLE_TIMEOUT: fugit::MillisDurationU32 = fugit::MillisDurationU32::millis(100);

pub type CanRx = Rx<Can<CAN1>>;

/// Configures bit timing, the single-ID receive filter and the FIFO 0
/// interrupt, then joins the bus. bxcan turns on automatic bus-off recovery
/// when it enables the peripheral.
///
/// `cycles_per_ms` paces the bounded wait for bus synchronisation.
pub fn setup(
    can: Can<CAN1>,
    bitrate: Bitrate,
    config_id: StandardId,
    cycles_per_ms: u32,
) -> Result<(CanTx, CanRx), Error> {
    // APB1 (PCLK1): 16MHz, Sample Point 87.5%
    let mut can = bxcan::Can::builder(can)
        .set_bit_timing(bitrate.btr())
        .leave_disabled();

    // Only the configuration frame is of interest.
    can.modify_filters()
        .enable_bank(0, Mask32::frames_with_std_id(config_id, StandardId::MAX));

    can.enable_interrupts(Interrupts::FIFO0_MESSAGE_PENDING);

    let mut remaining = ENABLE_TIMEOUT.to_millis();
    loop {
        match can.enable_non_blocking() {
            Ok(()) => break,
            Err(nb::Error::WouldBlock) if remaining > 0 => {
                remaining -= 1;
                cortex_m::asm::delay(cycles_per_ms);
            }
            Err(nb::Error::WouldBlock) => return Err(Error::CanInit),
            Err(nb::Error::Other(never)) => match never {},
        }
    }

    defmt::info!("CAN up at {} kbit/s", bitrate.kbps());

    let (tx, rx) = can.split();
    Ok((CanTx(tx), rx))
}

pub struct CanTx(Tx<Can<CAN1>>);

impl CanTx {
    fn is_bus_off() -> bool {
        // SAFETY: read-only access to the error status register.
        unsafe { (*CAN1::ptr()).esr.read().boff().bit_is_set() }
    }
}

impl CanTransmit for CanTx {
    fn transmit(&mut self, frame: &Frame) -> nb::Result<Option<Frame>, Error> {
        if Self::is_bus_off() {
            return Err(nb::Error::Other(Error::BusOff));
        }

        match self.0.transmit(frame) {
            // All mailboxes were full and a lower-priority pending frame was
            // pushed out to make room; hand it back so it gets sent again.
            Ok(status) => Ok(status.dequeued_frame().cloned()),
            Err(nb::Error::WouldBlock) => Err(nb::Error::WouldBlock),
            Err(nb::Error::Other(never)) => match never {},
        }
    }
}
