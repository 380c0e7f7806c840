//! What the pipeline needs from the board.

use bxcan::Frame;

use crate::Error;

/// One attempt at handing a frame to a transmit mailbox.
pub trait CanTransmit {
    /// `WouldBlock` while every mailbox is busy with frames of equal or
    /// higher priority. `Ok(Some(frame))` when a lower-priority pending
    /// frame was pushed out of its mailbox to make room.
    fn transmit(&mut self, frame: &Frame) -> nb::Result<Option<Frame>, Error>;
}

impl<T: CanTransmit + ?Sized> CanTransmit for &mut T {
    fn transmit(&mut self, frame: &Frame) -> nb::Result<Option<Frame>, Error> {
        (**self).transmit(frame)
    }
}

/// Monotonic millisecond tick. Wraps after `u32::MAX` ms.
pub trait Clock {
    fn now_ms(&self) -> u32;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}

/// Retries `transmit` until a mailbox accepts the frame or `timeout_ms`
/// elapses. At least one attempt is always made.
///
/// A frame displaced from its mailbox is queued again under the same
/// deadline, so the call only succeeds once nothing it handled was lost.
pub fn send_blocking<T, C>(tx: &mut T, clock: &C, frame: &Frame, timeout_ms: u32) -> Result<(), Error>
where
    T: CanTransmit + ?Sized,
    C: Clock + ?Sized,
{
    let start = clock.now_ms();
    let mut displaced: Option<Frame> = None;

    loop {
        let pending = displaced.as_ref().unwrap_or(frame);

        match tx.transmit(pending) {
            Ok(None) => return Ok(()),
            Ok(Some(pushed_out)) => {
                #[cfg(feature = "defmt")]
                defmt::debug!("re-sending displaced frame {}", pushed_out);

                displaced = Some(pushed_out);
            }
            Err(nb::Error::Other(e)) => return Err(e),
            Err(nb::Error::WouldBlock) => {}
        }

        if clock.now_ms().wrapping_sub(start) >= timeout_ms {
            return Err(Error::TxTimeout);
        }
    }
}
