//! One iteration of the main loop: fold in configuration, recompute, publish.

use heapless::spsc::Consumer;

use crate::{
    BoardConfig, Calibrator, CanTransmit, Clock, ConfigUpdate, Error, Publish, Publisher,
    SampleSource, CONFIG_QUEUE_LEN,
};

pub struct Pipeline {
    calibrator: Calibrator,
    publisher: Publisher,
}

impl Pipeline {
    pub fn new(config: &BoardConfig, now_ms: u32) -> Result<Self, Error> {
        Ok(Self {
            calibrator: Calibrator::with_channels(config.channels),
            publisher: Publisher::new(config, now_ms)?,
        })
    }

    /// Applies every queued configuration update, oldest first. Returns how
    /// many were applied.
    pub fn drain(&mut self, updates: &mut Consumer<'_, ConfigUpdate, CONFIG_QUEUE_LEN>) -> usize {
        let mut applied = 0;
        while let Some(update) = updates.dequeue() {
            #[cfg(feature = "defmt")]
            defmt::debug!("applying {}", update);

            self.calibrator.apply(update);
            applied += 1;
        }
        applied
    }

    /// Never sleeps. The only wait is inside the CAN send, bounded by the
    /// transmit timeout.
    pub fn poll<S, T, C>(
        &mut self,
        source: &S,
        updates: &mut Consumer<'_, ConfigUpdate, CONFIG_QUEUE_LEN>,
        tx: &mut T,
        clock: &C,
    ) -> Result<Publish, Error>
    where
        S: SampleSource + ?Sized,
        T: CanTransmit + ?Sized,
        C: Clock + ?Sized,
    {
        self.drain(updates);
        self.calibrator.update(source);

        let now_ms = clock.now_ms();
        self.publisher.maybe_publish(now_ms, &self.calibrator, tx, clock)
    }

    pub fn calibrator(&self) -> &Calibrator {
        &self.calibrator
    }

    /// For in-firmware overrides after construction.
    pub fn calibrator_mut(&mut self) -> &mut Calibrator {
        &mut self.calibrator
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }
}
