use signal_core::{Channel, DmaReader, SampleSource};
use stm32f1xx_hal::{
    adc::{Adc, AdcDma, SampleTime, Scan, SetChannels},
    dma::{dma1::C1, CircBuffer},
    gpio::{
        gpioa::{PA0, PA1, PA2, PA3, PA4, PA5, PA6, PA7},
        Analog,
    },
    pac::ADC1,
};

/// Conversions per DMA half. The two halves together hold one full scan, so
/// word `i` of the buffer is always channel `i`.
const HALF: usize = 4;

pub type Buffer = [[u16; HALF]; 2];

/// ADC12_IN0..ADC12_IN7.
pub struct AdcPins(
    pub PA0<Analog>,
    pub PA1<Analog>,
    pub PA2<Analog>,
    pub PA3<Analog>,
    pub PA4<Analog>,
    pub PA5<Analog>,
    pub PA6<Analog>,
    pub PA7<Analog>,
);

impl SetChannels<AdcPins> for Adc<ADC1> {
    fn set_samples(&mut self) {
        for channel in 0..8 {
            // 239.5 cycles, the longest available, for high-impedance dividers.
            self.set_channel_sample_time(channel, SampleTime::T_239);
        }
    }

    fn set_sequence(&mut self) {
        self.set_regular_sequence(&[0, 1, 2, 3, 4, 5, 6, 7]);
        self.set_continuous_mode(true);
    }
}

type Transfer = CircBuffer<[u16; HALF], AdcDma<ADC1, AdcPins, Scan, C1>>;

/// Free-running scan of ADC1 into a circular DMA buffer.
///
/// Once started nothing here touches the ADC again. The transfer is owned
/// only to keep it alive.
pub struct Sampler {
    _transfer: Transfer,
    reader: DmaReader,
}

impl Sampler {
    pub fn start(adc: Adc<ADC1>, pins: AdcPins, dma: C1, buffer: &'static mut Buffer) -> Self {
        let base = buffer.as_ptr() as *const u16;

        let transfer = adc.with_scan_dma(pins, dma).circ_read(buffer);

        // SAFETY: `buffer` is 'static and holds eight contiguous u16s. `base`
        // was taken before the `&'static mut` moved into the transfer, which
        // only hands its address to DMA1. Nothing calls `peek` or `stop`, so
        // the reference is never used again and DMA1 is the only writer.
        let reader = unsafe { DmaReader::new(base) };

        defmt::info!("ADC1 scanning channels 0..7 into DMA1 C1");

        Self {
            _transfer: transfer,
            reader,
        }
    }
}

impl SampleSource for Sampler {
    fn raw(&self, channel: Channel) -> u16 {
        self.reader.raw(channel)
    }
}
