// We don't have a `main` function (the initiation is handled by the rtic framework and by the microcontroller directly).
#![no_main]
// We're not running this in an operating system, so we only have access to the `core` library, not `std`.
#![no_std]

use defmt_rtt as _; // global logger
use panic_probe as _;

mod can;
mod config;
mod sampler;

use signal_core::{Clock, Error};

/// 8 MHz crystal times the PLL; every other clock is derived from this.
const SYSCLK_HZ: u32 = 64_000_000;

/// Milliseconds since boot, truncated to 32 bits for the publication cadence.
pub struct MonoClock;

impl Clock for MonoClock {
    fn now_ms(&self) -> u32 {
        app::monotonics::now().duration_since_epoch().to_millis() as u32
    }
}

defmt::timestamp!("{=u64:ms}", app::monotonics::now().duration_since_epoch().to_millis());

/// Logs the cause, masks every interrupt and spins. Only a reset gets out.
fn fatal(error: Error) -> ! {
    defmt::error!("fatal: {}", error);
    cortex_m::interrupt::disable();

    loop {
        cortex_m::asm::nop();
    }
}

#[rtic::app(device = stm32f1xx_hal::pac)]
mod app {
    use bxcan::StandardId;
    use dwt_systick_monotonic::DwtSystick;
    use heapless::spsc::Consumer;
    use signal_core::{
        Bitrate, ConfigQueue, ConfigUpdate, Error, Intake, IntakeError, Pipeline, Publish,
        CONFIG_QUEUE_LEN,
    };
    use stm32f1xx_hal::{adc::Adc, can::Can, prelude::*};

    use crate::{
        can::{self, CanRx, CanTx},
        config, fatal,
        sampler::{AdcPins, Buffer, Sampler},
        MonoClock, SYSCLK_HZ,
    };

    #[monotonic(binds = SysTick, default = true)]
    type Mono = DwtSystick<SYSCLK_HZ>;

    #[shared]
    struct Shared {}

    #[local]
    struct Local {
        pipeline: Pipeline,
        sampler: Sampler,
        can_tx: CanTx,
        updates: Consumer<'static, ConfigUpdate, CONFIG_QUEUE_LEN>,

        can_rx: CanRx,
        intake: Intake<'static>,
    }

    /// `adc_buffer` is the DMA destination; `config_queue` carries decoded
    /// configuration frames from the RX interrupt to `idle`.
    #[init(local = [
        adc_buffer: Buffer = [[0; 4]; 2],
        config_queue: ConfigQueue = ConfigQueue::new(),
    ])]
    fn init(cx: init::Context) -> (Shared, Local, init::Monotonics) {
        defmt::info!("init");

        let board = match config::board_config() {
            Ok(board) => board,
            Err(e) => fatal(e),
        };

        let mut flash = cx.device.FLASH.constrain();
        let rcc = cx.device.RCC.constrain();

        let clocks = rcc
            .cfgr
            .use_hse(8.MHz())
            .sysclk(SYSCLK_HZ.Hz())
            // The BTR table in `Bitrate` assumes this.
            .pclk1(16.MHz())
            // ADC clock must stay at or below 14 MHz.
            .adcclk(8.MHz())
            .freeze(&mut flash.acr);

        if clocks.pclk1().raw() != Bitrate::PCLK1_HZ {
            fatal(Error::CanInit);
        }

        let mut afio = cx.device.AFIO.constrain();
        let mut gpioa = cx.device.GPIOA.split();

        // Sampler: ADC1 scan over PA0..PA7, DMA1 channel 1 circular.
        let pins = AdcPins(
            gpioa.pa0.into_analog(&mut gpioa.crl),
            gpioa.pa1.into_analog(&mut gpioa.crl),
            gpioa.pa2.into_analog(&mut gpioa.crl),
            gpioa.pa3.into_analog(&mut gpioa.crl),
            gpioa.pa4.into_analog(&mut gpioa.crl),
            gpioa.pa5.into_analog(&mut gpioa.crl),
            gpioa.pa6.into_analog(&mut gpioa.crl),
            gpioa.pa7.into_analog(&mut gpioa.crl),
        );
        // Calibrates itself before returning.
        let adc1 = Adc::adc1(cx.device.ADC1, clocks);
        let dma1 = cx.device.DMA1.split();
        let sampler = Sampler::start(adc1, pins, dma1.1, cx.local.adc_buffer);

        // CAN1 on PA11 (RX) / PA12 (TX).
        let config_id = match StandardId::new(board.config_id) {
            Some(id) => id,
            None => fatal(Error::InvalidFrameId),
        };
        let can = Can::new(cx.device.CAN1);
        {
            let rx = gpioa.pa11.into_floating_input(&mut gpioa.crh);
            let tx = gpioa.pa12.into_alternate_push_pull(&mut gpioa.crh);
            can.assign_pins((tx, rx), &mut afio.mapr);
        }
        let (can_tx, can_rx) = match can::setup(can, board.bitrate, config_id, SYSCLK_HZ / 1000) {
            Ok(halves) => halves,
            Err(e) => fatal(e),
        };

        let (producer, updates) = cx.local.config_queue.split();
        let intake = Intake::new(config_id, producer);

        // Set up monotonic scheduler.
        let mut dcb = cx.core.DCB;
        let dwt = cx.core.DWT;
        let systick = cx.core.SYST;
        let mono = DwtSystick::new(&mut dcb, dwt, systick, clocks.sysclk().raw());

        // The monotonic only starts counting once init returns, so the
        // first period is measured from zero.
        let pipeline = match Pipeline::new(&board, 0) {
            Ok(pipeline) => pipeline,
            Err(e) => fatal(e),
        };

        defmt::info!(
            "node {=u8:#x}: frames {=u16:#x}/{=u16:#x} every {} ms, config on {=u16:#x}",
            board.node_id,
            u16::from(board.node_id) + 1,
            u16::from(board.node_id) + 2,
            board.period_ms,
            board.config_id,
        );

        (
            Shared {},
            Local {
                pipeline,
                sampler,
                can_tx,
                updates,
                can_rx,
                intake,
            },
            init::Monotonics(mono),
        )
    }

    /// The main loop. Never sleeps; the only wait is for a free transmit
    /// mailbox, bounded by the board's transmit timeout.
    #[idle(local = [pipeline, sampler, can_tx, updates])]
    fn idle(cx: idle::Context) -> ! {
        defmt::info!("idle");

        let clock = MonoClock;
        let mut failing = false;

        loop {
            match cx
                .local
                .pipeline
                .poll(&*cx.local.sampler, cx.local.updates, cx.local.can_tx, &clock)
            {
                Ok(Publish::Sent) => {
                    if failing {
                        defmt::info!("publishing again");
                        failing = false;
                    }
                    defmt::trace!("mV: {}", cx.local.pipeline.calibrator().millivolts());
                }
                Ok(Publish::NotDue) => {}
                Err(e) => {
                    // Retried on the next pass; only report the first failure.
                    if !failing {
                        defmt::warn!("publish failed: {}", e);
                        failing = true;
                    }
                }
            }
        }
    }

    /// Drains FIFO 0. Accepted frames are decoded and queued for `idle`;
    /// everything else is dropped silently on the bus.
    #[task(binds = CAN1_RX0, local = [can_rx, intake])]
    fn can_rx0(cx: can_rx0::Context) {
        let intake = cx.local.intake;

        loop {
            match cx.local.can_rx.receive() {
                Ok(frame) => match intake.on_frame(&frame) {
                    Ok(update) => defmt::debug!("queued {}", update),
                    Err(IntakeError::QueueFull) => {
                        defmt::warn!("config queue full ({} dropped)", intake.overflowed())
                    }
                    Err(e) => defmt::debug!("ignored config frame: {}", e),
                },
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(_)) => defmt::warn!("CAN RX FIFO overrun"),
            }
        }
    }
}
