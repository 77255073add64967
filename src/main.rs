//! Firmware for the ATV accessory controller.
//!
//! # Overview
//!
//! The board replaces the horn relay and two accessory relays (V1, V2) of
//! an ATV. All decisions live in the [`atv_control`] library; this binary
//! only wires the STM32L031G6 peripherals to it and runs the two contexts.
//!
//! # Execution Contexts
//!
//! - **Foreground** ([`foreground_task`]): runs on an interrupt executor at a
//!   higher priority than thread mode. It advances the 1 ms tick clock and
//!   handles the edge interrupts of all six inputs.
//! - **Main loop** (thread mode): runs `Controller::step` back to back,
//!   yielding between passes, and sleeps when the controller asks for it.
//!
//! # Low Power Operation
//!
//! - MSI oscillator at 2.097 MHz (4.194 MHz in debug mode)
//! - While asleep the tick stops, only the edge interrupts stay armed, and
//!   the main loop wakes once a second to feed the independent watchdog
//!
//! # Module Organization
//!
//! - [`hardware`] - Pin mappings, peripheral initialization and the board
//!   implementations of the controller capability traits

#![no_std]
#![no_main]

mod hardware;

use core::pin::pin;

use atv_control::timing::{SLEEP_FEED_INTERVAL_MS, TICK_MS};
use atv_control::{Controller, Shared, Step};
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_futures::select::{Either, select};
use embassy_futures::yield_now;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_stm32::{Config, interrupt, rcc::LsConfig};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, signal::Signal};
use embassy_time::{Delay, Duration, Ticker, Timer};
use {defmt_rtt as _, panic_probe as _};

use hardware::{BoardInputs, EdgeInputs, Peripherals};

/// State shared between the foreground context and the main loop.
static SHARED: Shared = Shared::new();

/// Raised by the foreground context when an edge should end a sleep.
static WAKE: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Raised by the main loop once the controller is awake again, so the
/// foreground context restarts the tick.
static RESUMED: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Executor for the foreground context.
static EXECUTOR_FOREGROUND: InterruptExecutor = InterruptExecutor::new();

/// Creates the clock configuration for STM32L031.
///
/// # Clock Settings
///
/// - **MSI**: 2.097 MHz in normal mode, 4.194 MHz in debug mode
/// - **System clock**: MSI (no PLL)
/// - **LSE/LSI**: off; the independent watchdog starts LSI by itself
/// - **Voltage scale**: Range 1
///
/// Both MSI ranges divide evenly into the 32.768 kHz embassy tick.
fn create_config() -> embassy_stm32::rcc::Config {
    embassy_stm32::rcc::Config {
        #[cfg(feature = "debug-mode")]
        msi: Some(embassy_stm32::rcc::MSIRange::RANGE4M),
        #[cfg(not(feature = "debug-mode"))]
        msi: Some(embassy_stm32::rcc::MSIRange::RANGE2M),
        hsi: false,
        hse: None,
        pll: None,
        sys: embassy_stm32::rcc::Sysclk::MSI,
        ahb_pre: embassy_stm32::rcc::AHBPrescaler::DIV1,
        apb1_pre: embassy_stm32::rcc::APBPrescaler::DIV1,
        apb2_pre: embassy_stm32::rcc::APBPrescaler::DIV1,
        ls: LsConfig::off(),
        voltage_scale: embassy_stm32::rcc::VoltageScale::RANGE1,
        mux: embassy_stm32::rcc::mux::ClockMux::default(),
    }
}

/// Software interrupt that drives the foreground executor.
#[interrupt]
unsafe fn USART2() {
    unsafe { EXECUTOR_FOREGROUND.on_interrupt() }
}

/// Foreground context: 1 ms tick and input edges.
///
/// The edge future stays armed across ticks and is only rebuilt after it
/// fired. While the controller sleeps the tick is not serviced; only edges
/// and [`RESUMED`] are awaited, and an edge that is a wake source raises
/// [`WAKE`].
#[embassy_executor::task]
async fn foreground_task(mut edges: EdgeInputs) {
    let mut ticker = Ticker::every(Duration::from_millis(TICK_MS));
    loop {
        let mut edge = pin!(edges.wait_any());
        let channel = loop {
            if SHARED.is_sleeping() {
                match select(edge.as_mut(), RESUMED.wait()).await {
                    Either::First(channel) => break channel,
                    Either::Second(()) => ticker.reset(),
                }
            } else {
                match select(ticker.next(), edge.as_mut()).await {
                    Either::First(()) => SHARED.on_tick(&BoardInputs),
                    Either::Second(channel) => break channel,
                }
            }
        };

        if SHARED.on_edge(channel) {
            WAKE.signal(());
        }
    }
}

/// Main entry point for the controller firmware.
///
/// # Initialization Sequence
///
/// 1. Configure clocks (MSI, no PLL)
/// 2. Initialize STM32 peripherals, start the independent watchdog
/// 3. Load the auto-off delay from flash
/// 4. Start the foreground executor and its task
/// 5. Enter the main loop
///
/// # Main Loop
///
/// One `Controller::step` per iteration. On `Step::Sleep` the loop waits
/// for [`WAKE`], feeding the watchdog every [`SLEEP_FEED_INTERVAL_MS`].
#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let mut config = Config::default();
    config.rcc = create_config();

    let p = embassy_stm32::init(config);

    #[cfg(feature = "debug-mode")]
    defmt::info!("ATV controller firmware starting...");

    #[cfg(feature = "debug-mode")]
    defmt::info!("Initializing peripherals...");

    let Peripherals {
        sensor,
        edges,
        outputs,
        watchdog,
        store,
    } = Peripherals::new(p);

    #[cfg(feature = "debug-mode")]
    defmt::info!("Loading auto-off delay...");

    let mut controller = Controller::new(sensor, outputs, watchdog, Delay, store);

    #[cfg(feature = "debug-mode")]
    defmt::info!("Spawning foreground task...");

    interrupt::USART2.set_priority(Priority::P1);
    let foreground = EXECUTOR_FOREGROUND.start(interrupt::USART2);
    foreground.spawn(foreground_task(edges)).unwrap();

    defmt::info!(
        "ATV controller ready, auto-off delay {} min",
        controller.auto_off().minutes()
    );

    loop {
        match controller.step(&SHARED) {
            Step::Continue => yield_now().await,
            Step::Sleep => {
                #[cfg(feature = "debug-mode")]
                defmt::info!("Sleeping until input edge...");

                while let Either::Second(()) =
                    select(WAKE.wait(), Timer::after_millis(SLEEP_FEED_INTERVAL_MS)).await
                {
                    controller.feed_watchdog();
                }
                controller.wake(&SHARED);
                RESUMED.signal(());
            }
        }
    }
}
