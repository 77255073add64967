//! Hardware abstraction and peripheral initialization.
//!
//! This module defines the pin mappings and binds the board to the
//! capability traits of the controller library.
//!
//! # Pin Assignments
//!
//! ## Inputs (EXTI, any edge)
//! - **PA8**: IGN - Ignition, 12V divider, active high
//! - **PA9**: REV - Reverse, 12V divider, active high
//! - **PA10**: HB - High beam, 12V divider, active high
//! - **PA4**: HSW_N - Horn push button, active low
//! - **PB6**: SW1_N - Push button for V1, active low
//! - **PB7**: SW2_N - Push button for V2, active low
//!
//! ## Power Outputs
//! - **PB0**: HEN - Horn high-side switch
//! - **PB1**: V1EN - Load V1 high-side switch
//! - **PA5**: V2EN - Load V2 high-side switch
//!
//! ## Indicators (PWM)
//! - **PA0**: HSWLR - Horn switch LED red (TIM2_CH1)
//! - **PA1**: HSWLG - Horn switch LED green (TIM2_CH2)
//! - **PA2**: HSWLB - Horn switch LED blue (TIM2_CH3)
//! - **PA6**: SWL1 - Switch 1 LED (TIM22_CH1)
//! - **PA7**: SWL2 - Switch 2 LED (TIM22_CH2)
//!
//! ## Debug (SWD)
//! - **PA13**: SWDIO
//! - **PA14**: SWCLK
//!
//! TIM21 is taken by the embassy time driver.

use atv_control::hal::{InputSensor, OutputChannel, OutputDriver, Watchdog};
use atv_control::input::InputChannel;
use atv_control::settings::FlashConfigStore;
use atv_control::timing::WATCHDOG_TIMEOUT_MS;
use embassy_futures::select::select_array;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::flash::{Blocking, Flash};
use embassy_stm32::gpio::{Level, Output, OutputType, Pull, Speed};
use embassy_stm32::peripherals::TIM2;
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_stm32::wdg::IndependentWatchdog;
use embassy_stm32::{pac, timer};

/// MSI frequency selected in `create_config`; APB prescalers are 1.
#[cfg(feature = "debug-mode")]
pub const SYSCLK_HZ: u32 = 4_194_304;
#[cfg(not(feature = "debug-mode"))]
pub const SYSCLK_HZ: u32 = 2_097_152;

/// PWM carrier of the indicators.
const INDICATOR_PWM_HZ: u32 = 500;

/// Full-scale duty of the TIM22 indicators, matching `set_level` levels.
const TIM22_PERIOD: u16 = 255;

/// Alternate function of PA6/PA7 for TIM22_CH1/CH2.
const TIM22_AF: u8 = 5;

/// Top-level peripheral container for the controller board.
pub struct Peripherals {
    /// Raw input reads (any context)
    pub sensor: BoardInputs,
    /// Edge sources, owned by the foreground task
    pub edges: EdgeInputs,
    /// Horn, loads and indicators
    pub outputs: BoardOutputs,
    /// Independent watchdog, already running
    pub watchdog: BoardWatchdog,
    /// Auto-off delay record in the last flash page, which `memory.x`
    /// keeps out of the image
    pub store: FlashConfigStore<Flash<'static, Blocking>>,
}

impl Peripherals {
    /// Initializes all peripherals from STM32 peripheral singleton.
    ///
    /// # Initial GPIO States
    ///
    /// - PB0 (HEN), PB1 (V1EN), PA5 (V2EN): Low (all loads off)
    /// - Indicators: 0 % duty
    /// - Push buttons: pull-up, vehicle signals: pull-down
    ///
    /// # Arguments
    ///
    /// * `p` - STM32 peripheral singleton from embassy_stm32::init()
    pub fn new(p: embassy_stm32::Peripherals) -> Self {
        let edges = EdgeInputs {
            lines: [
                ExtiInput::new(p.PA8, p.EXTI8, Pull::Down),
                ExtiInput::new(p.PA9, p.EXTI9, Pull::Down),
                ExtiInput::new(p.PA10, p.EXTI10, Pull::Down),
                ExtiInput::new(p.PA4, p.EXTI4, Pull::Up),
                ExtiInput::new(p.PB6, p.EXTI6, Pull::Up),
                ExtiInput::new(p.PB7, p.EXTI7, Pull::Up),
            ],
        };

        let mut horn_led = SimplePwm::new(
            p.TIM2,
            Some(PwmPin::new(p.PA0, OutputType::PushPull)),
            Some(PwmPin::new(p.PA1, OutputType::PushPull)),
            Some(PwmPin::new(p.PA2, OutputType::PushPull)),
            None,
            Hertz::hz(INDICATOR_PWM_HZ),
            timer::low_level::CountingMode::EdgeAlignedUp,
        );
        horn_led.ch1().enable();
        horn_led.ch2().enable();
        horn_led.ch3().enable();

        let mut outputs = BoardOutputs {
            horn: Output::new(p.PB0, Level::Low, Speed::Low),
            v1: Output::new(p.PB1, Level::Low, Speed::Low),
            v2: Output::new(p.PA5, Level::Low, Speed::Low),
            horn_led,
        };
        setup_tim22();
        for channel in OutputChannel::ALL {
            outputs.set_level(channel, 0);
        }

        let mut iwdg = IndependentWatchdog::new(p.IWDG, WATCHDOG_TIMEOUT_MS * 1_000);
        iwdg.unleash();

        let flash = Flash::new_blocking(p.FLASH);
        let store = defmt::unwrap!(FlashConfigStore::last_page(flash));

        Self {
            sensor: BoardInputs,
            edges,
            outputs,
            watchdog: BoardWatchdog { iwdg },
            store,
        }
    }
}

/// Raw input levels straight from the GPIO input data registers.
///
/// Reads are side-effect free, so the tick handler and the main loop can
/// both use their own copy.
#[derive(Clone, Copy)]
pub struct BoardInputs;

impl InputSensor for BoardInputs {
    fn is_active(&self, channel: InputChannel) -> bool {
        let high = |port: pac::gpio::Gpio, pin: usize| port.idr().read().0 & (1 << pin) != 0;
        match channel {
            InputChannel::Ignition => high(pac::GPIOA, 8),
            InputChannel::Reverse => high(pac::GPIOA, 9),
            InputChannel::HighBeam => high(pac::GPIOA, 10),
            InputChannel::HornSwitch => !high(pac::GPIOA, 4),
            InputChannel::Switch1 => !high(pac::GPIOB, 6),
            InputChannel::Switch2 => !high(pac::GPIOB, 7),
        }
    }
}

/// Edge interrupt sources, in [`InputChannel::ALL`] order.
pub struct EdgeInputs {
    lines: [ExtiInput<'static>; 6],
}

impl EdgeInputs {
    /// Waits for an edge on any input line.
    pub async fn wait_any(&mut self) -> InputChannel {
        let waits = self.lines.each_mut().map(|line| line.wait_for_any_edge());
        let ((), index) = select_array(waits).await;
        InputChannel::ALL[index]
    }
}

/// Horn, loads and indicator PWM.
pub struct BoardOutputs {
    horn: Output<'static>,
    v1: Output<'static>,
    v2: Output<'static>,
    horn_led: SimplePwm<'static, TIM2>,
}

impl OutputDriver for BoardOutputs {
    fn set_level(&mut self, channel: OutputChannel, level: u8) {
        let duty = u16::from(level);
        match channel {
            OutputChannel::Horn => self.horn.set_level(Level::from(level != 0)),
            OutputChannel::Output1 => self.v1.set_level(Level::from(level != 0)),
            OutputChannel::Output2 => self.v2.set_level(Level::from(level != 0)),
            OutputChannel::Switch1Led => set_tim22_duty(0, duty),
            OutputChannel::Switch2Led => set_tim22_duty(1, duty),
            OutputChannel::HornLedRed => self.horn_led.ch1().set_duty_cycle_fraction(duty, 255),
            OutputChannel::HornLedGreen => self.horn_led.ch2().set_duty_cycle_fraction(duty, 255),
            OutputChannel::HornLedBlue => self.horn_led.ch3().set_duty_cycle_fraction(duty, 255),
        }
    }

    fn suspend(&mut self) {
        self.horn_led.ch1().disable();
        self.horn_led.ch2().disable();
        self.horn_led.ch3().disable();
        pac::TIM22.cr1().modify(|w| w.set_cen(false));
    }

    fn resume(&mut self) {
        self.horn_led.ch1().enable();
        self.horn_led.ch2().enable();
        self.horn_led.ch3().enable();
        pac::TIM22.cr1().modify(|w| w.set_cen(true));
    }
}

/// Configures TIM22 CH1/CH2 as 8-bit PWM on PA6/PA7.
///
/// TIM22 only has two channels, which `SimplePwm` does not cover, so the
/// timer is set up through the PAC.
fn setup_tim22() {
    let gpioa = pac::GPIOA;
    let tim = pac::TIM22;

    pac::RCC.apb2enr().modify(|w| w.set_tim22en(true));

    for pin in [6, 7] {
        gpioa.afr(0).modify(|w| w.set_afr(pin, TIM22_AF));
        gpioa
            .moder()
            .modify(|w| w.set_moder(pin, pac::gpio::vals::Moder::ALTERNATE));
    }

    let prescaler = SYSCLK_HZ / (INDICATOR_PWM_HZ * (u32::from(TIM22_PERIOD) + 1));
    tim.psc().write_value(prescaler.saturating_sub(1) as u16);
    tim.arr().write(|w| w.set_arr(TIM22_PERIOD));

    for channel in [0, 1] {
        tim.ccmr_output(0).modify(|w| {
            w.set_ocm(channel, pac::timer::vals::Ocm::PWM_MODE1);
            w.set_ocpe(channel, true);
        });
        tim.ccr(channel).write(|w| w.set_ccr(0));
        tim.ccer().modify(|w| w.set_cce(channel, true));
    }

    tim.egr().write(|w| w.set_ug(true));
    tim.cr1().modify(|w| w.set_cen(true));
}

fn set_tim22_duty(channel: usize, duty: u16) {
    pac::TIM22.ccr(channel).write(|w| w.set_ccr(duty));
}

/// The independent watchdog cannot be stopped once unleashed, so pausing
/// it only feeds it.
pub struct BoardWatchdog {
    iwdg: IndependentWatchdog<'static, embassy_stm32::peripherals::IWDG>,
}

impl Watchdog for BoardWatchdog {
    fn feed(&mut self) {
        self.iwdg.pet();
    }
}
