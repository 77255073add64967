//! Shared state and the main-loop controller.
//!
//! Two execution contexts cooperate:
//!
//! - the foreground context (1 ms tick and input edges) mutates [`Shared`]
//!   through [`Shared::on_tick`] and [`Shared::on_edge`];
//! - the main loop owns a [`Controller`] and runs [`Controller::step`] over
//!   and over, reading a consistent [`Snapshot`] at the top of each pass and
//!   committing changes back through short critical sections.
//!
//! Every access goes through one `critical_section::Mutex`, so neither side
//! can observe a half-updated counter or toggle.

use core::cell::RefCell;

use critical_section::Mutex;
use embedded_hal::blocking::delay::DelayUs;

use crate::clock::TickClock;
use crate::hal::{InputSensor, LEVEL_OFF, LEVEL_ON, OutputChannel, OutputDriver, Watchdog};
use crate::input::{InputChannel, InputLevels, InputSet};
use crate::led::{Animation, Frame, IndicatorMode, LedRenderer, RgbMode};
use crate::power::{PowerAction, PowerInputs, PowerMachine, PowerState};
use crate::programming::{ConfigState, ProgramEvent, ProgramInputs, Programming};
use crate::settings::{AutoOffDelay, ConfigStore, load_delay};
use crate::timing::HORN_SETTLE_US;
use crate::toggle::{AutomaticTriggers, Load, Toggles};

/// Everything both contexts touch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SharedState {
    pub clock: TickClock,
    pub inputs: InputSet,
    pub toggles: Toggles,
    pub animation: Animation,
    /// At least one switch indicator is breathing
    pub breathing: bool,
    /// Main loop is suspended; automatic inputs are masked
    pub sleeping: bool,
}

impl SharedState {
    pub const fn new() -> Self {
        Self {
            clock: TickClock::new(),
            inputs: InputSet::new(),
            toggles: Toggles::new(),
            animation: Animation::new(),
            breathing: false,
            sleeping: false,
        }
    }
}

/// Consistent copy of the shared state taken at the top of a pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub levels: InputLevels,
    pub toggles: Toggles,
    pub clock: TickClock,
    pub animation: Animation,
}

/// [`SharedState`] behind a critical-section mutex, usable from a `static`.
pub struct Shared {
    state: Mutex<RefCell<SharedState>>,
}

impl Default for Shared {
    fn default() -> Self {
        Self::new()
    }
}

impl Shared {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(SharedState::new())),
        }
    }

    /// Runs `f` with exclusive access to the shared state.
    pub fn with<R>(&self, f: impl FnOnce(&mut SharedState) -> R) -> R {
        critical_section::with(|cs| f(&mut self.state.borrow_ref_mut(cs)))
    }

    pub fn snapshot(&self) -> Snapshot {
        self.with(|s| Snapshot {
            levels: s.inputs.levels(),
            toggles: s.toggles,
            clock: s.clock,
            animation: s.animation,
        })
    }

    /// Tick handler: advances the clock, settles inputs and steps the
    /// animations. A switch press whose edge interrupt was lost flips its
    /// toggle here. Does nothing while sleeping.
    pub fn on_tick<S: InputSensor + ?Sized>(&self, sensor: &S) {
        self.with(|s| {
            if s.sleeping {
                return;
            }
            s.clock.advance();
            let toggles = &mut s.toggles;
            s.inputs.on_tick(s.clock.now(), sensor, |channel| {
                if let Some(load) = Load::for_switch(channel) {
                    toggles.flip_manual(load);
                }
            });
            let levels = s.inputs.levels();
            s.animation
                .advance(levels.ignition(), levels.horn_switch(), s.breathing);
        });
    }

    /// Edge handler for `channel`.
    ///
    /// A rising edge on a push button flips its toggle. While sleeping,
    /// edges on the automatic channels are dropped. Returns true when the
    /// edge should wake a sleeping main loop.
    pub fn on_edge(&self, channel: InputChannel) -> bool {
        self.with(|s| {
            if s.sleeping && channel.is_automatic() {
                return false;
            }
            let now = s.clock.now();
            if s.inputs.get_mut(channel).on_edge(now) {
                if let Some(load) = Load::for_switch(channel) {
                    s.toggles.flip_manual(load);
                }
            }
            s.sleeping
        })
    }

    /// Publishes the raw level of `channels` directly.
    pub fn seed<S: InputSensor + ?Sized>(&self, sensor: &S, channels: &[InputChannel]) {
        self.with(|s| {
            for &channel in channels {
                s.inputs.get_mut(channel).seed(sensor.is_active(channel));
            }
        });
    }

    pub fn force_toggles_off(&self) {
        self.with(|s| s.toggles.force_off());
    }

    pub fn is_sleeping(&self) -> bool {
        self.with(|s| s.sleeping)
    }

    fn enter_sleep(&self) {
        self.with(|s| {
            s.sleeping = true;
            s.breathing = false;
        });
    }

    /// Leaves sleep and re-reads the automatic inputs, whose edges were
    /// dropped meanwhile.
    fn leave_sleep(&self) {
        self.with(|s| {
            s.sleeping = false;
            let now = s.clock.now();
            for channel in InputChannel::ALL {
                if channel.is_automatic() {
                    s.inputs.get_mut(channel).resync(now);
                }
            }
        });
    }
}

/// What the main loop should do after a pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    /// Run the next pass right away
    Continue,
    /// Suspend until a wake-up edge, then call [`Controller::wake`]
    Sleep,
}

/// Last level written to each load output.
#[derive(Clone, Copy, Debug, Default)]
struct LoadOutputs([Option<bool>; 2]);

impl LoadOutputs {
    fn write<D: OutputDriver + ?Sized>(&mut self, driver: &mut D, on: [bool; 2]) {
        for ((load, on), last) in Load::ALL.into_iter().zip(on).zip(&mut self.0) {
            if *last != Some(on) {
                driver.set_level(load.output(), if on { LEVEL_ON } else { LEVEL_OFF });
                *last = Some(on);
            }
        }
    }

    fn invalidate(&mut self) {
        self.0 = [None; 2];
    }
}

/// Main-loop side of the controller.
///
/// * `I` - raw input reads for power-on seeding
/// * `D` - output driver
/// * `W` - hardware watchdog
/// * `T` - delay provider for the horn settle time
/// * `S` - persisted auto-off delay
pub struct Controller<I, D, W, T, S> {
    sensor: I,
    driver: D,
    watchdog: W,
    delay: T,
    store: S,
    power: PowerMachine,
    programming: Programming,
    triggers: AutomaticTriggers,
    auto_off: AutoOffDelay,
    horn: bool,
    loads: LoadOutputs,
    renderer: LedRenderer,
}

impl<I, D, W, T, S> Controller<I, D, W, T, S>
where
    I: InputSensor,
    D: OutputDriver,
    W: Watchdog,
    T: DelayUs<u32>,
    S: ConfigStore,
{
    /// Reads the persisted delay; everything else starts in its reset state.
    pub fn new(sensor: I, driver: D, watchdog: W, delay: T, mut store: S) -> Self {
        let auto_off = load_delay(&mut store);
        Self {
            sensor,
            driver,
            watchdog,
            delay,
            store,
            power: PowerMachine::new(),
            programming: Programming::new(),
            triggers: AutomaticTriggers::new(),
            auto_off,
            horn: false,
            loads: LoadOutputs::default(),
            renderer: LedRenderer::new(),
        }
    }

    pub fn power_state(&self) -> PowerState {
        self.power.state()
    }

    pub fn config_state(&self) -> ConfigState {
        self.programming.state()
    }

    pub fn auto_off(&self) -> AutoOffDelay {
        self.auto_off
    }

    pub fn horn_engaged(&self) -> bool {
        self.horn
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn watchdog(&self) -> &W {
        &self.watchdog
    }

    /// Feeds the watchdog while the main loop is suspended.
    pub fn feed_watchdog(&mut self) {
        self.watchdog.feed();
    }

    /// One main-loop pass.
    pub fn step(&mut self, shared: &Shared) -> Step {
        self.watchdog.feed();

        let snap = shared.snapshot();
        let before = self.power.state();
        let action = self.power.transition(PowerInputs {
            ignition: snap.levels.ignition(),
            any_toggle_on: snap.toggles.any_on(),
            auto_off: self.auto_off,
            elapsed_ms: snap.clock.delay_ms(),
        });
        let after = self.power.state();
        if before != after {
            log_info!("power: {:?} -> {:?}", before, after);
        }

        match action {
            PowerAction::Initialize => {
                shared.seed(&self.sensor, &[InputChannel::Ignition, InputChannel::Reverse]);
                return Step::Continue;
            }
            PowerAction::Sleep => {
                self.enter_sleep(shared);
                return Step::Sleep;
            }
            PowerAction::StartDelay => shared.with(|s| s.clock.restart_delay()),
            PowerAction::ForceTogglesOff => shared.force_toggles_off(),
            PowerAction::None => {}
        }

        if after == PowerState::OnIgnition {
            self.arbitrate_horn(shared, snap.levels);
        } else {
            self.release_horn();
        }

        self.run_programming(shared, &snap);
        self.render(shared);
        Step::Continue
    }

    /// Restores the peripherals after a [`Step::Sleep`].
    pub fn wake(&mut self, shared: &Shared) {
        shared.leave_sleep();
        self.watchdog.resume();
        self.driver.resume();
        self.renderer.invalidate();
        self.loads.invalidate();
        log_info!("awake");
    }

    fn enter_sleep(&mut self, shared: &Shared) {
        self.driver.set_level(OutputChannel::Horn, LEVEL_OFF);
        self.horn = false;
        self.loads.write(&mut self.driver, [false; 2]);
        self.renderer.render(Frame::DARK, &mut self.driver);
        self.driver.suspend();
        shared.enter_sleep();
        self.watchdog.pause();
        log_info!("sleeping");
    }

    /// Horn interlock: both loads are off at the driver for at least the
    /// settle time before the horn is energized.
    fn arbitrate_horn(&mut self, shared: &Shared, levels: InputLevels) {
        if levels.horn_switch() {
            if !self.horn {
                self.loads.write(&mut self.driver, [false; 2]);
                self.delay.delay_us(HORN_SETTLE_US);
                self.driver.set_level(OutputChannel::Horn, LEVEL_ON);
                self.horn = true;
                log_info!("horn engaged");
            }
            self.triggers.invalidate();
        } else {
            self.release_horn();
            let triggers = &mut self.triggers;
            shared.with(|s| triggers.apply(&mut s.toggles, |channel| levels.is_active(channel)));
        }
    }

    fn release_horn(&mut self) {
        if self.horn {
            self.driver.set_level(OutputChannel::Horn, LEVEL_OFF);
            self.horn = false;
            log_info!("horn released");
        }
    }

    fn run_programming(&mut self, shared: &Shared, snap: &Snapshot) {
        let event = self.programming.step(ProgramInputs {
            ignition: snap.levels.ignition(),
            switch1: snap.levels.switch1(),
            switch2: snap.levels.switch2(),
            may_enter: self.power.state() == PowerState::OnIgnition,
            program_ms: snap.clock.program_ms(),
            display_ms: snap.clock.display_ms(),
        });

        match event {
            ProgramEvent::Idle => {}
            ProgramEvent::Entered => {
                log_info!("programming: activating");
                shared.with(|s| {
                    s.clock.restart_program();
                    s.toggles.force_off();
                });
            }
            ProgramEvent::Armed => {
                log_info!("programming: armed");
                shared.with(|s| s.clock.restart_program());
            }
            ProgramEvent::Released => log_debug!("programming: waiting for presses"),
            ProgramEvent::PressReleased => shared.with(|s| s.clock.restart_program()),
            ProgramEvent::Pressed { minutes } => {
                log_debug!("programming: {} min", minutes);
            }
            ProgramEvent::Committed(delay) => {
                self.commit(delay);
                shared.with(|s| s.clock.restart_display());
            }
            ProgramEvent::DisplayStarted | ProgramEvent::Blink { .. } => {
                shared.with(|s| s.clock.restart_display());
            }
            ProgramEvent::Exited(reason) => {
                log_info!("programming: exit {:?}", reason);
                shared.force_toggles_off();
            }
        }
    }

    /// Applies `delay` in RAM and persists it with the watchdog paused.
    fn commit(&mut self, delay: AutoOffDelay) {
        self.auto_off = delay;
        log_info!("programming: auto-off delay {} min", delay.minutes());

        self.watchdog.pause();
        let result = self.store.save(delay.as_millis());
        self.watchdog.resume();

        if let Err(e) = result {
            log_warn!("auto-off delay not saved ({}), kept until reset", e.kind());
        }
    }

    fn render(&mut self, shared: &Shared) {
        let snap = shared.snapshot();

        let (loads, indicators) = if self.horn {
            ([false; 2], [IndicatorMode::Off; 2])
        } else if let Some(mode) = self.programming.indicator() {
            ([false; 2], [mode; 2])
        } else {
            let toggles = snap.toggles;
            (
                Load::ALL.map(|load| toggles.get(load).is_on()),
                Load::ALL.map(|load| toggles.get(load).indicator()),
            )
        };

        let breathing = indicators.contains(&IndicatorMode::Breathe);
        shared.with(|s| s.breathing = breathing);

        let rgb = RgbMode::select(snap.levels.ignition(), self.horn, snap.animation.hue());
        let frame = Frame::compose(indicators, rgb, &snap.animation);
        self.renderer.render(frame, &mut self.driver);
        self.loads.write(&mut self.driver, loads);
    }
}
