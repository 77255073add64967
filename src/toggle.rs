//! Output toggle controller.
//!
//! Each switched load carries a latched intent, separate from what the
//! driver is currently doing (the horn interlock may hold a load off while
//! its toggle stays on).
//!
//! ```text
//!            manual rising edge          manual rising edge
//!   Off ───────────────────────► UserOn ──────────────────► Off
//!    ▲ │ automatic high                     ▲
//!    │ ▼                                    │ manual rising edge
//!   AutoOn ─────────────────────────────────┘
//!    automatic low → Off
//! ```

use crate::hal::OutputChannel;
use crate::input::InputChannel;
use crate::led::IndicatorMode;

/// Latched intent for one switched load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ToggleState {
    #[default]
    Off,
    /// Switched on by high beam or reverse
    AutoOn,
    /// Switched on by the user
    UserOn,
}

impl ToggleState {
    pub fn is_on(self) -> bool {
        self != ToggleState::Off
    }

    /// Next state after a rising edge on the bound push button.
    ///
    /// A press always wins over an automatic trigger: AUTO_ON goes to OFF
    /// just like USER_ON does.
    pub fn flip_manual(self) -> Self {
        match self {
            ToggleState::Off => ToggleState::UserOn,
            ToggleState::AutoOn | ToggleState::UserOn => ToggleState::Off,
        }
    }

    /// Next state after the bound automatic signal changed to `level`.
    pub fn apply_automatic(self, level: bool) -> Self {
        match (self, level) {
            (ToggleState::UserOn, _) => ToggleState::UserOn,
            (_, true) => ToggleState::AutoOn,
            (_, false) => ToggleState::Off,
        }
    }

    /// Indicator mode that represents this state.
    pub fn indicator(self) -> IndicatorMode {
        match self {
            ToggleState::Off => IndicatorMode::Off,
            ToggleState::AutoOn => IndicatorMode::Breathe,
            ToggleState::UserOn => IndicatorMode::On,
        }
    }
}

/// The two switched loads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Load {
    /// V1: switch 1, high beam
    One,
    /// V2: switch 2, reverse
    Two,
}

impl Load {
    pub const ALL: [Load; 2] = [Load::One, Load::Two];

    pub fn switch(self) -> InputChannel {
        match self {
            Load::One => InputChannel::Switch1,
            Load::Two => InputChannel::Switch2,
        }
    }

    pub fn trigger(self) -> InputChannel {
        match self {
            Load::One => InputChannel::HighBeam,
            Load::Two => InputChannel::Reverse,
        }
    }

    pub fn output(self) -> OutputChannel {
        match self {
            Load::One => OutputChannel::Output1,
            Load::Two => OutputChannel::Output2,
        }
    }

    pub fn indicator(self) -> OutputChannel {
        match self {
            Load::One => OutputChannel::Switch1Led,
            Load::Two => OutputChannel::Switch2Led,
        }
    }

    /// Load whose manual switch is `channel`, if any.
    pub fn for_switch(channel: InputChannel) -> Option<Load> {
        match channel {
            InputChannel::Switch1 => Some(Load::One),
            InputChannel::Switch2 => Some(Load::Two),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Intent of both loads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Toggles([ToggleState; 2]);

impl Toggles {
    pub const fn new() -> Self {
        Self([ToggleState::Off; 2])
    }

    pub fn get(&self, load: Load) -> ToggleState {
        self.0[load.index()]
    }

    pub fn set(&mut self, load: Load, state: ToggleState) {
        self.0[load.index()] = state;
    }

    pub fn flip_manual(&mut self, load: Load) -> ToggleState {
        let next = self.get(load).flip_manual();
        self.set(load, next);
        next
    }

    pub fn any_on(&self) -> bool {
        self.0.iter().any(|state| state.is_on())
    }

    pub fn force_off(&mut self) {
        self.0 = [ToggleState::Off; 2];
    }
}

/// Change detector for one automatic trigger signal.
///
/// Starts unsynchronised, so the first observation always counts as a
/// change and the load is brought in line with the signal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AutomaticTrigger {
    last: Option<bool>,
}

impl AutomaticTrigger {
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Records `level` and returns it if it differs from the last one seen.
    pub fn observe(&mut self, level: bool) -> Option<bool> {
        if self.last == Some(level) {
            None
        } else {
            self.last = Some(level);
            Some(level)
        }
    }

    /// Forgets the last level so the next observation is applied again.
    pub fn invalidate(&mut self) {
        self.last = None;
    }
}

/// High beam and reverse trackers, bound to V1 and V2.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AutomaticTriggers([AutomaticTrigger; 2]);

impl AutomaticTriggers {
    pub const fn new() -> Self {
        Self([AutomaticTrigger::new(); 2])
    }

    /// Applies any automatic level change to `toggles`.
    pub fn apply(&mut self, toggles: &mut Toggles, level_of: impl Fn(InputChannel) -> bool) {
        for load in Load::ALL {
            if let Some(level) = self.0[load.index()].observe(level_of(load.trigger())) {
                toggles.set(load, toggles.get(load).apply_automatic(level));
            }
        }
    }

    pub fn invalidate(&mut self) {
        for trigger in &mut self.0 {
            trigger.invalidate();
        }
    }
}
