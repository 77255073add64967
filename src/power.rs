//! Power state machine.
//!
//! Decides whether the controller is awake because of the ignition, awake
//! because the user left a load on with the ignition off, or asleep.
//!
//! ```text
//! Reset ──► Down ──ignition──────────────► OnIgnition ──ignition off──► Down
//!            │ ▲                              ▲
//!            │ └── toggles off / timeout ─┐   │ ignition
//!            └──── load on, delay ≠ 0 ──► OnSwitch
//! ```
//!
//! The machine only decides. Each transition returns a [`PowerAction`] that
//! the controller carries out against the shared state and the hardware.

use crate::settings::AutoOffDelay;

/// Why the controller is awake, if it is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerState {
    /// Boot, or after a watchdog reset
    #[default]
    Reset,
    /// Nothing to do; the controller sleeps here
    Down,
    /// Ignition is on
    OnIgnition,
    /// Ignition off, a load left on, auto-off delay running
    OnSwitch,
}

/// Work the controller must do after a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerAction {
    /// Nothing beyond the normal pass
    None,
    /// Seed ignition and reverse from a raw read, then start the next pass
    Initialize,
    /// Restart the auto-off timer
    StartDelay,
    /// Force both toggles off
    ForceTogglesOff,
    /// Turn everything off and suspend until an input edge
    Sleep,
}

/// Inputs sampled once per main-loop pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PowerInputs {
    pub ignition: bool,
    /// At least one toggle is not OFF
    pub any_toggle_on: bool,
    pub auto_off: AutoOffDelay,
    /// Time since the auto-off timer was restarted
    pub elapsed_ms: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PowerMachine {
    state: PowerState,
}

impl PowerMachine {
    pub const fn new() -> Self {
        Self {
            state: PowerState::Reset,
        }
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    /// Runs one pass of the machine.
    ///
    /// [`PowerAction::Sleep`] leaves the state at `Down`, so after a wake-up
    /// the next pass re-evaluates `Down` without going through `Reset`.
    pub fn transition(&mut self, inputs: PowerInputs) -> PowerAction {
        let PowerInputs {
            ignition,
            any_toggle_on,
            auto_off,
            elapsed_ms,
        } = inputs;

        let (next, action) = match self.state {
            PowerState::Reset => (PowerState::Down, PowerAction::Initialize),
            PowerState::Down => {
                if ignition {
                    (PowerState::OnIgnition, PowerAction::None)
                } else if any_toggle_on && !auto_off.is_disabled() {
                    (PowerState::OnSwitch, PowerAction::StartDelay)
                } else {
                    (PowerState::Down, PowerAction::Sleep)
                }
            }
            PowerState::OnIgnition => {
                if ignition {
                    (PowerState::OnIgnition, PowerAction::None)
                } else {
                    (PowerState::Down, PowerAction::ForceTogglesOff)
                }
            }
            PowerState::OnSwitch => {
                if ignition {
                    (PowerState::OnIgnition, PowerAction::None)
                } else if !any_toggle_on {
                    (PowerState::Down, PowerAction::None)
                } else if elapsed_ms >= auto_off.as_millis() {
                    (PowerState::Down, PowerAction::ForceTogglesOff)
                } else {
                    (PowerState::OnSwitch, PowerAction::None)
                }
            }
        };

        self.state = next;
        action
    }
}
