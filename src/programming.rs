//! In-field programming of the auto-off delay.
//!
//! ```text
//! Reset ──IGN+SW1+SW2──► Activate ──held 10 s──► Wait ──both released──► OnWait
//!                                                                        │   ▲
//!                                                     press (minutes+1)  ▼   │ both released
//!                                                                       OffWait
//! OnWait ──5 s idle, commit──► DisplayDwell ──1 s──► Display ──N flashes──► Reset
//! ```
//!
//! Ignition loss aborts every state back to [`ConfigState::Reset`]. The
//! machine itself is pure: it reports what happened through a
//! [`ProgramEvent`] and the caller restarts timers, clears toggles and
//! persists the committed delay.

use crate::led::IndicatorMode;
use crate::settings::AutoOffDelay;
use crate::timing::{
    PROG_ACTIVATE_MS, PROG_DISPLAY_DWELL_MS, PROG_DISPLAY_FLASH_MS, PROG_IDLE_MS,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigState {
    /// Not programming; outputs follow their toggles
    #[default]
    Reset,
    /// Ignition and both switches held, waiting for the activation time
    Activate,
    /// Activated, waiting for both switches to be released
    Wait,
    /// Waiting for a press, commits after the idle time
    OnWait,
    /// Press counted, waiting for release
    OffWait,
    /// Dark pause before the confirmation flashes
    DisplayDwell,
    /// Flashing the committed minute count
    Display,
}

/// Why a session went back to [`ConfigState::Reset`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExitReason {
    IgnitionOff,
    /// A switch was let go before the activation time
    Released,
    /// Zero minutes committed, nothing to display
    Disabled,
    /// All confirmation flashes shown
    Complete,
}

/// Outcome of one [`Programming::step`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProgramEvent {
    /// Nothing changed
    Idle,
    /// Reset → Activate. Restart the session timer, force toggles off.
    Entered,
    /// Activate → Wait. Restart the session timer.
    Armed,
    /// Wait → OnWait. The idle window keeps counting from arming.
    Released,
    /// OnWait → OffWait with the new minute count.
    Pressed { minutes: u8 },
    /// OffWait → OnWait. Restart the session timer.
    PressReleased,
    /// OnWait → DisplayDwell. Persist the delay, restart the display timer.
    Committed(AutoOffDelay),
    /// DisplayDwell → Display. Restart the display timer.
    DisplayStarted,
    /// Confirmation flash edge. Restart the display timer.
    Blink { lit: bool },
    /// Back to Reset. Force toggles off.
    Exited(ExitReason),
}

/// Inputs sampled once per main-loop pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgramInputs {
    pub ignition: bool,
    pub switch1: bool,
    pub switch2: bool,
    /// Entry is only allowed while powered by the ignition
    pub may_enter: bool,
    /// Session timer
    pub program_ms: u32,
    /// Display timer
    pub display_ms: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Programming {
    state: ConfigState,
    /// Presses counted, later the flashes still to show
    minutes: u8,
    /// Confirmation indicator currently lit
    lit: bool,
}

impl Programming {
    pub const fn new() -> Self {
        Self {
            state: ConfigState::Reset,
            minutes: 0,
            lit: false,
        }
    }

    pub fn state(&self) -> ConfigState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != ConfigState::Reset
    }

    /// Mode of both switch indicators, `None` outside a session.
    pub fn indicator(&self) -> Option<IndicatorMode> {
        match self.state {
            ConfigState::Reset => None,
            ConfigState::Activate | ConfigState::Wait | ConfigState::OnWait => {
                Some(IndicatorMode::Flash)
            }
            ConfigState::OffWait => Some(IndicatorMode::On),
            ConfigState::DisplayDwell => Some(IndicatorMode::Off),
            ConfigState::Display => Some(if self.lit {
                IndicatorMode::On
            } else {
                IndicatorMode::Off
            }),
        }
    }

    fn exit(&mut self, reason: ExitReason) -> ProgramEvent {
        self.state = ConfigState::Reset;
        self.lit = false;
        ProgramEvent::Exited(reason)
    }

    pub fn step(&mut self, inputs: ProgramInputs) -> ProgramEvent {
        let ProgramInputs {
            ignition,
            switch1,
            switch2,
            may_enter,
            program_ms,
            display_ms,
        } = inputs;

        if self.is_active() && !ignition {
            return self.exit(ExitReason::IgnitionOff);
        }

        match self.state {
            ConfigState::Reset => {
                if may_enter && ignition && switch1 && switch2 {
                    self.state = ConfigState::Activate;
                    ProgramEvent::Entered
                } else {
                    ProgramEvent::Idle
                }
            }
            ConfigState::Activate => {
                if !switch1 || !switch2 {
                    self.exit(ExitReason::Released)
                } else if program_ms >= PROG_ACTIVATE_MS {
                    self.minutes = 0;
                    self.state = ConfigState::Wait;
                    ProgramEvent::Armed
                } else {
                    ProgramEvent::Idle
                }
            }
            ConfigState::Wait => {
                if !switch1 && !switch2 {
                    self.state = ConfigState::OnWait;
                    ProgramEvent::Released
                } else {
                    ProgramEvent::Idle
                }
            }
            ConfigState::OnWait => {
                if switch1 || switch2 {
                    self.minutes = self.minutes.saturating_add(1);
                    self.state = ConfigState::OffWait;
                    ProgramEvent::Pressed {
                        minutes: self.minutes,
                    }
                } else if program_ms >= PROG_IDLE_MS {
                    let delay = AutoOffDelay::from_minutes(self.minutes);
                    self.minutes = delay.minutes();
                    self.lit = false;
                    self.state = ConfigState::DisplayDwell;
                    ProgramEvent::Committed(delay)
                } else {
                    ProgramEvent::Idle
                }
            }
            ConfigState::OffWait => {
                if !switch1 && !switch2 {
                    self.state = ConfigState::OnWait;
                    ProgramEvent::PressReleased
                } else {
                    ProgramEvent::Idle
                }
            }
            ConfigState::DisplayDwell => {
                if self.minutes == 0 {
                    self.exit(ExitReason::Disabled)
                } else if display_ms >= PROG_DISPLAY_DWELL_MS {
                    self.state = ConfigState::Display;
                    ProgramEvent::DisplayStarted
                } else {
                    ProgramEvent::Idle
                }
            }
            ConfigState::Display => {
                if display_ms < PROG_DISPLAY_FLASH_MS {
                    ProgramEvent::Idle
                } else if self.lit {
                    self.minutes -= 1;
                    if self.minutes == 0 {
                        self.exit(ExitReason::Complete)
                    } else {
                        self.lit = false;
                        ProgramEvent::Blink { lit: false }
                    }
                } else {
                    self.lit = true;
                    ProgramEvent::Blink { lit: true }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held(program_ms: u32) -> ProgramInputs {
        ProgramInputs {
            ignition: true,
            switch1: true,
            switch2: true,
            may_enter: true,
            program_ms,
            display_ms: 0,
        }
    }

    fn released(program_ms: u32) -> ProgramInputs {
        ProgramInputs {
            switch1: false,
            switch2: false,
            ..held(program_ms)
        }
    }

    fn armed() -> Programming {
        let mut prog = Programming::new();
        assert_eq!(prog.step(held(0)), ProgramEvent::Entered);
        assert_eq!(prog.step(held(PROG_ACTIVATE_MS)), ProgramEvent::Armed);
        assert_eq!(prog.step(released(0)), ProgramEvent::Released);
        prog
    }

    fn press(prog: &mut Programming) -> ProgramEvent {
        let event = prog.step(ProgramInputs {
            switch1: true,
            ..released(0)
        });
        assert_eq!(prog.step(released(0)), ProgramEvent::PressReleased);
        event
    }

    #[test]
    fn entry_needs_all_three_and_ignition_power() {
        let mut prog = Programming::new();
        assert_eq!(
            prog.step(ProgramInputs {
                switch2: false,
                ..held(0)
            }),
            ProgramEvent::Idle
        );
        assert_eq!(
            prog.step(ProgramInputs {
                may_enter: false,
                ..held(0)
            }),
            ProgramEvent::Idle
        );
        assert_eq!(prog.step(held(0)), ProgramEvent::Entered);
        assert_eq!(prog.state(), ConfigState::Activate);
        assert_eq!(prog.indicator(), Some(IndicatorMode::Flash));
    }

    #[test]
    fn early_release_aborts_activation() {
        let mut prog = Programming::new();
        prog.step(held(0));
        assert_eq!(prog.step(held(PROG_ACTIVATE_MS - 1)), ProgramEvent::Idle);
        assert_eq!(
            prog.step(ProgramInputs {
                switch1: false,
                ..held(PROG_ACTIVATE_MS - 1)
            }),
            ProgramEvent::Exited(ExitReason::Released)
        );
        assert!(!prog.is_active());
        assert_eq!(prog.indicator(), None);
    }

    #[test]
    fn wait_holds_until_both_released() {
        let mut prog = Programming::new();
        prog.step(held(0));
        prog.step(held(PROG_ACTIVATE_MS));
        assert_eq!(
            prog.step(ProgramInputs {
                switch1: false,
                ..held(0)
            }),
            ProgramEvent::Idle
        );
        assert_eq!(prog.state(), ConfigState::Wait);
        assert_eq!(prog.step(released(0)), ProgramEvent::Released);
        assert_eq!(prog.state(), ConfigState::OnWait);
    }

    #[test]
    fn presses_count_minutes() {
        let mut prog = armed();
        assert_eq!(press(&mut prog), ProgramEvent::Pressed { minutes: 1 });
        assert_eq!(press(&mut prog), ProgramEvent::Pressed { minutes: 2 });
        assert_eq!(
            prog.step(ProgramInputs {
                switch2: true,
                ..released(0)
            }),
            ProgramEvent::Pressed { minutes: 3 }
        );
        assert_eq!(prog.indicator(), Some(IndicatorMode::On));
    }

    #[test]
    fn idle_commits_and_flashes_count() {
        let mut prog = armed();
        press(&mut prog);
        press(&mut prog);
        assert_eq!(prog.step(released(PROG_IDLE_MS - 1)), ProgramEvent::Idle);
        assert_eq!(
            prog.step(released(PROG_IDLE_MS)),
            ProgramEvent::Committed(AutoOffDelay::from_minutes(2))
        );
        assert_eq!(prog.indicator(), Some(IndicatorMode::Off));

        let display = |display_ms| ProgramInputs {
            display_ms,
            ..released(0)
        };
        assert_eq!(prog.step(display(PROG_DISPLAY_DWELL_MS - 1)), ProgramEvent::Idle);
        assert_eq!(prog.step(display(PROG_DISPLAY_DWELL_MS)), ProgramEvent::DisplayStarted);

        let mut flashes = 0;
        loop {
            match prog.step(display(PROG_DISPLAY_FLASH_MS)) {
                ProgramEvent::Blink { lit: true } => {
                    flashes += 1;
                    assert_eq!(prog.indicator(), Some(IndicatorMode::On));
                }
                ProgramEvent::Blink { lit: false } => {
                    assert_eq!(prog.indicator(), Some(IndicatorMode::Off));
                }
                ProgramEvent::Exited(ExitReason::Complete) => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(flashes, 2);
        assert_eq!(prog.state(), ConfigState::Reset);
    }

    #[test]
    fn idle_window_counts_from_arming() {
        let mut prog = Programming::new();
        prog.step(held(0));
        prog.step(held(PROG_ACTIVATE_MS));
        assert_eq!(prog.step(held(PROG_IDLE_MS)), ProgramEvent::Idle);
        assert_eq!(prog.step(released(PROG_IDLE_MS)), ProgramEvent::Released);
        assert_eq!(
            prog.step(released(PROG_IDLE_MS)),
            ProgramEvent::Committed(AutoOffDelay::DISABLED)
        );
    }

    #[test]
    fn more_than_twenty_presses_saturate() {
        let mut prog = armed();
        for _ in 0..25 {
            press(&mut prog);
        }
        assert_eq!(
            prog.step(released(PROG_IDLE_MS)),
            ProgramEvent::Committed(AutoOffDelay::from_minutes(20))
        );
    }

    #[test]
    fn zero_minutes_skips_display() {
        let mut prog = armed();
        assert_eq!(
            prog.step(released(PROG_IDLE_MS)),
            ProgramEvent::Committed(AutoOffDelay::DISABLED)
        );
        assert_eq!(
            prog.step(released(0)),
            ProgramEvent::Exited(ExitReason::Disabled)
        );
    }

    #[test]
    fn ignition_loss_aborts_any_state() {
        let off = ProgramInputs {
            ignition: false,
            ..released(0)
        };

        let mut prog = Programming::new();
        prog.step(held(0));
        assert_eq!(prog.step(off), ProgramEvent::Exited(ExitReason::IgnitionOff));

        let mut prog = armed();
        prog.step(ProgramInputs {
            switch1: true,
            ..released(0)
        });
        assert_eq!(prog.state(), ConfigState::OffWait);
        assert_eq!(prog.step(off), ProgramEvent::Exited(ExitReason::IgnitionOff));

        let mut prog = Programming::new();
        assert_eq!(prog.step(off), ProgramEvent::Idle);
    }
}
