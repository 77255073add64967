//! Capability interfaces between the controller and the board.
//!
//! The controller never touches registers. It reads raw input levels through
//! [`InputSensor`], drives every load and indicator through [`OutputDriver`]
//! and keeps the device alive through [`Watchdog`]. The horn settle delay uses
//! the `embedded-hal` blocking delay trait and persistence goes through
//! [`crate::settings::ConfigStore`].

use crate::input::InputChannel;

/// Every physical output the controller drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputChannel {
    /// Horn relay replacement (binary)
    Horn,
    /// Switched load V1 (binary, PWM-capable)
    Output1,
    /// Switched load V2 (binary, PWM-capable)
    Output2,
    /// Indicator inside switch 1
    Switch1Led,
    /// Indicator inside switch 2
    Switch2Led,
    /// Horn switch RGB indicator, red channel
    HornLedRed,
    /// Horn switch RGB indicator, green channel
    HornLedGreen,
    /// Horn switch RGB indicator, blue channel
    HornLedBlue,
}

impl OutputChannel {
    pub const ALL: [OutputChannel; 8] = [
        OutputChannel::Horn,
        OutputChannel::Output1,
        OutputChannel::Output2,
        OutputChannel::Switch1Led,
        OutputChannel::Switch2Led,
        OutputChannel::HornLedRed,
        OutputChannel::HornLedGreen,
        OutputChannel::HornLedBlue,
    ];
}

/// Full-scale level for [`OutputDriver::set_level`].
pub const LEVEL_ON: u8 = u8::MAX;
pub const LEVEL_OFF: u8 = 0;

/// Raw access to the six input lines.
pub trait InputSensor {
    /// Returns the instantaneous level of `channel`.
    ///
    /// Polarity is already corrected: `true` means the signal is asserted
    /// (12V present, or the active-low switch is pressed).
    fn is_active(&self, channel: InputChannel) -> bool;
}

/// Duty-cycle control for loads and indicators.
pub trait OutputDriver {
    /// Sets `channel` to `level` out of 255. Binary outputs treat any
    /// non-zero level as on.
    fn set_level(&mut self, channel: OutputChannel, level: u8);

    /// Stops the PWM timers before the CPU is suspended.
    fn suspend(&mut self) {}

    /// Restarts the PWM timers after a wake-up.
    fn resume(&mut self) {}
}

/// Hardware watchdog.
pub trait Watchdog {
    /// Restarts the watchdog countdown.
    fn feed(&mut self);

    /// Opens a window in which the main loop may not feed the watchdog
    /// (flash programming, sleep). Hardware that cannot stop its watchdog
    /// feeds it instead.
    fn pause(&mut self) {
        self.feed();
    }

    /// Closes the window opened by [`Watchdog::pause`].
    fn resume(&mut self) {
        self.feed();
    }
}
