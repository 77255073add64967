//! Compile-time tuning constants.
//!
//! Every duration is expressed in ticks of the 1 ms tick clock unless the
//! name says otherwise.

/// Period of the tick clock in milliseconds.
pub const TICK_MS: u64 = 1;

/// Time an input must settle after an edge before its raw level is trusted.
///
/// Kept well below one main-loop iteration so a debounced press is always
/// observed before the watchdog window closes.
pub const DEBOUNCE_MS: u8 = 5;

/// How long ignition, switch 1 and switch 2 must be held to enter programming.
pub const PROG_ACTIVATE_MS: u32 = 10_000;

/// Idle time in programming mode after which the minute count is committed.
pub const PROG_IDLE_MS: u32 = PROG_ACTIVATE_MS / 2;

/// Dark dwell before the confirmation flashes start.
pub const PROG_DISPLAY_DWELL_MS: u32 = 1_000;

/// Half period of a confirmation flash.
pub const PROG_DISPLAY_FLASH_MS: u32 = 500;

/// Upper bound on the number of minutes that can be programmed.
pub const MAX_DELAY_MINUTES: u8 = 20;

/// Auto-off delay used when nothing valid is stored.
pub const DEFAULT_DELAY_MINUTES: u8 = 5;

pub const MS_PER_MINUTE: u32 = 60_000;

/// Half period of the indicator FLASH square wave.
pub const FLASH_HALF_PERIOD_MS: u16 = 48;

/// Ticks between two steps of the breathing phase.
pub const BREATHE_STEP_MS: u8 = 8;

/// Ticks between two steps of the horn indicator hue.
pub const HUE_STEP_MS: u8 = 64;

/// Hue shown first after ignition comes on.
pub const HUE_IGNITION_START: u8 = 85;

/// Minimum time between switching the loads off and energizing the horn.
pub const HORN_SETTLE_US: u32 = 10;

/// Hardware watchdog timeout.
pub const WATCHDOG_TIMEOUT_MS: u32 = 2_000;

/// How often a sleeping device wakes to feed the watchdog.
pub const SLEEP_FEED_INTERVAL_MS: u64 = 1_000;
