//! Control logic for an ATV accessory controller.
//!
//! The board replaces three relays: a horn and two switched 12V loads (V1,
//! V2). Six inputs are read: ignition, reverse, high beam, the horn push
//! button and two push buttons for the loads.
//!
//! - The horn only sounds with the ignition on. V1 and V2 are switched off
//!   before the horn is energized and restored when it releases.
//! - Each push button toggles its load. High beam switches V1 and reverse
//!   switches V2 automatically; the button indicator breathes while a load
//!   is on automatically.
//! - With the ignition off a load that is switched on stays on for the
//!   programmed auto-off delay.
//! - Holding both buttons for 10 s with the ignition on enters programming:
//!   each press adds one minute, 5 s without a press commits the value and
//!   the indicators flash it back.
//!
//! # Module Organization
//!
//! - [`clock`] - tick counters and wrap-safe deadlines
//! - [`input`] - debounced inputs
//! - [`toggle`] - load toggle intent and automatic triggers
//! - [`power`] - wake/sleep state machine
//! - [`programming`] - auto-off delay programming procedure
//! - [`led`] - indicator effects and rendering
//! - [`settings`] - persisted auto-off delay
//! - [`hal`] - capability traits implemented by the board
//! - [`device`] - shared state and the main-loop controller
//! - [`timing`] - tuning constants

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod clock;
pub mod device;
pub mod hal;
pub mod input;
pub mod led;
pub mod power;
pub mod programming;
pub mod settings;
pub mod timing;
pub mod toggle;

pub use device::{Controller, Shared, SharedState, Snapshot, Step};
