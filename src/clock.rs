//! Tick clock counters.
//!
//! The tick context advances all counters once per millisecond. The main
//! loop only ever reads them through a [`crate::device::Snapshot`] and
//! restarts them through the shared state.

/// Free-running millisecond counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickClock {
    /// Wrapping 8-bit tick used for debounce deadlines
    now: u8,
    /// Time spent in ON_SWITCH since it was entered
    delay_ms: u32,
    /// Programming session timer
    program_ms: u32,
    /// Programming display timer
    display_ms: u32,
}

impl TickClock {
    pub const fn new() -> Self {
        Self {
            now: 0,
            delay_ms: 0,
            program_ms: 0,
            display_ms: 0,
        }
    }

    /// Advances every counter by one tick.
    ///
    /// The long counters saturate instead of wrapping so a stale timer can
    /// never read as "just restarted".
    pub fn advance(&mut self) {
        self.now = self.now.wrapping_add(1);
        self.delay_ms = self.delay_ms.saturating_add(1);
        self.program_ms = self.program_ms.saturating_add(1);
        self.display_ms = self.display_ms.saturating_add(1);
    }

    pub fn now(&self) -> u8 {
        self.now
    }

    pub fn delay_ms(&self) -> u32 {
        self.delay_ms
    }

    pub fn program_ms(&self) -> u32 {
        self.program_ms
    }

    pub fn display_ms(&self) -> u32 {
        self.display_ms
    }

    pub fn restart_delay(&mut self) {
        self.delay_ms = 0;
    }

    pub fn restart_program(&mut self) {
        self.program_ms = 0;
    }

    pub fn restart_display(&mut self) {
        self.display_ms = 0;
    }
}

/// Returns true once `now` has reached or passed `deadline`.
///
/// Both values come from the wrapping 8-bit tick, so the comparison is done
/// on the signed distance. Deadlines are never more than a few ticks ahead,
/// far inside the 127-tick half range.
pub fn deadline_reached(now: u8, deadline: u8) -> bool {
    now.wrapping_sub(deadline) < 0x80
}
