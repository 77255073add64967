//! Debounced input set.
//!
//! Each of the six input lines raises an edge interrupt on any change. The
//! edge handler starts a debounce window and, when the published level was
//! OFF, publishes ON straight away so a button press feels instantaneous.
//! The tick handler closes the window by re-reading the raw line.
//!
//! ```text
//!            edge            deadline (edge + 5 ms)
//! raw     ___/‾\_/‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾
//! settle  ___|‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾|__________
//! publish ___/‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾  (ON at the first edge, confirmed at deadline)
//! ```
//!
//! A rising glitch shorter than the window is published optimistically and
//! reverted at the deadline. A falling glitch never reaches the published
//! level.

use crate::clock::deadline_reached;
use crate::hal::InputSensor;
use crate::timing::DEBOUNCE_MS;

/// Logical input lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InputChannel {
    /// Ignition (12V when the vehicle is running)
    Ignition,
    /// Reverse gear selected
    Reverse,
    /// High beam on
    HighBeam,
    /// Horn push button
    HornSwitch,
    /// Push button for load V1
    Switch1,
    /// Push button for load V2
    Switch2,
}

impl InputChannel {
    pub const ALL: [InputChannel; 6] = [
        InputChannel::Ignition,
        InputChannel::Reverse,
        InputChannel::HighBeam,
        InputChannel::HornSwitch,
        InputChannel::Switch1,
        InputChannel::Switch2,
    ];

    /// Vehicle signals that switch a load without user action. They are not
    /// wake sources while the device sleeps.
    pub fn is_automatic(self) -> bool {
        matches!(self, InputChannel::Reverse | InputChannel::HighBeam)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Debounce state of one input line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DigitalInput {
    published: bool,
    settling: bool,
    deadline: u8,
}

impl DigitalInput {
    pub const fn new() -> Self {
        Self {
            published: false,
            settling: false,
            deadline: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.published
    }

    pub fn is_settling(&self) -> bool {
        self.settling
    }

    /// Starts a debounce window at tick `now`.
    ///
    /// Returns true when the edge was treated as rising, i.e. the published
    /// level went from OFF to ON.
    pub fn on_edge(&mut self, now: u8) -> bool {
        self.settling = true;
        self.deadline = now.wrapping_add(DEBOUNCE_MS);
        if self.published {
            false
        } else {
            self.published = true;
            true
        }
    }

    /// Closes an expired debounce window using a fresh raw sample.
    pub fn on_tick(&mut self, now: u8, raw: impl FnOnce() -> bool) {
        if self.settling && deadline_reached(now, self.deadline) {
            self.settling = false;
            self.published = raw();
        }
    }

    /// Starts a window when the raw level disagrees with an idle published
    /// level, as if the edge interrupt had fired. Returns true when that
    /// counts as a rising edge.
    pub fn recover(&mut self, now: u8, raw: bool) -> bool {
        if self.settling || raw == self.published {
            false
        } else {
            self.on_edge(now)
        }
    }

    /// Publishes the raw level directly, cancelling any window.
    pub fn seed(&mut self, raw: bool) {
        self.settling = false;
        self.published = raw;
    }

    /// Forces a raw resample on the next tick.
    pub fn resync(&mut self, now: u8) {
        self.settling = true;
        self.deadline = now;
    }
}

/// Published levels of all six inputs at one instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InputLevels([bool; 6]);

impl InputLevels {
    pub fn is_active(&self, channel: InputChannel) -> bool {
        self.0[channel.index()]
    }

    pub fn ignition(&self) -> bool {
        self.is_active(InputChannel::Ignition)
    }

    pub fn horn_switch(&self) -> bool {
        self.is_active(InputChannel::HornSwitch)
    }

    pub fn switch1(&self) -> bool {
        self.is_active(InputChannel::Switch1)
    }

    pub fn switch2(&self) -> bool {
        self.is_active(InputChannel::Switch2)
    }
}

/// The six debounced inputs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputSet {
    inputs: [DigitalInput; 6],
}

impl InputSet {
    pub const fn new() -> Self {
        Self {
            inputs: [DigitalInput::new(); 6],
        }
    }

    pub fn get(&self, channel: InputChannel) -> &DigitalInput {
        &self.inputs[channel.index()]
    }

    pub fn get_mut(&mut self, channel: InputChannel) -> &mut DigitalInput {
        &mut self.inputs[channel.index()]
    }

    pub fn levels(&self) -> InputLevels {
        InputLevels(self.inputs.map(|input| input.published))
    }

    /// Closes every expired debounce window, then picks up level changes
    /// whose edge interrupt was lost. `on_rising` is called for every
    /// recovered rising edge.
    pub fn on_tick<S: InputSensor + ?Sized>(
        &mut self,
        now: u8,
        sensor: &S,
        mut on_rising: impl FnMut(InputChannel),
    ) {
        for channel in InputChannel::ALL {
            let input = &mut self.inputs[channel.index()];
            if input.is_settling() {
                input.on_tick(now, || sensor.is_active(channel));
            } else if input.recover(now, sensor.is_active(channel)) {
                on_rising(channel);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rising_edge_publishes_immediately() {
        let mut input = DigitalInput::new();
        assert!(input.on_edge(10));
        assert!(input.is_active());
        assert!(input.is_settling());
    }

    #[test]
    fn second_edge_in_window_is_not_rising() {
        let mut input = DigitalInput::new();
        assert!(input.on_edge(10));
        assert!(!input.on_edge(11));
        assert!(input.is_active());
    }

    #[test]
    fn window_extends_on_every_edge() {
        let mut input = DigitalInput::new();
        input.on_edge(10);
        input.on_edge(13);
        input.on_tick(15, || false);
        assert!(input.is_active(), "deadline moved to 18");
        input.on_tick(18, || false);
        assert!(!input.is_active());
        assert!(!input.is_settling());
    }

    #[test]
    fn short_rising_glitch_is_reverted_at_deadline() {
        let mut input = DigitalInput::new();
        input.on_edge(0);
        input.on_edge(1);
        for now in 1..=DEBOUNCE_MS {
            input.on_tick(now, || false);
            assert!(input.is_active());
        }
        input.on_tick(DEBOUNCE_MS + 1, || false);
        assert!(!input.is_active());
    }

    #[test]
    fn short_falling_glitch_never_changes_level() {
        let mut input = DigitalInput::new();
        input.seed(true);
        input.on_edge(40);
        assert!(input.is_active());
        input.on_edge(41);
        for now in 41..60 {
            input.on_tick(now, || true);
            assert!(input.is_active());
        }
    }

    #[test]
    fn release_is_published_at_deadline() {
        let mut input = DigitalInput::new();
        input.seed(true);
        input.on_edge(250);
        input.on_tick(254, || false);
        assert!(input.is_active());
        input.on_tick(255, || false);
        assert!(!input.is_active());
    }

    #[test]
    fn idle_input_ignores_ticks() {
        let mut input = DigitalInput::new();
        input.on_tick(3, || true);
        assert!(!input.is_active());
    }

    #[test]
    fn resync_resamples_on_next_tick() {
        let mut input = DigitalInput::new();
        input.resync(7);
        input.on_tick(7, || true);
        assert!(input.is_active());
        assert!(!input.is_settling());
    }

    #[test]
    fn levels_follow_channels() {
        let mut set = InputSet::new();
        set.get_mut(InputChannel::HighBeam).seed(true);
        set.get_mut(InputChannel::Switch2).on_edge(0);
        let levels = set.levels();
        assert!(levels.is_active(InputChannel::HighBeam));
        assert!(levels.switch2());
        assert!(!levels.ignition());
        assert!(!levels.is_active(InputChannel::Reverse));
    }

    struct Raw([bool; 6]);

    impl InputSensor for Raw {
        fn is_active(&self, channel: InputChannel) -> bool {
            self.0[channel.index()]
        }
    }

    #[test]
    fn lost_falling_edge_is_recovered() {
        let mut set = InputSet::new();
        set.get_mut(InputChannel::Ignition).seed(true);

        let mut rising = Vec::new();
        set.on_tick(10, &Raw([false; 6]), |c| rising.push(c));
        assert!(rising.is_empty());
        assert!(set.get(InputChannel::Ignition).is_settling());
        assert!(set.levels().ignition(), "falling waits for the window");

        set.on_tick(10 + DEBOUNCE_MS, &Raw([false; 6]), |c| rising.push(c));
        assert!(!set.levels().ignition());
    }

    #[test]
    fn lost_rising_edge_is_reported() {
        let mut set = InputSet::new();
        let mut raw = [false; 6];
        raw[InputChannel::Switch1.index()] = true;

        let mut rising = Vec::new();
        set.on_tick(3, &Raw(raw), |c| rising.push(c));
        assert_eq!(rising, [InputChannel::Switch1]);
        assert!(set.levels().switch1());

        set.on_tick(4, &Raw(raw), |c| rising.push(c));
        assert_eq!(rising.len(), 1, "settling channel is not recovered twice");
    }

    #[test]
    fn settling_input_is_not_recovered() {
        let mut input = DigitalInput::new();
        input.on_edge(0);
        assert!(!input.recover(1, false));
        assert!(input.is_active());
    }

    #[test]
    fn automatic_channels() {
        let automatic: Vec<_> = InputChannel::ALL
            .into_iter()
            .filter(|c| c.is_automatic())
            .collect();
        assert_eq!(automatic, [InputChannel::Reverse, InputChannel::HighBeam]);
    }
}
