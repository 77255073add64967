//! Indicator LED effect engine.
//!
//! The tick context advances an [`Animation`] (breathing phase, horn hue,
//! flash phase). The main loop turns the indicator modes plus a copy of the
//! animation into a [`Frame`] and hands it to a [`LedRenderer`], which only
//! writes the channels whose level changed.
//!
//! # Waveforms
//!
//! All smooth effects sample one quarter-wave table. An 8-bit angle covers a
//! full period; bits 6..7 select the quadrant:
//!
//! ```text
//! quadrant  0: table[a]        1: table[63 - a]
//!           2: 255 - table[a]  3: 255 - table[63 - a]
//! ```

use crate::hal::{LEVEL_OFF, LEVEL_ON, OutputChannel, OutputDriver};
use crate::timing::{BREATHE_STEP_MS, FLASH_HALF_PERIOD_MS, HUE_IGNITION_START, HUE_STEP_MS};

/// First quarter of a sine wave offset to 128, 64 samples.
const QUARTER_SINE: [u8; 64] = [
    128, 131, 134, 137, 140, 143, 146, 149, //
    152, 155, 158, 162, 165, 167, 170, 173, //
    176, 179, 182, 185, 188, 190, 193, 196, //
    198, 201, 203, 206, 208, 211, 213, 215, //
    218, 220, 222, 224, 226, 228, 230, 232, //
    234, 235, 237, 238, 240, 241, 243, 244, //
    245, 246, 248, 249, 250, 250, 251, 252, //
    253, 253, 254, 254, 254, 255, 255, 255,
];

/// Sine wave centred on 128. `angle` 0..=255 is one full period.
pub fn sine(angle: u8) -> u8 {
    let quadrant = angle >> 6;
    let mut index = angle & 0x3F;
    if quadrant & 0x01 != 0 {
        index = 63 - index;
    }
    let value = QUARTER_SINE[usize::from(index)];
    if quadrant & 0x02 != 0 {
        255 - value
    } else {
        value
    }
}

/// Positive half of [`sine`] stretched to 0..=254; the negative half is 0.
pub fn sine_peak(angle: u8) -> u8 {
    let value = sine(angle);
    if value >= 128 { (value - 128) << 1 } else { 0 }
}

/// Indicator behaviour of a single-colour LED.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IndicatorMode {
    #[default]
    Off,
    On,
    /// Sine-shaped intensity cycle
    Breathe,
    /// 50 % square wave
    Flash,
}

/// Colour of the horn switch indicator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub const OFF: Rgb = Rgb {
        red: 0,
        green: 0,
        blue: 0,
    };
}

/// Colour wheel position `angle` (0..=255).
///
/// The three channels are windows over the same sine table: red peaks at 0,
/// green at 85 and blue at 170, each fading out before the next one peaks.
pub fn hue_rgb(angle: u8) -> Rgb {
    // 3/4 of 255 always fits in a u8.
    let scaled = (u16::from(angle) * 3 / 4) as u8;

    let red = if angle < 85 {
        sine_peak(scaled.wrapping_add(64))
    } else if angle >= 170 {
        sine_peak(scaled.wrapping_sub(128))
    } else {
        0
    };
    let green = if angle <= 170 { sine_peak(scaled) } else { 0 };
    let blue = if angle < 85 {
        0
    } else {
        sine_peak(scaled.wrapping_sub(64))
    };

    Rgb { red, green, blue }
}

/// What the horn switch indicator shows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RgbMode {
    #[default]
    Off,
    /// Colour wheel position
    Hue(u8),
    /// Horn sounding: flashing red
    HornAlert,
}

impl RgbMode {
    /// Mode for the given published inputs and current hue.
    pub fn select(ignition: bool, horn_switch: bool, hue: Option<u8>) -> Self {
        match (ignition, horn_switch, hue) {
            (false, _, _) => RgbMode::Off,
            (true, true, _) => RgbMode::HornAlert,
            (true, false, Some(angle)) => RgbMode::Hue(angle),
            (true, false, None) => RgbMode::Off,
        }
    }
}

/// Tick-driven animation phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Animation {
    breathe_ms: u8,
    breathe_phase: u8,
    hue_ms: u8,
    hue_next: u8,
    hue: Option<u8>,
    flash_ms: u16,
}

impl Default for Animation {
    fn default() -> Self {
        Self::new()
    }
}

impl Animation {
    /// Breathing phase parked on the table peak.
    pub const BREATHE_PEAK: u8 = 64;

    pub const fn new() -> Self {
        Self {
            breathe_ms: 0,
            breathe_phase: Self::BREATHE_PEAK,
            hue_ms: 0,
            hue_next: HUE_IGNITION_START,
            hue: None,
            flash_ms: 0,
        }
    }

    /// One tick of every effect.
    ///
    /// * `ignition`, `horn_switch` - published input levels
    /// * `breathing` - true while at least one indicator is in BREATHE mode
    pub fn advance(&mut self, ignition: bool, horn_switch: bool, breathing: bool) {
        self.advance_hue(ignition, horn_switch);
        self.advance_breathe(breathing);
        self.flash_ms = (self.flash_ms + 1) % (2 * FLASH_HALF_PERIOD_MS);
    }

    fn advance_hue(&mut self, ignition: bool, horn_switch: bool) {
        if !ignition {
            self.hue_ms = 0;
            self.hue_next = HUE_IGNITION_START;
            self.hue = None;
        } else if horn_switch {
            // Restart the wheel at red, first step on the tick after release.
            self.hue_ms = HUE_STEP_MS;
            self.hue_next = 0;
        } else {
            self.hue_ms = self.hue_ms.saturating_add(1);
            if self.hue_ms >= HUE_STEP_MS {
                self.hue_ms = 0;
                self.hue = Some(self.hue_next);
                self.hue_next = self.hue_next.wrapping_add(1);
            }
        }
    }

    fn advance_breathe(&mut self, breathing: bool) {
        self.breathe_ms = self.breathe_ms.saturating_add(1);
        if self.breathe_ms >= BREATHE_STEP_MS {
            self.breathe_ms = 0;
            self.breathe_phase = if breathing {
                self.breathe_phase.wrapping_add(1)
            } else {
                Self::BREATHE_PEAK
            };
        }
    }

    pub fn breathe_phase(&self) -> u8 {
        self.breathe_phase
    }

    /// Current colour wheel position, `None` until the first step after
    /// ignition on.
    pub fn hue(&self) -> Option<u8> {
        self.hue
    }

    pub fn flash_lit(&self) -> bool {
        self.flash_ms < FLASH_HALF_PERIOD_MS
    }

    /// Level of a single-colour indicator in `mode`.
    pub fn level(&self, mode: IndicatorMode) -> u8 {
        match mode {
            IndicatorMode::Off => LEVEL_OFF,
            IndicatorMode::On => LEVEL_ON,
            IndicatorMode::Breathe => sine(self.breathe_phase),
            IndicatorMode::Flash => {
                if self.flash_lit() {
                    LEVEL_ON
                } else {
                    LEVEL_OFF
                }
            }
        }
    }

    /// Colour of the horn switch indicator in `mode`.
    pub fn color(&self, mode: RgbMode) -> Rgb {
        match mode {
            RgbMode::Off => Rgb::OFF,
            RgbMode::Hue(angle) => hue_rgb(angle),
            RgbMode::HornAlert => Rgb {
                red: self.level(IndicatorMode::Flash),
                green: 0,
                blue: 0,
            },
        }
    }
}

/// Indicator levels for one main-loop pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    pub switch1: u8,
    pub switch2: u8,
    pub horn: Rgb,
}

impl Frame {
    /// Everything dark.
    pub const DARK: Frame = Frame {
        switch1: 0,
        switch2: 0,
        horn: Rgb::OFF,
    };

    pub fn compose(switches: [IndicatorMode; 2], horn: RgbMode, animation: &Animation) -> Self {
        let [switch1, switch2] = switches;
        Self {
            switch1: animation.level(switch1),
            switch2: animation.level(switch2),
            horn: animation.color(horn),
        }
    }

    fn levels(&self) -> [(OutputChannel, u8); 5] {
        [
            (OutputChannel::Switch1Led, self.switch1),
            (OutputChannel::Switch2Led, self.switch2),
            (OutputChannel::HornLedRed, self.horn.red),
            (OutputChannel::HornLedGreen, self.horn.green),
            (OutputChannel::HornLedBlue, self.horn.blue),
        ]
    }
}

/// Writes frames to the driver, skipping unchanged channels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LedRenderer {
    last: Option<Frame>,
}

impl LedRenderer {
    pub const fn new() -> Self {
        Self { last: None }
    }

    pub fn render<D: OutputDriver + ?Sized>(&mut self, frame: Frame, driver: &mut D) {
        let previous = self.last.map(|last| last.levels());
        for (i, (channel, level)) in frame.levels().into_iter().enumerate() {
            let unchanged = previous.is_some_and(|levels| levels[i].1 == level);
            if !unchanged {
                driver.set_level(channel, level);
            }
        }
        self.last = Some(frame);
    }

    /// Forgets what the driver shows so the next frame is written in full.
    pub fn invalidate(&mut self) {
        self.last = None;
    }
}
