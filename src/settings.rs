//! Persisted auto-off delay.
//!
//! The only runtime setting is how long a load switched on with the ignition
//! off stays on. It is read once at boot and written back when a programming
//! session commits a new value.
//!
//! # Record layout
//!
//! One 8-byte record at the start of a dedicated erase unit:
//!
//! | Bytes | Content                         |
//! |-------|---------------------------------|
//! | 0..4  | [`RECORD_MAGIC`], little endian |
//! | 4..8  | delay in ms, little endian      |

use embedded_storage::nor_flash::NorFlash;

use crate::timing::{DEFAULT_DELAY_MINUTES, MAX_DELAY_MINUTES, MS_PER_MINUTE};

/// Marks a written record ("ATVD").
pub const RECORD_MAGIC: u32 = 0x4456_5441;

const RECORD_LEN: usize = 8;

/// Time a load stays on after it was switched on with the ignition off.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AutoOffDelay {
    minutes: u8,
}

impl Default for AutoOffDelay {
    fn default() -> Self {
        Self::from_minutes(DEFAULT_DELAY_MINUTES)
    }
}

impl AutoOffDelay {
    /// Loads switched on with the ignition off never stay on.
    pub const DISABLED: AutoOffDelay = AutoOffDelay { minutes: 0 };

    /// Whole minutes, clamped to [`MAX_DELAY_MINUTES`].
    pub const fn from_minutes(minutes: u8) -> Self {
        let minutes = if minutes > MAX_DELAY_MINUTES {
            MAX_DELAY_MINUTES
        } else {
            minutes
        };
        Self { minutes }
    }

    /// Validates a stored millisecond value.
    ///
    /// Only whole minutes up to [`MAX_DELAY_MINUTES`] are accepted.
    pub fn from_millis(ms: u32) -> Option<Self> {
        if ms % MS_PER_MINUTE != 0 {
            return None;
        }
        let minutes = u8::try_from(ms / MS_PER_MINUTE).ok()?;
        (minutes <= MAX_DELAY_MINUTES).then_some(Self { minutes })
    }

    pub fn minutes(&self) -> u8 {
        self.minutes
    }

    pub fn as_millis(&self) -> u32 {
        u32::from(self.minutes) * MS_PER_MINUTE
    }

    pub fn is_disabled(&self) -> bool {
        self.minutes == 0
    }
}

/// Failure while reading or writing the persisted delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError<E> {
    /// Underlying flash operation failed
    Flash(E),
    /// Record present but not written by this firmware
    Corrupt,
    /// Record location does not fit the flash geometry
    Misaligned,
}

impl<E> StoreError<E> {
    /// Short description without the flash error payload.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Flash(_) => "flash access failed",
            StoreError::Corrupt => "record corrupt",
            StoreError::Misaligned => "record misaligned",
        }
    }
}

/// Durable storage for one 32-bit value.
pub trait ConfigStore {
    type Error;

    /// Returns the stored value, or `None` when nothing was ever written.
    fn load(&mut self) -> Result<Option<u32>, StoreError<Self::Error>>;

    fn save(&mut self, value: u32) -> Result<(), StoreError<Self::Error>>;
}

/// [`ConfigStore`] on one erase unit of a NOR flash.
pub struct FlashConfigStore<F> {
    flash: F,
    offset: u32,
}

impl<F: NorFlash> FlashConfigStore<F> {
    /// Uses the erase unit starting at `offset`.
    pub fn new(flash: F, offset: u32) -> Result<Self, StoreError<F::Error>> {
        let aligned = offset as usize % F::ERASE_SIZE == 0
            && RECORD_LEN % F::WRITE_SIZE == 0
            && RECORD_LEN <= F::ERASE_SIZE
            && offset as usize + F::ERASE_SIZE <= flash.capacity();
        if aligned {
            Ok(Self { flash, offset })
        } else {
            Err(StoreError::Misaligned)
        }
    }

    /// Uses the last erase unit of `flash`.
    pub fn last_page(flash: F) -> Result<Self, StoreError<F::Error>> {
        let offset = flash
            .capacity()
            .checked_sub(F::ERASE_SIZE)
            .ok_or(StoreError::Misaligned)?;
        let offset = u32::try_from(offset).map_err(|_| StoreError::Misaligned)?;
        Self::new(flash, offset)
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn into_inner(self) -> F {
        self.flash
    }
}

impl<F: NorFlash> ConfigStore for FlashConfigStore<F> {
    type Error = F::Error;

    fn load(&mut self) -> Result<Option<u32>, StoreError<F::Error>> {
        let mut record = [0u8; RECORD_LEN];
        self.flash
            .read(self.offset, &mut record)
            .map_err(StoreError::Flash)?;

        let [m0, m1, m2, m3, v0, v1, v2, v3] = record;
        let magic = u32::from_le_bytes([m0, m1, m2, m3]);
        let value = u32::from_le_bytes([v0, v1, v2, v3]);

        match magic {
            RECORD_MAGIC => Ok(Some(value)),
            u32::MAX if value == u32::MAX => Ok(None),
            _ => Err(StoreError::Corrupt),
        }
    }

    fn save(&mut self, value: u32) -> Result<(), StoreError<F::Error>> {
        let mut record = [0u8; RECORD_LEN];
        record[..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
        record[4..].copy_from_slice(&value.to_le_bytes());

        let end = self.offset + F::ERASE_SIZE as u32;
        self.flash
            .erase(self.offset, end)
            .map_err(StoreError::Flash)?;
        self.flash
            .write(self.offset, &record)
            .map_err(StoreError::Flash)
    }
}

/// Reads the delay from `store`, falling back to the default.
pub fn load_delay<S: ConfigStore + ?Sized>(store: &mut S) -> AutoOffDelay {
    match store.load() {
        Ok(Some(ms)) => match AutoOffDelay::from_millis(ms) {
            Some(delay) => {
                log_info!("auto-off delay: {} min", delay.minutes());
                delay
            }
            None => {
                log_warn!("stored auto-off delay {} ms out of range, using default", ms);
                AutoOffDelay::default()
            }
        },
        Ok(None) => {
            log_info!("no stored auto-off delay, using default");
            AutoOffDelay::default()
        }
        Err(e) => {
            log_warn!("auto-off delay not loaded ({}), using default", e.kind());
            AutoOffDelay::default()
        }
    }
}
