//! Host test bench: mock board plus a driver loop that interleaves one tick
//! and one main-loop pass per simulated millisecond.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use atv_control::device::{Controller, Shared, Step};
use atv_control::hal::{InputSensor, LEVEL_OFF, OutputChannel, OutputDriver, Watchdog};
use atv_control::input::InputChannel;
use atv_control::settings::FlashConfigStore;
use embedded_hal::blocking::delay::DelayUs;
use embedded_storage::nor_flash::{ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash};

/// Something the mock board observed, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Set(OutputChannel, u8),
    Delay(u32),
    Suspend,
    Resume,
    WatchdogPause,
    WatchdogResume,
    FlashErase,
    FlashWrite,
}

#[derive(Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<Event>>>);

impl Journal {
    pub fn push(&self, event: Event) {
        self.0.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    pub fn count(&self, event: Event) -> usize {
        self.0.borrow().iter().filter(|e| **e == event).count()
    }
}

/// Raw input lines, settable from the test.
#[derive(Clone, Default)]
pub struct Lines(Rc<Cell<[bool; 6]>>);

impl Lines {
    fn index(channel: InputChannel) -> usize {
        InputChannel::ALL
            .iter()
            .position(|c| *c == channel)
            .expect("channel listed in ALL")
    }

    pub fn get(&self, channel: InputChannel) -> bool {
        self.0.get()[Self::index(channel)]
    }

    pub fn set(&self, channel: InputChannel, level: bool) {
        let mut lines = self.0.get();
        lines[Self::index(channel)] = level;
        self.0.set(lines);
    }
}

impl InputSensor for Lines {
    fn is_active(&self, channel: InputChannel) -> bool {
        self.get(channel)
    }
}

/// Output driver that keeps the current levels and enforces the horn
/// interlock on every write.
pub struct RecordingDriver {
    levels: [u8; 8],
    suspended: bool,
    journal: Journal,
}

impl RecordingDriver {
    fn index(channel: OutputChannel) -> usize {
        OutputChannel::ALL
            .iter()
            .position(|c| *c == channel)
            .expect("channel listed in ALL")
    }

    pub fn level(&self, channel: OutputChannel) -> u8 {
        self.levels[Self::index(channel)]
    }

    pub fn is_on(&self, channel: OutputChannel) -> bool {
        self.level(channel) != LEVEL_OFF
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }
}

impl OutputDriver for RecordingDriver {
    fn set_level(&mut self, channel: OutputChannel, level: u8) {
        self.levels[Self::index(channel)] = level;
        self.journal.push(Event::Set(channel, level));

        let horn = self.is_on(OutputChannel::Horn);
        let loads = self.is_on(OutputChannel::Output1) || self.is_on(OutputChannel::Output2);
        assert!(!(horn && loads), "horn energized together with a load");
    }

    fn suspend(&mut self) {
        self.suspended = true;
        self.journal.push(Event::Suspend);
    }

    fn resume(&mut self) {
        self.suspended = false;
        self.journal.push(Event::Resume);
    }
}

pub struct FakeWatchdog {
    pub feeds: usize,
    pub paused: bool,
    journal: Journal,
}

impl Watchdog for FakeWatchdog {
    fn feed(&mut self) {
        self.feeds += 1;
    }

    fn pause(&mut self) {
        self.paused = true;
        self.journal.push(Event::WatchdogPause);
    }

    fn resume(&mut self) {
        self.paused = false;
        self.journal.push(Event::WatchdogResume);
    }
}

pub struct JournalDelay(Journal);

impl DelayUs<u32> for JournalDelay {
    fn delay_us(&mut self, us: u32) {
        self.0.push(Event::Delay(us));
    }
}

pub const PAGE: usize = 128;

/// NOR flash in RAM. Clones share their contents, so a clone survives a
/// simulated reboot.
#[derive(Clone)]
pub struct RamFlash {
    bytes: Rc<RefCell<Vec<u8>>>,
    fail_writes: Rc<Cell<bool>>,
    journal: Journal,
}

impl RamFlash {
    pub fn erased(journal: Journal) -> Self {
        Self::with_capacity(8 * PAGE, journal)
    }

    pub fn with_capacity(capacity: usize, journal: Journal) -> Self {
        Self {
            bytes: Rc::new(RefCell::new(vec![0xFF; capacity])),
            fail_writes: Rc::new(Cell::new(false)),
            journal,
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    /// Stored delay, if a record is present.
    pub fn stored_value(&self) -> Option<u32> {
        let bytes = self.bytes.borrow();
        let start = bytes.len() - PAGE;
        let magic = u32::from_le_bytes(bytes[start..start + 4].try_into().ok()?);
        (magic == atv_control::settings::RECORD_MAGIC)
            .then(|| u32::from_le_bytes(bytes[start + 4..start + 8].try_into().unwrap()))
    }

    /// Writes a raw record into the last page.
    pub fn put_record(&self, magic: u32, value: u32) {
        let mut bytes = self.bytes.borrow_mut();
        let start = bytes.len() - PAGE;
        bytes[start..start + 4].copy_from_slice(&magic.to_le_bytes());
        bytes[start + 4..start + 8].copy_from_slice(&value.to_le_bytes());
    }
}

impl ErrorType for RamFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for RamFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let flash = self.bytes.borrow();
        let src = flash
            .get(start..start + bytes.len())
            .ok_or(NorFlashErrorKind::OutOfBounds)?;
        bytes.copy_from_slice(src);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.bytes.borrow().len()
    }
}

impl NorFlash for RamFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = PAGE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if self.fail_writes.get() {
            return Err(NorFlashErrorKind::Other);
        }
        self.journal.push(Event::FlashErase);
        self.bytes.borrow_mut()[from as usize..to as usize].fill(0xFF);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.fail_writes.get() {
            return Err(NorFlashErrorKind::Other);
        }
        self.journal.push(Event::FlashWrite);
        let start = offset as usize;
        let mut flash = self.bytes.borrow_mut();
        for (cell, byte) in flash[start..start + bytes.len()].iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        Ok(())
    }
}

pub type TestController =
    Controller<Lines, RecordingDriver, FakeWatchdog, JournalDelay, FlashConfigStore<RamFlash>>;

pub struct Bench {
    pub shared: Shared,
    pub lines: Lines,
    pub controller: TestController,
    pub journal: Journal,
    pub flash: RamFlash,
    pub asleep: bool,
}

impl Bench {
    /// Fresh board with erased flash, booted until the first sleep or
    /// awake pass.
    pub fn new() -> Self {
        let journal = Journal::default();
        let flash = RamFlash::erased(journal.clone());
        Self::with_flash(flash, journal)
    }

    /// Boots on `flash`, keeping its contents.
    pub fn with_flash(flash: RamFlash, journal: Journal) -> Self {
        Self::with_lines(flash, journal, Lines::default())
    }

    /// Boots with the given raw input levels already applied.
    pub fn with_lines(flash: RamFlash, journal: Journal, lines: Lines) -> Self {
        let store = FlashConfigStore::last_page(flash.clone()).expect("page aligned");
        let driver = RecordingDriver {
            levels: [0; 8],
            suspended: false,
            journal: journal.clone(),
        };
        let watchdog = FakeWatchdog {
            feeds: 0,
            paused: false,
            journal: journal.clone(),
        };
        let controller = Controller::new(
            lines.clone(),
            driver,
            watchdog,
            JournalDelay(journal.clone()),
            store,
        );
        let mut bench = Self {
            shared: Shared::new(),
            lines,
            controller,
            journal,
            flash,
            asleep: false,
        };
        bench.run_ms(2);
        bench
    }

    /// Powers the board down and up again on the same flash.
    pub fn reboot(&self) -> Bench {
        Bench::with_flash(self.flash.clone(), self.journal.clone())
    }

    pub fn driver(&self) -> &RecordingDriver {
        self.controller.driver()
    }

    /// Changes a raw line and delivers the edge.
    pub fn set(&mut self, channel: InputChannel, level: bool) {
        if self.lines.get(channel) == level {
            return;
        }
        self.lines.set(channel, level);
        if self.shared.on_edge(channel) && self.asleep {
            self.asleep = false;
            self.controller.wake(&self.shared);
        }
    }

    /// Changes a raw line without delivering its edge, as when the edge
    /// interrupt was lost.
    pub fn set_quiet(&mut self, channel: InputChannel, level: bool) {
        self.lines.set(channel, level);
    }

    /// Advances simulated time: one tick and one main-loop pass per ms.
    /// Nothing runs while asleep.
    pub fn run_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            if self.asleep {
                return;
            }
            self.shared.on_tick(&self.lines);
            if self.controller.step(&self.shared) == Step::Sleep {
                self.asleep = true;
            }
        }
    }

    /// Runs until `done` holds, at most `limit` ms. Returns the elapsed time.
    pub fn run_until(&mut self, limit: u32, mut done: impl FnMut(&Bench) -> bool) -> u32 {
        for elapsed in 0..limit {
            if done(self) {
                return elapsed;
            }
            self.run_ms(1);
        }
        panic!("condition not reached within {limit} ms");
    }

    /// Press and release with settle time on both edges.
    pub fn click(&mut self, channel: InputChannel) {
        self.set(channel, true);
        self.run_ms(50);
        self.set(channel, false);
        self.run_ms(50);
    }

    pub fn ignition_on(&mut self) {
        self.set(InputChannel::Ignition, true);
        self.run_ms(20);
    }
}
