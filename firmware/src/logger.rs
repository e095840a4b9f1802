//! Serial logger with an in-RAM capture
//!
//! Every record goes to the serial console through `esp-println` and into a
//! fixed-size [`DebugLog`], which the SD library writes out at the end of a
//! debug cycle.

use core::cell::RefCell;
use core::fmt::Write as FmtWrite;

use aeon_core::config::DEBUG_LOG_CAPACITY;
use aeon_core::journal::DebugLog;
use critical_section::Mutex;
use esp_println::println;
use log::{LevelFilter, Log, Metadata, Record};

static CAPTURE: Mutex<RefCell<DebugLog<DEBUG_LOG_CAPACITY>>> =
    Mutex::new(RefCell::new(DebugLog::new()));

static LOGGER: FrameLogger = FrameLogger;

struct FrameLogger;

impl Log for FrameLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        println!("{} - {}", record.level(), record.args());
        critical_section::with(|cs| {
            let mut capture = CAPTURE.borrow_ref_mut(cs);
            let _ = write!(capture, "{} - {}\r\n", record.level(), record.args());
        });
    }

    fn flush(&self) {}
}

/// Install the logger. Call once, before anything logs.
pub fn init(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

/// Copy captured bytes starting at `offset` into `buf`, returning how many
/// were copied. Zero means the end of the capture.
///
/// Copies in windows so the critical section never spans an SD write.
pub fn read_capture(offset: usize, buf: &mut [u8]) -> usize {
    critical_section::with(|cs| {
        let capture = CAPTURE.borrow_ref(cs);
        let bytes = capture.as_bytes().get(offset..).unwrap_or(&[]);
        let len = bytes.len().min(buf.len());
        buf[..len].copy_from_slice(&bytes[..len]);
        len
    })
}

/// Whether the capture ran out of room
pub fn capture_truncated() -> bool {
    critical_section::with(|cs| CAPTURE.borrow_ref(cs).is_truncated())
}
