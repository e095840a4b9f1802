//! Per-cycle journal: battery CSV rows and the captured debug log

use core::fmt::{self, Write as FmtWrite};

use heapless::{String, Vec};

use crate::board::WakeReason;
use crate::fram::SleepReason;

/// First line of the battery CSV
pub const CSV_HEADER: &str =
    "BootIteration,BatteryVoltage,WakeReason,SleepReason,SleepDurationSeconds\r\n";

/// What happened in one wake cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleRecord {
    pub cycle: u32,
    pub battery_voltage: f32,
    pub wake_reason: WakeReason,
    pub sleep_reason: SleepReason,
    pub sleep_seconds: u32,
}

impl fmt::Display for CycleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{:.2},{},{},{}\r\n",
            self.cycle,
            self.battery_voltage,
            self.wake_reason.as_str(),
            self.sleep_reason.as_str(),
            self.sleep_seconds
        )
    }
}

impl CycleRecord {
    /// The CSV row for this cycle, line ending included
    pub fn csv_row(&self) -> String<128> {
        let mut row = String::new();
        let _ = write!(row, "{}", self);
        row
    }
}

/// Name of the debug log written for cycle `cycle`: the cycle in eight hex
/// digits, so every name fits the FAT 8.3 limit
pub fn log_file_name(cycle: u32) -> String<16> {
    let mut name = String::new();
    let _ = write!(name, "{:08X}.LOG", cycle);
    name
}

/// Fixed-size capture of log output. Writes past capacity are dropped.
pub struct DebugLog<const N: usize> {
    buf: Vec<u8, N>,
    truncated: bool,
}

impl<const N: usize> DebugLog<N> {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            truncated: false,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Some output was dropped for lack of room
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

impl<const N: usize> Default for DebugLog<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FmtWrite for DebugLog<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for &byte in s.as_bytes() {
            if self.buf.push(byte).is_err() {
                self.truncated = true;
                break;
            }
        }
        Ok(())
    }
}
