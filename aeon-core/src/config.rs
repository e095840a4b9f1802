//! Compile-time configuration for the frame

use crate::delivery::Packing;

/// Unconditional sleep used by every "cannot refresh" branch (12 hours)
pub const FALLBACK_SLEEP_SECS: u32 = 12 * 60 * 60;

/// Battery voltage at or below which the frame refuses to refresh
pub const BATTERY_THRESHOLD_VOLTS: f32 = 3.65;

/// Directory holding the `<index>.slc` images
pub const IMAGE_DIR: &str = "images";

/// Extension of displayable images
pub const IMAGE_EXTENSION: &str = "slc";

/// Directory for the battery CSV and debug logs
pub const LOG_DIR: &str = "logfiles";

/// Battery charge log, one CSV row per wake cycle (8.3 name)
pub const BATTERY_LOG_FILE: &str = "battery.csv";

/// Size of the in-RAM debug capture flushed to the SD card
pub const DEBUG_LOG_CAPACITY: usize = 20_000;

/// Tunables for one wake cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameConfig {
    /// Battery voltage at or below which the cycle sleeps with `LowBattery`
    pub battery_threshold_volts: f32,
    /// Duration of the fixed-length fallback sleep
    pub fallback_sleep_secs: u32,
    /// Append a row to the battery CSV before every sleep
    pub battery_logging: bool,
    /// Treat every cycle as a debug cycle
    pub force_debug: bool,
    /// Image width the panel expects, in source pixels
    pub image_width: u16,
    /// Image height the panel expects, in source pixels
    pub image_height: u16,
    /// How decoded pixels are packed into panel bytes
    pub packing: Packing,
}

impl FrameConfig {
    /// Reference hardware: 800x480 Spectra panel fed 400x480 images,
    /// each pixel doubled horizontally.
    pub const DEFAULT: Self = Self {
        battery_threshold_volts: BATTERY_THRESHOLD_VOLTS,
        fallback_sleep_secs: FALLBACK_SLEEP_SECS,
        battery_logging: true,
        force_debug: false,
        image_width: 400,
        image_height: 480,
        packing: Packing::Duplicate,
    };

    /// Same as [`FrameConfig::DEFAULT`] with debug forced on or off
    pub const fn with_force_debug(mut self, force_debug: bool) -> Self {
        self.force_debug = force_debug;
        self
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
