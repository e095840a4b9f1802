//! Board-facing seams: bus selection, sensors and randomness

/// Which device owns the shared SPI bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusDevice {
    /// All chip selects released
    None,
    Display,
    Storage,
    Nonvolatile,
    /// Bus released and peripheral power cut
    Off,
}

/// Chip select lines driven low (`true`) for a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipSelects {
    pub display: bool,
    pub storage: bool,
    pub nonvolatile: bool,
}

impl BusDevice {
    /// Lines to drive low. Each device asserts only its own line; `Off`
    /// pulls every line low so nothing back-powers the switched rail.
    pub const fn chip_selects(self) -> ChipSelects {
        let off = matches!(self, BusDevice::Off);
        ChipSelects {
            display: off || matches!(self, BusDevice::Display),
            storage: off || matches!(self, BusDevice::Storage),
            nonvolatile: off || matches!(self, BusDevice::Nonvolatile),
        }
    }
}

/// Routes the shared bus to one device at a time
pub trait BusSelect {
    fn select(&mut self, device: BusDevice);
}

/// A sensor read failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorFault;

/// Live inputs sampled once per wake cycle
pub trait Sensors {
    /// Calibrated battery voltage
    fn battery_voltage(&mut self) -> Result<f32, SensorFault>;
    /// Raw 12-bit toggle matrix, bit set = switch on
    fn toggle_switches(&mut self) -> u16;
    /// Refresh button held through the debug hold window at boot
    fn debug_requested(&mut self) -> bool;
}

/// Source of randomness for shuffle selection
pub trait RandomSource {
    fn next_u32(&mut self) -> Result<u32, SensorFault>;
}

/// What woke the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// Power-on or reset
    Reset,
    /// Refresh button
    Button,
    /// Wake timer
    Rtc,
}

impl WakeReason {
    /// Resolve the raw wake flags; the button wins when both are set
    pub const fn from_flags(button: bool, rtc: bool) -> Self {
        if button {
            WakeReason::Button
        } else if rtc {
            WakeReason::Rtc
        } else {
            WakeReason::Reset
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            WakeReason::Reset => "WAKE_REASON_RESET",
            WakeReason::Button => "WAKE_REASON_STBY_REFRESH_BTN",
            WakeReason::Rtc => "WAKE_REASON_STBY_RTC",
        }
    }
}

/// Decoded toggle matrix
///
/// ```text
/// bit  11 10  9  8  7  6  5  4  3  2  1  0
///       |  |  |------ interval value -----|
///       |  +- shuffle
///       +---- refresh enabled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleSwitches {
    pub refresh_enabled: bool,
    pub shuffle: bool,
    /// Refresh interval in hours, 0 selects the 24 hour default
    pub interval_hours: u16,
}

impl ToggleSwitches {
    const REFRESH_BIT: u16 = 1 << 11;
    const SHUFFLE_BIT: u16 = 1 << 10;
    const INTERVAL_MASK: u16 = 0x03FF;

    pub const fn from_bits(bits: u16) -> Self {
        Self {
            refresh_enabled: bits & Self::REFRESH_BIT != 0,
            shuffle: bits & Self::SHUFFLE_BIT != 0,
            interval_hours: bits & Self::INTERVAL_MASK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chip_selects_exclusive() {
        for device in [
            BusDevice::None,
            BusDevice::Display,
            BusDevice::Storage,
            BusDevice::Nonvolatile,
        ] {
            let cs = device.chip_selects();
            let low = [cs.display, cs.storage, cs.nonvolatile]
                .iter()
                .filter(|low| **low)
                .count();
            assert!(low <= 1, "{device:?} asserts {low} chip selects");
        }
        assert!(BusDevice::Storage.chip_selects().storage);
        assert!(!BusDevice::Storage.chip_selects().display);
        assert_eq!(
            BusDevice::None.chip_selects(),
            ChipSelects {
                display: false,
                storage: false,
                nonvolatile: false,
            }
        );
    }

    #[test]
    fn test_off_drives_every_line_low() {
        assert_eq!(
            BusDevice::Off.chip_selects(),
            ChipSelects {
                display: true,
                storage: true,
                nonvolatile: true,
            }
        );
    }

    #[test]
    fn test_wake_reason_button_wins() {
        assert_eq!(WakeReason::from_flags(true, true), WakeReason::Button);
        assert_eq!(WakeReason::from_flags(false, true), WakeReason::Rtc);
        assert_eq!(WakeReason::from_flags(false, false), WakeReason::Reset);
    }

    #[test]
    fn test_toggle_switch_fields() {
        let switches = ToggleSwitches::from_bits(0b1100_0000_1100);
        assert!(switches.refresh_enabled);
        assert!(switches.shuffle);
        assert_eq!(switches.interval_hours, 12);

        // Bits above 11 are ignored
        let high = ToggleSwitches::from_bits(0xF000 | 0b1000_0000_0110);
        assert!(high.refresh_enabled);
        assert!(!high.shuffle);
        assert_eq!(high.interval_hours, 6);

        let off = ToggleSwitches::from_bits(0);
        assert!(!off.refresh_enabled);
        assert_eq!(off.interval_hours, 0);
    }
}
