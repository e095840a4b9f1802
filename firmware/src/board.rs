//! Board wiring: shared SPI chip selects, sensors and the hardware RNG
//!
//! Pin map (ESP32-S3):
//!
//! ```text
//! SPI2   SCK=GPIO39  MOSI=GPIO41  MISO=GPIO40
//! CS     display=GPIO9  sd=GPIO38  fram=GPIO21   (active low)
//! EPD    DC=GPIO8  RST=GPIO12  BUSY=GPIO13
//! AUX    power enable=GPIO14                      (active high)
//! KEY    refresh button=GPIO4                     (active low, EXT0 wake)
//! LED    debug=GPIO42                             (active low)
//! BATT   ADC1 on GPIO1, 1:2 divider
//! DIP    rows=GPIO15/16/17  columns=GPIO5/6/7/18  (active low)
//! ```

use core::cell::RefCell;
use core::convert::Infallible;

use aeon_core::board::{BusDevice, BusSelect, RandomSource, SensorFault, Sensors};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin};
use esp_hal::analog::adc::{Adc, AdcPin};
use esp_hal::delay::Delay;
use esp_hal::gpio::{Input, Level, Output};
use esp_hal::peripherals::{ADC1, GPIO1};
use esp_hal::rng::Rng;
use esp_hal::Blocking;
use log::debug;

/// Full-scale battery voltage at the ADC input after the divider
const BATTERY_FULL_SCALE_VOLTS: f32 = 6.14;

/// Largest raw 12-bit ADC reading
const ADC_MAX: f32 = 4095.0;

/// The three chip-select lines plus the auxiliary power switch
pub struct ChipSelectLines {
    display: Output<'static>,
    storage: Output<'static>,
    nonvolatile: Output<'static>,
    aux_power: Output<'static>,
}

fn cs_level(asserted: bool) -> Level {
    if asserted { Level::Low } else { Level::High }
}

impl ChipSelectLines {
    pub fn new(
        display: Output<'static>,
        storage: Output<'static>,
        nonvolatile: Output<'static>,
        aux_power: Output<'static>,
    ) -> Self {
        Self {
            display,
            storage,
            nonvolatile,
            aux_power,
        }
    }

    /// Drive the lines for `device`. `Off` also cuts the auxiliary rail.
    pub fn apply(&mut self, device: BusDevice) {
        let lines = device.chip_selects();
        self.display.set_level(cs_level(lines.display));
        self.storage.set_level(cs_level(lines.storage));
        self.nonvolatile.set_level(cs_level(lines.nonvolatile));
        if device == BusDevice::Off {
            self.aux_power.set_low();
        }
    }
}

/// Chip select for one device on the shared bus.
///
/// Asserting selects `device` (deselecting the others); releasing selects
/// nothing. Used as the CS pin of each `RefCellDevice`.
pub struct SelectLine<'a> {
    lines: &'a RefCell<ChipSelectLines>,
    device: BusDevice,
}

impl<'a> SelectLine<'a> {
    pub fn new(lines: &'a RefCell<ChipSelectLines>, device: BusDevice) -> Self {
        Self { lines, device }
    }
}

impl ErrorType for SelectLine<'_> {
    type Error = Infallible;
}

impl OutputPin for SelectLine<'_> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.lines.borrow_mut().apply(self.device);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.lines.borrow_mut().apply(BusDevice::None);
        Ok(())
    }
}

/// Bus ownership requests from the wake-cycle controller
pub struct BusLines<'a> {
    lines: &'a RefCell<ChipSelectLines>,
}

impl<'a> BusLines<'a> {
    pub fn new(lines: &'a RefCell<ChipSelectLines>) -> Self {
        Self { lines }
    }
}

impl BusSelect for BusLines<'_> {
    fn select(&mut self, device: BusDevice) {
        self.lines.borrow_mut().apply(device);
    }
}

/// Battery ADC, toggle-switch matrix and the refresh button
pub struct FrameSensors {
    pub adc: Adc<'static, ADC1<'static>, Blocking>,
    pub battery_pin: AdcPin<GPIO1<'static>, ADC1<'static>>,
    /// Driven low one at a time, most significant nibble first
    pub rows: [Output<'static>; 3],
    pub columns: [Input<'static>; 4],
    pub button: Input<'static>,
    pub led: Output<'static>,
    pub delay: Delay,
}

impl FrameSensors {
    fn led_on(&mut self) {
        self.led.set_low();
    }

    fn led_off(&mut self) {
        self.led.set_high();
    }
}

impl Sensors for FrameSensors {
    fn battery_voltage(&mut self) -> Result<f32, SensorFault> {
        let reading = nb::block!(self.adc.read_oneshot(&mut self.battery_pin));
        let raw: u16 = reading.map_err(|_| SensorFault)?;
        Ok(f32::from(raw) / ADC_MAX * BATTERY_FULL_SCALE_VOLTS)
    }

    fn toggle_switches(&mut self) -> u16 {
        let mut bits = 0u16;
        for row in 0..self.rows.len() {
            for (i, line) in self.rows.iter_mut().enumerate() {
                line.set_level(cs_level(i == row));
            }
            self.delay.delay_ms(1);

            let nibble = self
                .columns
                .iter()
                .enumerate()
                .fold(0u16, |acc, (i, column)| {
                    acc | (u16::from(column.is_high()) << i)
                });
            bits = (bits << 4) | nibble;
        }
        for line in self.rows.iter_mut() {
            line.set_high();
        }

        let switches = !bits & 0x0FFF;
        debug!("Toggle switches: {:#05x}", switches);
        switches
    }

    fn debug_requested(&mut self) -> bool {
        if self.button.is_high() {
            return false;
        }

        self.led_on();
        self.delay.delay_ms(1000);
        if self.button.is_high() {
            self.led_off();
            return false;
        }

        for _ in 0..10 {
            self.led_on();
            self.delay.delay_ms(50);
            self.led_off();
            self.delay.delay_ms(50);
        }
        true
    }
}

/// On-chip true random number generator
pub struct HardwareRng(Rng);

impl HardwareRng {
    pub fn new() -> Self {
        Self(Rng::new())
    }
}

impl Default for HardwareRng {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for HardwareRng {
    fn next_u32(&mut self) -> Result<u32, SensorFault> {
        Ok(self.0.random())
    }
}
