//! Aeon Frame Firmware - ESP32-S3 E-Paper Photo Frame
//!
//! Every boot is one wake cycle: read the switches, battery and persisted
//! state, maybe show the next image from the SD card, then deep sleep until
//! the RTC timer or the refresh button wakes the board again.
//!
//! Optional build-time environment variables:
//! - AEON_FORCE_DEBUG: treat every cycle as a debug cycle (debug logging,
//!   capture written to the SD card)

#![no_std]
#![no_main]

use core::cell::RefCell;
use core::time::Duration as CoreDuration;

use aeon_core::board::{BusDevice, WakeReason};
use aeon_core::controller::Hardware;
use aeon_core::fram::SpiFram;
use aeon_core::{FrameConfig, PersistentState, WakeController};
use aeon_frame_firmware::board::{BusLines, ChipSelectLines, FrameSensors, HardwareRng, SelectLine};
use aeon_frame_firmware::epd::SpectraPanel;
use aeon_frame_firmware::logger;
use aeon_frame_firmware::sd::SdLibrary;
use embedded_hal_bus::spi::RefCellDevice;
use esp_backtrace as _;
use esp_hal::{
    analog::adc::{Adc, AdcConfig, Attenuation},
    clock::CpuClock,
    delay::Delay,
    gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull},
    rtc_cntl::{
        Rtc,
        sleep::{Ext0WakeupSource, TimerWakeupSource, WakeupLevel},
    },
    spi::{
        Mode,
        master::{Config as SpiConfig, Spi},
    },
    system::SleepSource,
    time::Rate,
};
use esp_println::println;
use log::LevelFilter;

esp_bootloader_esp_idf::esp_app_desc!();

const FORCE_DEBUG: bool = option_env!("AEON_FORCE_DEBUG").is_some();

#[esp_hal::main]
fn main() -> ! {
    // Init logger first so we can see any early crashes
    let level = if FORCE_DEBUG {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    logger::init(level);

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    let wake_cause = esp_hal::rtc_cntl::wakeup_cause();
    let wake_reason = WakeReason::from_flags(
        matches!(wake_cause, SleepSource::Ext0),
        matches!(wake_cause, SleepSource::Timer),
    );
    println!("Boot! Wake reason: {}", wake_reason.as_str());

    let delay = Delay::new();

    // ==================== Auxiliary Power ====================
    // FRAM, SD card and panel all sit on the switched rail
    let aux_power = Output::new(peripherals.GPIO14, Level::High, OutputConfig::default());
    delay.delay_millis(10);

    // ==================== Shared SPI Bus ====================
    // SCK=GPIO39, MOSI=GPIO41, MISO=GPIO40; CS display=GPIO9, SD=GPIO38, FRAM=GPIO21
    let lines = RefCell::new(ChipSelectLines::new(
        Output::new(peripherals.GPIO9, Level::High, OutputConfig::default()),
        Output::new(peripherals.GPIO38, Level::High, OutputConfig::default()),
        Output::new(peripherals.GPIO21, Level::High, OutputConfig::default()),
        aux_power,
    ));

    let spi_bus = RefCell::new(
        Spi::new(
            peripherals.SPI2,
            SpiConfig::default()
                .with_frequency(Rate::from_mhz(10))
                .with_mode(Mode::_0),
        )
        .expect("SPI init failed")
        .with_sck(peripherals.GPIO39)
        .with_mosi(peripherals.GPIO41)
        .with_miso(peripherals.GPIO40),
    );

    let fram_cs = SelectLine::new(&lines, BusDevice::Nonvolatile);
    let fram_spi = RefCellDevice::new(&spi_bus, fram_cs, Delay::new()).expect("FRAM CS");
    let sd_cs = SelectLine::new(&lines, BusDevice::Storage);
    let sd_spi = RefCellDevice::new(&spi_bus, sd_cs, Delay::new()).expect("SD CS");
    let panel_cs = SelectLine::new(&lines, BusDevice::Display);
    let panel_spi = RefCellDevice::new(&spi_bus, panel_cs, Delay::new()).expect("EPD CS");

    // Inputs idle high; switches and the button pull to ground
    let pull_up = || InputConfig::default().with_pull(Pull::Up);

    // ==================== E-Paper Display ====================
    // DC=GPIO8, RST=GPIO12, BUSY=GPIO13
    let panel = SpectraPanel::new(
        panel_spi,
        Input::new(peripherals.GPIO13, pull_up()),
        Output::new(peripherals.GPIO8, Level::Low, OutputConfig::default()),
        Output::new(peripherals.GPIO12, Level::High, OutputConfig::default()),
        Delay::new(),
    );

    // ==================== Sensors ====================
    let mut adc_config = AdcConfig::new();
    let battery_pin = adc_config.enable_pin(peripherals.GPIO1, Attenuation::_11dB);
    let sensors = FrameSensors {
        adc: Adc::new(peripherals.ADC1, adc_config),
        battery_pin,
        // DIP switch matrix: rows GPIO15/16/17, columns GPIO5/6/7/18
        rows: [
            Output::new(peripherals.GPIO15, Level::High, OutputConfig::default()),
            Output::new(peripherals.GPIO16, Level::High, OutputConfig::default()),
            Output::new(peripherals.GPIO17, Level::High, OutputConfig::default()),
        ],
        columns: [
            Input::new(peripherals.GPIO5, pull_up()),
            Input::new(peripherals.GPIO6, pull_up()),
            Input::new(peripherals.GPIO7, pull_up()),
            Input::new(peripherals.GPIO18, pull_up()),
        ],
        button: Input::new(peripherals.GPIO4, pull_up()),
        led: Output::new(peripherals.GPIO42, Level::High, OutputConfig::default()),
        delay: Delay::new(),
    };

    // ==================== Wake Cycle ====================
    let mut hw = Hardware {
        bus: BusLines::new(&lines),
        sensors,
        rng: HardwareRng::new(),
        library: SdLibrary::new(sd_spi, Delay::new()),
        display: panel,
    };

    let frame_config = FrameConfig::DEFAULT.with_force_debug(FORCE_DEBUG);
    let state = PersistentState::new(SpiFram::new(fram_spi));
    let mut controller = WakeController::new(state, frame_config);
    let plan = controller.run(wake_reason, &mut hw);

    println!(
        "Cycle {} done: {} for {} seconds (debug {})",
        plan.cycle,
        plan.reason.as_str(),
        plan.seconds,
        plan.debug_mode
    );

    // ==================== Deep Sleep ====================
    drop(hw);

    // Reclaim GPIO4 for deep sleep wake source
    let key_pin = unsafe { esp_hal::peripherals::GPIO4::steal() };
    let mut rtc = Rtc::new(peripherals.LPWR);
    enter_deep_sleep(&mut rtc, key_pin, &delay, plan.seconds)
}

/// Enter deep sleep with timer and KEY button (GPIO4) wake sources
fn enter_deep_sleep<P: esp_hal::gpio::RtcPinWithResistors>(
    rtc: &mut Rtc,
    key_pin: P,
    delay: &Delay,
    seconds: u32,
) -> ! {
    let timer = TimerWakeupSource::new(CoreDuration::from_secs(u64::from(seconds)));

    // Enable internal pull-up on GPIO4 so it doesn't float and trigger spurious wakes
    key_pin.rtcio_pullup(true);
    key_pin.rtcio_pulldown(false);

    // GPIO4 KEY button is active low (button pulls to ground when pressed)
    let ext0 = Ext0WakeupSource::new(key_pin, WakeupLevel::Low);

    // Small delay to let serial output flush
    delay.delay_millis(100);

    // Enter deep sleep (never returns - device reboots on wake)
    rtc.sleep_deep(&[&timer, &ext0])
}
