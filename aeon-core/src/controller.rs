//! Wake-cycle controller
//!
//! One call to [`WakeController::run`] is one wake cycle: mark the cycle
//! unsafe, sample every input once, decide, optionally redisplay, then commit
//! the cycle-ending state and hand back how long to sleep.
//!
//! Decision order, first match wins:
//!
//! 1. battery at or below threshold (or unreadable): `LowBattery`, fallback sleep
//! 2. sleep budget pending, not woken by the button, interval unchanged:
//!    `NormalIteration`, next slice of the budget
//! 3. refresh disabled and not woken by the button: `RefreshDisabled`
//! 4. storage unavailable: `NoSdCard`
//! 5. no image to show (or it failed to display): `NoImage`
//! 6. image shown: `FirstAfterRefresh`, first slice of a fresh budget

use log::{info, warn};

use crate::board::{BusDevice, BusSelect, RandomSource, Sensors, ToggleSwitches, WakeReason};
use crate::config::FrameConfig;
use crate::delivery::{DisplaySink, deliver_image};
use crate::fram::{NvMemory, PersistentState, SleepReason};
use crate::journal::CycleRecord;
use crate::library::ImageLibrary;
use crate::selection::select_next_image;
use crate::sleep::sleep_budget;
use crate::slic::SlicDecoder;

/// Everything the decision depends on, sampled once per cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleInputs {
    pub wake_reason: WakeReason,
    /// The previous cycle never reached sleep
    pub unsafe_shutdown: bool,
    /// Label of this cycle
    pub cycle: u32,
    /// `None` when the battery could not be read
    pub battery_voltage: Option<f32>,
    pub debug_mode: bool,
    pub remaining_sleep: u32,
    pub previous_interval: u16,
    pub switches: ToggleSwitches,
    pub storage_available: bool,
}

/// Outcome of the pre-refresh rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Go back to sleep without touching the panel
    Sleep {
        reason: SleepReason,
        seconds: u32,
        /// New remaining budget to persist, if it changes
        remaining: Option<u32>,
    },
    /// Select an image and redisplay
    Refresh,
}

/// Apply rules 1 to 4. `Refresh` means rules 5 and 6 decide after image
/// selection.
pub fn decide(inputs: &CycleInputs, config: &FrameConfig) -> Decision {
    let fallback = |reason| Decision::Sleep {
        reason,
        seconds: config.fallback_sleep_secs,
        remaining: None,
    };

    let battery_low = match inputs.battery_voltage {
        Some(volts) => volts <= config.battery_threshold_volts,
        None => true,
    };
    if battery_low {
        return fallback(SleepReason::LowBattery);
    }

    let button = inputs.wake_reason == WakeReason::Button;
    let interval = inputs.switches.interval_hours;

    if inputs.remaining_sleep != 0 && !button && inputs.previous_interval == interval {
        let budget = sleep_budget(inputs.remaining_sleep, interval);
        return Decision::Sleep {
            reason: SleepReason::NormalIteration,
            seconds: budget.next_sleep,
            remaining: Some(budget.remaining),
        };
    }

    if !inputs.switches.refresh_enabled && !button {
        return fallback(SleepReason::RefreshDisabled);
    }

    if !inputs.storage_available {
        return fallback(SleepReason::NoSdCard);
    }

    Decision::Refresh
}

/// What the caller does next: sleep for `seconds`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepPlan {
    pub seconds: u32,
    pub reason: SleepReason,
    pub cycle: u32,
    pub debug_mode: bool,
}

/// Collaborators driven during one cycle
pub struct Hardware<B, S, R, L, D> {
    pub bus: B,
    pub sensors: S,
    pub rng: R,
    pub library: L,
    pub display: D,
}

/// Runs wake cycles against the persistent record
pub struct WakeController<M> {
    state: PersistentState<M>,
    config: FrameConfig,
}

impl<M: NvMemory> WakeController<M> {
    pub fn new(state: PersistentState<M>, config: FrameConfig) -> Self {
        Self { state, config }
    }

    /// Run one wake cycle. Every failure is absorbed into the returned plan.
    pub fn run<B, S, R, L, D>(
        &mut self,
        wake_reason: WakeReason,
        hw: &mut Hardware<B, S, R, L, D>,
    ) -> SleepPlan
    where
        B: BusSelect,
        S: Sensors,
        R: RandomSource,
        L: ImageLibrary,
        D: DisplaySink,
    {
        info!("Wake reason: {}", wake_reason.as_str());

        let inputs = self.collect_inputs(wake_reason, hw);

        let interval = inputs.switches.interval_hours;
        if let Err(e) = self.state.set_interval_switch_value(interval) {
            warn!("Interval not saved: {:?}", e);
        }
        info!(
            "Interval switch: previous {}, current {}",
            inputs.previous_interval, interval
        );

        let (reason, seconds, remaining) = match decide(&inputs, &self.config) {
            Decision::Sleep {
                reason,
                seconds,
                remaining,
            } => (reason, seconds, remaining),
            Decision::Refresh => self.refresh(&inputs, hw),
        };

        self.finish(&inputs, reason, seconds, remaining, hw)
    }

    fn collect_inputs<B, S, R, L, D>(
        &mut self,
        wake_reason: WakeReason,
        hw: &mut Hardware<B, S, R, L, D>,
    ) -> CycleInputs
    where
        S: Sensors,
        L: ImageLibrary,
    {
        let unsafe_shutdown = match self.state.begin_cycle_unsafe_shutdown_check() {
            Ok(unsafe_shutdown) => unsafe_shutdown,
            Err(e) => {
                warn!("State unreadable ({:?}), assuming unsafe shutdown", e);
                true
            }
        };
        let cycle = match self.state.advance_wake_cycle_count() {
            Ok(cycle) => cycle,
            Err(e) => {
                warn!("Wake cycle count unavailable: {:?}", e);
                0
            }
        };
        info!("Starting cycle {}", cycle);
        let shutdown = if unsafe_shutdown { "UNSAFE" } else { "safe" };
        info!("Previous shutdown was {}", shutdown);

        let battery_voltage = match hw.sensors.battery_voltage() {
            Ok(volts) => {
                info!(
                    "Battery {:.2} V, threshold {:.2} V",
                    volts, self.config.battery_threshold_volts
                );
                Some(volts)
            }
            Err(e) => {
                warn!("Battery read failed: {:?}", e);
                None
            }
        };

        let debug_requested = hw.sensors.debug_requested();
        let debug_mode = debug_requested || unsafe_shutdown || self.config.force_debug;
        if debug_requested {
            info!("Debug mode requested by button");
        } else if unsafe_shutdown {
            info!("Debug mode enabled after unsafe shutdown");
        }

        let remaining_sleep = match self.state.sleep_duration_remaining() {
            Ok(seconds) => seconds,
            Err(e) => {
                warn!("Remaining sleep unreadable: {:?}", e);
                0
            }
        };
        info!("Remaining sleep: {} s", remaining_sleep);
        let previous_interval = match self.state.interval_switch_value() {
            Ok(hours) => hours,
            Err(e) => {
                warn!("Previous interval unreadable: {:?}", e);
                0
            }
        };

        let switches = ToggleSwitches::from_bits(hw.sensors.toggle_switches());

        let storage_available = match hw.library.mount() {
            Ok(()) => true,
            Err(e) => {
                warn!("SD card not available: {:?}", e);
                false
            }
        };

        CycleInputs {
            wake_reason,
            unsafe_shutdown,
            cycle,
            battery_voltage,
            debug_mode,
            remaining_sleep,
            previous_interval,
            switches,
            storage_available,
        }
    }

    /// Rules 5 and 6
    fn refresh<B, S, R, L, D>(
        &mut self,
        inputs: &CycleInputs,
        hw: &mut Hardware<B, S, R, L, D>,
    ) -> (SleepReason, u32, Option<u32>)
    where
        B: BusSelect,
        R: RandomSource,
        L: ImageLibrary,
        D: DisplaySink,
    {
        let no_image = (SleepReason::NoImage, self.config.fallback_sleep_secs, None);

        hw.bus.select(BusDevice::Storage);
        let shuffle = inputs.switches.shuffle;
        let selected = select_next_image(&mut self.state, &mut hw.library, &mut hw.rng, shuffle);
        let Some(name) = selected else {
            info!("No image available to display");
            return no_image;
        };
        info!("Opening image {}", name);

        let image = match hw.library.open(&name) {
            Ok(image) => image,
            Err(e) => {
                warn!("Cannot open {}: {:?}", name, e);
                return no_image;
            }
        };
        let mut decoder = match SlicDecoder::new(image) {
            Ok(decoder) => decoder,
            Err(e) => {
                warn!("{} is not a SLIC image: {:?}", name, e);
                return no_image;
            }
        };
        if let Err(e) = deliver_image(&mut decoder, &mut hw.bus, &mut hw.display, &self.config) {
            warn!("Displaying {} failed: {:?}", name, e);
            return no_image;
        }

        let budget = sleep_budget(0, inputs.switches.interval_hours);
        (
            SleepReason::FirstAfterRefresh,
            budget.next_sleep,
            Some(budget.remaining),
        )
    }

    /// Commit the cycle-ending state in crash-safe order
    fn finish<B, S, R, L, D>(
        &mut self,
        inputs: &CycleInputs,
        reason: SleepReason,
        seconds: u32,
        remaining: Option<u32>,
        hw: &mut Hardware<B, S, R, L, D>,
    ) -> SleepPlan
    where
        B: BusSelect,
        L: ImageLibrary,
    {
        info!("Sleeping for {} s ({})", seconds, reason.as_str());

        if let Err(e) = self.state.set_sleep_reason(reason) {
            warn!("Sleep reason not saved: {:?}", e);
        }
        if let Some(remaining) = remaining {
            if let Err(e) = self.state.set_sleep_duration_remaining(remaining) {
                warn!("Remaining sleep not saved: {:?}", e);
            }
        }

        if hw.library.is_available() {
            hw.bus.select(BusDevice::Storage);
            if self.config.battery_logging {
                let record = CycleRecord {
                    cycle: inputs.cycle,
                    battery_voltage: inputs.battery_voltage.unwrap_or(0.0),
                    wake_reason: inputs.wake_reason,
                    sleep_reason: reason,
                    sleep_seconds: seconds,
                };
                if let Err(e) = hw.library.append_cycle_record(&record) {
                    warn!("Battery log not written: {:?}", e);
                }
            }
            if inputs.debug_mode {
                if let Err(e) = hw.library.write_debug_log(inputs.cycle) {
                    warn!("Debug log not written: {:?}", e);
                }
            }
        }
        hw.library.unmount();

        if let Err(e) = self.state.end_cycle_safe() {
            warn!("Safe shutdown flag not cleared: {:?}", e);
        }
        hw.bus.select(BusDevice::Off);

        SleepPlan {
            seconds,
            reason,
            cycle: inputs.cycle,
            debug_mode: inputs.debug_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::SensorFault;
    use crate::delivery::tests::{RecordingBus, RecordingPanel};
    use crate::delivery::Packing;
    use crate::fram::{MemFram, StorageFault};
    use crate::library::tests::MemLibrary;
    use crate::slic::consts::*;
    use crate::slic::tests::header;

    const REFRESH: u16 = 1 << 11;
    const SHUFFLE: u16 = 1 << 10;

    struct FakeSensors {
        battery: Result<f32, SensorFault>,
        switches: u16,
        debug: bool,
    }

    impl Sensors for FakeSensors {
        fn battery_voltage(&mut self) -> Result<f32, SensorFault> {
            self.battery
        }

        fn toggle_switches(&mut self) -> u16 {
            self.switches
        }

        fn debug_requested(&mut self) -> bool {
            self.debug
        }
    }

    struct FixedRng(u32);

    impl RandomSource for FixedRng {
        fn next_u32(&mut self) -> Result<u32, SensorFault> {
            Ok(self.0)
        }
    }

    /// Store whose every access fails
    struct DeadFram;

    impl NvMemory for DeadFram {
        fn read(&mut self, _address: u16, _buf: &mut [u8]) -> Result<(), StorageFault> {
            Err(StorageFault::Bus)
        }

        fn write(&mut self, _address: u16, _data: &[u8]) -> Result<(), StorageFault> {
            Err(StorageFault::Bus)
        }
    }

    type TestHardware = Hardware<RecordingBus, FakeSensors, FixedRng, MemLibrary, RecordingPanel>;

    /// 2x2 gray image of color 1
    fn small_image() -> Vec<u8> {
        let mut bytes = header(2, 2, 8, 0);
        bytes.extend_from_slice(&[OP_BADRUN8, 1, OP_RUN8 | 2]);
        bytes
    }

    /// Reason of a `Sleep` decision
    fn reason_of(decision: Decision) -> Option<SleepReason> {
        match decision {
            Decision::Sleep { reason, .. } => Some(reason),
            Decision::Refresh => None,
        }
    }

    fn hardware(switches: u16, files: &[(&str, Vec<u8>)]) -> TestHardware {
        let files = files.iter().map(|(n, d)| (n.to_string(), d.clone()));
        Hardware {
            bus: RecordingBus::default(),
            sensors: FakeSensors {
                battery: Ok(4.1),
                switches,
                debug: false,
            },
            rng: FixedRng(0),
            library: MemLibrary::with_files(files),
            display: RecordingPanel::default(),
        }
    }

    fn config() -> FrameConfig {
        FrameConfig {
            image_width: 2,
            image_height: 2,
            packing: Packing::Duplicate,
            ..FrameConfig::DEFAULT
        }
    }

    fn controller() -> WakeController<MemFram> {
        let mut controller = WakeController::new(PersistentState::new(MemFram::new()), config());
        // Fresh device that has completed one clean cycle
        controller.state.end_cycle_safe().unwrap();
        controller
    }

    fn inputs() -> CycleInputs {
        CycleInputs {
            wake_reason: WakeReason::Rtc,
            unsafe_shutdown: false,
            cycle: 0,
            battery_voltage: Some(4.0),
            debug_mode: false,
            remaining_sleep: 0,
            previous_interval: 0,
            switches: ToggleSwitches::from_bits(REFRESH),
            storage_available: true,
        }
    }

    #[test]
    fn test_decide_low_battery_overrides_everything() {
        let config = FrameConfig::DEFAULT;
        let mut low = inputs();
        low.battery_voltage = Some(3.5);
        low.remaining_sleep = 1000;
        low.wake_reason = WakeReason::Button;
        assert_eq!(
            decide(&low, &config),
            Decision::Sleep {
                reason: SleepReason::LowBattery,
                seconds: 43_200,
                remaining: None,
            }
        );

        low.battery_voltage = None;
        let decision = decide(&low, &config);
        assert_eq!(reason_of(decision), Some(SleepReason::LowBattery));
    }

    #[test]
    fn test_decide_continues_pending_budget() {
        let mut pending = inputs();
        pending.remaining_sleep = 21_600;
        pending.switches = ToggleSwitches::from_bits(REFRESH | 24);
        pending.previous_interval = 24;
        assert_eq!(
            decide(&pending, &FrameConfig::DEFAULT),
            Decision::Sleep {
                reason: SleepReason::NormalIteration,
                seconds: 21_600,
                remaining: Some(0),
            }
        );

        // Changing the interval cancels the pending budget
        pending.switches = ToggleSwitches::from_bits(REFRESH | 12);
        assert_eq!(decide(&pending, &FrameConfig::DEFAULT), Decision::Refresh);
    }

    #[test]
    fn test_decide_button_overrides_disabled_refresh() {
        let mut button = inputs();
        button.switches = ToggleSwitches::from_bits(0);
        button.wake_reason = WakeReason::Button;
        assert_eq!(decide(&button, &FrameConfig::DEFAULT), Decision::Refresh);

        button.wake_reason = WakeReason::Reset;
        let decision = decide(&button, &FrameConfig::DEFAULT);
        assert_eq!(reason_of(decision), Some(SleepReason::RefreshDisabled));
    }

    #[test]
    fn test_decide_button_skips_pending_budget() {
        let mut button = inputs();
        button.remaining_sleep = 500;
        button.wake_reason = WakeReason::Button;
        assert_eq!(decide(&button, &FrameConfig::DEFAULT), Decision::Refresh);
    }

    #[test]
    fn test_decide_no_storage() {
        let mut no_sd = inputs();
        no_sd.storage_available = false;
        let decision = decide(&no_sd, &FrameConfig::DEFAULT);
        assert_eq!(reason_of(decision), Some(SleepReason::NoSdCard));
    }

    #[test]
    fn test_refresh_cycle() {
        let mut controller = controller();
        let mut hw = hardware(REFRESH, &[("0.slc", small_image())]);

        let plan = controller.run(WakeReason::Reset, &mut hw);

        assert_eq!(
            plan,
            SleepPlan {
                seconds: 64_800,
                reason: SleepReason::FirstAfterRefresh,
                cycle: 0,
                debug_mode: false,
            }
        );
        assert_eq!(hw.display.bytes, vec![0x11; 4]);
        assert_eq!(hw.display.refreshed, 1);

        let state = &mut controller.state;
        assert_eq!(state.sleep_duration_remaining().unwrap(), 21_600);
        assert_eq!(state.image_counter().unwrap(), 1);
        assert_eq!(state.sleep_reason(), Ok(SleepReason::FirstAfterRefresh));
        assert!(!state.unsafe_shutdown().unwrap());
        assert_eq!(state.wake_cycle_count().unwrap(), 1);
    }

    #[test]
    fn test_second_cycle_finishes_budget() {
        let mut controller = controller();
        let mut hw = hardware(REFRESH, &[("0.slc", small_image())]);
        controller.run(WakeReason::Reset, &mut hw);

        let mut hw = hardware(REFRESH, &[("0.slc", small_image())]);
        let plan = controller.run(WakeReason::Rtc, &mut hw);
        assert_eq!(plan.reason, SleepReason::NormalIteration);
        assert_eq!(plan.seconds, 21_600);
        assert_eq!(plan.cycle, 1);
        assert!(hw.display.bytes.is_empty());
        assert_eq!(controller.state.sleep_duration_remaining().unwrap(), 0);
    }

    #[test]
    fn test_low_battery_cycle_keeps_budget_and_saves_interval() {
        let mut controller = controller();
        controller.state.set_sleep_duration_remaining(1234).unwrap();
        let mut hw = hardware(REFRESH | 6, &[("0.slc", small_image())]);
        hw.sensors.battery = Ok(3.6);

        let plan = controller.run(WakeReason::Rtc, &mut hw);
        assert_eq!(plan.reason, SleepReason::LowBattery);
        assert_eq!(plan.seconds, 43_200);
        assert!(hw.display.bytes.is_empty());

        let state = &mut controller.state;
        assert_eq!(state.sleep_duration_remaining().unwrap(), 1234);
        assert_eq!(state.interval_switch_value().unwrap(), 6);
    }

    #[test]
    fn test_no_sd_card() {
        let mut controller = controller();
        let mut hw = hardware(REFRESH, &[]);
        hw.library.present = false;

        let plan = controller.run(WakeReason::Rtc, &mut hw);
        assert_eq!(plan.reason, SleepReason::NoSdCard);
        assert_eq!(plan.seconds, 43_200);
        assert!(hw.library.records.is_empty());
    }

    #[test]
    fn test_no_image() {
        let mut controller = controller();
        let mut hw = hardware(REFRESH, &[]);
        let plan = controller.run(WakeReason::Rtc, &mut hw);
        assert_eq!(plan.reason, SleepReason::NoImage);
        assert_eq!(plan.seconds, 43_200);
    }

    #[test]
    fn test_corrupt_image_sleeps_no_image() {
        let mut controller = controller();
        let mut truncated = header(2, 2, 8, 0);
        truncated.push(OP_RUN8);
        let mut hw = hardware(REFRESH, &[("0.slc", truncated)]);

        let plan = controller.run(WakeReason::Rtc, &mut hw);
        assert_eq!(plan.reason, SleepReason::NoImage);
        assert_eq!(plan.seconds, 43_200);
        assert_eq!(hw.display.refreshed, 0);
        assert_eq!(hw.bus.selections.last(), Some(&BusDevice::Off));
    }

    #[test]
    fn test_not_an_image() {
        let mut controller = controller();
        let mut hw = hardware(REFRESH, &[("0.slc", b"hello".to_vec())]);
        let plan = controller.run(WakeReason::Rtc, &mut hw);
        assert_eq!(plan.reason, SleepReason::NoImage);
    }

    #[test]
    fn test_shuffle_refresh() {
        let mut controller = controller();
        let files = [
            ("0.slc", small_image()),
            ("1.slc", small_image()),
            ("2.slc", small_image()),
        ];
        let mut hw = hardware(REFRESH | SHUFFLE | 4, &files);
        hw.rng = FixedRng(5);

        let plan = controller.run(WakeReason::Rtc, &mut hw);
        assert_eq!(plan.reason, SleepReason::FirstAfterRefresh);
        assert_eq!(plan.seconds, 4 * 3600);
        assert_eq!(controller.state.image_counter().unwrap(), 2);
        assert_eq!(controller.state.sleep_duration_remaining().unwrap(), 0);
    }

    #[test]
    fn test_journal_and_shutdown_order() {
        let mut controller = controller();
        let mut hw = hardware(REFRESH, &[("0.slc", small_image())]);
        hw.sensors.battery = Ok(3.9);

        controller.run(WakeReason::Button, &mut hw);

        assert_eq!(
            hw.library.records,
            vec![CycleRecord {
                cycle: 0,
                battery_voltage: 3.9,
                wake_reason: WakeReason::Button,
                sleep_reason: SleepReason::FirstAfterRefresh,
                sleep_seconds: 64_800,
            }]
        );
        assert!(hw.library.debug_logs.is_empty());
        assert_eq!(hw.library.unmounts, 1);
        assert!(!hw.library.mounted);
        assert_eq!(hw.bus.selections.last(), Some(&BusDevice::Off));
    }

    #[test]
    fn test_battery_logging_disabled() {
        let mut controller = WakeController::new(
            PersistentState::new(MemFram::new()),
            FrameConfig {
                battery_logging: false,
                ..config()
            },
        );
        let mut hw = hardware(REFRESH, &[("0.slc", small_image())]);
        controller.run(WakeReason::Rtc, &mut hw);
        assert!(hw.library.records.is_empty());
    }

    #[test]
    fn test_unsafe_shutdown_enables_debug() {
        let mut controller = controller();
        // A cycle that died before reaching sleep
        controller
            .state
            .begin_cycle_unsafe_shutdown_check()
            .unwrap();

        let mut hw = hardware(0, &[]);
        let plan = controller.run(WakeReason::Reset, &mut hw);
        assert!(plan.debug_mode);
        assert_eq!(hw.library.debug_logs, vec![plan.cycle]);
        assert!(!controller.state.unsafe_shutdown().unwrap());
    }

    #[test]
    fn test_debug_requested_or_forced() {
        let mut controller = controller();
        let mut hw = hardware(0, &[]);
        hw.sensors.debug = true;
        assert!(controller.run(WakeReason::Reset, &mut hw).debug_mode);

        let config = config().with_force_debug(true);
        let mut forced = WakeController::new(PersistentState::new(MemFram::new()), config);
        forced.state.end_cycle_safe().unwrap();
        let mut hw = hardware(0, &[]);
        assert!(forced.run(WakeReason::Reset, &mut hw).debug_mode);

        let mut hw = hardware(0, &[]);
        assert!(!controller.run(WakeReason::Reset, &mut hw).debug_mode);
    }

    #[test]
    fn test_journal_failure_does_not_block_sleep() {
        let mut controller = controller();
        let mut hw = hardware(REFRESH, &[("0.slc", small_image())]);
        hw.library.fail_journal = true;
        hw.sensors.debug = true;

        let plan = controller.run(WakeReason::Rtc, &mut hw);
        assert_eq!(plan.reason, SleepReason::FirstAfterRefresh);
        assert!(!controller.state.unsafe_shutdown().unwrap());
        assert_eq!(hw.bus.selections.last(), Some(&BusDevice::Off));
    }

    #[test]
    fn test_dead_persistent_store_still_sleeps() {
        let mut controller = WakeController::new(PersistentState::new(DeadFram), config());
        let mut hw = hardware(REFRESH, &[("0.slc", small_image())]);

        let plan = controller.run(WakeReason::Rtc, &mut hw);
        // Counter reads as 0, so the first image is shown
        assert_eq!(plan.reason, SleepReason::FirstAfterRefresh);
        assert!(plan.debug_mode);
        assert_eq!(hw.display.refreshed, 1);
        assert_eq!(hw.bus.selections.last(), Some(&BusDevice::Off));
    }
}
