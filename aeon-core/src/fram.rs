//! Persistent state record kept in non-volatile FRAM
//!
//! The record survives deep sleep and full power loss. Layout (little-endian,
//! fixed offsets):
//!
//! | offset | size | field                      |
//! |--------|------|----------------------------|
//! | 0      | 4    | `image_counter`            |
//! | 8      | 4    | `sleep_duration_remaining` |
//! | 16     | 4    | `wake_cycle_count`         |
//! | 24     | 2    | `interval_switch_value`    |
//! | 26     | 1    | status byte                |
//!
//! Status byte: bit0 = unsafe shutdown, bits1-3 = last [`SleepReason`],
//! bits4-7 reserved (written as zero).
//!
//! Every accessor is one read or one write of the field's byte range, so a
//! power cut can never leave a field half written.

use embedded_hal::spi::{Operation, SpiDevice};

/// Size of the FRAM part (4 Kbit)
pub const FRAM_CAPACITY: u16 = 512;

const IMAGE_COUNTER_ADDR: u16 = 0;
const SLEEP_DURATION_ADDR: u16 = 8;
const WAKE_CYCLE_COUNT_ADDR: u16 = 16;
const INTERVAL_SW_ADDR: u16 = 24;
const STATUS_BYTE_ADDR: u16 = 26;

const STATUS_UNSAFE_SHUTDOWN: u8 = 0b0000_0001;
const STATUS_REASON_MASK: u8 = 0b0000_1110;
const STATUS_REASON_SHIFT: u8 = 1;

/// The persistent store could not be read or written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFault {
    /// Bus transaction failed
    Bus,
    /// Access would run past the end of the part
    OutOfRange,
}

/// Why the frame went to sleep last time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SleepReason {
    #[default]
    None = 0,
    /// First sleep after a display refresh
    FirstAfterRefresh = 1,
    /// Continuing a sleep budget longer than one timer span
    NormalIteration = 2,
    LowBattery = 3,
    NoImage = 4,
    NoSdCard = 5,
    RefreshDisabled = 6,
}

impl SleepReason {
    /// Decode the 3-bit field; the unused value 7 reads back as `None`
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            1 => SleepReason::FirstAfterRefresh,
            2 => SleepReason::NormalIteration,
            3 => SleepReason::LowBattery,
            4 => SleepReason::NoImage,
            5 => SleepReason::NoSdCard,
            6 => SleepReason::RefreshDisabled,
            _ => SleepReason::None,
        }
    }

    /// Name used in logs and the battery CSV
    pub const fn as_str(self) -> &'static str {
        match self {
            SleepReason::None => "SLEEP_REASON_NULL",
            SleepReason::FirstAfterRefresh => "SLEEP_REASON_FIRST_AFTER_REFRESH",
            SleepReason::NormalIteration => "SLEEP_REASON_NORM_ITER",
            SleepReason::LowBattery => "SLEEP_REASON_LOW_BATT",
            SleepReason::NoImage => "SLEEP_REASON_NO_IMAGE",
            SleepReason::NoSdCard => "SLEEP_REASON_NO_SD",
            SleepReason::RefreshDisabled => "SLEEP_REASON_REFRESH_DISABLED",
        }
    }
}

/// Unpacked view of the status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusByte {
    pub unsafe_shutdown: bool,
    pub sleep_reason: SleepReason,
}

impl StatusByte {
    pub const fn unpack(byte: u8) -> Self {
        Self {
            unsafe_shutdown: byte & STATUS_UNSAFE_SHUTDOWN != 0,
            sleep_reason: SleepReason::from_bits(
                (byte & STATUS_REASON_MASK) >> STATUS_REASON_SHIFT,
            ),
        }
    }

    pub const fn pack(self) -> u8 {
        let flag = if self.unsafe_shutdown {
            STATUS_UNSAFE_SHUTDOWN
        } else {
            0
        };
        flag | (((self.sleep_reason as u8) << STATUS_REASON_SHIFT) & STATUS_REASON_MASK)
    }
}

/// Byte-addressed non-volatile memory
pub trait NvMemory {
    fn read(&mut self, address: u16, buf: &mut [u8]) -> Result<(), StorageFault>;
    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), StorageFault>;
}

fn check_range(address: u16, len: usize) -> Result<(), StorageFault> {
    if address as usize + len > FRAM_CAPACITY as usize {
        Err(StorageFault::OutOfRange)
    } else {
        Ok(())
    }
}

/// FRAM opcodes (MB85RS4MT-style 9-bit addressing)
mod opcode {
    /// Set write enable latch
    pub const WREN: u8 = 0x06;
    /// Write memory data
    pub const WRITE: u8 = 0x02;
    /// Read memory data
    pub const READ: u8 = 0x03;
}

/// Opcode with address bit 8 folded into bit 3, then the low address byte
fn command(op: u8, address: u16) -> [u8; 2] {
    let high = ((address & 0x100) >> 5) as u8;
    [op | high, (address & 0xFF) as u8]
}

/// 512-byte SPI FRAM
pub struct SpiFram<SPI> {
    spi: SPI,
}

impl<SPI: SpiDevice> SpiFram<SPI> {
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    pub fn release(self) -> SPI {
        self.spi
    }
}

impl<SPI: SpiDevice> NvMemory for SpiFram<SPI> {
    fn read(&mut self, address: u16, buf: &mut [u8]) -> Result<(), StorageFault> {
        check_range(address, buf.len())?;
        let cmd = command(opcode::READ, address);
        self.spi
            .transaction(&mut [Operation::Write(&cmd), Operation::Read(buf)])
            .map_err(|_| StorageFault::Bus)
    }

    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), StorageFault> {
        check_range(address, data.len())?;
        // Write enable must be its own chip-select cycle
        self.spi
            .write(&[opcode::WREN])
            .map_err(|_| StorageFault::Bus)?;
        let cmd = command(opcode::WRITE, address);
        self.spi
            .transaction(&mut [Operation::Write(&cmd), Operation::Write(data)])
            .map_err(|_| StorageFault::Bus)
    }
}

/// RAM-backed stand-in for the FRAM part
#[derive(Debug, Clone)]
pub struct MemFram {
    bytes: [u8; FRAM_CAPACITY as usize],
}

impl MemFram {
    /// All bytes zero, like a factory-fresh part
    pub const fn new() -> Self {
        Self {
            bytes: [0; FRAM_CAPACITY as usize],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Default for MemFram {
    fn default() -> Self {
        Self::new()
    }
}

impl NvMemory for MemFram {
    fn read(&mut self, address: u16, buf: &mut [u8]) -> Result<(), StorageFault> {
        check_range(address, buf.len())?;
        let start = address as usize;
        buf.copy_from_slice(&self.bytes[start..start + buf.len()]);
        Ok(())
    }

    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), StorageFault> {
        check_range(address, data.len())?;
        let start = address as usize;
        self.bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}

/// Typed accessors over the persistent record
pub struct PersistentState<M> {
    mem: M,
}

impl<M: NvMemory> PersistentState<M> {
    pub fn new(mem: M) -> Self {
        Self { mem }
    }

    pub fn memory(&self) -> &M {
        &self.mem
    }

    fn read_u32(&mut self, address: u16) -> Result<u32, StorageFault> {
        let mut buf = [0u8; 4];
        self.mem.read(address, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn write_u32(&mut self, address: u16, value: u32) -> Result<(), StorageFault> {
        self.mem.write(address, &value.to_le_bytes())
    }

    /// Index of the next sequential image
    pub fn image_counter(&mut self) -> Result<u32, StorageFault> {
        self.read_u32(IMAGE_COUNTER_ADDR)
    }

    pub fn set_image_counter(&mut self, counter: u32) -> Result<(), StorageFault> {
        self.write_u32(IMAGE_COUNTER_ADDR, counter)
    }

    /// Seconds still owed from a sleep longer than one timer span
    pub fn sleep_duration_remaining(&mut self) -> Result<u32, StorageFault> {
        self.read_u32(SLEEP_DURATION_ADDR)
    }

    pub fn set_sleep_duration_remaining(&mut self, seconds: u32) -> Result<(), StorageFault> {
        self.write_u32(SLEEP_DURATION_ADDR, seconds)
    }

    pub fn wake_cycle_count(&mut self) -> Result<u32, StorageFault> {
        self.read_u32(WAKE_CYCLE_COUNT_ADDR)
    }

    /// Store count + 1 and return the pre-increment value, which labels
    /// the current cycle.
    pub fn advance_wake_cycle_count(&mut self) -> Result<u32, StorageFault> {
        let current = self.read_u32(WAKE_CYCLE_COUNT_ADDR)?;
        self.write_u32(WAKE_CYCLE_COUNT_ADDR, current.wrapping_add(1))?;
        Ok(current)
    }

    /// Interval selector seen on the previous cycle
    pub fn interval_switch_value(&mut self) -> Result<u16, StorageFault> {
        let mut buf = [0u8; 2];
        self.mem.read(INTERVAL_SW_ADDR, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn set_interval_switch_value(&mut self, value: u16) -> Result<(), StorageFault> {
        self.mem.write(INTERVAL_SW_ADDR, &value.to_le_bytes())
    }

    pub fn status(&mut self) -> Result<StatusByte, StorageFault> {
        let mut buf = [0u8; 1];
        self.mem.read(STATUS_BYTE_ADDR, &mut buf)?;
        Ok(StatusByte::unpack(buf[0]))
    }

    fn set_status(&mut self, status: StatusByte) -> Result<(), StorageFault> {
        self.mem.write(STATUS_BYTE_ADDR, &[status.pack()])
    }

    pub fn sleep_reason(&mut self) -> Result<SleepReason, StorageFault> {
        Ok(self.status()?.sleep_reason)
    }

    pub fn set_sleep_reason(&mut self, reason: SleepReason) -> Result<(), StorageFault> {
        let status = self.status()?;
        self.set_status(StatusByte {
            sleep_reason: reason,
            ..status
        })
    }

    pub fn unsafe_shutdown(&mut self) -> Result<bool, StorageFault> {
        Ok(self.status()?.unsafe_shutdown)
    }

    /// Mark the cycle unsafe and report whether the previous one was.
    ///
    /// Must be the first persistent mutation of a cycle.
    pub fn begin_cycle_unsafe_shutdown_check(&mut self) -> Result<bool, StorageFault> {
        let status = self.status()?;
        self.set_status(StatusByte {
            unsafe_shutdown: true,
            ..status
        })?;
        Ok(status.unsafe_shutdown)
    }

    /// Clear the unsafe flag. Must be the last persistent write before sleep.
    pub fn end_cycle_safe(&mut self) -> Result<(), StorageFault> {
        let status = self.status()?;
        self.set_status(StatusByte {
            unsafe_shutdown: false,
            ..status
        })
    }
}
