//! Driver for Good Display GDEP073E01 / Waveshare 7.3inch e-Paper HAT (E)
//! using E Ink Spectra 6 technology (6-color e-paper).
//!
//! Frames are streamed: [`DisplaySink::begin_frame`] resets and initialises
//! the panel and opens a data transfer, pixel bytes follow one at a time, and
//! [`DisplaySink::end_frame`] refreshes and puts the panel to sleep. The panel
//! RAM holds the frame, so nothing is buffered beyond one SPI burst.

mod command;

use aeon_core::delivery::DisplaySink;
use command::Command;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiDevice;
use log::{debug, info};

/// Display width in pixels
pub const WIDTH: u32 = 800;
/// Display height in pixels
pub const HEIGHT: u32 = 480;
/// Frame size: 4 bits per pixel, 2 pixels per byte
pub const BUFFER_SIZE: usize = (WIDTH as usize * HEIGHT as usize) / 2;

/// Bytes collected before an SPI write
const BURST_LEN: usize = 256;

/// Longest wait for the BUSY line, covering a full Spectra refresh
const BUSY_TIMEOUT_MS: u32 = 60_000;

/// Display error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayError {
    /// SPI transfer failed
    Spi,
    /// BUSY never released
    BusyTimeout,
}

/// Streaming driver for the 7.3" Spectra 6 e-paper display
pub struct SpectraPanel<SPI, BUSY, DC, RST, DELAY> {
    spi: SPI,
    busy: BUSY,
    dc: DC,
    rst: RST,
    delay: DELAY,
    burst: [u8; BURST_LEN],
    burst_len: usize,
    sent: usize,
    fault: Option<DisplayError>,
}

impl<SPI, BUSY, DC, RST, DELAY> SpectraPanel<SPI, BUSY, DC, RST, DELAY>
where
    SPI: SpiDevice,
    BUSY: InputPin,
    DC: OutputPin,
    RST: OutputPin,
    DELAY: DelayNs,
{
    /// The panel is left untouched until the first frame
    pub fn new(spi: SPI, busy: BUSY, dc: DC, rst: RST, delay: DELAY) -> Self {
        Self {
            spi,
            busy,
            dc,
            rst,
            delay,
            burst: [0; BURST_LEN],
            burst_len: 0,
            sent: 0,
            fault: None,
        }
    }

    /// Hardware reset sequence
    fn hardware_reset(&mut self) {
        let _ = self.rst.set_high();
        self.delay.delay_ms(50);
        let _ = self.rst.set_low();
        self.delay.delay_ms(20);
        let _ = self.rst.set_high();
        self.delay.delay_ms(50);
    }

    /// Wait for the display to become idle (BUSY pin high)
    fn wait_until_idle(&mut self) -> Result<(), DisplayError> {
        let mut waited = 0;
        // BUSY is active low on this display
        while self.busy.is_low().unwrap_or(true) {
            if waited >= BUSY_TIMEOUT_MS {
                return Err(DisplayError::BusyTimeout);
            }
            self.delay.delay_ms(10);
            waited += 10;
        }
        Ok(())
    }

    /// Send a command to the display
    fn send_command(&mut self, command: Command) -> Result<(), DisplayError> {
        let _ = self.dc.set_low();
        self.spi
            .write(&[command.addr()])
            .map_err(|_| DisplayError::Spi)
    }

    /// Send data to the display
    fn send_data(&mut self, data: &[u8]) -> Result<(), DisplayError> {
        let _ = self.dc.set_high();
        self.spi.write(data).map_err(|_| DisplayError::Spi)
    }

    /// Send command followed by data
    fn cmd_with_data(&mut self, command: Command, data: &[u8]) -> Result<(), DisplayError> {
        self.send_command(command)?;
        self.send_data(data)
    }

    /// Register setup for a standard-quality refresh
    fn init(&mut self) -> Result<(), DisplayError> {
        self.cmd_with_data(Command::CMDH, &[0x49, 0x55, 0x20, 0x08, 0x09, 0x18])?;
        self.cmd_with_data(Command::PWRR, &[0x3F])?;
        self.cmd_with_data(Command::PSR, &[0x5F, 0x69])?;
        self.cmd_with_data(Command::POFS, &[0x00, 0x54, 0x00, 0x44])?;
        self.cmd_with_data(Command::BTST1, &[0x40, 0x1F, 0x1F, 0x2C])?;
        self.cmd_with_data(Command::BTST2, &[0x6F, 0x1F, 0x17, 0x49])?;
        self.cmd_with_data(Command::BTST3, &[0x6F, 0x1F, 0x1F, 0x22])?;
        self.cmd_with_data(Command::PLL, &[0x08])?;
        self.cmd_with_data(Command::CDI, &[0x3F])?;
        self.cmd_with_data(Command::TCON, &[0x02, 0x00])?;
        // Resolution: 800x480 (0x0320 x 0x01E0)
        self.cmd_with_data(Command::TRES, &[0x03, 0x20, 0x01, 0xE0])?;
        self.cmd_with_data(Command::T_VDCS, &[0x01])?;
        self.cmd_with_data(Command::PWS, &[0x2F])
    }

    /// Write out the pending burst of pixel bytes
    fn flush(&mut self) -> Result<(), DisplayError> {
        if self.burst_len == 0 {
            return Ok(());
        }
        let len = self.burst_len;
        self.burst_len = 0;
        let _ = self.dc.set_high();
        self.spi
            .write(&self.burst[..len])
            .map_err(|_| DisplayError::Spi)?;
        self.sent += len;
        Ok(())
    }

    /// Power on, refresh from panel RAM, power off and deep sleep
    fn refresh(&mut self) -> Result<(), DisplayError> {
        self.send_command(Command::PON)?;
        self.wait_until_idle()?;
        self.cmd_with_data(Command::BTST2, &[0x6F, 0x1F, 0x17, 0x49])?;

        info!("Refreshing panel...");
        self.cmd_with_data(Command::DRF, &[0x00])?;
        self.delay.delay_ms(1); // Required delay (min 200us)
        self.wait_until_idle()?;

        self.cmd_with_data(Command::POF, &[0x00])?;
        self.wait_until_idle()?;
        self.cmd_with_data(Command::DSLP, &[0xA5])?;
        Ok(())
    }
}

impl<SPI, BUSY, DC, RST, DELAY> DisplaySink for SpectraPanel<SPI, BUSY, DC, RST, DELAY>
where
    SPI: SpiDevice,
    BUSY: InputPin,
    DC: OutputPin,
    RST: OutputPin,
    DELAY: DelayNs,
{
    type Error = DisplayError;

    fn begin_frame(&mut self) -> Result<(), DisplayError> {
        self.burst_len = 0;
        self.sent = 0;
        self.fault = None;

        self.hardware_reset();
        self.wait_until_idle()?;
        self.init()?;
        self.send_command(Command::DTM)
    }

    fn send(&mut self, byte: u8) {
        if self.fault.is_some() {
            return;
        }
        self.burst[self.burst_len] = byte;
        self.burst_len += 1;
        if self.burst_len == BURST_LEN
            && let Err(e) = self.flush()
        {
            self.fault = Some(e);
        }
    }

    fn end_frame(&mut self) -> Result<(), DisplayError> {
        if let Some(e) = self.fault.take() {
            return Err(e);
        }
        self.flush()?;
        if self.sent != BUFFER_SIZE {
            debug!("Frame is {} bytes, panel holds {}", self.sent, BUFFER_SIZE);
        }
        self.refresh()
    }
}
