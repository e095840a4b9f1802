//! SD card image library and cycle journal
//!
//! Directory structure:
//! /images/
//!   0.slc, 1.slc, ...        - images, shown in index order
//! /logfiles/
//!   battery.csv              - one row per wake cycle
//!   0000002A.LOG             - debug capture of cycle 42

use aeon_core::config::{BATTERY_LOG_FILE, IMAGE_DIR, LOG_DIR};
use aeon_core::journal::{CSV_HEADER, CycleRecord, log_file_name};
use aeon_core::library::{ImageLibrary, LibraryError};
use aeon_core::slic::ByteSource;
use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;
use embedded_sdmmc::{
    Directory, Error, File, Mode, RawVolume, SdCard, SdCardError, TimeSource, Timestamp, VolumeIdx,
    VolumeManager,
};
use log::{info, warn};

use crate::logger;

/// Dummy time source (SD cards need timestamps but we don't care)
pub struct DummyTimesource;

impl TimeSource for DummyTimesource {
    fn get_timestamp(&self) -> Timestamp {
        Timestamp {
            year_since_1970: 55, // 2025
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

type Card<SPI, DELAY> = SdCard<SPI, DELAY>;
type SdDirectory<'a, SPI, DELAY> = Directory<'a, Card<SPI, DELAY>, DummyTimesource, 4, 4, 1>;
type SdFile<'a, SPI, DELAY> = File<'a, Card<SPI, DELAY>, DummyTimesource, 4, 4, 1>;

/// Bytes moved per SD write when flushing the debug capture
const LOG_WRITE_CHUNK: usize = 512;

fn library_error(e: Error<SdCardError>) -> LibraryError {
    match e {
        Error::DeviceError(_) => LibraryError::NoDevice,
        Error::NotFound => LibraryError::NotFound,
        _ => LibraryError::Filesystem,
    }
}

fn io_error(e: Error<SdCardError>) -> LibraryError {
    warn!("SD I/O error: {:?}", e);
    LibraryError::Io
}

/// Open image file. Closed when dropped.
pub struct SdImage<'a, SPI: SpiDevice, DELAY: DelayNs> {
    file: SdFile<'a, SPI, DELAY>,
    _dir: SdDirectory<'a, SPI, DELAY>,
}

impl<SPI: SpiDevice, DELAY: DelayNs> ByteSource for SdImage<'_, SPI, DELAY> {
    type Error = Error<SdCardError>;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.file.read(buf)
    }
}

/// Image library on the SD card's FAT filesystem
pub struct SdLibrary<SPI: SpiDevice, DELAY: DelayNs> {
    volume_mgr: VolumeManager<Card<SPI, DELAY>, DummyTimesource>,
    volume: Option<RawVolume>,
}

impl<SPI, DELAY> SdLibrary<SPI, DELAY>
where
    SPI: SpiDevice,
    DELAY: DelayNs,
{
    /// The card is not touched until [`ImageLibrary::mount`]
    pub fn new(spi: SPI, delay: DELAY) -> Self {
        let sd_card = SdCard::new(spi, delay);
        Self {
            volume_mgr: VolumeManager::new(sd_card, DummyTimesource),
            volume: None,
        }
    }

    fn root_dir(&self) -> Result<SdDirectory<'_, SPI, DELAY>, LibraryError> {
        let volume = self.volume.ok_or(LibraryError::NoDevice)?;
        let volume_mgr = &self.volume_mgr;
        let raw = volume_mgr.open_root_dir(volume).map_err(library_error)?;
        Ok(raw.to_directory(volume_mgr))
    }

    fn image_dir(&self) -> Result<SdDirectory<'_, SPI, DELAY>, LibraryError> {
        let mut root_dir = self.root_dir()?;
        root_dir.open_dir(IMAGE_DIR).map_err(library_error)
    }

    /// Open the log directory, creating it on first use
    fn log_dir(&self) -> Result<SdDirectory<'_, SPI, DELAY>, LibraryError> {
        let mut root_dir = self.root_dir()?;
        match root_dir.open_dir(LOG_DIR) {
            Ok(dir) => Ok(dir),
            Err(Error::NotFound) => {
                root_dir.make_dir_in_dir(LOG_DIR).map_err(library_error)?;
                info!("Created {} directory", LOG_DIR);
                root_dir.open_dir(LOG_DIR).map_err(library_error)
            }
            Err(e) => Err(library_error(e)),
        }
    }
}

impl<SPI, DELAY> ImageLibrary for SdLibrary<SPI, DELAY>
where
    SPI: SpiDevice,
    DELAY: DelayNs,
{
    type Image<'a>
        = SdImage<'a, SPI, DELAY>
    where
        Self: 'a;

    fn mount(&mut self) -> Result<(), LibraryError> {
        if self.volume.is_some() {
            return Ok(());
        }
        let volume = self
            .volume_mgr
            .open_raw_volume(VolumeIdx(0))
            .map_err(library_error)?;
        self.volume = Some(volume);
        info!("SD card mounted");
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.volume.is_some()
    }

    fn count(&mut self) -> Result<u32, LibraryError> {
        let mut dir = self.image_dir()?;
        let mut count = 0u32;
        dir.iterate_dir(|entry| {
            if !entry.attributes.is_directory() && !entry.attributes.is_volume() {
                count += 1;
            }
        })
        .map_err(io_error)?;
        info!("Found {} images", count);
        Ok(count)
    }

    fn exists(&mut self, name: &str) -> Result<bool, LibraryError> {
        let mut dir = self.image_dir()?;
        match dir.find_directory_entry(name) {
            Ok(_) => Ok(true),
            Err(Error::NotFound) => Ok(false),
            Err(e) => Err(library_error(e)),
        }
    }

    fn open(&mut self, name: &str) -> Result<Self::Image<'_>, LibraryError> {
        let mut dir = self.image_dir()?;
        let file = dir
            .open_file_in_dir(name, Mode::ReadOnly)
            .map_err(library_error)?;
        info!("Opened {} ({} bytes)", name, file.length());
        Ok(SdImage { file, _dir: dir })
    }

    fn append_cycle_record(&mut self, record: &CycleRecord) -> Result<(), LibraryError> {
        let mut dir = self.log_dir()?;
        let mut file = dir
            .open_file_in_dir(BATTERY_LOG_FILE, Mode::ReadWriteCreateOrAppend)
            .map_err(library_error)?;

        if file.length() == 0 {
            file.write(CSV_HEADER.as_bytes()).map_err(io_error)?;
        }
        file.write(record.csv_row().as_bytes()).map_err(io_error)?;
        Ok(())
    }

    fn write_debug_log(&mut self, cycle: u32) -> Result<(), LibraryError> {
        let name = log_file_name(cycle);
        if logger::capture_truncated() {
            warn!("Debug capture full, {} is truncated", name);
        }

        let mut dir = self.log_dir()?;
        let mut file = dir
            .open_file_in_dir(name.as_str(), Mode::ReadWriteCreateOrTruncate)
            .map_err(library_error)?;

        let mut chunk = [0u8; LOG_WRITE_CHUNK];
        let mut offset = 0;
        loop {
            let len = logger::read_capture(offset, &mut chunk);
            if len == 0 {
                break;
            }
            file.write(&chunk[..len]).map_err(io_error)?;
            offset += len;
        }
        Ok(())
    }

    fn unmount(&mut self) {
        if let Some(volume) = self.volume.take()
            && let Err(e) = self.volume_mgr.close_volume(volume)
        {
            warn!("SD volume not closed cleanly: {:?}", e);
        }
    }
}
