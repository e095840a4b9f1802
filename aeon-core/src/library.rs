//! Image library on removable storage
//!
//! Images live in one flat directory as `<index>.slc`. The same medium holds
//! the cycle journal (battery CSV and debug logs).

use crate::journal::CycleRecord;
use crate::slic::ByteSource;

/// Storage errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryError {
    /// No card, or the card did not answer
    NoDevice,
    /// File not found
    NotFound,
    /// Volume or directory could not be opened
    Filesystem,
    /// Read or write failed
    Io,
}

/// Removable image store
pub trait ImageLibrary {
    /// Open image, streamed into the decoder
    type Image<'a>: ByteSource
    where
        Self: 'a;

    /// Bring up the card and open the volume
    fn mount(&mut self) -> Result<(), LibraryError>;

    fn is_available(&self) -> bool;

    /// Number of files in the image directory
    fn count(&mut self) -> Result<u32, LibraryError>;

    fn exists(&mut self, name: &str) -> Result<bool, LibraryError>;

    fn open(&mut self, name: &str) -> Result<Self::Image<'_>, LibraryError>;

    /// Append one row to the battery CSV, writing the header first when the
    /// file is new
    fn append_cycle_record(&mut self, record: &CycleRecord) -> Result<(), LibraryError>;

    /// Write the captured debug output to the log file for `cycle`
    fn write_debug_log(&mut self, cycle: u32) -> Result<(), LibraryError>;

    /// Close everything so the card can be powered down
    fn unmount(&mut self);
}
