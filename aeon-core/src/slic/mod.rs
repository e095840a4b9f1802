//! Streaming decoder for SLIC (Simple Lossless Image Code) images
//!
//! SLIC is a QOI-style run/index/delta codec with extra opcode sets for 8 and
//! 16 bits per pixel. The decoder pulls compressed bytes through a small
//! refillable window and produces pixels in caller-sized chunks, so neither
//! the compressed nor the decoded image is ever held in memory as a whole.
//!
//! # Header
//!
//! - 4-byte magic: `SLIC`
//! - u16le width
//! - u16le height
//! - u8 bits per pixel: 8, 16, 24 or 32
//! - u8 colorspace, see [`Colorspace`]
//! - for [`Colorspace::Palette`] only: a 768-byte RGB palette
//!
//! # Output
//!
//! Pixels are written `bpp / 8` bytes each: a gray or palette index byte,
//! a little-endian RGB565 word, or `r, g, b[, a]` bytes.
//!
//! See [consts] for the opcode layout.

pub mod consts;
mod decode;

use log::{debug, warn};

/// File magic, `SLIC` in ASCII
pub const MAGIC: [u8; 4] = *b"SLIC";

/// Size of the fixed header
pub const HEADER_LEN: usize = 10;

/// Size of the embedded palette that follows the header of palette images
pub const PALETTE_LEN: usize = 768;

/// Compressed bytes pulled from the source per refill
pub const INPUT_WINDOW: usize = 512;

/// Color interpretation of the decoded pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colorspace {
    Grayscale = 0,
    Rgb565 = 1,
    Rgb888 = 2,
    Rgba8888 = 3,
    Palette = 4,
}

impl Colorspace {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Colorspace::Grayscale),
            1 => Some(Colorspace::Rgb565),
            2 => Some(Colorspace::Rgb888),
            3 => Some(Colorspace::Rgba8888),
            4 => Some(Colorspace::Palette),
            _ => None,
        }
    }
}

/// Image properties from the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMeta {
    pub width: u16,
    pub height: u16,
    pub bpp: u8,
    pub colorspace: Colorspace,
}

impl ImageMeta {
    pub fn pixel_count(&self) -> u32 {
        u32::from(self.width) * u32::from(self.height)
    }

    pub fn bytes_per_pixel(&self) -> usize {
        usize::from(self.bpp / 8)
    }
}

/// Decoder errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Bad magic, unsupported bits per pixel or unknown colorspace
    BadFormat,
    /// Source ran dry (or failed) while more bytes were needed
    TruncatedStream,
    /// Opcode would emit pixels past the end of the image
    Opcode { op: u8 },
    /// Output buffer cannot hold a single pixel
    BufferTooSmall,
}

/// Result of one [`SlicDecoder::decode`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `n` pixels written, more to come
    Continue(usize),
    /// `n` pixels written and the image is complete
    Done(usize),
}

impl Outcome {
    pub fn pixels(self) -> usize {
        match self {
            Outcome::Continue(n) | Outcome::Done(n) => n,
        }
    }

    pub fn is_done(self) -> bool {
        matches!(self, Outcome::Done(_))
    }
}

/// Pull-style source of compressed bytes.
///
/// Short reads are allowed; `Ok(0)` means end of data.
pub trait ByteSource {
    type Error: core::fmt::Debug;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

impl ByteSource for &[u8] {
    type Error = core::convert::Infallible;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.len());
        let (head, tail) = self.split_at(n);
        buf[..n].copy_from_slice(head);
        *self = tail;
        Ok(n)
    }
}

/// Refillable window over a [`ByteSource`]
struct InputWindow<S> {
    source: S,
    buf: [u8; INPUT_WINDOW],
    pos: usize,
    end: usize,
}

impl<S: ByteSource> InputWindow<S> {
    fn new(source: S) -> Self {
        Self {
            source,
            buf: [0; INPUT_WINDOW],
            pos: 0,
            end: 0,
        }
    }

    fn refill(&mut self) -> Result<(), DecodeError> {
        match self.source.read(&mut self.buf) {
            Ok(0) => Err(DecodeError::TruncatedStream),
            Ok(n) => {
                self.pos = 0;
                self.end = n;
                Ok(())
            }
            Err(e) => {
                warn!("SLIC source read failed: {:?}", e);
                Err(DecodeError::TruncatedStream)
            }
        }
    }

    fn next_byte(&mut self) -> Result<u8, DecodeError> {
        if self.pos >= self.end {
            self.refill()?;
        }
        let byte = self.buf[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    fn read_exact(&mut self, out: &mut [u8]) -> Result<(), DecodeError> {
        let mut filled = 0;
        while filled < out.len() {
            if self.pos >= self.end {
                self.refill()?;
            }
            let n = (self.end - self.pos).min(out.len() - filled);
            out[filled..filled + n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
            self.pos += n;
            filled += n;
        }
        Ok(())
    }

    fn skip(&mut self, mut len: usize) -> Result<(), DecodeError> {
        while len > 0 {
            if self.pos >= self.end {
                self.refill()?;
            }
            let n = (self.end - self.pos).min(len);
            self.pos += n;
            len -= n;
        }
        Ok(())
    }
}

/// Everything needed to resume decoding on the next call
struct DecodeState {
    /// Previous pixel; RGBA packed as `r | g << 8 | b << 16 | a << 24`
    px: u32,
    index: [u32; 64],
    run: u32,
    bad_run: u32,
    /// Second pixel of a pair that did not fit the last output buffer
    extra_pixel: bool,
    /// Pixels not yet written
    remaining: u32,
}

/// Resumable SLIC decoder
pub struct SlicDecoder<S> {
    input: InputWindow<S>,
    meta: ImageMeta,
    state: DecodeState,
}

impl<S: ByteSource> SlicDecoder<S> {
    /// Parse the header, skipping the palette of palette images
    pub fn new(source: S) -> Result<Self, DecodeError> {
        Self::open(source, None)
    }

    /// Parse the header and copy the palette of palette images into
    /// `palette`. Other colorspaces leave it untouched.
    pub fn with_palette(source: S, palette: &mut [u8; PALETTE_LEN]) -> Result<Self, DecodeError> {
        Self::open(source, Some(palette))
    }

    fn open(source: S, palette: Option<&mut [u8; PALETTE_LEN]>) -> Result<Self, DecodeError> {
        let mut input = InputWindow::new(source);

        let mut header = [0u8; HEADER_LEN];
        input
            .read_exact(&mut header)
            .map_err(|_| DecodeError::BadFormat)?;
        if header[0..4] != MAGIC {
            return Err(DecodeError::BadFormat);
        }
        let width = u16::from_le_bytes([header[4], header[5]]);
        let height = u16::from_le_bytes([header[6], header[7]]);
        let bpp = header[8];
        if !matches!(bpp, 8 | 16 | 24 | 32) {
            return Err(DecodeError::BadFormat);
        }
        let colorspace = Colorspace::from_u8(header[9]).ok_or(DecodeError::BadFormat)?;

        if colorspace == Colorspace::Palette {
            match palette {
                Some(palette) => input.read_exact(palette)?,
                None => input.skip(PALETTE_LEN)?,
            }
        }

        let meta = ImageMeta {
            width,
            height,
            bpp,
            colorspace,
        };
        debug!("SLIC {}x{} {}bpp {:?}", width, height, bpp, colorspace);

        Ok(Self {
            input,
            meta,
            state: DecodeState {
                px: 0xff00_0000,
                index: [0; 64],
                run: 0,
                bad_run: 0,
                extra_pixel: false,
                remaining: meta.pixel_count(),
            },
        })
    }

    pub fn meta(&self) -> &ImageMeta {
        &self.meta
    }

    /// Pixels still to be decoded
    pub fn remaining_pixels(&self) -> u32 {
        self.state.remaining
    }

    /// Decode as many whole pixels as fit in `out`, up to the end of the
    /// image. Once the image is complete every further call returns
    /// `Done(0)`.
    pub fn decode(&mut self, out: &mut [u8]) -> Result<Outcome, DecodeError> {
        if self.state.remaining == 0 {
            return Ok(Outcome::Done(0));
        }
        let bpp = self.meta.bytes_per_pixel();
        let capacity = out.len() / bpp;
        if capacity == 0 {
            return Err(DecodeError::BufferTooSmall);
        }
        let count = capacity.min(self.state.remaining as usize);
        let out = &mut out[..count * bpp];

        match self.meta.bpp {
            8 => self.decode_gray(out)?,
            16 => self.decode_rgb565(out)?,
            _ => self.decode_rgba(out, bpp)?,
        }

        self.state.remaining -= count as u32;
        if self.state.remaining == 0 {
            Ok(Outcome::Done(count))
        } else {
            Ok(Outcome::Continue(count))
        }
    }
}
