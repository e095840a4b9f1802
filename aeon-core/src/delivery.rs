//! Pixel delivery: decode in bounded chunks and stream to the panel
//!
//! Only one chunk of decoded pixels exists at a time. The shared bus is
//! handed to the storage device for each decode and back to the panel for
//! each send.

use log::{debug, info, warn};

use crate::board::{BusDevice, BusSelect};
use crate::config::FrameConfig;
use crate::slic::{ByteSource, DecodeError, SlicDecoder};

/// Working buffer for decoded pixels
pub const PIXEL_CHUNK_BYTES: usize = 5000;

/// How 4-bit pixel values become panel bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packing {
    /// One image pixel fills both nibbles, doubling horizontal resolution
    Duplicate,
    /// Two consecutive image pixels per byte, high nibble first
    Pair,
}

/// Panel accepting a frame one byte at a time
pub trait DisplaySink {
    type Error: core::fmt::Debug;

    /// Wake the panel and start a frame upload
    fn begin_frame(&mut self) -> Result<(), Self::Error>;

    fn send(&mut self, byte: u8);

    /// Refresh the panel with the uploaded frame and power it down
    fn end_frame(&mut self) -> Result<(), Self::Error>;
}

/// Delivery errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    Decode(DecodeError),
    /// Panel did not accept or refresh the frame
    Display,
}

impl From<DecodeError> for DeliveryError {
    fn from(e: DecodeError) -> Self {
        DeliveryError::Decode(e)
    }
}

/// 4-bit intensity from 8-bit channels
fn luma4(r: u8, g: u8, b: u8) -> u8 {
    ((77 * u32::from(r) + 150 * u32::from(g) + 29 * u32::from(b)) >> 12) as u8
}

/// Panel value of one decoded pixel of `pixel.len()` bytes.
///
/// 8 bpp pixels carry the panel color index in their low nibble; deeper
/// pixels are reduced to a 4-bit intensity.
pub fn pixel_nibble(pixel: &[u8]) -> u8 {
    match *pixel {
        [index] => index & 0x0f,
        [lo, hi] => {
            let px = u16::from_le_bytes([lo, hi]);
            let r5 = (px >> 11) as u8;
            let g6 = ((px >> 5) & 0x3f) as u8;
            let b5 = (px & 0x1f) as u8;
            // Widen to 8 bits, repeating the top bits
            let r = (r5 << 3) | (r5 >> 2);
            let g = (g6 << 2) | (g6 >> 4);
            let b = (b5 << 3) | (b5 >> 2);
            luma4(r, g, b)
        }
        [r, g, b, ..] => luma4(r, g, b),
        [] => 0,
    }
}

/// Packs nibbles into panel bytes
struct NibblePacker {
    packing: Packing,
    pending: Option<u8>,
}

impl NibblePacker {
    fn new(packing: Packing) -> Self {
        Self {
            packing,
            pending: None,
        }
    }

    fn push<D: DisplaySink>(&mut self, nibble: u8, display: &mut D) {
        match self.packing {
            Packing::Duplicate => display.send((nibble << 4) | nibble),
            Packing::Pair => match self.pending.take() {
                Some(high) => display.send((high << 4) | nibble),
                None => self.pending = Some(nibble),
            },
        }
    }

    /// Pad an odd trailing pixel with itself
    fn finish<D: DisplaySink>(&mut self, display: &mut D) {
        if let Some(high) = self.pending.take() {
            display.send((high << 4) | high);
        }
    }
}

/// Decode the whole image into the panel and refresh it.
///
/// Returns the number of pixels delivered.
pub fn deliver_image<S, B, D>(
    decoder: &mut SlicDecoder<S>,
    bus: &mut B,
    display: &mut D,
    config: &FrameConfig,
) -> Result<u32, DeliveryError>
where
    S: ByteSource,
    B: BusSelect,
    D: DisplaySink,
{
    let meta = *decoder.meta();
    if meta.width != config.image_width || meta.height != config.image_height {
        warn!(
            "Image is {}x{}, panel expects {}x{}",
            meta.width, meta.height, config.image_width, config.image_height
        );
    }
    let bpp = meta.bytes_per_pixel();

    bus.select(BusDevice::Display);
    display.begin_frame().map_err(|e| {
        warn!("Display begin failed: {:?}", e);
        DeliveryError::Display
    })?;

    let mut chunk = [0u8; PIXEL_CHUNK_BYTES];
    let mut packer = NibblePacker::new(config.packing);
    let mut delivered = 0u32;
    let mut chunks = 0u32;

    loop {
        bus.select(BusDevice::Storage);
        let outcome = decoder.decode(&mut chunk)?;
        let pixels = outcome.pixels();

        bus.select(BusDevice::Display);
        for pixel in chunk[..pixels * bpp].chunks_exact(bpp) {
            packer.push(pixel_nibble(pixel), display);
        }

        delivered += pixels as u32;
        chunks += 1;
        debug!("Chunk {}: {} pixels, {} total", chunks, pixels, delivered);

        if outcome.is_done() {
            break;
        }
    }
    packer.finish(display);

    display.end_frame().map_err(|e| {
        warn!("Display refresh failed: {:?}", e);
        DeliveryError::Display
    })?;

    info!("Delivered {} pixels in {} chunks", delivered, chunks);
    Ok(delivered)
}
