//! Opcode layout of the SLIC stream
//!
//! Every opcode byte carries a 2-bit tag in its top bits. The tag meaning
//! depends on the image's bits per pixel: 24/32 bpp images use a QOI-style
//! opcode set over RGBA pixels, 8 and 16 bpp images share a smaller set with
//! literal runs and paired index/delta codes.

/// Tag bits of an opcode byte
pub const OP_MASK: u8 = 0b1100_0000;

// ---------------------------------------------------------------------------
// 24/32 bpp
// ---------------------------------------------------------------------------

/// Re-emit a pixel from the color index.
///
/// ```plain
/// .- OP_INDEX --------------.
/// |         Byte[0]         |
/// |  7  6  5  4  3  2  1  0 |
/// |-------+-----------------|
/// |  0  0 |      index      |
/// `-------------------------`
/// ```
pub const OP_INDEX: u8 = 0b0000_0000;

/// Apply a small delta to each color channel of the previous pixel.
///
/// ```plain
/// .- OP_DIFF ---------------.
/// |         Byte[0]         |
/// |  7  6  5  4  3  2  1  0 |
/// |-------+-----+-----+-----|
/// |  0  1 |  dr |  dg |  db |
/// `-------------------------`
/// ```
///
/// Each delta is `-2..1`, stored with a bias of 2. Alpha is kept.
pub const OP_DIFF: u8 = 0b0100_0000;

/// Green delta plus red/blue deltas relative to it.
///
/// ```plain
/// .- OP_LUMA -----------------------------------------.
/// |         Byte[0]         |         Byte[1]         |
/// |  7  6  5  4  3  2  1  0 |  7  6  5  4  3  2  1  0 |
/// |-------+-----------------+-------------+-----------|
/// |  1  0 |   green diff    |   dr - dg   |  db - dg  |
/// `---------------------------------------------------`
/// ```
///
/// Green delta is `-32..31` (bias 32), the other two `-8..7` (bias 8).
pub const OP_LUMA: u8 = 0b1000_0000;

/// Repeat the previous pixel 1..=60 times, stored with a bias of -1.
/// The top four values of the range are taken by the opcodes below.
pub const OP_RUN: u8 = 0b1100_0000;

/// Repeat the previous pixel 256 times
pub const OP_RUN256: u8 = 0b1111_1100;

/// Repeat the previous pixel 1024 times
pub const OP_RUN1024: u8 = 0b1111_1101;

/// Three literal bytes (r, g, b) follow; alpha is kept
pub const OP_RGB: u8 = 0b1111_1110;

/// Four literal bytes (r, g, b, a) follow
pub const OP_RGBA: u8 = 0b1111_1111;

// ---------------------------------------------------------------------------
// 8 and 16 bpp
// ---------------------------------------------------------------------------

/// Repeat the previous pixel `(op & 0x3f) + 1` times.
///
/// ```plain
/// .- OP_RUN8 / OP_RUN16 ----.
/// |         Byte[0]         |
/// |  7  6  5  4  3  2  1  0 |
/// |-------+-----------------|
/// |  0  0 |       run       |
/// `-------------------------`
/// ```
pub const OP_RUN8: u8 = 0b0000_0000;
/// Repeat the previous pixel 256 times
pub const OP_RUN8_256: u8 = 0b0011_1110;
/// Repeat the previous pixel 1024 times
pub const OP_RUN8_1024: u8 = 0b0011_1111;

/// `(op & 0x3f) + 1` literal pixels follow, one byte each for 8 bpp and two
/// bytes (little-endian) each for 16 bpp.
pub const OP_BADRUN8: u8 = 0b0100_0000;

/// Emit two pixels from the 8-entry index.
///
/// ```plain
/// .- OP_INDEX8 / OP_INDEX16 -.
/// |         Byte[0]          |
/// |  7  6  5  4  3  2  1  0  |
/// |-------+--------+---------|
/// |  1  0 | second |  first  |
/// `--------------------------`
/// ```
pub const OP_INDEX8: u8 = 0b1000_0000;

/// 8 bpp: two pixels, each a `-4..3` step (bias 4) from the one before.
///
/// ```plain
/// .- OP_DIFF8 --------------.
/// |         Byte[0]         |
/// |  7  6  5  4  3  2  1  0 |
/// |-------+--------+--------|
/// |  1  1 | second | first  |
/// `-------------------------`
/// ```
pub const OP_DIFF8: u8 = 0b1100_0000;

pub const OP_RUN16: u8 = OP_RUN8;
pub const OP_RUN16_256: u8 = OP_RUN8_256;
pub const OP_RUN16_1024: u8 = OP_RUN8_1024;
pub const OP_BADRUN16: u8 = OP_BADRUN8;
pub const OP_INDEX16: u8 = OP_INDEX8;

/// 16 bpp: one RGB565 pixel with a `-2..1` delta per channel (bias 2).
///
/// ```plain
/// .- OP_DIFF16 -------------.
/// |         Byte[0]         |
/// |  7  6  5  4  3  2  1  0 |
/// |-------+-----+-----+-----|
/// |  1  1 |  dr |  dg |  db |
/// `-------------------------`
/// ```
pub const OP_DIFF16: u8 = 0b1100_0000;
