//! Per-depth decode loops

use super::consts::*;
use super::{ByteSource, DecodeError, SlicDecoder};

fn rgba_hash(px: u32) -> usize {
    let [r, g, b, a] = px.to_le_bytes();
    (usize::from(r) * 3 + usize::from(g) * 5 + usize::from(b) * 7 + usize::from(a) * 11) & 63
}

fn gray_hash(px: u8) -> usize {
    (usize::from(px) * 3) & 7
}

fn rgb565_hash(px: u16) -> usize {
    let r = usize::from(px >> 11);
    let g = usize::from((px >> 5) & 0x3f);
    let b = usize::from(px & 0x1f);
    (r * 3 + g * 5 + b * 7) & 7
}

/// Run length of an 8/16 bpp RUN opcode
fn short_run(op: u8) -> u32 {
    match op {
        OP_RUN8_1024 => 1024,
        OP_RUN8_256 => 256,
        _ => u32::from(op) + 1,
    }
}

/// Reject runs that reach past the last pixel
fn checked_run(len: u32, left: u32, op: u8) -> Result<u32, DecodeError> {
    if len > left {
        Err(DecodeError::Opcode { op })
    } else {
        Ok(len)
    }
}

/// Add a biased delta field to a channel
fn delta(channel: u8, field: u8, bias: u8) -> u8 {
    channel.wrapping_add(field).wrapping_sub(bias)
}

impl<S: ByteSource> SlicDecoder<S> {
    /// 8 bpp gray or palette indices, one byte per pixel
    pub(super) fn decode_gray(&mut self, out: &mut [u8]) -> Result<(), DecodeError> {
        let Self { input, state, .. } = self;
        let mut px = state.px as u8;
        let mut i = 0;

        if state.extra_pixel {
            state.extra_pixel = false;
            out[i] = px;
            i += 1;
        }

        while i < out.len() {
            if state.run > 0 {
                out[i] = px;
                i += 1;
                state.run -= 1;
                continue;
            }
            if state.bad_run > 0 {
                px = input.next_byte()?;
                state.index[gray_hash(px)] = u32::from(px);
                out[i] = px;
                i += 1;
                state.bad_run -= 1;
                continue;
            }

            let left = state.remaining - i as u32;
            let op = input.next_byte()?;
            match op & OP_MASK {
                OP_RUN8 => state.run = checked_run(short_run(op), left, op)?,
                OP_BADRUN8 => state.bad_run = checked_run(u32::from(op & 0x3f) + 1, left, op)?,
                OP_INDEX8 => {
                    out[i] = state.index[usize::from(op & 7)] as u8;
                    i += 1;
                    px = state.index[usize::from((op >> 3) & 7)] as u8;
                    if i < out.len() {
                        out[i] = px;
                        i += 1;
                    } else if (i as u32) < state.remaining {
                        state.extra_pixel = true;
                    }
                }
                _ => {
                    px = delta(px, op & 7, 4);
                    state.index[gray_hash(px)] = u32::from(px);
                    out[i] = px;
                    i += 1;
                    px = delta(px, (op >> 3) & 7, 4);
                    state.index[gray_hash(px)] = u32::from(px);
                    if i < out.len() {
                        out[i] = px;
                        i += 1;
                    } else if (i as u32) < state.remaining {
                        state.extra_pixel = true;
                    }
                }
            }
        }

        state.px = u32::from(px);
        Ok(())
    }

    /// 16 bpp RGB565, little-endian words
    pub(super) fn decode_rgb565(&mut self, out: &mut [u8]) -> Result<(), DecodeError> {
        let Self { input, state, .. } = self;
        let mut px = state.px as u16;
        let pixels = out.len() / 2;
        let mut i = 0;

        let mut put = |i: &mut usize, px: u16| {
            out[*i * 2..*i * 2 + 2].copy_from_slice(&px.to_le_bytes());
            *i += 1;
        };

        if state.extra_pixel {
            state.extra_pixel = false;
            put(&mut i, px);
        }

        while i < pixels {
            if state.run > 0 {
                put(&mut i, px);
                state.run -= 1;
                continue;
            }
            if state.bad_run > 0 {
                let lo = input.next_byte()?;
                let hi = input.next_byte()?;
                px = u16::from_le_bytes([lo, hi]);
                state.index[rgb565_hash(px)] = u32::from(px);
                put(&mut i, px);
                state.bad_run -= 1;
                continue;
            }

            let left = state.remaining - i as u32;
            let op = input.next_byte()?;
            match op & OP_MASK {
                OP_RUN16 => state.run = checked_run(short_run(op), left, op)?,
                OP_BADRUN16 => state.bad_run = checked_run(u32::from(op & 0x3f) + 1, left, op)?,
                OP_INDEX16 => {
                    put(&mut i, state.index[usize::from(op & 7)] as u16);
                    px = state.index[usize::from((op >> 3) & 7)] as u16;
                    if i < pixels {
                        put(&mut i, px);
                    } else if (i as u32) < state.remaining {
                        state.extra_pixel = true;
                    }
                }
                _ => {
                    let r = delta((px >> 11) as u8, (op >> 4) & 3, 2);
                    let g = delta(((px >> 5) & 0x3f) as u8, (op >> 2) & 3, 2);
                    let b = delta((px & 0x1f) as u8, op & 3, 2);
                    px = (u16::from(r & 0x1f) << 11)
                        | (u16::from(g & 0x3f) << 5)
                        | u16::from(b & 0x1f);
                    state.index[rgb565_hash(px)] = u32::from(px);
                    put(&mut i, px);
                }
            }
        }

        state.px = u32::from(px);
        Ok(())
    }

    /// 24/32 bpp, `bpp` bytes of `r, g, b[, a]` per pixel
    pub(super) fn decode_rgba(&mut self, out: &mut [u8], bpp: usize) -> Result<(), DecodeError> {
        let Self { input, state, .. } = self;
        let mut px = state.px;

        for (i, slot) in out.chunks_exact_mut(bpp).enumerate() {
            if state.run > 0 {
                slot.copy_from_slice(&px.to_le_bytes()[..bpp]);
                state.run -= 1;
                continue;
            }

            // Pixels not yet written, this one included
            let left = state.remaining - i as u32;
            let op = input.next_byte()?;
            match op {
                OP_RUN1024 | OP_RUN256 => {
                    let len = if op == OP_RUN1024 { 1024 } else { 256 };
                    // The run also fills this slot
                    state.run = checked_run(len, left, op)? - 1;
                    slot.copy_from_slice(&px.to_le_bytes()[..bpp]);
                    continue;
                }
                OP_RGB => {
                    let mut rgb = [0u8; 3];
                    input.read_exact(&mut rgb)?;
                    px = (px & 0xff00_0000) | u32::from_le_bytes([rgb[0], rgb[1], rgb[2], 0]);
                }
                OP_RGBA => {
                    let mut rgba = [0u8; 4];
                    input.read_exact(&mut rgba)?;
                    px = u32::from_le_bytes(rgba);
                }
                _ => match op & OP_MASK {
                    OP_RUN => {
                        state.run = checked_run(u32::from(op & 0x3f) + 1, left, op)? - 1;
                        slot.copy_from_slice(&px.to_le_bytes()[..bpp]);
                        continue;
                    }
                    OP_INDEX => px = state.index[usize::from(op)],
                    OP_DIFF => {
                        let [r, g, b, a] = px.to_le_bytes();
                        px = u32::from_le_bytes([
                            delta(r, (op >> 4) & 3, 2),
                            delta(g, (op >> 2) & 3, 2),
                            delta(b, op & 3, 2),
                            a,
                        ]);
                    }
                    _ => {
                        let second = input.next_byte()?;
                        let vg = (op & 0x3f).wrapping_sub(32);
                        let dr = vg.wrapping_add(second >> 4).wrapping_sub(8);
                        let db = vg.wrapping_add(second & 0x0f).wrapping_sub(8);
                        let [r, g, b, a] = px.to_le_bytes();
                        px = u32::from_le_bytes([
                            r.wrapping_add(dr),
                            g.wrapping_add(vg),
                            b.wrapping_add(db),
                            a,
                        ]);
                    }
                },
            }

            state.index[rgba_hash(px)] = px;
            slot.copy_from_slice(&px.to_le_bytes()[..bpp]);
        }

        state.px = px;
        Ok(())
    }
}
