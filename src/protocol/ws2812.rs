//! WS2812B single-wire protocol rendered as an SPI bit stream.
//!
//! Every protocol bit becomes three SPI symbol-bits that all start high:
//! `100` is a logical 0 and `110` a logical 1. At ~2.4 MHz one symbol lasts
//! ~0.42us, which puts both high times inside the datasheet windows. One
//! color byte therefore expands to exactly three SPI bytes, and a pixel to
//! nine. The frame ends with an all-low gap the strip uses as its latch.

use crate::pixel_format::{ChannelOrder, Rgb};

/// SPI symbol-bits per protocol bit
pub const SYMBOLS_PER_BIT: usize = 3;

/// Encoded bytes per pixel: 3 channels x 8 bits x 3 symbols / 8
pub const BYTES_PER_PIXEL: usize = 3 * 8 * SYMBOLS_PER_BIT / 8;

const BIT_0: u32 = 0b100;
const BIT_1: u32 = 0b110;

const fn expand_byte(byte: u8) -> [u8; 3] {
    let mut bits: u32 = 0;
    let mut i = 0;
    while i < 8 {
        let pattern = if (byte >> (7 - i)) & 1 == 1 { BIT_1 } else { BIT_0 };
        bits = (bits << 3) | pattern;
        i += 1;
    }
    [(bits >> 16) as u8, (bits >> 8) as u8, bits as u8]
}

const fn build_lookup() -> [[u8; 3]; 256] {
    let mut table = [[0u8; 3]; 256];
    let mut byte = 0;
    while byte < 256 {
        table[byte] = expand_byte(byte as u8);
        byte += 1;
    }
    table
}

/// Pre-computed expansion of every color byte value
static LOOKUP: [[u8; 3]; 256] = build_lookup();

/// Number of zero bytes needed to hold the line low for `reset_us` at `clock_hz`
pub fn reset_len(clock_hz: u32, reset_us: u32) -> usize {
    let bits = (reset_us as u64 * clock_hz as u64).div_ceil(1_000_000);
    bits.div_ceil(8) as usize
}

/// Stateless frame encoder for one strip variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ws2812Encoder {
    order: ChannelOrder,
    reset_len: usize,
}

impl Ws2812Encoder {
    pub fn new(order: ChannelOrder, reset_len: usize) -> Self {
        Ws2812Encoder { order, reset_len }
    }

    /// Length of the encoded frame for `led_count` pixels
    pub fn frame_len(&self, led_count: usize) -> usize {
        led_count * BYTES_PER_PIXEL + self.reset_len
    }

    /// Encode a full frame, brightness applied, latch gap appended
    pub fn encode(&self, pixels: &[Rgb], brightness: u8) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.frame_len(pixels.len()));

        for pixel in pixels {
            for channel in self.order.arrange(pixel.scale(brightness)) {
                frame.extend_from_slice(&LOOKUP[channel as usize]);
            }
        }

        frame.resize(frame.len() + self.reset_len, 0);
        frame
    }
}
