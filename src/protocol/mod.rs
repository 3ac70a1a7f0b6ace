mod ws2812;

pub use ws2812::{reset_len, Ws2812Encoder};
