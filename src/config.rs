use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::pixel_format::{ChannelOrder, Rgb};

/// SPI clock window in which one symbol-bit is a valid T0H and two are a valid T1H
pub const MIN_CLOCK_HZ: u32 = 2_100_000;
pub const MAX_CLOCK_HZ: u32 = 3_600_000;

/// Shortest latch gap the WS2812B datasheet accepts
pub const MIN_RESET_US: u32 = 50;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub spi: SpiConfig,
    pub strip: StripConfig,
    pub startup: StartupConfig,
    pub animation: AnimationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpiConfig {
    pub bus: u8,
    pub device: u8,
    pub clock_hz: u32,
}

impl Default for SpiConfig {
    fn default() -> Self {
        SpiConfig {
            bus: 0,
            device: 0,
            clock_hz: 2_400_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StripConfig {
    pub led_count: usize,
    /// Wire order of the strip variant; not detectable, must be configured
    pub channel_order: ChannelOrder,
    /// Low time after each frame, in microseconds
    pub reset_us: u32,
    pub brightness: u8,
    /// Color applied once the startup ring has finished
    pub initial_color: Rgb,
}

impl Default for StripConfig {
    fn default() -> Self {
        StripConfig {
            led_count: 16,
            channel_order: ChannelOrder::Grb,
            reset_us: 80,
            brightness: 255,
            initial_color: Rgb::new(64, 64, 64),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StartupConfig {
    pub enabled: bool,
    pub color: Rgb,
    pub step_delay_ms: u64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        StartupConfig {
            enabled: true,
            color: Rgb::new(64, 64, 64),
            step_delay_ms: 30,
        }
    }
}

impl StartupConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub breathing_steps: u32,
    pub breathing_delay_ms: u64,
    pub rainbow_delay_ms: u64,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        AnimationConfig {
            breathing_steps: 20,
            breathing_delay_ms: 50,
            rainbow_delay_ms: 100,
        }
    }
}

impl AnimationConfig {
    pub fn breathing_delay(&self) -> Duration {
        Duration::from_millis(self.breathing_delay_ms)
    }

    pub fn rainbow_delay(&self) -> Duration {
        Duration::from_millis(self.rainbow_delay_ms)
    }
}

impl Config {
    /// Load a JSON config file; fields left out keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let config_data = fs::read_to_string(path)
            .context(format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&config_data)
            .context(format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Reject settings that would break the WS2812B timing
    pub fn validate(&self) -> Result<()> {
        ensure!(
            (MIN_CLOCK_HZ..=MAX_CLOCK_HZ).contains(&self.spi.clock_hz),
            "spi.clock_hz {} is outside {}..={} Hz; the 3-bit encoding needs ~2.4 MHz",
            self.spi.clock_hz,
            MIN_CLOCK_HZ,
            MAX_CLOCK_HZ
        );
        ensure!(
            self.strip.reset_us >= MIN_RESET_US,
            "strip.reset_us {} is below the {}us latch minimum",
            self.strip.reset_us,
            MIN_RESET_US
        );
        ensure!(
            self.animation.breathing_steps >= 1,
            "animation.breathing_steps must be at least 1"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.spi.clock_hz, 2_400_000);
        assert_eq!(config.strip.led_count, 16);
        assert_eq!(config.strip.channel_order, ChannelOrder::Grb);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "http": { "port": 9000 },
            "strip": { "led_count": 60, "channel_order": "RGB", "initial_color": { "r": 1, "g": 2, "b": 3 } }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.http.port, 9000);
        assert_eq!(config.http.host, "0.0.0.0");
        assert_eq!(config.strip.led_count, 60);
        assert_eq!(config.strip.channel_order, ChannelOrder::Rgb);
        assert_eq!(config.strip.initial_color, Rgb::new(1, 2, 3));
        assert_eq!(config.strip.reset_us, 80);
        assert!(config.startup.enabled);
    }

    #[test]
    fn test_rejects_bad_timing() {
        let mut config = Config::default();
        config.spi.clock_hz = 8_000_000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.strip.reset_us = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.animation.breathing_steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_channel_order() {
        let json = r#"{ "strip": { "channel_order": "RGBW" } }"#;
        assert!(serde_json::from_str::<Config>(json).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/ws2812.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
