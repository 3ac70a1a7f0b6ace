use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::controller::ControllerError;

/// One logical LED color, before brightness scaling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    /// Build a pixel from unchecked integer channels, rejecting anything outside 0..=255
    pub fn from_channels(r: i64, g: i64, b: i64) -> Result<Self, ControllerError> {
        let channel = |name: &str, value: i64| {
            u8::try_from(value).map_err(|_| {
                ControllerError::InvalidPixelData(format!(
                    "{} channel {} is outside 0..=255",
                    name, value
                ))
            })
        };
        Ok(Rgb::new(channel("red", r)?, channel("green", g)?, channel("blue", b)?))
    }

    /// Build a pixel from integer channels, clamping each into 0..=255
    pub fn clamped(r: i64, g: i64, b: i64) -> Self {
        let clamp = |v: i64| v.clamp(0, 255) as u8;
        Rgb::new(clamp(r), clamp(g), clamp(b))
    }

    /// Scale every channel by a strip-level brightness (255 is identity, 0 is off)
    pub fn scale(self, brightness: u8) -> Self {
        let scale = |c: u8| ((c as u16 * (brightness as u16 + 1)) >> 8) as u8;
        Rgb::new(scale(self.r), scale(self.g), scale(self.b))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.r, self.g, self.b)
    }
}

/// Order in which a strip variant expects the three channels on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ChannelOrder {
    Rgb,
    Rbg,
    #[default]
    Grb,
    Gbr,
    Brg,
    Bgr,
}

impl ChannelOrder {
    /// Reorder a pixel into wire order
    pub fn arrange(self, pixel: Rgb) -> [u8; 3] {
        let Rgb { r, g, b } = pixel;
        match self {
            ChannelOrder::Rgb => [r, g, b],
            ChannelOrder::Rbg => [r, b, g],
            ChannelOrder::Grb => [g, r, b],
            ChannelOrder::Gbr => [g, b, r],
            ChannelOrder::Brg => [b, r, g],
            ChannelOrder::Bgr => [b, g, r],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelOrder::Rgb => "RGB",
            ChannelOrder::Rbg => "RBG",
            ChannelOrder::Grb => "GRB",
            ChannelOrder::Gbr => "GBR",
            ChannelOrder::Brg => "BRG",
            ChannelOrder::Bgr => "BGR",
        }
    }
}

impl FromStr for ChannelOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RGB" => Ok(ChannelOrder::Rgb),
            "RBG" => Ok(ChannelOrder::Rbg),
            "GRB" => Ok(ChannelOrder::Grb),
            "GBR" => Ok(ChannelOrder::Gbr),
            "BRG" => Ok(ChannelOrder::Brg),
            "BGR" => Ok(ChannelOrder::Bgr),
            other => Err(format!("unknown channel order {:?}", other)),
        }
    }
}

impl TryFrom<String> for ChannelOrder {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChannelOrder> for String {
    fn from(order: ChannelOrder) -> Self {
        order.as_str().to_string()
    }
}
