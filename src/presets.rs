use crate::pixel_format::Rgb;

/// Named colors accepted by the HTTP surface, in display order
pub const PRESETS: &[(&str, Rgb)] = &[
    ("red", Rgb::new(255, 0, 0)),
    ("orange", Rgb::new(255, 127, 0)),
    ("yellow", Rgb::new(255, 255, 0)),
    ("green", Rgb::new(0, 255, 0)),
    ("blue", Rgb::new(0, 0, 255)),
    ("indigo", Rgb::new(75, 0, 130)),
    ("violet", Rgb::new(148, 0, 211)),
    ("white", Rgb::new(255, 255, 255)),
    ("warm", Rgb::new(255, 147, 41)),
    ("cyan", Rgb::new(0, 255, 255)),
    ("magenta", Rgb::new(255, 0, 255)),
    ("pink", Rgb::new(255, 105, 180)),
    ("purple", Rgb::new(128, 0, 128)),
    ("off", Rgb::OFF),
];

/// Rainbow palette, red through violet
pub const RAINBOW: [Rgb; 7] = [
    Rgb::new(255, 0, 0),
    Rgb::new(255, 127, 0),
    Rgb::new(255, 255, 0),
    Rgb::new(0, 255, 0),
    Rgb::new(0, 0, 255),
    Rgb::new(75, 0, 130),
    Rgb::new(148, 0, 211),
];

pub fn lookup(name: &str) -> Option<Rgb> {
    PRESETS
        .iter()
        .find(|(preset, _)| preset.eq_ignore_ascii_case(name.trim()))
        .map(|&(_, color)| color)
}
