//! Colors for overlays: fixed RGB values and the HSV gradient used for
//! depth and height coloring.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    /// Builds a color from `0xRRGGBB`.
    pub const fn from_hex(hex: u32) -> Self {
        Self([((hex >> 16) & 0xFF) as u8, ((hex >> 8) & 0xFF) as u8, (hex & 0xFF) as u8])
    }

    pub const fn r(&self) -> u8 {
        self.0[0]
    }

    pub const fn g(&self) -> u8 {
        self.0[1]
    }

    pub const fn b(&self) -> u8 {
        self.0[2]
    }

    /// RGBA with the given alpha, the layout Rerun expects.
    pub const fn with_alpha(&self, alpha: u8) -> [u8; 4] {
        [self.0[0], self.0[1], self.0[2], alpha]
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2])
    }
}

/// Converts HSV to RGB. `hue` in degrees (wrapped into `[0, 360)`),
/// `saturation` and `value` in `[0, 1]`.
pub fn hsv_to_rgb(hue: f64, saturation: f64, value: f64) -> Rgb {
    let h = hue.rem_euclid(360.0) / 60.0;
    let s = saturation.clamp(0.0, 1.0);
    let v = value.clamp(0.0, 1.0);

    let c = v * s;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    let to_u8 = |channel: f64| ((channel + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgb([to_u8(r), to_u8(g), to_u8(b)])
}

/// Linear hue ramp at full saturation and value.
///
/// `t = 0` maps to `start_hue`, `t = 1` to `end_hue`; `t` is clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HueGradient {
    pub start_hue: f64,
    pub end_hue: f64,
}

impl HueGradient {
    /// Red (near) to blue (far).
    pub const DEPTH: Self = Self {
        start_hue: 0.0,
        end_hue: 240.0,
    };

    /// Blue (low) to red (high).
    pub const HEIGHT: Self = Self {
        start_hue: 240.0,
        end_hue: 0.0,
    };

    pub fn new(start_hue: f64, end_hue: f64) -> Self {
        Self { start_hue, end_hue }
    }

    /// Color at normalized position `t`.
    pub fn at(&self, t: f64) -> Rgb {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        hsv_to_rgb(self.start_hue + (self.end_hue - self.start_hue) * t, 1.0, 1.0)
    }

    /// Color of `value` within `[min, max]`. A collapsed range maps to the start.
    pub fn map(&self, value: f64, min: f64, max: f64) -> Rgb {
        let span = max - min;
        let t = if span > f64::EPSILON { (value - min) / span } else { 0.0 };
        self.at(t)
    }
}

impl Default for HueGradient {
    fn default() -> Self {
        Self::DEPTH
    }
}
