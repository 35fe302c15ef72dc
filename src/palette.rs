// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Maps smooth escape values to opaque RGBA pixels.
//!
//! Escape values are normalised as `t = sqrt(mu / max_iterations)`;
//! the square root spends more of the palette near the boundary of the
//! set, where the detail is.  Points inside the set are black.

use std::fmt;

/// An RGBA quadruplet, in image byte order.
pub type Rgba = [u8; 4];

/// The color of points inside the set.
pub const INSIDE: Rgba = [0, 0, 0, 255];

/// The palettes a request may ask for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ColorScheme {
    /// Linear gray ramp.
    Grayscale,
    /// Full hue sweep at half lightness.
    Rainbow,
    /// Black through red to orange.
    Fire,
    /// Hue sweep with lightness rising from 20% to 70%.  Also what any
    /// unrecognised scheme name falls back to.
    Hsl,
}

impl ColorScheme {
    /// Every scheme, in the order they are documented.
    pub const ALL: [ColorScheme; 4] = [
        ColorScheme::Rainbow,
        ColorScheme::Grayscale,
        ColorScheme::Fire,
        ColorScheme::Hsl,
    ];

    /// The wire name of the scheme.
    pub fn name(self) -> &'static str {
        match self {
            ColorScheme::Grayscale => "grayscale",
            ColorScheme::Rainbow => "rainbow",
            ColorScheme::Fire => "fire",
            ColorScheme::Hsl => "hsl",
        }
    }

    /// Parse a wire name.  Never fails: unknown names select `Hsl`.
    pub fn from_name(name: &str) -> ColorScheme {
        match name {
            "grayscale" => ColorScheme::Grayscale,
            "rainbow" => ColorScheme::Rainbow,
            "fire" => ColorScheme::Fire,
            _ => ColorScheme::Hsl,
        }
    }
}

impl Default for ColorScheme {
    fn default() -> ColorScheme {
        ColorScheme::Rainbow
    }
}

impl fmt::Display for ColorScheme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Color one pixel.  `smooth` at or above `max_iterations`, or not
/// finite at all, means the point is inside the set.
///
/// Negative smooth values (orbits that escape violently on their first
/// step) have no palette position either and are painted black too.
pub fn colorize(smooth: f64, max_iterations: u32, scheme: ColorScheme) -> Rgba {
    let max = f64::from(max_iterations);
    if !smooth.is_finite() || smooth < 0.0 || smooth >= max {
        return INSIDE;
    }
    let t = (smooth / max).sqrt();
    match scheme {
        ColorScheme::Grayscale => {
            let gray = (t * 255.0).floor() as u8;
            [gray, gray, gray, 255]
        }
        ColorScheme::Rainbow => opaque(hsl_to_rgb(t * 360.0, 100.0, 50.0)),
        ColorScheme::Fire => [(t * 255.0).floor() as u8, (t * 150.0).floor() as u8, 0, 255],
        ColorScheme::Hsl => opaque(hsl_to_rgb(t * 360.0, 100.0, 20.0 + 50.0 * t)),
    }
}

fn opaque(rgb: [u8; 3]) -> Rgba {
    [rgb[0], rgb[1], rgb[2], 255]
}

/// Convert hue in degrees, saturation and lightness in percent, to
/// RGB bytes.
pub fn hsl_to_rgb(hue: f64, saturation: f64, lightness: f64) -> [u8; 3] {
    let h = hue / 360.0;
    let s = saturation / 100.0;
    let l = lightness / 100.0;
    if s == 0.0 {
        let v = channel(l);
        return [v, v, v];
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    [
        channel(hue_to_channel(p, q, h + 1.0 / 3.0)),
        channel(hue_to_channel(p, q, h)),
        channel(hue_to_channel(p, q, h - 1.0 / 3.0)),
    ]
}

// `t` is a hue in turns, shifted per channel.
fn hue_to_channel(p: f64, q: f64, mut t: f64) -> f64 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 1.0 / 2.0 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

fn channel(v: f64) -> u8 {
    (v * 255.0).round() as u8
}
