// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The parameters of one fractal image, their validation, and the
//! canonical text form that fingerprints are computed over.

use num::Complex;
use serde::Deserialize;

use crate::palette::ColorScheme;

/// Largest accepted width or height, in pixels.
pub const MAX_DIMENSION: u32 = 16_384;

/// Largest accepted iteration cap.
pub const MAX_ITERATIONS: u32 = 1_000_000;

/// Everything that determines the pixels of an image.  Two requests
/// render the same image, and share a fingerprint, exactly when every
/// field compares equal.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Iteration cap per point.
    pub max_iterations: u32,
    /// Exponent of the iterated map.  Need not be integral.
    pub power: f64,
    /// The constant added after each exponentiation.
    pub c: Complex<f64>,
    /// Half-width of the square viewport.
    pub scale: f64,
    /// Real coordinate of the viewport center.
    pub offset_x: f64,
    /// Imaginary coordinate of the viewport center.
    pub offset_y: f64,
    /// Palette.
    pub color_scheme: ColorScheme,
}

impl Default for GenerationRequest {
    fn default() -> GenerationRequest {
        GenerationRequest {
            width: 1920,
            height: 1080,
            max_iterations: 500,
            power: 2.0,
            c: Complex::new(0.285, 0.01),
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            color_scheme: ColorScheme::Rainbow,
        }
    }
}

impl GenerationRequest {
    /// The viewport center as a complex number.
    pub fn offset(&self) -> Complex<f64> {
        Complex::new(self.offset_x, self.offset_y)
    }

    /// Reject anything the renderer cannot render, with a reason.
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "image size {}x{} must be at least 1x1",
                self.width, self.height
            ));
        }
        if self.width > MAX_DIMENSION || self.height > MAX_DIMENSION {
            return Err(format!(
                "image size {}x{} exceeds {}x{}",
                self.width, self.height, MAX_DIMENSION, MAX_DIMENSION
            ));
        }
        if self.max_iterations == 0 || self.max_iterations > MAX_ITERATIONS {
            return Err(format!(
                "iteration count {} must be between 1 and {}",
                self.max_iterations, MAX_ITERATIONS
            ));
        }
        if !self.power.is_finite() || self.power <= 0.0 {
            return Err(format!("power {} must be a positive number", self.power));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(format!("scale {} must be a positive number", self.scale));
        }
        let finite = [
            ("real part of c", self.c.re),
            ("imaginary part of c", self.c.im),
            ("offsetX", self.offset_x),
            ("offsetY", self.offset_y),
        ];
        for &(name, value) in &finite {
            if !value.is_finite() {
                return Err(format!("{} must be finite, got {}", name, value));
            }
        }
        Ok(())
    }

    /// The canonical text form: a compact JSON object with the fields
    /// in a fixed order, numbers in shortest round-trip decimal
    /// notation without exponents, and negative zero written as zero.
    /// Only meaningful for requests that pass `validate`.
    pub fn canonical_form(&self) -> String {
        format!(
            "{{\"width\":{},\"height\":{},\"maxIterations\":{},\"power\":{},\
             \"c\":{{\"real\":{},\"imag\":{}}},\"scale\":{},\"offsetX\":{},\"offsetY\":{},\
             \"colorScheme\":\"{}\"}}",
            self.width,
            self.height,
            self.max_iterations,
            canonical_float(self.power),
            canonical_float(self.c.re),
            canonical_float(self.c.im),
            canonical_float(self.scale),
            canonical_float(self.offset_x),
            canonical_float(self.offset_y),
            self.color_scheme.name(),
        )
    }

    /// Parse the canonical form back.  Field order and whitespace are
    /// not checked, so this also accepts hand-written parameter files.
    pub fn from_canonical_form(text: &str) -> Result<GenerationRequest, serde_json::Error> {
        let raw: CanonicalRequest = serde_json::from_str(text)?;
        Ok(GenerationRequest {
            width: raw.width,
            height: raw.height,
            max_iterations: raw.max_iterations,
            power: raw.power,
            c: Complex::new(raw.c.real, raw.c.imag),
            scale: raw.scale,
            offset_x: raw.offset_x,
            offset_y: raw.offset_y,
            color_scheme: ColorScheme::from_name(&raw.color_scheme),
        })
    }
}

// Adding positive zero turns -0.0 into 0.0 and leaves everything else
// alone, so values that compare equal print identically.
fn canonical_float(value: f64) -> f64 {
    value + 0.0
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalRequest {
    width: u32,
    height: u32,
    max_iterations: u32,
    power: f64,
    c: CanonicalComplex,
    scale: f64,
    offset_x: f64,
    offset_y: f64,
    color_scheme: String,
}

#[derive(Deserialize)]
struct CanonicalComplex {
    real: f64,
    imag: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> GenerationRequest {
        GenerationRequest {
            width: 100,
            height: 100,
            max_iterations: 50,
            ..GenerationRequest::default()
        }
    }

    #[test]
    fn canonical_form_has_fixed_order_and_notation() {
        assert_eq!(
            scenario().canonical_form(),
            "{\"width\":100,\"height\":100,\"maxIterations\":50,\"power\":2,\
             \"c\":{\"real\":0.285,\"imag\":0.01},\"scale\":1,\"offsetX\":0,\"offsetY\":0,\
             \"colorScheme\":\"rainbow\"}"
        );
    }

    #[test]
    fn negative_zero_is_written_as_zero() {
        let mut r = scenario();
        r.offset_x = -0.0;
        r.c = Complex::new(0.285, -0.0);
        assert_eq!(r.canonical_form(), scenario().canonical_form().replace("0.01", "0"));
    }

    #[test]
    fn canonical_form_parses_back() {
        let mut r = scenario();
        r.power = 2.5;
        r.offset_y = -0.000_000_1;
        r.color_scheme = ColorScheme::Fire;
        let parsed = GenerationRequest::from_canonical_form(&r.canonical_form()).unwrap();
        assert_eq!(parsed, r);
    }

    #[test]
    fn unknown_schemes_parse_as_hsl() {
        let text = scenario().canonical_form().replace("rainbow", "neon");
        let parsed = GenerationRequest::from_canonical_form(&text).unwrap();
        assert_eq!(parsed.color_scheme, ColorScheme::Hsl);
    }

    #[test]
    fn defaults_are_valid() {
        assert!(GenerationRequest::default().validate().is_ok());
    }

    #[test]
    fn validation_rejects_degenerate_requests() {
        let bad = vec![
            GenerationRequest { width: 0, ..scenario() },
            GenerationRequest { height: MAX_DIMENSION + 1, ..scenario() },
            GenerationRequest { max_iterations: 0, ..scenario() },
            GenerationRequest { power: 0.0, ..scenario() },
            GenerationRequest { power: -2.0, ..scenario() },
            GenerationRequest { power: std::f64::NAN, ..scenario() },
            GenerationRequest { scale: 0.0, ..scenario() },
            GenerationRequest { scale: std::f64::INFINITY, ..scenario() },
            GenerationRequest { offset_x: std::f64::NAN, ..scenario() },
            GenerationRequest { c: Complex::new(0.0, std::f64::INFINITY), ..scenario() },
        ];
        for request in bad {
            assert!(request.validate().is_err(), "{:?} should be rejected", request);
        }
    }

    #[test]
    fn fractional_and_unit_powers_are_allowed() {
        assert!(GenerationRequest { power: 0.5, ..scenario() }.validate().is_ok());
        assert!(GenerationRequest { power: 1.0, ..scenario() }.validate().is_ok());
    }
}
