// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Contains the PlaneMapper struct, which describes a relationship
//! between a rectangle on the integral plane with an origin at 0,0,
//! and a square viewport on the complex plane described by a center
//! and a half-width (the "scale").
use num::Complex;

use crate::request::GenerationRequest;

/// Describes the x, y of a pixel on the integral plane.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Pixel(pub usize, pub usize);

/// Maps pixels of a `width` by `height` image onto the complex
/// viewport `[-scale, scale]` on both axes, shifted by `offset`.
///
/// Pixel column 0 lands on the left edge of the viewport and column
/// `width` would land on the right edge, so the right edge itself is
/// never sampled.  Same for rows.  The viewport is square regardless
/// of the image's aspect ratio, so non-square images stretch.
#[derive(Debug)]
pub struct PlaneMapper {
    width: usize,
    height: usize,
    // Lower-left corner of the viewport.
    origin: Complex<f64>,
    // Full extent of the viewport along each axis.
    span: Complex<f64>,
}

impl PlaneMapper {
    /// Constructor.  Dimensions of zero are rejected upstream by
    /// request validation; the mapper does not check them.
    pub fn new(width: usize, height: usize, scale: f64, offset: Complex<f64>) -> PlaneMapper {
        let origin = Complex::new(-scale + offset.re, -scale + offset.im);
        let upper = Complex::new(scale + offset.re, scale + offset.im);
        PlaneMapper {
            width,
            height,
            origin,
            span: upper - origin,
        }
    }

    /// The mapper for a request's image size and viewport.
    pub fn for_request(request: &GenerationRequest) -> PlaneMapper {
        PlaneMapper::new(
            request.width as usize,
            request.height as usize,
            request.scale,
            request.offset(),
        )
    }

    /// Width of the integral plane.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height of the integral plane.
    pub fn height(&self) -> usize {
        self.height
    }

    /// The total number of points in the integral grid.  Used to
    /// calculate memory needs.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// Given a pixel on the integral cartesian plane, map that to the
    /// corresponding point on the complex plane.
    #[inline]
    pub fn pixel_to_point(&self, pixel: &Pixel) -> Complex<f64> {
        Complex::new(
            self.origin.re + self.span.re * ((pixel.0 as f64) / (self.width as f64)),
            self.origin.im + self.span.im * ((pixel.1 as f64) / (self.height as f64)),
        )
    }
}

/// One-shot form of `PlaneMapper::pixel_to_point`, for callers that
/// only need a single point.
pub fn map_pixel(
    px: usize,
    py: usize,
    width: usize,
    height: usize,
    scale: f64,
    offset_x: f64,
    offset_y: f64,
) -> Complex<f64> {
    PlaneMapper::new(width, height, scale, Complex::new(offset_x, offset_y))
        .pixel_to_point(&Pixel(px, py))
}
