// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The escape-time evaluator.
//!
//! A point is iterated under `z -> z^power + c`, with the power taken
//! in polar form so that non-integral exponents work, until either the
//! orbit leaves the disc of radius 2 or the iteration cap is reached.
//! Escaping orbits get a fractional ("smooth") iteration count, which
//! is what removes the banding between integral iteration levels in
//! the final image.  Nothing here allocates; this loop is the cost of
//! the whole program.

use num::Complex;

/// Squared radius past which an orbit is considered escaped.
pub const ESCAPE_RADIUS_SQR: f64 = 4.0;

/// How an orbit ended.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Escape {
    /// The orbit left the escape radius.  Carries the smooth
    /// iteration count `n + 1 - ln(ln |z|) / ln(power)`.
    Escaped(f64),
    /// The orbit stayed bounded up to the iteration cap, or its smooth
    /// count was not a finite number (which happens for `power <= 1`
    /// and for orbits that overflow), and the point is treated as
    /// part of the set.
    Inside,
}

/// The outcome of iterating one point.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Evaluation {
    /// Iterations completed before the orbit escaped, or the cap.
    pub iterations: u32,
    /// `|z|^2` of the last iterate.
    pub norm_sqr: f64,
    /// Escape classification.
    pub escape: Escape,
}

impl Evaluation {
    /// The smooth escape value the palette consumes: the fractional
    /// count for escaped orbits, `max_iterations` for points inside.
    pub fn smooth_value(&self, max_iterations: u32) -> f64 {
        match self.escape {
            Escape::Escaped(mu) => mu,
            Escape::Inside => f64::from(max_iterations),
        }
    }

    /// Whether the point is treated as part of the set.
    pub fn is_inside(&self) -> bool {
        self.escape == Escape::Inside
    }
}

/// One application of `z^power + c`, in polar form.
#[inline]
pub fn step(z: Complex<f64>, c: Complex<f64>, power: f64) -> Complex<f64> {
    let r = (z.re * z.re + z.im * z.im).sqrt();
    let theta = z.im.atan2(z.re);
    let rp = r.powf(power);
    let (sin, cos) = (power * theta).sin_cos();
    Complex::new(rp * cos + c.re, rp * sin + c.im)
}

/// Iterate `start` under `z -> z^power + c` for at most
/// `max_iterations` steps.
///
/// The starting point itself is not tested for escape; the first test
/// happens after the first step, and `iterations` counts the steps
/// that stayed inside the radius.
pub fn evaluate(start: Complex<f64>, c: Complex<f64>, power: f64, max_iterations: u32) -> Evaluation {
    let mut z = start;
    let mut n = 0;
    while n < max_iterations {
        z = step(z, c, power);
        let norm_sqr = z.norm_sqr();
        if norm_sqr > ESCAPE_RADIUS_SQR {
            let mu = f64::from(n) + 1.0 - z.norm().ln().ln() / power.ln();
            let escape = if mu.is_finite() {
                Escape::Escaped(mu)
            } else {
                Escape::Inside
            };
            return Evaluation {
                iterations: n,
                norm_sqr,
                escape,
            };
        }
        n += 1;
    }
    Evaluation {
        iterations: n,
        norm_sqr: z.norm_sqr(),
        escape: Escape::Inside,
    }
}
