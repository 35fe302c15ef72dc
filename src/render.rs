// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The renderer drives the plane mapper, the escape-time evaluator
//! and the palette across every pixel of a request, and encodes the
//! result as a PNG.
//!
//! No pixel depends on any other, so the image is split into rows and
//! the rows are handed out to a pool of scoped worker threads from a
//! shared queue.  Before taking a row every worker checks the
//! cancellation token and the deadline, which bounds how long a
//! cancelled or expired render keeps running to one row's worth of
//! work per worker.

use image::png::PNGEncoder;
use image::ColorType;
use log::{debug, info};
use num::Complex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::artifact::Artifact;
use crate::errors::RenderError;
use crate::escape::{evaluate, Evaluation};
use crate::palette::{colorize, Rgba};
use crate::planes::{Pixel, PlaneMapper};
use crate::request::GenerationRequest;

/// A cooperative stop signal shared between whoever wants a render to
/// stop and the render itself.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not fired.
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Ask every holder of this token to stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether `cancel` has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything computed for one pixel.  Lives for the duration of one
/// row and is never stored.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PixelSample {
    /// The pixel's point on the complex plane.
    pub point: Complex<f64>,
    /// How its orbit ended.
    pub evaluation: Evaluation,
    /// The color it was given.
    pub rgba: Rgba,
}

impl PixelSample {
    /// Map, iterate and color one pixel.
    #[inline]
    pub fn take(mapper: &PlaneMapper, request: &GenerationRequest, pixel: &Pixel) -> PixelSample {
        let point = mapper.pixel_to_point(pixel);
        let evaluation = evaluate(point, request.c, request.power, request.max_iterations);
        let rgba = colorize(
            evaluation.smooth_value(request.max_iterations),
            request.max_iterations,
            request.color_scheme,
        );
        PixelSample {
            point,
            evaluation,
            rgba,
        }
    }
}

type RowQueue<'a> = Mutex<std::iter::Enumerate<std::slice::ChunksMut<'a, u8>>>;

/// Renders requests into PNG artifacts.
#[derive(Debug)]
pub struct Renderer {
    threads: usize,
}

impl Default for Renderer {
    fn default() -> Renderer {
        Renderer::new(num_cpus::get())
    }
}

impl Renderer {
    /// A renderer using `threads` row workers (at least one).
    pub fn new(threads: usize) -> Renderer {
        Renderer {
            threads: threads.max(1),
        }
    }

    /// Render and encode.
    pub fn render(
        &self,
        request: &GenerationRequest,
        cancel: &CancelToken,
        deadline: Option<Instant>,
    ) -> Result<Artifact, RenderError> {
        let pixels = self.render_pixels(request, cancel, deadline)?;
        let png = encode_png(&pixels, request.width, request.height)?;
        Ok(Artifact::new(request.clone(), png))
    }

    /// Render into a raw row-major RGBA buffer of `width * height * 4`
    /// bytes.
    pub fn render_pixels(
        &self,
        request: &GenerationRequest,
        cancel: &CancelToken,
        deadline: Option<Instant>,
    ) -> Result<Vec<u8>, RenderError> {
        request.validate().map_err(RenderError::InvalidRequest)?;
        let mapper = PlaneMapper::for_request(request);
        let row_bytes = mapper.width() * 4;
        let mut pixels = vec![0u8; mapper.len() * 4];
        info!(
            "rendering {}x{} image, {} iterations, power {}, c = {}",
            request.width, request.height, request.max_iterations, request.power, request.c
        );

        if self.threads == 1 {
            for (row, line) in pixels.chunks_mut(row_bytes).enumerate() {
                checkpoint(cancel, deadline)?;
                render_row(&mapper, request, row, line);
            }
            return Ok(pixels);
        }

        {
            let rows: RowQueue = Mutex::new(pixels.chunks_mut(row_bytes).enumerate());
            let workers = self.threads.min(mapper.height());
            let outcome = crossbeam::scope(|spawner| {
                let handles: Vec<_> = (0..workers)
                    .map(|_| {
                        let rows = &rows;
                        let mapper = &mapper;
                        spawner.spawn(move |_| -> Result<(), RenderError> {
                            loop {
                                checkpoint(cancel, deadline)?;
                                let next = rows
                                    .lock()
                                    .map_err(|_| RenderError::WorkerPanicked)?
                                    .next();
                                match next {
                                    Some((row, line)) => render_row(mapper, request, row, line),
                                    None => return Ok(()),
                                }
                            }
                        })
                    })
                    .collect();

                let mut outcome = Ok(());
                for handle in handles {
                    let result = handle.join().unwrap_or(Err(RenderError::WorkerPanicked));
                    if let Err(err) = result {
                        // A cancellation outranks whatever other workers saw.
                        if outcome.is_ok() || err == RenderError::Cancelled {
                            outcome = Err(err);
                        }
                    }
                }
                outcome
            })
            .map_err(|_| RenderError::WorkerPanicked)?;
            outcome?;
        }
        Ok(pixels)
    }
}

fn checkpoint(cancel: &CancelToken, deadline: Option<Instant>) -> Result<(), RenderError> {
    if cancel.is_cancelled() {
        return Err(RenderError::Cancelled);
    }
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(RenderError::TimedOut),
        _ => Ok(()),
    }
}

fn render_row(mapper: &PlaneMapper, request: &GenerationRequest, row: usize, line: &mut [u8]) {
    if row % 100 == 0 {
        debug!("progress: row {}/{}", row, mapper.height());
    }
    for (column, rgba) in line.chunks_mut(4).enumerate() {
        let sample = PixelSample::take(mapper, request, &Pixel(column, row));
        rgba.copy_from_slice(&sample.rgba);
    }
}

/// Encode a row-major RGBA buffer as PNG.
pub fn encode_png(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>, RenderError> {
    let mut png = Vec::new();
    PNGEncoder::new(&mut png)
        .encode(pixels, width, height, ColorType::RGBA(8))
        .map_err(|err| RenderError::Encode(err.to_string()))?;
    Ok(png)
}
