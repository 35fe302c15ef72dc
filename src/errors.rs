// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The failure taxonomy shared by the renderer, the artifact stores
//! and the generation coordinator.
//!
//! `GenerateError` is what callers of the coordinator see.  It is
//! `Clone` because a single render outcome is handed to every caller
//! that waited on the same fingerprint, which is also why store and
//! render failures are flattened into their display strings when they
//! cross into it.

use failure::Fail;
use std::io;

/// Everything that can go wrong while asking the coordinator for an
/// artifact.
#[derive(Clone, Debug, Fail, PartialEq)]
pub enum GenerateError {
    /// The request was malformed or out of range.  Never admitted.
    #[fail(display = "invalid request: {}", _0)]
    InvalidRequest(String),

    /// Another render holds the process-wide gate.
    #[fail(display = "another fractal is currently generating, try again later")]
    Busy,

    /// The render was cancelled from outside.
    #[fail(display = "fractal generation cancelled")]
    Cancelled,

    /// The render, or the wait for it, ran past its deadline.
    #[fail(display = "fractal generation aborted due to time limit")]
    TimedOut,

    /// A numeric or encoding fault inside the renderer.
    #[fail(display = "fractal generation failed: {}", _0)]
    RenderFailure(String),

    /// The artifact store refused to answer or to persist.
    #[fail(display = "artifact store failure: {}", _0)]
    Store(String),

    /// An eviction was attempted while the fingerprint was rendering.
    #[fail(display = "a render for this fingerprint is still in flight")]
    InFlight,
}

impl GenerateError {
    /// The HTTP status a routing layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            GenerateError::InvalidRequest(_) => 422,
            GenerateError::Busy => 429,
            GenerateError::Cancelled => 499,
            GenerateError::TimedOut => 408,
            GenerateError::RenderFailure(_) => 500,
            GenerateError::Store(_) => 500,
            GenerateError::InFlight => 409,
        }
    }
}

/// Reasons a single render pass stops without producing an image.
#[derive(Clone, Debug, Fail, PartialEq)]
pub enum RenderError {
    /// The request cannot be rendered at all.
    #[fail(display = "invalid request: {}", _0)]
    InvalidRequest(String),

    /// The cancellation token fired between rows.
    #[fail(display = "render cancelled")]
    Cancelled,

    /// The deadline passed between rows.
    #[fail(display = "render deadline exceeded")]
    TimedOut,

    /// The finished raster could not be encoded.
    #[fail(display = "could not encode image: {}", _0)]
    Encode(String),

    /// A row worker panicked.
    #[fail(display = "render worker panicked")]
    WorkerPanicked,
}

impl From<RenderError> for GenerateError {
    fn from(err: RenderError) -> GenerateError {
        match err {
            RenderError::InvalidRequest(reason) => GenerateError::InvalidRequest(reason),
            RenderError::Cancelled => GenerateError::Cancelled,
            RenderError::TimedOut => GenerateError::TimedOut,
            other => GenerateError::RenderFailure(other.to_string()),
        }
    }
}

/// Failures of an artifact store.
#[derive(Debug, Fail)]
pub enum StoreError {
    /// The backing filesystem failed.
    #[fail(display = "artifact store I/O error: {}", _0)]
    Io(#[cause] io::Error),

    /// A stored entry exists but cannot be trusted.
    #[fail(display = "corrupt artifact {}: {}", fingerprint, reason)]
    Corrupt {
        /// Hex fingerprint of the damaged entry.
        fingerprint: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> StoreError {
        StoreError::Io(err)
    }
}

impl From<StoreError> for GenerateError {
    fn from(err: StoreError) -> GenerateError {
        GenerateError::Store(err.to_string())
    }
}
