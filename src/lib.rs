#![deny(missing_docs)]
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Fractal cache
//!
//! Renders escape-time fractals and keeps every image it has ever
//! rendered, addressed by a fingerprint of the parameters that made
//! it.  Each point of the image is iterated under the generalized
//! power map `z -> z^power + c`, starting from the point itself, and
//! the number of iterations it takes the orbit to leave the disc of
//! radius 2 decides its color.  With `power = 2` these are the
//! classic Julia sets; any positive power works, integral or not.
//!
//! Rendering is expensive, so it sits behind a `Coordinator`.  The
//! coordinator fingerprints each request (SHA-256 over a canonical
//! text form), answers from its `ArtifactStore` when it can, makes
//! sure a given request is never rendered twice at once, and admits
//! only one render into the process at a time, turning other callers
//! away with `Busy` rather than queueing them.  Renders can be
//! cancelled and are bounded by a deadline; both are checked between
//! rows.

pub mod artifact;
pub mod coordinator;
pub mod errors;
pub mod escape;
pub mod fingerprint;
pub mod palette;
pub mod planes;
pub mod render;
pub mod request;
pub mod store;

pub use artifact::Artifact;
pub use coordinator::{Completed, Config, Coordinator, Stats};
pub use errors::{GenerateError, RenderError, StoreError};
pub use escape::{evaluate, Escape, Evaluation};
pub use fingerprint::{fingerprint, Fingerprint};
pub use palette::{colorize, ColorScheme, Rgba};
pub use planes::{map_pixel, Pixel, PlaneMapper};
pub use render::{CancelToken, PixelSample, Renderer};
pub use request::GenerationRequest;
pub use store::{ArtifactStore, DirectoryStore, MemoryStore};
