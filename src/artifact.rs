// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A rendered image together with the request that produced it.

use std::sync::Arc;

use crate::fingerprint::Fingerprint;
use crate::request::GenerationRequest;

/// An immutable rendered image.  Created once per distinct fingerprint
/// and shared from then on; cloning only bumps a reference count on
/// the image bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct Artifact {
    /// The content address of `request`.
    pub fingerprint: Fingerprint,
    /// The parameters the image was rendered from.
    pub request: GenerationRequest,
    /// PNG-encoded RGBA raster.
    pub png: Arc<[u8]>,
}

impl Artifact {
    /// Wrap freshly encoded bytes, fingerprinting the request.
    pub fn new(request: GenerationRequest, png: Vec<u8>) -> Artifact {
        Artifact {
            fingerprint: Fingerprint::of(&request),
            request,
            png: png.into(),
        }
    }

    /// The file name the image is published under.
    pub fn file_name(&self) -> String {
        format!("{}.png", self.fingerprint)
    }
}
