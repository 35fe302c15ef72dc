// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Content addresses for generation requests.
//!
//! A fingerprint is the SHA-256 digest of a request's canonical form
//! (see `GenerationRequest::canonical_form`).  Nothing about the
//! process, the platform or map iteration order goes into it, so a
//! fingerprint computed today names the same image tomorrow, and is
//! safe to use as a file name.

use failure::Fail;
use sha2::digest::Output;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::request::GenerationRequest;

/// A 256-bit content identifier.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint a request.
    pub fn of(request: &GenerationRequest) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(request.canonical_form().as_bytes());
        Fingerprint(hasher.finalize().into())
    }

    /// Lowercase hex, 64 characters.
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

/// Free-function spelling of `Fingerprint::of`.
pub fn fingerprint(request: &GenerationRequest) -> Fingerprint {
    Fingerprint::of(request)
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let digest: Output<Sha256> = self.0.into();
        write!(f, "{:x}", digest)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

/// A string that is not 64 hex digits.
#[derive(Clone, Debug, Fail, PartialEq)]
#[fail(display = "not a fingerprint: {:?}", _0)]
pub struct FingerprintParseError(pub String);

impl FromStr for Fingerprint {
    type Err = FingerprintParseError;

    fn from_str(s: &str) -> Result<Fingerprint, FingerprintParseError> {
        let invalid = || FingerprintParseError(s.to_string());
        if s.len() != 64 || !s.is_ascii() {
            return Err(invalid());
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[2 * i..2 * i + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Fingerprint(bytes))
    }
}
