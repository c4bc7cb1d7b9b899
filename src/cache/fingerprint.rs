//! Request fingerprinting for content-addressed artifacts
//!
//! Same generator + same inputs = same fingerprint = same artifact.

use crate::error::{StencilError, StencilResult};
use crate::request::GenerationRequest;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Hex length of a SHA-256 digest
const FINGERPRINT_LEN: usize = 64;

/// Filesystem-safe identifier of a generation request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Validate a fingerprint received from outside (CLI, HTTP layer)
    pub fn parse(value: &str) -> StencilResult<Self> {
        let valid = value.len() == FINGERPRINT_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(StencilError::InvalidFingerprint(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = StencilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = StencilError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}

/// Compute the fingerprint of a request.
///
/// Options and answers contribute in key order, arguments in the order given.
/// Every field is length-prefixed so no two distinct requests share a hash
/// input.
pub fn fingerprint(request: &GenerationRequest) -> Fingerprint {
    let mut hasher = Sha256::new();

    update_field(&mut hasher, request.generator().as_bytes());

    update_count(&mut hasher, request.options().len());
    for (key, value) in request.options() {
        update_field(&mut hasher, key.as_bytes());
        update_field(&mut hasher, value.as_bytes());
    }

    update_count(&mut hasher, request.answers().len());
    for (key, value) in request.answers() {
        update_field(&mut hasher, key.as_bytes());
        update_field(&mut hasher, value.as_bytes());
    }

    update_count(&mut hasher, request.args().len());
    for arg in request.args() {
        update_field(&mut hasher, arg.as_bytes());
    }

    Fingerprint(hex::encode(hasher.finalize()))
}

fn update_count(hasher: &mut Sha256, count: usize) {
    hasher.update((count as u64).to_le_bytes());
}

fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    update_count(hasher, bytes.len());
    hasher.update(bytes);
}
