// SPDX-License-Identifier: Apache-2.0
// Copyright 2021 Keylime Authors

//! Digest values and the hash operations used to combine them.

use crate::algorithms::HashAlgorithm;
use openssl::{error::ErrorStack, hash::Hasher};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A digest value held in a PCR, or a composite PCR digest.
///
/// The value is not tied to an algorithm; callers check the length
/// against [`HashAlgorithm::size`] wherever a value enters a profile.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct Digest(
    #[serde(
        serialize_with = "serialize_as_hex",
        deserialize_with = "deserialize_as_hex"
    )]
    Vec<u8>,
);

impl Digest {
    pub fn new(value: &[u8]) -> Self {
        Self(value.to_vec())
    }

    /// Returns the initial value of a PCR in the bank for `algorithm`.
    pub fn zero(algorithm: HashAlgorithm) -> Self {
        Self(vec![0x00u8; algorithm.size()])
    }

    pub fn value(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Digest {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for Digest {
    fn from(value: &[u8]) -> Self {
        Self::new(value)
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&str> for Digest {
    type Error = hex::FromHexError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        hex::decode(value).map(Self)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

fn serialize_as_hex<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&hex::encode(bytes))
}

fn deserialize_as_hex<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    String::deserialize(deserializer)
        .and_then(|string| hex::decode(string).map_err(serde::de::Error::custom))
}

/// Hashes the concatenation of `data` with `algorithm`.
pub fn hash(
    algorithm: HashAlgorithm,
    data: &[&[u8]],
) -> Result<Digest, ErrorStack> {
    let mut hasher = Hasher::new(algorithm.into())?;
    for chunk in data {
        hasher.update(chunk)?;
    }
    Ok(Digest(hasher.finish()?.to_vec()))
}

/// Computes the value a PCR holding `current` has after being extended
/// with `value`, that is `H(current || value)`.
pub fn extend(
    algorithm: HashAlgorithm,
    current: &[u8],
    value: &[u8],
) -> Result<Digest, ErrorStack> {
    hash(algorithm, &[current, value])
}
