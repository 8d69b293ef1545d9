// SPDX-License-Identifier: Apache-2.0
// Copyright 2021 Keylime Authors
use crate::{algorithms::HashAlgorithm, pcr::PcrSelectionList, tpm::TpmError};
use thiserror::Error;

/// Errors returned when computing the PCR values or digests of a profile.
#[derive(Error, Debug)]
pub enum ProfileError {
    /// The profile reads a live PCR value but no source was supplied
    #[error("cannot read current value of PCR {pcr} from bank {alg}: no PCR source")]
    NoLiveSource { alg: HashAlgorithm, pcr: u32 },

    /// Reading a live PCR value failed
    #[error("cannot read current value of PCR {pcr} from bank {alg}")]
    PcrRead {
        alg: HashAlgorithm,
        pcr: u32,
        source: TpmError,
    },

    /// A live PCR value does not have the size of its bank's algorithm
    #[error("current value of PCR {pcr} from bank {alg} has {len} bytes, expected {expected}")]
    InvalidLiveDigest {
        alg: HashAlgorithm,
        pcr: u32,
        len: usize,
        expected: usize,
    },

    /// Branches of the profile record values for different sets of PCRs
    #[error("not all branches contain values for the same sets of PCRs: branch {branch} has {found}, expected {expected}")]
    InconsistentBranches {
        branch: usize,
        expected: PcrSelectionList,
        found: PcrSelectionList,
    },

    /// Hash computation failed
    #[error("Hash computation failed: {0}")]
    Hash(#[from] openssl::error::ErrorStack),
}

pub type Result<T> = std::result::Result<T, ProfileError>;
