// SPDX-License-Identifier: Apache-2.0
// Copyright 2021 Keylime Authors

use crate::{
    algorithms::HashAlgorithm,
    digest::Digest,
    pcr::PcrValues,
    tpm::{Result, TpmError},
};
use log::*;

/// Provides the current value of a PCR when a profile is evaluated.
///
/// Implementations may block on I/O. Any error aborts the evaluation that
/// requested the value.
pub trait PcrSource {
    fn read_pcr(&mut self, alg: HashAlgorithm, pcr: u32) -> Result<Digest>;
}

/// A snapshot of PCR values, for instance replayed from an event log,
/// can stand in for the TPM.
impl PcrSource for PcrValues {
    fn read_pcr(&mut self, alg: HashAlgorithm, pcr: u32) -> Result<Digest> {
        trace!("Reading PCR {pcr} from {alg} bank of PCR snapshot");
        self.get(alg, pcr)
            .cloned()
            .ok_or(TpmError::PcrUnavailable { alg, pcr })
    }
}
