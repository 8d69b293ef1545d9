// SPDX-License-Identifier: Apache-2.0
// Copyright 2021 Keylime Authors

//! Computation of the PCR values and composite PCR digests a key sealed to
//! a TPM is protected against.
//!
//! Profiles are built with [`profile::PcrProtectionProfile`] and evaluated
//! against an optional [`source::PcrSource`] providing live PCR values,
//! such as [`tpm::TpmPcrSource`].

pub mod algorithms;
pub mod config;
pub mod digest;
pub mod error;
pub mod pcr;
pub mod profile;
pub mod source;
pub mod tpm;
