// SPDX-License-Identifier: Apache-2.0
// Copyright 2021 Keylime Authors

use crate::{
    algorithms::HashAlgorithm, config::SecbootConfig, digest::Digest,
    pcr::PcrSelectionList, source::PcrSource,
};
use log::*;
use std::str::FromStr;
use thiserror::Error;
use tss_esapi::{
    abstraction::pcr,
    structures::{
        PcrSelectSize, PcrSelection as TssPcrSelection,
        PcrSelectionList as TssPcrSelectionList, PcrSelectionListBuilder,
        PcrSlot,
    },
    tcti_ldr::TctiNameConf,
    tss2_esys::TPML_PCR_SELECTION,
};

/// TpmError wraps all possible errors raised in tpm.rs
#[derive(Error, Debug)]
pub enum TpmError {
    /// Error parsing the TCTI name configuration
    #[error("Error parsing TCTI name configuration '{path}'")]
    TctiNameError {
        path: String,
        source: tss_esapi::Error,
    },

    /// Error creating TPM context
    #[error("Error creating TPM context")]
    TSSTctiContextError { source: tss_esapi::Error },

    /// Error building PCR Selection list
    #[error("Error building PCR Selection list")]
    TSSPCRSelectionBuildError { source: tss_esapi::Error },

    /// Error getting PCR data
    #[error("Error getting PCR data from TPM")]
    TSSPCRListError { source: tss_esapi::Error },

    /// Malformed PCR selection
    #[error("Malformed PCR selection: {0}")]
    MalformedPCRSelection(String),

    /// The requested PCR has no value in the requested bank
    #[error("PCR {pcr} is not available in the {alg} bank")]
    PcrUnavailable { alg: HashAlgorithm, pcr: u32 },
}

pub type Result<T> = std::result::Result<T, TpmError>;

/// Returns the TCTI used when none is configured: the `TCTI` environment
/// variable, or else the in-kernel resource manager if present.
pub fn default_tcti() -> String {
    match std::env::var("TCTI") {
        Ok(val) => val,
        Err(_) => if std::path::Path::new("/dev/tpmrm0").exists() {
            "device:/dev/tpmrm0"
        } else {
            "device:/dev/tpm0"
        }
        .to_string(),
    }
}

/// Reads live PCR values from a TPM.
#[derive(Debug)]
pub struct TpmPcrSource {
    ctx: tss_esapi::Context,
}

impl TpmPcrSource {
    /// Connects to the TPM reachable through `tcti`.
    pub fn new(tcti: &str) -> Result<Self> {
        let tcti_conf = TctiNameConf::from_str(tcti).map_err(|source| {
            TpmError::TctiNameError {
                path: tcti.to_string(),
                source,
            }
        })?;

        let mut ctx = tss_esapi::Context::new(tcti_conf)
            .map_err(|source| TpmError::TSSTctiContextError { source })?;

        // PCR values of a software TPM say nothing about the platform
        match tss_esapi::utils::get_tpm_vendor(&mut ctx) {
            Ok(vendor) if vendor.contains("SW") => {
                warn!("INSECURE: PCR values are read from a software TPM emulator rather than a real hardware TPM.");
                warn!("INSECURE: Only use this mode for testing or debugging purposes.");
            }
            Ok(vendor) => debug!("Connected to TPM from vendor {vendor}"),
            Err(e) => debug!("Unable to obtain the TPM vendor: {e}"),
        }

        Ok(Self { ctx })
    }

    /// Connects to the TPM set in the configuration, falling back to
    /// [`default_tcti`] when the option is empty.
    pub fn from_config(config: &SecbootConfig) -> Result<Self> {
        if config.tcti.is_empty() {
            Self::new(&default_tcti())
        } else {
            Self::new(&config.tcti)
        }
    }
}

impl PcrSource for TpmPcrSource {
    fn read_pcr(&mut self, alg: HashAlgorithm, pcr: u32) -> Result<Digest> {
        let slot = pcr_slot(pcr)?;
        let selection = PcrSelectionListBuilder::new()
            .with_selection(alg.into(), &[slot])
            .build()
            .map_err(|source| TpmError::TSSPCRSelectionBuildError { source })?;

        let pcr_data = self
            .ctx
            .execute_without_session(|ctx| pcr::read_all(ctx, selection))
            .map_err(|source| TpmError::TSSPCRListError { source })?;

        let digest = pcr_data
            .pcr_bank(alg.into())
            .and_then(|bank| bank.get_digest(slot))
            .ok_or(TpmError::PcrUnavailable { alg, pcr })?;

        debug!("Read PCR {pcr} from {alg} bank of the TPM");
        Ok(Digest::from(digest.value()))
    }
}

/// Banks keep the order of the [`PcrSelectionList`], which is the order the
/// composite PCR digest is computed in.
impl TryFrom<&PcrSelectionList> for TssPcrSelectionList {
    type Error = TpmError;

    fn try_from(selections: &PcrSelectionList) -> Result<Self> {
        let mut tpml: TPML_PCR_SELECTION = Default::default();
        for selection in selections.iter() {
            let index = tpml.count as usize;
            if index >= TssPcrSelectionList::MAX_SIZE {
                return Err(TpmError::MalformedPCRSelection(format!(
                    "at most {} banks can be selected",
                    TssPcrSelectionList::MAX_SIZE
                )));
            }
            let slots = selection
                .pcrs
                .iter()
                .map(|pcr| pcr_slot(*pcr))
                .collect::<Result<Vec<PcrSlot>>>()?;
            let tss_selection = TssPcrSelection::create(
                selection.hash.into(),
                PcrSelectSize::default(),
                &slots,
            )
            .map_err(|source| TpmError::TSSPCRSelectionBuildError { source })?;
            tpml.pcrSelections[index] = tss_selection.into();
            tpml.count += 1;
        }
        TssPcrSelectionList::try_from(tpml)
            .map_err(|source| TpmError::TSSPCRSelectionBuildError { source })
    }
}

fn pcr_slot(pcr: u32) -> Result<PcrSlot> {
    let slot = match pcr {
        0 => PcrSlot::Slot0,
        1 => PcrSlot::Slot1,
        2 => PcrSlot::Slot2,
        3 => PcrSlot::Slot3,
        4 => PcrSlot::Slot4,
        5 => PcrSlot::Slot5,
        6 => PcrSlot::Slot6,
        7 => PcrSlot::Slot7,
        8 => PcrSlot::Slot8,
        9 => PcrSlot::Slot9,
        10 => PcrSlot::Slot10,
        11 => PcrSlot::Slot11,
        12 => PcrSlot::Slot12,
        13 => PcrSlot::Slot13,
        14 => PcrSlot::Slot14,
        15 => PcrSlot::Slot15,
        16 => PcrSlot::Slot16,
        17 => PcrSlot::Slot17,
        18 => PcrSlot::Slot18,
        19 => PcrSlot::Slot19,
        20 => PcrSlot::Slot20,
        21 => PcrSlot::Slot21,
        22 => PcrSlot::Slot22,
        23 => PcrSlot::Slot23,
        other => {
            return Err(TpmError::MalformedPCRSelection(format!(
                "only PCRs 0-23 can be selected, but PCR {other} was requested"
            )))
        }
    };
    Ok(slot)
}
