// SPDX-License-Identifier: Apache-2.0
// Copyright 2021 Keylime Authors

//! PCR value sets, PCR selections and composite PCR digests.

use crate::{
    algorithms::HashAlgorithm,
    digest::{self, Digest},
};
use openssl::error::ErrorStack;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// One complete assignment of PCR values, keyed by bank and PCR index.
///
/// A missing entry means that nothing has been recorded for that PCR.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcrValues(BTreeMap<HashAlgorithm, BTreeMap<u32, Digest>>);

impl PcrValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value recorded for `pcr` in the `alg` bank.
    pub fn get(&self, alg: HashAlgorithm, pcr: u32) -> Option<&Digest> {
        self.0.get(&alg).and_then(|bank| bank.get(&pcr))
    }

    /// Records `value` for `pcr` in the `alg` bank, replacing any previous
    /// value.
    pub fn set_value(&mut self, alg: HashAlgorithm, pcr: u32, value: Digest) {
        let _ = self.0.entry(alg).or_default().insert(pcr, value);
    }

    /// Extends `pcr` in the `alg` bank with `value`. A PCR without a
    /// recorded value starts from all zeroes.
    pub fn extend_value(
        &mut self,
        alg: HashAlgorithm,
        pcr: u32,
        value: &[u8],
    ) -> Result<(), ErrorStack> {
        let current = self
            .0
            .entry(alg)
            .or_default()
            .entry(pcr)
            .or_insert_with(|| Digest::zero(alg));
        *current = digest::extend(alg, current.value(), value)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeMap::is_empty)
    }

    /// Iterates over all recorded values, bank-major and in ascending PCR
    /// order.
    pub fn iter(&self) -> impl Iterator<Item = (HashAlgorithm, u32, &Digest)> {
        self.0.iter().flat_map(|(alg, bank)| {
            bank.iter().map(move |(pcr, value)| (*alg, *pcr, value))
        })
    }

    /// Returns the selection of PCRs that have a recorded value.
    pub fn selection_list(&self) -> PcrSelectionList {
        PcrSelectionList(
            self.0
                .iter()
                .filter(|(_, bank)| !bank.is_empty())
                .map(|(alg, bank)| PcrSelection {
                    hash: *alg,
                    pcrs: bank.keys().copied().collect(),
                })
                .collect(),
        )
    }

    /// Computes the composite digest of every recorded value using `alg`.
    ///
    /// The digest is taken over the concatenation of the selected values,
    /// in the order in which the returned selection lists them, which is
    /// how the TPM computes the digest for `TPM2_PolicyPCR`.
    pub fn compute_pcr_digest(
        &self,
        alg: HashAlgorithm,
    ) -> Result<(PcrSelectionList, Digest), ErrorStack> {
        let values: Vec<&[u8]> =
            self.iter().map(|(_, _, value)| value.value()).collect();
        let digest = digest::hash(alg, &values)?;
        Ok((self.selection_list(), digest))
    }
}

/// The PCRs selected from a single bank, in ascending order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcrSelection {
    pub hash: HashAlgorithm,
    pub pcrs: Vec<u32>,
}

/// A set of PCRs across banks, bank-major in TPM algorithm order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcrSelectionList(Vec<PcrSelection>);

impl PcrSelectionList {
    pub fn iter(&self) -> impl Iterator<Item = &PcrSelection> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|selection| selection.pcrs.is_empty())
    }

    pub fn contains(&self, alg: HashAlgorithm, pcr: u32) -> bool {
        self.0
            .iter()
            .any(|selection| selection.hash == alg && selection.pcrs.contains(&pcr))
    }
}

impl fmt::Display for PcrSelectionList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (index, selection) in self.0.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            let pcrs: Vec<String> =
                selection.pcrs.iter().map(u32::to_string).collect();
            write!(f, "{}: [{}]", selection.hash, pcrs.join(", "))?;
        }
        write!(f, "}}")
    }
}

/// The live paths through a profile at some point of its evaluation.
///
/// Every operation applies to all paths alike. Cloning the list copies
/// every value set, so lists handed to sibling branches never alias.
#[derive(Clone, Debug, Default)]
pub(crate) struct PcrValuesList(Vec<PcrValues>);

impl PcrValuesList {
    /// A list holding a single path with nothing recorded yet.
    pub(crate) fn root() -> Self {
        Self(vec![PcrValues::new()])
    }

    pub(crate) fn set_value(
        &mut self,
        alg: HashAlgorithm,
        pcr: u32,
        value: &Digest,
    ) {
        for values in self.0.iter_mut() {
            values.set_value(alg, pcr, value.clone());
        }
    }

    pub(crate) fn extend_value(
        &mut self,
        alg: HashAlgorithm,
        pcr: u32,
        value: &[u8],
    ) -> Result<(), ErrorStack> {
        for values in self.0.iter_mut() {
            values.extend_value(alg, pcr, value)?;
        }
        Ok(())
    }

    /// Moves all paths from `other` to the end of this list.
    pub(crate) fn append(&mut self, mut other: PcrValuesList) {
        self.0.append(&mut other.0);
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn into_inner(self) -> Vec<PcrValues> {
        self.0
    }
}
