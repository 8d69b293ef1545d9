// SPDX-License-Identifier: Apache-2.0
// Copyright 2021 Keylime Authors

//! PCR protection profiles.
//!
//! A profile is a sequence of instructions describing how PCR values are
//! computed. Alternative boot paths are described by attaching
//! sub-profiles with [`PcrProtectionProfile::add_branches`]: each
//! sub-profile inherits the values computed by its parent up to the
//! branch point. Evaluating a profile yields one set of PCR values per
//! complete path, which can then be reduced to the PCR selection and the
//! list of composite PCR digests a key is sealed against.
//!
//! ```ignore
//! let mut grub = PcrProtectionProfile::new();
//! grub.extend_pcr(HashAlgorithm::Sha256, 4, grub_digest);
//! let mut systemd_boot = PcrProtectionProfile::new();
//! systemd_boot.extend_pcr(HashAlgorithm::Sha256, 4, sd_boot_digest);
//!
//! let mut profile = PcrProtectionProfile::new();
//! profile
//!     .add_pcr_value_from_live(HashAlgorithm::Sha256, 7)
//!     .add_branches([Arc::new(grub), Arc::new(systemd_boot)]);
//!
//! let (pcrs, digests) = profile
//!     .compute_pcr_digests(Some(&mut tpm), HashAlgorithm::Sha256)?;
//! ```

mod compute;
mod traversal;

use crate::{
    algorithms::HashAlgorithm,
    digest::Digest,
    error::{ProfileError, Result},
    pcr::{PcrSelectionList, PcrValues},
    source::PcrSource,
};
use compute::ComputeContextStack;
use log::*;
use std::{fmt, sync::Arc};
use traversal::{Step, Traversal};

/// A building block of a [`PcrProtectionProfile`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Set a PCR to a fixed value.
    AddPcrValue {
        alg: HashAlgorithm,
        pcr: u32,
        value: Digest,
    },
    /// Set a PCR to the value it currently holds, read when the profile is
    /// evaluated.
    AddPcrValueFromLive { alg: HashAlgorithm, pcr: u32 },
    /// Extend a PCR with a value.
    ExtendPcr {
        alg: HashAlgorithm,
        pcr: u32,
        value: Digest,
    },
    /// Continue with each of the sub-profiles as an alternative path.
    Branch(Vec<Arc<PcrProtectionProfile>>),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Instruction::AddPcrValue { alg, pcr, value } => {
                write!(f, "AddPcrValue({alg}, {pcr}, {value})")
            }
            Instruction::AddPcrValueFromLive { alg, pcr } => {
                write!(f, "AddPcrValueFromLive({alg}, {pcr})")
            }
            Instruction::ExtendPcr { alg, pcr, value } => {
                write!(f, "ExtendPcr({alg}, {pcr}, {value})")
            }
            Instruction::Branch(profiles) => {
                write!(f, "AddBranches({} profiles)", profiles.len())
            }
        }
    }
}

/// Describes the combinations of PCR values a sealed key is protected
/// against.
///
/// The builder methods return the same profile so that calls can be
/// chained. Sub-profiles are shared through [`Arc`] and are never modified
/// once attached, so a finished profile tree can be evaluated from several
/// threads at once.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PcrProtectionProfile {
    instructions: Vec<Instruction>,
}

impl PcrProtectionProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Sets `pcr` in the `alg` bank to `value`, replacing any value
    /// computed before by this profile.
    ///
    /// # Panics
    ///
    /// Panics if the length of `value` is not the digest size of `alg`.
    pub fn add_pcr_value(
        &mut self,
        alg: HashAlgorithm,
        pcr: u32,
        value: Digest,
    ) -> &mut Self {
        assert_eq!(value.len(), alg.size(), "invalid digest length");
        self.instructions
            .push(Instruction::AddPcrValue { alg, pcr, value });
        self
    }

    /// Sets `pcr` in the `alg` bank to its current value, replacing any
    /// value computed before by this profile. The value is read from the
    /// [`PcrSource`] every time the profile is evaluated.
    pub fn add_pcr_value_from_live(
        &mut self,
        alg: HashAlgorithm,
        pcr: u32,
    ) -> &mut Self {
        self.instructions
            .push(Instruction::AddPcrValueFromLive { alg, pcr });
        self
    }

    /// Extends `pcr` in the `alg` bank with `value`. If this profile has no
    /// value for the PCR yet, it starts from all zeroes.
    ///
    /// # Panics
    ///
    /// Panics if the length of `value` is not the digest size of `alg`.
    pub fn extend_pcr(
        &mut self,
        alg: HashAlgorithm,
        pcr: u32,
        value: Digest,
    ) -> &mut Self {
        assert_eq!(value.len(), alg.size(), "invalid digest length");
        self.instructions
            .push(Instruction::ExtendPcr { alg, pcr, value });
        self
    }

    /// Adds alternative paths. Each sub-profile inherits the values
    /// computed by this profile so far, and the instructions that follow
    /// apply to every path. All paths must end up with values for the same
    /// set of PCRs for [`compute_pcr_digests`](Self::compute_pcr_digests)
    /// to succeed.
    ///
    /// An empty set of sub-profiles is allowed and has no effect.
    pub fn add_branches<I>(&mut self, profiles: I) -> &mut Self
    where
        I: IntoIterator<Item = Arc<PcrProtectionProfile>>,
    {
        self.instructions
            .push(Instruction::Branch(profiles.into_iter().collect()));
        self
    }

    fn traverse(&self) -> Traversal<'_> {
        Traversal::new(self)
    }

    /// Computes the PCR values of every complete path through this profile,
    /// in depth-first order. The result is not de-duplicated.
    ///
    /// `source` is only consulted for [`Instruction::AddPcrValueFromLive`],
    /// once per instruction reached.
    pub fn compute_pcr_values(
        &self,
        mut source: Option<&mut dyn PcrSource>,
    ) -> Result<Vec<PcrValues>> {
        let mut contexts = ComputeContextStack::new();

        for step in self.traverse() {
            match step {
                Step::Instruction(Instruction::AddPcrValue {
                    alg,
                    pcr,
                    value,
                }) => contexts.top().set_value(*alg, *pcr, value),
                Step::Instruction(Instruction::AddPcrValueFromLive {
                    alg,
                    pcr,
                }) => {
                    let (alg, pcr) = (*alg, *pcr);
                    let source = source
                        .as_deref_mut()
                        .ok_or(ProfileError::NoLiveSource { alg, pcr })?;
                    let value = source.read_pcr(alg, pcr).map_err(|e| {
                        ProfileError::PcrRead { alg, pcr, source: e }
                    })?;
                    if value.len() != alg.size() {
                        return Err(ProfileError::InvalidLiveDigest {
                            alg,
                            pcr,
                            len: value.len(),
                            expected: alg.size(),
                        });
                    }
                    contexts.top().set_value(alg, pcr, &value);
                }
                Step::Instruction(Instruction::ExtendPcr { alg, pcr, value }) => {
                    contexts.top().extend_value(*alg, *pcr, value.value())?
                }
                Step::Instruction(Instruction::Branch(profiles)) => {
                    // Processing of the current branch is parked until every
                    // sub-branch has been processed
                    contexts.handle_branches(profiles.len())
                }
                Step::EndBranch => contexts.finish_branch(),
            }
        }

        let values = contexts.into_root_values().into_inner();
        debug!("Computed PCR values for {} branches", values.len());
        Ok(values)
    }

    /// Computes the PCR selection and the de-duplicated list of composite
    /// PCR digests (computed with `alg`) of every complete path through
    /// this profile.
    ///
    /// The selection is taken from the first path. Fails with
    /// [`ProfileError::InconsistentBranches`] if any path has values for a
    /// different set of PCRs.
    pub fn compute_pcr_digests(
        &self,
        source: Option<&mut dyn PcrSource>,
        alg: HashAlgorithm,
    ) -> Result<(PcrSelectionList, Vec<Digest>)> {
        let values = self.compute_pcr_values(source)?;

        let Some(first) = values.first() else {
            unreachable!("a profile always has at least one branch");
        };
        let pcrs = first.selection_list();

        let mut digests: Vec<Digest> = Vec::with_capacity(values.len());
        for (branch, v) in values.iter().enumerate() {
            let (selection, digest) = v.compute_pcr_digest(alg)?;
            if selection != pcrs {
                return Err(ProfileError::InconsistentBranches {
                    branch,
                    expected: pcrs,
                    found: selection,
                });
            }
            if !digests.contains(&digest) {
                digests.push(digest);
            }
        }

        debug!(
            "Computed {} unique PCR digests from {} branches over PCRs {pcrs}",
            digests.len(),
            values.len()
        );
        Ok((pcrs, digests))
    }
}

/// Position within the sub-profiles of a branch while rendering.
struct BranchCursor {
    index: usize,
    total: usize,
}

impl fmt::Display for PcrProtectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const INDENT: usize = 3;

        let mut branches: Vec<BranchCursor> = Vec::new();
        let mut branch_start = false;

        for step in self.traverse() {
            let depth = branches.len() * INDENT;
            if branch_start {
                branch_start = false;
                if let Some(cursor) = branches.last() {
                    writeln!(f, "{:depth$}Branch {} {{", "", cursor.index)?;
                }
            }

            match step {
                Step::Instruction(Instruction::Branch(profiles)) => {
                    writeln!(f, "{:depth$} AddBranches(", "")?;
                    branches.push(BranchCursor {
                        index: 0,
                        total: profiles.len(),
                    });
                    branch_start = true;
                }
                Step::Instruction(instr) => {
                    writeln!(f, "{:depth$} {instr}", "")?
                }
                Step::EndBranch => {
                    writeln!(f, "{:depth$}}}", "")?;
                    if let Some(cursor) = branches.last_mut() {
                        cursor.index += 1;
                        if cursor.index < cursor.total {
                            // Sibling branches left to print
                            branch_start = true;
                        } else {
                            branches.pop();
                            writeln!(f, "{:width$} )", "", width = depth - INDENT)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{digest, tpm::TpmError};

    const ALG: HashAlgorithm = HashAlgorithm::Sha256;

    fn value(byte: u8) -> Digest {
        Digest::from(vec![byte; ALG.size()])
    }

    /// Source returning a fixed value and counting how often it is read.
    struct CountingSource {
        value: Digest,
        reads: usize,
    }

    impl PcrSource for CountingSource {
        fn read_pcr(
            &mut self,
            _alg: HashAlgorithm,
            _pcr: u32,
        ) -> crate::tpm::Result<Digest> {
            self.reads += 1;
            Ok(self.value.clone())
        }
    }

    struct FailingSource;

    impl PcrSource for FailingSource {
        fn read_pcr(
            &mut self,
            alg: HashAlgorithm,
            pcr: u32,
        ) -> crate::tpm::Result<Digest> {
            Err(TpmError::PcrUnavailable { alg, pcr })
        }
    }

    #[test]
    fn test_sequential_instructions() {
        let mut profile = PcrProtectionProfile::new();
        profile
            .add_pcr_value(ALG, 0, value(1))
            .add_pcr_value(ALG, 0, value(2))
            .add_pcr_value(ALG, 1, value(3))
            .extend_pcr(ALG, 1, value(4))
            .extend_pcr(ALG, 2, value(5));

        let values = profile.compute_pcr_values(None).unwrap(); //#[allow_ci]
        assert_eq!(values.len(), 1);

        let pcr1 =
            digest::extend(ALG, value(3).value(), value(4).value()).unwrap(); //#[allow_ci]
        let pcr2 =
            digest::extend(ALG, Digest::zero(ALG).value(), value(5).value())
                .unwrap(); //#[allow_ci]
        assert_eq!(values[0].get(ALG, 0), Some(&value(2)));
        assert_eq!(values[0].get(ALG, 1), Some(&pcr1));
        assert_eq!(values[0].get(ALG, 2), Some(&pcr2));
    }

    #[test]
    fn test_extend_equals_add_of_extended_zero() {
        let mut extended = PcrProtectionProfile::new();
        extended.extend_pcr(ALG, 4, value(9));

        let expected =
            digest::extend(ALG, Digest::zero(ALG).value(), value(9).value())
                .unwrap(); //#[allow_ci]
        let mut added = PcrProtectionProfile::new();
        added.add_pcr_value(ALG, 4, expected);

        assert_eq!(
            extended.compute_pcr_values(None).unwrap(), //#[allow_ci]
            added.compute_pcr_values(None).unwrap() //#[allow_ci]
        );
    }

    #[test]
    fn test_empty_profile_has_one_empty_branch() {
        let profile = PcrProtectionProfile::new();
        assert!(profile.is_empty());
        let values = profile.compute_pcr_values(None).unwrap(); //#[allow_ci]
        assert_eq!(values, vec![PcrValues::new()]);
    }

    #[test]
    fn test_branches_inherit_parent_values() {
        let mut subs = Vec::new();
        for byte in 1..=3 {
            let mut sub = PcrProtectionProfile::new();
            sub.add_pcr_value(ALG, 12, value(byte));
            subs.push(Arc::new(sub));
        }

        let mut profile = PcrProtectionProfile::new();
        profile
            .add_pcr_value(ALG, 7, value(7))
            .add_branches(subs)
            .extend_pcr(ALG, 14, value(14));

        let values = profile.compute_pcr_values(None).unwrap(); //#[allow_ci]
        assert_eq!(values.len(), 3);
        let pcr14 =
            digest::extend(ALG, Digest::zero(ALG).value(), value(14).value())
                .unwrap(); //#[allow_ci]
        for (v, byte) in values.iter().zip(1..=3) {
            assert_eq!(v.get(ALG, 7), Some(&value(7)));
            assert_eq!(v.get(ALG, 12), Some(&value(byte)));
            assert_eq!(v.get(ALG, 14), Some(&pcr14));
        }
    }

    #[test]
    fn test_empty_branch_point_keeps_paths() {
        let mut profile = PcrProtectionProfile::new();
        profile
            .add_pcr_value(ALG, 7, value(7))
            .add_branches(Vec::new())
            .add_pcr_value(ALG, 8, value(8));

        let values = profile.compute_pcr_values(None).unwrap(); //#[allow_ci]
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].get(ALG, 8), Some(&value(8)));
    }

    #[test]
    fn test_live_value_read_once_per_evaluation() {
        let mut profile = PcrProtectionProfile::new();
        profile.add_pcr_value_from_live(ALG, 7);

        let mut source = CountingSource {
            value: value(0x42),
            reads: 0,
        };
        for expected_reads in 1..=2 {
            let values = profile.compute_pcr_values(Some(&mut source)).unwrap(); //#[allow_ci]
            assert_eq!(values[0].get(ALG, 7), Some(&value(0x42)));
            assert_eq!(source.reads, expected_reads);
        }
    }

    #[test]
    fn test_live_value_without_source() {
        let mut profile = PcrProtectionProfile::new();
        profile.add_pcr_value_from_live(ALG, 7);

        let result = profile.compute_pcr_values(None);
        assert!(matches!(
            result,
            Err(ProfileError::NoLiveSource { pcr: 7, .. })
        ));
    }

    #[test]
    fn test_live_value_read_failure() {
        let mut profile = PcrProtectionProfile::new();
        profile
            .add_pcr_value(ALG, 0, value(0))
            .add_pcr_value_from_live(ALG, 7);

        let result = profile.compute_pcr_values(Some(&mut FailingSource));
        assert!(matches!(
            result,
            Err(ProfileError::PcrRead {
                pcr: 7,
                source: TpmError::PcrUnavailable { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_live_value_with_invalid_length() {
        let mut profile = PcrProtectionProfile::new();
        profile.add_pcr_value_from_live(ALG, 7);

        let mut source = CountingSource {
            value: Digest::from(vec![0u8; 20]),
            reads: 0,
        };
        let result = profile.compute_pcr_values(Some(&mut source));
        assert!(matches!(
            result,
            Err(ProfileError::InvalidLiveDigest {
                len: 20,
                expected: 32,
                ..
            })
        ));
    }

    #[test]
    #[should_panic(expected = "invalid digest length")]
    fn test_add_pcr_value_invalid_length() {
        let mut profile = PcrProtectionProfile::new();
        profile.add_pcr_value(ALG, 0, Digest::from(vec![0u8; 20]));
    }

    #[test]
    #[should_panic(expected = "invalid digest length")]
    fn test_extend_pcr_invalid_length() {
        let mut profile = PcrProtectionProfile::new();
        profile.extend_pcr(HashAlgorithm::Sha1, 0, value(0));
    }

    #[test]
    fn test_compute_digests_deduplicates() {
        let mut same_a = PcrProtectionProfile::new();
        same_a.add_pcr_value(ALG, 12, value(1));
        // Different instructions, same resulting value
        let mut same_b = PcrProtectionProfile::new();
        same_b
            .add_pcr_value(ALG, 12, value(9))
            .add_pcr_value(ALG, 12, value(1));
        let mut other = PcrProtectionProfile::new();
        other.add_pcr_value(ALG, 12, value(2));

        let mut profile = PcrProtectionProfile::new();
        profile.add_pcr_value(ALG, 7, value(7)).add_branches([
            Arc::new(same_a),
            Arc::new(other),
            Arc::new(same_b),
        ]);

        let (pcrs, digests) =
            profile.compute_pcr_digests(None, ALG).unwrap(); //#[allow_ci]
        assert!(pcrs.contains(ALG, 7));
        assert!(pcrs.contains(ALG, 12));
        assert_eq!(digests.len(), 2);

        let first =
            digest::hash(ALG, &[value(7).value(), value(1).value()]).unwrap(); //#[allow_ci]
        let second =
            digest::hash(ALG, &[value(7).value(), value(2).value()]).unwrap(); //#[allow_ci]
        assert_eq!(digests, vec![first, second]);
    }

    #[test]
    fn test_compute_digests_inconsistent_branches() {
        let mut with_b = PcrProtectionProfile::new();
        with_b.add_pcr_value(ALG, 1, value(1));
        let mut with_c = PcrProtectionProfile::new();
        with_c.add_pcr_value(ALG, 2, value(2));

        let mut profile = PcrProtectionProfile::new();
        profile
            .add_pcr_value(ALG, 0, value(0))
            .add_branches([Arc::new(with_b), Arc::new(with_c)]);

        let result = profile.compute_pcr_digests(None, ALG);
        assert!(matches!(
            result,
            Err(ProfileError::InconsistentBranches { branch: 1, .. })
        ));
    }

    #[test]
    fn test_compute_digests_with_sha1_composite() {
        let mut profile = PcrProtectionProfile::new();
        profile.add_pcr_value(ALG, 7, value(7));

        let (_, digests) = profile
            .compute_pcr_digests(None, HashAlgorithm::Sha1)
            .unwrap(); //#[allow_ci]
        assert_eq!(digests.len(), 1);
        assert_eq!(digests[0].len(), HashAlgorithm::Sha1.size());
    }

    #[test]
    fn test_display() {
        let mut sub_a = PcrProtectionProfile::new();
        sub_a.add_pcr_value(ALG, 12, value(0xaa));
        let mut sub_b = PcrProtectionProfile::new();
        sub_b.extend_pcr(ALG, 12, value(0xbb));

        let mut profile = PcrProtectionProfile::new();
        profile
            .add_pcr_value_from_live(ALG, 7)
            .add_branches([Arc::new(sub_a), Arc::new(sub_b)]);

        let expected = format!(
            " AddPcrValueFromLive(sha256, 7)\n \
             AddBranches(\n   \
             Branch 0 {{\n    \
             AddPcrValue(sha256, 12, {})\n   \
             }}\n   \
             Branch 1 {{\n    \
             ExtendPcr(sha256, 12, {})\n   \
             }}\n \
             )\n",
            value(0xaa),
            value(0xbb)
        );
        assert_eq!(profile.to_string(), expected);
    }

    #[test]
    fn test_display_nested_branches() {
        let mut leaf = PcrProtectionProfile::new();
        leaf.add_pcr_value(ALG, 12, value(0xb0));

        let mut outer_a = PcrProtectionProfile::new();
        outer_a.add_pcr_value(ALG, 4, value(0xa0)).add_branches([
            Arc::new(leaf),
            Arc::new(PcrProtectionProfile::new()),
        ]);
        let mut outer_b = PcrProtectionProfile::new();
        outer_b.add_pcr_value(ALG, 4, value(0xc0));

        let mut profile = PcrProtectionProfile::new();
        profile
            .add_branches([Arc::new(outer_a), Arc::new(outer_b)])
            .add_pcr_value(ALG, 14, value(0xd0));

        let expected = [
            " AddBranches(".to_string(),
            "   Branch 0 {".to_string(),
            format!("    AddPcrValue(sha256, 4, {})", value(0xa0)),
            "    AddBranches(".to_string(),
            "      Branch 0 {".to_string(),
            format!("       AddPcrValue(sha256, 12, {})", value(0xb0)),
            "      }".to_string(),
            "      Branch 1 {".to_string(),
            "      }".to_string(),
            "    )".to_string(),
            "   }".to_string(),
            "   Branch 1 {".to_string(),
            format!("    AddPcrValue(sha256, 4, {})", value(0xc0)),
            "   }".to_string(),
            " )".to_string(),
            format!(" AddPcrValue(sha256, 14, {})", value(0xd0)),
        ];
        let mut expected = expected.join("\n");
        expected.push('\n');
        assert_eq!(profile.to_string(), expected);
    }
}
