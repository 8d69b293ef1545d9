// SPDX-License-Identifier: Apache-2.0
// Copyright 2021 Keylime Authors

//! Depth-first traversal of a tree of profiles.
//!
//! A branch instruction is followed by the instructions of each of its
//! sub-profiles in turn, each one terminated by [`Step::EndBranch`]. Once
//! the last sub-profile ends, traversal resumes with the instruction that
//! follows the branch. The root profile has no end marker: the traversal
//! simply finishes.

use super::{Instruction, PcrProtectionProfile};
use std::{slice, sync::Arc};

#[derive(Debug)]
pub(crate) enum Step<'a> {
    Instruction(&'a Instruction),
    EndBranch,
}

/// Remaining instructions of every open profile. The last cursor belongs
/// to the innermost profile, the first one to the root.
#[derive(Debug)]
pub(crate) struct Traversal<'a> {
    cursors: Vec<slice::Iter<'a, Instruction>>,
}

impl<'a> Traversal<'a> {
    pub(crate) fn new(profile: &'a PcrProtectionProfile) -> Self {
        Self {
            cursors: vec![profile.instructions.iter()],
        }
    }

    /// Opens `profiles` so that their instructions are returned next, the
    /// first profile first.
    fn descend(&mut self, profiles: &'a [Arc<PcrProtectionProfile>]) {
        self.cursors.extend(
            profiles
                .iter()
                .rev()
                .map(|profile| profile.instructions.iter()),
        );
    }
}

impl<'a> Iterator for Traversal<'a> {
    type Item = Step<'a>;

    fn next(&mut self) -> Option<Step<'a>> {
        loop {
            let cursor = self.cursors.last_mut()?;
            match cursor.next() {
                Some(instr) => {
                    if let Instruction::Branch(profiles) = instr {
                        // An empty branch point has no matching end marker
                        if profiles.is_empty() {
                            continue;
                        }
                        self.descend(profiles);
                    }
                    return Some(Step::Instruction(instr));
                }
                None => {
                    self.cursors.pop();
                    if self.cursors.is_empty() {
                        // End of the root profile
                        return None;
                    }
                    return Some(Step::EndBranch);
                }
            }
        }
    }
}
