// SPDX-License-Identifier: Apache-2.0
// Copyright 2021 Keylime Authors

use crate::pcr::PcrValuesList;
use log::*;
use std::mem;

/// Index of the root context in the arena.
const ROOT: usize = 0;

/// State of one branch of a profile while its PCR values are computed.
#[derive(Debug)]
struct ComputeContext {
    parent: Option<usize>,
    values: PcrValuesList,
}

/// Contexts of every branch opened so far, and the stack of branches still
/// being processed. The top of the stack is the branch that instructions
/// are currently applied to.
#[derive(Debug)]
pub(crate) struct ComputeContextStack {
    contexts: Vec<ComputeContext>,
    stack: Vec<usize>,
}

impl ComputeContextStack {
    pub(crate) fn new() -> Self {
        Self {
            contexts: vec![ComputeContext {
                parent: None,
                values: PcrValuesList::root(),
            }],
            stack: vec![ROOT],
        }
    }

    fn top_index(&self) -> usize {
        // The root context is never popped
        self.stack[self.stack.len() - 1]
    }

    /// The values of the branch currently being processed.
    pub(crate) fn top(&mut self) -> &mut PcrValuesList {
        let index = self.top_index();
        &mut self.contexts[index].values
    }

    pub(crate) fn is_root(&self) -> bool {
        self.top_index() == ROOT
    }

    /// Parks the current branch and opens `n` sub-branches, each starting
    /// from a copy of the current values. The first sub-branch ends up on
    /// top of the stack.
    pub(crate) fn handle_branches(&mut self, n: usize) {
        let parent = self.top_index();
        let values = mem::take(&mut self.contexts[parent].values);
        trace!(
            "Opening {n} branches from context {parent} with {} paths",
            values.len()
        );

        let first = self.contexts.len();
        for _ in 0..n {
            self.contexts.push(ComputeContext {
                parent: Some(parent),
                values: values.clone(),
            });
        }
        self.stack.extend((first..first + n).rev());
    }

    /// Closes the branch on top of the stack, moving its values to the end
    /// of its parent's values.
    pub(crate) fn finish_branch(&mut self) {
        let index = self.top_index();
        let Some(parent) = self.contexts[index].parent else {
            panic!("cannot finish the root branch of a profile");
        };
        self.stack.pop();

        let values = mem::take(&mut self.contexts[index].values);
        trace!(
            "Merging {} paths from context {index} into context {parent}",
            values.len()
        );
        self.contexts[parent].values.append(values);

        // Contexts past the last open one are finished
        if let Some(&last_open) = self.stack.iter().max() {
            self.contexts.truncate(last_open + 1);
        }
    }

    /// Consumes the stack, returning the values of the root branch.
    pub(crate) fn into_root_values(mut self) -> PcrValuesList {
        debug_assert!(self.is_root(), "branches are still open");
        mem::take(&mut self.contexts[ROOT].values)
    }
}
