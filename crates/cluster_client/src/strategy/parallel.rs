// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;

use super::ReplicaStrategy;

/// Contacts `N` replicas at once and replaces each rejected attempt with the next replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelStrategy {
    parallelism: usize,
}

impl ParallelStrategy {
    /// Creates a strategy keeping `parallelism` attempts in flight. Values below `1` are
    /// raised to `1`.
    #[must_use]
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
        }
    }

    /// The configured parallelism.
    #[must_use]
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }
}

impl ReplicaStrategy for ParallelStrategy {
    fn label(&self) -> Cow<'static, str> {
        Cow::Owned(format!("Parallel-{}", self.parallelism))
    }

    fn initial_parallelism(&self) -> usize {
        self.parallelism
    }

    fn max_parallelism(&self) -> usize {
        self.parallelism
    }
}
