// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::time::Duration;

use super::{AttemptTimeoutArgs, ReplicaStrategy, split_evenly};

/// Tries replicas one after another.
///
/// Each attempt gets an equal share of the remaining time, so a slow replica cannot consume
/// the whole budget of the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialStrategy;

impl ReplicaStrategy for SequentialStrategy {
    fn label(&self) -> Cow<'static, str> {
        Cow::Borrowed("Sequential")
    }

    fn initial_parallelism(&self) -> usize {
        1
    }

    fn max_parallelism(&self) -> usize {
        1
    }

    fn attempt_timeout(&self, args: AttemptTimeoutArgs) -> Duration {
        split_evenly(args.remaining(), args.remaining_replicas())
    }
}
