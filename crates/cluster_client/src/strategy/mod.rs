// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Replica selection strategies.
//!
//! A strategy decides how many replicas are contacted concurrently, when an extra replica is
//! added while earlier attempts are still in flight, and how long each attempt may take. All
//! strategies share one execution loop that honors the request's replica cap, overall deadline
//! and cancellation token, and stops at the first accepted response.
//!
//! | Strategy | Label | Behavior |
//! |---|---|---|
//! | [`SequentialStrategy`] | `Sequential` | One attempt at a time, the remaining time is split between the remaining replicas. |
//! | [`ParallelStrategy`] | `Parallel-N` | `N` attempts at once, a rejected attempt is replaced by the next replica. |
//! | [`ForkingStrategy`] | `Forking-N` | One attempt, then an extra one after each fork delay, up to `N` in flight. |

use std::borrow::Cow;
use std::fmt::Debug;
use std::time::Duration;

mod forking;
mod parallel;
pub(crate) mod runner;
mod sequential;

pub use forking::{ForkingDelay, ForkingStrategy};
pub use parallel::ParallelStrategy;
pub use sequential::SequentialStrategy;

/// Policy deciding how many replicas to contact and when.
///
/// Implementations must be cheap to query; the execution loop calls them between dispatch
/// steps of every request.
pub trait ReplicaStrategy: Send + Sync + Debug {
    /// Short unique description, e.g. `Parallel-2`, reported to tracing sinks.
    fn label(&self) -> Cow<'static, str>;

    /// Number of attempts launched as soon as the request starts.
    fn initial_parallelism(&self) -> usize;

    /// Maximum number of attempts in flight at the same time.
    fn max_parallelism(&self) -> usize;

    /// Delay after which one more attempt is launched while no attempt was accepted.
    ///
    /// Only consulted while fewer than [`max_parallelism`][Self::max_parallelism] attempts
    /// are in flight and unused replicas remain. `None` disables forking.
    fn fork_delay(&self, args: ForkDelayArgs) -> Option<Duration> {
        let _ = args;
        None
    }

    /// Timeout of the next attempt. Capped by the remaining overall budget.
    fn attempt_timeout(&self, args: AttemptTimeoutArgs) -> Duration {
        args.remaining()
    }
}

/// Arguments for [`ReplicaStrategy::fork_delay`].
#[derive(Debug, Clone, Copy)]
pub struct ForkDelayArgs {
    pub(crate) in_flight: usize,
    pub(crate) launched: usize,
    pub(crate) remaining: Duration,
}

impl ForkDelayArgs {
    /// Attempts currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Attempts launched so far, including completed ones.
    #[must_use]
    pub fn launched(&self) -> usize {
        self.launched
    }

    /// Time left in the overall budget.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.remaining
    }
}

/// Arguments for [`ReplicaStrategy::attempt_timeout`].
#[derive(Debug, Clone, Copy)]
pub struct AttemptTimeoutArgs {
    pub(crate) remaining: Duration,
    pub(crate) remaining_replicas: usize,
}

impl AttemptTimeoutArgs {
    /// Time left in the overall budget.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    /// Replicas that may still be attempted, including the one about to be launched.
    #[must_use]
    pub fn remaining_replicas(&self) -> usize {
        self.remaining_replicas
    }
}

fn split_evenly(remaining: Duration, parts: usize) -> Duration {
    let parts = u32::try_from(parts.max(1)).unwrap_or(u32::MAX);
    remaining / parts
}
