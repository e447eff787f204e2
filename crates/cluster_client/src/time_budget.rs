// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use tick::{Clock, Stopwatch};

/// Overall time allowance of one logical request.
///
/// Started when the request enters the pipeline and shared by every stage and every replica
/// attempt of that request, including retry passes.
#[derive(Debug)]
pub struct TimeBudget {
    stopwatch: Stopwatch,
    total: Duration,
}

impl TimeBudget {
    /// Starts a budget of `total` measured by `clock`.
    #[must_use]
    pub fn start(clock: &Clock, total: Duration) -> Self {
        Self {
            stopwatch: clock.stopwatch(),
            total,
        }
    }

    /// The whole allowance.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.total
    }

    /// Time spent since the budget was started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.stopwatch.elapsed()
    }

    /// Time left, zero once expired.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.total.saturating_sub(self.elapsed())
    }

    /// Returns `true` once the elapsed time reaches the allowance.
    #[must_use]
    pub fn has_expired(&self) -> bool {
        self.elapsed() >= self.total
    }
}
