// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use super::{ForkDelayArgs, ReplicaStrategy, split_evenly};

/// Schedule of extra attempts launched by [`ForkingStrategy`].
#[derive(Clone)]
pub struct ForkingDelay {
    inner: ForkingDelayInner,
}

#[derive(Clone)]
enum ForkingDelayInner {
    Fixed(Duration),
    EvenSplit(usize),
    Dynamic(Arc<dyn Fn(ForkDelayArgs) -> Option<Duration> + Send + Sync>),
}

impl ForkingDelay {
    /// Waits the same `delay` before every extra attempt.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self {
            inner: ForkingDelayInner::Fixed(delay),
        }
    }

    /// Splits the remaining time evenly between the attempts that may still be forked.
    #[must_use]
    pub fn even_split(max_attempts: usize) -> Self {
        Self {
            inner: ForkingDelayInner::EvenSplit(max_attempts.max(1)),
        }
    }

    /// Computes the delay per fork. Returning `None` stops forking.
    #[must_use]
    pub fn dynamic(delay_fn: impl Fn(ForkDelayArgs) -> Option<Duration> + Send + Sync + 'static) -> Self {
        Self {
            inner: ForkingDelayInner::Dynamic(Arc::new(delay_fn)),
        }
    }

    fn delay_for(&self, args: ForkDelayArgs) -> Option<Duration> {
        match &self.inner {
            ForkingDelayInner::Fixed(delay) => Some(*delay),
            ForkingDelayInner::EvenSplit(max) => {
                Some(split_evenly(args.remaining(), max.saturating_sub(args.launched()).max(1)))
            }
            ForkingDelayInner::Dynamic(delay_fn) => delay_fn(args),
        }
    }
}

impl Debug for ForkingDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            ForkingDelayInner::Fixed(d) => f.debug_struct("ForkingDelay").field("mode", &"fixed").field("delay", d).finish(),
            ForkingDelayInner::EvenSplit(m) => f.debug_struct("ForkingDelay").field("mode", &"even_split").field("max", m).finish(),
            ForkingDelayInner::Dynamic(_) => f.debug_struct("ForkingDelay").field("mode", &"dynamic").finish(),
        }
    }
}

/// Starts with one replica and forks an extra attempt each time the fork delay elapses
/// without an accepted response, keeping at most `N` attempts in flight.
///
/// A rejected attempt is replaced right away without waiting for the delay.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use cluster_client::strategy::{ForkingDelay, ForkingStrategy, ReplicaStrategy};
///
/// let strategy = ForkingStrategy::new(3, ForkingDelay::fixed(Duration::from_millis(200)));
///
/// assert_eq!(strategy.label(), "Forking-3");
/// ```
#[derive(Debug, Clone)]
pub struct ForkingStrategy {
    max_parallelism: usize,
    delay: ForkingDelay,
}

impl ForkingStrategy {
    /// Creates a strategy forking up to `max_parallelism` concurrent attempts. Values below
    /// `1` are raised to `1`.
    #[must_use]
    pub fn new(max_parallelism: usize, delay: ForkingDelay) -> Self {
        Self {
            max_parallelism: max_parallelism.max(1),
            delay,
        }
    }
}

impl ReplicaStrategy for ForkingStrategy {
    fn label(&self) -> Cow<'static, str> {
        Cow::Owned(format!("Forking-{}", self.max_parallelism))
    }

    fn initial_parallelism(&self) -> usize {
        1
    }

    fn max_parallelism(&self) -> usize {
        self.max_parallelism
    }

    fn fork_delay(&self, args: ForkDelayArgs) -> Option<Duration> {
        self.delay.delay_for(args)
    }
}
