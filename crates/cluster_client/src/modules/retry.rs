// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug};
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{Either, select};
use layered::{Layer, Service};
use recoverable::{Recovery, RecoveryKind};
use tick::Clock;

use super::PipelineResult;
use super::backoff::{Backoff, RetryBackoff};
use crate::context::RequestContext;
use crate::error::PipelineError;
use crate::model::ClusterResult;

/// Passes executed when no explicit maximum is configured.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

type ShouldRetry = Arc<dyn Fn(&ClusterResult) -> bool + Send + Sync>;

/// Re-executes the nested pipeline while its result is worth another pass.
///
/// Each pass reuses the same [`RequestContext`], so the overall time budget, the cancellation
/// token and the replica cap are shared by all passes. A cap lowered by
/// [`ReplicaBudgeting`][crate::modules::ReplicaBudgeting] during one pass throttles the next.
///
/// A pass is followed by another one when:
///
/// - fewer than `max_attempts` passes were executed,
/// - the retry predicate holds for the result (by default, its
///   [`recovery`][Recovery::recovery] kind is [`RecoveryKind::Retry`]),
/// - the time budget has not expired.
///
/// Between passes the module waits for the retry delay grown by the configured [`Backoff`],
/// clamped to the remaining budget. Cancellation observed while waiting ends the request with
/// a cancellation fault.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use cluster_client::modules::{Backoff, RequestRetry};
/// use tick::Clock;
///
/// let clock = Clock::new_frozen();
/// let layer = RequestRetry::layer(&clock)
///     .max_attempts(4)
///     .retry_delay(Duration::from_millis(100))
///     .backoff(Backoff::Exponential)
///     .use_jitter(true);
/// ```
#[derive(Debug, Clone)]
pub struct RequestRetry<S> {
    shared: Arc<RetryShared>,
    inner: S,
}

struct RetryShared {
    clock: Clock,
    max_attempts: u32,
    backoff: RetryBackoff,
    should_retry: Option<ShouldRetry>,
}

impl RetryShared {
    fn should_retry(&self, result: &ClusterResult) -> bool {
        match &self.should_retry {
            Some(predicate) => predicate(result),
            None => result.recovery().kind() == RecoveryKind::Retry,
        }
    }
}

impl Debug for RetryShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryShared")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("custom_predicate", &self.should_retry.is_some())
            .finish_non_exhaustive()
    }
}

impl RequestRetry<()> {
    /// Creates a retry layer timing its delays with `clock`.
    #[must_use]
    pub fn layer(clock: &Clock) -> RequestRetryLayer {
        RequestRetryLayer {
            clock: clock.clone(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: RetryBackoff::default(),
            should_retry: None,
        }
    }
}

/// Layer producing [`RequestRetry`] services.
#[derive(Clone)]
pub struct RequestRetryLayer {
    clock: Clock,
    max_attempts: u32,
    backoff: RetryBackoff,
    should_retry: Option<ShouldRetry>,
}

impl RequestRetryLayer {
    /// Sets the maximum number of passes, including the first one. Values below one are
    /// treated as one.
    ///
    /// **Default**: [`DEFAULT_MAX_ATTEMPTS`]
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the base delay between passes.
    ///
    /// **Default**: no delay
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.backoff.base_delay = delay;
        self
    }

    /// Sets how the delay grows from one retry to the next.
    ///
    /// **Default**: [`Backoff::Constant`]
    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff.backoff = backoff;
        self
    }

    /// Caps the delay before any single retry.
    ///
    /// **Default**: no cap
    #[must_use]
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.backoff.max_delay = Some(max_delay);
        self
    }

    /// Spreads each delay randomly within 75% to 125% of its value.
    ///
    /// **Default**: `false`
    #[must_use]
    pub fn use_jitter(mut self, use_jitter: bool) -> Self {
        self.backoff.use_jitter = use_jitter;
        self
    }

    /// Replaces the recovery based retry decision with `predicate`.
    #[must_use]
    pub fn retry_if(mut self, predicate: impl Fn(&ClusterResult) -> bool + Send + Sync + 'static) -> Self {
        self.should_retry = Some(Arc::new(predicate));
        self
    }
}

impl Debug for RequestRetryLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRetryLayer")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("custom_predicate", &self.should_retry.is_some())
            .finish_non_exhaustive()
    }
}

impl<S> Layer<S> for RequestRetryLayer {
    type Service = RequestRetry<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestRetry {
            shared: Arc::new(RetryShared {
                clock: self.clock.clone(),
                max_attempts: self.max_attempts,
                backoff: self.backoff.clone(),
                should_retry: self.should_retry.clone(),
            }),
            inner,
        }
    }
}

impl<S> Service<RequestContext> for RequestRetry<S>
where
    S: Service<RequestContext, Out = PipelineResult>,
{
    type Out = PipelineResult;

    #[cfg_attr(test, mutants::skip)] // causes test timeout
    async fn execute(&self, context: RequestContext) -> Self::Out {
        let mut attempt = 1;

        loop {
            let result = self.inner.execute(context.clone()).await?;

            if attempt >= self.shared.max_attempts || context.budget().has_expired() || !self.shared.should_retry(&result) {
                return Ok(result);
            }

            let delay = self
                .shared
                .backoff
                .delay(attempt - 1)
                .min(context.budget().remaining());
            attempt += 1;

            if !delay.is_zero() {
                let canceled = pin!(context.cancellation().cancelled());
                let wait = pin!(self.shared.clock.delay(delay));
                if let Either::Left(((), _)) = select(canceled, wait).await {
                    return Err(PipelineError::canceled(0));
                }
            }
        }
    }
}
