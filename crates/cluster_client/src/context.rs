// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::model::Request;
use crate::strategy::ReplicaStrategy;
use crate::time_budget::TimeBudget;

/// Per-request state threaded through every pipeline stage.
///
/// A context is created for one logical request and dropped once the pipeline returns. Clones
/// share the same replica cap, time budget and cancellation token, so a stage can hand a clone
/// to the next stage and still observe what happened to the request. The cap is never shared
/// between different requests.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request: Arc<Request>,
    strategy: Arc<dyn ReplicaStrategy>,
    budget: Arc<TimeBudget>,
    cancellation: CancellationToken,
    span: Span,
    maximum_replicas: Arc<AtomicUsize>,
}

impl RequestContext {
    /// Creates a context for `request` driven by `strategy` within `budget`.
    ///
    /// The replica cap starts unbounded, the request is not cancelable and log events are
    /// attached to the span current at creation time.
    #[must_use]
    pub fn new(request: impl Into<Arc<Request>>, strategy: Arc<dyn ReplicaStrategy>, budget: TimeBudget) -> Self {
        Self {
            request: request.into(),
            strategy,
            budget: Arc::new(budget),
            cancellation: CancellationToken::new(),
            span: Span::current(),
            maximum_replicas: Arc::new(AtomicUsize::new(usize::MAX)),
        }
    }

    /// Uses `token` to cancel the request.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Attaches log events emitted for this request to `span`.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// The request being executed.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Shared handle to the request being executed.
    #[must_use]
    pub fn request_handle(&self) -> &Arc<Request> {
        &self.request
    }

    /// The replica selection strategy.
    #[must_use]
    pub fn strategy(&self) -> &dyn ReplicaStrategy {
        self.strategy.as_ref()
    }

    /// The overall time budget.
    #[must_use]
    pub fn budget(&self) -> &TimeBudget {
        &self.budget
    }

    /// The cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns `true` once cancellation was requested.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Span used as parent of log events emitted for this request.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Current cap on the number of replicas this request may use.
    #[must_use]
    pub fn maximum_replicas_to_use(&self) -> usize {
        self.maximum_replicas.load(Ordering::Relaxed)
    }

    /// Lowers or raises the replica cap. Attempts already launched are unaffected.
    pub fn set_maximum_replicas_to_use(&self, maximum: usize) {
        self.maximum_replicas.store(maximum, Ordering::Relaxed);
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::Uri;
    use tick::Clock;

    use super::*;
    use crate::strategy::SequentialStrategy;

    fn context() -> RequestContext {
        RequestContext::new(
            Request::get(Uri::from_static("/foo")),
            Arc::new(SequentialStrategy),
            TimeBudget::start(&Clock::new_frozen(), Duration::from_secs(1)),
        )
    }

    #[test]
    fn cap_starts_unbounded_and_is_shared_by_clones() {
        let context = context();
        let clone = context.clone();
        assert_eq!(context.maximum_replicas_to_use(), usize::MAX);

        clone.set_maximum_replicas_to_use(1);

        assert_eq!(context.maximum_replicas_to_use(), 1);
    }

    #[test]
    fn separate_contexts_have_separate_caps() {
        let first = context();
        let second = context();

        first.set_maximum_replicas_to_use(2);

        assert_eq!(second.maximum_replicas_to_use(), usize::MAX);
    }

    #[test]
    fn cancellation_is_observed() {
        let token = CancellationToken::new();
        let context = context().with_cancellation(token.clone());
        assert!(!context.is_canceled());

        token.cancel();

        assert!(context.is_canceled());
    }

    #[test]
    fn exposes_request_and_strategy() {
        let context = context();

        assert_eq!(context.request().path(), "/foo");
        assert_eq!(context.strategy().label(), "Sequential");
        assert_eq!(context.budget().total(), Duration::from_secs(1));
    }
}
