// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::{Arc, OnceLock};

use layered::{Layer, Service};

use super::PipelineResult;
use crate::budget::{BudgetCounters, BudgetRegistry, BudgetSnapshot, ReplicaBudgetingOptions};
use crate::context::RequestContext;
use crate::error::FaultKind;

/// Throttles speculative replica fan-out once it stops paying off.
///
/// After the nested pipeline returns, the module records one request and the number of
/// replica results it produced under the configured budget name. Once at least
/// `minimum_requests` requests were recorded and the cumulative replicas-per-request ratio
/// reaches `critical_ratio`, the replica cap of the request context is lowered to
/// `minimum_replicas`. Later passes sharing the context, such as retries, are throttled by it.
///
/// The registry entry of the budget name is created by the first recorded request.
///
/// A request canceled before any replica attempt is not recorded. A request canceled after
/// attempts were made is recorded with the number of attempts. Other faults are not recorded.
///
/// # Examples
///
/// ```
/// use cluster_client::budget::ReplicaBudgetingOptions;
/// use cluster_client::modules::ReplicaBudgeting;
///
/// let layer = ReplicaBudgeting::layer(ReplicaBudgetingOptions::new("billing").critical_ratio(1.2));
/// ```
#[derive(Debug, Clone)]
pub struct ReplicaBudgeting<S> {
    shared: Arc<ReplicaBudgetingShared>,
    inner: S,
}

#[derive(Debug)]
struct ReplicaBudgetingShared {
    options: ReplicaBudgetingOptions,
    registry: BudgetRegistry,
    counters: OnceLock<Arc<BudgetCounters>>,
}

impl ReplicaBudgetingShared {
    fn counters(&self) -> &BudgetCounters {
        self.counters.get_or_init(|| self.registry.entry(self.options.name()))
    }

    fn snapshot(&self) -> BudgetSnapshot {
        self.registry
            .get(self.options.name())
            .map(|counters| counters.snapshot())
            .unwrap_or_default()
    }
}

impl ReplicaBudgeting<()> {
    /// Creates a layer recording into the process-wide [`BudgetRegistry`].
    #[must_use]
    pub fn layer(options: ReplicaBudgetingOptions) -> ReplicaBudgetingLayer {
        Self::layer_in(options, BudgetRegistry::global())
    }

    /// Creates a layer recording into `registry`.
    #[must_use]
    pub fn layer_in(options: ReplicaBudgetingOptions, registry: &BudgetRegistry) -> ReplicaBudgetingLayer {
        ReplicaBudgetingLayer {
            shared: Arc::new(ReplicaBudgetingShared {
                options,
                registry: registry.clone(),
                counters: OnceLock::new(),
            }),
        }
    }
}

impl<S> ReplicaBudgeting<S> {
    /// Requests recorded under the budget name.
    #[must_use]
    pub fn requests(&self) -> u64 {
        self.shared.snapshot().requests()
    }

    /// Replica attempts recorded under the budget name.
    #[must_use]
    pub fn replicas(&self) -> u64 {
        self.shared.snapshot().replicas()
    }

    /// Replicas per request recorded under the budget name.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        self.shared.snapshot().ratio()
    }
}

/// Layer producing [`ReplicaBudgeting`] services.
#[derive(Debug, Clone)]
pub struct ReplicaBudgetingLayer {
    shared: Arc<ReplicaBudgetingShared>,
}

impl<S> Layer<S> for ReplicaBudgetingLayer {
    type Service = ReplicaBudgeting<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ReplicaBudgeting {
            shared: Arc::clone(&self.shared),
            inner,
        }
    }
}

impl<S> Service<RequestContext> for ReplicaBudgeting<S>
where
    S: Service<RequestContext, Out = PipelineResult>,
{
    type Out = PipelineResult;

    async fn execute(&self, context: RequestContext) -> Self::Out {
        let outcome = self.inner.execute(context.clone()).await;

        let replicas = match &outcome {
            Ok(result) => Some(result.replica_results().len()),
            Err(error) => match error.kind() {
                FaultKind::Canceled { attempted_replicas } if attempted_replicas > 0 => Some(attempted_replicas),
                _ => None,
            },
        };

        if let Some(replicas) = replicas {
            let snapshot = self
                .shared
                .counters()
                .record(u64::try_from(replicas).unwrap_or(u64::MAX));

            if self.shared.options.should_throttle(snapshot) {
                context.set_maximum_replicas_to_use(self.shared.options.minimum_replicas_limit());
            }
        }

        outcome
    }
}
