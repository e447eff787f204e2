// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use layered::{DynamicService, DynamicServiceExt, Layer, Service};
use tick::Clock;
use tokio_util::sync::CancellationToken;

use crate::budget::{BudgetRegistry, ReplicaBudgetingOptions};
use crate::context::RequestContext;
use crate::model::{ClusterResult, Request, ResponseClassifier};
use crate::modules::{
    ErrorCatching, PipelineResult, ReplicaBudgeting, ReplicaBudgetingLayer, RequestRetry, RequestRetryLayer, TraceSink, Tracing,
};
use crate::sender::ClusterSender;
use crate::strategy::{ReplicaStrategy, SequentialStrategy};
use crate::time_budget::TimeBudget;
use crate::transport::{ReplicaSource, Transport};

/// Overall per-request deadline used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Service name reported in trace spans when none is configured.
pub const DEFAULT_SERVICE_NAME: &str = "unknown";

/// Client sending requests to a cluster of interchangeable replicas.
///
/// Every request runs through the pipeline assembled by [`ClusterClientBuilder`] and always
/// ends with a [`ClusterResult`]; faults and cancellation are reported through its status.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use cluster_client::strategy::ParallelStrategy;
/// use cluster_client::{ClusterClient, FixedReplicas, Request, Response, ResponseCode, Transport};
/// use http::Uri;
/// use tick::Clock;
///
/// struct AlwaysOk;
///
/// impl Transport for AlwaysOk {
///     async fn send(&self, _replica: &Uri, _request: &Request, _timeout: Duration) -> Response {
///         Response::new(ResponseCode::OK)
///     }
/// }
///
/// # futures::executor::block_on(async {
/// let clock = Clock::new_frozen();
/// let replicas = FixedReplicas::new([Uri::from_static("http://replica-1:80"), Uri::from_static("http://replica-2:80")]);
/// let client = ClusterClient::builder(&clock, AlwaysOk, replicas)
///     .strategy(ParallelStrategy::new(2))
///     .timeout(Duration::from_secs(5))
///     .build();
///
/// let result = client.send(Request::get(Uri::from_static("/status"))).await;
/// assert!(result.is_success());
/// # });
/// ```
#[derive(Clone)]
pub struct ClusterClient {
    pipeline: DynamicService<RequestContext, ClusterResult>,
    clock: Clock,
    strategy: Arc<dyn ReplicaStrategy>,
    timeout: Duration,
}

impl ClusterClient {
    /// Starts building a client sending through `transport` to the replicas of `replicas`.
    #[must_use]
    pub fn builder<T>(clock: &Clock, transport: T, replicas: impl ReplicaSource + 'static) -> ClusterClientBuilder<T>
    where
        T: Transport + 'static,
    {
        ClusterClientBuilder {
            clock: clock.clone(),
            transport,
            replicas: Arc::new(replicas),
            strategy: Arc::new(SequentialStrategy),
            timeout: DEFAULT_TIMEOUT,
            classifier: ResponseClassifier::default(),
            budgeting: None,
            retry: None,
            trace_sink: None,
            service_name: Cow::Borrowed(DEFAULT_SERVICE_NAME),
        }
    }

    /// Sends `request` with the default strategy and timeout.
    pub async fn send(&self, request: Request) -> ClusterResult {
        self.send_with(request, RequestParameters::default()).await
    }

    /// Sends `request`, overriding defaults with `parameters`.
    pub async fn send_with(&self, request: Request, parameters: RequestParameters) -> ClusterResult {
        let strategy = parameters.strategy.unwrap_or_else(|| Arc::clone(&self.strategy));
        let budget = TimeBudget::start(&self.clock, parameters.timeout.unwrap_or(self.timeout));

        let mut context = RequestContext::new(request, strategy, budget);
        if let Some(cancellation) = parameters.cancellation {
            context = context.with_cancellation(cancellation);
        }

        self.pipeline.execute(context).await
    }

    /// Executes a prepared request context through the pipeline.
    pub async fn execute(&self, context: RequestContext) -> ClusterResult {
        self.pipeline.execute(context).await
    }

    /// The strategy used when a request does not override it.
    #[must_use]
    pub fn default_strategy(&self) -> &dyn ReplicaStrategy {
        self.strategy.as_ref()
    }

    /// The overall deadline used when a request does not override it.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.timeout
    }
}

impl Debug for ClusterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterClient")
            .field("strategy", &self.strategy.label())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Per-request overrides for [`ClusterClient::send_with`].
#[derive(Debug, Clone, Default)]
pub struct RequestParameters {
    strategy: Option<Arc<dyn ReplicaStrategy>>,
    timeout: Option<Duration>,
    cancellation: Option<CancellationToken>,
}

impl RequestParameters {
    /// Creates parameters keeping every client default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `strategy` for this request.
    #[must_use]
    pub fn strategy(mut self, strategy: impl ReplicaStrategy + 'static) -> Self {
        self.strategy = Some(Arc::new(strategy));
        self
    }

    /// Uses `timeout` as the overall deadline of this request.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Cancels this request once `cancellation` is triggered.
    #[must_use]
    pub fn cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = Some(cancellation);
        self
    }
}

/// Builder of [`ClusterClient`].
///
/// The assembled pipeline is, outermost first: tracing (when a sink is set), error catching,
/// retry (when configured), replica budgeting (when configured) and the cluster sender.
pub struct ClusterClientBuilder<T> {
    clock: Clock,
    transport: T,
    replicas: Arc<dyn ReplicaSource>,
    strategy: Arc<dyn ReplicaStrategy>,
    timeout: Duration,
    classifier: ResponseClassifier,
    budgeting: Option<ReplicaBudgetingLayer>,
    retry: Option<RequestRetryLayer>,
    trace_sink: Option<Arc<dyn TraceSink>>,
    service_name: Cow<'static, str>,
}

impl<T: Transport + 'static> ClusterClientBuilder<T> {
    /// Sets the default strategy.
    ///
    /// **Default**: [`SequentialStrategy`]
    #[must_use]
    pub fn strategy(mut self, strategy: impl ReplicaStrategy + 'static) -> Self {
        self.strategy = Arc::new(strategy);
        self
    }

    /// Sets the default overall deadline of a request.
    ///
    /// **Default**: [`DEFAULT_TIMEOUT`]
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the classifier deciding which replica responses are accepted.
    #[must_use]
    pub fn classifier(mut self, classifier: ResponseClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Enables replica budgeting recorded in the process-wide registry.
    #[must_use]
    pub fn replica_budgeting(mut self, options: ReplicaBudgetingOptions) -> Self {
        self.budgeting = Some(ReplicaBudgeting::layer(options));
        self
    }

    /// Enables replica budgeting recorded in `registry`.
    #[must_use]
    pub fn replica_budgeting_in(mut self, options: ReplicaBudgetingOptions, registry: &BudgetRegistry) -> Self {
        self.budgeting = Some(ReplicaBudgeting::layer_in(options, registry));
        self
    }

    /// Enables retrying with at most `max_attempts` passes separated by `delay`.
    #[must_use]
    pub fn retry(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.retry = Some(RequestRetry::layer(&self.clock).max_attempts(max_attempts).retry_delay(delay));
        self
    }

    /// Enables retrying with a fully configured retry layer.
    #[must_use]
    pub fn retry_layer(mut self, layer: RequestRetryLayer) -> Self {
        self.retry = Some(layer);
        self
    }

    /// Pushes one trace span per request to `sink`.
    #[must_use]
    pub fn tracing(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace_sink = Some(sink);
        self
    }

    /// Sets the service name reported in trace spans.
    ///
    /// **Default**: [`DEFAULT_SERVICE_NAME`]
    #[must_use]
    pub fn service_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Applies deserialized settings, replacing the ones they cover.
    #[cfg(any(feature = "serde", test))]
    #[cfg_attr(docsrs, doc(cfg(feature = "serde")))]
    #[must_use]
    pub fn config(mut self, config: &crate::ClusterClientConfig) -> Self {
        self.timeout = config.timeout();
        self.strategy = config.strategy.to_strategy();

        if let Some(budgeting) = &config.replica_budgeting {
            self = self.replica_budgeting(budgeting.to_options());
        }

        if let Some(retry) = &config.retry {
            self.retry = Some(retry.to_layer(&self.clock));
        }

        if let Some(service_name) = &config.service_name {
            self.service_name = Cow::Owned(service_name.clone());
        }

        self
    }

    /// Assembles the pipeline and creates the client.
    #[must_use]
    pub fn build(self) -> ClusterClient {
        let sender = ClusterSender::new(&self.clock, self.transport, self.replicas).classifier(self.classifier);

        let mut faulting: DynamicService<RequestContext, PipelineResult> = sender.into_dynamic();
        if let Some(budgeting) = self.budgeting {
            faulting = budgeting.layer(faulting).into_dynamic();
        }
        if let Some(retry) = self.retry {
            faulting = retry.layer(faulting).into_dynamic();
        }

        let mut pipeline: DynamicService<RequestContext, ClusterResult> = ErrorCatching::layer().layer(faulting).into_dynamic();
        if let Some(sink) = self.trace_sink {
            pipeline = Tracing::layer(&self.clock, sink, self.service_name)
                .layer(pipeline)
                .into_dynamic();
        }

        ClusterClient {
            pipeline,
            clock: self.clock,
            strategy: self.strategy,
            timeout: self.timeout,
        }
    }
}

impl<T> Debug for ClusterClientBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterClientBuilder")
            .field("replicas", &self.replicas)
            .field("strategy", &self.strategy.label())
            .field("timeout", &self.timeout)
            .field("budgeting", &self.budgeting)
            .field("retry", &self.retry)
            .field("service_name", &self.service_name)
            .finish_non_exhaustive()
    }
}
