// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tick::Clock;

use crate::budget::{DEFAULT_CRITICAL_RATIO, DEFAULT_MINIMUM_REPLICAS, DEFAULT_MINIMUM_REQUESTS, ReplicaBudgetingOptions};
use crate::modules::{Backoff, DEFAULT_MAX_ATTEMPTS, RequestRetry, RequestRetryLayer};
use crate::strategy::{ForkingDelay, ForkingStrategy, ParallelStrategy, ReplicaStrategy, SequentialStrategy};

const DEFAULT_TIMEOUT_MILLIS: u64 = 30_000;

/// Deserializable settings of a [`ClusterClient`][crate::ClusterClient].
///
/// Apply with [`ClusterClientBuilder::config`][crate::ClusterClientBuilder::config]. Every
/// field is optional in the serialized form.
///
/// # Examples
///
/// ```
/// use cluster_client::ClusterClientConfig;
///
/// let config: ClusterClientConfig = serde_json::from_str(
///     r#"{
///         "timeout_millis": 5000,
///         "strategy": { "kind": "parallel", "parallelism": 2 },
///         "replica_budgeting": { "name": "billing", "critical_ratio": 1.2 },
///         "retry": { "max_attempts": 2, "delay_millis": 100 }
///     }"#,
/// )
/// .unwrap();
///
/// assert_eq!(config.timeout().as_secs(), 5);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[cfg_attr(docsrs, doc(cfg(feature = "serde")))]
#[non_exhaustive]
pub struct ClusterClientConfig {
    /// Overall per-request deadline in milliseconds.
    #[serde(default = "default_timeout_millis")]
    pub timeout_millis: u64,

    /// Replica selection strategy.
    #[serde(default)]
    pub strategy: StrategyConfig,

    /// Replica budgeting; disabled when absent.
    #[serde(default)]
    pub replica_budgeting: Option<ReplicaBudgetingConfig>,

    /// Request retry; disabled when absent.
    #[serde(default)]
    pub retry: Option<RetryConfig>,

    /// Service name reported in trace spans.
    #[serde(default)]
    pub service_name: Option<String>,
}

impl ClusterClientConfig {
    /// The overall per-request deadline.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_millis)
    }
}

impl Default for ClusterClientConfig {
    fn default() -> Self {
        Self {
            timeout_millis: DEFAULT_TIMEOUT_MILLIS,
            strategy: StrategyConfig::default(),
            replica_budgeting: None,
            retry: None,
            service_name: None,
        }
    }
}

const fn default_timeout_millis() -> u64 {
    DEFAULT_TIMEOUT_MILLIS
}

/// Serialized form of the built-in strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum StrategyConfig {
    /// [`SequentialStrategy`].
    #[default]
    Sequential,

    /// [`ParallelStrategy`].
    Parallel {
        /// Attempts kept in flight.
        parallelism: usize,
    },

    /// [`ForkingStrategy`] with a fixed delay.
    Forking {
        /// Maximum attempts in flight.
        max_parallelism: usize,

        /// Delay before each extra attempt, in milliseconds.
        delay_millis: u64,
    },
}

impl StrategyConfig {
    /// Builds the strategy described by this configuration.
    #[must_use]
    pub fn to_strategy(self) -> Arc<dyn ReplicaStrategy> {
        match self {
            Self::Sequential => Arc::new(SequentialStrategy),
            Self::Parallel { parallelism } => Arc::new(ParallelStrategy::new(parallelism)),
            Self::Forking {
                max_parallelism,
                delay_millis,
            } => Arc::new(ForkingStrategy::new(
                max_parallelism,
                ForkingDelay::fixed(Duration::from_millis(delay_millis)),
            )),
        }
    }
}

/// Serialized form of [`ReplicaBudgetingOptions`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[non_exhaustive]
pub struct ReplicaBudgetingConfig {
    /// Budget name shared by all requests to one logical target.
    pub name: String,

    /// Replica cap applied when throttling.
    #[serde(default = "default_minimum_replicas")]
    pub minimum_replicas: usize,

    /// Requests observed before throttling may activate.
    #[serde(default = "default_minimum_requests")]
    pub minimum_requests: u64,

    /// Replicas-per-request ratio activating throttling.
    #[serde(default = "default_critical_ratio")]
    pub critical_ratio: f64,
}

impl ReplicaBudgetingConfig {
    /// Builds the budgeting options described by this configuration.
    #[must_use]
    pub fn to_options(&self) -> ReplicaBudgetingOptions {
        ReplicaBudgetingOptions::new(self.name.clone())
            .minimum_replicas(self.minimum_replicas)
            .minimum_requests(self.minimum_requests)
            .critical_ratio(self.critical_ratio)
    }
}

const fn default_minimum_replicas() -> usize {
    DEFAULT_MINIMUM_REPLICAS
}

const fn default_minimum_requests() -> u64 {
    DEFAULT_MINIMUM_REQUESTS
}

const fn default_critical_ratio() -> f64 {
    DEFAULT_CRITICAL_RATIO
}

/// Serialized form of the request retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct RetryConfig {
    /// Maximum number of passes, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay between passes in milliseconds.
    #[serde(default)]
    pub delay_millis: u64,

    /// Growth of the delay from one retry to the next.
    #[serde(default)]
    pub backoff: Backoff,

    /// Cap of a single delay in milliseconds.
    #[serde(default)]
    pub max_delay_millis: Option<u64>,

    /// Whether delays are randomly spread around their value.
    #[serde(default)]
    pub use_jitter: bool,
}

impl RetryConfig {
    /// Base delay between passes.
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_millis)
    }

    /// Builds the retry layer described by these settings.
    #[must_use]
    pub fn to_layer(&self, clock: &Clock) -> RequestRetryLayer {
        let layer = RequestRetry::layer(clock)
            .max_attempts(self.max_attempts)
            .retry_delay(self.delay())
            .backoff(self.backoff)
            .use_jitter(self.use_jitter);

        match self.max_delay_millis {
            Some(max_delay) => layer.max_delay(Duration::from_millis(max_delay)),
            None => layer,
        }
    }
}

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config: ClusterClientConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config, ClusterClientConfig::default());
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.strategy.to_strategy().label(), "Sequential");
    }

    #[rstest]
    #[case(r#"{"kind": "sequential"}"#, "Sequential")]
    #[case(r#"{"kind": "parallel", "parallelism": 3}"#, "Parallel-3")]
    #[case(r#"{"kind": "forking", "max_parallelism": 2, "delay_millis": 50}"#, "Forking-2")]
    fn strategy_kinds(#[case] json: &str, #[case] label: &str) {
        let strategy: StrategyConfig = serde_json::from_str(json).unwrap();

        assert_eq!(strategy.to_strategy().label(), label);
    }

    #[test]
    fn unknown_strategy_kind_is_rejected() {
        let error = serde_json::from_str::<StrategyConfig>(r#"{"kind": "random"}"#).unwrap_err();

        assert!(error.to_string().contains("unknown variant"), "{error}");
    }

    #[test]
    fn replica_budgeting_defaults() {
        let config: ReplicaBudgetingConfig = serde_json::from_str(r#"{"name": "billing"}"#).unwrap();
        let options = config.to_options();

        assert_eq!(options.name(), "billing");
        assert_eq!(options.minimum_replicas_limit(), DEFAULT_MINIMUM_REPLICAS);
        assert_eq!(options.minimum_requests_count(), DEFAULT_MINIMUM_REQUESTS);
        assert!((options.critical_ratio_value() - DEFAULT_CRITICAL_RATIO).abs() < f64::EPSILON);
    }

    #[test]
    fn full_configuration() {
        let config: ClusterClientConfig = serde_json::from_str(
            r#"{
                "timeout_millis": 2500,
                "strategy": {"kind": "parallel", "parallelism": 2},
                "replica_budgeting": {"name": "billing", "minimum_replicas": 1, "minimum_requests": 50, "critical_ratio": 1.2},
                "retry": {"max_attempts": 4, "delay_millis": 100},
                "service_name": "billing-api"
            }"#,
        )
        .unwrap();

        assert_eq!(config.timeout(), Duration::from_millis(2500));
        assert_eq!(config.strategy, StrategyConfig::Parallel { parallelism: 2 });
        let budgeting = config.replica_budgeting.unwrap().to_options();
        assert_eq!(budgeting.minimum_requests_count(), 50);
        assert!((budgeting.critical_ratio_value() - 1.2).abs() < f64::EPSILON);
        let retry = config.retry.unwrap();
        assert_eq!(retry.max_attempts, 4);
        assert_eq!(retry.delay(), Duration::from_millis(100));
        assert_eq!(config.service_name.as_deref(), Some("billing-api"));
    }

    #[test]
    fn retry_defaults() {
        let retry: RetryConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(retry.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(retry.delay(), Duration::ZERO);
        assert_eq!(retry.backoff, Backoff::Constant);
        assert_eq!(retry.max_delay_millis, None);
        assert!(!retry.use_jitter);
    }

    #[test]
    fn retry_backoff_settings() {
        let retry: RetryConfig = serde_json::from_str(
            r#"{"max_attempts": 5, "delay_millis": 200, "backoff": "linear", "max_delay_millis": 1000, "use_jitter": true}"#,
        )
        .unwrap();

        assert_eq!(retry.backoff, Backoff::Linear);
        assert_eq!(retry.max_delay_millis, Some(1000));
        assert!(retry.use_jitter);

        let debug = format!("{:?}", retry.to_layer(&Clock::new_frozen()));
        assert!(debug.contains("max_attempts: 5"), "{debug}");
        assert!(debug.contains("Linear"), "{debug}");
        assert!(debug.contains("use_jitter: true"), "{debug}");
    }
}
