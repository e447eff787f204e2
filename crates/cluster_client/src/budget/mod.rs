// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Shared accounting of replicas spent per request.
//!
//! Every request that goes through the
//! [`ReplicaBudgeting`][crate::modules::ReplicaBudgeting] module adds to the counters of its
//! budget name. Requests to one logical target should share a name so their statistics
//! accumulate in one place.

mod registry;

pub use registry::{BudgetCounters, BudgetRegistry, BudgetSnapshot};

/// Default floor applied to the replica cap when throttling.
pub const DEFAULT_MINIMUM_REPLICAS: usize = 1;

/// Default number of requests observed before throttling may activate.
pub const DEFAULT_MINIMUM_REQUESTS: u64 = 10;

/// Default replicas-per-request ratio at which throttling activates.
pub const DEFAULT_CRITICAL_RATIO: f64 = 1.5;

/// Settings of the [`ReplicaBudgeting`][crate::modules::ReplicaBudgeting] module.
///
/// # Examples
///
/// ```
/// use cluster_client::budget::ReplicaBudgetingOptions;
///
/// let options = ReplicaBudgetingOptions::new("billing")
///     .minimum_requests(50)
///     .critical_ratio(1.2);
///
/// assert_eq!(options.name(), "billing");
/// assert_eq!(options.minimum_replicas_limit(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaBudgetingOptions {
    name: String,
    minimum_replicas: usize,
    minimum_requests: u64,
    critical_ratio: f64,
}

impl ReplicaBudgetingOptions {
    /// Creates options for the budget `name` with default thresholds.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            minimum_replicas: DEFAULT_MINIMUM_REPLICAS,
            minimum_requests: DEFAULT_MINIMUM_REQUESTS,
            critical_ratio: DEFAULT_CRITICAL_RATIO,
        }
    }

    /// Sets the replica cap applied when throttling. Values below `1` are raised to `1`.
    ///
    /// **Default**: 1
    #[must_use]
    pub fn minimum_replicas(mut self, minimum: usize) -> Self {
        self.minimum_replicas = minimum.max(1);
        self
    }

    /// Sets how many requests must be observed before throttling may activate.
    ///
    /// **Default**: 10
    #[must_use]
    pub fn minimum_requests(mut self, minimum: u64) -> Self {
        self.minimum_requests = minimum;
        self
    }

    /// Sets the replicas-per-request ratio at which throttling activates.
    ///
    /// **Default**: 1.5
    #[must_use]
    pub fn critical_ratio(mut self, ratio: f64) -> Self {
        self.critical_ratio = ratio;
        self
    }

    /// The budget name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The replica cap applied when throttling.
    #[must_use]
    pub fn minimum_replicas_limit(&self) -> usize {
        self.minimum_replicas
    }

    /// The sample size required before throttling.
    #[must_use]
    pub fn minimum_requests_count(&self) -> u64 {
        self.minimum_requests
    }

    /// The throttling threshold.
    #[must_use]
    pub fn critical_ratio_value(&self) -> f64 {
        self.critical_ratio
    }

    pub(crate) fn should_throttle(&self, snapshot: BudgetSnapshot) -> bool {
        snapshot.requests() >= self.minimum_requests && snapshot.ratio() >= self.critical_ratio
    }
}
