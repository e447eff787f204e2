// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;

static GLOBAL: LazyLock<BudgetRegistry> = LazyLock::new(BudgetRegistry::new);

/// Table of replica budgets keyed by budget name.
///
/// Entries are created on first use and live as long as the registry. Creation is the only
/// guarded operation; counter updates on an existing entry never block other requests.
///
/// Clones share their entries.
#[derive(Debug, Clone, Default)]
pub struct BudgetRegistry {
    entries: Arc<DashMap<String, Arc<BudgetCounters>>>,
}

impl BudgetRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Returns the counters of `name`, creating them on first use.
    #[must_use]
    pub fn entry(&self, name: &str) -> Arc<BudgetCounters> {
        if let Some(counters) = self.entries.get(name) {
            return Arc::clone(counters.value());
        }

        Arc::clone(self.entries.entry(name.to_owned()).or_default().value())
    }

    /// Returns the counters of `name` if they exist.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<BudgetCounters>> {
        self.entries.get(name).map(|counters| Arc::clone(counters.value()))
    }

    /// Number of budget names seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no budget was used yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cumulative request and replica counters of one budget name.
#[derive(Debug, Default)]
pub struct BudgetCounters {
    requests: AtomicU64,
    replicas: AtomicU64,
}

impl BudgetCounters {
    /// Records one request that used `replicas` replica attempts.
    ///
    /// Returns the counter values as observed by this update.
    pub fn record(&self, replicas: u64) -> BudgetSnapshot {
        let requests = self.requests.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        let replicas = self.replicas.fetch_add(replicas, Ordering::AcqRel).saturating_add(replicas);

        BudgetSnapshot { requests, replicas }
    }

    /// Reads the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> BudgetSnapshot {
        BudgetSnapshot {
            requests: self.requests.load(Ordering::Acquire),
            replicas: self.replicas.load(Ordering::Acquire),
        }
    }

    /// Number of requests recorded.
    #[must_use]
    pub fn requests(&self) -> u64 {
        self.snapshot().requests
    }

    /// Number of replica attempts recorded.
    #[must_use]
    pub fn replicas(&self) -> u64 {
        self.snapshot().replicas
    }

    /// Replicas per request, `0.0` before the first request.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        self.snapshot().ratio()
    }
}

/// Point-in-time view of [`BudgetCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BudgetSnapshot {
    requests: u64,
    replicas: u64,
}

impl BudgetSnapshot {
    /// Number of requests.
    #[must_use]
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Number of replica attempts.
    #[must_use]
    pub fn replicas(&self) -> u64 {
        self.replicas
    }

    /// Replicas per request, `0.0` when no request was recorded.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "counters stay far below 2^52 in practice")]
    pub fn ratio(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }

        self.replicas as f64 / self.requests as f64
    }
}
