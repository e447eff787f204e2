// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use crate::model::{ClusterResult, ClusterResultStatus, ReplicaResult, Request};

/// Folds replica outcomes into the terminal [`ClusterResult`] of a request.
///
/// The rules, in order:
///
/// 1. an accepted replica result yields [`Success`][ClusterResultStatus::Success] with that
///    replica's response,
/// 2. an elapsed deadline yields [`TimeExpired`][ClusterResultStatus::TimeExpired],
/// 3. no replica result at all yields [`ReplicasNotFound`][ClusterResultStatus::ReplicasNotFound],
/// 4. anything else yields [`ReplicasExhausted`][ClusterResultStatus::ReplicasExhausted].
///
/// Replica results are kept in the given order. Failed results carry the last response that
/// was not a transport failure, if any.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAggregator;

impl ResultAggregator {
    /// Builds the cluster result of `request` from `results`.
    #[must_use]
    pub fn aggregate(request: Arc<Request>, results: Vec<ReplicaResult>, deadline_elapsed: bool) -> ClusterResult {
        if let Some(accepted) = results.iter().find(|result| result.is_accepted()) {
            let response = accepted.response().clone();
            return ClusterResult::new(ClusterResultStatus::Success, results, Some(response), request);
        }

        let status = if deadline_elapsed {
            ClusterResultStatus::TimeExpired
        } else if results.is_empty() {
            ClusterResultStatus::ReplicasNotFound
        } else {
            ClusterResultStatus::ReplicasExhausted
        };

        let response = results
            .iter()
            .rev()
            .map(ReplicaResult::response)
            .find(|response| !response.code().is_network_error())
            .cloned();

        ClusterResult::new(status, results, response, request)
    }
}
