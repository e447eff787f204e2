// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::time::Duration;

use http::Uri;

use crate::model::{Request, Response};

/// Sends a request to one concrete replica.
///
/// Ordinary network failures are reported as synthetic responses (see
/// [`Response::connect_failure`] and friends) rather than errors. The transport should give up
/// once `timeout` elapses; the caller enforces the timeout as well and reports
/// [`ResponseCode::REQUEST_TIMEOUT`][crate::ResponseCode::REQUEST_TIMEOUT] when it fires first.
pub trait Transport: Send + Sync {
    /// Sends `request` to `replica`.
    fn send(&self, replica: &Uri, request: &Request, timeout: Duration) -> impl Future<Output = Response> + Send;
}

impl<T: Transport> Transport for std::sync::Arc<T> {
    fn send(&self, replica: &Uri, request: &Request, timeout: Duration) -> impl Future<Output = Response> + Send {
        (**self).send(replica, request, timeout)
    }
}

/// Provides the candidate replicas of a request, in preference order.
pub trait ReplicaSource: Send + Sync + Debug {
    /// Returns the replicas to try. An empty list ends the request with
    /// [`ReplicasNotFound`][crate::ClusterResultStatus::ReplicasNotFound].
    fn replicas(&self, request: &Request) -> Vec<Uri>;
}

/// A static list of replicas used for every request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedReplicas {
    replicas: Vec<Uri>,
}

impl FixedReplicas {
    /// Creates a source returning `replicas` in the given order.
    #[must_use]
    pub fn new(replicas: impl IntoIterator<Item = Uri>) -> Self {
        Self {
            replicas: replicas.into_iter().collect(),
        }
    }
}

impl FromIterator<Uri> for FixedReplicas {
    fn from_iter<I: IntoIterator<Item = Uri>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl ReplicaSource for FixedReplicas {
    fn replicas(&self, _request: &Request) -> Vec<Uri> {
        self.replicas.clone()
    }
}
