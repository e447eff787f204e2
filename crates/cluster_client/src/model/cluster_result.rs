// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Display};
use std::sync::Arc;

use recoverable::{Recovery, RecoveryInfo};

use super::{ReplicaResult, Request, Response};

/// Terminal status of a logical request.
///
/// The set is closed: every request ends in exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterResultStatus {
    /// A replica accepted the request.
    Success,

    /// The overall deadline elapsed before any replica accepted the request.
    TimeExpired,

    /// Every usable replica was tried and none accepted the request.
    ReplicasExhausted,

    /// No replicas were available to try.
    ReplicasNotFound,

    /// The request was malformed and never sent.
    IncorrectArguments,

    /// The caller canceled the request.
    Canceled,

    /// The pipeline faulted.
    UnexpectedException,
}

impl ClusterResultStatus {
    /// Stable name of the status, as reported to tracing sinks.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::TimeExpired => "TimeExpired",
            Self::ReplicasExhausted => "ReplicasExhausted",
            Self::ReplicasNotFound => "ReplicasNotFound",
            Self::IncorrectArguments => "IncorrectArguments",
            Self::Canceled => "Canceled",
            Self::UnexpectedException => "UnexpectedException",
        }
    }
}

impl Display for ClusterResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combined outcome of a logical request sent to a cluster.
///
/// Replica results are ordered by completion time. For [`Success`][ClusterResultStatus::Success]
/// the response is the accepted one; for other statuses it is the last response that was
/// not a transport failure, if any.
#[derive(Debug, Clone)]
pub struct ClusterResult {
    status: ClusterResultStatus,
    replica_results: Vec<ReplicaResult>,
    response: Option<Response>,
    request: Arc<Request>,
}

impl ClusterResult {
    /// Creates a cluster result.
    #[must_use]
    pub fn new(
        status: ClusterResultStatus,
        replica_results: Vec<ReplicaResult>,
        response: Option<Response>,
        request: Arc<Request>,
    ) -> Self {
        Self {
            status,
            replica_results,
            response,
            request,
        }
    }

    /// Result for a request canceled by the caller.
    #[must_use]
    pub fn canceled(request: Arc<Request>) -> Self {
        Self::new(ClusterResultStatus::Canceled, Vec::new(), None, request)
    }

    /// Result for a request whose pipeline faulted.
    #[must_use]
    pub fn unexpected_exception(request: Arc<Request>) -> Self {
        Self::new(ClusterResultStatus::UnexpectedException, Vec::new(), None, request)
    }

    /// Result for a malformed request.
    #[must_use]
    pub fn incorrect_arguments(request: Arc<Request>) -> Self {
        Self::new(ClusterResultStatus::IncorrectArguments, Vec::new(), None, request)
    }

    /// Result for a request with no replicas to try.
    #[must_use]
    pub fn replicas_not_found(request: Arc<Request>) -> Self {
        Self::new(ClusterResultStatus::ReplicasNotFound, Vec::new(), None, request)
    }

    /// The terminal status.
    #[must_use]
    pub fn status(&self) -> ClusterResultStatus {
        self.status
    }

    /// Per-replica outcomes in completion order.
    #[must_use]
    pub fn replica_results(&self) -> &[ReplicaResult] {
        &self.replica_results
    }

    /// The final response, if any.
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// The originating request.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Returns `true` for [`ClusterResultStatus::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ClusterResultStatus::Success
    }
}

impl Recovery for ClusterResult {
    fn recovery(&self) -> RecoveryInfo {
        match self.status {
            ClusterResultStatus::ReplicasExhausted => RecoveryInfo::retry(),
            ClusterResultStatus::ReplicasNotFound => RecoveryInfo::unavailable(),
            ClusterResultStatus::UnexpectedException => RecoveryInfo::unknown(),
            ClusterResultStatus::Success
            | ClusterResultStatus::TimeExpired
            | ClusterResultStatus::IncorrectArguments
            | ClusterResultStatus::Canceled => RecoveryInfo::never(),
        }
    }
}
