// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use http::Uri;

use super::{Response, ResponseVerdict};

/// Outcome of one attempt against one replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaResult {
    replica: Uri,
    response: Response,
    verdict: ResponseVerdict,
    elapsed: Duration,
}

impl ReplicaResult {
    /// Creates a replica result.
    #[must_use]
    pub fn new(replica: Uri, response: Response, verdict: ResponseVerdict, elapsed: Duration) -> Self {
        Self {
            replica,
            response,
            verdict,
            elapsed,
        }
    }

    /// Endpoint of the replica that was attempted.
    #[must_use]
    pub fn replica(&self) -> &Uri {
        &self.replica
    }

    /// Response received from the replica, possibly a synthetic transport failure.
    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Verdict assigned to the response.
    #[must_use]
    pub fn verdict(&self) -> ResponseVerdict {
        self.verdict
    }

    /// Time spent on this attempt.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Returns `true` when the replica response was accepted.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.verdict == ResponseVerdict::Accept
    }
}
