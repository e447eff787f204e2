// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Display};

/// Kind of fault raised inside the request pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FaultKind {
    /// The request was canceled by the caller.
    Canceled {
        /// Number of replica attempts launched before cancellation was observed.
        attempted_replicas: usize,
    },

    /// Any other fault.
    Unexpected,
}

impl Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Canceled { attempted_replicas } => {
                write!(f, "request canceled after {attempted_replicas} replica attempt(s)")
            }
            Self::Unexpected => f.write_str("unexpected fault"),
        }
    }
}

/// Fault produced by a pipeline stage instead of a [`ClusterResult`][crate::ClusterResult].
///
/// Faults only travel between the stages nested inside the
/// [`ErrorCatching`][crate::modules::ErrorCatching] module, which converts them into
/// [`Canceled`][crate::ClusterResultStatus::Canceled] or
/// [`UnexpectedException`][crate::ClusterResultStatus::UnexpectedException] results.
#[ohno::error]
#[display("cluster pipeline fault: {kind}")]
pub struct PipelineError {
    kind: FaultKind,
}

impl PipelineError {
    /// Creates a cancellation fault.
    #[must_use]
    pub fn canceled(attempted_replicas: usize) -> Self {
        Self::new(FaultKind::Canceled { attempted_replicas })
    }

    /// Creates a fault caused by an arbitrary error.
    #[must_use]
    pub fn unexpected(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(FaultKind::Unexpected, cause)
    }

    /// The kind of this fault.
    #[must_use]
    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    /// Returns `true` when this fault signals cancellation.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self.kind, FaultKind::Canceled { .. })
    }
}

/// Reason a [`Request`][crate::Request] cannot be sent to any replica.
#[ohno::error]
#[display("invalid request: {reason}")]
pub struct RequestValidationError {
    reason: String,
}

impl RequestValidationError {
    /// Human-readable description of the problem.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canceled_is_cancellation() {
        let error = PipelineError::canceled(2);

        assert!(error.is_cancellation());
        assert_eq!(error.kind(), FaultKind::Canceled { attempted_replicas: 2 });
        assert!(error.to_string().contains("after 2 replica attempt(s)"), "{error}");
    }

    #[test]
    fn unexpected_keeps_cause() {
        let error = PipelineError::unexpected("socket exploded");

        assert!(!error.is_cancellation());
        assert_eq!(error.kind(), FaultKind::Unexpected);
        assert!(error.to_string().contains("socket exploded"), "{error}");
    }

    #[test]
    fn validation_reason_is_exposed() {
        let error = RequestValidationError::new("bad target");

        assert_eq!(error.reason(), "bad target");
        assert!(error.to_string().starts_with("invalid request: bad target"));
    }
}
