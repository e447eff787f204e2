// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Middleware modules of the request pipeline.
//!
//! Every module is a [`Layer`][layered::Layer] wrapping the rest of the pipeline. Modules are
//! composed by nesting; the client assembles them in this order, outermost first:
//!
//! | Module | Input | Output |
//! |--------|-------|--------|
//! | [`Tracing`] | [`RequestContext`][crate::RequestContext] | [`ClusterResult`] |
//! | [`ErrorCatching`] | [`RequestContext`][crate::RequestContext] | [`ClusterResult`] |
//! | [`RequestRetry`] | [`RequestContext`][crate::RequestContext] | [`PipelineResult`] |
//! | [`ReplicaBudgeting`] | [`RequestContext`][crate::RequestContext] | [`PipelineResult`] |
//! | [`ClusterSender`][crate::ClusterSender] | [`RequestContext`][crate::RequestContext] | [`PipelineResult`] |
//!
//! Stages nested inside [`ErrorCatching`] report faults through the `Err` arm of
//! [`PipelineResult`]. [`ErrorCatching`] is the only place converting faults into results,
//! so it must wrap every stage that can fault.

mod backoff;
mod error_catching;
mod replica_budgeting;
mod retry;
mod trace;

pub use backoff::Backoff;
pub use error_catching::{ErrorCatching, ErrorCatchingLayer};
pub use replica_budgeting::{ReplicaBudgeting, ReplicaBudgetingLayer};
pub use retry::{DEFAULT_MAX_ATTEMPTS, RequestRetry, RequestRetryLayer};
pub use trace::{CollectingSink, DEFAULT_ROUTING_KEY, TraceSink, TraceSpan, Tracing, TracingLayer};

use crate::error::PipelineError;
use crate::model::ClusterResult;

/// Outcome of the stages nested inside [`ErrorCatching`].
pub type PipelineResult = Result<ClusterResult, PipelineError>;
