// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Resilient client for services deployed as a set of interchangeable replicas.
//!
//! A logical request is routed to one or more concrete replicas, their outcomes are folded
//! into a single [`ClusterResult`], and speculative extra attempts are throttled once they
//! stop paying off.
//!
//! # Pipeline
//!
//! Every request travels through a chain of [`Layer`]s built on the `layered` crate. The
//! [`ClusterClientBuilder`] assembles, outermost first:
//!
//! 1. [`Tracing`][modules::Tracing]: pushes one [`TraceSpan`][modules::TraceSpan] per
//!    request to a [`TraceSink`][modules::TraceSink].
//! 2. [`ErrorCatching`][modules::ErrorCatching]: turns faults and panics into
//!    [`UnexpectedException`][ClusterResultStatus::UnexpectedException] results and
//!    cancellation into [`Canceled`][ClusterResultStatus::Canceled] results.
//! 3. [`RequestRetry`][modules::RequestRetry]: repeats passes whose result is retriable.
//! 4. [`ReplicaBudgeting`][modules::ReplicaBudgeting]: records replicas spent per request and
//!    caps the replicas of the request once the ratio becomes critical.
//! 5. [`ClusterSender`]: validates the request, runs the [strategy][strategy] against the
//!    replicas and aggregates their results.
//!
//! Stages can also be composed by hand with [`Layer::layer`] and executed with
//! [`Service::execute`] over a [`RequestContext`].
//!
//! # Strategies
//!
//! Strategies decide how many replicas are contacted concurrently and when extra attempts
//! are added. See the [`strategy`] module for the built-in ones.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use cluster_client::budget::ReplicaBudgetingOptions;
//! use cluster_client::modules::{CollectingSink, TraceSink};
//! use cluster_client::strategy::{ForkingDelay, ForkingStrategy};
//! use cluster_client::{ClusterClient, FixedReplicas, Request, Response, ResponseCode, Transport};
//! use http::Uri;
//! use tick::Clock;
//!
//! struct Echo;
//!
//! impl Transport for Echo {
//!     async fn send(&self, _replica: &Uri, request: &Request, _timeout: Duration) -> Response {
//!         let body = request.body().cloned().unwrap_or_default();
//!         Response::new(ResponseCode::OK).with_body(body)
//!     }
//! }
//!
//! # futures::executor::block_on(async {
//! let clock = Clock::new_frozen();
//! let sink = Arc::new(CollectingSink::new());
//! let client = ClusterClient::builder(&clock, Echo, FixedReplicas::new([Uri::from_static("http://replica:80")]))
//!     .strategy(ForkingStrategy::new(2, ForkingDelay::fixed(Duration::from_millis(50))))
//!     .replica_budgeting(ReplicaBudgetingOptions::new("echo"))
//!     .retry(2, Duration::from_millis(10))
//!     .tracing(Arc::clone(&sink) as Arc<dyn TraceSink>)
//!     .service_name("echo")
//!     .build();
//!
//! let result = client.send(Request::post(Uri::from_static("/echo")).with_body("ping")).await;
//!
//! assert!(result.is_success());
//! assert_eq!(sink.len(), 1);
//! # });
//! ```

mod aggregation;
pub mod budget;
mod client;
#[cfg(any(feature = "serde", test))]
mod config;
mod context;
mod error;
mod model;
pub mod modules;
mod sender;
pub mod strategy;
mod time_budget;
mod transport;

pub use aggregation::ResultAggregator;
pub use client::{ClusterClient, ClusterClientBuilder, DEFAULT_SERVICE_NAME, DEFAULT_TIMEOUT, RequestParameters};
#[cfg(any(feature = "serde", test))]
pub use config::{ClusterClientConfig, ReplicaBudgetingConfig, RetryConfig, StrategyConfig};
pub use context::RequestContext;
pub use error::{FaultKind, PipelineError, RequestValidationError};
pub use model::{ClusterResult, ClusterResultStatus, ReplicaResult, Request, Response, ResponseClassifier, ResponseCode, ResponseVerdict};
pub use sender::ClusterSender;
pub use time_budget::TimeBudget;
pub use transport::{FixedReplicas, ReplicaSource, Transport};

#[doc(inline)]
pub use layered::{Layer, Service};
#[doc(inline)]
pub use recoverable::{Recovery, RecoveryInfo, RecoveryKind};
#[doc(inline)]
pub use tokio_util::sync::CancellationToken;

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
pub(crate) mod testing;
