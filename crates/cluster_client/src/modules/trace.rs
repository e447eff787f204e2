// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use layered::{Layer, Service};
use tick::Clock;
use uuid::Uuid;

use super::error_catching::panic_message;
use crate::context::RequestContext;
use crate::model::ClusterResult;

/// Routing key used when none is configured.
pub const DEFAULT_ROUTING_KEY: &str = "traces";

const COMPONENT: &str = "cluster-client";

/// Trace record describing the execution of one logical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceSpan {
    trace_id: Uuid,
    span_id: Uuid,
    begin: SystemTime,
    end: SystemTime,
    annotations: BTreeMap<String, String>,
}

impl TraceSpan {
    /// Identifier of the trace the span belongs to.
    #[must_use]
    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    /// Identifier of the span.
    #[must_use]
    pub fn span_id(&self) -> Uuid {
        self.span_id
    }

    /// Time the request entered the pipeline.
    #[must_use]
    pub fn begin(&self) -> SystemTime {
        self.begin
    }

    /// Time the request left the pipeline.
    #[must_use]
    pub fn end(&self) -> SystemTime {
        self.end
    }

    /// Flat annotations describing the request and its outcome.
    #[must_use]
    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }

    /// Value of the annotation named `key`.
    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

/// Destination of trace spans.
///
/// Implementations are expected to buffer spans and ship them on their own schedule; `push`
/// must not block. A panicking `push` loses the span and is logged at `ERROR` level; the
/// request result is still returned to the caller.
pub trait TraceSink: Send + Sync {
    /// Hands `span` over to the sink under `routing_key`.
    fn push(&self, routing_key: &str, span: TraceSpan);
}

/// In-memory [`TraceSink`] keeping every pushed span.
#[derive(Debug, Default)]
pub struct CollectingSink {
    spans: Mutex<Vec<(String, TraceSpan)>>,
}

impl CollectingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spans pushed so far together with their routing keys, in push order.
    #[must_use]
    pub fn spans(&self) -> Vec<(String, TraceSpan)> {
        self.spans.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of spans pushed so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` when no span was pushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TraceSink for CollectingSink {
    fn push(&self, routing_key: &str, span: TraceSpan) {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((routing_key.to_owned(), span));
    }
}

/// Pushes exactly one [`TraceSpan`] per request to a [`TraceSink`].
///
/// The module wraps the fault-free part of the pipeline, so a span is produced regardless of
/// the outcome. Annotations:
///
/// | Key | Value |
/// |-----|-------|
/// | `kind`, `component` | `cluster-client` |
/// | `cluster.strategy` | label of the request strategy |
/// | `cluster.status` | status of the result |
/// | `http.method` | request method |
/// | `http.url` | request path without query |
/// | `http.requestContentLength` | request body length |
/// | `http.responseContentLength` | response body length, `0` without response |
/// | `http.code` | response code, `0` without response |
/// | `service` | configured service name |
pub struct Tracing<S> {
    shared: Arc<TracingShared>,
    inner: S,
}

struct TracingShared {
    clock: Clock,
    sink: Arc<dyn TraceSink>,
    service_name: Cow<'static, str>,
    routing_key: Cow<'static, str>,
}

impl<S: Clone> Clone for Tracing<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            inner: self.inner.clone(),
        }
    }
}

impl<S: Debug> Debug for Tracing<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracing")
            .field("service_name", &self.shared.service_name)
            .field("routing_key", &self.shared.routing_key)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl Tracing<()> {
    /// Creates a tracing layer pushing spans of `service_name` to `sink`.
    #[must_use]
    pub fn layer(clock: &Clock, sink: Arc<dyn TraceSink>, service_name: impl Into<Cow<'static, str>>) -> TracingLayer {
        TracingLayer {
            clock: clock.clone(),
            sink,
            service_name: service_name.into(),
            routing_key: Cow::Borrowed(DEFAULT_ROUTING_KEY),
        }
    }
}

/// Layer producing [`Tracing`] services.
#[derive(Clone)]
pub struct TracingLayer {
    clock: Clock,
    sink: Arc<dyn TraceSink>,
    service_name: Cow<'static, str>,
    routing_key: Cow<'static, str>,
}

impl TracingLayer {
    /// Sets the routing key spans are pushed under.
    ///
    /// **Default**: [`DEFAULT_ROUTING_KEY`]
    #[must_use]
    pub fn routing_key(mut self, routing_key: impl Into<Cow<'static, str>>) -> Self {
        self.routing_key = routing_key.into();
        self
    }
}

impl Debug for TracingLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingLayer")
            .field("service_name", &self.service_name)
            .field("routing_key", &self.routing_key)
            .finish_non_exhaustive()
    }
}

impl<S> Layer<S> for TracingLayer {
    type Service = Tracing<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Tracing {
            shared: Arc::new(TracingShared {
                clock: self.clock.clone(),
                sink: Arc::clone(&self.sink),
                service_name: self.service_name.clone(),
                routing_key: self.routing_key.clone(),
            }),
            inner,
        }
    }
}

impl<S> Service<RequestContext> for Tracing<S>
where
    S: Service<RequestContext, Out = ClusterResult>,
{
    type Out = ClusterResult;

    async fn execute(&self, context: RequestContext) -> Self::Out {
        let begin = self.shared.clock.system_time();
        let result = self.inner.execute(context.clone()).await;
        let end = self.shared.clock.system_time();

        let span = TraceSpan {
            trace_id: Uuid::new_v4(),
            span_id: Uuid::new_v4(),
            begin,
            end,
            annotations: self.shared.annotate(&context, &result),
        };
        let pushed = catch_unwind(AssertUnwindSafe(|| self.shared.sink.push(&self.shared.routing_key, span)));
        if let Err(panic) = pushed {
            tracing::error!(
                parent: context.span(),
                error = %panic_message(panic.as_ref()),
                routing_key = %self.shared.routing_key,
                "trace sink failed to accept span"
            );
        }

        result
    }
}

impl TracingShared {
    fn annotate(&self, context: &RequestContext, result: &ClusterResult) -> BTreeMap<String, String> {
        let request = context.request();
        let (code, response_length) = result
            .response()
            .map_or((0, 0), |response| (response.code().as_u16(), response.content_length()));

        [
            ("kind", COMPONENT.to_owned()),
            ("component", COMPONENT.to_owned()),
            ("cluster.strategy", context.strategy().label().into_owned()),
            ("cluster.status", result.status().to_string()),
            ("http.method", request.method().to_string()),
            ("http.url", request.path().to_owned()),
            ("http.requestContentLength", request.content_length().to_string()),
            ("http.responseContentLength", response_length.to_string()),
            ("http.code", code.to_string()),
            ("service", self.service_name.clone().into_owned()),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use http::Uri;
    use layered::Execute;
    use pretty_assertions::assert_eq;
    use tick::ClockControl;
    use tracing::Level;

    use super::*;
    use crate::model::{ClusterResultStatus, Request, Response, ResponseCode};
    use crate::strategy::{ParallelStrategy, SequentialStrategy};
    use crate::testing::{LogCapture, context};
    use crate::time_budget::TimeBudget;

    #[tokio::test]
    async fn span_carries_request_and_result_annotations() {
        let clock = Clock::new_frozen_at(UNIX_EPOCH + Duration::from_secs(1_000));
        let sink = Arc::new(CollectingSink::new());
        let request = Request::post(Uri::from_static("/foo/bar?x=1")).with_body("hello");
        let context = RequestContext::new(
            request,
            Arc::new(ParallelStrategy::new(2)),
            TimeBudget::start(&clock, Duration::from_secs(1)),
        );

        let service = Tracing::layer(&clock, Arc::clone(&sink) as Arc<dyn TraceSink>, "billing").layer(Execute::new(
            |context: RequestContext| async move {
                ClusterResult::new(
                    ClusterResultStatus::Success,
                    Vec::new(),
                    Some(Response::new(ResponseCode::new(409)).with_body("abc")),
                    context.request_handle().clone(),
                )
            },
        ));
        service.execute(context).await;

        let spans = sink.spans();
        assert_eq!(spans.len(), 1);
        let (routing_key, span) = &spans[0];
        assert_eq!(routing_key, DEFAULT_ROUTING_KEY);
        assert_eq!(span.begin(), UNIX_EPOCH + Duration::from_secs(1_000));

        let expected: BTreeMap<String, String> = [
            ("kind", "cluster-client"),
            ("component", "cluster-client"),
            ("cluster.strategy", "Parallel-2"),
            ("cluster.status", "Success"),
            ("http.method", "POST"),
            ("http.url", "/foo/bar"),
            ("http.requestContentLength", "5"),
            ("http.responseContentLength", "3"),
            ("http.code", "409"),
            ("service", "billing"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect();
        assert_eq!(span.annotations(), &expected);
    }

    #[tokio::test]
    async fn span_without_response_reports_zero_code() {
        let clock = Clock::new_frozen();
        let sink = Arc::new(CollectingSink::new());

        let service = Tracing::layer(&clock, Arc::clone(&sink) as Arc<dyn TraceSink>, "billing")
            .routing_key("custom")
            .layer(Execute::new(|context: RequestContext| async move {
                ClusterResult::canceled(context.request_handle().clone())
            }));
        let result = service
            .execute(context(&clock, SequentialStrategy, Duration::from_secs(1)))
            .await;

        assert_eq!(result.status(), ClusterResultStatus::Canceled);
        let (routing_key, span) = sink.spans().pop().unwrap();
        assert_eq!(routing_key, "custom");
        assert_eq!(span.annotation("http.code"), Some("0"));
        assert_eq!(span.annotation("http.responseContentLength"), Some("0"));
        assert_eq!(span.annotation("cluster.status"), Some("Canceled"));
        assert_eq!(span.annotation("cluster.strategy"), Some("Sequential"));
        assert_eq!(span.annotation("http.url"), Some("/billing/process"));
    }

    #[tokio::test]
    async fn span_covers_pipeline_duration() {
        let control = ClockControl::new();
        let clock = control.to_clock();
        let sink = Arc::new(CollectingSink::new());
        let inner_control = control.clone();

        let service = Tracing::layer(&clock, Arc::clone(&sink) as Arc<dyn TraceSink>, "billing").layer(Execute::new(
            move |context: RequestContext| {
                inner_control.advance(Duration::from_millis(250));
                async move { ClusterResult::replicas_not_found(context.request_handle().clone()) }
            },
        ));
        service
            .execute(context(&clock, SequentialStrategy, Duration::from_secs(1)))
            .await;

        let (_, span) = sink.spans().pop().unwrap();
        assert_eq!(span.end().duration_since(span.begin()).unwrap(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn every_request_gets_distinct_span() {
        let clock = Clock::new_frozen();
        let sink = Arc::new(CollectingSink::new());
        let service = Tracing::layer(&clock, Arc::clone(&sink) as Arc<dyn TraceSink>, "billing").layer(Execute::new(
            |context: RequestContext| async move { ClusterResult::replicas_not_found(context.request_handle().clone()) },
        ));

        for _ in 0..3 {
            service
                .execute(context(&clock, SequentialStrategy, Duration::from_secs(1)))
                .await;
        }

        let spans = sink.spans();
        assert_eq!(sink.len(), 3);
        assert_ne!(spans[0].1.span_id(), spans[1].1.span_id());
        assert_ne!(spans[1].1.trace_id(), spans[2].1.trace_id());
    }

    struct FailingSink;

    impl TraceSink for FailingSink {
        fn push(&self, _routing_key: &str, _span: TraceSpan) {
            panic!("sink offline");
        }
    }

    #[tokio::test]
    async fn failing_sink_keeps_result_and_logs_once() {
        let log_capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(log_capture.subscriber());
        let clock = Clock::new_frozen();

        let service = Tracing::layer(&clock, Arc::new(FailingSink), "billing").layer(Execute::new(
            |context: RequestContext| async move { ClusterResult::replicas_not_found(context.request_handle().clone()) },
        ));
        let result = service
            .execute(context(&clock, SequentialStrategy, Duration::from_secs(1)))
            .await;

        assert_eq!(result.status(), ClusterResultStatus::ReplicasNotFound);
        assert_eq!(log_capture.levels(), vec![Level::ERROR]);
        log_capture.assert_contains("sink offline");
    }

    #[test]
    fn collecting_sink_survives_poisoned_lock() {
        let sink = Arc::new(CollectingSink::new());
        let poisoner = Arc::clone(&sink);
        let _ = std::thread::spawn(move || {
            let _held = poisoner.spans.lock().unwrap();
            panic!("poison");
        })
        .join();

        let span = TraceSpan {
            trace_id: Uuid::new_v4(),
            span_id: Uuid::new_v4(),
            begin: SystemTime::UNIX_EPOCH,
            end: SystemTime::UNIX_EPOCH,
            annotations: BTreeMap::new(),
        };
        sink.push("traces", span);

        assert_eq!(sink.len(), 1);
        assert!(!sink.is_empty());
    }

    #[test]
    fn debug_shows_service_name() {
        let layer = Tracing::layer(&Clock::new_frozen(), Arc::new(CollectingSink::new()), "billing");

        assert!(format!("{layer:?}").contains("billing"));
    }
}
