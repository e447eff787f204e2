// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use layered::{Layer, Service};

use super::PipelineResult;
use crate::context::RequestContext;
use crate::error::PipelineError;
use crate::model::ClusterResult;

/// Converts every fault of the nested pipeline into a terminal [`ClusterResult`].
///
/// - a result produced by the nested pipeline is returned as is,
/// - a cancellation fault becomes [`Canceled`][crate::ClusterResultStatus::Canceled] and is
///   not logged,
/// - any other fault, including a panic, becomes
///   [`UnexpectedException`][crate::ClusterResultStatus::UnexpectedException] and is logged
///   once at `ERROR` level under the span of the request context.
///
/// This must be the outermost fault-producing stage of a pipeline. Stages outside of it
/// receive plain [`ClusterResult`] values.
#[derive(Debug, Clone)]
pub struct ErrorCatching<S> {
    inner: S,
}

impl ErrorCatching<()> {
    /// Creates the error catching layer.
    #[must_use]
    pub fn layer() -> ErrorCatchingLayer {
        ErrorCatchingLayer
    }
}

/// Layer producing [`ErrorCatching`] services.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorCatchingLayer;

impl<S> Layer<S> for ErrorCatchingLayer {
    type Service = ErrorCatching<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ErrorCatching { inner }
    }
}

impl<S> Service<RequestContext> for ErrorCatching<S>
where
    S: Service<RequestContext, Out = PipelineResult>,
{
    type Out = ClusterResult;

    async fn execute(&self, context: RequestContext) -> Self::Out {
        let outcome = AssertUnwindSafe(self.inner.execute(context.clone())).catch_unwind().await;

        let error = match outcome {
            Ok(Ok(result)) => return result,
            Ok(Err(error)) if error.is_cancellation() => {
                return ClusterResult::canceled(context.request_handle().clone());
            }
            Ok(Err(error)) => error,
            Err(panic) => PipelineError::unexpected(panic_message(panic.as_ref())),
        };

        let request = context.request();
        tracing::error!(
            parent: context.span(),
            error = %error,
            request.method = %request.method(),
            request.url = %request.uri(),
            "unexpected failure while executing cluster request"
        );

        ClusterResult::unexpected_exception(context.request_handle().clone())
    }
}

pub(super) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_owned()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use layered::Execute;
    use tick::Clock;
    use tracing::Level;

    use super::*;
    use crate::model::ClusterResultStatus;
    use crate::strategy::SequentialStrategy;
    use crate::testing::{LogCapture, context};

    fn explode() -> PipelineResult {
        panic!("strategy bug")
    }

    fn context_for_test() -> RequestContext {
        context(&Clock::new_frozen(), SequentialStrategy, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn success_passes_through_same_instance() {
        let context = context_for_test();
        let produced = ClusterResult::new(
            ClusterResultStatus::ReplicasExhausted,
            Vec::with_capacity(4),
            None,
            context.request_handle().clone(),
        );
        let address = produced.replica_results().as_ptr();
        let slot = Arc::new(Mutex::new(Some(produced)));
        let log_capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(log_capture.subscriber());

        let service = ErrorCatching::layer().layer(Execute::new(move |_: RequestContext| {
            let produced = slot.lock().unwrap().take();
            async move { Ok::<_, PipelineError>(produced.unwrap()) }
        }));
        let result = service.execute(context).await;

        assert_eq!(result.status(), ClusterResultStatus::ReplicasExhausted);
        assert_eq!(result.replica_results().as_ptr(), address);
        assert!(log_capture.levels().is_empty());
    }

    #[tokio::test]
    async fn fault_becomes_unexpected_exception_with_one_error() {
        let log_capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(log_capture.subscriber());

        let service = ErrorCatching::layer().layer(Execute::new(|_: RequestContext| async {
            Err::<ClusterResult, _>(PipelineError::unexpected("replica pool exploded"))
        }));
        let result = service.execute(context_for_test()).await;

        assert_eq!(result.status(), ClusterResultStatus::UnexpectedException);
        assert!(result.replica_results().is_empty());
        assert!(result.response().is_none());
        assert_eq!(log_capture.levels(), vec![Level::ERROR]);
        log_capture.assert_contains("replica pool exploded");
        log_capture.assert_contains("request.url=/billing/process?p1=p");
    }

    #[tokio::test]
    async fn panic_becomes_unexpected_exception_with_one_error() {
        let log_capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(log_capture.subscriber());

        let service = ErrorCatching::layer().layer(Execute::new(|_: RequestContext| async { explode() }));
        let result = service.execute(context_for_test()).await;

        assert_eq!(result.status(), ClusterResultStatus::UnexpectedException);
        assert_eq!(log_capture.levels(), vec![Level::ERROR]);
        log_capture.assert_contains("strategy bug");
    }

    #[tokio::test]
    async fn cancellation_becomes_canceled_without_logs() {
        let log_capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(log_capture.subscriber());

        let service = ErrorCatching::layer().layer(Execute::new(|_: RequestContext| async {
            Err::<ClusterResult, _>(PipelineError::canceled(3))
        }));
        let result = service.execute(context_for_test()).await;

        assert_eq!(result.status(), ClusterResultStatus::Canceled);
        assert!(result.replica_results().is_empty());
        assert!(result.response().is_none());
        assert!(log_capture.levels().is_empty());
    }

    #[test]
    fn panic_message_formats_payloads() {
        assert_eq!(panic_message(&"boom"), "panicked: boom");
        assert_eq!(panic_message(&"boom".to_owned()), "panicked: boom");
        assert_eq!(panic_message(&42_u8), "panicked");
    }
}
