// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug};
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{Either, select};
use http::Uri;
use layered::Service;
use tick::Clock;

use crate::aggregation::ResultAggregator;
use crate::context::RequestContext;
use crate::error::PipelineError;
use crate::model::{ClusterResult, ReplicaResult, Request, Response, ResponseClassifier};
use crate::modules::PipelineResult;
use crate::strategy::runner::{self, Completion};
use crate::transport::{ReplicaSource, Transport};

/// Sends single attempts through a [`Transport`] and classifies their responses.
pub(crate) struct ReplicaSender<T> {
    transport: T,
    classifier: ResponseClassifier,
    clock: Clock,
}

impl<T: Transport> ReplicaSender<T> {
    pub(crate) async fn send(&self, replica: Uri, request: &Request, timeout: Duration) -> ReplicaResult {
        let stopwatch = self.clock.stopwatch();

        let response = {
            let send = pin!(self.transport.send(&replica, request, timeout));
            let expired = pin!(self.clock.delay(timeout));
            match select(send, expired).await {
                Either::Left((response, _)) => response,
                Either::Right(((), _)) => Response::timeout(),
            }
        };

        let verdict = self.classifier.classify(&response);
        ReplicaResult::new(replica, response, verdict, stopwatch.elapsed())
    }
}

/// Terminal pipeline stage that executes a request against the replicas of a cluster.
///
/// The stage checks cancellation, validates the request, asks the [`ReplicaSource`] for
/// candidates, runs the strategy of the request context and aggregates the replica results.
/// A request canceled while attempts are in flight ends with a cancellation fault carrying
/// the number of attempts made.
pub struct ClusterSender<T> {
    replica_sender: ReplicaSender<T>,
    replicas: Arc<dyn ReplicaSource>,
    clock: Clock,
}

impl<T: Transport> ClusterSender<T> {
    /// Creates a sender using `transport` for replicas provided by `replicas`.
    #[must_use]
    pub fn new(clock: &Clock, transport: T, replicas: Arc<dyn ReplicaSource>) -> Self {
        Self {
            replica_sender: ReplicaSender {
                transport,
                classifier: ResponseClassifier::default(),
                clock: clock.clone(),
            },
            replicas,
            clock: clock.clone(),
        }
    }

    /// Uses `classifier` to decide which replica responses are accepted.
    ///
    /// **Default**: [`ResponseClassifier::default`]
    #[must_use]
    pub fn classifier(mut self, classifier: ResponseClassifier) -> Self {
        self.replica_sender.classifier = classifier;
        self
    }
}

impl<T> Debug for ClusterSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterSender")
            .field("replicas", &self.replicas)
            .field("classifier", &self.replica_sender.classifier)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Service<RequestContext> for ClusterSender<T> {
    type Out = PipelineResult;

    async fn execute(&self, context: RequestContext) -> Self::Out {
        if context.is_canceled() {
            return Err(PipelineError::canceled(0));
        }

        let request = context.request_handle();
        if request.validate().is_err() {
            return Ok(ClusterResult::incorrect_arguments(Arc::clone(request)));
        }

        let replicas = self.replicas.replicas(request);
        if replicas.is_empty() {
            return Ok(ClusterResult::replicas_not_found(Arc::clone(request)));
        }

        let sender = &self.replica_sender;
        let target: &Request = request;
        let attempts = runner::drive(&context, &self.clock, replicas, move |replica, timeout| {
            sender.send(replica, target, timeout)
        })
        .await;

        match attempts.completion {
            Completion::Canceled => Err(PipelineError::canceled(attempts.launched)),
            completion => Ok(ResultAggregator::aggregate(
                Arc::clone(request),
                attempts.results,
                completion == Completion::DeadlineElapsed,
            )),
        }
    }
}
