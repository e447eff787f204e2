// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::pin::pin;
use std::task::Poll;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::poll_fn;
use futures_util::stream::{FuturesUnordered, StreamExt};
use http::Uri;
use tick::{Clock, Delay};

use super::{AttemptTimeoutArgs, ForkDelayArgs};
use crate::context::RequestContext;
use crate::model::ReplicaResult;

/// Why the execution loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completion {
    Accepted,
    Exhausted,
    DeadlineElapsed,
    Canceled,
}

/// Replica outcomes collected by the execution loop, in completion order.
#[derive(Debug)]
pub(crate) struct ReplicaAttempts {
    pub(crate) results: Vec<ReplicaResult>,
    pub(crate) launched: usize,
    pub(crate) completion: Completion,
}

enum Event {
    Canceled,
    Completed(ReplicaResult),
    DeadlineElapsed,
    Fork,
}

/// Candidate replicas not attempted yet, limited by the live replica cap of the request.
struct Candidates<'a> {
    context: &'a RequestContext,
    replicas: std::vec::IntoIter<Uri>,
    launched: usize,
}

impl Candidates<'_> {
    fn usable(&self) -> usize {
        self.context
            .maximum_replicas_to_use()
            .saturating_sub(self.launched)
            .min(self.replicas.len())
    }

    fn next(&mut self) -> Option<(Uri, Duration)> {
        let usable = self.usable();
        if usable == 0 {
            return None;
        }

        let remaining = self.context.budget().remaining();
        if remaining.is_zero() {
            return None;
        }

        let replica = self.replicas.next()?;
        let timeout = self.context.strategy().attempt_timeout(AttemptTimeoutArgs {
            remaining,
            remaining_replicas: usable,
        });
        self.launched = self.launched.saturating_add(1);

        Some((replica, timeout.min(remaining)))
    }

    fn finish(&self, results: Vec<ReplicaResult>, completion: Completion) -> ReplicaAttempts {
        ReplicaAttempts {
            results,
            launched: self.launched,
            completion,
        }
    }
}

/// Runs the strategy of `context` over `replicas`.
///
/// `launch` starts one attempt against a replica with the given timeout. The loop stops at the
/// first accepted result, when no attempt is in flight and no replica may be launched, when
/// the overall budget expires, or when the request is canceled. Attempts still in flight at
/// that point are dropped.
#[cfg_attr(test, mutants::skip)] // causes test timeout
pub(crate) async fn drive<F>(
    context: &RequestContext,
    clock: &Clock,
    replicas: Vec<Uri>,
    mut launch: impl FnMut(Uri, Duration) -> F + Send,
) -> ReplicaAttempts
where
    F: Future<Output = ReplicaResult> + Send,
{
    let strategy = context.strategy();
    let budget = context.budget();
    let mut candidates = Candidates {
        context,
        replicas: replicas.into_iter(),
        launched: 0,
    };
    let mut results = Vec::new();
    let mut pending = FuturesUnordered::new();

    if context.is_canceled() {
        return candidates.finish(results, Completion::Canceled);
    }

    if budget.has_expired() {
        return candidates.finish(results, Completion::DeadlineElapsed);
    }

    let mut cancelled = pin!(context.cancellation().cancelled());
    let mut deadline = pin!(clock.delay(budget.remaining()));

    for _ in 0..strategy.initial_parallelism().max(1) {
        match candidates.next() {
            Some((replica, timeout)) => pending.push(launch(replica, timeout)),
            None => break,
        }
    }

    loop {
        if budget.has_expired() {
            return candidates.finish(results, Completion::DeadlineElapsed);
        }

        if pending.is_empty() {
            match candidates.next() {
                Some((replica, timeout)) => pending.push(launch(replica, timeout)),
                None => return candidates.finish(results, Completion::Exhausted),
            }
        }

        let mut fork: Option<Delay> = if pending.len() < strategy.max_parallelism() && candidates.usable() > 0 {
            strategy
                .fork_delay(ForkDelayArgs {
                    in_flight: pending.len(),
                    launched: candidates.launched,
                    remaining: budget.remaining(),
                })
                .map(|delay| clock.delay(delay))
        } else {
            None
        };

        let event = poll_fn(|cx| {
            if cancelled.as_mut().poll(cx).is_ready() {
                return Poll::Ready(Event::Canceled);
            }

            if let Poll::Ready(Some(result)) = pending.poll_next_unpin(cx) {
                return Poll::Ready(Event::Completed(result));
            }

            if deadline.as_mut().poll(cx).is_ready() {
                return Poll::Ready(Event::DeadlineElapsed);
            }

            if let Some(fork) = fork.as_mut()
                && fork.poll_unpin(cx).is_ready()
            {
                return Poll::Ready(Event::Fork);
            }

            Poll::Pending
        })
        .await;

        match event {
            Event::Canceled => return candidates.finish(results, Completion::Canceled),
            Event::DeadlineElapsed => return candidates.finish(results, Completion::DeadlineElapsed),
            Event::Completed(result) => {
                let accepted = result.is_accepted();
                results.push(result);

                if accepted {
                    return candidates.finish(results, Completion::Accepted);
                }

                if pending.len() < strategy.max_parallelism()
                    && let Some((replica, timeout)) = candidates.next()
                {
                    pending.push(launch(replica, timeout));
                }
            }
            Event::Fork => {
                if let Some((replica, timeout)) = candidates.next() {
                    pending.push(launch(replica, timeout));
                }
            }
        }
    }
}
