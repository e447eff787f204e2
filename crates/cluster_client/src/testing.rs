// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use http::Uri;
use tick::Clock;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, SubscriberExt};

use crate::context::RequestContext;
use crate::model::{Request, Response};
use crate::strategy::ReplicaStrategy;
use crate::time_budget::TimeBudget;
use crate::transport::Transport;

/// Captures formatted log output and the level of every emitted event.
#[derive(Debug, Clone, Default)]
pub(crate) struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    levels: Arc<Mutex<Vec<Level>>>,
}

impl LogCapture {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn output(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).to_string()
    }

    pub(crate) fn assert_contains(&self, expected: &str) {
        let output = self.output();
        assert!(
            output.contains(expected),
            "log output does not contain '{expected}', got:\n{output}"
        );
    }

    /// Levels of all captured events, in emission order.
    pub(crate) fn levels(&self) -> Vec<Level> {
        self.levels.lock().unwrap().clone()
    }

    /// Use with `set_default()` for thread-local capture.
    pub(crate) fn subscriber(&self) -> impl Subscriber + Send + Sync {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(self.clone()).with_ansi(false))
            .with(LevelRecorder {
                levels: Arc::clone(&self.levels),
            })
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogCaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

pub(crate) struct LogCaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for LogCaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

struct LevelRecorder {
    levels: Arc<Mutex<Vec<Level>>>,
}

impl<S: Subscriber> Layer<S> for LevelRecorder {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.levels.lock().unwrap().push(*event.metadata().level());
    }
}

/// Transport answering each replica according to a script keyed by replica index.
///
/// Replicas are expected to be named like the ones returned by [`replicas`]. The scripted
/// delay is measured by the clock; `Duration::MAX` never answers.
pub(crate) struct ScriptedTransport {
    clock: Clock,
    script: Box<dyn Fn(usize) -> (Duration, Response) + Send + Sync>,
    calls: Mutex<Vec<Uri>>,
}

impl ScriptedTransport {
    pub(crate) fn new(clock: &Clock, script: impl Fn(usize) -> (Duration, Response) + Send + Sync + 'static) -> Self {
        Self {
            clock: clock.clone(),
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn called_replicas(&self) -> Vec<usize> {
        self.calls.lock().unwrap().iter().map(replica_index).collect()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, replica: &Uri, _request: &Request, _timeout: Duration) -> impl Future<Output = Response> + Send {
        self.calls.lock().unwrap().push(replica.clone());
        let (delay, response) = (self.script)(replica_index(replica));

        self.clock.delay(delay).map(move |()| response)
    }
}

pub(crate) fn replicas(count: usize) -> Vec<Uri> {
    (0..count)
        .map(|i| Uri::try_from(format!("http://replica-{i}:80")).unwrap())
        .collect()
}

pub(crate) fn replica_index(replica: &Uri) -> usize {
    replica
        .host()
        .and_then(|host| host.strip_prefix("replica-"))
        .and_then(|index| index.parse().ok())
        .unwrap()
}

pub(crate) fn context(clock: &Clock, strategy: impl ReplicaStrategy + 'static, total: Duration) -> RequestContext {
    RequestContext::new(
        Request::get(Uri::from_static("/billing/process?p1=p")),
        Arc::new(strategy),
        TimeBudget::start(clock, total),
    )
}
