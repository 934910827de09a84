//! Shared test utilities: a scripted transport double, a warning counter,
//! and arbitrary generators for property-based testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use proptest::prelude::*;
use serde_json::{Value, json};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use crate::config::ClientConfig;
use crate::github::{Connector, RATE_LIMIT_QUERY, RawFailure, Transport};
use crate::types::Operation;

// ─── Scripted Transport ───────────────────────────────────────────────────────

/// What the scripted transport does with one request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Succeed with this `data` value.
    Data(Value),
    /// Fail with this raw failure.
    Fail(RawFailure),
    /// Never complete.
    Hang,
    /// Sleep, then behave like the inner reply.
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub fn data(value: Value) -> Self {
        Reply::Data(value)
    }

    pub fn fail(failure: RawFailure) -> Self {
        Reply::Fail(failure)
    }

    pub fn fail_protocol(message: &str, status_code: Option<u16>) -> Self {
        Reply::Fail(RawFailure::protocol(message, status_code))
    }

    pub fn delayed(delay: Duration, reply: Reply) -> Self {
        Reply::Delayed(delay, Box::new(reply))
    }

    /// A probe response with a limit of 5000 and a window resetting
    /// `reset_in_secs` from now (negative means already reset).
    pub fn rate_limit(remaining: u64, reset_in_secs: i64) -> Self {
        let reset_at = Utc::now() + chrono::Duration::seconds(reset_in_secs);
        Reply::Data(json!({
            "rateLimit": {
                "limit": 5000,
                "remaining": remaining,
                "resetAt": reset_at.to_rfc3339(),
                "cost": 1
            }
        }))
    }

    async fn resolve(self) -> Result<Value, RawFailure> {
        let mut reply = self;
        loop {
            match reply {
                Reply::Data(value) => return Ok(value),
                Reply::Fail(failure) => return Err(failure),
                Reply::Hang => return std::future::pending().await,
                Reply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }
}

type Handler = dyn Fn(&Operation) -> Reply + Send + Sync;

#[derive(Default)]
struct Script {
    replies: Mutex<VecDeque<Reply>>,
    probe_replies: Mutex<VecDeque<Reply>>,
    handler: Option<Box<Handler>>,
    sent: Mutex<Vec<Operation>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    probes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fail_close: AtomicBool,
}

impl Script {
    fn next_reply(&self, operation: &Operation) -> Reply {
        if operation.document == RATE_LIMIT_QUERY {
            self.probes.fetch_add(1, Ordering::SeqCst);
            return self
                .probe_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Reply::rate_limit(4999, 3600));
        }

        self.sent.lock().unwrap().push(operation.clone());
        if let Some(handler) = &self.handler {
            return handler(operation);
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::fail_protocol("no scripted reply left", None))
    }
}

/// Tracks one request in flight.
struct InFlight<'a>(&'a Script);

impl<'a> InFlight<'a> {
    fn enter(script: &'a Script) -> Self {
        let now = script.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        script.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(script)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A connector whose transports answer from a script.
///
/// Ordinary requests take replies from a queue (or a handler, if one was
/// given); rate-limit probes take them from a separate queue and default to
/// a healthy window. Clones share the script and the counters.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<Script>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every ordinary request by calling `handler`.
    pub fn with_handler(handler: impl Fn(&Operation) -> Reply + Send + Sync + 'static) -> Self {
        ScriptedConnector {
            script: Arc::new(Script {
                handler: Some(Box::new(handler)),
                ..Script::default()
            }),
        }
    }

    /// Makes every transport's `close` fail.
    pub fn failing_close(self) -> Self {
        self.script.fail_close.store(true, Ordering::SeqCst);
        self
    }

    pub fn push(&self, reply: Reply) {
        self.script.replies.lock().unwrap().push_back(reply);
    }

    pub fn push_probe(&self, reply: Reply) {
        self.script.probe_replies.lock().unwrap().push_back(reply);
    }

    /// Ordinary (non-probe) operations received, in order.
    pub fn sent(&self) -> Vec<Operation> {
        self.script.sent.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.script.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.script.closes.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.script.probes.load(Ordering::SeqCst)
    }

    /// Highest number of requests observed executing at once.
    pub fn max_in_flight(&self) -> usize {
        self.script.max_in_flight.load(Ordering::SeqCst)
    }
}

pub struct ScriptedTransport {
    script: Arc<Script>,
}

impl Transport for ScriptedTransport {
    async fn execute(&self, operation: &Operation) -> Result<Value, RawFailure> {
        let reply = self.script.next_reply(operation);
        let _in_flight = InFlight::enter(&self.script);
        reply.resolve().await
    }

    async fn close(&self) -> Result<(), RawFailure> {
        self.script.closes.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_close.load(Ordering::SeqCst) {
            return Err(RawFailure::transport("close failed", "scripted"));
        }
        Ok(())
    }
}

impl Connector for ScriptedConnector {
    type Transport = ScriptedTransport;

    async fn connect(&self, _config: &ClientConfig) -> Result<ScriptedTransport, RawFailure> {
        self.script.connects.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedTransport {
            script: Arc::clone(&self.script),
        })
    }
}

// ─── Log Capture ──────────────────────────────────────────────────────────────

struct WarningCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for WarningCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Runs `f` with a thread-local subscriber and returns its result together
/// with the number of `WARN` events it emitted.
pub fn count_warnings<T>(f: impl FnOnce() -> T) -> (T, usize) {
    let counter = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(WarningCounter(Arc::clone(&counter)));
    let value = tracing::subscriber::with_default(subscriber, f);
    (value, counter.load(Ordering::SeqCst))
}

// ─── Generators ───────────────────────────────────────────────────────────────

pub fn arb_status_code() -> impl Strategy<Value = Option<u16>> {
    prop_oneof![Just(None), (100u16..600).prop_map(Some)]
}

pub fn arb_raw_failure() -> impl Strategy<Value = RawFailure> {
    prop_oneof![
        (".*", arb_status_code()).prop_map(|(m, s)| RawFailure::protocol(m, s)),
        (".*", prop::collection::vec(".*", 0..4)).prop_map(|(m, c)| RawFailure::Transport {
            message: m,
            origin: "arb",
            context: c,
        }),
        prop::collection::vec(".*", 0..4).prop_map(RawFailure::timed_out),
        Just(RawFailure::Cancelled),
    ]
}
