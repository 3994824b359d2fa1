//! Structured logging emitted by batch flushes and listener failures.

use std::sync::{Arc, Mutex};

use ripple_core::change::SET;
use ripple_core::{Change, Value};
use ripple_runtime::{Batcher, Graph, Job, Observer};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

#[derive(Default)]
struct Captured {
    spans: Vec<String>,
    messages: Vec<(tracing::Level, String)>,
}

struct Capture {
    state: Arc<Mutex<Captured>>,
}

impl<S> Layer<S> for Capture
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        _id: &tracing::span::Id,
        _ctx: Context<'_, S>,
    ) {
        self.state
            .lock()
            .expect("capture lock")
            .spans
            .push(attrs.metadata().name().to_string());
    }

    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        struct Msg {
            message: Option<String>,
        }
        impl tracing::field::Visit for Msg {
            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                if field.name() == "message" {
                    self.message = Some(value.to_string());
                }
            }

            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.message = Some(format!("{value:?}").trim_matches('"').to_string());
                }
            }
        }
        let mut msg = Msg { message: None };
        event.record(&mut msg);
        if let Some(message) = msg.message {
            self.state
                .lock()
                .expect("capture lock")
                .messages
                .push((*event.metadata().level(), message));
        }
    }
}

fn capture() -> (Arc<Mutex<Captured>>, tracing::subscriber::DefaultGuard) {
    let state = Arc::new(Mutex::new(Captured::default()));
    let subscriber = tracing_subscriber::registry().with(Capture {
        state: Arc::clone(&state),
    });
    let guard = tracing::subscriber::set_default(subscriber);
    (state, guard)
}

#[test]
fn flush_opens_a_span_and_reports_counts() {
    let (state, _guard) = capture();
    let batcher: Batcher = Batcher::new();
    batcher.push(Job::new(|| {}));
    batcher.tick().run();

    let captured = state.lock().expect("capture lock");
    assert!(captured.spans.iter().any(|s| s == "batch.flush"));
    assert!(
        captured
            .messages
            .iter()
            .any(|(level, m)| *level == tracing::Level::DEBUG && m == "batch flushed")
    );
}

#[test]
fn oversized_flush_warns_once() {
    let (state, _guard) = capture();
    let batcher: Batcher = Batcher::new().with_threshold(2);
    for _ in 0..5 {
        batcher.push(Job::new(|| {}));
    }
    batcher.flush();

    let captured = state.lock().expect("capture lock");
    let warnings = captured
        .messages
        .iter()
        .filter(|(level, _)| *level == tracing::Level::WARN)
        .count();
    assert_eq!(warnings, 1);
}

#[test]
fn panicking_listener_is_logged_and_others_still_run() {
    let (state, _guard) = capture();
    let graph = Graph::new();
    let root = graph.new_object([("a", 1)]);
    let observer = Observer::new();
    graph.observe(&root, "", &observer);

    let reached = Arc::new(Mutex::new(false));
    observer.on(SET, |_: &Change| panic!("listener failure"));
    let r = Arc::clone(&reached);
    observer.on(SET, move |_| *r.lock().expect("flag lock") = true);

    let obj = graph.object(root.as_node().unwrap()).unwrap();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| obj.set("a", 2)));
    assert!(result.is_err(), "first panic is resumed on the caller");
    assert!(*reached.lock().expect("flag lock"));
    assert_eq!(obj.get("a"), Value::from(2));

    let captured = state.lock().expect("capture lock");
    assert!(
        captured
            .messages
            .iter()
            .any(|(level, _)| *level == tracing::Level::ERROR)
    );
}
