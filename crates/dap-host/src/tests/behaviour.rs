//! Behavioural tests for the in-process message pipeline.
//!
//! The pipeline under test is the framer feeding the router, which in turn
//! resolves pending requests or publishes notifications. No adapter process
//! is involved.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::error::TransportFault;
use crate::framing::{Framer, FramingError, encode};
use crate::notify::{Notification, Notifier};
use crate::pending::PendingRequests;
use crate::router::Router;

const EVENT_BODY: &[u8] = br#"{"type":"event","seq":2}"#;
const HEADER_LIMIT: usize = 64;

/// Test world for pipeline scenarios.
struct PipelineWorld {
    framer: Framer,
    router: Router,
    pending: Arc<PendingRequests>,
    notifications: Receiver<Notification>,
    /// Every notification published so far, in order.
    observed: Vec<Notification>,
    /// Successful resolutions per request sequence number.
    resolutions: Arc<Mutex<HashMap<i64, usize>>>,
}

impl PipelineWorld {
    fn new() -> Self {
        let pending = Arc::new(PendingRequests::new());
        let notifier = Arc::new(Notifier::new());
        let notifications = notifier.subscribe();
        Self {
            framer: Framer::with_max_header_bytes(HEADER_LIMIT),
            router: Router::new(Arc::clone(&pending), notifier),
            pending,
            notifications,
            observed: Vec::new(),
            resolutions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn feed(&mut self, bytes: &[u8]) {
        for frame in self.framer.feed(bytes) {
            self.router.route_frame(frame);
        }
        self.observed.extend(self.notifications.try_iter());
    }

    fn resolved(&self, seq: i64) -> usize {
        self.resolutions
            .lock()
            .expect("resolution log poisoned")
            .get(&seq)
            .copied()
            .unwrap_or_default()
    }

    fn events_with_seq(&self, seq: i64) -> usize {
        self.observed
            .iter()
            .filter(|notification| matches!(notification, Notification::Event(event) if event.seq == seq))
            .count()
    }
}

#[fixture]
fn world() -> RefCell<PipelineWorld> {
    RefCell::new(PipelineWorld::new())
}

fn assert_events(world: &RefCell<PipelineWorld>, count: usize, seq: i64) {
    let borrow = world.borrow();
    assert_eq!(
        borrow.events_with_seq(seq),
        count,
        "unexpected events in {:?}",
        borrow.observed
    );
    assert_eq!(borrow.observed.len(), count, "only events were expected");
}

// --- Given steps ---

#[given("a fresh message pipeline")]
fn given_fresh_pipeline(world: &RefCell<PipelineWorld>) {
    *world.borrow_mut() = PipelineWorld::new();
}

#[given("a pending request with sequence {seq}")]
fn given_pending_request(world: &RefCell<PipelineWorld>, seq: i64) {
    let borrow = world.borrow();
    let resolutions = Arc::clone(&borrow.resolutions);
    borrow
        .pending
        .register(
            seq,
            Box::new(move |outcome| {
                if outcome.is_ok() {
                    *resolutions
                        .lock()
                        .expect("resolution log poisoned")
                        .entry(seq)
                        .or_default() += 1;
                }
            }),
        )
        .expect("registration failed");
}

// --- When steps ---

#[when("a complete event message arrives in one chunk")]
fn when_complete_message(world: &RefCell<PipelineWorld>) {
    world.borrow_mut().feed(&encode(EVENT_BODY));
}

#[when("an event message arrives with its header missing the final line break")]
fn when_header_split(world: &RefCell<PipelineWorld>) {
    world.borrow_mut().feed(b"Content-Length: 24\r\n\r");
}

#[when("the final line break and the event body arrive")]
fn when_split_remainder(world: &RefCell<PipelineWorld>) {
    let remainder = [b"\n".as_slice(), EVENT_BODY].concat();
    world.borrow_mut().feed(&remainder);
}

#[when("two complete event messages arrive in one chunk")]
fn when_pipelined_messages(world: &RefCell<PipelineWorld>) {
    let chunk = [encode(EVENT_BODY), encode(EVENT_BODY)].concat();
    world.borrow_mut().feed(&chunk);
}

#[when("a response for request sequence {seq} arrives")]
fn when_response_arrives(world: &RefCell<PipelineWorld>, seq: i64) {
    let body = format!(
        r#"{{"type":"response","seq":40,"request_seq":{seq},"success":true,"command":"threads"}}"#
    );
    world.borrow_mut().feed(&encode(body.as_bytes()));
}

#[when("a header larger than the limit arrives")]
fn when_oversized_header(world: &RefCell<PipelineWorld>) {
    let header = format!("X-Padding: {}\r\n", "a".repeat(HEADER_LIMIT));
    world.borrow_mut().feed(header.as_bytes());
}

// --- Then steps ---

#[then("{count} event with sequence {seq} has been published")]
fn then_one_event(world: &RefCell<PipelineWorld>, count: usize, seq: i64) {
    assert_events(world, count, seq);
}

#[then("{count} events with sequence {seq} have been published")]
fn then_many_events(world: &RefCell<PipelineWorld>, count: usize, seq: i64) {
    assert_events(world, count, seq);
}

#[then("no notification has been published")]
fn then_nothing_published(world: &RefCell<PipelineWorld>) {
    let borrow = world.borrow();
    assert!(
        borrow.observed.is_empty(),
        "expected silence, got {:?}",
        borrow.observed
    );
}

#[then("the pending request {seq} has not been resolved")]
fn then_not_resolved(world: &RefCell<PipelineWorld>, seq: i64) {
    let borrow = world.borrow();
    assert_eq!(borrow.resolved(seq), 0);
    assert!(borrow.pending.contains(seq), "entry {seq} should remain");
}

#[then("the pending request {seq} has been resolved once")]
fn then_resolved_once(world: &RefCell<PipelineWorld>, seq: i64) {
    let borrow = world.borrow();
    assert_eq!(borrow.resolved(seq), 1);
    assert!(!borrow.pending.contains(seq), "entry {seq} should be gone");
}

#[then("a framing fault has been published")]
fn then_framing_fault(world: &RefCell<PipelineWorld>) {
    let borrow = world.borrow();
    let expected = Notification::Error(TransportFault::Framing(FramingError::HeaderTooLarge {
        limit: HEADER_LIMIT,
    }));
    assert_eq!(borrow.observed, vec![expected]);
    assert_eq!(borrow.framer.buffered_len(), 0);
}

#[then("the pipeline still routes a subsequent event")]
fn then_still_routes(world: &RefCell<PipelineWorld>) {
    let mut borrow = world.borrow_mut();
    let before = borrow.events_with_seq(2);
    borrow.feed(&encode(EVENT_BODY));
    assert_eq!(borrow.events_with_seq(2), before + 1);
}

// --- Scenario bindings ---

#[scenario(
    path = "tests/features/message_pipeline.feature",
    name = "A complete message in one chunk"
)]
fn complete_message(world: RefCell<PipelineWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/message_pipeline.feature",
    name = "A header split before its final line break"
)]
fn header_split_before_final_line_break(world: RefCell<PipelineWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/message_pipeline.feature",
    name = "Two messages pipelined in one chunk"
)]
fn pipelined_messages(world: RefCell<PipelineWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/message_pipeline.feature",
    name = "A response nobody is waiting for"
)]
fn unmatched_response(world: RefCell<PipelineWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/message_pipeline.feature",
    name = "A response resolves its request exactly once"
)]
fn response_resolves_once(world: RefCell<PipelineWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/message_pipeline.feature",
    name = "An oversized header is discarded"
)]
fn oversized_header(world: RefCell<PipelineWorld>) {
    let _ = world;
}
