//! End-to-end session tests against a fake development host on a localhost
//! listener: discovery, the reload ordering contract, and lifecycle edges.

use hotline_core::protocol::{kind, read_frame, write_frame};
use hotline_core::{
    CandidateSource, Diagnostic, Endpoint, Envelope, EvalRequest, EvalResult, Evaluator,
    HotlineError, ImplementationHandle, ReloadSink, Replacement, ResetPayload, Result, Session,
    SessionState, Severity,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// Sink that records every notification as a readable string.
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<String> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn push(&self, event: String) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[async_trait::async_trait]
impl ReloadSink for RecordingSink {
    async fn begin_reload(&self) {
        self.push("begin".to_string());
    }

    async fn replace_component(&self, component: &str, handle: ImplementationHandle) {
        let implementation = handle
            .downcast_ref::<String>()
            .cloned()
            .unwrap_or_default();
        self.push(format!("replace:{component}={implementation}"));
    }

    async fn end_reload(&self) {
        self.push("end".to_string());
    }

    async fn diagnostic(&self, diagnostic: Diagnostic) {
        self.push(format!("diag:{}", diagnostic.text));
    }
}

/// Evaluator scripted through the request code:
/// `replace:X,Y` applies those components, `diag:a,b` reports diagnostics,
/// `fault` is a hard evaluator failure.
struct ScriptedEvaluator {
    delay: Duration,
}

impl ScriptedEvaluator {
    fn instant() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }
}

#[async_trait::async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn evaluate(&self, request: &EvalRequest) -> Result<EvalResult> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match request.code.split_once(':') {
            Some(("replace", names)) => Ok(EvalResult::replaced(
                names
                    .split(',')
                    .map(|name| {
                        Replacement::new(name, ImplementationHandle::new(format!("impl-{name}")))
                    })
                    .collect(),
            )),
            Some(("diag", texts)) => Ok(EvalResult::diagnosed(
                texts
                    .split(',')
                    .map(|text| Diagnostic::new(text, Severity::Error))
                    .collect(),
            )),
            _ => Err(HotlineError::Evaluation {
                message: format!("scripted fault for {:?}", request.code),
            }),
        }
    }
}

struct Fixture {
    session: Session,
    sink: Arc<RecordingSink>,
    listener: TcpListener,
    endpoint: Endpoint,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

async fn fixture_with(evaluator: ScriptedEvaluator) -> Fixture {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = Endpoint::new("127.0.0.1", listener.local_addr().unwrap().port());
    let sink = Arc::new(RecordingSink::default());
    let session = Session::new(
        CandidateSource::empty(),
        Arc::new(evaluator),
        sink.clone(),
    );
    Fixture {
        session,
        sink,
        listener,
        endpoint,
    }
}

async fn fixture() -> Fixture {
    fixture_with(ScriptedEvaluator::instant()).await
}

/// Bind the session and accept the host side of the connection.
async fn bind(fixture: &mut Fixture) -> TcpStream {
    fixture
        .session
        .initialize(Some(fixture.endpoint.clone()))
        .await
        .unwrap();
    let (peer, _) = fixture.listener.accept().await.unwrap();
    peer
}

async fn send_eval(peer: &mut TcpStream, code: &str) {
    let envelope = Envelope::new(
        kind::EVAL_REQUEST,
        &EvalRequest {
            code: code.to_string(),
            file_name: Some("view.src".to_string()),
            context: None,
        },
    )
    .unwrap();
    write_frame(peer, &envelope.encode().unwrap()).await.unwrap();
}

/// Poll until the sink holds `count` events (or time out).
async fn wait_for_events(sink: &RecordingSink, count: usize) -> Vec<String> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let events = sink.events();
        if events.len() >= count {
            return events;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {count} events, have {events:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_reload_ordering_contract() {
    let mut fixture = fixture().await;
    let mut peer = bind(&mut fixture).await;
    assert_eq!(fixture.session.state(), SessionState::Bound);

    send_eval(&mut peer, "replace:X,Y").await;

    let events = wait_for_events(&fixture.sink, 4).await;
    assert_eq!(
        events,
        vec!["begin", "replace:X=impl-X", "replace:Y=impl-Y", "end"]
    );
}

#[tokio::test]
async fn test_no_reload_path_surfaces_each_diagnostic_once_in_order() {
    let mut fixture = fixture().await;
    let mut peer = bind(&mut fixture).await;

    send_eval(&mut peer, "diag:cannot parse,unknown symbol").await;

    let events = wait_for_events(&fixture.sink, 2).await;
    assert_eq!(events, vec!["diag:cannot parse", "diag:unknown symbol"]);
    assert!(!events.iter().any(|e| e == "begin" || e == "end"));
}

#[tokio::test]
async fn test_back_to_back_requests_yield_non_interleaved_cycles() {
    let mut fixture = fixture_with(ScriptedEvaluator {
        delay: Duration::from_millis(50),
    })
    .await;
    let mut peer = bind(&mut fixture).await;

    send_eval(&mut peer, "replace:A").await;
    send_eval(&mut peer, "replace:B").await;

    let events = wait_for_events(&fixture.sink, 6).await;
    assert_eq!(
        events,
        vec![
            "begin",
            "replace:A=impl-A",
            "end",
            "begin",
            "replace:B=impl-B",
            "end",
        ]
    );
}

#[tokio::test]
async fn test_unknown_kind_is_ignored_and_channel_keeps_working() {
    let mut fixture = fixture().await;
    let mut peer = bind(&mut fixture).await;

    let unknown = Envelope {
        kind: "SomethingFromTheFuture".to_string(),
        body: serde_json::json!({"Payload": true}),
    };
    write_frame(&mut peer, &unknown.encode().unwrap())
        .await
        .unwrap();
    send_eval(&mut peer, "replace:X").await;

    let events = wait_for_events(&fixture.sink, 3).await;
    assert_eq!(events, vec!["begin", "replace:X=impl-X", "end"]);
}

#[tokio::test]
async fn test_evaluator_fault_leaves_session_usable() {
    let mut fixture = fixture().await;
    let mut peer = bind(&mut fixture).await;

    send_eval(&mut peer, "fault").await;
    send_eval(&mut peer, "replace:X").await;

    let events = wait_for_events(&fixture.sink, 3).await;
    assert_eq!(events, vec!["begin", "replace:X=impl-X", "end"]);
    assert_eq!(fixture.session.state(), SessionState::Bound);
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let mut fixture = fixture().await;
    let _peer = bind(&mut fixture).await;

    // Second call: immediate success, no new connection attempt.
    fixture
        .session
        .initialize(Some(fixture.endpoint.clone()))
        .await
        .unwrap();

    let second_accept = tokio::time::timeout(
        Duration::from_millis(200),
        fixture.listener.accept(),
    )
    .await;
    assert!(second_accept.is_err(), "idempotent initialize must not reconnect");
}

#[tokio::test]
async fn test_discovery_failure_is_reported_and_retriable() {
    let mut fixture = fixture().await;

    // No candidates at all.
    let result = fixture.session.initialize(None).await;
    assert!(matches!(
        result,
        Err(HotlineError::Discovery { attempted: 0 })
    ));
    assert_eq!(fixture.session.state(), SessionState::Uninitialized);

    // Retry with an explicit override succeeds.
    let _peer = bind(&mut fixture).await;
    assert_eq!(fixture.session.state(), SessionState::Bound);
}

#[tokio::test]
async fn test_discovery_prefers_earliest_listed_candidate() {
    // Unreachable first candidate, then the fixture listener.
    let gone = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let unreachable = Endpoint::new("127.0.0.1", gone.local_addr().unwrap().port());
    drop(gone);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let resource = format!("{unreachable}\n127.0.0.1:{port}\n");

    let sink = Arc::new(RecordingSink::default());
    let mut session = Session::new(
        CandidateSource::from_resource_text(resource),
        Arc::new(ScriptedEvaluator::instant()),
        sink,
    );

    session.initialize(None).await.unwrap();
    assert_eq!(
        session.connected_endpoint(),
        Some(&Endpoint::new("127.0.0.1", port))
    );
}

#[tokio::test]
async fn test_request_reset_reaches_host() {
    let mut fixture = fixture().await;
    let mut peer = bind(&mut fixture).await;

    fixture.session.request_reset().await.unwrap();

    let payload = read_frame(&mut peer).await.unwrap().unwrap();
    let envelope = Envelope::decode(&payload).unwrap();
    assert_eq!(envelope.kind, kind::RESET);
    let _body: ResetPayload = envelope.body_as().unwrap();
}

#[tokio::test]
async fn test_error_message_surfaces_as_diagnostic() {
    let mut fixture = fixture().await;
    let mut peer = bind(&mut fixture).await;

    let envelope = Envelope {
        kind: kind::ERROR.to_string(),
        body: serde_json::json!({"Title": "Exception", "Error": "stack trace"}),
    };
    write_frame(&mut peer, &envelope.encode().unwrap())
        .await
        .unwrap();

    let events = wait_for_events(&fixture.sink, 1).await;
    assert_eq!(events, vec!["diag:Exception: stack trace"]);
    assert_eq!(fixture.session.state(), SessionState::Bound);
}

#[tokio::test]
async fn test_shutdown_terminates_session() {
    let mut fixture = fixture().await;
    let _peer = bind(&mut fixture).await;

    fixture.session.shutdown().await;
    assert_eq!(fixture.session.state(), SessionState::Terminated);

    let result = fixture.session.request_reset().await;
    assert!(matches!(result, Err(HotlineError::NotBound)));
}

#[tokio::test]
async fn test_reset_before_initialize_is_not_bound() {
    let fixture = fixture().await;
    assert!(matches!(
        fixture.session.request_reset().await,
        Err(HotlineError::NotBound)
    ));
}
