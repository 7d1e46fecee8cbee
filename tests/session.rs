use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

use iq_workbench::client::RelayClient;
use iq_workbench::domains::agent::AgentReference;
use iq_workbench::domains::message::{ChatRequest, Role};
use iq_workbench::error::{Result, WorkbenchError};
use iq_workbench::interfaces::agent_stream::AgentStream;
use iq_workbench::interfaces::transport::ChatTransport;
use iq_workbench::relay::{self, AppState};
use iq_workbench::session::{run_turn, SessionController, TurnOutcome, CANCELLED_BEFORE_RESPONSE};
use iq_workbench::turn_fsm::TurnPhase;

/// Serves a fixed list of byte chunks, or fails to open.
struct ScriptedTransport {
    chunks: Vec<std::result::Result<&'static [u8], &'static str>>,
    open_error: Option<&'static str>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    fn chunks(chunks: Vec<std::result::Result<&'static [u8], &'static str>>) -> Self {
        Self {
            chunks,
            open_error: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn failing(error: &'static str) -> Self {
        Self {
            chunks: Vec::new(),
            open_error: Some(error),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn opened(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn open(&self, request: ChatRequest) -> Result<BoxStream<'static, Result<Bytes>>> {
        self.requests.lock().unwrap().push(request);
        if let Some(error) = self.open_error {
            return Err(WorkbenchError::Http(error.to_string()));
        }
        let items: Vec<Result<Bytes>> = self
            .chunks
            .iter()
            .map(|chunk| {
                (*chunk)
                    .map(Bytes::from_static)
                    .map_err(|e| WorkbenchError::Http(e.to_string()))
            })
            .collect();
        Ok(stream::iter(items).boxed())
    }
}

fn chunk(bytes: &'static [u8]) -> std::result::Result<&'static [u8], &'static str> {
    Ok(bytes)
}

/// Streams whatever the test pushes into the channel; stays open until the
/// sender is dropped.
struct ChannelTransport {
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Bytes>>>,
}

#[async_trait]
impl ChatTransport for ChannelTransport {
    async fn open(&self, _request: ChatRequest) -> Result<BoxStream<'static, Result<Bytes>>> {
        let receiver = self
            .receiver
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| WorkbenchError::Runtime("already opened".to_string()))?;
        Ok(stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|bytes| (Ok(bytes), receiver))
        })
        .boxed())
    }
}

struct EchoAgent;

impl AgentStream for EchoAgent {
    fn stream_prompt(
        &self,
        _agent: &AgentReference,
        prompt: &str,
    ) -> BoxStream<'static, Result<String>> {
        let items = vec![
            Ok("You said: ".to_string()),
            Ok(prompt.to_string()),
            Ok(" ✓".to_string()),
        ];
        stream::iter(items).boxed()
    }
}

#[tokio::test]
async fn completed_turn_concatenates_chunks_in_order() {
    let transport = ScriptedTransport::chunks(vec![chunk(b"Hello"), chunk(b", "), chunk(b"world")]);
    let mut session = SessionController::new();
    let updates = AtomicUsize::new(0);

    let outcome = run_turn(&mut session, &transport, "hi", std::future::pending(), |_| {
        updates.fetch_add(1, Ordering::SeqCst);
    })
    .await;

    assert_eq!(outcome, TurnOutcome::Completed);
    assert_eq!(session.phase(), TurnPhase::Idle);
    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[1].content, "Hello, world");
    // submit + three chunks + completion
    assert_eq!(updates.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn multibyte_characters_split_across_chunks_survive() {
    let transport = ScriptedTransport::chunks(vec![chunk(b"caf\xc3"), chunk(b"\xa9 "), chunk(b"ok")]);
    let mut session = SessionController::new();

    let outcome = run_turn(&mut session, &transport, "hi", std::future::pending(), |_| {}).await;

    assert_eq!(outcome, TurnOutcome::Completed);
    assert_eq!(session.messages()[1].content, "café ok");
}

#[tokio::test]
async fn blank_text_is_rejected_without_a_request() {
    let transport = ScriptedTransport::chunks(vec![chunk(b"unused")]);
    let mut session = SessionController::new();

    let outcome = run_turn(&mut session, &transport, "   ", std::future::pending(), |_| {}).await;

    assert_eq!(outcome, TurnOutcome::Rejected);
    assert!(session.messages().is_empty());
    assert_eq!(transport.opened(), 0);
}

#[tokio::test]
async fn open_failure_sets_error_and_session_stays_usable() {
    let transport = ScriptedTransport::failing("Request failed (500): Internal server error");
    let mut session = SessionController::new();

    let outcome = run_turn(&mut session, &transport, "hi", std::future::pending(), |_| {}).await;

    match outcome {
        TurnOutcome::Failed(message) => assert!(message.contains("Internal server error")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(session.error().unwrap().contains("Internal server error"));
    assert_eq!(session.phase(), TurnPhase::Idle);
    assert_eq!(session.messages().len(), 1);

    let transport = ScriptedTransport::chunks(vec![chunk(b"recovered")]);
    let outcome = run_turn(&mut session, &transport, "again", std::future::pending(), |_| {}).await;
    assert_eq!(outcome, TurnOutcome::Completed);
    assert!(session.error().is_none());
    assert_eq!(session.messages().last().unwrap().content, "recovered");
}

#[tokio::test]
async fn mid_stream_failure_keeps_partial_content() {
    let transport =
        ScriptedTransport::chunks(vec![chunk(b"half an "), chunk(b"answer"), Err("connection reset")]);
    let mut session = SessionController::new();

    let outcome = run_turn(&mut session, &transport, "hi", std::future::pending(), |_| {}).await;

    assert!(matches!(outcome, TurnOutcome::Failed(_)));
    assert_eq!(session.messages()[1].content, "half an answer");
    assert!(session.error().unwrap().contains("connection reset"));
}

#[tokio::test]
async fn cancel_while_streaming_keeps_received_text() {
    let (sender, receiver) = mpsc::unbounded_channel();
    sender.send(Bytes::from_static(b"par")).unwrap();
    sender.send(Bytes::from_static(b"tial")).unwrap();
    let transport = ChannelTransport {
        receiver: Mutex::new(Some(receiver)),
    };
    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let mut cancel_tx = Some(cancel_tx);
    let cancel = async move {
        let _ = cancel_rx.await;
    };

    let mut session = SessionController::new();
    let outcome = run_turn(&mut session, &transport, "hi", cancel, |session| {
        let received = session
            .messages()
            .last()
            .filter(|message| message.role == Role::Assistant)
            .map(|message| message.content.as_str());
        if received == Some("partial") {
            if let Some(tx) = cancel_tx.take() {
                let _ = tx.send(());
            }
        }
    })
    .await;

    assert_eq!(outcome, TurnOutcome::Cancelled);
    assert_eq!(session.phase(), TurnPhase::Idle);
    assert_eq!(session.messages()[1].content, "partial");
    assert!(session.error().is_none());
    drop(sender);
}

#[tokio::test]
async fn cancel_before_first_chunk_is_reported_as_failure() {
    let (_sender, receiver) = mpsc::unbounded_channel();
    let transport = ChannelTransport {
        receiver: Mutex::new(Some(receiver)),
    };
    let mut session = SessionController::new();

    let outcome = run_turn(&mut session, &transport, "hi", async {}, |_| {}).await;

    assert_eq!(
        outcome,
        TurnOutcome::Failed(CANCELLED_BEFORE_RESPONSE.to_string())
    );
    assert_eq!(session.error(), Some(CANCELLED_BEFORE_RESPONSE));
    assert_eq!(session.messages().len(), 1);
    assert_eq!(session.phase(), TurnPhase::Idle);
}

async fn spawn_relay(state: AppState) -> (String, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    tokio::spawn(relay::serve(listener, state, async move {
        let _ = stop_rx.await;
    }));
    (format!("http://{addr}"), stop_tx)
}

#[tokio::test]
async fn session_streams_through_a_live_relay() {
    let state = AppState::new(
        Some(Arc::new(EchoAgent) as Arc<dyn AgentStream>),
        AgentReference::new("agent-live"),
    );
    let (url, stop) = spawn_relay(state).await;
    let client = RelayClient::new(&url);
    let mut session = SessionController::new();

    let outcome = run_turn(&mut session, &client, "first", std::future::pending(), |_| {}).await;
    assert_eq!(outcome, TurnOutcome::Completed);
    assert_eq!(session.messages()[1].content, "You said: first ✓");

    // Only the newest prompt reaches the agent even though history is sent.
    let outcome = run_turn(&mut session, &client, "second", std::future::pending(), |_| {}).await;
    assert_eq!(outcome, TurnOutcome::Completed);
    assert_eq!(session.messages()[3].content, "You said: second ✓");

    let _ = stop.send(());
}

#[tokio::test]
async fn unconfigured_relay_error_reaches_the_session() {
    let (url, stop) = spawn_relay(AppState::default()).await;
    let client = RelayClient::new(&url);
    let mut session = SessionController::new();

    let outcome = run_turn(&mut session, &client, "hi", std::future::pending(), |_| {}).await;

    assert!(matches!(outcome, TurnOutcome::Failed(_)));
    let error = session.error().unwrap();
    assert!(error.contains("500"));
    assert!(error.contains("Agent not configured"));
    assert_eq!(session.messages().len(), 1);

    let _ = stop.send(());
}
