use std::future::Future;

use futures::StreamExt;
use tracing::{debug, warn};

use crate::domains::message::{now_unix_ts, ChatRequest, Message, Role, WireMessage};
use crate::interfaces::transport::ChatTransport;
use crate::render::view::{render_conversation, ConversationView};
use crate::turn_fsm::{transition, TurnEvent, TurnPhase};

pub const CANCELLED_BEFORE_RESPONSE: &str = "Request cancelled before the agent responded";

/// Prompts offered while the conversation is empty.
pub const SUGGESTIONS: [&str; 4] = [
    "What are the advantages of using Rust for web services?",
    "Write code to demonstrate dijkstra's algorithm",
    "Help me write an essay about silicon valley",
    "What is the weather in San Francisco?",
];

/// Owns one conversation and the lifecycle of its in-flight turn.
///
/// Every mutation goes through `&mut self`, so the growing assistant buffer
/// has exactly one writer; renderers work from [`SessionController::view`]
/// or [`SessionController::snapshot`], which copy.
#[derive(Debug, Default)]
pub struct SessionController {
    conversation: Vec<Message>,
    input: String,
    error: Option<String>,
    phase: TurnPhase,
    pending: Option<usize>,
    next_id: u64,
}

impl SessionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase.in_flight()
    }

    pub fn messages(&self) -> &[Message] {
        &self.conversation
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Starts a turn. Returns the request to send, or `None` when the text is
    /// blank or a turn is already in flight (nothing changes in that case).
    pub fn submit(&mut self, text: &str) -> Option<ChatRequest> {
        if text.trim().is_empty() {
            return None;
        }
        let next = transition(self.phase, TurnEvent::Submit)?;
        self.phase = next;
        self.error = None;
        self.pending = None;
        let message = self.new_message(Role::User, text);
        self.conversation.push(message);
        Some(self.request())
    }

    /// Submits the input buffer, clearing it only if the submit was accepted.
    pub fn submit_input(&mut self) -> Option<ChatRequest> {
        let text = self.input.clone();
        let request = self.submit(&text)?;
        self.input.clear();
        Some(request)
    }

    pub fn suggestions(&self) -> &'static [&'static str] {
        if self.conversation.is_empty() && !self.is_loading() {
            &SUGGESTIONS
        } else {
            &[]
        }
    }

    pub fn submit_suggestion(&mut self, index: usize) -> Option<ChatRequest> {
        let text = *self.suggestions().get(index)?;
        self.submit(text)
    }

    /// Appends a fragment to the in-flight assistant message, creating it on
    /// the first fragment. Returns whether anything changed.
    pub fn receive_chunk(&mut self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        match self.phase {
            TurnPhase::Submitting => {
                let Some(next) = transition(self.phase, TurnEvent::FirstChunk) else {
                    return false;
                };
                self.phase = next;
                let message = self.new_message(Role::Assistant, "");
                self.conversation.push(message);
                self.pending = Some(self.conversation.len() - 1);
            }
            TurnPhase::Streaming => {
                let Some(next) = transition(self.phase, TurnEvent::Chunk) else {
                    return false;
                };
                self.phase = next;
            }
            TurnPhase::Idle => return false,
        }
        match self.pending.and_then(|index| self.conversation.get_mut(index)) {
            Some(message) => {
                message.content.push_str(text);
                true
            }
            None => false,
        }
    }

    pub fn complete(&mut self) -> bool {
        self.finish(TurnEvent::Complete)
    }

    /// Stops a streaming turn, keeping what has arrived. Not valid before the
    /// first fragment.
    pub fn cancel(&mut self) -> bool {
        self.finish(TurnEvent::Cancel)
    }

    /// Ends the turn with a user-visible error. Partial content stays.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if !self.finish(TurnEvent::Fail) {
            return false;
        }
        self.error = Some(message.into());
        true
    }

    pub fn can_reset(&self) -> bool {
        self.phase == TurnPhase::Idle && !self.conversation.is_empty()
    }

    /// Starts over with an empty conversation. Only allowed while idle.
    pub fn reset(&mut self) -> bool {
        if self.phase != TurnPhase::Idle {
            return false;
        }
        self.conversation.clear();
        self.input.clear();
        self.error = None;
        self.pending = None;
        true
    }

    /// Visible messages only.
    pub fn snapshot(&self) -> Vec<Message> {
        self.conversation
            .iter()
            .filter(|message| message.role.is_visible())
            .cloned()
            .collect()
    }

    pub fn view(&self) -> ConversationView {
        render_conversation(&self.conversation, self.is_loading())
    }

    fn finish(&mut self, event: TurnEvent) -> bool {
        match transition(self.phase, event) {
            Some(next) => {
                self.phase = next;
                self.pending = None;
                true
            }
            None => false,
        }
    }

    fn new_message(&mut self, role: Role, content: &str) -> Message {
        self.next_id += 1;
        Message::new(self.next_id, role, content, now_unix_ts())
    }

    fn request(&self) -> ChatRequest {
        ChatRequest {
            messages: self
                .conversation
                .iter()
                .filter(|message| message.role.is_visible())
                .map(WireMessage::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Blank text or a turn already in flight.
    Rejected,
    Completed,
    Cancelled,
    Failed(String),
}

/// Holds back a trailing partial UTF-8 sequence until the next chunk.
#[derive(Debug, Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                let text = text.to_string();
                self.pending.clear();
                text
            }
            Err(err) if err.error_len().is_none() => {
                let valid = err.valid_up_to();
                let text = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
                self.pending.drain(..valid);
                text
            }
            Err(_) => {
                let text = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                text
            }
        }
    }

    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Drives one turn end to end: submit, open the stream, append fragments as
/// they arrive, and settle the session. `on_update` runs after every visible
/// change. Resolving `cancel` aborts the request; partial content is kept.
pub async fn run_turn<T, C, F>(
    session: &mut SessionController,
    transport: &T,
    text: &str,
    cancel: C,
    mut on_update: F,
) -> TurnOutcome
where
    T: ChatTransport + ?Sized,
    C: Future<Output = ()>,
    F: FnMut(&SessionController),
{
    let Some(request) = session.submit(text) else {
        return TurnOutcome::Rejected;
    };
    on_update(session);
    tokio::pin!(cancel);

    let opened = tokio::select! {
        biased;
        _ = &mut cancel => None,
        opened = transport.open(request) => Some(opened),
    };
    let mut stream = match opened {
        Some(Ok(stream)) => stream,
        Some(Err(err)) => return settle_failure(session, err.to_string(), &mut on_update),
        None => {
            return settle_failure(session, CANCELLED_BEFORE_RESPONSE.to_string(), &mut on_update)
        }
    };

    let mut carry = Utf8Carry::default();
    let mut chunks = 0usize;
    loop {
        tokio::select! {
            biased;
            _ = &mut cancel => {
                if session.cancel() {
                    debug!(chunks, "turn cancelled");
                    on_update(session);
                    return TurnOutcome::Cancelled;
                }
                return settle_failure(session, CANCELLED_BEFORE_RESPONSE.to_string(), &mut on_update);
            }
            next = stream.next() => match next {
                Some(Ok(bytes)) => {
                    chunks += 1;
                    if session.receive_chunk(&carry.push(&bytes)) {
                        on_update(session);
                    }
                }
                Some(Err(err)) => {
                    session.receive_chunk(&carry.finish());
                    return settle_failure(session, err.to_string(), &mut on_update);
                }
                None => {
                    session.receive_chunk(&carry.finish());
                    session.complete();
                    debug!(chunks, "turn completed");
                    on_update(session);
                    return TurnOutcome::Completed;
                }
            }
        }
    }
}

fn settle_failure<F>(
    session: &mut SessionController,
    message: String,
    on_update: &mut F,
) -> TurnOutcome
where
    F: FnMut(&SessionController),
{
    warn!(error = %message, "turn failed");
    session.fail(message.clone());
    on_update(session);
    TurnOutcome::Failed(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_content_is_the_concatenation_of_chunks() {
        let mut session = SessionController::new();
        assert!(session.submit("hi").is_some());
        for chunk in ["Hel", "lo", ", ", "world"] {
            assert!(session.receive_chunk(chunk));
        }
        assert!(session.complete());
        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "Hello, world");
        assert_eq!(session.phase(), TurnPhase::Idle);
    }

    #[test]
    fn blank_submissions_are_no_ops() {
        let mut session = SessionController::new();
        assert!(session.submit("").is_none());
        assert!(session.submit("   ").is_none());
        assert!(session.messages().is_empty());
        assert_eq!(session.phase(), TurnPhase::Idle);
    }

    #[test]
    fn submit_is_rejected_while_a_turn_is_in_flight() {
        let mut session = SessionController::new();
        session.submit("first").unwrap();
        assert!(session.submit("second").is_none());
        session.receive_chunk("partial");
        assert!(session.submit("third").is_none());
        assert_eq!(session.messages().len(), 2);
    }

    #[test]
    fn request_carries_visible_history() {
        let mut session = SessionController::new();
        session.submit("one").unwrap();
        session.receive_chunk("reply");
        session.complete();
        let request = session.submit("two").unwrap();
        let roles: Vec<&str> = request.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "user"]);
        assert_eq!(request.messages[2].content, "two");
    }

    #[test]
    fn cancel_keeps_partial_content() {
        let mut session = SessionController::new();
        session.submit("hi").unwrap();
        assert!(!session.cancel());
        session.receive_chunk("par");
        session.receive_chunk("tial");
        assert!(session.cancel());
        assert_eq!(session.phase(), TurnPhase::Idle);
        assert_eq!(session.messages()[1].content, "partial");
        assert!(session.error().is_none());
    }

    #[test]
    fn failure_sets_error_and_next_submit_clears_it() {
        let mut session = SessionController::new();
        session.submit("hi").unwrap();
        session.receive_chunk("so far");
        assert!(session.fail("boom"));
        assert_eq!(session.error(), Some("boom"));
        assert_eq!(session.messages()[1].content, "so far");
        session.submit("again").unwrap();
        assert!(session.error().is_none());
    }

    #[test]
    fn reset_clears_everything_but_only_when_idle() {
        let mut session = SessionController::new();
        session.set_input("draft");
        session.submit("hi").unwrap();
        assert!(!session.can_reset());
        assert!(!session.reset());
        session.fail("boom");
        assert!(session.can_reset());
        assert!(session.reset());
        assert!(session.messages().is_empty());
        assert!(session.error().is_none());
        assert_eq!(session.input(), "");
        assert!(!session.can_reset());
    }

    #[test]
    fn submit_input_clears_buffer_only_when_accepted() {
        let mut session = SessionController::new();
        session.set_input("   ");
        assert!(session.submit_input().is_none());
        assert_eq!(session.input(), "   ");
        session.set_input("hello");
        assert!(session.submit_input().is_some());
        assert_eq!(session.input(), "");
    }

    #[test]
    fn suggestions_only_show_for_empty_conversations() {
        let mut session = SessionController::new();
        assert_eq!(session.suggestions().len(), 4);
        let request = session.submit_suggestion(1).unwrap();
        assert_eq!(request.messages[0].content, SUGGESTIONS[1]);
        assert!(session.suggestions().is_empty());
        assert!(session.submit_suggestion(9).is_none());
    }

    #[test]
    fn view_shows_typing_until_first_chunk() {
        let mut session = SessionController::new();
        session.submit("hi").unwrap();
        assert!(session.view().typing);
        session.receive_chunk("Hey");
        let view = session.view();
        assert!(!view.typing);
        assert_eq!(view.messages.len(), 2);
    }

    #[test]
    fn utf8_split_across_chunks_is_carried() {
        let mut carry = Utf8Carry::default();
        let bytes = "héllo".as_bytes();
        let first = carry.push(&bytes[..2]);
        let second = carry.push(&bytes[2..]);
        assert_eq!(first, "h");
        assert_eq!(format!("{first}{second}"), "héllo");
        assert_eq!(carry.finish(), "");
    }
}
