//! Stream orchestration: the end-to-end lifecycle of one chat exchange.
//!
//! The engine owns the in-memory message list and drives the
//! decoder → extractor → accumulator loop over the upstream SSE body. It
//! applies the user message optimistically, rolls it back if the send never
//! reaches the streaming stage, and persists the finished assistant message
//! best-effort through the [`ConversationStore`] boundary.

use crate::accumulator::Accumulator;
use crate::client::HttpClient;
use crate::delta::{Frame, extract};
use crate::errors::ChatError;
use crate::models::{
    ChatRequest, Conversation, ErrorEnvelope, Message, Role, WireMessage, derive_title,
};
use crate::sse::LineDecoder;
use crate::store::ConversationStore;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bon::Builder;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

/// Largest error envelope body we bother reading on a non-success status.
const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

/// Lifecycle of one exchange. `Completed` and `Failed` are terminal for the
/// exchange; a new send may start from either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Sending,
    Streaming,
    Completed,
    Failed,
}

impl Phase {
    fn in_flight(self) -> bool {
        matches!(self, Phase::Sending | Phase::Streaming)
    }
}

/// Static configuration for a [`ChatEngine`].
#[derive(Debug, Clone, Builder)]
pub struct EngineConfig {
    /// The chat completions endpoint, e.g. `https://host/v1/chat/completions`.
    pub endpoint: Url,
    /// Bearer token for the `Authorization` header.
    pub api_key: Option<String>,
    /// Model identifier forwarded in the request body. Some gateways pin the
    /// model server-side, in which case this stays unset.
    pub model: Option<String>,
    /// Prepended to every outbound request as a `system` message.
    pub system_prompt: Option<String>,
    /// Identity under which conversations are created and listed. Without an
    /// owner the exchange still runs, but nothing is persisted.
    pub owner: Option<String>,
    /// Abort the stream if no chunk arrives within this window.
    pub idle_timeout: Option<Duration>,
    /// Send only the last N messages of history upstream. Unset sends the
    /// full conversation, which grows without bound on long conversations.
    pub history_window: Option<usize>,
}

/// The stream orchestrator.
///
/// Single-writer by construction: `send` takes `&mut self`, so two streams
/// can never mutate the message list concurrently. Observers get snapshots
/// of the list through a watch channel after every change.
pub struct ChatEngine<T: HttpClient> {
    http: T,
    store: Arc<dyn ConversationStore>,
    config: EngineConfig,
    messages: Vec<Message>,
    conversation_id: Option<String>,
    phase: Phase,
    updates: watch::Sender<Vec<Message>>,
}

impl<T: HttpClient> ChatEngine<T> {
    pub fn new(http: T, store: Arc<dyn ConversationStore>, config: EngineConfig) -> Self {
        let (updates, _) = watch::channel(Vec::new());
        Self {
            http,
            store,
            config,
            messages: Vec::new(),
            conversation_id: None,
            phase: Phase::Idle,
            updates,
        }
    }

    /// Observe the message list. The receiver sees a fresh snapshot after
    /// every fragment, in arrival order.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Message>> {
        self.updates.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Send one user message and stream the assistant reply.
    ///
    /// Returns once the exchange reaches a terminal phase. While a previous
    /// exchange is still in flight this is rejected without touching any
    /// state — the de facto cancellation guard.
    pub async fn send(&mut self, text: &str) -> Result<(), ChatError> {
        if self.phase.in_flight() {
            debug!("rejecting send: a stream is already in flight");
            return Err(ChatError::StreamInFlight);
        }
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        self.phase = Phase::Sending;
        let user_message = Message::new(Role::User, text);
        let user_id = user_message.id.clone();
        self.messages.push(user_message);
        self.publish();

        self.ensure_conversation(text).await;
        if let Some(conversation_id) = self.conversation_id.clone() {
            self.persist(&conversation_id, Role::User, text).await;
        }

        let response = match self.open_stream().await {
            Ok(response) => response,
            Err(e) => {
                // The send never produced anything; reverse the optimistic
                // append so the list reflects that it did not go through.
                self.revert_user_message(&user_id);
                self.phase = Phase::Failed;
                return Err(e);
            }
        };

        self.phase = Phase::Streaming;
        match self.drive_stream(response).await {
            Ok(content) => {
                self.phase = Phase::Completed;
                info!(chars = content.len(), "stream completed");
                if !content.is_empty()
                    && let Some(conversation_id) = self.conversation_id.clone()
                {
                    self.persist(&conversation_id, Role::Assistant, &content).await;
                }
                Ok(())
            }
            Err(e) => {
                // Partial assistant output stays visible; it is useful even
                // when the stream died under it.
                self.phase = Phase::Failed;
                Err(e)
            }
        }
    }

    /// Replace local state with a stored conversation.
    pub async fn load_conversation(&mut self, conversation_id: &str) -> Result<(), ChatError> {
        if self.phase.in_flight() {
            return Err(ChatError::StreamInFlight);
        }
        let messages = self.store.load_messages(conversation_id).await?;
        self.messages = messages;
        self.conversation_id = Some(conversation_id.to_string());
        self.phase = Phase::Idle;
        self.publish();
        Ok(())
    }

    /// All conversations for the configured owner, most recent first.
    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, ChatError> {
        match &self.config.owner {
            Some(owner) => Ok(self.store.list_conversations(owner).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Delete a stored conversation, clearing local state if it is current.
    pub async fn delete_conversation(&mut self, conversation_id: &str) -> Result<(), ChatError> {
        if self.phase.in_flight() {
            return Err(ChatError::StreamInFlight);
        }
        self.store.delete_conversation(conversation_id).await?;
        if self.conversation_id.as_deref() == Some(conversation_id) {
            self.start_new();
        }
        Ok(())
    }

    /// Detach from the current conversation and clear the message list.
    pub fn start_new(&mut self) {
        self.conversation_id = None;
        self.messages.clear();
        self.phase = Phase::Idle;
        self.publish();
    }

    fn publish(&self) {
        self.updates.send_replace(self.messages.clone());
    }

    /// Reverse of the optimistic user-message append.
    fn revert_user_message(&mut self, user_id: &str) {
        self.messages.retain(|message| message.id != user_id);
        self.publish();
    }

    /// Lazily create a conversation from the first message. Creation failure
    /// is logged and the exchange continues unpersisted.
    async fn ensure_conversation(&mut self, first_message: &str) {
        if self.conversation_id.is_some() {
            return;
        }
        let Some(owner) = self.config.owner.clone() else {
            return;
        };
        let title = derive_title(first_message);
        match self.store.create_conversation(&owner, &title).await {
            Ok(id) => {
                debug!(conversation_id = %id, title = %title, "created conversation");
                self.conversation_id = Some(id);
            }
            Err(e) => warn!(error = %e, "failed to create conversation"),
        }
    }

    /// Best-effort persistence: failures are logged and never surfaced, the
    /// in-memory state already shown to the user is authoritative.
    async fn persist(&self, conversation_id: &str, role: Role, content: &str) {
        if let Err(e) = self.store.append_message(conversation_id, role, content).await {
            warn!(error = %e, ?role, "failed to persist message");
            return;
        }
        if let Err(e) = self.store.touch_conversation(conversation_id).await {
            warn!(error = %e, "failed to touch conversation");
        }
    }

    /// Issue the upstream request and validate the response status.
    async fn open_stream(&self) -> Result<axum::response::Response, ChatError> {
        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: self.outbound_messages(),
            stream: true,
        };
        let body = serde_json::to_vec(&body).map_err(|e| ChatError::Request(e.to_string()))?;

        let mut request = Request::post(self.config.endpoint.as_str())
            .header("content-type", "application/json");
        if let Some(key) = &self.config.api_key {
            request = request.header("authorization", format!("Bearer {key}"));
        }
        let request = request
            .body(Body::from(body))
            .map_err(|e| ChatError::Request(e.to_string()))?;

        debug!(endpoint = %self.config.endpoint, "issuing upstream request");
        let response = self
            .http
            .request(request)
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::status_error(status, response.into_body()).await);
        }
        Ok(response)
    }

    /// History as sent upstream: optional system prompt, then the (possibly
    /// windowed) message list including the just-appended user message.
    fn outbound_messages(&self) -> Vec<WireMessage> {
        let mut outbound = Vec::with_capacity(self.messages.len() + 1);
        if let Some(prompt) = &self.config.system_prompt {
            outbound.push(WireMessage {
                role: Role::System,
                content: prompt.clone(),
            });
        }
        let history = match self.config.history_window {
            Some(window) => &self.messages[self.messages.len().saturating_sub(window)..],
            None => &self.messages[..],
        };
        outbound.extend(history.iter().map(Into::into));
        outbound
    }

    /// Map a non-success status (plus its JSON error envelope, if any) to the
    /// user-facing error taxonomy.
    async fn status_error(status: StatusCode, body: Body) -> ChatError {
        match status {
            StatusCode::TOO_MANY_REQUESTS => ChatError::RateLimited,
            StatusCode::PAYMENT_REQUIRED => ChatError::QuotaExceeded,
            _ => {
                let message = match axum::body::to_bytes(body, MAX_ERROR_BODY_BYTES).await {
                    Ok(bytes) => serde_json::from_slice::<ErrorEnvelope>(&bytes)
                        .map(|envelope| envelope.error)
                        .unwrap_or_else(|_| "AI gateway error".to_string()),
                    Err(_) => "AI gateway error".to_string(),
                };
                ChatError::Gateway {
                    status: status.as_u16(),
                    message,
                }
            }
        }
    }

    /// Drive the decode/extract/accumulate loop until the terminal sentinel,
    /// end-of-data, or a read error. Returns the accumulated content.
    async fn drive_stream(
        &mut self,
        response: axum::response::Response,
    ) -> Result<String, ChatError> {
        let mut body = response.into_body().into_data_stream();
        let mut decoder = LineDecoder::new();
        let mut accumulator = Accumulator::new();
        let mut assistant_id: Option<String> = None;
        let mut done = false;

        while !done {
            let chunk = match self.config.idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, body.next()).await {
                    Ok(chunk) => chunk,
                    Err(_) => return Err(ChatError::IdleTimeout(limit)),
                },
                None => body.next().await,
            };
            let Some(chunk) = chunk else {
                break; // end of data without an explicit sentinel
            };
            let bytes = chunk.map_err(|e| ChatError::Transport(e.to_string()))?;
            decoder.push(&bytes);

            while let Some(line) = decoder.next_line() {
                match extract(&line) {
                    Frame::Fragment(fragment) => {
                        self.apply_fragment(&mut accumulator, &mut assistant_id, &fragment);
                    }
                    Frame::Done => {
                        done = true;
                        break;
                    }
                    Frame::Ignored => {}
                    Frame::Incomplete => {
                        // Probably a line truncated mid-chunk: put it back
                        // and wait for more data. Past the cap it is dropped.
                        if decoder.unshift(&line) {
                            break;
                        }
                        warn!(bytes = line.len(), "dropping oversized unparseable SSE line");
                    }
                }
            }
        }

        if !done {
            // Flush whatever the decoder still holds; truncated trailing
            // fragments fail extraction and are dropped, never fabricated.
            for line in decoder.finish() {
                match extract(&line) {
                    Frame::Fragment(fragment) => {
                        self.apply_fragment(&mut accumulator, &mut assistant_id, &fragment);
                    }
                    Frame::Done | Frame::Ignored | Frame::Incomplete => {}
                }
            }
        }

        Ok(accumulator.into_content())
    }

    /// Fold one fragment into the running assistant message and republish.
    ///
    /// The first fragment creates the single assistant entry for this
    /// stream; every later fragment replaces its content in place.
    fn apply_fragment(
        &mut self,
        accumulator: &mut Accumulator,
        assistant_id: &mut Option<String>,
        fragment: &str,
    ) {
        let running = accumulator.append(fragment);
        match assistant_id {
            Some(id) => {
                if let Some(message) = self.messages.iter_mut().find(|m| m.id == *id) {
                    message.content = running.to_string();
                }
            }
            None => {
                let message = Message::new(Role::Assistant, running);
                *assistant_id = Some(message.id.clone());
                self.messages.push(message);
            }
        }
        self.publish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, StoreError};
    use crate::test_utils::MockHttpClient;
    use async_trait::async_trait;

    fn config(owner: Option<&str>) -> EngineConfig {
        EngineConfig::builder()
            .endpoint("https://gateway.example.com/v1/chat/completions".parse().unwrap())
            .api_key("test-key".to_string())
            .maybe_owner(owner.map(String::from))
            .build()
    }

    fn sse(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{content}\"}}}}]}}\n\n"
        )
    }

    fn engine_with(
        client: MockHttpClient,
        store: Arc<dyn ConversationStore>,
        owner: Option<&str>,
    ) -> ChatEngine<MockHttpClient> {
        ChatEngine::new(client, store, config(owner))
    }

    #[tokio::test]
    async fn test_send_assembles_and_persists_full_exchange() {
        let chunks = vec![
            sse("A "),
            sse("DDoS "),
            sse("attack..."),
            "data: [DONE]\n\n".to_string(),
        ];
        let client = MockHttpClient::new_streaming(StatusCode::OK, chunks);
        let store = Arc::new(InMemoryStore::new());
        let mut engine = engine_with(client.clone(), store.clone(), Some("alice"));

        engine.send("What is DDoS?").await.unwrap();

        assert_eq!(engine.phase(), Phase::Completed);
        let messages = engine.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "What is DDoS?");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "A DDoS attack...");

        // Exactly one conversation, titled after the first message, with
        // both sides persisted.
        let conversations = store.list_conversations("alice").await.unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].title, "What is DDoS?");
        let stored = store.load_messages(&conversations[0].id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].content, "A DDoS attack...");

        // The upstream request carried the user message and stream: true.
        let requests = client.get_requests();
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["content"], "What is DDoS?");
    }

    #[tokio::test]
    async fn test_exactly_one_assistant_message_per_stream() {
        let chunks = vec![sse("Hel"), sse("lo"), "data: [DONE]\n\n".to_string()];
        let client = MockHttpClient::new_streaming(StatusCode::OK, chunks);
        let mut engine = engine_with(client, Arc::new(InMemoryStore::new()), None);

        engine.send("hi").await.unwrap();

        let assistants: Vec<_> = engine
            .messages()
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .collect();
        assert_eq!(assistants.len(), 1);
        assert_eq!(assistants[0].content, "Hello");
    }

    #[tokio::test]
    async fn test_system_prompt_prepended_to_outbound_history() {
        let client =
            MockHttpClient::new_streaming(StatusCode::OK, vec!["data: [DONE]\n\n".to_string()]);
        let mut engine = ChatEngine::new(
            client.clone(),
            Arc::new(InMemoryStore::new()),
            EngineConfig::builder()
                .endpoint("https://gateway.example.com/v1/chat/completions".parse().unwrap())
                .system_prompt("You are a security assistant.".to_string())
                .build(),
        );

        engine.send("hello").await.unwrap();

        let body: serde_json::Value =
            serde_json::from_slice(&client.get_requests()[0].body).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You are a security assistant.");
        assert_eq!(body["messages"][1]["role"], "user");
    }

    #[tokio::test]
    async fn test_history_window_limits_outbound_messages() {
        let client =
            MockHttpClient::new_streaming(StatusCode::OK, vec!["data: [DONE]\n\n".to_string()]);
        let mut engine = ChatEngine::new(
            client.clone(),
            Arc::new(InMemoryStore::new()),
            EngineConfig::builder()
                .endpoint("https://gateway.example.com/v1/chat/completions".parse().unwrap())
                .history_window(1)
                .build(),
        );
        // Seed prior history directly; only the newest message should go out.
        engine.messages.push(Message::new(Role::User, "old question"));
        engine
            .messages
            .push(Message::new(Role::Assistant, "old answer"));

        engine.send("new question").await.unwrap();

        let body: serde_json::Value =
            serde_json::from_slice(&client.get_requests()[0].body).unwrap();
        let outbound = body["messages"].as_array().unwrap();
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0]["content"], "new question");
    }

    #[tokio::test]
    async fn test_rate_limit_rolls_back_user_message() {
        let client = MockHttpClient::new(StatusCode::TOO_MANY_REQUESTS, r#"{"error":"slow down"}"#);
        let mut engine = engine_with(client, Arc::new(InMemoryStore::new()), None);

        let err = engine.send("hello").await.unwrap_err();

        assert!(matches!(err, ChatError::RateLimited));
        assert!(err.to_string().to_lowercase().contains("rate limits"));
        assert!(engine.messages().is_empty());
        assert_eq!(engine.phase(), Phase::Failed);
    }

    #[tokio::test]
    async fn test_quota_error_is_distinguished() {
        let client = MockHttpClient::new(StatusCode::PAYMENT_REQUIRED, "{}");
        let mut engine = engine_with(client, Arc::new(InMemoryStore::new()), None);

        let err = engine.send("hello").await.unwrap_err();
        assert!(matches!(err, ChatError::QuotaExceeded));
        assert!(engine.messages().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_error_surfaces_envelope_message() {
        let client =
            MockHttpClient::new(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"upstream broke"}"#);
        let mut engine = engine_with(client, Arc::new(InMemoryStore::new()), None);

        let err = engine.send("hello").await.unwrap_err();
        match err {
            ChatError::Gateway { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "upstream broke");
            }
            other => panic!("expected gateway error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mid_stream_error_keeps_partial_content() {
        let client = MockHttpClient::new_streaming_results(
            StatusCode::OK,
            vec![
                Ok(sse("partial ")),
                Ok(sse("answer")),
                Err("connection reset".to_string()),
            ],
        );
        let mut engine = engine_with(client, Arc::new(InMemoryStore::new()), None);

        let err = engine.send("hello").await.unwrap_err();

        assert!(matches!(err, ChatError::Transport(_)));
        assert_eq!(engine.phase(), Phase::Failed);
        // User message and the partial assistant output both stay visible.
        assert_eq!(engine.messages().len(), 2);
        assert_eq!(engine.messages()[1].content, "partial answer");
    }

    #[tokio::test]
    async fn test_send_rejected_while_stream_in_flight() {
        let client =
            MockHttpClient::new_streaming(StatusCode::OK, vec!["data: [DONE]\n\n".to_string()]);
        let mut engine = engine_with(client, Arc::new(InMemoryStore::new()), None);
        engine.messages.push(Message::new(Role::User, "first"));
        engine.phase = Phase::Streaming;

        let err = engine.send("second").await.unwrap_err();

        assert!(matches!(err, ChatError::StreamInFlight));
        // The rejected attempt leaves the list untouched.
        assert_eq!(engine.messages().len(), 1);
        assert_eq!(engine.messages()[0].content, "first");
    }

    #[tokio::test]
    async fn test_whitespace_only_send_is_noop() {
        let client = MockHttpClient::new(StatusCode::OK, "{}");
        let mut engine = engine_with(client.clone(), Arc::new(InMemoryStore::new()), None);

        engine.send("   \n").await.unwrap();

        assert!(engine.messages().is_empty());
        assert!(client.get_requests().is_empty());
    }

    /// Store whose writes all fail; reads are delegated nowhere.
    #[derive(Debug)]
    struct FailingStore;

    #[async_trait]
    impl ConversationStore for FailingStore {
        async fn create_conversation(&self, _: &str, _: &str) -> Result<String, StoreError> {
            Ok("conv-1".to_string())
        }
        async fn append_message(&self, _: &str, _: Role, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Storage("disk on fire".to_string()))
        }
        async fn list_conversations(&self, _: &str) -> Result<Vec<Conversation>, StoreError> {
            Ok(Vec::new())
        }
        async fn load_messages(&self, id: &str) -> Result<Vec<Message>, StoreError> {
            Err(StoreError::NotFound(id.to_string()))
        }
        async fn touch_conversation(&self, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Storage("disk on fire".to_string()))
        }
        async fn delete_conversation(&self, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Storage("disk on fire".to_string()))
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_is_not_user_visible() {
        let chunks = vec![sse("answer"), "data: [DONE]\n\n".to_string()];
        let client = MockHttpClient::new_streaming(StatusCode::OK, chunks);
        let mut engine = engine_with(client, Arc::new(FailingStore), Some("alice"));

        // Both the user and assistant appends fail in the store; the send
        // still succeeds and the assistant message stays visible.
        engine.send("hello").await.unwrap();

        assert_eq!(engine.phase(), Phase::Completed);
        assert_eq!(engine.messages().len(), 2);
        assert_eq!(engine.messages()[1].content, "answer");
    }

    #[tokio::test]
    async fn test_fragment_split_across_network_chunks() {
        // One SSE event cut mid-JSON across three transport chunks.
        let event = sse("chunked");
        let client = MockHttpClient::new_streaming(
            StatusCode::OK,
            vec![
                event[..10].to_string(),
                event[10..20].to_string(),
                event[20..].to_string(),
                "data: [DONE]\n\n".to_string(),
            ],
        );
        let mut engine = engine_with(client, Arc::new(InMemoryStore::new()), None);

        engine.send("hi").await.unwrap();
        assert_eq!(engine.messages()[1].content, "chunked");
    }

    #[tokio::test]
    async fn test_stream_without_sentinel_flushes_trailing_event() {
        // EOF without [DONE]; the final unterminated line is still applied.
        let client = MockHttpClient::new_streaming(
            StatusCode::OK,
            vec![sse("complete "), sse("answer").trim_end().to_string()],
        );
        let mut engine = engine_with(client, Arc::new(InMemoryStore::new()), None);

        engine.send("hi").await.unwrap();
        assert_eq!(engine.phase(), Phase::Completed);
        assert_eq!(engine.messages()[1].content, "complete answer");
    }

    #[tokio::test]
    async fn test_empty_stream_completes_without_assistant_message() {
        let client =
            MockHttpClient::new_streaming(StatusCode::OK, vec!["data: [DONE]\n\n".to_string()]);
        let store = Arc::new(InMemoryStore::new());
        let mut engine = engine_with(client, store.clone(), Some("alice"));

        engine.send("hello").await.unwrap();

        assert_eq!(engine.phase(), Phase::Completed);
        assert_eq!(engine.messages().len(), 1);
        // Only the user message was persisted.
        let conversations = store.list_conversations("alice").await.unwrap();
        let stored = store.load_messages(&conversations[0].id).await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_watch_updates_arrive_in_order() {
        let chunks = vec![sse("Hel"), sse("lo"), "data: [DONE]\n\n".to_string()];
        let client = MockHttpClient::new_streaming(StatusCode::OK, chunks);
        let mut engine = engine_with(client, Arc::new(InMemoryStore::new()), None);
        let mut rx = engine.subscribe();

        engine.send("hi").await.unwrap();

        // The final snapshot holds the fully assembled message.
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.last().unwrap().content, "Hello");
    }

    #[tokio::test]
    async fn test_load_list_delete_roundtrip() {
        let client =
            MockHttpClient::new_streaming(StatusCode::OK, vec!["data: [DONE]\n\n".to_string()]);
        let store = Arc::new(InMemoryStore::new());
        let mut engine = engine_with(client, store.clone(), Some("alice"));

        let id = store.create_conversation("alice", "older chat").await.unwrap();
        store.append_message(&id, Role::User, "old").await.unwrap();

        engine.load_conversation(&id).await.unwrap();
        assert_eq!(engine.conversation_id(), Some(id.as_str()));
        assert_eq!(engine.messages().len(), 1);

        assert_eq!(engine.list_conversations().await.unwrap().len(), 1);

        engine.delete_conversation(&id).await.unwrap();
        assert!(engine.conversation_id().is_none());
        assert!(engine.messages().is_empty());
        assert!(engine.list_conversations().await.unwrap().is_empty());
    }
}
