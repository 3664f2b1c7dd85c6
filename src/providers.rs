//! Streaming completion collaborator: the trait the conversation drives, plus
//! an HTTP implementation speaking the OpenAI and Anthropic SSE protocols.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};

use clap::ValueEnum;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{DevmindError, Result};

/// Directive installed on every new session. The `FILE:` convention it
/// describes is the contract the extractor parses.
pub const SYSTEM_DIRECTIVE: &str = "You are DevMind, a senior full-stack engineer working inside a virtual IDE with a live web preview.

When you create or change a file, emit the WHOLE file in exactly this shape:
FILE: path/to/name.ext
```language
full file content
```

Rules:
1. The closing ``` must sit on its own line. Never abbreviate a file; always send its full content.
2. Use .html for structure, .css for styles, and .js or .ts for logic.
3. Every project needs an index.html. Create it if it is missing, and reference styles and scripts from it with <link rel=\"stylesheet\" href=\"style.css\"> and <script src=\"script.js\"></script>.
4. Keep explanations short. The file list you receive after each message is the current project structure.";

/// Stream of text fragments for one turn.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Sampling parameters fixed at session creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            max_tokens: 8192,
        }
    }
}

/// Anything that identifies a collaborator session.
pub trait SessionHandle {
    fn session_id(&self) -> &str;
}

/// A streaming completion service with conversational sessions.
///
/// Sessions are cheap: callers may drop one and create another at any time.
pub trait CompletionClient {
    type Session: SessionHandle;

    fn create_session(
        &self,
        system_directive: &str,
        sampling: &SamplingConfig,
    ) -> Result<Self::Session>;

    /// Send one user turn; resolves to the fragment stream of the reply.
    fn send_turn(
        &self,
        session: &mut Self::Session,
        text: &str,
    ) -> impl Future<Output = Result<FragmentStream>>;
}

// ---------------------------------------------------------------------------
// Provider selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Openai,
    Anthropic,
}

impl Provider {
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Provider::Openai => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Openai => "https://api.openai.com/v1",
            Provider::Anthropic => "https://api.anthropic.com/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Openai => "gpt-4o",
            Provider::Anthropic => "claude-sonnet-4-20250514",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Openai => write!(f, "openai"),
            Provider::Anthropic => write!(f, "anthropic"),
        }
    }
}

// -- OpenAI SSE types -------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OpenAIChatRequest {
    pub model: String,
    pub messages: Vec<ChatTurn>,
    pub stream: bool,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIDelta {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIChoice {
    pub delta: OpenAIDelta,
    #[allow(dead_code)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIChunk {
    #[serde(default)]
    pub choices: Vec<OpenAIChoice>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

// -- Anthropic SSE types ----------------------------------------------------

#[derive(Debug, Serialize)]
pub struct AnthropicRequest {
    pub model: String,
    pub messages: Vec<ChatTurn>,
    pub max_tokens: u32,
    pub stream: bool,
    pub temperature: f32,
    pub system: String,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicContentDelta {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicStreamEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub delta: Option<AnthropicContentDelta>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

// ---------------------------------------------------------------------------
// SSE line parsing
// ---------------------------------------------------------------------------

/// Meaning of one SSE line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Text(String),
    Error(String),
    Done,
    Ignore,
}

/// Interpret one trimmed SSE line for `provider`.
pub fn parse_sse_line(provider: Provider, line: &str) -> SseEvent {
    let Some(json_str) = line.strip_prefix("data:").map(str::trim_start) else {
        return SseEvent::Ignore;
    };
    match provider {
        Provider::Openai => {
            if json_str == "[DONE]" {
                return SseEvent::Done;
            }
            match serde_json::from_str::<OpenAIChunk>(json_str) {
                Ok(chunk) => {
                    if let Some(err) = chunk.error {
                        return SseEvent::Error(err.message);
                    }
                    chunk
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.delta.content)
                        .filter(|t| !t.is_empty())
                        .map(SseEvent::Text)
                        .unwrap_or(SseEvent::Ignore)
                }
                Err(_) => SseEvent::Ignore,
            }
        }
        Provider::Anthropic => match serde_json::from_str::<AnthropicStreamEvent>(json_str) {
            Ok(event) => match event.event_type.as_str() {
                "content_block_delta" => event
                    .delta
                    .and_then(|d| d.text)
                    .filter(|t| !t.is_empty())
                    .map(SseEvent::Text)
                    .unwrap_or(SseEvent::Ignore),
                "message_stop" => SseEvent::Done,
                "error" => SseEvent::Error(
                    event
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "stream error".to_string()),
                ),
                _ => SseEvent::Ignore,
            },
            Err(_) => SseEvent::Ignore,
        },
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Client-side chat session: the directive, sampling, and the completed
/// history replayed with every request.
#[derive(Debug, Clone)]
pub struct HttpSession {
    id: String,
    system: String,
    sampling: SamplingConfig,
    history: Arc<Mutex<Vec<ChatTurn>>>,
}

impl HttpSession {
    /// Completed turns so far.
    pub fn history(&self) -> Vec<ChatTurn> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

impl SessionHandle for HttpSession {
    fn session_id(&self) -> &str {
        &self.id
    }
}

pub struct HttpCompletionClient {
    client: Client,
    api_key: String,
    pub provider: Provider,
    pub model: String,
    pub base_url: String,
}

impl HttpCompletionClient {
    /// Build a client, reading the provider's API key from the environment.
    pub fn new(provider: Provider, model: String) -> Result<Self> {
        let api_key = std::env::var(provider.api_key_var())
            .map_err(|_| DevmindError::MissingApiKey(provider.api_key_var()))?;
        Ok(Self::with_api_key(provider, model, api_key))
    }

    pub fn with_api_key(provider: Provider, model: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            provider,
            model,
            base_url: provider.default_base_url().to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_request(&self, session: &HttpSession, text: &str) -> reqwest::RequestBuilder {
        let mut turns = session.history();
        turns.push(ChatTurn::new("user", text));
        match self.provider {
            Provider::Openai => {
                let mut messages = vec![ChatTurn::new("system", session.system.clone())];
                messages.extend(turns);
                let request = OpenAIChatRequest {
                    model: self.model.clone(),
                    messages,
                    stream: true,
                    temperature: session.sampling.temperature,
                    max_tokens: session.sampling.max_tokens,
                };
                self.client
                    .post(format!("{}/chat/completions", self.base_url))
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .header("Content-Type", "application/json")
                    .json(&request)
            }
            Provider::Anthropic => {
                let request = AnthropicRequest {
                    model: self.model.clone(),
                    messages: turns,
                    max_tokens: session.sampling.max_tokens,
                    stream: true,
                    temperature: session.sampling.temperature,
                    system: session.system.clone(),
                };
                self.client
                    .post(format!("{}/messages", self.base_url))
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", "2023-06-01")
                    .header("Content-Type", "application/json")
                    .json(&request)
            }
        }
    }
}

impl CompletionClient for HttpCompletionClient {
    type Session = HttpSession;

    fn create_session(
        &self,
        system_directive: &str,
        sampling: &SamplingConfig,
    ) -> Result<HttpSession> {
        Ok(HttpSession {
            id: uuid::Uuid::new_v4().to_string(),
            system: system_directive.to_string(),
            sampling: sampling.clone(),
            history: Arc::new(Mutex::new(Vec::new())),
        })
    }

    async fn send_turn(&self, session: &mut HttpSession, text: &str) -> Result<FragmentStream> {
        let response = self.build_request(session, text).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::debug!(error = %e, "failed to read error body");
                    format!("<unreadable body: {}>", e)
                }
            };
            return Err(DevmindError::Api {
                provider: self.provider.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();
        let state = SseReader::new(self.provider, bytes, text, Arc::clone(&session.history));
        Ok(state.into_stream())
    }
}

// ---------------------------------------------------------------------------
// SSE reader
// ---------------------------------------------------------------------------

type ByteStream = BoxStream<'static, reqwest::Result<Vec<u8>>>;

/// Splits raw bytes into SSE lines and yields text fragments. The exchange is
/// appended to the session history only when the provider's terminal event
/// (`[DONE]` / `message_stop`) was seen.
struct SseReader {
    provider: Provider,
    bytes: ByteStream,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String>>,
    prompt: String,
    reply: String,
    history: Arc<Mutex<Vec<ChatTurn>>>,
    finished: bool,
    failed: bool,
    completed: bool,
}

impl SseReader {
    fn new(
        provider: Provider,
        bytes: ByteStream,
        prompt: &str,
        history: Arc<Mutex<Vec<ChatTurn>>>,
    ) -> Self {
        Self {
            provider,
            bytes,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            prompt: prompt.to_string(),
            reply: String::new(),
            history,
            finished: false,
            failed: false,
            completed: false,
        }
    }

    fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&String::from_utf8_lossy(&line));
            if self.failed {
                return;
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        match parse_sse_line(self.provider, line.trim()) {
            SseEvent::Text(text) => {
                self.reply.push_str(&text);
                self.pending.push_back(Ok(text));
            }
            SseEvent::Error(message) => {
                self.fail(DevmindError::Transport(message));
            }
            SseEvent::Done => self.completed = true,
            SseEvent::Ignore => {}
        }
    }

    fn fail(&mut self, err: DevmindError) {
        self.pending.push_back(Err(err));
        self.failed = true;
        self.finished = true;
    }

    fn finish(&mut self) {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.handle_line(&String::from_utf8_lossy(&rest));
        }
        self.finished = true;
        if self.failed {
            return;
        }
        if !self.completed {
            tracing::warn!(
                provider = %self.provider,
                "stream ended without a terminal event, reply kept out of history"
            );
            return;
        }
        if let Ok(mut history) = self.history.lock() {
            history.push(ChatTurn::new("user", std::mem::take(&mut self.prompt)));
            history.push(ChatTurn::new("assistant", std::mem::take(&mut self.reply)));
        }
    }

    fn into_stream(self) -> FragmentStream {
        futures_util::stream::unfold(self, |mut reader| async move {
            loop {
                if let Some(item) = reader.pending.pop_front() {
                    return Some((item, reader));
                }
                if reader.finished {
                    return None;
                }
                match reader.bytes.next().await {
                    Some(Ok(chunk)) => reader.feed(&chunk),
                    Some(Err(e)) => reader.fail(DevmindError::from(e)),
                    None => reader.finish(),
                }
            }
        })
        .boxed()
    }
}
