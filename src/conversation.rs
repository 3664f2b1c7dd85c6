//! Conversation and session state.
//!
//! ## Design
//! - `Conversation<C>` owns the injected [`CompletionClient`] and at most one
//!   live session handle (`Idle` when none, `Active` otherwise)
//! - A turn appends one user message and one assistant placeholder, then
//!   rewrites the placeholder with the full accumulated reply after every
//!   fragment and re-runs the extractor over that same text
//! - Failures overwrite the placeholder with [`ERROR_REPLY`]; a
//!   session-not-found failure also drops the handle so the next turn
//!   starts fresh
//!
//! Turns are serialised by `&mut self`; there is no mid-stream cancellation.

use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;

use crate::error::Result;
use crate::extract::Extractor;
use crate::project::Project;
use crate::providers::{CompletionClient, SamplingConfig, SessionHandle, SYSTEM_DIRECTIVE};

/// Shown in place of the assistant reply when a turn fails.
pub const ERROR_REPLY: &str = "⚠️ Error processing request.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp_ms: u64,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp_ms: crate::now_ms(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No collaborator session; the next turn creates one.
    Idle,
    Active,
}

/// Snapshot handed to the progress callback after each fragment.
#[derive(Debug)]
pub struct TurnProgress<'a> {
    pub fragment: &'a str,
    pub project: &'a Project,
    /// Whether this fragment's extraction pass found any accepted block.
    pub files_changed: bool,
}

/// Summary of a completed turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnReport {
    pub reply: String,
    pub fragments: usize,
    /// Paths created or updated during the turn, first-touch order.
    pub files_touched: Vec<String>,
}

pub struct Conversation<C: CompletionClient> {
    client: C,
    system_directive: String,
    sampling: SamplingConfig,
    session: Option<C::Session>,
}

impl<C: CompletionClient> Conversation<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            system_directive: SYSTEM_DIRECTIVE.to_string(),
            sampling: SamplingConfig::default(),
            session: None,
        }
    }

    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.system_directive = directive.into();
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn session(&self) -> Option<&C::Session> {
        self.session.as_ref()
    }

    pub fn state(&self) -> SessionState {
        if self.session.is_some() {
            SessionState::Active
        } else {
            SessionState::Idle
        }
    }

    /// Drop the live session, if any. The next turn creates a new one.
    pub fn reset_session(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::info!(session = session.session_id(), "session reset");
        }
    }

    /// Run one turn against `project`.
    ///
    /// `on_progress` runs after every fragment, once the placeholder message
    /// and the file store reflect it.
    pub async fn send_turn<F>(
        &mut self,
        project: &mut Project,
        extractor: &Extractor,
        text: &str,
        on_progress: F,
    ) -> Result<TurnReport>
    where
        F: FnMut(TurnProgress<'_>),
    {
        project.messages.push(Message::user(text));
        project.messages.push(Message::new(Role::Assistant, ""));
        let slot = project.messages.len() - 1;
        project.touch();

        match self.stream_turn(project, extractor, text, slot, on_progress).await {
            Ok(report) => Ok(report),
            Err(err) => {
                tracing::warn!(error = %err, "turn failed");
                project.messages[slot].content = ERROR_REPLY.to_string();
                project.touch();
                if err.is_session_missing() {
                    self.reset_session();
                }
                Err(err)
            }
        }
    }

    async fn stream_turn<F>(
        &mut self,
        project: &mut Project,
        extractor: &Extractor,
        text: &str,
        slot: usize,
        mut on_progress: F,
    ) -> Result<TurnReport>
    where
        F: FnMut(TurnProgress<'_>),
    {
        if self.session.is_none() {
            let session = self
                .client
                .create_session(&self.system_directive, &self.sampling)?;
            tracing::info!(session = session.session_id(), "session created");
            self.session = Some(session);
        }
        let Some(session) = self.session.as_mut() else {
            return Err(crate::error::DevmindError::SessionNotFound);
        };

        let prompt = format!("{}{}", text, project.files.manifest());
        let mut stream = self.client.send_turn(session, &prompt).await?;

        let mut report = TurnReport::default();
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            report.reply.push_str(&fragment);
            report.fragments += 1;
            project.messages[slot].content = report.reply.clone();

            let outcome = extractor.apply(&report.reply, &mut project.files);
            for path in outcome.created.iter().chain(outcome.updated.iter()) {
                if !report.files_touched.contains(path) {
                    report.files_touched.push(path.clone());
                }
            }
            project.touch();

            on_progress(TurnProgress {
                fragment: &fragment,
                project: &*project,
                files_changed: outcome.changed,
            });
        }

        tracing::debug!(
            fragments = report.fragments,
            files = report.files_touched.len(),
            "turn complete"
        );
        Ok(report)
    }
}
