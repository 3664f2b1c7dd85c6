//! DevMind: the engine behind an AI pair-programmer with a virtual file tree
//! and a live preview.
//!
//! A [`Workspace`] owns the project library, the active project's files and
//! conversation, and a [`Conversation`] driving an injected
//! [`CompletionClient`]. Assistant replies are scanned while they stream and
//! every complete `FILE:` block lands in the project's [`FileStore`].

pub mod cli;
pub mod config;
pub mod conversation;
pub mod error;
pub mod extract;
pub mod files;
pub mod preview;
pub mod project;
pub mod providers;
pub mod select;
pub mod store;
pub mod workspace;

use std::time::{SystemTime, UNIX_EPOCH};

pub use config::Config;
pub use conversation::{Conversation, Message, Role, SessionState, TurnReport, ERROR_REPLY};
pub use error::{DevmindError, Result};
pub use extract::{ExtensionPolicy, Extractor};
pub use files::{FileRecord, FileStore};
pub use preview::{Compositor, PreviewDocument};
pub use project::{Project, ProjectLibrary};
pub use providers::{CompletionClient, HttpCompletionClient, Provider, SamplingConfig};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
pub use workspace::Workspace;

/// Unix epoch milliseconds. Zero if the clock is before the epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
