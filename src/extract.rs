//! # Stage: File-Synthesis Extractor
//!
//! ## Responsibility
//! Scan accumulated assistant text for `FILE:` declarations followed by a
//! fenced block and reconcile every complete block into a [`FileStore`].
//!
//! ## Wire format
//! ````text
//! FILE: path/to/name.ext
//! ```lang
//! <content>
//! ```
//! ````
//! The language token is optional. Fences may be indented; the closing fence
//! must be the first thing on its line, and the opening fence's indent is
//! stripped from every body line that carries it.
//!
//! ## Guarantees
//! - Partial-safe: an unterminated trailing block is never extracted; the
//!   next call on a longer prefix picks it up once its closing fence arrives
//! - Idempotent: re-running on the same text yields the same store
//! - Reconciles by path: existing records keep their id, new ones append
//!
//! ## NOT Responsible For
//! - Fuzzy recovery of malformed declarations (they are simply not matched)
//! - Reporting dropped extensions to the user (logged at debug level only)

use std::borrow::Cow;
use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::files::{extension_of, language_for_path, FileStore, Upsert};

static FILE_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*FILE:[ \t]*(?P<path>[^\n]+?)[ \t]*\r?\n(?:[ \t]*\r?\n)*(?P<indent>[ \t]*)```(?P<lang>[^\s`]*)[^\n]*\n(?P<body>(?s:.*?))^[ \t]*```",
    )
    .expect("FILE block pattern is valid")
});

// ---------------------------------------------------------------------------
// Extension policy
// ---------------------------------------------------------------------------

/// Which file extensions the extractor accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionPolicy {
    /// Every path is accepted.
    #[default]
    Any,
    /// Only paths whose extension is in the set (lowercase, no leading dot).
    AllowList(BTreeSet<String>),
}

impl ExtensionPolicy {
    /// Build an allow-list, normalising `".HTML"` / `"html"` to `"html"`.
    pub fn allow_list<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = extensions
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        ExtensionPolicy::AllowList(set)
    }

    pub fn permits(&self, path: &str) -> bool {
        match self {
            ExtensionPolicy::Any => true,
            ExtensionPolicy::AllowList(set) => {
                extension_of(path).is_some_and(|ext| set.contains(&ext))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Block scanning
// ---------------------------------------------------------------------------

/// One complete `FILE:` block found in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlock<'a> {
    pub path: &'a str,
    /// Explicit fence tag, if the block had one.
    pub tag: Option<&'a str>,
    /// Body with the fence indent removed. Borrowed unless it was indented.
    pub content: Cow<'a, str>,
}

impl FileBlock<'_> {
    /// Explicit tag, else the path's extension, else `plaintext`.
    pub fn language(&self) -> String {
        match self.tag {
            Some(tag) => tag.to_string(),
            None => language_for_path(self.path),
        }
    }
}

/// Every complete block in `text`, in order of appearance.
pub fn scan_blocks(text: &str) -> impl Iterator<Item = FileBlock<'_>> {
    FILE_BLOCK.captures_iter(text).filter_map(|caps| {
        let path = caps.name("path")?.as_str().trim();
        if path.is_empty() {
            return None;
        }
        let tag = caps
            .name("lang")
            .map(|m| m.as_str())
            .filter(|t| !t.is_empty());
        let body = caps.name("body").map(|m| m.as_str()).unwrap_or("");
        let body = body
            .strip_suffix('\n')
            .map(|b| b.strip_suffix('\r').unwrap_or(b))
            .unwrap_or(body);
        let indent = caps.name("indent").map(|m| m.as_str()).unwrap_or("");
        Some(FileBlock {
            path,
            tag,
            content: dedent(body, indent),
        })
    })
}

fn dedent<'a>(body: &'a str, indent: &str) -> Cow<'a, str> {
    if indent.is_empty() {
        return Cow::Borrowed(body);
    }
    let mut out = String::with_capacity(body.len());
    for line in body.split_inclusive('\n') {
        out.push_str(line.strip_prefix(indent).unwrap_or(line));
    }
    Cow::Owned(out)
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// What one extraction pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractOutcome {
    /// True iff at least one accepted block was found, even when every
    /// block rewrote identical content.
    pub changed: bool,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    /// Paths rejected by the extension policy.
    pub skipped: Vec<String>,
}

/// Stateless extractor configured with an [`ExtensionPolicy`].
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    policy: ExtensionPolicy,
}

impl Extractor {
    pub fn new(policy: ExtensionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ExtensionPolicy {
        &self.policy
    }

    /// Reconcile every complete block in `text` into `files` in place.
    pub fn apply(&self, text: &str, files: &mut FileStore) -> ExtractOutcome {
        let mut outcome = ExtractOutcome::default();
        for block in scan_blocks(text) {
            if !self.policy.permits(block.path) {
                tracing::debug!(path = block.path, "dropping block with disallowed extension");
                outcome.skipped.push(block.path.to_string());
                continue;
            }
            match files.upsert(block.path, &block.content, &block.language()) {
                Upsert::Created => {
                    tracing::debug!(path = block.path, "extracted new file");
                    outcome.created.push(block.path.to_string());
                }
                Upsert::Updated => outcome.updated.push(block.path.to_string()),
            }
            outcome.changed = true;
        }
        outcome
    }

    /// Pure form: returns the reconciled collection and the `changed` flag,
    /// leaving `current` untouched.
    pub fn extract(&self, text: &str, current: &FileStore) -> (FileStore, bool) {
        let mut next = current.clone();
        let outcome = self.apply(text, &mut next);
        (next, outcome.changed)
    }
}
