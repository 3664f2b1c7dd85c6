//! Virtual file store: an ordered, path-addressed collection of file records.
//!
//! ## Guarantees
//! - At most one record per `path` at any instant
//! - Record `id`s are minted once and never change
//! - Order is creation order; updates never move a record
//!
//! ## NOT Responsible For
//! - Real filesystem I/O (the store is purely in-memory; persistence goes
//!   through [`crate::project::ProjectLibrary`])

use serde::{Deserialize, Serialize};

use crate::error::{DevmindError, Result};

/// Language tag used when neither an explicit tag nor an extension is known.
pub const DEFAULT_LANGUAGE: &str = "plaintext";

/// One virtual file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub path: String,
    pub content: String,
    /// Editor/display hint only.
    pub language: String,
}

impl FileRecord {
    /// Build a record with a freshly minted id.
    pub fn new(path: impl Into<String>, content: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            path: path.into(),
            content: content.into(),
            language: language.into(),
        }
    }

    /// Lowercased extension of this record's path, if any.
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.path)
    }

    pub fn has_extension(&self, ext: &str) -> bool {
        self.extension().is_some_and(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// Lowercased extension of `path` (text after the final `.` of the last
/// segment), or `None` for dotless names and dotfiles like `.env`.
pub fn extension_of(path: &str) -> Option<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(0) | None => None,
        Some(i) if i + 1 < name.len() => Some(name[i + 1..].to_ascii_lowercase()),
        Some(_) => None,
    }
}

/// Language hint derived from the path's extension.
pub fn language_for_path(path: &str) -> String {
    extension_of(path).unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())
}

/// Result of [`FileStore::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// An existing record kept its id and had content/language replaced.
    Updated,
    /// A new record was appended.
    Created,
}

/// Ordered collection of [`FileRecord`]s, unique by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileStore {
    records: Vec<FileRecord>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&FileRecord> {
        self.records.iter().find(|f| f.id == id)
    }

    pub fn find_by_path(&self, path: &str) -> Option<&FileRecord> {
        self.records.iter().find(|f| f.path == path)
    }

    pub fn paths(&self) -> Vec<&str> {
        self.records.iter().map(|f| f.path.as_str()).collect()
    }

    /// Replace the record at `path` in place, or append a new one.
    pub fn upsert(&mut self, path: &str, content: &str, language: &str) -> Upsert {
        if let Some(existing) = self.records.iter_mut().find(|f| f.path == path) {
            existing.content = content.to_string();
            existing.language = language.to_string();
            Upsert::Updated
        } else {
            self.records.push(FileRecord::new(path, content, language));
            Upsert::Created
        }
    }

    /// Create an empty file at `path`. Fails if the path is taken.
    pub fn create(&mut self, path: &str) -> Result<&FileRecord> {
        let path = path.trim();
        if path.is_empty() {
            return Err(DevmindError::InvalidPath(path.to_string()));
        }
        if self.find_by_path(path).is_some() {
            return Err(DevmindError::FileExists(path.to_string()));
        }
        self.records
            .push(FileRecord::new(path, String::new(), language_for_path(path)));
        Ok(&self.records[self.records.len() - 1])
    }

    /// Overwrite the content of the record with `id` (a direct user edit).
    pub fn update_content(&mut self, id: &str, content: &str) -> Result<()> {
        let record = self
            .records
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| DevmindError::FileNotFound(id.to_string()))?;
        record.content = content.to_string();
        Ok(())
    }

    /// Move the record with `id` to `new_path`, re-deriving its language.
    pub fn rename(&mut self, id: &str, new_path: &str) -> Result<()> {
        let new_path = new_path.trim();
        if new_path.is_empty() {
            return Err(DevmindError::InvalidPath(new_path.to_string()));
        }
        if self
            .records
            .iter()
            .any(|f| f.path == new_path && f.id != id)
        {
            return Err(DevmindError::FileExists(new_path.to_string()));
        }
        let record = self
            .records
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| DevmindError::FileNotFound(id.to_string()))?;
        record.path = new_path.to_string();
        record.language = language_for_path(new_path);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Result<FileRecord> {
        let idx = self
            .records
            .iter()
            .position(|f| f.id == id)
            .ok_or_else(|| DevmindError::FileNotFound(id.to_string()))?;
        Ok(self.records.remove(idx))
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// File-name listing appended to every turn so the model sees what
    /// exists. Empty when there are no files.
    pub fn manifest(&self) -> String {
        if self.records.is_empty() {
            return String::new();
        }
        let listing = self
            .records
            .iter()
            .map(|f| format!("- {}", f.path))
            .collect::<Vec<_>>()
            .join("\n");
        format!("\n\nCURRENT PROJECT STRUCTURE:\n{}", listing)
    }
}

impl<'a> IntoIterator for &'a FileStore {
    type Item = &'a FileRecord;
    type IntoIter = std::slice::Iter<'a, FileRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl FromIterator<FileRecord> for FileStore {
    fn from_iter<I: IntoIterator<Item = FileRecord>>(iter: I) -> Self {
        let mut store = FileStore::new();
        for record in iter {
            if store.find_by_path(&record.path).is_none() {
                store.records.push(record);
            }
        }
        store
    }
}
