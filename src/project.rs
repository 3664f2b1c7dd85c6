//! Projects and the persistent project library.
//!
//! The whole library lives under one key as a JSON array, written sorted by
//! `last_modified_ms` descending. Unreadable data is discarded in favour of a
//! single fresh project; a bad store is never fatal.

use serde::{Deserialize, Serialize};

use crate::conversation::Message;
use crate::error::Result;
use crate::files::FileStore;
use crate::store::KeyValueStore;

pub const DEFAULT_PROJECT_NAME: &str = "Untitled Project";
pub const DEFAULT_STORAGE_KEY: &str = "devmind_projects";

/// A named workspace that exclusively owns its files and messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub files: FileStore,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub last_modified_ms: u64,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let name = match name.trim() {
            "" => DEFAULT_PROJECT_NAME.to_string(),
            trimmed => trimmed.to_string(),
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            files: FileStore::new(),
            messages: Vec::new(),
            last_modified_ms: crate::now_ms(),
        }
    }

    /// Mark the project as modified now. Never moves the timestamp backwards.
    pub fn touch(&mut self) {
        self.last_modified_ms = self.last_modified_ms.max(crate::now_ms());
    }
}

impl Default for Project {
    fn default() -> Self {
        Project::new(DEFAULT_PROJECT_NAME)
    }
}

/// Loads and saves every project through a [`KeyValueStore`].
pub struct ProjectLibrary {
    store: Box<dyn KeyValueStore>,
    key: String,
}

impl ProjectLibrary {
    pub fn new(store: Box<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The most recently modified project and the rest, newest first.
    ///
    /// A missing, empty or corrupt library yields a fresh default project.
    pub fn load(&self) -> (Project, Vec<Project>) {
        let raw = match self.store.get(&self.key) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "project store unreadable, starting fresh");
                None
            }
        };
        let mut projects = match raw {
            Some(raw) => match serde_json::from_str::<Vec<Project>>(&raw) {
                Ok(projects) => projects,
                Err(e) => {
                    tracing::warn!(error = %e, "stored projects are corrupt, starting fresh");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        sort_recent_first(&mut projects);
        let mut projects = projects.into_iter();
        let active = projects.next().unwrap_or_default();
        (active, projects.collect())
    }

    /// Write `active` together with `others`, most recent first.
    pub fn save(&self, active: &Project, others: &[Project]) -> Result<()> {
        let mut all: Vec<&Project> = Vec::with_capacity(others.len() + 1);
        all.push(active);
        all.extend(others.iter());
        all.sort_by(|a, b| b.last_modified_ms.cmp(&a.last_modified_ms));
        let json = serde_json::to_string(&all)?;
        self.store.set(&self.key, &json)
    }
}

pub fn sort_recent_first(projects: &mut [Project]) {
    projects.sort_by(|a, b| b.last_modified_ms.cmp(&a.last_modified_ms));
}
