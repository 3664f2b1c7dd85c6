//! Project-scoped workspace: the surface a front end drives.
//!
//! ## Design
//! - Exactly one active [`Project`]; the rest are held dormant
//! - Switching, creating or deleting the active project resets the
//!   collaborator session so no session outlives the files it was grounded on
//! - Every mutation touches `last_modified_ms` and writes the library back;
//!   during a turn the library is written after every fragment
//! - Editing and preview targets are derived on demand, never cached

use crate::conversation::{Conversation, Message, SessionState, TurnReport};
use crate::error::{DevmindError, Result};
use crate::extract::Extractor;
use crate::files::{FileRecord, FileStore};
use crate::preview::{Compositor, PreviewDocument};
use crate::project::{sort_recent_first, Project, ProjectLibrary};
use crate::providers::CompletionClient;
use crate::select::{resolve_editing_target, resolve_preview_target};

pub struct Workspace<C: CompletionClient> {
    library: ProjectLibrary,
    active: Project,
    dormant: Vec<Project>,
    conversation: Conversation<C>,
    extractor: Extractor,
    compositor: Compositor,
    selected_file: Option<String>,
    preview_revision: u64,
}

impl<C: CompletionClient> Workspace<C> {
    /// Load the library and activate its most recently modified project.
    pub fn open(
        library: ProjectLibrary,
        conversation: Conversation<C>,
        extractor: Extractor,
        compositor: Compositor,
    ) -> Self {
        let (active, dormant) = library.load();
        tracing::info!(project = %active.name, total = dormant.len() + 1, "workspace opened");
        Self {
            library,
            active,
            dormant,
            conversation,
            extractor,
            compositor,
            selected_file: None,
            preview_revision: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn active_project(&self) -> &Project {
        &self.active
    }

    /// Every project, most recently modified first.
    pub fn projects(&self) -> Vec<&Project> {
        let mut all: Vec<&Project> = std::iter::once(&self.active).chain(self.dormant.iter()).collect();
        all.sort_by(|a, b| b.last_modified_ms.cmp(&a.last_modified_ms));
        all
    }

    pub fn find_project_by_name(&self, name: &str) -> Option<&Project> {
        self.projects().into_iter().find(|p| p.name == name)
    }

    pub fn files(&self) -> &FileStore {
        &self.active.files
    }

    pub fn messages(&self) -> &[Message] {
        &self.active.messages
    }

    pub fn selected_file_id(&self) -> Option<&str> {
        self.selected_file.as_deref()
    }

    pub fn editing_file(&self) -> Option<&FileRecord> {
        resolve_editing_target(&self.active.files, self.selected_file.as_deref())
    }

    pub fn preview_file(&self) -> Option<&FileRecord> {
        resolve_preview_target(&self.active.files, self.editing_file())
    }

    pub fn preview(&self) -> PreviewDocument {
        self.compositor.compose(self.preview_file(), &self.active.files)
    }

    /// Bumped by [`Workspace::refresh_preview`]; views key their render on it.
    pub fn preview_revision(&self) -> u64 {
        self.preview_revision
    }

    /// Ask views to re-render the preview. The document itself is unchanged.
    pub fn refresh_preview(&mut self) -> u64 {
        self.preview_revision += 1;
        self.preview_revision
    }

    pub fn session_state(&self) -> SessionState {
        self.conversation.state()
    }

    pub fn conversation(&self) -> &Conversation<C> {
        &self.conversation
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    // -----------------------------------------------------------------------
    // Turns
    // -----------------------------------------------------------------------

    /// Send `text` to the collaborator. `on_fragment` sees each raw fragment
    /// after the workspace has absorbed it.
    pub async fn send_turn<F>(&mut self, text: &str, mut on_fragment: F) -> Result<TurnReport>
    where
        F: FnMut(&str),
    {
        let library = &self.library;
        let dormant = &self.dormant;
        let result = self
            .conversation
            .send_turn(&mut self.active, &self.extractor, text, |progress| {
                on_fragment(progress.fragment);
                write_back(library, progress.project, dormant);
            })
            .await;
        self.persist();
        result
    }

    // -----------------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------------

    /// Create an empty file and select it. Returns its id.
    pub fn create_file(&mut self, path: &str) -> Result<String> {
        let id = self.active.files.create(path)?.id.clone();
        self.selected_file = Some(id.clone());
        self.after_mutation();
        Ok(id)
    }

    pub fn update_file(&mut self, id: &str, content: &str) -> Result<()> {
        self.active.files.update_content(id, content)?;
        self.after_mutation();
        Ok(())
    }

    pub fn rename_file(&mut self, id: &str, new_path: &str) -> Result<()> {
        if new_path.trim().is_empty() {
            return Ok(());
        }
        self.active.files.rename(id, new_path)?;
        self.after_mutation();
        Ok(())
    }

    pub fn delete_file(&mut self, id: &str) -> Result<FileRecord> {
        let removed = self.active.files.remove(id)?;
        if self.selected_file.as_deref() == Some(id) {
            self.selected_file = None;
        }
        self.after_mutation();
        Ok(removed)
    }

    pub fn select_file(&mut self, id: Option<&str>) {
        self.selected_file = id.map(str::to_string);
    }

    /// Select `id`, or clear the selection if it is already selected.
    pub fn toggle_select(&mut self, id: &str) {
        if self.selected_file.as_deref() == Some(id) {
            self.selected_file = None;
        } else {
            self.selected_file = Some(id.to_string());
        }
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    /// Create a project and make it active. Returns its id.
    pub fn create_project(&mut self, name: &str) -> String {
        let project = Project::new(name);
        let id = project.id.clone();
        let previous = std::mem::replace(&mut self.active, project);
        self.dormant.push(previous);
        self.on_project_changed();
        self.persist();
        id
    }

    pub fn switch_project(&mut self, id: &str) -> Result<()> {
        if self.active.id == id {
            return Ok(());
        }
        let idx = self
            .dormant
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| DevmindError::ProjectNotFound(id.to_string()))?;
        let next = self.dormant.remove(idx);
        let previous = std::mem::replace(&mut self.active, next);
        self.dormant.push(previous);
        self.on_project_changed();
        self.persist();
        Ok(())
    }

    pub fn rename_project(&mut self, id: &str, name: &str) -> Result<()> {
        let name = name.trim();
        let project = if self.active.id == id {
            &mut self.active
        } else {
            self.dormant
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| DevmindError::ProjectNotFound(id.to_string()))?
        };
        if !name.is_empty() {
            project.name = name.to_string();
            project.touch();
        }
        self.persist();
        Ok(())
    }

    /// Delete a project. Deleting the active one activates the most recent
    /// remaining project, or a fresh default when none remain.
    pub fn delete_project(&mut self, id: &str) -> Result<()> {
        if self.active.id == id {
            sort_recent_first(&mut self.dormant);
            let next = if self.dormant.is_empty() {
                Project::default()
            } else {
                self.dormant.remove(0)
            };
            let removed = std::mem::replace(&mut self.active, next);
            tracing::info!(project = %removed.name, "active project deleted");
            self.on_project_changed();
        } else {
            let idx = self
                .dormant
                .iter()
                .position(|p| p.id == id)
                .ok_or_else(|| DevmindError::ProjectNotFound(id.to_string()))?;
            self.dormant.remove(idx);
        }
        self.persist();
        Ok(())
    }

    /// Wipe the active project's messages and files and start a new session.
    pub fn clear(&mut self) {
        self.active.messages.clear();
        self.active.files.clear();
        self.selected_file = None;
        self.conversation.reset_session();
        self.after_mutation();
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn on_project_changed(&mut self) {
        self.selected_file = None;
        self.conversation.reset_session();
    }

    fn after_mutation(&mut self) {
        self.active.touch();
        self.persist();
    }

    fn persist(&self) {
        write_back(&self.library, &self.active, &self.dormant);
    }
}

fn write_back(library: &ProjectLibrary, active: &Project, dormant: &[Project]) {
    if let Err(e) = library.save(active, dormant) {
        tracing::warn!(error = %e, "failed to persist projects");
    }
}
