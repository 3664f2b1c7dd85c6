//! Selection resolver: which file the editor shows and which file drives the
//! live preview. Both are pure functions of the store and the selection.

use crate::files::{FileRecord, FileStore};

pub const INDEX_HTML: &str = "index.html";

/// The file the editor should show.
///
/// An explicit selection wins when it names an existing record. Otherwise:
/// `index.html`, then the first `index.*`, then the first record.
pub fn resolve_editing_target<'a>(
    files: &'a FileStore,
    explicit_id: Option<&str>,
) -> Option<&'a FileRecord> {
    if let Some(selected) = explicit_id.and_then(|id| files.get(id)) {
        return Some(selected);
    }
    if files.is_empty() {
        return None;
    }
    files
        .find_by_path(INDEX_HTML)
        .or_else(|| files.iter().find(|f| f.path.starts_with("index.")))
        .or_else(|| files.iter().next())
}

/// The file that drives the preview: something renderable first, falling
/// back to whatever is being edited.
pub fn resolve_preview_target<'a>(
    files: &'a FileStore,
    editing: Option<&'a FileRecord>,
) -> Option<&'a FileRecord> {
    if files.is_empty() {
        return None;
    }
    files
        .find_by_path(INDEX_HTML)
        .or_else(|| files.iter().find(|f| f.path.ends_with(".html")))
        .or_else(|| {
            files
                .iter()
                .find(|f| f.path.ends_with(".svg") || f.path.ends_with(".md"))
        })
        .or(editing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn store(paths: &[&str]) -> FileStore {
        let mut files = FileStore::new();
        for p in paths {
            files.upsert(p, "", "plaintext");
        }
        files
    }

    #[test]
    fn test_editing_empty_store_is_none() {
        assert!(resolve_editing_target(&FileStore::new(), None).is_none());
    }

    #[test]
    fn test_editing_unknown_selection_on_empty_store_is_none() {
        assert!(resolve_editing_target(&FileStore::new(), Some("ghost")).is_none());
    }

    #[rstest]
    #[case(&["x.js", "index.html"], "index.html")]
    #[case(&["x.js", "index.js", "index.html"], "index.html")]
    #[case(&["x.js", "index.tsx", "index.css"], "index.tsx")]
    #[case(&["b.css", "a.js"], "b.css")]
    #[case(&["src/index.html", "z.md"], "src/index.html")]
    fn test_editing_fallback_order(#[case] paths: &[&str], #[case] expected: &str) {
        let files = store(paths);
        assert_eq!(resolve_editing_target(&files, None).unwrap().path, expected);
    }

    #[test]
    fn test_editing_explicit_selection_wins() {
        let files = store(&["index.html", "notes.txt"]);
        let id = files.find_by_path("notes.txt").unwrap().id.clone();
        assert_eq!(
            resolve_editing_target(&files, Some(&id)).unwrap().path,
            "notes.txt"
        );
    }

    #[test]
    fn test_editing_stale_selection_falls_back() {
        let files = store(&["a.js", "index.html"]);
        assert_eq!(
            resolve_editing_target(&files, Some("deleted-id")).unwrap().path,
            "index.html"
        );
    }

    #[test]
    fn test_preview_empty_store_is_none() {
        assert!(resolve_preview_target(&FileStore::new(), None).is_none());
    }

    #[rstest]
    #[case(&["a.md"], "a.md")]
    #[case(&["notes.svg", "app.js"], "notes.svg")]
    #[case(&["about.html", "index.html"], "index.html")]
    #[case(&["a.md", "about.html"], "about.html")]
    #[case(&["logo.svg", "readme.md"], "logo.svg")]
    fn test_preview_fallback_order(#[case] paths: &[&str], #[case] expected: &str) {
        let files = store(paths);
        assert_eq!(resolve_preview_target(&files, None).unwrap().path, expected);
    }

    #[test]
    fn test_preview_falls_back_to_editing_target() {
        let files = store(&["main.py", "util.py"]);
        let editing = files.find_by_path("util.py");
        assert_eq!(
            resolve_preview_target(&files, editing).unwrap().path,
            "util.py"
        );
    }

    #[test]
    fn test_preview_ignores_editing_when_html_exists() {
        let files = store(&["main.py", "page.html"]);
        let editing = files.find_by_path("main.py");
        assert_eq!(
            resolve_preview_target(&files, editing).unwrap().path,
            "page.html"
        );
    }
}
