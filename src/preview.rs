//! # Stage: Preview Compositor
//!
//! ## Responsibility
//! Turn the chosen preview file plus the whole file store into one renderable
//! document. HTML targets get every stylesheet inlined before `</head>` and
//! every script inlined before `</body>`, one tagged block per source file.
//!
//! ## Guarantees
//! - Pure: the same `(target, files)` always yields the same document
//! - Per-file identity: each injected block carries `data-filename`
//!
//! ## NOT Responsible For
//! - Markdown rendering (markdown is returned verbatim)
//! - Executing or sandboxing anything

use serde::{Deserialize, Serialize};

use crate::files::{FileRecord, FileStore};

/// A composed preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewDocument {
    /// A full HTML document with dependencies inlined.
    Html(String),
    /// Raw SVG markup.
    Svg(String),
    /// Raw markdown, shown as plain text.
    Markdown(String),
    /// No target, or a target type that cannot be previewed.
    Unavailable,
}

impl PreviewDocument {
    pub fn is_available(&self) -> bool {
        !matches!(self, PreviewDocument::Unavailable)
    }

    /// Document body, or `None` when unavailable.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PreviewDocument::Html(s) | PreviewDocument::Svg(s) | PreviewDocument::Markdown(s) => {
                Some(s)
            }
            PreviewDocument::Unavailable => None,
        }
    }
}

/// Compositor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Extensions (no dot) whose files are injected as scripts.
    pub script_extensions: Vec<String>,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            script_extensions: vec!["js".to_string(), "ts".to_string()],
        }
    }
}

/// Builds [`PreviewDocument`]s.
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    config: PreviewConfig,
}

impl Compositor {
    pub fn new(config: PreviewConfig) -> Self {
        Self { config }
    }

    pub fn compose(&self, target: Option<&FileRecord>, files: &FileStore) -> PreviewDocument {
        let Some(target) = target else {
            return PreviewDocument::Unavailable;
        };
        if target.path.ends_with(".html") {
            PreviewDocument::Html(self.compose_html(&target.content, files))
        } else if target.path.ends_with(".svg") {
            PreviewDocument::Svg(target.content.clone())
        } else if target.path.ends_with(".md") {
            PreviewDocument::Markdown(target.content.clone())
        } else {
            PreviewDocument::Unavailable
        }
    }

    fn is_script(&self, file: &FileRecord) -> bool {
        self.config
            .script_extensions
            .iter()
            .any(|ext| file.path.ends_with(&format!(".{}", ext)))
    }

    fn compose_html(&self, html: &str, files: &FileStore) -> String {
        let styles: Vec<String> = files
            .iter()
            .filter(|f| f.path.ends_with(".css"))
            .map(|f| tagged_block("style", f))
            .collect();
        let scripts: Vec<String> = files
            .iter()
            .filter(|f| self.is_script(f))
            .map(|f| tagged_block("script", f))
            .collect();

        let mut doc = html.to_string();
        if !styles.is_empty() {
            let styles = styles.join("\n");
            doc = match find_ascii_ci(&doc, "</head>") {
                Some(at) => splice(&doc, at, &format!("{}\n", styles)),
                None => format!("{}{}", styles, doc),
            };
        }
        if !scripts.is_empty() {
            let scripts = scripts.join("\n");
            doc = match find_ascii_ci(&doc, "</body>") {
                Some(at) => splice(&doc, at, &format!("{}\n", scripts)),
                None => format!("{}{}", doc, scripts),
            };
        }
        doc
    }
}

fn tagged_block(tag: &str, file: &FileRecord) -> String {
    format!(
        "<{tag} data-filename=\"{}\">{}</{tag}>",
        escape_attr(&file.path),
        file.content
    )
}

fn splice(doc: &str, at: usize, insert: &str) -> String {
    let mut out = String::with_capacity(doc.len() + insert.len());
    out.push_str(&doc[..at]);
    out.push_str(insert);
    out.push_str(&doc[at..]);
    out
}

/// Byte offset of the first ASCII-case-insensitive occurrence of `needle`.
fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    // ASCII lowercasing keeps byte offsets aligned with the original.
    haystack.to_ascii_lowercase().find(&needle.to_ascii_lowercase())
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(entries: &[(&str, &str)]) -> FileStore {
        let mut files = FileStore::new();
        for (path, content) in entries {
            files.upsert(path, content, "plaintext");
        }
        files
    }

    fn compose_path(files: &FileStore, path: &str) -> PreviewDocument {
        Compositor::default().compose(files.find_by_path(path), files)
    }

    #[test]
    fn test_no_target_is_unavailable() {
        let doc = Compositor::default().compose(None, &FileStore::new());
        assert_eq!(doc, PreviewDocument::Unavailable);
        assert!(doc.as_str().is_none());
    }

    #[test]
    fn test_unrenderable_target_is_unavailable() {
        let files = store(&[("main.py", "print(1)")]);
        assert_eq!(compose_path(&files, "main.py"), PreviewDocument::Unavailable);
    }

    #[test]
    fn test_html_injection_round_trip() {
        let files = store(&[
            ("index.html", "<html><head></head><body></body></html>"),
            ("style.css", "body{color:red}"),
            ("app.js", "console.log(1)"),
        ]);
        let PreviewDocument::Html(doc) = compose_path(&files, "index.html") else {
            panic!("expected html");
        };
        assert!(doc.starts_with("<html>"));
        assert!(doc.ends_with("</html>"));
        let style = doc.find("body{color:red}").unwrap();
        let head_close = doc.find("</head>").unwrap();
        let script = doc.find("console.log(1)").unwrap();
        let body_close = doc.find("</body>").unwrap();
        assert!(style < head_close);
        assert!(head_close < script);
        assert!(script < body_close);
        assert!(doc.contains("<style data-filename=\"style.css\">body{color:red}</style>"));
        assert!(doc.contains("<script data-filename=\"app.js\">console.log(1)</script>"));
    }

    #[test]
    fn test_each_file_gets_its_own_block_in_store_order() {
        let files = store(&[
            ("b.css", "B"),
            ("index.html", "<head></head><body></body>"),
            ("a.css", "A"),
        ]);
        let doc = compose_path(&files, "index.html");
        let doc = doc.as_str().unwrap();
        assert_eq!(doc.matches("<style").count(), 2);
        let b = doc.find("data-filename=\"b.css\"").unwrap();
        let a = doc.find("data-filename=\"a.css\"").unwrap();
        assert!(b < a);
    }

    #[test]
    fn test_missing_head_prepends_styles() {
        let files = store(&[("index.html", "<p>hi</p>"), ("s.css", "p{}")]);
        let doc = compose_path(&files, "index.html");
        assert!(doc.as_str().unwrap().starts_with("<style data-filename=\"s.css\">p{}</style><p>hi</p>"));
    }

    #[test]
    fn test_missing_body_appends_scripts() {
        let files = store(&[("index.html", "<p>hi</p>"), ("x.ts", "let a=1")]);
        let doc = compose_path(&files, "index.html");
        assert!(doc.as_str().unwrap().ends_with("<p>hi</p><script data-filename=\"x.ts\">let a=1</script>"));
    }

    #[test]
    fn test_no_dependencies_leaves_html_verbatim() {
        let html = "<html><head></head><body>x</body></html>";
        let files = store(&[("index.html", html)]);
        assert_eq!(compose_path(&files, "index.html"), PreviewDocument::Html(html.to_string()));
    }

    #[test]
    fn test_uppercase_markers_are_found() {
        let files = store(&[("index.html", "<HEAD></HEAD><BODY></BODY>"), ("s.css", "S")]);
        let doc = compose_path(&files, "index.html");
        assert_eq!(
            doc.as_str().unwrap(),
            "<HEAD><style data-filename=\"s.css\">S</style>\n</HEAD><BODY></BODY>"
        );
    }

    #[test]
    fn test_custom_script_extensions() {
        let compositor = Compositor::new(PreviewConfig {
            script_extensions: vec!["py".to_string()],
        });
        let files = store(&[("index.html", "<body></body>"), ("a.js", "js"), ("m.py", "py")]);
        let doc = compositor.compose(files.find_by_path("index.html"), &files);
        let doc = doc.as_str().unwrap();
        assert!(doc.contains("data-filename=\"m.py\""));
        assert!(!doc.contains("data-filename=\"a.js\""));
    }

    #[test]
    fn test_data_filename_is_escaped() {
        let files = store(&[("index.html", ""), ("we\"ird.css", "x")]);
        let doc = compose_path(&files, "index.html");
        assert!(doc.as_str().unwrap().contains("data-filename=\"we&quot;ird.css\""));
    }

    #[test]
    fn test_svg_and_markdown_verbatim() {
        let files = store(&[("logo.svg", "<svg/>"), ("a.md", "# T")]);
        assert_eq!(compose_path(&files, "logo.svg"), PreviewDocument::Svg("<svg/>".into()));
        assert_eq!(compose_path(&files, "a.md"), PreviewDocument::Markdown("# T".into()));
    }

    #[test]
    fn test_compose_is_deterministic() {
        let files = store(&[("index.html", "<head></head>"), ("a.css", "a")]);
        assert_eq!(compose_path(&files, "index.html"), compose_path(&files, "index.html"));
    }
}
