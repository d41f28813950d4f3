//! The outer page that server-rendered bodies are substituted into.

use anyhow::{Context as _, Result};
use hula_core::ContextSnapshot;
use std::path::Path;

/// Placeholder for the rendered body.
pub const CONTENT: &str = "{{content}}";

/// Placeholder for the serialized context snapshot.
pub const CONTEXT: &str = "{{context}}";

const DEFAULT_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>hula</title>
</head>
<body>
{{content}}
<script type="application/json" id="hula-context">{{context}}</script>
</body>
</html>
"#;

/// An html page with `{{content}}` and `{{context}}` placeholders.
#[derive(Debug, Clone)]
pub struct PageTemplate {
    source: String,
}

impl PageTemplate {
    /// Use the given template text.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Load `index.html` from a webroot, or the built-in page without one.
    ///
    /// # Errors
    ///
    /// Returns an error if the webroot is set but its `index.html` cannot be
    /// read.
    pub fn load(webroot: Option<&Path>) -> Result<Self> {
        let Some(webroot) = webroot else {
            return Ok(Self::default());
        };

        let path = webroot.join("index.html");
        let source = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read page template: {}", path.display()))?;
        Ok(Self::new(source))
    }

    /// Substitute a rendered body and context snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be serialized.
    pub fn fill(&self, content: &str, snapshot: &ContextSnapshot) -> Result<String> {
        let context = serde_json::to_string(snapshot)
            .context("Failed to serialize context")?
            .replace("</", "<\\/");

        Ok(self
            .source
            .replace(CONTENT, content)
            .replace(CONTEXT, &context))
    }
}

impl Default for PageTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hula_core::Context;
    use serde_json::json;

    #[test]
    fn test_fill_substitutes_both_placeholders() {
        let page = PageTemplate::new("<body>{{content}}</body><i>{{context}}</i>");
        let mut state = serde_json::Map::new();
        state.insert("q".to_string(), json!(1));
        let context = Context::with_state(state);

        let html = page.fill("<p>hi</p>", &context.snapshot()).unwrap();
        assert_eq!(
            html,
            r#"<body><p>hi</p></body><i>{"state":{"q":1},"components":{}}</i>"#
        );
    }

    #[test]
    fn test_context_cannot_close_script() {
        let mut state = serde_json::Map::new();
        state.insert("q".to_string(), json!("</script><b>"));
        let context = Context::with_state(state);

        let html = PageTemplate::default().fill("", &context.snapshot()).unwrap();
        assert!(!html.contains("</script><b>"));
        assert!(html.contains(r#"<\/script><b>"#));
    }

    #[test]
    fn test_load_without_webroot_uses_default() {
        let page = PageTemplate::load(None).unwrap();
        assert!(page.source.contains(CONTENT));
        assert!(PageTemplate::load(Some(Path::new("/nonexistent/hula"))).is_err());
    }
}
