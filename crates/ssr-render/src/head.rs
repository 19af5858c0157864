//! Head metadata collected while a page sets up.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Head content for one app instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadContent {
    /// Page title.
    pub title: Option<String>,
    /// Meta tags.
    pub meta: Vec<(String, String)>,
    /// Link tags (stylesheets, etc.).
    pub links: Vec<String>,
    /// Inline scripts in head.
    pub scripts: Vec<String>,
}

impl HeadContent {
    /// Render head content to HTML.
    pub fn render(&self) -> String {
        let mut html = String::new();

        if let Some(title) = &self.title {
            html.push_str(&format!("<title>{}</title>\n", escape_text(title)));
        }

        for (name, content) in &self.meta {
            html.push_str(&format!(
                r#"<meta name="{}" content="{}">"#,
                escape_attr(name),
                escape_attr(content)
            ));
            html.push('\n');
        }

        for link in &self.links {
            html.push_str(link);
            html.push('\n');
        }

        for script in &self.scripts {
            html.push_str(&format!("<script>{}</script>\n", escape_script(script)));
        }

        html
    }
}

/// Head manager shared by everything rendering into one app.
///
/// Pages hold `&App` while setting up, so updates go through `&self`.
#[derive(Debug, Clone, Default)]
pub struct HeadManager {
    content: Arc<Mutex<HeadContent>>,
}

impl HeadManager {
    /// Create an empty head manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a head manager with a default title.
    pub fn with_title(title: impl Into<String>) -> Self {
        let head = Self::new();
        head.set_title(title);
        head
    }

    fn content(&self) -> MutexGuard<'_, HeadContent> {
        self.content.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the page title, replacing any earlier one.
    pub fn set_title(&self, title: impl Into<String>) {
        self.content().title = Some(title.into());
    }

    /// Add a meta tag.
    pub fn add_meta(&self, name: &str, content: &str) {
        self.content()
            .meta
            .push((name.to_string(), content.to_string()));
    }

    /// Add a stylesheet link.
    pub fn add_stylesheet(&self, href: &str) {
        self.content().links.push(format!(
            r#"<link rel="stylesheet" href="{}">"#,
            escape_attr(href)
        ));
    }

    /// Add an inline script.
    pub fn add_script(&self, script: impl Into<String>) {
        self.content().scripts.push(script.into());
    }

    /// Copy of the collected content.
    pub fn snapshot(&self) -> HeadContent {
        self.content().clone()
    }

    /// Render all collected tags.
    pub fn render_tags(&self) -> String {
        self.content().render()
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

/// Break up sequences that would end the inline script element or open an
/// HTML comment inside it. `<\/` and `<\!` mean the same thing in JS strings.
fn escape_script(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(i) = rest.find('<') {
        out.push_str(&rest[..i]);
        let tail = &rest[i + 1..];
        let closes = tail
            .get(..7)
            .is_some_and(|t| t.eq_ignore_ascii_case("/script"));
        if closes {
            out.push_str("<\\/");
            rest = &tail[1..];
        } else if tail.starts_with("!--") {
            out.push_str("<\\!");
            rest = &tail[1..];
        } else {
            out.push('<');
            rest = tail;
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_tags_order() {
        let head = HeadManager::with_title("Home");
        head.add_meta("description", "Demo page");
        head.add_stylesheet("/assets/app.css");
        head.add_script("window.x = 1");

        assert_eq!(
            head.render_tags(),
            "<title>Home</title>\n\
             <meta name=\"description\" content=\"Demo page\">\n\
             <link rel=\"stylesheet\" href=\"/assets/app.css\">\n\
             <script>window.x = 1</script>\n"
        );
    }

    #[test]
    fn test_set_title_replaces() {
        let head = HeadManager::with_title("Default");
        head.set_title("Page");
        assert_eq!(head.snapshot().title.as_deref(), Some("Page"));
    }

    #[test]
    fn test_escapes_values() {
        let head = HeadManager::new();
        head.set_title("a < b");
        head.add_meta("q", "say \"hi\"");

        let tags = head.render_tags();
        assert!(tags.contains("<title>a &lt; b</title>"));
        assert!(tags.contains("content=\"say &quot;hi&quot;\""));
    }

    #[test]
    fn test_inline_script_cannot_close_element() {
        let head = HeadManager::new();
        head.add_script(r#"var s = "</script><script>alert(1)</SCRIPT >"; if (a < b) {}"#);
        head.add_script("var c = '<!-- x';");

        let tags = head.render_tags();
        assert_eq!(tags.matches("</script>").count(), 2);
        assert!(tags.contains(r#"var s = "<\/script><script>alert(1)<\/SCRIPT >";"#));
        assert!(tags.contains("if (a < b) {}"));
        assert!(tags.contains(r"var c = '<\!-- x';"));
    }

    #[test]
    fn test_clones_share_content() {
        let head = HeadManager::new();
        head.clone().set_title("Shared");
        assert_eq!(head.snapshot().title.as_deref(), Some("Shared"));
    }

    #[test]
    fn test_empty_renders_nothing() {
        assert_eq!(HeadManager::new().render_tags(), "");
    }
}
