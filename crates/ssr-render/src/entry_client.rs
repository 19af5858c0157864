//! Client bootstrap.

use serde_json::Value;

use crate::{App, AppDefinition, RenderError};

/// Marker preceding the injected state in a server-rendered document.
pub const INITIAL_STATE_MARKER: &str = "window.__INITIAL_STATE__ = ";

/// A client app after bootstrap.
#[derive(Debug)]
pub struct MountedApp {
    /// The client instance, kept for the page's lifetime.
    pub app: App,
    /// Markup produced by the matched page.
    pub html: String,
    /// Number of cache entries seeded from injected state.
    pub hydrated: usize,
}

impl MountedApp {
    /// Navigate to another url within the same page session.
    ///
    /// The cache is kept, so data bound before is not fetched again.
    pub async fn navigate(&mut self, url: &str) -> Result<(), RenderError> {
        self.html = mount(&mut self.app, url).await?;
        Ok(())
    }
}

/// Bootstrap a client app.
///
/// Seeds the cache from `injected_state` when present, navigates to
/// `location`, and runs the page so its bindings resolve: data present in
/// the injected state is read from the cache rather than fetched.
pub async fn hydrate(
    def: &AppDefinition,
    origin: &str,
    location: &str,
    injected_state: Option<&str>,
) -> Result<MountedApp, RenderError> {
    let mut app = App::client(def, origin);

    let hydrated = match injected_state {
        Some(state) => app.data().cache().hydrate(state)?,
        None => 0,
    };
    tracing::debug!(location = %location, entries = hydrated, "hydrating");

    let html = mount(&mut app, location).await?;
    Ok(MountedApp {
        app,
        html,
        hydrated,
    })
}

async fn mount(app: &mut App, url: &str) -> Result<String, RenderError> {
    if app.router_mut().push(url).is_none() {
        return Err(RenderError::NotFound(url.to_string()));
    }
    let Some(page) = app.router().page().cloned() else {
        return Err(RenderError::NotFound(url.to_string()));
    };

    let app = &*app;
    page.setup(app).await?;
    Ok(page.render(app))
}

/// Read the injected state out of a server-produced document.
///
/// Returns the JSON text assigned by the `window.__INITIAL_STATE__ = …`
/// script, or `None` when the document has no such script or the value is
/// not valid JSON.
pub fn extract_injected_state(html: &str) -> Option<&str> {
    let start = html.find(INITIAL_STATE_MARKER)? + INITIAL_STATE_MARKER.len();
    let rest = &html[start..];

    let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
    match stream.next() {
        Some(Ok(_)) => Some(rest[..stream.byte_offset()].trim()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AppConfig, Page, RouteTable};
    use async_trait::async_trait;
    use serde_json::json;
    use ssr_fetch::testing::MockTransport;
    use std::sync::Arc;

    struct CountPage;

    #[async_trait]
    impl Page for CountPage {
        async fn setup(&self, app: &App) -> Result<(), RenderError> {
            app.use_async_data("count", |fetch| async move {
                let env = fetch.get("/api/count", json!({})).await?;
                env.field::<u32>("count")
            })
            .await?;
            Ok(())
        }

        fn render(&self, app: &App) -> String {
            let count = app.data().cache().get_data("count").unwrap_or(Value::Null);
            format!("<p>{}</p>", count)
        }
    }

    fn definition(mock: &Arc<MockTransport>) -> AppDefinition {
        AppDefinition::new(
            AppConfig::new("client-test"),
            RouteTable::new().route("/", CountPage).route("/other", CountPage),
            mock.clone(),
        )
    }

    // === Extraction Tests ===

    #[test]
    fn test_extract_injected_state() {
        let html = r#"<head><script>window.__INITIAL_STATE__ = {"k":{"a":"}"}}</script></head>"#;
        assert_eq!(extract_injected_state(html), Some(r#"{"k":{"a":"}"}}"#));
    }

    #[test]
    fn test_extract_injected_state_missing_or_invalid() {
        assert_eq!(extract_injected_state("<html></html>"), None);
        assert_eq!(
            extract_injected_state("<script>window.__INITIAL_STATE__ = <!--app-state--></script>"),
            None
        );
    }

    // === Hydration Tests ===

    #[tokio::test]
    async fn test_hydrate_uses_injected_state() {
        let mock = Arc::new(MockTransport::new().reply("/api/count", 200, json!({"code": 0, "count": 9})));
        let def = definition(&mock);

        let mounted = hydrate(&def, "http://page.local", "/", Some(r#"{"count":3}"#))
            .await
            .unwrap();

        assert_eq!(mounted.hydrated, 1);
        assert_eq!(mounted.html, "<p>3</p>");
        assert_eq!(mock.count("/api/count"), 0);
    }

    #[tokio::test]
    async fn test_hydrate_without_state_fetches_from_origin() {
        let mock = Arc::new(MockTransport::new().reply("/api/count", 200, json!({"code": 0, "count": 9})));
        let def = definition(&mock);

        let mounted = hydrate(&def, "http://page.local", "/", None).await.unwrap();

        assert_eq!(mounted.hydrated, 0);
        assert_eq!(mounted.html, "<p>9</p>");
        assert_eq!(mock.requests()[0].url, "http://page.local/api/count");
    }

    #[tokio::test]
    async fn test_navigate_keeps_cache() {
        let mock = Arc::new(MockTransport::new().reply("/api/count", 200, json!({"code": 0, "count": 1})));
        let def = definition(&mock);

        let mut mounted = hydrate(&def, "http://page.local", "/", None).await.unwrap();
        mounted.navigate("/other").await.unwrap();

        assert_eq!(mounted.html, "<p>1</p>");
        assert_eq!(mock.count("/api/count"), 1);
    }

    #[tokio::test]
    async fn test_hydrate_bad_state_errors() {
        let mock = Arc::new(MockTransport::new());
        let def = definition(&mock);

        let err = hydrate(&def, "http://page.local", "/", Some("[]")).await.unwrap_err();
        assert!(matches!(err, RenderError::State(_)));
    }

    #[tokio::test]
    async fn test_hydrate_unknown_location() {
        let mock = Arc::new(MockTransport::new());
        let def = definition(&mock);

        let err = hydrate(&def, "http://page.local", "/missing", None).await.unwrap_err();
        assert!(matches!(err, RenderError::NotFound(_)));
    }
}
