//! Server render entry point.

use std::collections::HashSet;

use ssr_core::{RenderContext, RenderPhase, TimingContext};
use ssr_store::StoreError;

use crate::{render_preload_links, App, AppDefinition, RenderError};

/// Render one request to an HTML string.
///
/// Builds a fresh [`App`] bound to `ctx`, resolves the route, runs page
/// setup and the prefetch phase, and renders. On success the context's
/// output slot holds the serialized state, head tags, and, when module
/// collection is enabled, the discovered modules and their preload links.
/// On failure the state is not written.
///
/// The app's cache is empty when this returns.
pub async fn render_to_string(
    def: &AppDefinition,
    ctx: &mut RenderContext,
) -> Result<String, RenderError> {
    let mut timing = TimingContext::new();
    timing.enter(&RenderPhase::Start);

    let mut app = App::server(def, ctx);
    let result = render(&mut app, ctx, &mut timing).await;
    app.data().cache().reset();

    match &result {
        Ok(html) => {
            tracing::debug!(
                url = %ctx.url,
                render_id = ?ctx.render_id,
                bytes = html.len(),
                prefetch_ms = timing.prefetch_time().map(|d| d.as_millis() as u64),
                total_ms = timing.elapsed().as_millis() as u64,
                "render finished"
            );
        }
        Err(err) => {
            timing.enter(&RenderPhase::Error(err.to_string()));
            tracing::debug!(
                url = %ctx.url,
                render_id = ?ctx.render_id,
                error = %err,
                "render failed"
            );
        }
    }
    result
}

async fn render(
    app: &mut App,
    ctx: &mut RenderContext,
    timing: &mut TimingContext,
) -> Result<String, RenderError> {
    let ssr = match app.router_mut().push(&ctx.url) {
        Some(matched) => matched.ssr,
        None => return Err(RenderError::NotFound(ctx.url.clone())),
    };
    if !ssr {
        return Err(RenderError::SsrOff(ctx.url.clone()));
    }
    let Some(page) = app.router().page().cloned() else {
        return Err(RenderError::NotFound(ctx.url.clone()));
    };
    timing.enter(&RenderPhase::RouteResolved);

    let app = &*app;
    if let Some(id) = page.module_id() {
        app.use_module(id);
    }
    page.setup(app).await?;

    let prefetched = app.data().run_prefetch().await?;
    timing.enter(&RenderPhase::PrefetchDone);
    tracing::trace!(url = %ctx.url, tasks = prefetched, "prefetch done");

    let html = page.render(app);
    timing.enter(&RenderPhase::Rendered);

    let meta = app.head().render_tags();
    let state = app.data().cache().serialize_state()?;

    if let Some(collected) = ctx.modules.as_mut() {
        collected.extend(app.modules());
        let modules: Vec<&str> = collected.iter().map(String::as_str).collect();
        let listed = serde_json::to_string(&modules).map_err(StoreError::from)?;

        if let Some(manifest) = &ctx.manifest {
            let mut seen = HashSet::new();
            let links = render_preload_links(modules.iter().copied(), manifest, &mut seen);
            ctx.output.preload_links = Some(links);
        }
        ctx.output.html_modules = Some(listed);
    }
    ctx.output.html_meta = Some(meta);
    ctx.output.html_state = Some(state);
    timing.enter(&RenderPhase::Serialized);

    Ok(html)
}
