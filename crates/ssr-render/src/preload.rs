//! Preload hints derived from discovered modules and the asset manifest.

use std::collections::HashSet;

use serde_json::Value;
use ssr_core::Manifest;

/// Render `<link>` tags for every asset of the given modules.
///
/// For each asset not yet in `seen`, assets listed under the asset's base
/// name are emitted first, then the asset itself. Paths are deduplicated
/// through `seen`, which callers may reuse across calls. Files with an
/// unknown extension are skipped.
pub fn render_preload_links<'a, I>(modules: I, manifest: &Manifest, seen: &mut HashSet<String>) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut html = String::new();
    for module in modules {
        let Some(files) = manifest.get(module) else {
            continue;
        };
        for file in files {
            if !seen.insert(file.clone()) {
                continue;
            }
            if let Some(deps) = manifest.get(basename(file)) {
                for dep in deps {
                    if seen.insert(dep.clone()) {
                        html.push_str(&render_preload_link(dep));
                    }
                }
            }
            html.push_str(&render_preload_link(file));
        }
    }
    html
}

/// Render the tag for one asset file, or an empty string for an unknown
/// extension.
pub fn render_preload_link(file: &str) -> String {
    let ext = match file.rfind('.') {
        Some(idx) if idx > 0 => &file[idx + 1..],
        _ => return String::new(),
    };

    match ext {
        "js" => format!(r#"<link rel="modulepreload" crossorigin href="{}">"#, file),
        "css" => format!(r#"<link rel="stylesheet" href="{}">"#, file),
        "woff" => format!(
            r#"<link rel="preload" href="{}" as="font" type="font/woff" crossorigin>"#,
            file
        ),
        "woff2" => format!(
            r#"<link rel="preload" href="{}" as="font" type="font/woff2" crossorigin>"#,
            file
        ),
        "gif" => format!(r#"<link rel="preload" href="{}" as="image" type="image/gif">"#, file),
        "jpg" | "jpeg" => format!(
            r#"<link rel="preload" href="{}" as="image" type="image/jpeg">"#,
            file
        ),
        "png" => format!(r#"<link rel="preload" href="{}" as="image" type="image/png">"#, file),
        _ => String::new(),
    }
}

/// Final path component.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Build a manifest from parsed JSON.
///
/// Values that are not arrays are dropped, as are non-string entries.
/// Anything other than an object yields an empty manifest.
pub fn manifest_from_value(value: &Value) -> Manifest {
    let Some(map) = value.as_object() else {
        return Manifest::new();
    };
    map.iter()
        .filter_map(|(module, files)| {
            let files = files.as_array()?;
            let files = files
                .iter()
                .filter_map(|f| f.as_str().map(str::to_string))
                .collect();
            Some((module.clone(), files))
        })
        .collect()
}

/// Parse manifest JSON text.
pub fn parse_manifest(json: &str) -> Result<Manifest, serde_json::Error> {
    let value: Value = serde_json::from_str(json)?;
    Ok(manifest_from_value(&value))
}

/// Load a manifest file. A missing or unreadable file yields `None`.
pub fn load_manifest(path: impl AsRef<std::path::Path>) -> Option<Manifest> {
    let path = path.as_ref();
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "no ssr manifest");
            return None;
        }
    };
    match parse_manifest(&content) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "invalid ssr manifest");
            None
        }
    }
}
