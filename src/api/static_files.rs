//! Static UI assets served from `static_dir`
//!
//! Only files with a web extension are served. Everything else in the root
//! directory (the filtering program, its config, logs and the state file)
//! stays private even though it lives next to the UI.

use super::response::{self, ApiResponse};
use hyper::StatusCode;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extension → Content-Type for servable assets
const CONTENT_TYPES: &[(&str, &str)] = &[
    ("html", "text/html; charset=utf-8"),
    ("css", "text/css; charset=utf-8"),
    ("js", "text/javascript; charset=utf-8"),
    ("mjs", "text/javascript; charset=utf-8"),
    ("map", "application/json"),
    ("svg", "image/svg+xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("ico", "image/x-icon"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("txt", "text/plain; charset=utf-8"),
];

pub fn content_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    CONTENT_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, ct)| *ct)
}

/// Maps a request path onto a file under `root`.
///
/// Rejects traversal, hidden files and non-web extensions.
pub fn resolve(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = request_path.trim_start_matches('/');
    if relative.is_empty() || relative.contains('\\') {
        return None;
    }

    let mut resolved = root.to_path_buf();
    for segment in relative.split('/') {
        if segment.is_empty() || segment.starts_with('.') {
            return None;
        }
        resolved.push(segment);
    }

    content_type(&resolved)?;
    Some(resolved)
}

/// Serves `request_path` from `root`, or 404.
pub async fn serve(root: &Path, request_path: &str) -> ApiResponse {
    let Some(path) = resolve(root, request_path) else {
        return not_found();
    };
    serve_file(&path).await
}

pub async fn serve_file(path: &Path) -> ApiResponse {
    let Some(content_type) = content_type(path) else {
        return not_found();
    };
    match tokio::fs::read(path).await {
        Ok(body) => response::bytes(StatusCode::OK, content_type, body),
        Err(e) => {
            debug!("Static asset {path:?} unavailable: {e}");
            not_found()
        }
    }
}

fn not_found() -> ApiResponse {
    response::bytes(StatusCode::NOT_FOUND, "text/plain; charset=utf-8", "Not Found")
}
