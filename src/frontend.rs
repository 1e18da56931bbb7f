use crate::app::AppState;
use crate::error::AppError;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use percent_encoding::percent_decode_str;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, PartialEq, Eq)]
pub enum AssetPathError {
    /// The request tried to leave the asset root.
    Forbidden,
    NotFound,
    /// The filesystem refused to resolve the path for another reason.
    Unreadable(ErrorKind),
}

fn lookup_error(err: std::io::Error) -> AssetPathError {
    match err.kind() {
        ErrorKind::NotFound | ErrorKind::NotADirectory => AssetPathError::NotFound,
        kind => AssetPathError::Unreadable(kind),
    }
}

/// Content type for a served file. Anything outside the table is served as
/// opaque bytes.
pub fn content_type_for(path: &Path) -> mime::Mime {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("html") => mime::TEXT_HTML_UTF_8,
        Some("css") => mime::TEXT_CSS,
        Some("js") => mime::APPLICATION_JAVASCRIPT,
        Some("png") => mime::IMAGE_PNG,
        Some("jpg") | Some("jpeg") => mime::IMAGE_JPEG,
        Some("gif") => mime::IMAGE_GIF,
        Some("svg") => mime::IMAGE_SVG,
        Some("ico") => "image/x-icon"
            .parse()
            .unwrap_or(mime::APPLICATION_OCTET_STREAM),
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

/// Maps a request path to a relative path under the asset root, refusing
/// anything that could climb out of it.
pub fn relative_asset_path(uri_path: &str) -> Result<PathBuf, AssetPathError> {
    let decoded = percent_decode_str(uri_path)
        .decode_utf8()
        .map_err(|_| AssetPathError::NotFound)?;
    if decoded.contains('\0') || decoded.contains('\\') {
        return Err(AssetPathError::Forbidden);
    }
    let trimmed = decoded.trim_start_matches('/');
    let trimmed = if trimmed.is_empty() || trimmed.ends_with('/') {
        format!("{trimmed}index.html")
    } else {
        trimmed.to_string()
    };

    let mut rel = PathBuf::new();
    for component in Path::new(&trimmed).components() {
        match component {
            Component::Normal(part) => rel.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(AssetPathError::Forbidden);
            }
        }
    }
    Ok(rel)
}

/// Resolves `rel` against `root` on disk. Symlinks that land outside the root
/// are refused.
pub async fn resolve_asset(root: &Path, rel: &Path) -> Result<PathBuf, AssetPathError> {
    let root = tokio::fs::canonicalize(root).await.map_err(lookup_error)?;
    let full = tokio::fs::canonicalize(root.join(rel))
        .await
        .map_err(lookup_error)?;
    if !full.starts_with(&root) {
        return Err(AssetPathError::Forbidden);
    }
    Ok(full)
}

pub async fn frontend_fallback(State(state): State<AppState>, req: Request<Body>) -> Response {
    if req.method() != Method::GET {
        return AppError::not_found().into_response();
    }
    let Some(root) = state.runtime.static_dir.as_deref() else {
        return AppError::not_found().into_response();
    };

    let path = match relative_asset_path(req.uri().path()) {
        Ok(rel) => resolve_asset(root, &rel).await,
        Err(err) => Err(err),
    };
    match path {
        Ok(path) => asset_response(&path).await,
        Err(AssetPathError::Forbidden) => {
            tracing::warn!(path = %req.uri().path(), "refused static path outside asset root");
            AppError::new(StatusCode::FORBIDDEN, "forbidden", "Forbidden").into_response()
        }
        Err(AssetPathError::NotFound) => AppError::not_found().into_response(),
        Err(AssetPathError::Unreadable(kind)) => {
            tracing::error!(path = %req.uri().path(), ?kind, "failed to resolve static path");
            read_failure()
        }
    }
}

fn read_failure() -> Response {
    AppError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "static_read_failed",
        "Internal Server Error",
    )
    .into_response()
}

async fn asset_response(path: &Path) -> Response {
    if tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir()) {
        return AppError::not_found().into_response();
    }
    match tokio::fs::read(path).await {
        Ok(contents) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type_for(path).as_ref())
            .body(Body::from(contents))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(err) if err.kind() == ErrorKind::NotFound => AppError::not_found().into_response(),
        Err(err) => {
            tracing::error!(path = %path.display(), "failed to read static file: {err}");
            read_failure()
        }
    }
}
