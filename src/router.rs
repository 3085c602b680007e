//! HTTP routing: maps `/media/{name}` onto the [`MediaResponder`].

use std::collections::HashMap;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header::RANGE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::{FsStore, MediaResponder, MediaStore};

/// Logical media names and the files they are served from.
///
/// Requests can only reach paths listed here, never arbitrary files.
#[derive(Debug, Clone, Default)]
pub struct MediaLibrary {
    entries: HashMap<String, PathBuf>,
}

impl MediaLibrary {
    pub fn insert(&mut self, name: &str, path: impl Into<PathBuf>) -> &mut Self {
        self.entries.insert(name.to_string(), path.into());
        self
    }

    pub fn resolve(&self, name: &str) -> Option<&FsPath> {
        self.entries.get(name).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct AppState<S = FsStore> {
    pub library: Arc<MediaLibrary>,
    pub responder: Arc<MediaResponder<S>>,
}

impl<S> AppState<S> {
    pub fn new(library: MediaLibrary, responder: MediaResponder<S>) -> Self {
        AppState { library: Arc::new(library), responder: Arc::new(responder) }
    }
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        AppState { library: self.library.clone(), responder: self.responder.clone() }
    }
}

pub fn router<S: MediaStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/media/{name}", get(serve_media::<S>))
        .with_state(state)
}

#[tracing::instrument(skip(state, headers))]
async fn serve_media<S: MediaStore>(
    State(state): State<AppState<S>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(path) = state.library.resolve(&name) else {
        tracing::debug!("no media registered under this name");
        return StatusCode::NOT_FOUND.into_response();
    };

    // a header that is not visible ASCII cannot be a byte range
    let range = headers
        .get(RANGE)
        .map(|value| value.to_str().unwrap_or_default());

    state.responder.respond(path, range).await.into_response()
}
