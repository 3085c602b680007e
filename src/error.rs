//! Error-to-HTTP response conversion.

use std::io;
use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::headers::ContentRange;
use axum_extra::TypedHeader;

use crate::RangeError;

/// Everything that can stop a range request from being answered with 206.
///
/// Failures after the response head is sent are not represented here; they
/// surface as `io::Error` items of the [`RangedStream`](crate::RangedStream).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{source} (representation is {total} bytes)")]
    Range { source: RangeError, total: u64 },

    #[error("media not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to stat {}: {source}", path.display())]
    Stat { path: PathBuf, source: io::Error },

    #[error("failed to open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
}

impl Error {
    /// Classify a stat failure, keeping "not found" apart from other I/O errors.
    pub(crate) fn stat(path: PathBuf, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Error::NotFound { path },
            _ => Error::Stat { path, source },
        }
    }

    /// Classify an open failure; the file may have vanished since it was stat'ed.
    pub(crate) fn open(path: PathBuf, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Error::NotFound { path },
            _ => Error::Open { path, source },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Range { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Stat { .. } | Error::Open { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "failed to serve media");
        } else {
            tracing::debug!(status = %status, error = %self, "media request rejected");
        }

        match self {
            Error::Range { total, .. } => {
                let content_range = TypedHeader(ContentRange::unsatisfied_bytes(total));
                (status, content_range).into_response()
            }
            _ => status.into_response(),
        }
    }
}
