//! # media-range
//!
//! Byte-range streaming of static media files for [`axum`][1].
//!
//! Browsers and media players seek inside audio and video by sending a
//! `Range: bytes=<start>-<end>` header. This crate resolves that header
//! against the size of the file, answers `206 Partial Content` with the
//! matching `Content-Range`/`Content-Length` pair, and streams exactly the
//! requested bytes straight from the file without buffering them.
//!
//! Requests without a `Range` header are answered with
//! `416 Range Not Satisfiable` and files that do not exist with `404`.
//!
//! Two entry points are provided:
//!
//! - [`MediaResponder`] stats, opens and streams a path through any
//!   [`MediaStore`] (the filesystem by default, see [`FsStore`]).
//! - [`Ranged`] answers a range request over any body implementing
//!   [`RangeBody`], such as a [`KnownSize`] wrapped [`tokio::fs::File`].
//!
//! ```
//! use axum::Router;
//! use axum::routing::get;
//! use axum::http::HeaderMap;
//! use axum::http::header::RANGE;
//!
//! use media_range::{KnownSize, Ranged};
//!
//! async fn file(headers: HeaderMap) -> Ranged<KnownSize<tokio::fs::File>> {
//!     let file = tokio::fs::File::open("movie.mp4").await.unwrap();
//!     let body = KnownSize::file(file).await.unwrap();
//!     let range = headers.get(RANGE).and_then(|value| value.to_str().ok());
//!     Ranged::new(range, body, None)
//! }
//!
//! let _app = Router::<()>::new().route("/movie", get(file));
//! ```
//!
//! [1]: https://docs.rs/axum

mod content_type;
mod error;
mod file;
mod range;
mod responder;
mod stream;

pub mod config;
pub mod router;

use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::headers::{AcceptRanges, ContentLength, ContentRange, ContentType};
use axum_extra::TypedHeader;
use mime_guess::Mime;
use tokio::io::{AsyncRead, AsyncSeek};

pub use content_type::ContentTypes;
pub use error::Error;
pub use file::{FsStore, KnownSize};
pub use range::{parse_range, ByteInterval, InvertedRange, RangeError};
pub use responder::MediaResponder;
pub use stream::RangedStream;

/// [`AsyncSeek`] narrowed to only allow seeking from start.
pub trait AsyncSeekStart {
    /// Same semantics as [`AsyncSeek::start_seek`], always passing position as the `SeekFrom::Start` variant.
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()>;

    /// Same semantics as [`AsyncSeek::poll_complete`], returning `()` instead of the new stream position.
    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>>;
}

impl<T: AsyncSeek> AsyncSeekStart for T {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        AsyncSeek::start_seek(self, io::SeekFrom::Start(position))
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncSeek::poll_complete(self, cx).map_ok(|_| ())
    }
}

/// An [`AsyncRead`] and [`AsyncSeekStart`] with a fixed known byte size.
pub trait RangeBody: AsyncRead + AsyncSeekStart {
    /// The total size of the underlying file.
    ///
    /// This should not change for the lifetime of the object once queried.
    /// Behaviour is not guaranteed if it does change.
    fn byte_size(&self) -> u64;
}

/// Where media bytes come from.
///
/// Both methods report a missing file with [`io::ErrorKind::NotFound`], which
/// is answered with 404. Any other error is answered with 500.
#[async_trait::async_trait]
pub trait MediaStore: Send + Sync + 'static {
    type Body: RangeBody + Send + 'static;

    /// Size in bytes of the media at `path`.
    async fn stat(&self, path: &Path) -> io::Result<u64>;

    /// Open the media at `path` for reading, positioned at byte `start`.
    /// `total` is the size reported by [`MediaStore::stat`].
    async fn open(&self, path: &Path, start: u64, total: u64) -> io::Result<Self::Body>;
}

/// Range responder over an already open body. Implements [`IntoResponse`].
///
/// The body is only positioned once the response body is first polled; use
/// [`MediaResponder`] when the source must be known-good before any header
/// is produced.
#[derive(Debug)]
pub struct Ranged<B: RangeBody + Send + 'static> {
    range: Option<String>,
    body: B,
    content_type: Option<Mime>,
    inverted: InvertedRange,
}

impl<B: RangeBody + Send + 'static> Ranged<B> {
    /// Construct a ranged response over any type implementing [`RangeBody`]
    /// and the raw value of the request's `Range` header, if there was one.
    pub fn new(range: Option<&str>, body: B, content_type: Option<Mime>) -> Self {
        Ranged {
            range: range.map(str::to_owned),
            body,
            content_type,
            inverted: InvertedRange::default(),
        }
    }

    /// Choose how a range with its start after its end is treated.
    pub fn inverted(mut self, inverted: InvertedRange) -> Self {
        self.inverted = inverted;
        self
    }

    /// Responds to the request, returning headers and body as
    /// [`RangedResponse`]. Returns [`Error::Range`] if the header was
    /// missing, malformed or not satisfiable.
    pub fn try_respond(self) -> Result<RangedResponse<B>, Error> {
        let total = self.body.byte_size();
        let interval = parse_range(self.range.as_deref(), total, self.inverted)
            .map_err(|source| Error::Range { source, total })?;

        let content_type = self.content_type.unwrap_or(mime_guess::mime::APPLICATION_OCTET_STREAM);
        let stream = RangedStream::new(self.body, interval);
        Ok(RangedResponse::new(interval, total, content_type, stream))
    }
}

impl<B: RangeBody + Send + 'static> IntoResponse for Ranged<B> {
    fn into_response(self) -> Response {
        self.try_respond().into_response()
    }
}

/// Computed headers and body for a `206 Partial Content` response.
/// Implements [`IntoResponse`].
#[derive(Debug)]
pub struct RangedResponse<B> {
    interval: ByteInterval,
    total: u64,
    content_type: Mime,
    stream: RangedStream<B>,
}

impl<B> RangedResponse<B> {
    pub(crate) fn new(
        interval: ByteInterval,
        total: u64,
        content_type: Mime,
        stream: RangedStream<B>,
    ) -> Self {
        RangedResponse { interval, total, content_type, stream }
    }

    pub fn interval(&self) -> ByteInterval {
        self.interval
    }

    /// Size of the whole representation.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn content_type(&self) -> &Mime {
        &self.content_type
    }

    /// The body, without the headers.
    pub fn into_stream(self) -> RangedStream<B> {
        self.stream
    }

    /// `Content-Range: bytes {start}-{end}/{total}`
    pub fn content_range(&self) -> ContentRange {
        ContentRange::bytes(self.interval.start()..self.interval.end_exclusive(), self.total)
            .expect("interval always lies within the representation")
    }

    /// `Content-Length: {end - start + 1}`
    pub fn content_length(&self) -> ContentLength {
        ContentLength(self.interval.len())
    }
}

impl<B: RangeBody + Send + 'static> IntoResponse for RangedResponse<B> {
    fn into_response(self) -> Response {
        let content_range = TypedHeader(self.content_range());
        let content_length = TypedHeader(self.content_length());
        let accept_ranges = TypedHeader(AcceptRanges::bytes());
        let content_type = TypedHeader(ContentType::from(self.content_type));

        (
            StatusCode::PARTIAL_CONTENT,
            content_range,
            content_length,
            accept_ranges,
            content_type,
            self.stream,
        )
            .into_response()
    }
}
