use std::path::Path;

use crate::{
    parse_range, ContentTypes, Error, FsStore, InvertedRange, MediaStore, RangedResponse,
    RangedStream,
};

/// Answers range requests for media files held by a [`MediaStore`].
///
/// The order of work is fixed: stat the file, resolve the range against its
/// size, then open it at the first requested byte. A missing file is
/// reported before the range is looked at and before anything is opened,
/// and nothing is handed back until the source is open, so a failure to open
/// never leaves a half-written 206 behind.
#[derive(Debug, Clone)]
pub struct MediaResponder<S = FsStore> {
    store: S,
    content_types: ContentTypes,
    inverted: InvertedRange,
}

impl MediaResponder<FsStore> {
    pub fn new(content_types: ContentTypes) -> Self {
        MediaResponder::with_store(FsStore, content_types)
    }
}

impl<S: MediaStore> MediaResponder<S> {
    pub fn with_store(store: S, content_types: ContentTypes) -> Self {
        MediaResponder { store, content_types, inverted: InvertedRange::default() }
    }

    /// Choose how a range with its start after its end is treated.
    pub fn inverted(mut self, inverted: InvertedRange) -> Self {
        self.inverted = inverted;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolve `range` (the raw `Range` header value) against the file at
    /// `path` and open a stream over the requested bytes.
    #[tracing::instrument(level = "debug", skip(self), err(level = "debug"))]
    pub async fn respond(
        &self,
        path: &Path,
        range: Option<&str>,
    ) -> Result<RangedResponse<S::Body>, Error> {
        let total = self
            .store
            .stat(path)
            .await
            .map_err(|e| Error::stat(path.to_path_buf(), e))?;

        let interval = parse_range(range, total, self.inverted)
            .map_err(|source| Error::Range { source, total })?;

        let content_type = self.content_types.lookup(path);

        let body = self
            .store
            .open(path, interval.start(), total)
            .await
            .map_err(|e| Error::open(path.to_path_buf(), e))?;

        tracing::debug!(%interval, total, %content_type, "streaming media range");

        let stream = RangedStream::positioned(body, interval);
        Ok(RangedResponse::new(interval, total, content_type, stream))
    }
}
