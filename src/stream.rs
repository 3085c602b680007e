use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use pin_project::pin_project;
use tokio::io::ReadBuf;

use crate::{ByteInterval, RangeBody};

const IO_BUFFER_SIZE: usize = 64 * 1024;

/// Response body stream bounded to one [`ByteInterval`].
/// Implements [`Stream`], [`Body`], and [`IntoResponse`].
///
/// Bytes are only read when the stream is polled, at most 64 KiB
/// at a time, so a slow client throttles the reads. The underlying body is
/// dropped as soon as the interval is exhausted or a read fails; after an
/// error the stream yields nothing more.
#[pin_project]
pub struct RangedStream<B> {
    state: StreamState,
    length: u64,
    remaining: u64,
    buffer: BytesMut,
    #[pin]
    body: Option<B>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Seek { start: u64 },
    Seeking,
    Reading,
    Done,
}

impl<B: RangeBody> RangedStream<B> {
    /// Stream `interval` out of `body`, seeking to its start on first poll.
    pub(crate) fn new(body: B, interval: ByteInterval) -> Self {
        Self::with_state(body, interval, StreamState::Seek { start: interval.start() })
    }

    /// Stream `interval` out of a `body` already positioned at its start.
    pub(crate) fn positioned(body: B, interval: ByteInterval) -> Self {
        Self::with_state(body, interval, StreamState::Reading)
    }

    fn with_state(body: B, interval: ByteInterval, state: StreamState) -> Self {
        RangedStream {
            state,
            length: interval.len(),
            remaining: interval.len(),
            buffer: BytesMut::new(),
            body: Some(body),
        }
    }
}

impl<B> RangedStream<B> {
    /// Total number of bytes this stream delivers.
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Bytes not yet delivered.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Whether the underlying body has been released.
    pub fn is_released(&self) -> bool {
        self.body.is_none()
    }
}

impl<B> fmt::Debug for RangedStream<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangedStream")
            .field("state", &self.state)
            .field("length", &self.length)
            .field("remaining", &self.remaining)
            .finish()
    }
}

impl<B: RangeBody + Send + 'static> IntoResponse for RangedStream<B> {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl<B: RangeBody> Body for RangedStream<B> {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.remaining)
    }

    fn is_end_stream(&self) -> bool {
        self.state == StreamState::Done
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<io::Result<Frame<Bytes>>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

/// Drop the body and refuse any further polling.
fn release<B>(state: &mut StreamState, mut body: Pin<&mut Option<B>>) {
    *state = StreamState::Done;
    body.set(None);
}

impl<B: RangeBody> Stream for RangedStream<B> {
    type Item = io::Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>
    ) -> Poll<Option<io::Result<Bytes>>> {
        let mut this = self.project();

        loop {
            let Some(body) = this.body.as_mut().as_pin_mut() else {
                return Poll::Ready(None);
            };

            match *this.state {
                StreamState::Done => {
                    return Poll::Ready(None);
                }

                StreamState::Seek { start } => match body.start_seek(start) {
                    Err(e) => {
                        tracing::warn!(start, error = %e, "seeking media source failed");
                        release(this.state, this.body.as_mut());
                        return Poll::Ready(Some(Err(e)));
                    }
                    Ok(()) => *this.state = StreamState::Seeking,
                },

                StreamState::Seeking => match body.poll_complete(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => {
                        tracing::warn!(error = %e, "seeking media source failed");
                        release(this.state, this.body.as_mut());
                        return Poll::Ready(Some(Err(e)));
                    }
                    Poll::Ready(Ok(())) => *this.state = StreamState::Reading,
                },

                StreamState::Reading => {
                    if *this.remaining == 0 {
                        release(this.state, this.body.as_mut());
                        return Poll::Ready(None);
                    }

                    // never read past the interval, whatever the buffer size
                    let nbytes = std::cmp::min(
                        IO_BUFFER_SIZE,
                        usize::try_from(*this.remaining).unwrap_or(usize::MAX),
                    );
                    this.buffer.reserve(nbytes);
                    let uninit = &mut this.buffer.spare_capacity_mut()[..nbytes];
                    let mut read_buf = ReadBuf::uninit(uninit);

                    match body.poll_read(cx, &mut read_buf) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(e)) => {
                            tracing::warn!(
                                remaining = *this.remaining,
                                error = %e,
                                "reading media source failed mid-stream"
                            );
                            release(this.state, this.body.as_mut());
                            return Poll::Ready(Some(Err(e)));
                        }
                        Poll::Ready(Ok(())) => {
                            let n = read_buf.filled().len();
                            if n == 0 {
                                let remaining = *this.remaining;
                                tracing::warn!(remaining, "media source ended before the requested range");
                                release(this.state, this.body.as_mut());
                                return Poll::Ready(Some(Err(io::Error::new(
                                    io::ErrorKind::UnexpectedEof,
                                    format!("media source ended {remaining} bytes early"),
                                ))));
                            }

                            // SAFETY: poll_read has initialised `n` bytes of
                            // the spare capacity, and the buffer is empty
                            // after every split below
                            unsafe { this.buffer.set_len(this.buffer.len() + n); }
                            let chunk = this.buffer.split().freeze();

                            // n <= remaining because of the cmp::min above
                            *this.remaining -= n as u64;
                            if *this.remaining == 0 {
                                release(this.state, this.body.as_mut());
                            }

                            return Poll::Ready(Some(Ok(chunk)));
                        }
                    }
                }
            }
        }
    }
}
