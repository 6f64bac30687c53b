use std::convert::Infallible;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::HeaderMap;
use http_body::Body as _;
use http_body::{Frame, SizeHint};

use super::StreamingBody;
use crate::BoxError;

/// A body read fully into memory: one data frame, then optional trailers.
#[derive(Debug, Clone, Default)]
pub(super) struct Buffered {
    data: Option<Bytes>,
    trailers: Option<HeaderMap>,
}

impl Buffered {
    pub(super) fn new(data: Bytes, trailers: Option<HeaderMap>) -> Self {
        Self {
            data: (!data.is_empty()).then_some(data),
            trailers,
        }
    }

    pub(super) fn len(&self) -> usize {
        self.data.as_ref().map_or(0, Bytes::len)
    }
}

impl http_body::Body for Buffered {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if let Some(data) = this.data.take() {
            return Poll::Ready(Some(Ok(Frame::data(data))));
        }

        Poll::Ready(this.trailers.take().map(|trailers| Ok(Frame::trailers(trailers))))
    }

    fn is_end_stream(&self) -> bool {
        self.data.is_none() && self.trailers.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.len() as u64)
    }
}

/// A streaming body whose first bytes were already pulled off the stream.
///
/// Yields the buffered prefix, then any chunk held back by the buffer limit,
/// then the rest of the stream, then any trailers seen before the read was
/// interrupted.
pub(super) struct Replay {
    prefix: Buffered,
    overflow: Option<Bytes>,
    rest: StreamingBody,
    started: bool,
}

impl Replay {
    pub(super) fn new(
        prefix: Buffered,
        overflow: Option<Bytes>,
        rest: StreamingBody,
        started: bool,
    ) -> Self {
        Self {
            prefix,
            overflow,
            rest,
            started,
        }
    }

    /// Has a frame been read from this body?
    pub(super) fn is_started(&self) -> bool {
        self.started
    }

    fn buffered_len(&self) -> u64 {
        (self.prefix.len() + self.overflow.as_ref().map_or(0, Bytes::len)) as u64
    }
}

impl fmt::Debug for Replay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replay")
            .field("buffered", &self.buffered_len())
            .field("started", &self.started)
            .finish()
    }
}

impl http_body::Body for Replay {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if let Some(data) = this.prefix.data.take().or_else(|| this.overflow.take()) {
            this.started = true;
            return Poll::Ready(Some(Ok(Frame::data(data))));
        }

        let poll = match this.rest.as_mut().poll_frame(cx) {
            Poll::Ready(None) => Poll::Ready(
                this.prefix
                    .trailers
                    .take()
                    .map(|trailers| Ok(Frame::trailers(trailers))),
            ),
            poll => poll,
        };

        if let Poll::Ready(Some(_)) = poll {
            this.started = true;
        }
        poll
    }

    fn is_end_stream(&self) -> bool {
        self.prefix.is_end_stream() && self.overflow.is_none() && self.rest.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        let buffered = self.buffered_len();
        let rest = self.rest.size_hint();

        let mut hint = SizeHint::new();
        hint.set_lower(rest.lower() + buffered);
        if let Some(upper) = rest.upper() {
            hint.set_upper(upper + buffered);
        }
        hint
    }
}
