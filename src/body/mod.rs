//! A [Body](http_body::Body) which knows how to copy itself for a request
//! clone.
//!
//! Bodies built from in-memory data clone synchronously. Streaming bodies are
//! read into memory the first time they are cloned; afterwards the original
//! and every clone replay the same bytes independently.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use http_body::Body as _;
use http_body_util::BodyExt;
use http_body_util::{Empty, Full};
use tokio_util::sync::CancellationToken;

use crate::request::CloneBody;
use crate::{BoxError, Error};

use self::buffered::{Buffered, Replay};

mod buffered;

type StreamingBody = Pin<Box<dyn http_body::Body<Data = Bytes, Error = BoxError> + Send + 'static>>;

/// An http request using [Body] as the body.
pub type Request = http::Request<Body>;

/// A wrapper for different internal body types which implements [http_body::Body](http_body::Body)
///
/// Bodies can be created from [`Bytes`](bytes::Bytes), [`String`](std::string::String),
/// [`Vec<u8>`] or [`&'static str`](str) using [`From`](std::convert::From) implementations.
/// Any other [`http_body::Body`] can be wrapped with [`Body::new`].
///
/// An empty body can be created with [Body::empty](Body::empty). An empty body
/// counts as "no body" when a request is cloned.
#[derive(Debug)]
#[pin_project::pin_project]
pub struct Body {
    #[pin]
    inner: InnerBody,
}

impl Body {
    /// Create a new `Body` that wraps another [`http_body::Body`].
    ///
    /// Cloning a request with a wrapped body reads the wrapped body into memory.
    pub fn new<B>(body: B) -> Self
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        if body.is_end_stream() {
            return Self::empty();
        }

        try_downcast(body).unwrap_or_else(|body| Self {
            inner: InnerBody::Streaming {
                body: Box::pin(body.map_err(Into::into)),
                started: false,
            },
        })
    }

    /// Create a new empty body.
    pub fn empty() -> Self {
        Self {
            inner: InnerBody::Empty,
        }
    }

    /// Create a new body from something which can be converted into [`Bytes`].
    pub fn full<D>(data: D) -> Self
    where
        D: Into<Bytes>,
    {
        Self::from(data.into())
    }

    /// Try to clone this body without reading it.
    ///
    /// Only in-memory bodies can be cloned this way; streaming bodies return `None`.
    pub fn try_clone(&self) -> Option<Self> {
        let inner = match &self.inner {
            InnerBody::Empty => InnerBody::Empty,
            InnerBody::Full(body) => InnerBody::Full(body.clone()),
            InnerBody::Buffered(body) => InnerBody::Buffered(body.clone()),
            InnerBody::Streaming { .. } | InnerBody::Replay(_) => return None,
        };
        Some(Self { inner })
    }

    /// Is this body held entirely in memory?
    pub fn is_buffered(&self) -> bool {
        !matches!(self.inner, InnerBody::Streaming { .. } | InnerBody::Replay(_))
    }

    /// Has a frame been read from a streaming body?
    fn is_started(&self) -> bool {
        match self.inner {
            InnerBody::Streaming { started, .. } => started,
            InnerBody::Replay(ref body) => body.is_started(),
            _ => false,
        }
    }

    fn take_stream(&mut self) -> StreamingBody {
        match std::mem::replace(&mut self.inner, InnerBody::Empty) {
            InnerBody::Streaming { body, .. } => body,
            inner => Box::pin(Body { inner }),
        }
    }

    /// Read the remainder of a streaming body into memory, leaving an
    /// equivalent buffered body in place of the original.
    async fn buffer(&mut self, cancel: CancellationToken, limit: usize) -> Result<Self, Error> {
        let started = self.is_started();
        let mut stream = self.take_stream();
        let mut data = BytesMut::new();
        let mut overflow: Option<Bytes> = None;
        let mut trailers: Option<http::HeaderMap> = None;
        let mut frames = 0usize;

        let outcome = loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(Error::Cancelled),
                frame = stream.frame() => frame,
            };

            match frame {
                None if started && frames == 0 => break Err(Error::AlreadyConsumed),
                None => break Ok(()),
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(chunk) => {
                        frames += 1;
                        if data.len().saturating_add(chunk.len()) > limit {
                            overflow = Some(chunk);
                            break Err(Error::BufferLimitExceeded { limit });
                        }
                        data.extend_from_slice(&chunk);
                    }
                    Err(frame) => {
                        frames += 1;
                        if let Ok(map) = frame.into_trailers() {
                            match trailers {
                                Some(ref mut existing) => existing.extend(map),
                                None => trailers = Some(map),
                            }
                        }
                    }
                },
                Some(Err(error)) => break Err(Error::Body(error)),
            }
        };

        let prefix = Buffered::new(data.freeze(), trailers);
        match outcome {
            Ok(()) => {
                tracing::debug!(bytes = prefix.len(), "buffered streaming body");
                self.inner = InnerBody::Buffered(prefix.clone());
                Ok(Self {
                    inner: InnerBody::Buffered(prefix),
                })
            }
            Err(error) => {
                tracing::debug!(bytes = prefix.len(), %error, "body clone interrupted, restoring read prefix");
                self.inner = InnerBody::Replay(Replay::new(prefix, overflow, stream, started));
                Err(error)
            }
        }
    }
}

impl CloneBody for Body {
    fn is_absent(&self) -> bool {
        matches!(self.inner, InnerBody::Empty)
    }

    fn absent() -> Self {
        Self::empty()
    }

    fn clone_body(
        &mut self,
        cancel: CancellationToken,
        max_buffer_size: usize,
    ) -> impl Future<Output = Result<Self, Error>> + Send + '_ {
        async move {
            if self.is_absent() {
                return Ok(Self::empty());
            }

            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            if self.is_end_stream() {
                return Err(Error::AlreadyConsumed);
            }

            if let Some(body) = self.try_clone() {
                return Ok(body);
            }

            self.buffer(cancel, max_buffer_size).await
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for Body {
    fn from(body: Bytes) -> Self {
        if body.is_empty() {
            return Self::empty();
        }

        Self {
            inner: InnerBody::Full(body.into()),
        }
    }
}

impl From<String> for Body {
    fn from(body: String) -> Self {
        Self::from(Bytes::from(body))
    }
}

impl From<&'static str> for Body {
    fn from(body: &'static str) -> Self {
        Self::from(Bytes::from_static(body.as_bytes()))
    }
}

impl From<Vec<u8>> for Body {
    fn from(body: Vec<u8>) -> Self {
        Self::from(Bytes::from(body))
    }
}

impl From<Full<Bytes>> for Body {
    fn from(body: Full<Bytes>) -> Self {
        if body.is_end_stream() {
            return Self::empty();
        }

        Self {
            inner: InnerBody::Full(body),
        }
    }
}

impl From<Empty<Bytes>> for Body {
    fn from(_body: Empty<Bytes>) -> Self {
        Self::empty()
    }
}

fn try_downcast<T, K>(k: K) -> Result<T, K>
where
    T: 'static,
    K: Send + 'static,
{
    let mut k = Some(k);
    if let Some(k) = <dyn std::any::Any>::downcast_mut::<Option<T>>(&mut k) {
        Ok(k.take().unwrap())
    } else {
        Err(k.unwrap())
    }
}

#[pin_project::pin_project(project = InnerBodyProj)]
enum InnerBody {
    Empty,
    Full(#[pin] Full<Bytes>),
    Buffered(#[pin] Buffered),
    Streaming {
        #[pin]
        body: StreamingBody,
        started: bool,
    },
    Replay(#[pin] Replay),
}

macro_rules! poll_frame {
    ($body:ident, $cx:ident) => {
        $body
            .poll_frame($cx)
            .map(|opt| opt.map(|res| res.map_err(Into::into)))
    };
}

impl http_body::Body for Body {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        match this.inner.project() {
            InnerBodyProj::Empty => std::task::Poll::Ready(None),
            InnerBodyProj::Full(body) => poll_frame!(body, cx),
            InnerBodyProj::Buffered(body) => poll_frame!(body, cx),
            InnerBodyProj::Streaming { body, started } => {
                let poll = poll_frame!(body, cx);
                if let std::task::Poll::Ready(Some(_)) = poll {
                    *started = true;
                }
                poll
            }
            InnerBodyProj::Replay(body) => poll_frame!(body, cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self.inner {
            InnerBody::Empty => true,
            InnerBody::Full(ref body) => body.is_end_stream(),
            InnerBody::Buffered(ref body) => body.is_end_stream(),
            InnerBody::Streaming { ref body, .. } => body.is_end_stream(),
            InnerBody::Replay(ref body) => body.is_end_stream(),
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self.inner {
            InnerBody::Empty => http_body::SizeHint::with_exact(0),
            InnerBody::Full(ref body) => body.size_hint(),
            InnerBody::Buffered(ref body) => body.size_hint(),
            InnerBody::Streaming { ref body, .. } => body.size_hint(),
            InnerBody::Replay(ref body) => body.size_hint(),
        }
    }
}

impl fmt::Debug for InnerBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InnerBody::Empty => f.debug_struct("Empty").finish(),
            InnerBody::Full(_) => f.debug_struct("Full").finish(),
            InnerBody::Buffered(body) => fmt::Debug::fmt(body, f),
            InnerBody::Streaming { started, .. } => f
                .debug_struct("Streaming")
                .field("started", started)
                .finish(),
            InnerBody::Replay(body) => fmt::Debug::fmt(body, f),
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use futures_util::FutureExt as _;
    use http_body::Body as HttpBody;
    use http_body::Frame;
    use http_body_util::StreamBody;
    use static_assertions::assert_impl_all;

    assert_impl_all!(Body: HttpBody, Send);

    fn streaming(chunks: &[&'static str]) -> Body {
        let frames: Vec<Result<Frame<Bytes>, BoxError>> = chunks
            .iter()
            .copied()
            .map(|chunk| Ok(Frame::data(Bytes::from_static(chunk.as_bytes()))))
            .collect();
        Body::new(StreamBody::new(futures_util::stream::iter(frames)))
    }

    async fn read(body: Body) -> Bytes {
        body.collect().await.expect("body").to_bytes()
    }

    #[test]
    fn check_body_from_string() {
        let body = Body::from("Hello, World!".to_string());
        assert_eq!(body.size_hint().lower(), 13);
        assert_eq!(body.size_hint().upper(), Some(13));
        assert!(!body.is_end_stream());
    }

    #[test]
    fn check_body_from_empty_string() {
        let body = Body::from("".to_string());
        assert_eq!(body.size_hint().lower(), 0);
        assert_eq!(body.size_hint().upper(), Some(0));
        assert!(body.is_end_stream());
        assert!(body.is_absent());
    }

    #[test]
    fn check_body_from_vec() {
        let body = Body::from(vec![0x01u8, 0x02, 0x03]);
        assert_eq!(body.size_hint().exact(), Some(3));
        assert!(!body.is_end_stream());
    }

    #[test]
    fn check_body_from_empty_bytes() {
        let body = Body::from(Bytes::new());
        assert!(body.is_absent());
    }

    #[test]
    fn check_wrapped_empty_body_is_absent() {
        let body = Body::new(Empty::<Bytes>::new());
        assert!(body.is_absent());
    }

    #[test]
    fn check_streaming_is_not_buffered() {
        let body = streaming(&["a"]);
        assert!(!body.is_buffered());
        assert!(body.try_clone().is_none());
    }

    #[test]
    fn full_body_clones_without_suspending() {
        let mut body = Body::from("hello");
        let clone = body
            .clone_body(CancellationToken::new(), usize::MAX)
            .now_or_never()
            .expect("clone should not suspend")
            .expect("clone");
        assert!(clone.is_buffered());
        assert_eq!(clone.size_hint().exact(), Some(5));
    }

    #[tokio::test]
    async fn consumed_body_is_rejected() {
        let mut body = Body::from("hello");
        let _ = body.frame().await;

        let error = body
            .clone_body(CancellationToken::new(), usize::MAX)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::AlreadyConsumed));
    }

    #[tokio::test]
    async fn drained_streaming_body_is_rejected() {
        let mut body = streaming(&["hello"]);
        while body.frame().await.is_some() {}

        let error = body
            .clone_body(CancellationToken::new(), usize::MAX)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::AlreadyConsumed), "{error:?}");

        // Still rejected on a second attempt.
        let error = body
            .clone_body(CancellationToken::new(), usize::MAX)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::AlreadyConsumed), "{error:?}");
    }

    #[tokio::test]
    async fn unread_empty_stream_clones_empty() {
        let frames: Vec<Result<Frame<Bytes>, BoxError>> = Vec::new();
        let mut body = Body::new(StreamBody::new(futures_util::stream::iter(frames)));

        let clone = body
            .clone_body(CancellationToken::new(), usize::MAX)
            .await
            .expect("clone");
        assert_eq!(read(clone).await, Bytes::new());
    }

    #[tokio::test]
    async fn streaming_body_is_buffered_for_both_sides() {
        let mut body = streaming(&["hello, ", "world"]);
        let clone = body
            .clone_body(CancellationToken::new(), usize::MAX)
            .await
            .expect("clone");

        assert!(body.is_buffered());
        assert_eq!(read(clone).await, Bytes::from_static(b"hello, world"));
        assert_eq!(read(body).await, Bytes::from_static(b"hello, world"));
    }

    #[tokio::test]
    async fn streaming_body_keeps_trailers() {
        let mut trailers = http::HeaderMap::new();
        trailers.insert("x-checksum", http::HeaderValue::from_static("abc"));
        let frames: Vec<Result<Frame<Bytes>, BoxError>> = vec![
            Ok(Frame::data(Bytes::from_static(b"data"))),
            Ok(Frame::trailers(trailers)),
        ];
        let mut body = Body::new(StreamBody::new(futures_util::stream::iter(frames)));

        let clone = body
            .clone_body(CancellationToken::new(), usize::MAX)
            .await
            .expect("clone");

        let collected = clone.collect().await.expect("body");
        assert_eq!(
            collected.trailers().and_then(|t| t.get("x-checksum")),
            Some(&http::HeaderValue::from_static("abc"))
        );
        assert_eq!(collected.to_bytes(), Bytes::from_static(b"data"));
    }

    #[tokio::test]
    async fn limit_overrun_restores_original() {
        let mut body = streaming(&["abc", "def", "ghi"]);
        let error = body
            .clone_body(CancellationToken::new(), 4)
            .await
            .unwrap_err();

        assert!(matches!(error, Error::BufferLimitExceeded { limit: 4 }));
        assert_eq!(body.size_hint().lower(), 6);
        assert_eq!(read(body).await, Bytes::from_static(b"abcdefghi"));
    }

    #[tokio::test]
    async fn oversized_first_chunk_is_held_back() {
        let mut body = streaming(&["0123456789", "tail"]);
        let error = body
            .clone_body(CancellationToken::new(), 8)
            .await
            .unwrap_err();

        assert!(matches!(error, Error::BufferLimitExceeded { limit: 8 }));
        let first = body.frame().await.expect("frame").expect("data");
        assert_eq!(first.into_data().ok(), Some(Bytes::from_static(b"0123456789")));
        assert_eq!(read(body).await, Bytes::from_static(b"tail"));
    }

    #[tokio::test]
    async fn stream_error_is_passed_through() {
        let frames: Vec<Result<Frame<Bytes>, BoxError>> = vec![
            Ok(Frame::data(Bytes::from_static(b"partial"))),
            Err("connection reset".into()),
        ];
        let mut body = Body::new(StreamBody::new(futures_util::stream::iter(frames)));

        let error = body
            .clone_body(CancellationToken::new(), usize::MAX)
            .await
            .unwrap_err();
        match error {
            Error::Body(source) => assert_eq!(source.to_string(), "connection reset"),
            other => panic!("unexpected error: {other:?}"),
        }

        let first = body.frame().await.expect("frame").expect("data");
        assert_eq!(first.into_data().ok(), Some(Bytes::from_static(b"partial")));
    }

    #[tokio::test]
    async fn cancelled_token_rejects_clone() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut body = streaming(&["abc"]);
        let error = body.clone_body(cancel, usize::MAX).await.unwrap_err();
        assert!(error.is_cancelled());
        assert_eq!(read(body).await, Bytes::from_static(b"abc"));
    }

    #[tokio::test]
    async fn cancelled_token_does_not_affect_empty_body() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut body = Body::empty();
        let clone = body.clone_body(cancel, usize::MAX).await.expect("clone");
        assert!(clone.is_absent());
    }
}
