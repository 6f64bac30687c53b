use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use pin_project::pin_project;

use crate::Error;

type CloneResult<B> = Result<http::Request<B>, Error>;

#[pin_project(project = CloneStateProj)]
enum CloneState<'a, B> {
    Ready(Option<CloneResult<B>>),
    Body(#[pin] BoxFuture<'a, CloneResult<B>>),
}

impl<B> fmt::Debug for CloneState<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(Some(Ok(_))) => f.debug_tuple("Ready").field(&"Ok").finish(),
            Self::Ready(Some(Err(error))) => f.debug_tuple("Ready").field(error).finish(),
            Self::Ready(None) => f.debug_tuple("Done").finish(),
            Self::Body(_) => f.debug_tuple("Body").finish(),
        }
    }
}

/// Future returned when cloning a request.
///
/// Requests without a body are cloned before this future is returned, so
/// it resolves on the first poll without allocating. Requests with a body
/// drive the body clone when polled.
#[pin_project]
pub struct CloneRequestFuture<'a, B> {
    #[pin]
    state: CloneState<'a, B>,
}

impl<B> fmt::Debug for CloneRequestFuture<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloneRequestFuture")
            .field("state", &self.state)
            .finish()
    }
}

impl<'a, B> CloneRequestFuture<'a, B> {
    pub(crate) fn ready(result: CloneResult<B>) -> Self {
        Self {
            state: CloneState::Ready(Some(result)),
        }
    }

    pub(crate) fn body(future: BoxFuture<'a, CloneResult<B>>) -> Self {
        Self {
            state: CloneState::Body(future),
        }
    }

    /// Is the clone already complete, without needing to be awaited?
    pub fn is_ready(&self) -> bool {
        matches!(self.state, CloneState::Ready(Some(_)))
    }
}

impl<B> Future for CloneRequestFuture<'_, B> {
    type Output = CloneResult<B>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();

        match this.state.as_mut().project() {
            CloneStateProj::Ready(result) => {
                Poll::Ready(result.take().expect("polled after completion"))
            }
            CloneStateProj::Body(future) => future.poll(cx),
        }
    }
}
