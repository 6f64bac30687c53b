//! Cloning [`http::Request`] values.
//!
//! A clone carries the method, URI, version, [`VersionPolicy`],
//! [`RequestOptions`] and headers of the original, plus a body produced by
//! the body's [`CloneBody`] implementation. Any other request extensions are
//! considered connection or runtime state and are left behind, so the clone
//! can be sent on its own.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::Error;

pub use self::future::CloneRequestFuture;
pub use self::options::{RequestOptions, VersionPolicy};

mod future;
mod options;

/// Default upper bound on the bytes buffered when cloning a streaming body.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = i32::MAX as usize;

/// A request body which can produce an independent copy of itself.
pub trait CloneBody: Sized {
    /// Does this value represent "no body"?
    ///
    /// Requests with an absent body are cloned without calling
    /// [`clone_body`](CloneBody::clone_body).
    fn is_absent(&self) -> bool;

    /// Create a value representing "no body".
    fn absent() -> Self;

    /// Produce an independent copy of this body.
    ///
    /// After this resolves the original must still yield its full content
    /// when read, whether the clone succeeded or not. Implementations should
    /// return [`Error::Cancelled`] once `cancel` fires and must not truncate
    /// data silently.
    fn clone_body(
        &mut self,
        cancel: CancellationToken,
        max_buffer_size: usize,
    ) -> impl Future<Output = Result<Self, Error>> + Send + '_;
}

/// Configuration for cloning requests.
#[derive(Debug, Clone, Copy)]
pub struct RequestCloner {
    copy_version_policy: bool,
    max_buffer_size: usize,
}

impl Default for RequestCloner {
    fn default() -> Self {
        Self {
            copy_version_policy: true,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
        }
    }
}

impl RequestCloner {
    /// Create a cloner with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether the [`VersionPolicy`] is copied onto clones. Defaults to `true`.
    pub fn with_version_policy(mut self, copy: bool) -> Self {
        self.copy_version_policy = copy;
        self
    }

    /// Set the most bytes buffered when cloning a streaming body.
    pub fn with_max_buffer_size(mut self, limit: usize) -> Self {
        self.max_buffer_size = limit;
        self
    }

    /// Is the [`VersionPolicy`] copied onto clones?
    pub fn copies_version_policy(&self) -> bool {
        self.copy_version_policy
    }

    /// The most bytes buffered when cloning a streaming body.
    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }

    /// Clone `request`.
    ///
    /// When the body is absent the returned future is already complete and
    /// `cancel` is never consulted. Otherwise the body is cloned when the
    /// future is polled, and `cancel` is handed to the body.
    pub fn clone_request<'a, B>(
        &self,
        request: &'a mut http::Request<B>,
        cancel: Option<&CancellationToken>,
    ) -> CloneRequestFuture<'a, B>
    where
        B: CloneBody + Send + 'a,
    {
        if request.body().is_absent() {
            tracing::trace!(method = %request.method(), uri = %request.uri(), "cloning request without body");
            let mut clone = self.shell(request);
            copy_metadata(request, &mut clone);
            return CloneRequestFuture::ready(Ok(clone));
        }

        let cloner = *self;
        let cancel = cancel.cloned().unwrap_or_else(CancellationToken::new);
        CloneRequestFuture::body(Box::pin(async move {
            tracing::trace!(method = %request.method(), uri = %request.uri(), "cloning request with body");
            let mut clone = cloner.shell(request);

            let body = request
                .body_mut()
                .clone_body(cancel, cloner.max_buffer_size)
                .await?;
            *clone.body_mut() = body;

            copy_metadata(request, &mut clone);
            Ok(clone)
        }))
    }

    /// A new request with the same method, URI, version and version policy,
    /// and no body.
    fn shell<B>(&self, request: &http::Request<B>) -> http::Request<B>
    where
        B: CloneBody,
    {
        let mut clone = http::Request::new(B::absent());
        *clone.method_mut() = request.method().clone();
        *clone.uri_mut() = request.uri().clone();
        *clone.version_mut() = request.version();

        if self.copy_version_policy {
            if let Some(policy) = VersionPolicy::of(request) {
                clone.extensions_mut().insert(policy);
            }
        }

        clone
    }
}

fn copy_metadata<B>(source: &http::Request<B>, clone: &mut http::Request<B>) {
    if let Some(options) = RequestOptions::of(source) {
        let target = RequestOptions::of_mut(clone);
        for (key, value) in options.entries() {
            target.try_add_shared(key.clone(), || value.clone());
        }
    }

    // Values were validated when they were added to the source.
    let headers = clone.headers_mut();
    headers.reserve(source.headers().len());
    for (name, value) in source.headers() {
        headers.append(name, value.clone());
    }
}

/// Extension trait for cloning a request.
pub trait CloneRequest<B> {
    /// Clone this request with the default [`RequestCloner`] configuration.
    ///
    /// See [`RequestCloner::clone_request`].
    fn clone_request(&mut self, cancel: Option<&CancellationToken>) -> CloneRequestFuture<'_, B>;
}

impl<B> CloneRequest<B> for http::Request<B>
where
    B: CloneBody + Send,
{
    fn clone_request(&mut self, cancel: Option<&CancellationToken>) -> CloneRequestFuture<'_, B> {
        RequestCloner::default().clone_request(self, cancel)
    }
}

/// Clone a request which may not be present.
///
/// A missing request resolves immediately to [`Error::MissingRequest`],
/// regardless of `cancel`.
pub fn clone_request<'a, B>(
    request: Option<&'a mut http::Request<B>>,
    cancel: Option<&CancellationToken>,
) -> CloneRequestFuture<'a, B>
where
    B: CloneBody + Send + 'a,
{
    match request {
        Some(request) => RequestCloner::default().clone_request(request, cancel),
        None => CloneRequestFuture::ready(Err(Error::MissingRequest)),
    }
}
