//! Replica
//!
//! Independent, resendable copies of [`http::Request`] values.
//!
//! A request is usually single-use: once its body has been sent it can't be
//! sent again. Cloning a request with [`CloneRequest::clone_request`] produces
//! a fresh request with the same method, URI, version, version policy, options
//! and headers, along with an independently readable copy of the body. The
//! clone can be retried, forwarded or mutated without touching the original.
//!
//! ```
//! # async fn example() -> Result<(), http_replica::Error> {
//! use http_replica::{Body, CloneRequest};
//!
//! let mut request = http::Request::post("https://example.com/upload")
//!     .header("x-test", "a")
//!     .body(Body::from("payload"))
//!     .unwrap();
//!
//! let clone = request.clone_request(None).await?;
//! assert_eq!(clone.uri(), request.uri());
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

use std::fmt;

pub mod body;
pub use body::Body;
mod error;
pub use error::Error;
pub mod request;
pub use request::{clone_request, CloneBody, CloneRequest, CloneRequestFuture, RequestCloner};
pub use request::{RequestOptions, VersionPolicy};

/// Boxed error used for body stream failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub use tokio_util::sync::CancellationToken;

pub(crate) struct DebugLiteral<T: fmt::Display>(T);

impl<T: fmt::Display> fmt::Debug for DebugLiteral<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
