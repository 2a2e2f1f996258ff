//! Correlation identifiers carried through a call and its log records.
//!
//! An id is resolved once per call: the request's own id wins, then the id of
//! the enclosing [`scope`], and finally a freshly generated UUID.
//!
//! ```
//! use breakwater::context::{self, RequestId};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let id = RequestId::from("inbound-42");
//! context::scope(id, async {
//!     assert_eq!(context::current().unwrap().as_str(), "inbound-42");
//! })
//! .await;
//! # }
//! ```

use http::HeaderMap;
use std::fmt;
use std::future::Future;

tokio::task_local! {
    static CURRENT: RequestId;
}

/// An opaque correlation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Generates a new random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Reads the identifier from an `X-Request-ID` header, if present and
    /// non-empty.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(crate::header::X_REQUEST_ID)?
            .to_str()
            .ok()
            .filter(|id| !id.is_empty())
            .map(Self::from)
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Runs `future` with `id` as the ambient correlation identifier.
///
/// Calls made inside the future without their own id reuse this one, which
/// links an inbound request's logs with the outbound calls it triggers.
pub async fn scope<F>(id: RequestId, future: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(id, future).await
}

/// Returns the ambient correlation identifier, if one is in scope.
pub fn current() -> Option<RequestId> {
    CURRENT.try_with(Clone::clone).ok()
}

/// Picks the id for a call: explicit, then ambient, then generated.
pub(crate) fn resolve(explicit: Option<&str>) -> RequestId {
    match explicit.filter(|id| !id.is_empty()) {
        Some(id) => RequestId::from(id),
        None => current().unwrap_or_else(RequestId::generate),
    }
}
