use std::future::Future;
use std::pin::Pin;

use crate::error::SnapshotError;

/// Boxed future returned by [`Fetcher::fetch`].
pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<serde_json::Value, SnapshotError>> + Send + 'a>>;

/// Source of snapshot payloads.
///
/// The scheduler neither knows nor cares how a payload is obtained. Any
/// error is treated the same way: the cycle is logged and abandoned.
/// Timeouts are the implementation's business.
pub trait Fetcher: Send + Sync {
    /// Fetch the current payload.
    fn fetch(&self) -> FetchFuture<'_>;
}
