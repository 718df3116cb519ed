//! Network side of the gateway: request/response values and the fetcher seam.

mod client;
mod types;

pub use client::HttpFetcher;
pub use types::{Request, Response, ResponseType};

use color_eyre::Result;
use std::future::Future;

/// Performs the actual HTTP request when no cached entry is usable.
///
/// An `Err` means the request never produced a response (DNS, connection refused,
/// timeout). HTTP error statuses are returned as `Ok` responses.
pub trait Fetcher: Send + Sync + 'static {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}
