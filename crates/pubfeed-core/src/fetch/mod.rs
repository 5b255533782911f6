//! Page fetcher trait and implementations for retrieving remote markup.

pub mod http;
pub mod mock;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

pub use http::HttpFetcher;
pub use mock::{MockFetcher, MockResponse};

/// Error returned when a page could not be retrieved.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The server answered with something other than 200.
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },
    /// Connection, timeout or body decoding failure.
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
}

impl FetchError {
    /// HTTP status code, if the server responded at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Transport { .. } => None,
        }
    }
}

/// Something that can GET a URL and hand back its markup.
pub trait PageFetcher: Send + Sync {
    /// Fetch `url`. `timeout` bounds the whole request; `None` leaves it to
    /// the client defaults. Only a 200 response counts as success.
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        timeout: Option<Duration>,
    ) -> Pin<Box<dyn Future<Output = Result<String, FetchError>> + Send + 'a>>;
}
