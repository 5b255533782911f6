//! Mock page fetcher for testing.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use super::{FetchError, PageFetcher};

/// A scripted response for [`MockFetcher`].
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// 200 with the given body.
    Page(String),
    /// A non-200 status.
    Status(u16),
    /// A transport-level failure (DNS, timeout, reset).
    Transport(String),
}

impl MockResponse {
    pub fn page(body: impl Into<String>) -> Self {
        MockResponse::Page(body.into())
    }
}

/// A hand-rolled [`PageFetcher`] for tests.
///
/// Responses are looked up by exact URL; unknown URLs get the fallback.
/// Every call is recorded together with the timeout it was issued with.
pub struct MockFetcher {
    routes: HashMap<String, MockResponse>,
    fallback: MockResponse,
    calls: Mutex<Vec<(String, Option<Duration>)>>,
}

impl MockFetcher {
    /// Create a mock that answers every URL with `fallback`.
    pub fn new(fallback: MockResponse) -> Self {
        Self {
            routes: HashMap::new(),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer `url` with `response` instead of the fallback.
    pub fn with_route(mut self, url: impl Into<String>, response: MockResponse) -> Self {
        self.routes.insert(url.into(), response);
        self
    }

    /// How many times `fetch()` has been called.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// URLs requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|c| c.iter().map(|(url, _)| url.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of requests made for `url`.
    pub fn calls_to(&self, url: &str) -> usize {
        self.calls
            .lock()
            .map(|c| c.iter().filter(|(u, _)| u == url).count())
            .unwrap_or(0)
    }

    /// Timeout passed with the most recent request for `url`.
    pub fn timeout_for(&self, url: &str) -> Option<Option<Duration>> {
        self.calls.lock().ok().and_then(|c| {
            c.iter()
                .rev()
                .find(|(u, _)| u == url)
                .map(|(_, timeout)| *timeout)
        })
    }
}

impl PageFetcher for MockFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        timeout: Option<Duration>,
    ) -> Pin<Box<dyn Future<Output = Result<String, FetchError>> + Send + 'a>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((url.to_string(), timeout));
        }
        let response = self
            .routes
            .get(url)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());

        Box::pin(async move {
            match response {
                MockResponse::Page(body) => Ok(body),
                MockResponse::Status(status) => Err(FetchError::Status {
                    url: url.to_string(),
                    status,
                }),
                MockResponse::Transport(message) => Err(FetchError::Transport {
                    url: url.to_string(),
                    message,
                }),
            }
        })
    }
}
