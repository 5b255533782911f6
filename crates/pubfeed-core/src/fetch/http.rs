use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::{FetchError, PageFetcher};

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("pubfeed/", env!("CARGO_PKG_VERSION"));

/// [`PageFetcher`] backed by a shared [`reqwest::Client`].
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    /// Wrap an existing client (e.g. one with proxy settings).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        timeout: Option<Duration>,
    ) -> Pin<Box<dyn Future<Output = Result<String, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            let transport = |e: reqwest::Error| FetchError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            };

            let mut request = self.client.get(url);
            if let Some(t) = timeout {
                request = request.timeout(t);
            }

            let resp = request.send().await.map_err(transport)?;
            let status = resp.status();
            if status != reqwest::StatusCode::OK {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            resp.text().await.map_err(transport)
        })
    }
}
