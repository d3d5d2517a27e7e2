//! Polite HTTP fetcher for forum pages.
//!
//! Every attempt waits the configured delay plus a random jitter first. A
//! rate-limit response (HTTP 429) backs off exponentially and retries; other
//! non-success statuses give up on the URL immediately. Failures never
//! surface as errors: callers get `None` and move on.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, instrument, warn};

use lobgraph_shared::{FetchConfig, LobGraphError, Result};

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Rate-limited forum page fetcher.
pub struct Fetcher {
    config: FetchConfig,
    client: Client,
}

impl Fetcher {
    /// Build a fetcher with the configured User-Agent and timeout.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.timeout)
            .build()
            .map_err(|e| LobGraphError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Fetch `url`, returning the body on HTTP 200.
    ///
    /// Returns `None` when attempts are exhausted or the server answers with
    /// a non-success status other than 429.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch(&self, url: &str) -> Option<String> {
        for attempt in 0..self.config.max_retries {
            tokio::time::sleep(self.config.request_delay + self.jitter()).await;

            let response = match self.client.get(url).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "request failed");
                    if attempt + 1 < self.config.max_retries {
                        tokio::time::sleep(self.backoff(attempt)).await;
                    }
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::OK {
                match response.text().await {
                    Ok(body) => {
                        debug!(bytes = body.len(), "fetched");
                        return Some(body);
                    }
                    Err(e) => {
                        warn!(attempt = attempt + 1, error = %e, "failed to read body");
                        continue;
                    }
                }
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait = self.backoff(attempt);
                warn!(
                    attempt = attempt + 1,
                    wait_ms = wait.as_millis() as u64,
                    "rate limited, backing off"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            warn!(status = status.as_u16(), "unexpected status, giving up");
            return None;
        }

        warn!(attempts = self.config.max_retries, "retries exhausted");
        None
    }

    /// Random extra delay in `[0, jitter]`.
    fn jitter(&self) -> Duration {
        let max_ms = self.config.jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        let roll = getrandom::u64().unwrap_or(0);
        Duration::from_millis(roll % (max_ms + 1))
    }

    /// `retry_backoff * 2^attempt`, saturating.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.config.retry_backoff.saturating_mul(factor)
    }
}

/// Profile page URL for `username` under the forum origin.
pub fn profile_url(base_url: &str, username: &str) -> String {
    format!("{}/~{username}", base_url.trim_end_matches('/'))
}
