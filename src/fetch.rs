use std::time::Duration;

use reqwest::RequestBuilder;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::protocol::validate_snapshot;
use crate::{Error, Result};

pub const RETRY_COUNT: u32 = 3;
pub const RETRY_BACKOFF: Duration = Duration::from_secs(2);
pub const RETRY_STATUS_CODES: [u16; 3] = [502, 503, 504];

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Username the device firmware expects when a password is set.
pub const DEFAULT_USERNAME: &str = "admin";

pub struct FetcherBuilder {
    username: Option<String>,
    password: Option<String>,
    verify_ssl: bool,
    connect_timeout: Duration,
    read_timeout: Duration,
    retry_count: u32,
    retry_backoff: Duration,
}

impl Default for FetcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FetcherBuilder {
    pub fn new() -> Self {
        Self {
            username: None,
            password: None,
            verify_ssl: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            retry_count: RETRY_COUNT,
            retry_backoff: RETRY_BACKOFF,
        }
    }

    /// Overrides [`DEFAULT_USERNAME`]. Ignored unless a password is set.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn verify_ssl(mut self, verify: bool) -> Self {
        self.verify_ssl = verify;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// First retry delay; each following retry doubles it.
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn build(self) -> Result<Fetcher> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!self.verify_ssl)
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .build()?;

        let auth = match self.password.filter(|p| !p.is_empty()) {
            Some(password) => {
                let username = self
                    .username
                    .filter(|u| !u.is_empty())
                    .unwrap_or_else(|| DEFAULT_USERNAME.to_string());
                Some((username, password))
            }
            None => None,
        };

        Ok(Fetcher {
            http,
            auth,
            retry_count: self.retry_count,
            retry_backoff: self.retry_backoff,
        })
    }
}

/// Stateless HTTP access to a Homevolt device with bounded retry.
#[derive(Clone)]
pub struct Fetcher {
    http: reqwest::Client,
    auth: Option<(String, String)>,
    retry_count: u32,
    retry_backoff: Duration,
}

impl Fetcher {
    pub fn builder() -> FetcherBuilder {
        FetcherBuilder::new()
    }

    pub fn has_auth(&self) -> bool {
        self.auth.is_some()
    }

    /// GET `url` and decode the body as JSON.
    pub async fn fetch_json(&self, url: &str) -> Result<Value> {
        let body = self.send_with_retry(url, || self.http.get(url)).await?;
        trace!(url, bytes = body.len(), "fetched JSON body");
        Ok(serde_json::from_str(&body)?)
    }

    /// GET an `ems.json` snapshot and check it has the expected shape.
    pub async fn fetch_snapshot(&self, url: &str) -> Result<Value> {
        let body = self.fetch_json(url).await?;
        validate_snapshot(&body)?;
        Ok(body)
    }

    /// POST a console command as form field `cmd` and return the raw transcript.
    pub async fn console(&self, url: &str, cmd: &str) -> Result<String> {
        debug!(url, cmd, "sending console command");
        self.send_with_retry(url, || self.http.post(url).form(&[("cmd", cmd)]))
            .await
    }

    async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<String>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let err = match self.attempt(build()).await {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };

            if attempt >= self.retry_count || !err.is_retryable() {
                return Err(err);
            }

            let delay = backoff_delay(self.retry_backoff, attempt);
            attempt += 1;
            warn!(
                url,
                attempt,
                max = self.retry_count,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(&self, request: RequestBuilder) -> Result<String> {
        let request = match &self.auth {
            Some((username, password)) => request.basic_auth(username, Some(password)),
            None => request,
        };

        let resp = request.send().await?;
        match resp.status().as_u16() {
            200 => Ok(resp.text().await?),
            401 => Err(Error::Unauthorized),
            status => Err(Error::Status(status)),
        }
    }
}

/// `base * 2^attempt`, saturating rather than overflowing for large attempts.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        assert_eq!(backoff_delay(RETRY_BACKOFF, 0), Duration::from_secs(2));
        assert_eq!(backoff_delay(RETRY_BACKOFF, 1), Duration::from_secs(4));
        assert_eq!(backoff_delay(RETRY_BACKOFF, 2), Duration::from_secs(8));
    }

    #[test]
    fn backoff_saturates_for_large_attempts() {
        let delay = backoff_delay(RETRY_BACKOFF, 40);
        assert_eq!(delay, RETRY_BACKOFF.saturating_mul(u32::MAX));
        assert_eq!(backoff_delay(Duration::MAX, 3), Duration::MAX);
    }
}
