//! Hash of a published tarball.
//!
//! Freshly uploaded packages take a while to show up on the registry's
//! download endpoint, so the tarball is polled with a growing delay until a
//! usable body comes back.

use std::time::Duration;

use anyhow::{Context, Result};
use miette::Diagnostic;
use thiserror::Error;
use url::Url;

use crate::util::config::{Config, MAX_RETRY_DELAY_SECS};
use crate::util::hash::{is_sha256_hex, sha256_bytes};
use crate::util::shell::{format_duration, Shell, Status};

/// Wait before the first download when a human has just published.
pub const PROPAGATION_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Error, Diagnostic)]
pub enum HashError {
    #[error("could not download {url} after {attempts} attempts")]
    #[diagnostic(
        code(relbrew::hash::exhausted),
        help("the package may still be processing; rerun the release with --skip-hackage later")
    )]
    Exhausted { url: String, attempts: u32 },

    #[error("invalid artifact URL `{url}`: {reason}")]
    #[diagnostic(code(relbrew::hash::invalid_url))]
    InvalidUrl { url: String, reason: String },
}

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs GET requests.
pub trait HttpTransport {
    /// One GET. Transport failures are errors; HTTP error statuses are not.
    fn get(&mut self, url: &str) -> Result<HttpResponse>;
}

/// [`HttpTransport`] over a blocking reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("relbrew/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build HTTP client")?;
        Ok(ReqwestTransport { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&mut self, url: &str) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("failed to download {}", url))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .with_context(|| format!("failed to read response body from {}", url))?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Blocks the resolver between attempts.
pub trait Sleep {
    fn sleep(&mut self, duration: Duration);
}

impl<F: FnMut(Duration)> Sleep for F {
    fn sleep(&mut self, duration: Duration) {
        (*self)(duration)
    }
}

/// The real clock.
pub fn thread_sleep(duration: Duration) {
    std::thread::sleep(duration)
}

/// Downloads an artifact until its SHA-256 can be computed.
pub struct HashResolver<T, S> {
    transport: T,
    sleep: S,
    max_attempts: u32,
    retry_delay: Duration,
}

impl<T: HttpTransport, S: Sleep> HashResolver<T, S> {
    pub fn new(transport: T, sleep: S) -> Self {
        let config = Config::default();
        HashResolver {
            transport,
            sleep,
            max_attempts: config.hash_max_attempts,
            retry_delay: Duration::from_secs(config.hash_retry_delay_secs),
        }
    }

    /// Take the attempt limit and backoff unit from configuration.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.max_attempts = config.hash_max_attempts.max(1);
        self.retry_delay =
            Duration::from_secs(config.hash_retry_delay_secs.min(MAX_RETRY_DELAY_SECS));
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Hex SHA-256 of the body served at `url`.
    ///
    /// Each failed attempt (transport error, non-success status, empty body)
    /// is followed by a wait of `attempt * retry_delay`, except the last.
    /// An interactive run first waits [`PROPAGATION_WAIT`].
    pub fn resolve(&mut self, url: &str, interactive: bool, shell: &Shell) -> Result<String, HashError> {
        Url::parse(url).map_err(|e| HashError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if interactive {
            shell.status(
                Status::Waiting,
                format!("{} for the package to propagate", format_duration(PROPAGATION_WAIT)),
            );
            self.sleep.sleep(PROPAGATION_WAIT);
        }

        for attempt in 1..=self.max_attempts {
            let spinner = shell.spinner(
                Status::Fetching,
                format!("{} (attempt {}/{})", url, attempt, self.max_attempts),
            );
            let outcome = self.attempt(url);
            drop(spinner);

            match outcome {
                Ok(hash) => {
                    tracing::debug!("sha256 of {}: {}", url, hash);
                    return Ok(hash);
                }
                Err(reason) => {
                    tracing::debug!("attempt {} for {} failed: {}", attempt, url, reason);
                    if attempt < self.max_attempts {
                        let wait = self.retry_delay.saturating_mul(attempt);
                        shell.status(
                            Status::Waiting,
                            format!("{}; retrying in {}", reason, format_duration(wait)),
                        );
                        self.sleep.sleep(wait);
                    } else {
                        shell.warn(reason);
                    }
                }
            }
        }

        Err(HashError::Exhausted {
            url: url.to_string(),
            attempts: self.max_attempts,
        })
    }

    fn attempt(&mut self, url: &str) -> std::result::Result<String, String> {
        let response = self.transport.get(url).map_err(|e| format!("{:#}", e))?;
        if !response.is_success() {
            return Err(format!("HTTP {} from {}", response.status, url));
        }
        if response.body.is_empty() {
            return Err(format!("empty response from {}", url));
        }
        let hash = sha256_bytes(&response.body);
        if !is_sha256_hex(&hash) {
            return Err(format!("malformed hash `{}`", hash));
        }
        Ok(hash)
    }
}
