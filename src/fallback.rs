// Resilient retrieval for flaky public data sources.
//
// Every external source the portfolio page leans on (GitHub API, OpenSky
// states, BITRE on-time data) is rate-limited, occasionally CORS-blocked or
// plain unreachable. Each logical resource therefore carries an ordered list
// of retrieval strategies: direct endpoint, relay-prefixed endpoint,
// wrapper-relay endpoint, or a local snapshot file. Strategies are tried
// strictly in sequence, each bounded by its own timeout; the first attempt
// that completes with a 2xx status and a readable body wins and the rest are
// never started.

use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::timeout;

pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Error Handling
// ============================================================================

/// Context kept for one failed strategy attempt.
#[derive(Debug, Clone)]
pub struct AttemptFailure {
    pub label: String,
    pub reason: String,
}

#[derive(Debug)]
pub enum FetchError {
    /// A single transport-level failure (network, timeout, non-2xx).
    Transport(String),
    /// Every strategy in the chain failed; carries context per attempt.
    Exhausted(Vec<AttemptFailure>),
    /// HTTP 403 with a rate-limit reset header. Never retried past.
    RateLimited { reset: Option<DateTime<Utc>> },
    /// The payload arrived but could not be decoded. Retrying an unchanged
    /// malformed source is futile, so this propagates as-is.
    Malformed(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Transport(e) => write!(f, "Network error: {}", e),
            FetchError::Exhausted(attempts) => {
                write!(f, "All {} retrieval strategies failed:", attempts.len())?;
                for a in attempts {
                    write!(f, " [{}: {}]", a.label, a.reason)?;
                }
                Ok(())
            }
            FetchError::RateLimited { reset } => {
                let when = reset
                    .map(|t| t.format("%H:%M:%S UTC").to_string())
                    .unwrap_or_else(|| "soon".to_string());
                write!(f, "API rate limited. Try again at {}.", when)
            }
            FetchError::Malformed(e) => write!(f, "Malformed payload: {}", e),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// True when the chain died because the resource itself does not exist
    /// (every attempt that reached the server came back 404).
    pub fn is_not_found(&self) -> bool {
        match self {
            FetchError::Exhausted(attempts) => {
                attempts.iter().any(|a| a.reason.contains("HTTP 404"))
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;

// ============================================================================
// Retrieval Strategies
// ============================================================================

/// One concrete way to retrieve a logical resource.
#[derive(Debug, Clone)]
pub enum Strategy {
    Http {
        label: String,
        url: String,
        query: Vec<(String, String)>,
        headers: Vec<(String, String)>,
    },
    LocalFile {
        label: String,
        path: PathBuf,
    },
}

impl Strategy {
    /// Plain GET against the source itself.
    pub fn direct(label: &str, url: impl Into<String>) -> Self {
        Strategy::Http {
            label: label.to_string(),
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    /// Relay that takes the target URL appended to its own path
    /// (`https://relay.example/https://source.example/...`).
    pub fn prefixed(label: &str, prefix: &str, url: &str) -> Self {
        Strategy::Http {
            label: label.to_string(),
            url: format!("{}{}", prefix, url),
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    /// Relay that takes the target URL as a `url=` query parameter; the
    /// client percent-encodes it.
    pub fn wrapped(label: &str, relay: &str, url: &str) -> Self {
        Strategy::Http {
            label: label.to_string(),
            url: relay.to_string(),
            query: vec![("url".to_string(), url.to_string())],
            headers: Vec::new(),
        }
    }

    /// Snapshot file shipped alongside the deployment.
    pub fn local(label: &str, path: impl Into<PathBuf>) -> Self {
        Strategy::LocalFile {
            label: label.to_string(),
            path: path.into(),
        }
    }

    pub fn with_header(self, name: &str, value: &str) -> Self {
        match self {
            Strategy::Http {
                label,
                url,
                query,
                mut headers,
            } => {
                headers.push((name.to_string(), value.to_string()));
                Strategy::Http {
                    label,
                    url,
                    query,
                    headers,
                }
            }
            other => other,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Strategy::Http { label, .. } => label,
            Strategy::LocalFile { label, .. } => label,
        }
    }
}

// ============================================================================
// Fallback Execution
// ============================================================================

enum AttemptError {
    Failed(String),
    RateLimited { reset: Option<DateTime<Utc>> },
}

async fn attempt(client: &Client, strategy: &Strategy) -> std::result::Result<String, AttemptError> {
    match strategy {
        Strategy::LocalFile { path, .. } => tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AttemptError::Failed(format!("read {}: {}", path.display(), e))),
        Strategy::Http {
            url,
            query,
            headers,
            ..
        } => {
            let mut request = client.get(url);
            if !query.is_empty() {
                request = request.query(query);
            }
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }

            let response = request
                .send()
                .await
                .map_err(|e| AttemptError::Failed(format!("request failed: {}", e)))?;

            let status = response.status();
            if status.as_u16() == 403 {
                if let Some(reset) = response.headers().get("x-ratelimit-reset") {
                    let reset = reset
                        .to_str()
                        .ok()
                        .and_then(|v| v.parse::<i64>().ok())
                        .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
                    return Err(AttemptError::RateLimited { reset });
                }
            }
            if !status.is_success() {
                return Err(AttemptError::Failed(format!("HTTP {}", status)));
            }

            response
                .text()
                .await
                .map_err(|e| AttemptError::Failed(format!("body read failed: {}", e)))
        }
    }
}

/// Try each strategy in order and return the first successful payload.
///
/// Each attempt is bounded by `attempt_timeout`; expiry abandons that attempt
/// only, not the whole chain. A rate-limited response aborts the chain
/// immediately so the reset hint reaches the caller verbatim instead of
/// being papered over by a relay retry.
pub async fn fetch_with_fallback(
    client: &Client,
    strategies: &[Strategy],
    attempt_timeout: Duration,
) -> Result<String> {
    if strategies.is_empty() {
        return Err(FetchError::Transport(
            "no retrieval strategies configured".to_string(),
        ));
    }

    let mut failures = Vec::new();

    for strategy in strategies {
        match timeout(attempt_timeout, attempt(client, strategy)).await {
            Ok(Ok(body)) => return Ok(body),
            Ok(Err(AttemptError::RateLimited { reset })) => {
                return Err(FetchError::RateLimited { reset });
            }
            Ok(Err(AttemptError::Failed(reason))) => failures.push(AttemptFailure {
                label: strategy.label().to_string(),
                reason,
            }),
            Err(_) => failures.push(AttemptFailure {
                label: strategy.label().to_string(),
                reason: format!("timed out after {}s", attempt_timeout.as_secs_f32()),
            }),
        }
    }

    Err(FetchError::Exhausted(failures))
}

/// Decode a JSON payload, mapping decode failures to `Malformed`.
pub fn decode_json<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))
}

// ============================================================================
// Tests
// ============================================================================
