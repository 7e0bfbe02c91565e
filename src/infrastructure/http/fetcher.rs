//! Resilient outbound fetch: in-flight sharing, rate-limit cooldown, backoff

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::domain::DomainError;
use crate::domain::fetch::{FetchOptions, RestRequest};
use crate::infrastructure::observability::{
    record_upstream_rate_limited, record_upstream_request, record_upstream_retry,
    record_upstream_shared,
};
use crate::infrastructure::single_flight::{FlightRole, SingleFlight};

use super::http_client::HttpClientTrait;

/// Longest slice of a response body quoted in error messages
const MAX_QUOTED_BODY: usize = 200;

/// Tuning shared by every call made through one fetcher
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Retry policy used when the caller does not pass one
    pub defaults: FetchOptions,
    /// Upper bound for a single request round-trip
    pub attempt_timeout: Duration,
    /// How long a URL is left alone after it answers 429
    pub cooldown: Duration,
    /// Retries allowed after rate-limit answers before giving up
    pub rate_limit_retries: u32,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            defaults: FetchOptions::default(),
            attempt_timeout: Duration::from_secs(10),
            cooldown: Duration::from_secs(60),
            rate_limit_retries: 3,
        }
    }
}

impl FetcherConfig {
    pub fn with_defaults(mut self, defaults: FetchOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_rate_limit_retries(mut self, retries: u32) -> Self {
        self.rate_limit_retries = retries;
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        self.defaults.validate()?;

        if self.attempt_timeout.is_zero() {
            return Err(DomainError::validation("attempt_timeout must be positive"));
        }

        Ok(())
    }
}

/// Why one attempt did not produce a usable payload
enum AttemptFailure {
    RateLimited(String),
    Failed(String),
}

struct FetcherInner {
    client: Arc<dyn HttpClientTrait>,
    config: FetcherConfig,
    /// URL -> instant before which no request may be issued to it
    cooldowns: Mutex<HashMap<String, Instant>>,
}

/// Outbound HTTP/RPC client that survives flaky, rate-limited upstreams
///
/// Identical concurrent calls share one network round-trip (including its
/// whole retry sequence). A URL that answers 429 is put in cooldown and every
/// caller waits it out before touching that URL again; other URLs are
/// unaffected.
pub struct ResilientFetcher {
    inner: Arc<FetcherInner>,
    flights: SingleFlight<Value>,
}

impl fmt::Debug for ResilientFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientFetcher")
            .field("client", &self.inner.client)
            .field("config", &self.inner.config)
            .field("flights", &self.flights)
            .finish()
    }
}

impl ResilientFetcher {
    pub fn new(client: Arc<dyn HttpClientTrait>, config: FetcherConfig) -> Result<Self, DomainError> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(FetcherInner {
                client,
                config,
                cooldowns: Mutex::new(HashMap::new()),
            }),
            flights: SingleFlight::new(),
        })
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.inner.config
    }

    /// Fetches a JSON payload using the configured default retry policy
    pub async fn fetch_default(&self, url: &str, request: &RestRequest) -> Result<Value, DomainError> {
        let options = self.inner.config.defaults.clone();
        self.fetch(url, request, &options).await
    }

    /// Fetches a JSON payload, retrying per `options`
    pub async fn fetch(
        &self,
        url: &str,
        request: &RestRequest,
        options: &FetchOptions,
    ) -> Result<Value, DomainError> {
        options.validate()?;
        let flight_key = request.flight_key(url)?;

        let inner = Arc::clone(&self.inner);
        let owned_url = url.to_string();
        let owned_request = request.clone();
        let owned_options = options.clone();

        let (outcome, role) = self.flights.join_or_start(&flight_key, move || async move {
            inner
                .fetch_with_retries(&owned_url, &owned_request, &owned_options)
                .await
        });

        if role == FlightRole::Follower {
            debug!(url = %url, "Sharing in-flight upstream request");
            record_upstream_shared();
        }

        outcome.await
    }

    /// Fetches and decodes the payload into the caller's type
    ///
    /// A payload that does not match `T` is a caller error and is not retried.
    pub async fn fetch_rest_data<T: DeserializeOwned>(
        &self,
        url: &str,
        request: &RestRequest,
        options: &FetchOptions,
    ) -> Result<T, DomainError> {
        let value = self.fetch(url, request, options).await?;

        serde_json::from_value(value).map_err(|e| {
            DomainError::serialization(format!(
                "Response from '{}' does not match the expected shape: {}",
                url, e
            ))
        })
    }

    /// Time left before `url` may be called again, if it is cooling down
    pub fn cooldown_remaining(&self, url: &str) -> Option<Duration> {
        self.inner.active_cooldown(url).map(|resume_at| resume_at - Instant::now())
    }
}

impl FetcherInner {
    async fn fetch_with_retries(
        &self,
        url: &str,
        request: &RestRequest,
        options: &FetchOptions,
    ) -> Result<Value, DomainError> {
        let max_attempts = options.max_attempts();
        let mut failures = 0;
        let mut rate_limit_hits = 0;

        loop {
            self.wait_for_cooldown(url).await;

            match self.attempt(url, request).await {
                Ok(value) => {
                    record_upstream_request(true);
                    return Ok(value);
                }
                Err(AttemptFailure::RateLimited(message)) => {
                    record_upstream_request(false);
                    record_upstream_rate_limited();
                    rate_limit_hits += 1;

                    let resume_at = self.start_cooldown(url);

                    if options.skip_backoff || rate_limit_hits > self.config.rate_limit_retries {
                        error!(url = %url, attempts = rate_limit_hits, "Upstream still rate limited, giving up");
                        return Err(DomainError::rate_limited(
                            url,
                            format!("Rate limited after {} attempts: {}", rate_limit_hits, message),
                        ));
                    }

                    warn!(
                        url = %url,
                        attempt = rate_limit_hits,
                        cooldown_ms = (resume_at - Instant::now()).as_millis() as u64,
                        "Upstream rate limited, cooling down"
                    );
                    record_upstream_retry();
                }
                Err(AttemptFailure::Failed(message)) => {
                    record_upstream_request(false);
                    failures += 1;

                    if failures >= max_attempts {
                        error!(url = %url, attempts = failures, error = %message, "Upstream request failed, giving up");
                        return Err(DomainError::upstream(
                            url,
                            format!("Failed after {} attempts: {}", failures, message),
                        ));
                    }

                    let delay = options.delay_after_attempt(failures);
                    warn!(
                        url = %url,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Upstream request failed, retrying"
                    );
                    record_upstream_retry();
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(&self, url: &str, request: &RestRequest) -> Result<Value, AttemptFailure> {
        let response =
            match tokio::time::timeout(self.config.attempt_timeout, self.client.send(url, request))
                .await
            {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => return Err(AttemptFailure::Failed(e.to_string())),
                Err(_) => {
                    return Err(AttemptFailure::Failed(format!(
                        "timed out after {:?}",
                        self.config.attempt_timeout
                    )));
                }
            };

        if response.is_rate_limited() {
            return Err(AttemptFailure::RateLimited(format!(
                "HTTP 429: {}",
                quote(&response.body)
            )));
        }

        if !response.is_success() {
            return Err(AttemptFailure::Failed(format!(
                "HTTP {}: {}",
                response.status,
                quote(&response.body)
            )));
        }

        let value: Value = serde_json::from_str(&response.body)
            .map_err(|e| AttemptFailure::Failed(format!("Malformed JSON body: {}", e)))?;

        if let Some(rpc_error) = json_rpc_error(&value) {
            return Err(AttemptFailure::Failed(format!("JSON-RPC error: {}", rpc_error)));
        }

        Ok(value)
    }

    /// Sleeps until `url` is out of cooldown; a cooldown extended meanwhile is honored too
    async fn wait_for_cooldown(&self, url: &str) {
        while let Some(resume_at) = self.active_cooldown(url) {
            debug!(
                url = %url,
                wait_ms = (resume_at - Instant::now()).as_millis() as u64,
                "Waiting out endpoint cooldown"
            );
            tokio::time::sleep_until(resume_at).await;
        }
    }

    fn active_cooldown(&self, url: &str) -> Option<Instant> {
        let mut cooldowns = lock(&self.cooldowns);

        match cooldowns.get(url) {
            Some(&resume_at) if resume_at > Instant::now() => Some(resume_at),
            Some(_) => {
                cooldowns.remove(url);
                None
            }
            None => None,
        }
    }

    fn start_cooldown(&self, url: &str) -> Instant {
        let resume_at = Instant::now() + self.config.cooldown;
        let mut cooldowns = lock(&self.cooldowns);
        let entry = cooldowns.entry(url.to_string()).or_insert(resume_at);

        if *entry < resume_at {
            *entry = resume_at;
        }

        *entry
    }
}

fn json_rpc_error(value: &Value) -> Option<&Value> {
    let object = value.as_object()?;

    if !object.contains_key("jsonrpc") {
        return None;
    }

    object.get("error").filter(|e| !e.is_null())
}

fn quote(body: &str) -> &str {
    match body.char_indices().nth(MAX_QUOTED_BODY) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}

fn lock<K>(mutex: &Mutex<K>) -> MutexGuard<'_, K> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
