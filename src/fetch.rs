//! Single-request client for the fund-performance gateway.
//!
//! A fetch runs the request through [`RetryPolicy`] with certificate
//! verification on. If that fails on TLS verification, the same request is
//! repeated once without verification. The gateway's chain has been seen
//! misconfigured, so the fallback stays, but every use of it is logged under
//! the `fundperf::security` target.

use std::fmt;
use std::thread;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE,
    HeaderMap, HeaderValue, ORIGIN, PRAGMA, REFERER, USER_AGENT,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::{ResolvedConfig, RetrySettings};
use crate::domain::{FundRecord, RequestCombination};
use crate::error::FundPerfError;

pub const SECURITY_TARGET: &str = "fundperf::security";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36";
const REFERER_PATH: &str = "/polling/amfi/fund-performance";

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(Vec<FundRecord>),
    EmptyResult,
    AuthFailure(u16),
    TransientFailure(TransientCause),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransientCause {
    Status(u16),
    Error(String),
}

impl fmt::Display for TransientCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransientCause::Status(status) => write!(f, "HTTP {status}"),
            TransientCause::Error(message) => write!(f, "{message}"),
        }
    }
}

impl FetchOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchOutcome::Success(_) => "success",
            FetchOutcome::EmptyResult => "empty",
            FetchOutcome::AuthFailure(_) => "auth_failure",
            FetchOutcome::TransientFailure(_) => "transient_failure",
        }
    }

    pub fn record_count(&self) -> usize {
        match self {
            FetchOutcome::Success(records) => records.len(),
            _ => 0,
        }
    }
}

/// Outcome plus how it was reached.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchReport {
    pub outcome: FetchOutcome,
    pub attempts: u32,
    pub insecure_fallback: bool,
}

#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Tls(String),
    Network(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Tls(message) => write!(f, "TLS verification failed: {message}"),
            TransportError::Network(message) => write!(f, "network error: {message}"),
        }
    }
}

pub trait Transport: Send + Sync {
    fn post(
        &self,
        request: &PreparedRequest,
        verify_tls: bool,
    ) -> Result<RawResponse, TransportError>;
}

pub trait Backoff: Send + Sync {
    fn pause(&self, delay: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleep;

impl Backoff for ThreadSleep {
    fn pause(&self, delay: Duration) {
        thread::sleep(delay);
    }
}

/// Anything that can turn a combination into an outcome.
pub trait FundFetcher {
    fn fetch(&self, combination: &RequestCombination) -> FetchOutcome;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub retry_statuses: &'static [u16],
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            retry_statuses: &[500, 502, 503, 504],
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: settings.base_delay,
            ..Self::default()
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (zero-based): base, 2×base, 4×base...
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }

    pub fn should_retry(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }
}

pub struct FetchClient<T: Transport, B: Backoff = ThreadSleep> {
    transport: T,
    backoff: B,
    policy: RetryPolicy,
    headers: HeaderMap,
}

impl FetchClient<HttpTransport> {
    pub fn from_config(config: &ResolvedConfig) -> Result<Self, FundPerfError> {
        let transport = HttpTransport::new(&config.endpoint, config.timeout)?;
        Self::new(
            transport,
            ThreadSleep,
            RetryPolicy::from(&config.retry),
            &config.endpoint,
            config.token()?,
        )
    }
}

impl<T: Transport, B: Backoff> FetchClient<T, B> {
    pub fn new(
        transport: T,
        backoff: B,
        policy: RetryPolicy,
        endpoint: &str,
        token: &str,
    ) -> Result<Self, FundPerfError> {
        Ok(Self {
            transport,
            backoff,
            policy,
            headers: browser_headers(endpoint, token)?,
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn prepare(
        &self,
        combination: &RequestCombination,
    ) -> Result<PreparedRequest, FundPerfError> {
        let body = serde_json::to_vec(&combination.payload())
            .map_err(|err| FundPerfError::Http(err.to_string()))?;
        let mut headers = self.headers.clone();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        Ok(PreparedRequest { headers, body })
    }

    pub fn fetch_detailed(&self, combination: &RequestCombination) -> FetchReport {
        let request = match self.prepare(combination) {
            Ok(request) => request,
            Err(err) => {
                return FetchReport {
                    outcome: FetchOutcome::TransientFailure(TransientCause::Error(
                        err.to_string(),
                    )),
                    attempts: 0,
                    insecure_fallback: false,
                };
            }
        };
        debug!(
            payload = %String::from_utf8_lossy(&request.body),
            content_length = request.body.len(),
            "posting fund-performance request"
        );

        let mut attempts = 0;
        let mut insecure_fallback = false;
        let result = match self.send_with_retries(&request, true, &mut attempts) {
            Err(TransportError::Tls(reason)) => {
                warn!(
                    target: SECURITY_TARGET,
                    combination = %combination,
                    reason = %reason,
                    "TLS verification failed; retrying WITHOUT certificate verification"
                );
                insecure_fallback = true;
                self.send_with_retries(&request, false, &mut attempts)
            }
            other => other,
        };

        let outcome = match result {
            Ok(response) => classify(combination, response),
            Err(err) => {
                warn!(combination = %combination, error = %err, "request failed");
                FetchOutcome::TransientFailure(TransientCause::Error(err.to_string()))
            }
        };

        FetchReport {
            outcome,
            attempts,
            insecure_fallback,
        }
    }

    fn send_with_retries(
        &self,
        request: &PreparedRequest,
        verify_tls: bool,
        attempts: &mut u32,
    ) -> Result<RawResponse, TransportError> {
        let mut retry = 0u32;
        loop {
            *attempts += 1;
            let response = self.transport.post(request, verify_tls)?;
            if retry < self.policy.max_retries && self.policy.should_retry(response.status) {
                let delay = self.policy.delay_for(retry);
                debug!(
                    status = response.status,
                    retry = retry + 1,
                    delay_ms = delay.as_millis() as u64,
                    "retryable status; backing off"
                );
                self.backoff.pause(delay);
                retry += 1;
                continue;
            }
            return Ok(response);
        }
    }
}

impl<T: Transport, B: Backoff> FundFetcher for FetchClient<T, B> {
    fn fetch(&self, combination: &RequestCombination) -> FetchOutcome {
        self.fetch_detailed(combination).outcome
    }
}

fn classify(combination: &RequestCombination, response: RawResponse) -> FetchOutcome {
    let status = response.status;
    info!(combination = %combination, status, "gateway responded");

    if matches!(status, 401 | 403) {
        error!(
            combination = %combination,
            status,
            "gateway rejected the authorization token; it likely needs rotation"
        );
        return FetchOutcome::AuthFailure(status);
    }
    if !(200..300).contains(&status) {
        warn!(combination = %combination, status, "non-success status");
        return FetchOutcome::TransientFailure(TransientCause::Status(status));
    }

    let body: Value = match serde_json::from_slice(&response.body) {
        Ok(body) => body,
        Err(err) => {
            warn!(combination = %combination, error = %err, "unparseable response body");
            return FetchOutcome::TransientFailure(TransientCause::Error(format!(
                "invalid JSON body: {err}"
            )));
        }
    };

    let records = body
        .get("data")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.as_object().cloned())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if records.is_empty() {
        info!(combination = %combination, "no records in response");
        FetchOutcome::EmptyResult
    } else {
        info!(combination = %combination, records = records.len(), "records received");
        FetchOutcome::Success(records)
    }
}

fn browser_headers(endpoint: &str, token: &str) -> Result<HeaderMap, FundPerfError> {
    let url = Url::parse(endpoint).map_err(|err| FundPerfError::Http(err.to_string()))?;
    let origin = url.origin().ascii_serialization();

    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, max-age=0, must-revalidate"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("empty"));
    headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("cors"));
    headers.insert("Sec-Fetch-Site", HeaderValue::from_static("same-origin"));
    headers.insert(
        ORIGIN,
        HeaderValue::from_str(&origin).map_err(|err| FundPerfError::Http(err.to_string()))?,
    );
    headers.insert(
        REFERER,
        HeaderValue::from_str(&format!("{origin}{REFERER_PATH}"))
            .map_err(|err| FundPerfError::Http(err.to_string()))?,
    );
    let mut authorization =
        HeaderValue::from_str(token.trim()).map_err(|_| FundPerfError::MissingCredential)?;
    authorization.set_sensitive(true);
    headers.insert(AUTHORIZATION, authorization);
    Ok(headers)
}

/// Production transport: one verifying client, one that accepts any certificate.
#[derive(Clone)]
pub struct HttpTransport {
    endpoint: String,
    verified: Client,
    unverified: Client,
}

impl HttpTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, FundPerfError> {
        let verified = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| FundPerfError::Http(err.to_string()))?;
        let unverified = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| FundPerfError::Http(err.to_string()))?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            verified,
            unverified,
        })
    }
}

impl Transport for HttpTransport {
    fn post(
        &self,
        request: &PreparedRequest,
        verify_tls: bool,
    ) -> Result<RawResponse, TransportError> {
        let client = if verify_tls {
            &self.verified
        } else {
            &self.unverified
        };
        let response = client
            .post(&self.endpoint)
            .headers(request.headers.clone())
            .body(request.body.clone())
            .send()
            .map_err(|err| transport_error(&err))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|err| transport_error(&err))?
            .to_vec();
        Ok(RawResponse { status, body })
    }
}

fn transport_error(err: &reqwest::Error) -> TransportError {
    if is_tls_error(err) {
        TransportError::Tls(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

/// Only certificate verification failures qualify; handshake EOFs and
/// timeouts stay network errors.
fn is_tls_error(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(cause) = current {
        if cause.to_string().to_lowercase().contains("certificate") {
            return true;
        }
        current = cause.source();
    }
    false
}
