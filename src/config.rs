use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::ReportDate;
use crate::error::FundPerfError;
use crate::taxonomy::{ALL_FUNDS, MaturityType, TaxonomyRegistry};

pub const DEFAULT_ENDPOINT: &str =
    "https://polling.crisil.com/gateway/pollingsebi/api/amfi/fundperformance";
pub const DEFAULT_CONFIG_FILE: &str = "fundperf.json";
pub const TOKEN_ENV: &str = "FUNDPERF_AUTH_TOKEN";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub authorization: Option<String>,
    #[serde(default)]
    pub report_date: Option<String>,
    #[serde(default)]
    pub maturity_types: Option<Vec<String>>,
    #[serde(default)]
    pub fund_id: Option<u32>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub static_dir: Option<String>,
    #[serde(default)]
    pub stop_on_auth_failure: Option<bool>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub backoff_base_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub endpoint: String,
    pub authorization: Option<String>,
    pub report_date: ReportDate,
    pub maturity_types: Vec<MaturityType>,
    pub fund_id: u32,
    pub output_dir: Utf8PathBuf,
    pub static_dir: Utf8PathBuf,
    pub stop_on_auth_failure: bool,
    pub timeout: Duration,
    pub retry: RetrySettings,
}

impl ResolvedConfig {
    pub fn token(&self) -> Result<&str, FundPerfError> {
        self.authorization
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .ok_or(FundPerfError::MissingCredential)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist; the default `fundperf.json` is optional.
    pub fn resolve(
        path: Option<&str>,
        registry: &TaxonomyRegistry,
    ) -> Result<ResolvedConfig, FundPerfError> {
        let config_path = Utf8PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));

        let config = if path.is_none() && !config_path.as_std_path().exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(config_path.as_std_path())
                .map_err(|_| FundPerfError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content)
                .map_err(|err| FundPerfError::ConfigParse(err.to_string()))?
        };

        let mut resolved = Self::resolve_config(config, registry)?;
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                resolved.authorization = Some(token.trim().to_string());
            }
        }
        Ok(resolved)
    }

    pub fn resolve_config(
        config: Config,
        registry: &TaxonomyRegistry,
    ) -> Result<ResolvedConfig, FundPerfError> {
        let report_date = match config.report_date {
            Some(value) => value.parse()?,
            None => ReportDate::today(),
        };

        let maturity_types = config
            .maturity_types
            .unwrap_or_else(default_maturity_types)
            .iter()
            .map(|name| registry.maturity_type(name))
            .collect::<Result<Vec<_>, FundPerfError>>()?;

        Ok(ResolvedConfig {
            endpoint: config
                .endpoint
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            authorization: config.authorization,
            report_date,
            maturity_types,
            fund_id: config.fund_id.unwrap_or(ALL_FUNDS),
            output_dir: Utf8PathBuf::from(config.output_dir.unwrap_or_else(|| ".".to_string())),
            static_dir: Utf8PathBuf::from(
                config.static_dir.unwrap_or_else(|| "static".to_string()),
            ),
            stop_on_auth_failure: config.stop_on_auth_failure.unwrap_or(false),
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(30)),
            retry: RetrySettings {
                max_retries: config.max_retries.unwrap_or(3),
                base_delay: Duration::from_millis(config.backoff_base_ms.unwrap_or(1000)),
            },
        })
    }
}

pub fn default_maturity_types() -> Vec<String> {
    vec!["Open Ended".to_string()]
}
