//! The three operations an interactive front-end needs: show the landing
//! page, run a single-shot export, and hand back a generated file.

use std::fs;
use std::sync::LazyLock;

use camino::Utf8PathBuf;
use regex::Regex;
use serde::Serialize;

use crate::app::{App, ProgressSink};
use crate::domain::RunTimestamp;
use crate::error::FundPerfError;
use crate::fetch::FundFetcher;
use crate::taxonomy::CombinationPlan;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

static REPORT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^fund_performance_\d{8}_\d{6}\.xlsx$").expect("report name pattern")
});

static LANDING_PAGE: &str = include_str!("../templates/index.html");

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerateResponse {
    pub fn ok(filename: String, record_count: usize) -> Self {
        Self {
            success: true,
            filename: Some(filename),
            record_count: Some(record_count),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            filename: None,
            record_count: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadFile {
    pub path: Utf8PathBuf,
    pub filename: String,
    pub content_type: &'static str,
}

impl DownloadFile {
    pub fn bytes(&self) -> Result<Vec<u8>, FundPerfError> {
        fs::read(self.path.as_std_path())
            .map_err(|err| FundPerfError::Filesystem(format!("read {}: {err}", self.path)))
    }
}

pub struct Frontend<F: FundFetcher> {
    app: App<F>,
    plan: CombinationPlan,
}

impl<F: FundFetcher> Frontend<F> {
    pub fn new(app: App<F>, plan: CombinationPlan) -> Self {
        Self { app, plan }
    }

    pub fn landing_page(&self) -> &'static str {
        LANDING_PAGE
    }

    /// Any failure along the way becomes `{success: false, error}`.
    pub fn generate(&self, sink: &dyn ProgressSink) -> GenerateResponse {
        self.generate_at(RunTimestamp::now(), sink)
    }

    pub fn generate_at(&self, run: RunTimestamp, sink: &dyn ProgressSink) -> GenerateResponse {
        match self.app.export_snapshot(&self.plan, run, sink) {
            Ok(result) => match result.artifact.path.file_name() {
                Some(name) => GenerateResponse::ok(name.to_string(), result.artifact.record_count),
                None => GenerateResponse::failed("Failed to generate Excel file"),
            },
            Err(err) => GenerateResponse::failed(err.to_string()),
        }
    }

    /// Only names this crate generates are served, so a request cannot reach
    /// outside the report directory.
    pub fn download(&self, filename: &str) -> Result<DownloadFile, FundPerfError> {
        if !REPORT_NAME.is_match(filename) {
            return Err(FundPerfError::InvalidReportName(filename.to_string()));
        }
        let path = self.app.reports().report_path(filename);
        if !path.as_std_path().is_file() {
            return Err(FundPerfError::ReportNotFound(filename.to_string()));
        }
        Ok(DownloadFile {
            path,
            filename: filename.to_string(),
            content_type: XLSX_CONTENT_TYPE,
        })
    }
}
