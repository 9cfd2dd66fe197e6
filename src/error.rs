use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FundPerfError {
    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("unknown maturity type: {0}")]
    UnknownMaturityType(String),

    #[error("invalid report date (expected DD-Mon-YYYY): {0}")]
    InvalidReportDate(String),

    #[error("missing authorization token (set `authorization` in fundperf.json or FUNDPERF_AUTH_TOKEN)")]
    #[diagnostic(help("the gateway token is a static secret; rotate it when the gateway answers 401/403"))]
    MissingCredential,

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("gateway request failed: {0}")]
    Http(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to persist {record_count} records to {path}: {message}")]
    Persist {
        path: Utf8PathBuf,
        record_count: usize,
        message: String,
    },

    #[error("failed to render workbook: {0}")]
    Render(String),

    #[error("cannot aggregate an empty record batch")]
    EmptyBatch,

    #[error("no data received from API")]
    NoData,

    #[error("report not found: {0}")]
    ReportNotFound(String),

    #[error("invalid report name: {0}")]
    InvalidReportName(String),
}

impl From<rust_xlsxwriter::XlsxError> for FundPerfError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        FundPerfError::Render(err.to_string())
    }
}
