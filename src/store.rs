use std::fs;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::Builder;
use tracing::info;

use crate::aggregate::{PartitionLabels, TabularSet};
use crate::domain::RunTimestamp;
use crate::error::FundPerfError;
use crate::render::{self, Column};

const REPORT_PREFIX: &str = "fund_performance";
const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputArtifact {
    pub path: Utf8PathBuf,
    pub record_count: usize,
    pub partition_primary_category: String,
    pub partition_category: String,
    pub run_timestamp: String,
}

/// Batch-mode layout:
/// `<base>/<primary>/<category>/<YYYY-MM-DD>/<YYYYMMDD_HHMMSS>/fund_performance_<primary>_<category>_<stamp>.xlsx`
#[derive(Debug, Clone)]
pub struct PartitionedStore {
    base_dir: Utf8PathBuf,
}

impl PartitionedStore {
    pub fn new(base_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Utf8Path {
        &self.base_dir
    }

    pub fn partition_dir(&self, labels: &PartitionLabels, run: &RunTimestamp) -> Utf8PathBuf {
        self.base_dir
            .join(path_label(&labels.primary_category))
            .join(path_label(&labels.category))
            .join(run.date_dir())
            .join(run.stamp())
    }

    pub fn artifact_path(&self, labels: &PartitionLabels, run: &RunTimestamp) -> Utf8PathBuf {
        self.partition_dir(labels, run).join(format!(
            "{REPORT_PREFIX}_{}_{}_{}.xlsx",
            path_label(&labels.primary_category),
            path_label(&labels.category),
            run.stamp()
        ))
    }

    pub fn persist(
        &self,
        table: &TabularSet,
        labels: &PartitionLabels,
        run: &RunTimestamp,
    ) -> Result<OutputArtifact, FundPerfError> {
        let path = self.artifact_path(labels, run);
        let record_count = table.len();
        let persist_error = |message: String| FundPerfError::Persist {
            path: path.clone(),
            record_count,
            message,
        };

        let layout = render::identity_layout(table);
        let bytes = render::render(table, &layout).map_err(|err| persist_error(err.to_string()))?;
        write_bytes_atomic(&path, &bytes).map_err(|err| persist_error(err.to_string()))?;

        info!(
            path = %path,
            records = record_count,
            primary_category = %labels.primary_category,
            category = %labels.category,
            "workbook saved"
        );
        Ok(OutputArtifact {
            path,
            record_count,
            partition_primary_category: labels.primary_category.clone(),
            partition_category: labels.category.clone(),
            run_timestamp: run.stamp(),
        })
    }
}

/// Flat single-shot layout: `<static>/fund_performance_<stamp>.xlsx`.
#[derive(Debug, Clone)]
pub struct ReportDir {
    root: Utf8PathBuf,
}

impl ReportDir {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn report_name(run: &RunTimestamp) -> String {
        format!("{REPORT_PREFIX}_{}.xlsx", run.stamp())
    }

    pub fn report_path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }

    pub fn write(
        &self,
        table: &TabularSet,
        layout: &[Column],
        run: &RunTimestamp,
    ) -> Result<OutputArtifact, FundPerfError> {
        let path = self.report_path(&Self::report_name(run));
        let bytes = render::render(table, layout)?;
        write_bytes_atomic(&path, &bytes).map_err(|err| FundPerfError::Persist {
            path: path.clone(),
            record_count: table.len(),
            message: err.to_string(),
        })?;
        info!(path = %path, records = table.len(), "report saved");
        Ok(OutputArtifact {
            path,
            record_count: table.len(),
            partition_primary_category: String::new(),
            partition_category: String::new(),
            run_timestamp: run.stamp(),
        })
    }
}

/// Labels become single path components.
pub fn path_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|ch| if matches!(ch, '/' | '\\') { '-' } else { ch })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => UNKNOWN_LABEL.to_string(),
        _ => cleaned,
    }
}

/// Writes through a temp file in the target directory so readers never see
/// a partial workbook. An existing file at `path` is never replaced.
pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), FundPerfError> {
    let parent = path
        .parent()
        .ok_or_else(|| FundPerfError::Filesystem(format!("invalid destination path {path}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| FundPerfError::Filesystem(format!("create {parent}: {err}")))?;
    let mut temp = Builder::new()
        .prefix(".fundperf")
        .suffix(".tmp")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| FundPerfError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| FundPerfError::Filesystem(err.to_string()))?;
    temp.persist_noclobber(path.as_std_path()).map_err(|err| {
        if err.error.kind() == io::ErrorKind::AlreadyExists {
            FundPerfError::Filesystem(format!("{path} already exists; refusing to overwrite"))
        } else {
            FundPerfError::Filesystem(format!("persist {path}: {}", err.error))
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn run() -> RunTimestamp {
        RunTimestamp::from_datetime(
            NaiveDate::from_ymd_opt(2025, 4, 23)
                .unwrap()
                .and_hms_opt(14, 30, 5)
                .unwrap(),
        )
    }

    #[test]
    fn layout_paths() {
        let store = PartitionedStore::new("/data/funds");
        let labels = PartitionLabels {
            primary_category: "Equity".to_string(),
            category: "Large Cap".to_string(),
            fallback: false,
        };
        let path = store.artifact_path(&labels, &run());
        assert_eq!(
            path,
            "/data/funds/Equity/Large Cap/2025-04-23/20250423_143005/fund_performance_Equity_Large Cap_20250423_143005.xlsx"
        );
    }

    #[test]
    fn labels_cannot_escape_their_level() {
        assert_eq!(path_label("Sectoral / Thematic"), "Sectoral - Thematic");
        assert_eq!(path_label(".."), "Unknown");
        assert_eq!(path_label("  "), "Unknown");
        assert_eq!(path_label("FoFs (Overseas\\Domestic)"), "FoFs (Overseas-Domestic)");
    }

    #[test]
    fn atomic_write_refuses_to_replace_existing_file() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = dir.join("nested/report.xlsx");

        write_bytes_atomic(&path, b"first").unwrap();
        let err = write_bytes_atomic(&path, b"second").unwrap_err();

        assert!(err.to_string().contains("already exists"));
        assert_eq!(std::fs::read(path.as_std_path()).unwrap(), b"first");
        let leftovers = std::fs::read_dir(dir.join("nested").as_std_path())
            .unwrap()
            .count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn report_name_uses_stamp() {
        assert_eq!(
            ReportDir::report_name(&run()),
            "fund_performance_20250423_143005.xlsx"
        );
    }
}
