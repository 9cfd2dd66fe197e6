use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::aggregate::{self, TabularSet};
use crate::domain::{FundRecord, RequestCombination, RunTimestamp};
use crate::driver::{AuthPolicy, CombinationDriver};
use crate::error::FundPerfError;
use crate::fetch::{FetchOutcome, FundFetcher};
use crate::render;
use crate::store::{OutputArtifact, PartitionedStore, ReportDir};
use crate::taxonomy::{CombinationPlan, TaxonomyRegistry};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct CombinationFailure {
    pub combination: String,
    pub reason: String,
}

impl CombinationFailure {
    fn new(combination: &RequestCombination, reason: impl Into<String>) -> Self {
        Self {
            combination: combination.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub run_timestamp: String,
    pub total: usize,
    pub processed: usize,
    pub artifacts: Vec<OutputArtifact>,
    pub empty: usize,
    pub auth_failures: Vec<CombinationFailure>,
    pub transient_failures: Vec<CombinationFailure>,
    pub persist_failures: Vec<CombinationFailure>,
}

impl BatchReport {
    pub fn records_written(&self) -> usize {
        self.artifacts.iter().map(|artifact| artifact.record_count).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotResult {
    pub artifact: OutputArtifact,
    pub combinations: usize,
    pub with_data: usize,
    pub empty: usize,
    pub failed: usize,
}

/// Records gathered across a single-shot pass.
#[derive(Debug, Clone, Default)]
pub struct SnapshotBatch {
    pub records: Vec<FundRecord>,
    pub combinations: usize,
    pub with_data: usize,
    pub empty: usize,
    pub failed: usize,
}

pub struct App<F: FundFetcher> {
    registry: TaxonomyRegistry,
    driver: CombinationDriver<F>,
    store: PartitionedStore,
    reports: ReportDir,
}

impl<F: FundFetcher> App<F> {
    pub fn new(
        registry: TaxonomyRegistry,
        fetcher: F,
        policy: AuthPolicy,
        store: PartitionedStore,
        reports: ReportDir,
    ) -> Self {
        Self {
            registry,
            driver: CombinationDriver::new(fetcher, policy),
            store,
            reports,
        }
    }

    pub fn registry(&self) -> &TaxonomyRegistry {
        &self.registry
    }

    pub fn reports(&self) -> &ReportDir {
        &self.reports
    }

    /// Batch mode: one partitioned workbook per combination that returned data.
    /// Failures stay local to their combination.
    pub fn run_batch(
        &self,
        plan: &CombinationPlan,
        run: RunTimestamp,
        sink: &dyn ProgressSink,
    ) -> BatchReport {
        let mut report = BatchReport {
            run_timestamp: run.stamp(),
            total: self.registry.combination_count(plan),
            ..BatchReport::default()
        };

        let results = self.driver.run_with(
            self.registry.all_combinations(plan),
            sink,
            |combination, outcome| match outcome {
                FetchOutcome::Success(records) => {
                    match self.persist_combination(combination, records, &run) {
                        Ok(artifact) => {
                            sink.event(ProgressEvent {
                                message: format!("saved {}", artifact.path),
                                elapsed: None,
                            });
                            report.artifacts.push(artifact);
                        }
                        Err(err) => {
                            error!(combination = %combination, error = %err, "could not save combination");
                            report
                                .persist_failures
                                .push(CombinationFailure::new(combination, err.to_string()));
                        }
                    }
                }
                FetchOutcome::EmptyResult => {
                    info!(combination = %combination, "no matching funds; nothing written");
                    report.empty += 1;
                }
                FetchOutcome::AuthFailure(status) => {
                    report.auth_failures.push(CombinationFailure::new(
                        combination,
                        format!("HTTP {status}: check the authorization token"),
                    ));
                }
                FetchOutcome::TransientFailure(cause) => {
                    report
                        .transient_failures
                        .push(CombinationFailure::new(combination, cause.to_string()));
                }
            },
        );
        report.processed = results.len();

        info!(
            files = report.artifacts.len(),
            records = report.records_written(),
            empty = report.empty,
            auth_failures = report.auth_failures.len(),
            transient_failures = report.transient_failures.len(),
            persist_failures = report.persist_failures.len(),
            "batch run complete"
        );
        if !report.auth_failures.is_empty() {
            error!(
                count = report.auth_failures.len(),
                "gateway rejected the authorization token; rotate the static secret"
            );
        }
        report
    }

    fn persist_combination(
        &self,
        combination: &RequestCombination,
        records: &[FundRecord],
        run: &RunTimestamp,
    ) -> Result<OutputArtifact, FundPerfError> {
        let (table, labels) = aggregate::aggregate(records, combination)?;
        self.store.persist(&table, &labels, run)
    }

    /// Fetches every combination of `plan` and keeps all returned records.
    pub fn collect_records(&self, plan: &CombinationPlan, sink: &dyn ProgressSink) -> SnapshotBatch {
        let mut batch = SnapshotBatch::default();
        for (combination, outcome) in self.driver.run(self.registry.all_combinations(plan), sink) {
            batch.combinations += 1;
            match outcome {
                FetchOutcome::Success(records) => {
                    batch.with_data += 1;
                    batch.records.extend(records);
                }
                FetchOutcome::EmptyResult => batch.empty += 1,
                FetchOutcome::AuthFailure(status) => {
                    warn!(combination = %combination, status, "combination rejected");
                    batch.failed += 1;
                }
                FetchOutcome::TransientFailure(cause) => {
                    warn!(combination = %combination, cause = %cause, "combination failed");
                    batch.failed += 1;
                }
            }
        }
        batch
    }

    /// Single-shot mode: one merged workbook sorted by scheme name with
    /// display headers.
    pub fn export_snapshot(
        &self,
        plan: &CombinationPlan,
        run: RunTimestamp,
        sink: &dyn ProgressSink,
    ) -> Result<SnapshotResult, FundPerfError> {
        let batch = self.collect_records(plan, sink);
        if batch.records.is_empty() {
            return Err(FundPerfError::NoData);
        }

        let table = snapshot_table(&batch.records);
        let artifact = self
            .reports
            .write(&table, &render::display_layout(), &run)
            .inspect_err(|err| error!(error = %err, "excel export failed"))?;

        Ok(SnapshotResult {
            artifact,
            combinations: batch.combinations,
            with_data: batch.with_data,
            empty: batch.empty,
            failed: batch.failed,
        })
    }
}

pub fn snapshot_table(records: &[FundRecord]) -> TabularSet {
    let mut table = aggregate::merge(records);
    table.sort_by_text("schemeName");
    table
}
