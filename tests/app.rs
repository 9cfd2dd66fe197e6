use std::collections::HashMap;
use std::io::Read;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use chrono::NaiveDate;
use serde_json::{Value, json};

use fundperf::aggregate::Cell;
use fundperf::app::{App, snapshot_table};
use fundperf::domain::{FundRecord, RequestCombination, RunTimestamp};
use fundperf::driver::AuthPolicy;
use fundperf::error::FundPerfError;
use fundperf::fetch::{FetchOutcome, FundFetcher, TransientCause};
use fundperf::frontend::Frontend;
use fundperf::output::JsonOutput;
use fundperf::store::{PartitionedStore, ReportDir};
use fundperf::taxonomy::{CombinationPlan, TaxonomyRegistry};

/// Answers by sub-category id; anything unscripted is empty.
#[derive(Default)]
struct MockGateway {
    answers: HashMap<u32, FetchOutcome>,
    calls: Mutex<Vec<u32>>,
}

impl FundFetcher for MockGateway {
    fn fetch(&self, combination: &RequestCombination) -> FetchOutcome {
        self.calls.lock().unwrap().push(combination.sub_category_id);
        self.answers
            .get(&combination.sub_category_id)
            .cloned()
            .unwrap_or(FetchOutcome::EmptyResult)
    }
}

fn record(value: Value) -> FundRecord {
    value.as_object().unwrap().clone()
}

fn large_cap_records() -> Vec<FundRecord> {
    vec![
        record(json!({
            "schemeName": "Zeta Large Cap Fund",
            "benchmark": "NIFTY 100 TRI",
            "navRegular": 1234.5,
            "return1YearRegular": 0.1234,
            "ir1YrRegular": 1.2345,
            "dailyAUM": 10500.75,
            "maturityType": "Open Ended",
            "category": "Large Cap",
            "subCategory": "Large Cap Fund",
            "reportDate": "24-Apr-2024",
            "primaryCategory": "Equity"
        })),
        record(json!({
            "schemeName": "Alpha Large Cap Fund",
            "benchmark": "NIFTY 100 TRI",
            "navRegular": 88.0,
            "return1YearRegular": -0.02,
            "ir1YrRegular": 0.5,
            "dailyAUM": 320.0,
            "maturityType": "Open Ended",
            "category": "Large Cap",
            "subCategory": "Large Cap Fund",
            "reportDate": "24-Apr-2024",
            "primaryCategory": "Equity"
        })),
    ]
}

fn run() -> RunTimestamp {
    RunTimestamp::from_datetime(
        NaiveDate::from_ymd_opt(2025, 4, 23)
            .unwrap()
            .and_hms_opt(10, 15, 0)
            .unwrap(),
    )
}

fn plan(registry: &TaxonomyRegistry) -> CombinationPlan {
    CombinationPlan {
        maturity_types: vec![registry.maturity_type("Open Ended").unwrap()],
        fund_id: 0,
        report_date: "24-Apr-2024".parse().unwrap(),
    }
}

fn app(root: &Utf8PathBuf, gateway: MockGateway, policy: AuthPolicy) -> App<MockGateway> {
    App::new(
        TaxonomyRegistry::standard(),
        gateway,
        policy,
        PartitionedStore::new(root.join("funds")),
        ReportDir::new(root.join("static")),
    )
}

fn zip_entry(path: &Utf8PathBuf, name: &str) -> String {
    let file = std::fs::File::open(path.as_std_path()).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut content = String::new();
    entry.read_to_string(&mut content).unwrap();
    content
}

#[test]
fn batch_writes_partitioned_workbook_and_keeps_going_after_failures() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let gateway = MockGateway {
        answers: HashMap::from([
            (1, FetchOutcome::Success(large_cap_records())),
            (2, FetchOutcome::AuthFailure(401)),
            (3, FetchOutcome::TransientFailure(TransientCause::Status(503))),
        ]),
        ..MockGateway::default()
    };
    let app = app(&root, gateway, AuthPolicy::Continue);
    let registry = TaxonomyRegistry::standard();

    let report = app.run_batch(&plan(&registry), run(), &JsonOutput);

    assert_eq!(report.total, 40);
    assert_eq!(report.processed, 40);
    assert_eq!(report.artifacts.len(), 1);
    assert_eq!(report.auth_failures.len(), 1);
    assert_eq!(report.transient_failures.len(), 1);
    assert_eq!(report.empty, 37);
    assert!(report.persist_failures.is_empty());

    let artifact = &report.artifacts[0];
    assert_eq!(artifact.record_count, 2);
    assert_eq!(artifact.partition_primary_category, "Equity");
    assert_eq!(artifact.partition_category, "Large Cap");
    assert!(artifact.path.ends_with(
        "Equity/Large Cap/2025-04-23/20250423_101500/fund_performance_Equity_Large Cap_20250423_101500.xlsx"
    ));
    assert!(artifact.path.as_std_path().is_file());

    let strings = zip_entry(&artifact.path, "xl/sharedStrings.xml");
    assert!(strings.contains("schemeName"));
    assert!(strings.contains("return1YearRegular"));
    for echo in ["maturityType", "subCategory", "reportDate", "primaryCategory"] {
        assert!(!strings.contains(echo), "echo column {echo} leaked");
    }
    assert!(!strings.contains(">category<"));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["artifacts"][0]["path"], artifact.path.as_str());
    assert_eq!(json["artifacts"][0]["record_count"], 2);

    let sheet = zip_entry(&artifact.path, "xl/worksheets/sheet1.xml");
    assert!(sheet.contains("state=\"frozen\""));
    let styles = zip_entry(&artifact.path, "xl/styles.xml");
    assert!(styles.contains("0.000"));
    assert!(styles.contains("Arial"));
}

#[test]
fn stop_on_first_auth_failure_skips_the_rest() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let gateway = MockGateway {
        answers: HashMap::from([(2, FetchOutcome::AuthFailure(403))]),
        ..MockGateway::default()
    };
    let app = app(&root, gateway, AuthPolicy::StopOnFirst);
    let registry = TaxonomyRegistry::standard();

    let report = app.run_batch(&plan(&registry), run(), &JsonOutput);

    assert_eq!(report.processed, 2);
    assert_eq!(report.auth_failures.len(), 1);
    assert!(report.artifacts.is_empty());
}

#[test]
fn single_shot_export_round_trips_through_frontend() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let gateway = MockGateway {
        answers: HashMap::from([
            (1, FetchOutcome::Success(large_cap_records())),
            (5, FetchOutcome::AuthFailure(401)),
        ]),
        ..MockGateway::default()
    };
    let registry = TaxonomyRegistry::standard();
    let frontend = Frontend::new(app(&root, gateway, AuthPolicy::Continue), plan(&registry));

    let response = frontend.generate_at(run(), &JsonOutput);

    assert!(response.success, "{response:?}");
    assert_eq!(
        response.filename.as_deref(),
        Some("fund_performance_20250423_101500.xlsx")
    );
    assert_eq!(response.record_count, Some(2));

    let file = frontend
        .download("fund_performance_20250423_101500.xlsx")
        .unwrap();
    assert_eq!(file.path, root.join("static/fund_performance_20250423_101500.xlsx"));
    assert!(!file.bytes().unwrap().is_empty());

    let strings = zip_entry(&file.path, "xl/sharedStrings.xml");
    assert!(strings.contains("Scheme Name"));
    assert!(strings.contains("Return 1 Year (%) Regular"));
    assert!(strings.contains("Daily AUM (Cr.)"));
    assert!(strings.contains("Alpha Large Cap Fund"));

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["success"], true);
    assert!(json.get("error").is_none());
}

#[test]
fn snapshot_rows_are_sorted_by_scheme_name() {
    let table = snapshot_table(&large_cap_records());
    assert_eq!(
        table.cell(0, "schemeName").and_then(Cell::as_text),
        Some("Alpha Large Cap Fund")
    );
    assert_eq!(
        table.cell(1, "schemeName").and_then(Cell::as_text),
        Some("Zeta Large Cap Fund")
    );
}

#[test]
fn single_shot_without_data_reports_failure() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let registry = TaxonomyRegistry::standard();
    let frontend = Frontend::new(
        app(&root, MockGateway::default(), AuthPolicy::Continue),
        plan(&registry),
    );

    let response = frontend.generate_at(run(), &JsonOutput);

    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("no data received from API"));
    assert!(!root.join("static").as_std_path().exists());
}

#[test]
fn download_rejects_unknown_and_foreign_names() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let registry = TaxonomyRegistry::standard();
    let frontend = Frontend::new(
        app(&root, MockGateway::default(), AuthPolicy::Continue),
        plan(&registry),
    );

    assert_matches!(
        frontend.download("fund_performance_20990101_000000.xlsx"),
        Err(FundPerfError::ReportNotFound(_))
    );
    assert_matches!(
        frontend.download("../Cargo.toml"),
        Err(FundPerfError::InvalidReportName(_))
    );
    assert!(frontend.landing_page().contains("Generate Excel"));
}

#[test]
fn same_partition_twice_in_one_run_is_not_overwritten() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let gateway = MockGateway {
        answers: HashMap::from([(1, FetchOutcome::Success(large_cap_records()))]),
        ..MockGateway::default()
    };
    let app = app(&root, gateway, AuthPolicy::Continue);
    let registry = TaxonomyRegistry::standard();
    let plan = CombinationPlan {
        maturity_types: registry.maturity_types().to_vec(),
        ..plan(&registry)
    };

    let report = app.run_batch(&plan, run(), &JsonOutput);

    assert_eq!(report.processed, 80);
    assert_eq!(report.artifacts.len(), 1);
    assert_eq!(report.records_written(), 2);
    assert_eq!(report.persist_failures.len(), 1);

    let path = &report.artifacts[0].path;
    let reason = &report.persist_failures[0].reason;
    assert!(report.persist_failures[0].combination.starts_with("Close Ended"));
    assert!(reason.contains(path.as_str()), "{reason}");
    assert!(reason.contains("2 records"), "{reason}");
    assert!(reason.contains("already exists"), "{reason}");

    let partition = path.parent().unwrap();
    let files = std::fs::read_dir(partition.as_std_path()).unwrap().count();
    assert_eq!(files, 1);
}

#[test]
fn persist_failure_is_reported_and_the_run_continues() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    std::fs::write(root.join("funds").as_std_path(), b"not a directory").unwrap();
    let gateway = MockGateway {
        answers: HashMap::from([
            (1, FetchOutcome::Success(large_cap_records())),
            (13, FetchOutcome::Success(large_cap_records())),
        ]),
        ..MockGateway::default()
    };
    let app = app(&root, gateway, AuthPolicy::Continue);
    let registry = TaxonomyRegistry::standard();

    let report = app.run_batch(&plan(&registry), run(), &JsonOutput);

    assert_eq!(report.processed, report.total);
    assert!(report.artifacts.is_empty());
    assert_eq!(report.persist_failures.len(), 2);
    assert_eq!(report.empty, 38);
    for failure in &report.persist_failures {
        assert!(
            failure.reason.contains(root.join("funds/Equity/Large Cap").as_str()),
            "{}",
            failure.reason
        );
        assert!(failure.reason.contains("2 records"), "{}", failure.reason);
    }
}
