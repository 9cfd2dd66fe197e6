use std::cmp::Ordering;

use serde_json::Value;
use tracing::warn;

use crate::domain::{ECHO_COLUMNS, FundRecord, RequestCombination};
use crate::error::FundPerfError;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

impl Cell {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(number) => number.as_f64().map(Cell::Number).unwrap_or(Cell::Empty),
            Value::String(text) => Cell::Text(text.clone()),
            Value::Bool(flag) => Cell::Text(flag.to_string()),
            Value::Null => Cell::Empty,
            other => Cell::Text(other.to_string()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Character count of the cell as a plain string; used for column widths.
    /// Whole numbers print without a fraction and missing cells as `nan`.
    pub fn display_len(&self) -> usize {
        match self {
            Cell::Number(value) => format_plain(*value).chars().count(),
            Cell::Text(text) => text.chars().count(),
            Cell::Empty => MISSING_TEXT.len(),
        }
    }
}

const MISSING_TEXT: &str = "nan";

fn format_plain(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl TabularSet {
    /// Columns come from the first record; later records are aligned to them.
    pub fn from_records(records: &[FundRecord]) -> Self {
        let columns: Vec<String> = records
            .first()
            .map(|first| first.keys().cloned().collect())
            .unwrap_or_default();
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| record.get(column).map(Cell::from_json).unwrap_or(Cell::Empty))
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        let index = self.column_index(column)?;
        self.rows.get(row).and_then(|cells| cells.get(index))
    }

    pub fn drop_columns(&mut self, names: &[&str]) {
        let keep: Vec<bool> = self
            .columns
            .iter()
            .map(|column| !names.contains(&column.as_str()))
            .collect();
        let mut flags = keep.iter();
        self.columns.retain(|_| *flags.next().unwrap_or(&true));
        for row in &mut self.rows {
            let mut flags = keep.iter();
            row.retain(|_| *flags.next().unwrap_or(&true));
        }
    }

    /// Stable sort on a text column; empty or non-text cells go last.
    pub fn sort_by_text(&mut self, column: &str) {
        let Some(index) = self.column_index(column) else {
            return;
        };
        self.rows.sort_by(|a, b| {
            match (
                a.get(index).and_then(Cell::as_text),
                b.get(index).and_then(Cell::as_text),
            ) {
                (Some(left), Some(right)) => left.cmp(right),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionLabels {
    pub primary_category: String,
    pub category: String,
    pub fallback: bool,
}

/// Turns one combination's records into a table and the labels that decide
/// where it is written. The response's own `primaryCategory` / `category`
/// win over the names the request was made with.
pub fn aggregate(
    records: &[FundRecord],
    combination: &RequestCombination,
) -> Result<(TabularSet, PartitionLabels), FundPerfError> {
    let first = records.first().ok_or(FundPerfError::EmptyBatch)?;

    let primary = label(first, "primaryCategory");
    let category = label(first, "category");
    let fallback = primary.is_none() || category.is_none();
    if primary.is_none() {
        warn!(
            combination = %combination,
            fallback = true,
            requested = combination.category,
            "response has no primaryCategory; partitioning by requested category"
        );
    }
    if category.is_none() {
        warn!(
            combination = %combination,
            fallback = true,
            requested = combination.sub_category,
            "response has no category; partitioning by requested sub-category"
        );
    }
    let labels = PartitionLabels {
        primary_category: primary.unwrap_or_else(|| combination.category.to_string()),
        category: category.unwrap_or_else(|| combination.sub_category.to_string()),
        fallback,
    };

    let mut table = TabularSet::from_records(records);
    table.drop_columns(&ECHO_COLUMNS);
    Ok((table, labels))
}

fn label(record: &FundRecord, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Single-shot merge: columns are the union in first-seen order.
pub fn merge(records: &[FundRecord]) -> TabularSet {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    let rows = records
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|column| record.get(column).map(Cell::from_json).unwrap_or(Cell::Empty))
                .collect()
        })
        .collect();
    TabularSet { columns, rows }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn combination() -> RequestCombination {
        RequestCombination {
            maturity_type: "Open Ended",
            maturity_type_id: 1,
            category: "Equity",
            category_id: 1,
            sub_category: "Large Cap",
            sub_category_id: 1,
            fund_id: 0,
            report_date: "24-Apr-2024".parse().unwrap(),
        }
    }

    fn record(value: Value) -> FundRecord {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn labels_come_from_the_response() {
        let records = vec![record(json!({
            "schemeName": "Alpha Bluechip",
            "navRegular": 101.5,
            "maturityType": "Open Ended",
            "category": "Large Cap Fund",
            "subCategory": "Large Cap",
            "reportDate": "24-Apr-2024",
            "primaryCategory": "Equity Scheme"
        }))];
        let (table, labels) = aggregate(&records, &combination()).unwrap();
        assert_eq!(labels.primary_category, "Equity Scheme");
        assert_eq!(labels.category, "Large Cap Fund");
        assert!(!labels.fallback);
        assert_eq!(table.columns, vec!["schemeName", "navRegular"]);
        assert_eq!(table.rows[0][1], Cell::Number(101.5));
    }

    #[test]
    fn missing_labels_fall_back_to_request_names() {
        let records = vec![record(json!({"schemeName": "Beta"}))];
        let (_, labels) = aggregate(&records, &combination()).unwrap();
        assert_eq!(labels.primary_category, "Equity");
        assert_eq!(labels.category, "Large Cap");
        assert!(labels.fallback);
    }

    #[test]
    fn empty_batch_is_an_error() {
        assert_matches!(aggregate(&[], &combination()), Err(FundPerfError::EmptyBatch));
    }

    #[test]
    fn later_records_align_to_first_schema() {
        let records = vec![
            record(json!({"schemeName": "A", "dailyAUM": 10})),
            record(json!({"dailyAUM": 20, "extra": true})),
        ];
        let table = TabularSet::from_records(&records);
        assert_eq!(table.columns, vec!["schemeName", "dailyAUM"]);
        assert_eq!(table.rows[1], vec![Cell::Empty, Cell::Number(20.0)]);
    }

    #[test]
    fn merge_unions_columns_and_sorts_names() {
        let records = vec![
            record(json!({"schemeName": "Zeta", "navRegular": 1.0})),
            record(json!({"schemeName": null, "dailyAUM": 5.0})),
            record(json!({"schemeName": "Alpha"})),
        ];
        let mut table = merge(&records);
        assert_eq!(table.columns, vec!["schemeName", "navRegular", "dailyAUM"]);
        table.sort_by_text("schemeName");
        let names: Vec<_> = (0..table.len())
            .map(|row| table.cell(row, "schemeName").cloned().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                Cell::Text("Alpha".to_string()),
                Cell::Text("Zeta".to_string()),
                Cell::Empty
            ]
        );
    }

    #[test]
    fn display_len_matches_plain_rendering() {
        assert_eq!(Cell::Number(320.0).display_len(), 3);
        assert_eq!(Cell::Number(-12.0).display_len(), 3);
        assert_eq!(Cell::Number(0.1234).display_len(), 6);
        assert_eq!(Cell::Text("Large Cap".into()).display_len(), 9);
        assert_eq!(Cell::Empty.display_len(), 3);
    }
}
