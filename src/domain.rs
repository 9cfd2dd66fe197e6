use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::FundPerfError;

/// One fund row as returned by the gateway, key order preserved.
pub type FundRecord = Map<String, Value>;

/// Fields the gateway reflects back from the request.
pub const ECHO_COLUMNS: [&str; 5] = [
    "maturityType",
    "category",
    "subCategory",
    "reportDate",
    "primaryCategory",
];

const REPORT_DATE_FORMAT: &str = "%d-%b-%Y";

/// Gateway report date, rendered as `DD-Mon-YYYY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReportDate(NaiveDate);

impl ReportDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn today() -> Self {
        Self(Local::now().date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for ReportDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(REPORT_DATE_FORMAT))
    }
}

impl FromStr for ReportDate {
    type Err = FundPerfError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(value.trim(), REPORT_DATE_FORMAT)
            .map(Self)
            .map_err(|_| FundPerfError::InvalidReportDate(value.to_string()))
    }
}

/// Wall-clock instant a run started; every file of the run shares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTimestamp(NaiveDateTime);

impl RunTimestamp {
    pub fn now() -> Self {
        Self(Local::now().naive_local())
    }

    pub fn from_datetime(at: NaiveDateTime) -> Self {
        Self(at)
    }

    /// `YYYY-MM-DD`
    pub fn date_dir(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// `YYYYMMDD_HHMMSS`
    pub fn stamp(&self) -> String {
        self.0.format("%Y%m%d_%H%M%S").to_string()
    }
}

impl fmt::Display for RunTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stamp())
    }
}

/// A single request against the gateway, with the taxonomy names it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestCombination {
    pub maturity_type: &'static str,
    pub maturity_type_id: u32,
    pub category: &'static str,
    pub category_id: u32,
    pub sub_category: &'static str,
    pub sub_category_id: u32,
    pub fund_id: u32,
    pub report_date: ReportDate,
}

impl RequestCombination {
    pub fn payload(&self) -> GatewayPayload {
        GatewayPayload {
            maturity_type: self.maturity_type_id,
            category: self.category_id,
            sub_category: self.sub_category_id,
            mfid: self.fund_id,
            report_date: self.report_date.to_string(),
        }
    }
}

impl fmt::Display for RequestCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} / {} (ids {}/{}/{}, mfid {}, {})",
            self.maturity_type,
            self.category,
            self.sub_category,
            self.maturity_type_id,
            self.category_id,
            self.sub_category_id,
            self.fund_id,
            self.report_date
        )
    }
}

/// Request body accepted by the fund-performance endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayPayload {
    pub maturity_type: u32,
    pub category: u32,
    pub sub_category: u32,
    pub mfid: u32,
    pub report_date: String,
}
