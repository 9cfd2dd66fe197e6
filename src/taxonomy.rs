//! Closed AMFI scheme taxonomy used to enumerate gateway requests.
//!
//! Ids are the gateway's own enumerants. The registry is built once with
//! [`TaxonomyRegistry::standard`] and handed to whatever drives requests.

use crate::domain::{ReportDate, RequestCombination};
use crate::error::FundPerfError;

pub const TAXONOMY_VERSION: u32 = 1;

/// `mfid` value meaning "every fund house".
pub const ALL_FUNDS: u32 = 0;

type Named = (&'static str, u32);

const CATEGORIES: &[Named] = &[
    ("Equity", 1),
    ("Debt", 2),
    ("Hybrid", 3),
    ("Solution Oriented", 4),
    ("Other", 5),
];

const MATURITY_TYPES: &[Named] = &[("Open Ended", 1), ("Close Ended", 2)];

const EQUITY: &[Named] = &[
    ("Large Cap", 1),
    ("Large & Mid Cap", 2),
    ("Flexi Cap", 3),
    ("Multi Cap", 4),
    ("Mid Cap", 5),
    ("Small Cap", 6),
    ("Value", 7),
    ("ELSS", 8),
    ("Contra", 9),
    ("Dividend Yield", 10),
    ("Focused", 11),
    ("Sectoral / Thematic", 12),
];

const DEBT: &[Named] = &[
    ("Long Duration", 13),
    ("Medium to Long Duration", 14),
    ("Short Duration", 15),
    ("Medium Duration", 16),
    ("Money Market", 17),
    ("Low Duration", 18),
    ("Ultra Short Duration", 19),
    ("Liquid", 20),
    ("Overnight", 21),
    ("Dynamic Bond", 22),
    ("Corporate Bond", 23),
    ("Credit Risk", 24),
    ("Banking and PSU", 25),
    ("Floater", 26),
    ("FMP", 27),
    ("Gilt", 28),
    ("Gilt with 10 year constant duration", 29),
];

// "Conservative Hyrbid" is spelled as in the listing this table mirrors.
const HYBRID: &[Named] = &[
    ("Aggressive Hybrid", 30),
    ("Conservative Hyrbid", 31),
    ("Equity Savings", 32),
    ("Arbitrage", 33),
    ("Multi Asset Allocation", 34),
    ("Dynamic Asset Allocation or Balanced Advantage", 35),
    ("Balanced Hybrid", 40),
];

const SOLUTION_ORIENTED: &[Named] = &[("Children's", 36), ("Retirement", 37)];

const OTHER: &[Named] = &[("Index Funds ETFs", 38), ("FoFs (Overseas/Domestic)", 39)];

const FUND_HOUSES: &[Named] = &[
    ("360 ONE Mutual Fund", 1),
    ("Aditya Birla Sun Life Mutual Fund", 2),
    ("Angel One Mutual Fund", 3),
    ("Axis Mutual Fund", 4),
    ("Bajaj Finserv Mutual Fund", 5),
    ("Bandhan Mutual Fund", 6),
    ("Bank of India Mutual Fund", 7),
    ("Baroda BNP Paribas Mutual Fund", 8),
    ("Canara Robeco Mutual Fund", 9),
    ("DSP Mutual Fund", 10),
    ("Edelweiss Mutual Fund", 11),
    ("Franklin Templeton Mutual Fund", 12),
    ("Groww Mutual Fund", 13),
    ("HDFC Mutual Fund", 14),
    ("Helios Mutual Fund", 15),
    ("HSBC Mutual Fund", 16),
    ("ICICI Prudential Mutual Fund", 17),
    ("Invesco Mutual Fund", 20),
    ("ITI Mutual Fund", 21),
    ("JM Financial Mutual Fund", 22),
    ("Kotak Mahindra Mutual Fund", 23),
    ("LIC Mutual Fund", 24),
    ("Mahindra Manulife Mutual Fund", 25),
    ("Mirae Asset Mutual Fund", 26),
    ("Motilal Oswal Mutual Fund", 27),
    ("Navi Mutual Fund", 28),
    ("Nippon India Mutual Fund", 29),
    ("NJ Mutual Fund", 30),
    ("Old Bridge Mutual Fund", 31),
    ("PGIM India Mutual Fund", 32),
    ("PPFAS Mutual Fund", 33),
    ("Quant Mutual Fund", 34),
    ("Quantum Mutual Fund", 35),
    ("Samco Mutual Fund", 37),
    ("SBI Mutual Fund", 38),
    ("Shriram Mutual Fund", 39),
    ("Sundaram Mutual Fund", 40),
    ("Tata Mutual Fund", 41),
    ("Taurus Mutual Fund", 42),
    ("Trust Mutual Fund", 43),
    ("Unifi Mutual Fund", 44),
    ("Union Mutual Fund", 45),
    ("UTI Mutual Fund", 46),
    ("WhiteOak Capital Mutual Fund", 47),
    ("Zerodha Mutual Fund", 48),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category {
    pub name: &'static str,
    pub id: u32,
    sub_categories: &'static [Named],
}

impl Category {
    pub fn sub_categories(&self) -> &'static [(&'static str, u32)] {
        self.sub_categories
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaturityType {
    pub name: &'static str,
    pub id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxonomyEntry {
    pub category_name: &'static str,
    pub category_id: u32,
    pub sub_category_name: &'static str,
    pub sub_category_id: u32,
}

/// What to hold fixed while walking the category tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinationPlan {
    pub maturity_types: Vec<MaturityType>,
    pub fund_id: u32,
    pub report_date: ReportDate,
}

#[derive(Debug, Clone)]
pub struct TaxonomyRegistry {
    version: u32,
    categories: Vec<Category>,
    maturity_types: Vec<MaturityType>,
    fund_houses: &'static [Named],
}

impl TaxonomyRegistry {
    pub fn standard() -> Self {
        let children: [&'static [Named]; 5] = [EQUITY, DEBT, HYBRID, SOLUTION_ORIENTED, OTHER];
        let categories = CATEGORIES
            .iter()
            .zip(children)
            .map(|(&(name, id), sub_categories)| Category {
                name,
                id,
                sub_categories,
            })
            .collect();
        let maturity_types = MATURITY_TYPES
            .iter()
            .map(|&(name, id)| MaturityType { name, id })
            .collect();
        Self {
            version: TAXONOMY_VERSION,
            categories,
            maturity_types,
            fund_houses: FUND_HOUSES,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn maturity_types(&self) -> &[MaturityType] {
        &self.maturity_types
    }

    pub fn maturity_type(&self, name: &str) -> Result<MaturityType, FundPerfError> {
        self.maturity_types
            .iter()
            .find(|maturity| maturity.name.eq_ignore_ascii_case(name.trim()))
            .copied()
            .ok_or_else(|| FundPerfError::UnknownMaturityType(name.to_string()))
    }

    pub fn sub_categories_of(
        &self,
        category: &str,
    ) -> Result<&'static [(&'static str, u32)], FundPerfError> {
        self.categories
            .iter()
            .find(|entry| entry.name == category)
            .map(Category::sub_categories)
            .ok_or_else(|| FundPerfError::UnknownCategory(category.to_string()))
    }

    pub fn entries(&self) -> impl Iterator<Item = TaxonomyEntry> + '_ {
        self.categories.iter().flat_map(|category| {
            category
                .sub_categories
                .iter()
                .map(move |&(sub_name, sub_id)| TaxonomyEntry {
                    category_name: category.name,
                    category_id: category.id,
                    sub_category_name: sub_name,
                    sub_category_id: sub_id,
                })
        })
    }

    pub fn fund_houses(&self) -> &'static [(&'static str, u32)] {
        self.fund_houses
    }

    pub fn fund_house_id(&self, name: &str) -> Option<u32> {
        self.fund_houses
            .iter()
            .find(|(house, _)| *house == name)
            .map(|&(_, id)| id)
    }

    /// Cross product of the plan's maturity types with every taxonomy entry.
    /// Calling it again restarts the sequence.
    pub fn all_combinations<'a>(
        &'a self,
        plan: &'a CombinationPlan,
    ) -> impl Iterator<Item = RequestCombination> + 'a {
        plan.maturity_types.iter().flat_map(move |maturity| {
            self.entries().map(move |entry| RequestCombination {
                maturity_type: maturity.name,
                maturity_type_id: maturity.id,
                category: entry.category_name,
                category_id: entry.category_id,
                sub_category: entry.sub_category_name,
                sub_category_id: entry.sub_category_id,
                fund_id: plan.fund_id,
                report_date: plan.report_date,
            })
        })
    }

    pub fn combination_count(&self, plan: &CombinationPlan) -> usize {
        plan.maturity_types.len() * self.entries().count()
    }
}
