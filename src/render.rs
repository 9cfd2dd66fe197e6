//! Styled workbook rendering.
//!
//! Number formats are chosen per column from [`NUMBER_FORMAT_RULES`], matched
//! case-insensitively against the column's header text, first match wins.

use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook};

use crate::aggregate::{Cell, TabularSet};
use crate::error::FundPerfError;

pub const SHEET_NAME: &str = "Fund Performance";
pub const MAX_COLUMN_WIDTH: usize = 30;
const HEADER_FILL: u32 = 0xDCE6F1;
const FONT_NAME: &str = "Arial";
const FONT_SIZE: f64 = 10.0;
const LEFT_ALIGNED_COLUMNS: usize = 4;

static BLANK: Cell = Cell::Empty;

/// Gateway field → display header, in output order, for the merged export.
pub const DISPLAY_COLUMNS: &[(&str, &str)] = &[
    ("schemeName", "Scheme Name"),
    ("benchmark", "Benchmark"),
    ("riskometerScheme", "Riskometer Scheme"),
    ("riskometerBenchmark", "Riskometer Benchmark"),
    ("navDate", "NAV Date"),
    ("navRegular", "NAV Regular"),
    ("navDirect", "NAV Direct"),
    ("return1YearRegular", "Return 1 Year (%) Regular"),
    ("return1YearDirect", "Return 1 Year (%) Direct"),
    ("return1YearBenchmark", "Return 1 Year (%) Benchmark"),
    ("ir1YrRegular", "Information Ratio* 1 Year (Regular)"),
    ("ir1YrDirect", "Information Ratio* 1 Year (Direct)"),
    ("return3YearRegular", "Return 3 Year (%) Regular"),
    ("return3YearDirect", "Return 3 Year (%) Direct"),
    ("return3YearBenchmark", "Return 3 Year (%) Benchmark"),
    ("ir3YrRegular", "Information Ratio* 3 Year (Regular)"),
    ("ir3YrDirect", "Information Ratio* 3 Year (Direct)"),
    ("return5YearRegular", "Return 5 Year (%) Regular"),
    ("return5YearDirect", "Return 5 Year (%) Direct"),
    ("return5YearBenchmark", "Return 5 Year (%) Benchmark"),
    ("ir5YrRegular", "Information Ratio* 5 Year (Regular)"),
    ("ir5YrDirect", "Information Ratio* 5 Year (Direct)"),
    ("return10YearRegular", "Return 10 Year (%) Regular"),
    ("return10YearDirect", "Return 10 Year (%) Direct"),
    ("return10YearBenchmark", "Return 10 Year (%) Benchmark"),
    ("ir10YrRegular", "Information Ratio* 10 Year (Regular)"),
    ("ir10YrDirect", "Information Ratio* 10 Year (Direct)"),
    ("returnSinceLaunchRegular", "Return Since Launch Regular"),
    ("returnSinceLaunchDirect", "Return Since Launch Direct"),
    ("returnSinceLaunchBenchmarkRegular", "Return Since Launch  Benchmark"),
    ("returnSinceLaunchBenchmarkDirect", "Return Since Launch Direct Benchmark"),
    ("dailyAUM", "Daily AUM (Cr.)"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberFormat {
    Percent2,
    Thousands2,
    Decimal3,
}

pub const NUMBER_FORMAT_RULES: &[(&[&str], NumberFormat)] = &[
    (&["return"], NumberFormat::Percent2),
    (&["nav", "aum"], NumberFormat::Thousands2),
    (&["ir"], NumberFormat::Decimal3),
];

impl NumberFormat {
    pub fn pattern(&self) -> &'static str {
        match self {
            NumberFormat::Percent2 => "0.00%",
            NumberFormat::Thousands2 => "#,##0.00",
            NumberFormat::Decimal3 => "0.000",
        }
    }

    /// Text a spreadsheet shows for `value`. Ties round away from zero.
    pub fn display(&self, value: f64) -> String {
        match self {
            NumberFormat::Percent2 => format!("{}%", fixed(value * 100.0, 2, false)),
            NumberFormat::Thousands2 => fixed(value, 2, true),
            NumberFormat::Decimal3 => fixed(value, 3, false),
        }
    }
}

pub fn number_format_for(header: &str) -> Option<NumberFormat> {
    let lowered = header.to_lowercase();
    NUMBER_FORMAT_RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| lowered.contains(needle)))
        .map(|&(_, format)| format)
}

fn fixed(value: f64, decimals: usize, grouped: bool) -> String {
    let scaled = (value * 10f64.powi(decimals as i32)).round();
    let negative = scaled < 0.0;
    let mut digits = format!("{:.0}", scaled.abs());
    if digits.len() <= decimals {
        digits = format!("{}{digits}", "0".repeat(decimals + 1 - digits.len()));
    }
    let (whole, fraction) = digits.split_at(digits.len() - decimals);

    let whole = if grouped {
        let mut out = String::with_capacity(whole.len() + whole.len() / 3);
        for (index, ch) in whole.chars().enumerate() {
            if index > 0 && (whole.len() - index) % 3 == 0 {
                out.push(',');
            }
            out.push(ch);
        }
        out
    } else {
        whole.to_string()
    };

    let sign = if negative { "-" } else { "" };
    if decimals == 0 {
        format!("{sign}{whole}")
    } else {
        format!("{sign}{whole}.{fraction}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub key: String,
    pub header: String,
}

pub fn identity_layout(table: &TabularSet) -> Vec<Column> {
    table
        .columns
        .iter()
        .map(|name| Column {
            key: name.clone(),
            header: name.clone(),
        })
        .collect()
}

pub fn display_layout() -> Vec<Column> {
    DISPLAY_COLUMNS
        .iter()
        .map(|&(key, header)| Column {
            key: key.to_string(),
            header: header.to_string(),
        })
        .collect()
}

/// min(30, longest of header and cells + 2)
pub fn column_width<'a>(header: &str, cells: impl Iterator<Item = &'a Cell>) -> usize {
    let longest = cells
        .map(Cell::display_len)
        .fold(header.chars().count(), usize::max);
    (longest + 2).min(MAX_COLUMN_WIDTH)
}

fn header_format() -> Format {
    Format::new()
        .set_background_color(Color::RGB(HEADER_FILL))
        .set_font_name(FONT_NAME)
        .set_font_size(FONT_SIZE)
        .set_bold()
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
        .set_text_wrap()
        .set_border(FormatBorder::Thin)
}

fn body_format(column: usize, number_format: Option<NumberFormat>) -> Format {
    let align = if column < LEFT_ALIGNED_COLUMNS {
        FormatAlign::Left
    } else {
        FormatAlign::Center
    };
    let format = Format::new()
        .set_font_name(FONT_NAME)
        .set_font_size(FONT_SIZE)
        .set_border(FormatBorder::Thin)
        .set_align(align)
        .set_align(FormatAlign::VerticalCenter);
    match number_format {
        Some(number_format) => format.set_num_format(number_format.pattern()),
        None => format,
    }
}

/// Renders `table` into an in-memory `.xlsx`, columns in `layout` order.
/// Layout keys missing from the table produce blank columns.
pub fn render(table: &TabularSet, layout: &[Column]) -> Result<Vec<u8>, FundPerfError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    let header = header_format();
    for (position, column) in layout.iter().enumerate() {
        let col = u16::try_from(position)
            .map_err(|_| FundPerfError::Render(format!("too many columns: {}", layout.len())))?;
        let source = table.column_index(&column.key);
        let cells = move || {
            table
                .rows
                .iter()
                .map(move |row| source.and_then(|index| row.get(index)).unwrap_or(&BLANK))
        };

        sheet.write_string_with_format(0, col, &column.header, &header)?;

        let body = body_format(position, number_format_for(&column.header));
        for (offset, cell) in cells().enumerate() {
            let row = u32::try_from(offset + 1)
                .map_err(|_| FundPerfError::Render(format!("too many rows: {}", table.len())))?;
            match cell {
                Cell::Number(value) if value.is_finite() => {
                    sheet.write_number_with_format(row, col, *value, &body)?
                }
                Cell::Text(text) => sheet.write_string_with_format(row, col, text, &body)?,
                Cell::Number(_) | Cell::Empty => sheet.write_blank(row, col, &body)?,
            };
        }

        sheet.set_column_width(col, column_width(&column.header, cells()) as f64)?;
    }

    sheet.set_freeze_panes(1, 0)?;
    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_columns_are_percentages() {
        let format = number_format_for("return1YearRegular").unwrap();
        assert_eq!(format, NumberFormat::Percent2);
        assert_eq!(format.pattern(), "0.00%");
        assert_eq!(format.display(0.1234), "12.34%");
    }

    #[test]
    fn nav_and_aum_columns_are_grouped() {
        assert_eq!(number_format_for("NAV Regular"), Some(NumberFormat::Thousands2));
        let format = number_format_for("dailyAUM").unwrap();
        assert_eq!(format.pattern(), "#,##0.00");
        assert_eq!(format.display(1234567.891), "1,234,567.89");
        assert_eq!(format.display(-999.5), "-999.50");
    }

    #[test]
    fn ir_columns_use_three_decimals_half_away_from_zero() {
        let format = number_format_for("ir1YrRegular").unwrap();
        assert_eq!(format, NumberFormat::Decimal3);
        assert_eq!(format.pattern(), "0.000");
        assert_eq!(format.display(1.2345), "1.235");
        assert_eq!(format.display(-0.0004), "0.000");
    }

    #[test]
    fn unmatched_columns_keep_default_format() {
        assert_eq!(number_format_for("schemeName"), None);
        assert_eq!(number_format_for("Riskometer Scheme"), None);
        assert_eq!(number_format_for("Benchmark"), None);
    }

    #[test]
    fn first_matching_rule_wins() {
        // Both "return" and "ir" occur; the earlier rule decides.
        assert_eq!(
            number_format_for("returnIrDirect"),
            Some(NumberFormat::Percent2)
        );
        assert_eq!(number_format_for("navIrRatio"), Some(NumberFormat::Thousands2));
    }

    #[test]
    fn width_is_capped_and_padded() {
        let cells = [Cell::Text("x".repeat(50)), Cell::Number(1.5)];
        assert_eq!(column_width("Scheme Name", cells.iter()), 30);
        assert_eq!(column_width("NAV", [Cell::Number(101.25)].iter()), 8);
        assert_eq!(column_width("Scheme Name", std::iter::empty()), 13);
    }

    #[test]
    fn display_table_has_every_column_once() {
        let mut keys: Vec<_> = DISPLAY_COLUMNS.iter().map(|(key, _)| *key).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), DISPLAY_COLUMNS.len());
        assert_eq!(DISPLAY_COLUMNS[0].0, "schemeName");
    }
}
