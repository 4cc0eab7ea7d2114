//! Export and display renderings of an [`AggregationResult`].
//!
//! Both file exports carry the same two tables:
//!
//! - **Product Analysis**: `product_name | Total Sales | Sales Count`, one row
//!   per product, product name as the index column.
//! - **Monthly Average**: `Month | Average Sales`, one row per `YYYY-MM`.
//!
//! The workbook places each table on its own sheet; the CSV payload stacks
//! them with two blank lines in between.

use std::{collections::BTreeMap, fmt::Write as _, io::Cursor, str::FromStr};

use itertools::Itertools;
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::Serialize;

use crate::{
    aggregate::AggregationResult,
    data::format_amount,
    error::AnalyzerError,
    io_utils, table,
};

pub const PRODUCT_SHEET: &str = "Product Analysis";
pub const MONTHLY_SHEET: &str = "Monthly Average";
pub const PRODUCT_HEADERS: [&str; 3] = ["product_name", "Total Sales", "Sales Count"];
pub const MONTHLY_HEADERS: [&str; 2] = ["Month", "Average Sales"];

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const CSV_CONTENT_TYPE: &str = "text/csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Spreadsheet,
    DelimitedText,
    Display,
}

impl ExportKind {
    pub fn extension(self) -> Option<&'static str> {
        match self {
            ExportKind::Spreadsheet => Some("xlsx"),
            ExportKind::DelimitedText => Some("csv"),
            ExportKind::Display => None,
        }
    }

    pub fn content_type(self) -> Option<&'static str> {
        match self {
            ExportKind::Spreadsheet => Some(XLSX_CONTENT_TYPE),
            ExportKind::DelimitedText => Some(CSV_CONTENT_TYPE),
            ExportKind::Display => None,
        }
    }
}

impl FromStr for ExportKind {
    type Err = AnalyzerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "xlsx" => Ok(ExportKind::Spreadsheet),
            "csv" => Ok(ExportKind::DelimitedText),
            "display" => Ok(ExportKind::Display),
            other => Err(AnalyzerError::UnsupportedExportKind {
                kind: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Report {
    Spreadsheet(Vec<u8>),
    DelimitedText(String),
    Display(DisplaySummary),
}

pub fn render(result: &AggregationResult, kind: ExportKind) -> Result<Report, AnalyzerError> {
    match kind {
        ExportKind::Spreadsheet => to_xlsx(result).map(Report::Spreadsheet),
        ExportKind::DelimitedText => to_csv(result).map(Report::DelimitedText),
        ExportKind::Display => Ok(Report::Display(DisplaySummary::from(result))),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductRow {
    pub product: String,
    pub total_sales: Option<Decimal>,
    pub sales_count: Option<usize>,
}

/// Joins product totals and counts on product name; a product missing from
/// either map keeps an empty cell.
pub fn product_rows(result: &AggregationResult) -> Vec<ProductRow> {
    result
        .totals_by_product
        .keys()
        .merge(result.count_by_product.keys())
        .dedup()
        .map(|product| ProductRow {
            product: product.clone(),
            total_sales: result.totals_by_product.get(product).copied(),
            sales_count: result.count_by_product.get(product).copied(),
        })
        .collect()
}

pub fn to_csv(result: &AggregationResult) -> Result<String, AnalyzerError> {
    let mut payload = write_csv_table(
        &PRODUCT_HEADERS,
        product_rows(result).into_iter().map(|row| {
            vec![
                row.product,
                row.total_sales.map(format_amount).unwrap_or_default(),
                row.sales_count.map(|c| c.to_string()).unwrap_or_default(),
            ]
        }),
    )?;
    payload.push_str("\n\n");
    payload.push_str(&write_csv_table(
        &MONTHLY_HEADERS,
        result
            .average_by_month
            .iter()
            .map(|(month, average)| vec![month.to_string(), format_amount(*average)]),
    )?);
    Ok(payload)
}

fn write_csv_table<I>(headers: &[&str], rows: I) -> Result<String, AnalyzerError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = io_utils::open_csv_writer(Vec::new(), io_utils::DEFAULT_CSV_DELIMITER);
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(&row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| AnalyzerError::MalformedInput(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| AnalyzerError::MalformedInput(err.to_string()))
}

pub fn to_xlsx(result: &AggregationResult) -> Result<Vec<u8>, AnalyzerError> {
    let mut book = umya_spreadsheet::new_file_empty_worksheet();

    let sheet = book
        .new_sheet(PRODUCT_SHEET)
        .map_err(|err| AnalyzerError::Spreadsheet(err.to_string()))?;
    write_header_row(sheet, &PRODUCT_HEADERS);
    for (row_idx, row) in product_rows(result).into_iter().enumerate() {
        let line = row_idx as u32 + 2;
        sheet.get_cell_mut((1u32, line)).set_value_string(row.product);
        if let Some(total) = row.total_sales.and_then(|t| t.to_f64()) {
            sheet.get_cell_mut((2u32, line)).set_value_number(total);
        }
        if let Some(count) = row.sales_count {
            sheet.get_cell_mut((3u32, line)).set_value_number(count as f64);
        }
    }

    let sheet = book
        .new_sheet(MONTHLY_SHEET)
        .map_err(|err| AnalyzerError::Spreadsheet(err.to_string()))?;
    write_header_row(sheet, &MONTHLY_HEADERS);
    for (row_idx, (month, average)) in result.average_by_month.iter().enumerate() {
        let line = row_idx as u32 + 2;
        sheet.get_cell_mut((1u32, line)).set_value_string(month.to_string());
        if let Some(average) = average.to_f64() {
            sheet.get_cell_mut((2u32, line)).set_value_number(average);
        }
    }

    let mut out = Cursor::new(Vec::new());
    umya_spreadsheet::writer::xlsx::write_writer(&book, &mut out)
        .map_err(|err| AnalyzerError::Spreadsheet(err.to_string()))?;
    Ok(out.into_inner())
}

fn write_header_row(sheet: &mut umya_spreadsheet::Worksheet, headers: &[&str]) {
    for (col_idx, header) in headers.iter().enumerate() {
        sheet
            .get_cell_mut((col_idx as u32 + 1, 1u32))
            .set_value_string(header.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyAverage {
    pub month: String,
    pub average: Decimal,
}

/// The summary shown after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplaySummary {
    pub total_sales: BTreeMap<String, Decimal>,
    /// Chronological, labelled `Mon YYYY`, rounded to cents.
    pub avg_sales_per_month: Vec<MonthlyAverage>,
    pub sales_count: BTreeMap<String, usize>,
    pub total_sales_sum: Decimal,
    pub total_records: usize,
    pub max_sales_value: Decimal,
}

impl From<&AggregationResult> for DisplaySummary {
    fn from(result: &AggregationResult) -> Self {
        Self {
            total_sales: result.totals_by_product.clone(),
            avg_sales_per_month: result
                .average_by_month
                .iter()
                .map(|(month, average)| MonthlyAverage {
                    month: month.label(),
                    average: average.round_dp(2),
                })
                .collect(),
            sales_count: result.count_by_product.clone(),
            total_sales_sum: result.grand_total,
            total_records: result.grand_count,
            max_sales_value: result.max_product_total,
        }
    }
}

impl DisplaySummary {
    /// Console rendering: product table, monthly table, then the grand figures.
    pub fn render_text(&self) -> String {
        let mut output = String::new();

        let headers = vec![
            "product".to_string(),
            "total_sales".to_string(),
            "sales_count".to_string(),
        ];
        let rows = self
            .total_sales
            .iter()
            .map(|(product, total)| {
                vec![
                    product.clone(),
                    format_amount(*total),
                    self.sales_count
                        .get(product)
                        .map(|c| c.to_string())
                        .unwrap_or_default(),
                ]
            })
            .collect::<Vec<_>>();
        output.push_str(&table::render_table(&headers, &rows));
        output.push('\n');

        let headers = vec!["month".to_string(), "average_sales".to_string()];
        let rows = self
            .avg_sales_per_month
            .iter()
            .map(|entry| vec![entry.month.clone(), format!("{:.2}", entry.average)])
            .collect::<Vec<_>>();
        output.push_str(&table::render_table(&headers, &rows));
        output.push('\n');

        let _ = writeln!(output, "Total sales: {}", format_amount(self.total_sales_sum));
        let _ = writeln!(output, "Total records: {}", self.total_records);
        let _ = writeln!(
            output,
            "Highest product total: {}",
            format_amount(self.max_sales_value)
        );
        output
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::{aggregate::aggregate, data::SalesRecord};

    fn scenario() -> AggregationResult {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        aggregate(&[
            SalesRecord::new("Car", Decimal::from(500), date(2024, 9, 1)),
            SalesRecord::new("Car", Decimal::from(300), date(2024, 9, 20)),
            SalesRecord::new("Bike", Decimal::from(100), date(2024, 10, 5)),
        ])
        .unwrap()
    }

    #[test]
    fn export_kind_parses_known_values_only() {
        assert_eq!("xlsx".parse::<ExportKind>().unwrap(), ExportKind::Spreadsheet);
        assert_eq!("csv".parse::<ExportKind>().unwrap(), ExportKind::DelimitedText);
        assert_eq!("display".parse::<ExportKind>().unwrap(), ExportKind::Display);
        let err = "pdf".parse::<ExportKind>().unwrap_err();
        assert!(matches!(err, AnalyzerError::UnsupportedExportKind { kind } if kind == "pdf"));
    }

    #[test]
    fn csv_export_stacks_tables_with_two_blank_lines() {
        let payload = to_csv(&scenario()).unwrap();
        assert_eq!(
            payload,
            "product_name,Total Sales,Sales Count\n\
             Bike,100,1\n\
             Car,800,2\n\
             \n\
             \n\
             Month,Average Sales\n\
             2024-09,400\n\
             2024-10,100\n"
        );
    }

    #[test]
    fn csv_export_quotes_only_when_needed() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let result = aggregate(&[SalesRecord::new("Nuts, salted", Decimal::new(125, 2), date)])
            .unwrap();
        let payload = to_csv(&result).unwrap();
        assert!(payload.contains("\"Nuts, salted\",1.25,1\n"));
    }

    #[test]
    fn product_rows_leave_missing_values_empty() {
        let mut result = scenario();
        result.count_by_product.remove("Bike");
        result
            .count_by_product
            .insert("Scooter".to_string(), 4);
        let rows = product_rows(&result);
        let products = rows.iter().map(|r| r.product.as_str()).collect::<Vec<_>>();
        assert_eq!(products, vec!["Bike", "Car", "Scooter"]);
        assert_eq!(rows[0].sales_count, None);
        assert_eq!(rows[2].total_sales, None);

        let payload = to_csv(&result).unwrap();
        assert!(payload.contains("Bike,100,\n"));
        assert!(payload.contains("Scooter,,4\n"));
    }

    #[test]
    fn display_summary_labels_months_and_rounds_averages() {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        let result = aggregate(&[
            SalesRecord::new("Car", Decimal::from(100), date(2024, 9, 1)),
            SalesRecord::new("Car", Decimal::from(100), date(2024, 9, 2)),
            SalesRecord::new("Bike", Decimal::from(101), date(2024, 9, 3)),
            SalesRecord::new("Bike", Decimal::from(7), date(2023, 12, 3)),
        ])
        .unwrap();
        let summary = DisplaySummary::from(&result);
        assert_eq!(
            summary.avg_sales_per_month,
            vec![
                MonthlyAverage {
                    month: "Dec 2023".to_string(),
                    average: Decimal::from(7),
                },
                MonthlyAverage {
                    month: "Sep 2024".to_string(),
                    average: Decimal::new(10033, 2),
                },
            ]
        );
        assert_eq!(summary.total_sales_sum, Decimal::from(308));
        assert_eq!(summary.total_records, 4);
        assert_eq!(summary.max_sales_value, Decimal::from(200));
    }

    #[test]
    fn display_text_lists_products_months_and_totals() {
        let text = DisplaySummary::from(&scenario()).render_text();
        assert!(text.contains("Car"));
        assert!(text.contains("Sep 2024"));
        assert!(text.contains("400.00"));
        assert!(text.contains("Total sales: 900"));
        assert!(text.contains("Highest product total: 800"));
    }

    #[test]
    fn xlsx_export_writes_both_sheets() {
        use calamine::{Data, Reader, open_workbook_auto_from_rs};

        let bytes = to_xlsx(&scenario()).unwrap();
        let mut book = open_workbook_auto_from_rs(Cursor::new(bytes)).unwrap();
        assert_eq!(book.sheet_names(), vec![PRODUCT_SHEET, MONTHLY_SHEET]);

        let products = book.worksheet_range(PRODUCT_SHEET).unwrap();
        let text = |s: &str| Data::String(s.to_string());
        assert_eq!(products.get_value((0, 0)), Some(&text("product_name")));
        assert_eq!(products.get_value((0, 1)), Some(&text("Total Sales")));
        assert_eq!(products.get_value((0, 2)), Some(&text("Sales Count")));
        assert_eq!(products.get_value((1, 0)), Some(&text("Bike")));
        assert_eq!(products.get_value((2, 1)), Some(&Data::Float(800.0)));
        assert_eq!(products.get_value((2, 2)), Some(&Data::Float(2.0)));

        let monthly = book.worksheet_range(MONTHLY_SHEET).unwrap();
        assert_eq!(monthly.get_value((0, 0)), Some(&text("Month")));
        assert_eq!(monthly.get_value((0, 1)), Some(&text("Average Sales")));
        assert_eq!(monthly.get_value((1, 0)), Some(&text("2024-09")));
        assert_eq!(monthly.get_value((2, 1)), Some(&Data::Float(100.0)));
    }

    #[test]
    fn render_dispatches_on_kind() {
        let result = scenario();
        assert!(matches!(
            render(&result, ExportKind::DelimitedText).unwrap(),
            Report::DelimitedText(_)
        ));
        assert!(matches!(
            render(&result, ExportKind::Display).unwrap(),
            Report::Display(_)
        ));
    }
}
