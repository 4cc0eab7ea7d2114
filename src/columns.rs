//! Header resolution for uploaded sales tables.
//!
//! Uploaded files name their columns freely ("Product Name", "item",
//! "TOTAL", ...). Every file must still supply the three canonical fields,
//! so each header is normalized (trimmed, lowercased, inner spaces replaced
//! by underscores) and compared against a fixed alias table:
//!
//! | field          | accepted headers                                     |
//! |----------------|------------------------------------------------------|
//! | `product_name` | product name, productname, product, item             |
//! | `sales`        | sales, amount, total, total_sales, value             |
//! | `date`         | date, transaction_date, sales_date                   |
//!
//! Resolution is all-or-nothing: a file that satisfies two fields but not the
//! third is rejected.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AnalyzerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    ProductName,
    Sales,
    Date,
}

impl CanonicalField {
    /// Declared resolution order.
    pub const ALL: [CanonicalField; 3] = [
        CanonicalField::ProductName,
        CanonicalField::Sales,
        CanonicalField::Date,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalField::ProductName => "product_name",
            CanonicalField::Sales => "sales",
            CanonicalField::Date => "date",
        }
    }

    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            CanonicalField::ProductName => &["product name", "productname", "product", "item"],
            CanonicalField::Sales => &["sales", "amount", "total", "total_sales", "value"],
            CanonicalField::Date => &["date", "transaction_date", "sales_date"],
        }
    }

    fn accepts(self, normalized_header: &str) -> bool {
        self.aliases()
            .iter()
            .any(|alias| normalize_header(alias) == normalized_header)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trims, lowercases, and replaces spaces with underscores.
pub fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase().replace(' ', "_")
}

/// The header chosen for one canonical field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    pub header: String,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    product_name: ResolvedColumn,
    sales: ResolvedColumn,
    date: ResolvedColumn,
}

impl ColumnMapping {
    pub fn get(&self, field: CanonicalField) -> &ResolvedColumn {
        match field {
            CanonicalField::ProductName => &self.product_name,
            CanonicalField::Sales => &self.sales,
            CanonicalField::Date => &self.date,
        }
    }

    pub fn header(&self, field: CanonicalField) -> &str {
        &self.get(field).header
    }

    pub fn index(&self, field: CanonicalField) -> usize {
        self.get(field).index
    }
}

/// Maps each canonical field to the first header (in file order) matching one
/// of its aliases.
pub fn resolve_columns<S: AsRef<str>>(headers: &[S]) -> Result<ColumnMapping, AnalyzerError> {
    let normalized = headers
        .iter()
        .map(|h| normalize_header(h.as_ref()))
        .collect::<Vec<_>>();

    let find = |field: CanonicalField| -> Result<ResolvedColumn, AnalyzerError> {
        normalized
            .iter()
            .position(|candidate| field.accepts(candidate))
            .map(|index| ResolvedColumn {
                header: headers[index].as_ref().to_string(),
                index,
            })
            .ok_or_else(|| AnalyzerError::missing_column(field))
    };

    Ok(ColumnMapping {
        product_name: find(CanonicalField::ProductName)?,
        sales: find(CanonicalField::Sales)?,
        date: find(CanonicalField::Date)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_header_trims_lowercases_and_underscores() {
        assert_eq!(normalize_header("  Product Name "), "product_name");
        assert_eq!(normalize_header("TOTAL_SALES"), "total_sales");
        assert_eq!(normalize_header("Sales Date"), "sales_date");
    }

    #[test]
    fn resolve_columns_picks_first_matching_header() {
        let headers = ["Name", "Product", "Item", "Amount", "Sales", "Transaction Date"];
        let mapping = resolve_columns(&headers).unwrap();
        assert_eq!(mapping.header(CanonicalField::ProductName), "Product");
        assert_eq!(mapping.index(CanonicalField::ProductName), 1);
        assert_eq!(mapping.header(CanonicalField::Sales), "Amount");
        assert_eq!(mapping.header(CanonicalField::Date), "Transaction Date");
        assert_eq!(mapping.index(CanonicalField::Date), 5);
    }

    #[test]
    fn spaced_alias_matches_underscored_header() {
        let mapping = resolve_columns(&["product_name", "value", "DATE"]).unwrap();
        assert_eq!(mapping.header(CanonicalField::ProductName), "product_name");
    }

    #[test]
    fn resolve_columns_rejects_unknown_date_header() {
        let err = resolve_columns(&["Item", "Total", "TxnDate"]).unwrap_err();
        match err {
            AnalyzerError::MissingColumn { field, aliases } => {
                assert_eq!(field, CanonicalField::Date);
                assert_eq!(aliases, CanonicalField::Date.aliases());
            }
            other => panic!("expected missing column, got {other:?}"),
        }
    }

    #[test]
    fn missing_column_message_lists_aliases() {
        let err = resolve_columns(&["Item", "Date"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Required column for 'sales' not found. Expected one of: \
             ['sales', 'amount', 'total', 'total_sales', 'value']"
        );
    }
}
