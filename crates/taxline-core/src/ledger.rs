//! Purchase and sales ledger projections.
//!
//! This module defines [`LedgerKind`] for choosing one side of a [`MonthlyRecord`]
//! and [`LedgerEntry`], the side-agnostic view of that side.

use serde::{Deserialize, Serialize};

use crate::types::MonthlyRecord;

/// Side of the monthly totals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    /// Purchases (compras).
    Purchases,
    /// Sales (ventas).
    Sales,
}

impl LedgerKind {
    /// Spanish label used in prompts and log lines.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Purchases => "compras",
            Self::Sales => "ventas",
        }
    }

    /// Projects one side of a monthly record.
    #[must_use]
    pub fn project(&self, record: &MonthlyRecord) -> LedgerEntry {
        let period = record.period.clone();
        match self {
            Self::Purchases => LedgerEntry {
                period,
                total: record.total_purchases,
                discount_document: record.total_purchases_discount_document,
                exempt: record.total_purchases_exempt,
                iva: record.total_purchases_iva,
                net_with_exempt: record.total_purchases_net_with_exempt_purchases,
                neto: record.total_purchases_neto,
                tax_common_use: record.total_purchases_tax_common_use,
                tax_no_recoverable: record.total_purchases_tax_no_recoverable,
                tax_recoverable: record.total_purchases_tax_recoverable,
            },
            Self::Sales => LedgerEntry {
                period,
                total: record.total_sales,
                discount_document: record.total_sales_discount_document,
                exempt: record.total_sales_exempt,
                iva: record.total_sales_iva,
                net_with_exempt: record.total_sales_net_with_exempt_sales,
                neto: record.total_sales_neto,
                tax_common_use: record.total_sales_tax_common_use,
                tax_no_recoverable: record.total_sales_tax_no_recoverable,
                tax_recoverable: record.total_sales_tax_recoverable,
            },
        }
    }

    /// Projects every record, keeping period order.
    #[must_use]
    pub fn project_all(&self, records: &[MonthlyRecord]) -> Vec<LedgerEntry> {
        records.iter().map(|r| self.project(r)).collect()
    }
}

/// One period of either purchases or sales.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Period label.
    pub period: String,
    /// Total amount.
    pub total: Option<f64>,
    /// Amount backed by discount documents.
    pub discount_document: Option<f64>,
    /// Exempt amount.
    pub exempt: Option<f64>,
    /// VAT amount.
    pub iva: Option<f64>,
    /// Net amount including exempt.
    pub net_with_exempt: Option<f64>,
    /// Net amount.
    pub neto: Option<f64>,
    /// Tax of common use.
    pub tax_common_use: Option<f64>,
    /// Non-recoverable tax.
    pub tax_no_recoverable: Option<f64>,
    /// Recoverable tax.
    pub tax_recoverable: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_picks_the_right_side() {
        let record = MonthlyRecord::new("2024-03")
            .with_purchases(100.0, 19.0)
            .with_sales(300.0, 57.0);

        let purchases = LedgerKind::Purchases.project(&record);
        assert_eq!(purchases.period, "2024-03");
        assert_eq!(purchases.total, Some(100.0));
        assert_eq!(purchases.iva, Some(19.0));

        let sales = LedgerKind::Sales.project(&record);
        assert_eq!(sales.total, Some(300.0));
        assert_eq!(sales.iva, Some(57.0));
        assert_eq!(sales.exempt, None);
    }

    #[test]
    fn test_labels() {
        assert_eq!(LedgerKind::Purchases.label(), "compras");
        assert_eq!(LedgerKind::Sales.label(), "ventas");
    }
}
