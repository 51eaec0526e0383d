//! Table rows for the provider view.
//!
//! A provider table lists, per visit section, one row per CPT code followed
//! by the section's `Total` row, then one row per KPI.

use crate::models::{Amount, MonthlyBucket, ProviderSummary, CHARGES_KPI};
use serde::Serialize;

/// Label of the row built from the claims CSV.
pub const CSV_ROW_LABEL: &str = "Total Billed from CSV";

/// Kind of table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    /// One CPT code within a section.
    Data,
    /// Section subtotal.
    Total,
    /// Monthly KPI.
    Kpi,
}

/// One rendered table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRow {
    pub section: String,
    pub kind: RowKind,
    pub label: String,
    pub values: [Amount; 12],
    pub total: Amount,
    pub is_currency: bool,
}

impl TableRow {
    pub fn from_bucket(
        section: &str,
        kind: RowKind,
        label: &str,
        bucket: &MonthlyBucket,
        is_currency: bool,
    ) -> Self {
        Self {
            section: section.to_string(),
            kind,
            label: label.to_string(),
            values: bucket.values(),
            total: bucket.total(),
            is_currency,
        }
    }
}

/// Rows for one table, with the name it is shown under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataTable {
    pub title: String,
    pub rows: Vec<TableRow>,
}

impl DataTable {
    pub fn sections(&self) -> Vec<&str> {
        let mut sections: Vec<&str> = Vec::new();
        for row in &self.rows {
            if row.kind != RowKind::Kpi && sections.last() != Some(&row.section.as_str()) {
                sections.push(&row.section);
            }
        }
        sections
    }
}

/// Build the table for one provider.
pub fn provider_table(provider: &str, summary: &ProviderSummary, currency_kpis: &[String]) -> DataTable {
    let mut rows = Vec::new();

    for (category, section) in &summary.visit_data {
        let section_name = category.label();
        for (code, bucket) in &section.cpt_codes {
            rows.push(TableRow::from_bucket(
                section_name,
                RowKind::Data,
                code,
                bucket,
                false,
            ));
        }
        rows.push(TableRow::from_bucket(
            section_name,
            RowKind::Total,
            "Total",
            &section.totals,
            false,
        ));
    }

    for (kpi, bucket) in &summary.monthly_kpis {
        let is_currency = currency_kpis.iter().any(|c| c == kpi);
        rows.push(TableRow::from_bucket(kpi, RowKind::Kpi, kpi, bucket, is_currency));
    }

    DataTable {
        title: provider.to_string(),
        rows,
    }
}

/// Single-row table of claims CSV totals.
pub fn csv_totals_table(bucket: &MonthlyBucket) -> DataTable {
    DataTable {
        title: CHARGES_KPI.to_string(),
        rows: vec![TableRow::from_bucket(
            CHARGES_KPI,
            RowKind::Data,
            CSV_ROW_LABEL,
            bucket,
            true,
        )],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Month, VisitCategory, TOTAL_VISITS_KPI};

    fn summary() -> ProviderSummary {
        let mut summary = ProviderSummary::seeded();
        let initial = summary
            .visit_data
            .get_mut(&VisitCategory::InitialVisits)
            .unwrap();
        for code in ["99305", "99304"] {
            let bucket = initial.cpt_codes.entry(code.to_string()).or_default();
            bucket.add(Month::April, Amount::from_units(1));
            initial.totals.add(Month::April, Amount::from_units(1));
        }
        summary
            .monthly_kpis
            .get_mut(CHARGES_KPI)
            .unwrap()
            .add(Month::April, Amount::from_hundredths(25050));
        summary
    }

    #[test]
    fn test_provider_table_layout() {
        let table = provider_table("Smith", &summary(), &[CHARGES_KPI.to_string()]);
        let labels: Vec<_> = table.rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["99304", "99305", "Total", "Total", "Total", "Charges", "Total Visits"]
        );
        assert_eq!(
            table.sections(),
            vec!["Initial Visits", "Subsequent Visits", "Discharge"]
        );

        let section_total = &table.rows[2];
        assert_eq!(section_total.kind, RowKind::Total);
        assert_eq!(section_total.total, Amount::from_units(2));

        let charges = table.rows.iter().find(|r| r.label == CHARGES_KPI).unwrap();
        assert!(charges.is_currency);
        assert_eq!(charges.values[Month::April.index()], Amount::from_hundredths(25050));

        let visits = table.rows.iter().find(|r| r.label == TOTAL_VISITS_KPI).unwrap();
        assert!(!visits.is_currency);
    }

    #[test]
    fn test_csv_totals_table() {
        let mut bucket = MonthlyBucket::new();
        bucket.add(Month::May, Amount::from_units(10));
        let table = csv_totals_table(&bucket);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].label, CSV_ROW_LABEL);
        assert!(table.rows[0].is_currency);
        assert_eq!(table.rows[0].total, Amount::from_units(10));
    }
}
