//! Monthly aggregation of claim data.
//!
//! This module turns per-record data into per-provider monthly buckets and
//! sums the claims CSV into a single month-by-month row. Every rejected row
//! is counted in [`IngestStats`] instead of failing the batch.

use crate::ingest::reports::{DetailedReport, CHARGES_BY_PROVIDER};
use crate::models::{
    parse_service_date, Amount, ChargeLine, ClaimRow, CsvClaimRow, KpiData, Month,
    MonthlyBucket, ProviderSummary, Record, VisitCategory, CHARGES_KPI, NO_CPT_CODE,
    TOTAL_VISITS_KPI,
};
use chrono::Datelike;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Why a row was left out of the aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Missing or unparsable date of service.
    BadDate,
    /// Missing or non-numeric amount.
    BadAmount,
    /// CPT code outside every visit section.
    Uncategorized,
    /// No provider name.
    MissingProvider,
    /// Report month key that is not a month.
    UnknownMonth,
    /// Adding the row would overflow a monthly bucket.
    Overflow,
}

/// Counters for rows accepted and dropped during aggregation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub accepted: usize,
    pub dropped_bad_date: usize,
    pub dropped_bad_amount: usize,
    pub dropped_uncategorized: usize,
    pub dropped_missing_provider: usize,
    pub dropped_unknown_month: usize,
    pub dropped_overflow: usize,
}

impl IngestStats {
    pub fn record_drop(&mut self, reason: DropReason) {
        match reason {
            DropReason::BadDate => self.dropped_bad_date += 1,
            DropReason::BadAmount => self.dropped_bad_amount += 1,
            DropReason::Uncategorized => self.dropped_uncategorized += 1,
            DropReason::MissingProvider => self.dropped_missing_provider += 1,
            DropReason::UnknownMonth => self.dropped_unknown_month += 1,
            DropReason::Overflow => self.dropped_overflow += 1,
        }
    }

    /// Total number of rows left out.
    pub fn dropped(&self) -> usize {
        self.dropped_bad_date
            + self.dropped_bad_amount
            + self.dropped_uncategorized
            + self.dropped_missing_provider
            + self.dropped_unknown_month
            + self.dropped_overflow
    }
}

/// Result of aggregating a batch of rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    pub summaries: KpiData,
    pub stats: IngestStats,
    /// Calendar years seen in accepted dates. More than one means months collapsed.
    pub years: BTreeSet<i32>,
}

/// Accumulates visits and charges into per-provider summaries.
#[derive(Debug, Default)]
pub struct Aggregator {
    summaries: KpiData,
    stats: IngestStats,
    years: BTreeSet<i32>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one visit record.
    ///
    /// The record counts one visit in its CPT row, its section total and
    /// `Total Visits`, and adds its billed amount to `Charges`.
    pub fn add_record(&mut self, record: &Record) -> Result<(), DropReason> {
        let result = self.try_add_record(record);
        if let Err(reason) = result {
            self.stats.record_drop(reason);
        }
        result
    }

    fn try_add_record(&mut self, record: &Record) -> Result<(), DropReason> {
        let date = record.service_date().ok_or(DropReason::BadDate)?;
        let amount = record.amount().ok_or(DropReason::BadAmount)?;
        // Names are keys as written; "Smith" and "Smith " are two providers.
        let provider = record.provider_name.as_str();
        if provider.trim().is_empty() {
            return Err(DropReason::MissingProvider);
        }
        let month = Month::from_number(date.month()).ok_or(DropReason::BadDate)?;

        let code = record
            .cpt_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(NO_CPT_CODE);

        self.accumulate(
            provider,
            record.visit_category,
            code,
            month,
            Amount::from_units(1),
            amount,
        )?;
        self.years.insert(date.year());
        Ok(())
    }

    /// Add one "Charges By Provider" line reported for `month`.
    ///
    /// Units and amounts that do not parse count as zero.
    pub fn add_charge_line(&mut self, month: Month, line: &ChargeLine) -> Result<(), DropReason> {
        let result = if line.provider_name.is_empty() {
            Err(DropReason::MissingProvider)
        } else {
            match VisitCategory::from_cpt_code(&line.code) {
                Some(category) => self.accumulate(
                    &line.provider_name,
                    category,
                    &line.code,
                    month,
                    line.visits(),
                    line.charges(),
                ),
                None => Err(DropReason::Uncategorized),
            }
        };

        if let Err(reason) = result {
            self.stats.record_drop(reason);
        }
        result
    }

    /// Count a row rejected before it became a record.
    pub fn record_drop(&mut self, reason: DropReason) {
        self.stats.record_drop(reason);
    }

    fn accumulate(
        &mut self,
        provider: &str,
        category: VisitCategory,
        code: &str,
        month: Month,
        visits: Amount,
        charges: Amount,
    ) -> Result<(), DropReason> {
        // Every bucket the row touches is checked before any is changed.
        if let Some(summary) = self.summaries.get(provider) {
            let fits = |bucket: Option<&MonthlyBucket>, amount: Amount| {
                bucket.map_or(true, |b| b.get(month).checked_add(amount).is_some())
            };
            let section = summary.visit_data.get(&category);
            let fits_all = fits(section.and_then(|s| s.cpt_codes.get(code)), visits)
                && fits(section.map(|s| &s.totals), visits)
                && fits(summary.monthly_kpis.get(TOTAL_VISITS_KPI), visits)
                && fits(summary.monthly_kpis.get(CHARGES_KPI), charges);
            if !fits_all {
                return Err(DropReason::Overflow);
            }
        }

        let summary = self
            .summaries
            .entry(provider.to_string())
            .or_insert_with(ProviderSummary::seeded);

        let section = summary.visit_data.entry(category).or_default();
        section
            .cpt_codes
            .entry(code.to_string())
            .or_default()
            .add(month, visits);
        section.totals.add(month, visits);

        summary
            .monthly_kpis
            .entry(TOTAL_VISITS_KPI.to_string())
            .or_default()
            .add(month, visits);
        summary
            .monthly_kpis
            .entry(CHARGES_KPI.to_string())
            .or_default()
            .add(month, charges);

        self.stats.accepted += 1;
        Ok(())
    }

    /// Finish the batch.
    pub fn finish(self) -> Aggregation {
        if self.years.len() > 1 {
            warn!(
                "Data spans years {:?}; months from different years share one bucket",
                self.years
            );
        }

        info!(
            "Aggregated {} rows into {} providers ({} dropped)",
            self.stats.accepted,
            self.summaries.len(),
            self.stats.dropped()
        );

        Aggregation {
            summaries: self.summaries,
            stats: self.stats,
            years: self.years,
        }
    }
}

/// Aggregate a batch of visit records.
pub fn aggregate_records<'a, I>(records: I) -> Aggregation
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut aggregator = Aggregator::new();
    for record in records {
        if let Err(reason) = aggregator.add_record(record) {
            debug!("Dropped record for {:?}: {:?}", record.provider_name, reason);
        }
    }
    aggregator.finish()
}

/// Turn a claims export row into a visit record.
///
/// The visit section comes from the procedure code; rows whose code maps to
/// no section are rejected. Date and amount are carried as-is and checked
/// when the record is aggregated.
pub fn record_from_claim(row: &ClaimRow) -> Result<Record, DropReason> {
    let code = row
        .procedure_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    let visit_category = code
        .and_then(VisitCategory::from_cpt_code)
        .ok_or(DropReason::Uncategorized)?;

    Ok(Record {
        date_of_service: row.date_of_service.clone().unwrap_or_default(),
        billed_amount: row.primary_billed_amount.clone().unwrap_or_default(),
        facility_name: row.facility_name.clone(),
        provider_name: row.rendering_provider_name.clone(),
        visit_category,
        cpt_code: code.map(String::from),
    })
}

/// Aggregate claims export rows into provider summaries.
pub fn aggregate_claims(rows: &[ClaimRow]) -> Aggregation {
    let mut aggregator = Aggregator::new();
    for row in rows {
        match record_from_claim(row) {
            Ok(record) => {
                let _ = aggregator.add_record(&record);
            }
            Err(reason) => aggregator.record_drop(reason),
        }
    }
    aggregator.finish()
}

/// Aggregate the "Charges By Provider" rows of a combined monthly report.
pub fn aggregate_detailed_report(report: &DetailedReport) -> Aggregation {
    let mut aggregator = Aggregator::new();

    for (month_key, reports) in report {
        let Some(rows) = reports.get(CHARGES_BY_PROVIDER) else {
            debug!("No {} report for {}", CHARGES_BY_PROVIDER, month_key);
            continue;
        };

        let Some(month) = Month::parse(month_key) else {
            warn!(
                "Skipping {} rows under unrecognized month {:?}",
                rows.len(),
                month_key
            );
            for _ in rows {
                aggregator.record_drop(DropReason::UnknownMonth);
            }
            continue;
        };

        for row in rows {
            let _ = aggregator.add_charge_line(month, &ChargeLine::from_row(row));
        }
    }

    aggregator.finish()
}

/// Billed amounts of the claims CSV summed by month.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlyTotals {
    pub bucket: MonthlyBucket,
    pub stats: IngestStats,
    /// Calendar years seen in accepted dates.
    pub years: BTreeSet<i32>,
}

/// Sum `primary_billed_amount` by month of `date_of_service`.
pub fn monthly_totals(rows: &[CsvClaimRow]) -> MonthlyTotals {
    let mut totals = MonthlyTotals::default();

    for row in rows {
        let Some(date) = parse_service_date(&row.date_of_service) else {
            totals.stats.record_drop(DropReason::BadDate);
            continue;
        };
        let Some(amount) = Amount::parse(&row.primary_billed_amount) else {
            totals.stats.record_drop(DropReason::BadAmount);
            continue;
        };
        let Some(month) = Month::from_number(date.month()) else {
            totals.stats.record_drop(DropReason::BadDate);
            continue;
        };
        if totals.bucket.get(month).checked_add(amount).is_none() {
            totals.stats.record_drop(DropReason::Overflow);
            continue;
        }
        totals.bucket.add(month, amount);
        totals.years.insert(date.year());
        totals.stats.accepted += 1;
    }

    if totals.years.len() > 1 {
        warn!(
            "CSV dates span years {:?}; months from different years share one bucket",
            totals.years
        );
    }

    debug!(
        "Summed {} CSV rows, total {} ({} dropped)",
        totals.stats.accepted,
        totals.bucket.total(),
        totals.stats.dropped()
    );

    totals
}
