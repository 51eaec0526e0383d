//! Data models for the KPI dashboard.
//!
//! This module contains the core data structures shared by the loaders,
//! the aggregation and the renderers: calendar months, fixed-point amounts,
//! monthly buckets and the per-provider summary shape.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;
use tracing::{debug, warn};

/// KPI counting one per visit.
pub const TOTAL_VISITS_KPI: &str = "Total Visits";

/// KPI summing billed amounts.
pub const CHARGES_KPI: &str = "Charges";

/// Detail row label for records that carry no CPT code.
pub const NO_CPT_CODE: &str = "(none)";

/// Calendar month. Every month key is normalized to this enum at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Month {
    January,
    February,
    March,
    April,
    May,
    June,
    July,
    August,
    September,
    October,
    November,
    December,
}

impl Month {
    /// All months in calendar order.
    pub const ALL: [Month; 12] = [
        Month::January,
        Month::February,
        Month::March,
        Month::April,
        Month::May,
        Month::June,
        Month::July,
        Month::August,
        Month::September,
        Month::October,
        Month::November,
        Month::December,
    ];

    /// Month from its calendar number (1 = January).
    pub fn from_number(number: u32) -> Option<Self> {
        if (1..=12).contains(&number) {
            Some(Self::ALL[(number - 1) as usize])
        } else {
            None
        }
    }

    /// Zero-based position in the year.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Calendar number (1 = January).
    pub fn number(self) -> u32 {
        self.index() as u32 + 1
    }

    pub fn name(self) -> &'static str {
        match self {
            Month::January => "January",
            Month::February => "February",
            Month::March => "March",
            Month::April => "April",
            Month::May => "May",
            Month::June => "June",
            Month::July => "July",
            Month::August => "August",
            Month::September => "September",
            Month::October => "October",
            Month::November => "November",
            Month::December => "December",
        }
    }

    /// Three-letter abbreviation ("Jan").
    pub fn abbr(self) -> &'static str {
        &self.name()[..3]
    }

    /// Resolve a month key: full name, abbreviation or number, case-insensitive.
    pub fn parse(key: &str) -> Option<Self> {
        let key = key.trim();
        if let Ok(number) = key.parse::<u32>() {
            return Self::from_number(number);
        }
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(key) || m.abbr().eq_ignore_ascii_case(key))
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Fixed-point value with six fractional digits, stored as millionths.
///
/// Sums of amounts are exact, so accumulating records in any order gives
/// the same buckets. Rounding to cents happens only when a value is
/// displayed. Visit counts use whole amounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

/// Fractional steps per whole unit.
const SCALE: i64 = 1_000_000;
const FRACTION_DIGITS: usize = 6;

/// Largest magnitude accepted from input, in whole units.
pub const MAX_INPUT_UNITS: i64 = 1_000_000_000_000;

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_hundredths(hundredths: i64) -> Self {
        Amount(hundredths.saturating_mul(SCALE / 100))
    }

    /// Whole units (a visit count, whole dollars).
    pub fn from_units(units: i64) -> Self {
        Amount(units.saturating_mul(SCALE))
    }

    /// Converts a float, rounding to the nearest millionth.
    ///
    /// Values beyond [`MAX_INPUT_UNITS`] are `None`.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || value.abs() > MAX_INPUT_UNITS as f64 {
            return None;
        }
        Some(Amount((value * SCALE as f64).round() as i64))
    }

    /// Parses decimal text such as `100`, `-12.5`, `$1,234.56`.
    ///
    /// Digits past the sixth decimal place round half away from zero.
    /// Anything else (empty text, letters, a lone sign, a magnitude beyond
    /// [`MAX_INPUT_UNITS`]) is `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (negative, rest) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let rest = rest.strip_prefix('$').unwrap_or(rest);
        let (int_part, frac_part) = rest.split_once('.').unwrap_or((rest, ""));

        let int_digits: String = int_part.chars().filter(|c| *c != ',').collect();
        if int_digits.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_digits.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }

        let whole: i64 = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse().ok()?
        };
        if whole > MAX_INPUT_UNITS {
            return None;
        }

        let mut digits = frac_part.bytes().map(|b| i64::from(b - b'0'));
        let mut frac = 0;
        for _ in 0..FRACTION_DIGITS {
            frac = frac * 10 + digits.next().unwrap_or(0);
        }
        let round_up = digits.next().is_some_and(|d| d >= 5);

        let mut value = whole * SCALE + frac;
        if round_up {
            value += 1;
        }
        if value > MAX_INPUT_UNITS * SCALE {
            return None;
        }
        Some(Amount(if negative { -value } else { value }))
    }

    /// Rounded to cents, half away from zero.
    pub fn hundredths(self) -> i64 {
        round_div(self.0, SCALE / 100)
    }

    /// Rounded to whole units, half away from zero.
    pub fn rounded_units(self) -> i64 {
        round_div(self.0, SCALE)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }

    /// Drops the fractional part, rounding toward zero.
    pub fn truncate(self) -> Self {
        Amount(self.0 / SCALE * SCALE)
    }

    pub fn is_whole(self) -> bool {
        self.0 % SCALE == 0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `None` when the sum does not fit.
    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }
}

fn round_div(value: i64, divisor: i64) -> i64 {
    let half = divisor / 2;
    if value < 0 {
        -(((value.unsigned_abs() + half as u64) / divisor as u64) as i64)
    } else {
        (value + half) / divisor
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cents = self.hundredths();
        let sign = if cents < 0 { "-" } else { "" };
        let abs = cents.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

// Accumulation paths that must not lose data use `checked_add`; plain
// addition saturates.
impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        *self = *self + rhs;
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, Add::add)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_whole() {
            serializer.serialize_i64(self.0 / SCALE)
        } else {
            serializer.serialize_f64(self.to_f64())
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Amount::from_f64(value).ok_or_else(|| de::Error::custom("amount out of range"))
    }
}

/// Twelve monthly accumulators. The total is always derived from the months.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "BTreeMap<String, Amount>")]
pub struct MonthlyBucket {
    values: [Amount; 12],
}

impl MonthlyBucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, month: Month) -> Amount {
        self.values[month.index()]
    }

    pub fn add(&mut self, month: Month, amount: Amount) {
        self.values[month.index()] += amount;
    }

    /// Sum over all twelve months.
    pub fn total(&self) -> Amount {
        self.values.iter().copied().sum()
    }

    pub fn values(&self) -> [Amount; 12] {
        self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (Month, Amount)> + '_ {
        Month::ALL.into_iter().map(move |m| (m, self.get(m)))
    }

    pub fn merge(&mut self, other: &MonthlyBucket) {
        for (month, amount) in other.iter() {
            self.add(month, amount);
        }
    }
}

impl From<BTreeMap<String, Amount>> for MonthlyBucket {
    fn from(raw: BTreeMap<String, Amount>) -> Self {
        let mut bucket = MonthlyBucket::default();
        let mut seen = [false; 12];
        let mut declared_totals = Vec::new();

        // BTreeMap order puts "Jan" before "January", so the abbreviation wins.
        for (key, value) in raw {
            if let Some(month) = Month::parse(&key) {
                if seen[month.index()] {
                    warn!(key = %key, "Duplicate key for {}, keeping the first value", month);
                    continue;
                }
                seen[month.index()] = true;
                bucket.add(month, value);
            } else if key.eq_ignore_ascii_case("total") || key.eq_ignore_ascii_case("grand total")
            {
                declared_totals.push((key, value));
            } else {
                debug!(key = %key, "Ignoring unknown monthly key");
            }
        }

        let total = bucket.total();
        for (key, declared) in declared_totals {
            if declared != total {
                warn!(
                    "Declared {} {} differs from the monthly sum {}",
                    key, declared, total
                );
            }
        }

        bucket
    }
}

impl Serialize for MonthlyBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let non_zero: Vec<_> = self.iter().filter(|(_, v)| !v.is_zero()).collect();
        let mut map = serializer.serialize_map(Some(non_zero.len() + 1))?;
        for (month, value) in non_zero {
            map.serialize_entry(month.name(), &value)?;
        }
        map.serialize_entry("Total", &self.total())?;
        map.end()
    }
}

/// Visit section of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VisitCategory {
    InitialVisits,
    SubsequentVisits,
    Discharge,
}

impl VisitCategory {
    /// All sections in display order.
    pub const ALL: [VisitCategory; 3] = [
        VisitCategory::InitialVisits,
        VisitCategory::SubsequentVisits,
        VisitCategory::Discharge,
    ];

    pub fn label(self) -> &'static str {
        match self {
            VisitCategory::InitialVisits => "Initial Visits",
            VisitCategory::SubsequentVisits => "Subsequent Visits",
            VisitCategory::Discharge => "Discharge",
        }
    }

    /// Section for a nursing-facility E/M code; other codes belong to none.
    pub fn from_cpt_code(code: &str) -> Option<Self> {
        let code: u32 = code.trim().parse().ok()?;
        match code {
            99304..=99306 => Some(VisitCategory::InitialVisits),
            99307..=99310 => Some(VisitCategory::SubsequentVisits),
            99315..=99316 => Some(VisitCategory::Discharge),
            _ => None,
        }
    }
}

impl fmt::Display for VisitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Unrecognized visit category name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown visit category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for VisitCategory {
    type Err = UnknownCategory;

    /// Accepts "Initial Visits", "initial visit", "initial_visits", "Discharges", ...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', " ");
        let singular = normalized.trim_end_matches('s');
        VisitCategory::ALL
            .into_iter()
            .find(|c| c.label().to_lowercase().trim_end_matches('s') == singular)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

impl Serialize for VisitCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for VisitCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Parses a date of service in the formats seen in claims exports.
pub fn parse_service_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if text.contains('/') {
        let short_year = text.rsplit('/').next().is_some_and(|y| y.len() == 2);
        let format = if short_year { "%m/%d/%y" } else { "%m/%d/%Y" };
        return NaiveDate::parse_from_str(text, format).ok();
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Some(datetime.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .into_iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|datetime| datetime.date())
}

/// One claim/visit event.
///
/// Date and amount keep their source text so the aggregation can count
/// the rows it rejects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub date_of_service: String,
    pub billed_amount: String,
    pub facility_name: String,
    pub provider_name: String,
    pub visit_category: VisitCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpt_code: Option<String>,
}

impl Record {
    pub fn service_date(&self) -> Option<NaiveDate> {
        parse_service_date(&self.date_of_service)
    }

    pub fn amount(&self) -> Option<Amount> {
        Amount::parse(&self.billed_amount)
    }
}

/// Detail rows and section totals for one visit category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    #[serde(default)]
    pub cpt_codes: BTreeMap<String, MonthlyBucket>,
    #[serde(default)]
    pub totals: MonthlyBucket,
}

impl CategorySummary {
    /// Sum of the detail rows, month by month.
    pub fn detail_sum(&self) -> MonthlyBucket {
        let mut sum = MonthlyBucket::default();
        for bucket in self.cpt_codes.values() {
            sum.merge(bucket);
        }
        sum
    }
}

/// Everything the table shows for one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSummary {
    #[serde(rename = "visitData", default)]
    pub visit_data: BTreeMap<VisitCategory, CategorySummary>,
    #[serde(default)]
    pub monthly_kpis: BTreeMap<String, MonthlyBucket>,
}

impl ProviderSummary {
    /// Summary with every section and the standard KPIs present but empty.
    pub fn seeded() -> Self {
        Self {
            visit_data: VisitCategory::ALL
                .into_iter()
                .map(|c| (c, CategorySummary::default()))
                .collect(),
            monthly_kpis: [TOTAL_VISITS_KPI, CHARGES_KPI]
                .into_iter()
                .map(|k| (k.to_string(), MonthlyBucket::default()))
                .collect(),
        }
    }

    pub fn kpi(&self, name: &str) -> Option<&MonthlyBucket> {
        self.monthly_kpis.get(name)
    }

    /// Sections whose totals row disagrees with the sum of its detail rows.
    pub fn inconsistent_sections(&self) -> Vec<VisitCategory> {
        self.visit_data
            .iter()
            .filter(|(_, section)| section.detail_sum() != section.totals)
            .map(|(category, _)| *category)
            .collect()
    }
}

/// Provider name to summary; the shape of the pre-aggregated KPI file.
pub type KpiData = BTreeMap<String, ProviderSummary>;

/// Accepts a JSON string or number as text; null becomes `None`.
fn optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(optional_text(deserializer)?.unwrap_or_default())
}

/// One row of the claims JSON export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRow {
    #[serde(default, deserialize_with = "text")]
    pub facility_name: String,
    #[serde(default, deserialize_with = "text")]
    pub rendering_provider_name: String,
    #[serde(default, deserialize_with = "optional_text")]
    pub date_of_service: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub primary_billed_amount: Option<String>,
    #[serde(
        default,
        alias = "cpt_code",
        alias = "code",
        deserialize_with = "optional_text"
    )]
    pub procedure_code: Option<String>,
}

/// One row of the submitted-claims CSV.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvClaimRow {
    #[serde(default)]
    pub patient_id: String,
    #[serde(default)]
    pub patient: String,
    #[serde(default)]
    pub date_of_service: String,
    #[serde(default)]
    pub primary_billed_amount: String,
}

/// One row of a "Charges By Provider" monthly report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChargeLine {
    pub provider_name: String,
    pub code: String,
    pub units_billed: String,
    pub insurance_billed_amount: String,
}

impl ChargeLine {
    /// Picks the known columns out of a report row; missing columns are empty.
    ///
    /// Cells are text when read from CSV, but a hand-edited combined report
    /// may carry plain JSON numbers.
    pub fn from_row(row: &serde_json::Map<String, serde_json::Value>) -> Self {
        let column = |name: &str| match row.get(name) {
            Some(serde_json::Value::String(text)) => text.trim().to_string(),
            Some(serde_json::Value::Number(number)) => number.to_string(),
            _ => String::new(),
        };
        Self {
            provider_name: column("provider_name"),
            code: column("code"),
            units_billed: column("units_billed"),
            insurance_billed_amount: column("insurance_billed_amount"),
        }
    }

    /// Billed units, truncated to whole visits; unparsable counts as zero.
    pub fn visits(&self) -> Amount {
        Amount::parse(&self.units_billed)
            .map(Amount::truncate)
            .unwrap_or(Amount::ZERO)
    }

    /// Billed amount; unparsable counts as zero.
    pub fn charges(&self) -> Amount {
        Amount::parse(&self.insurance_billed_amount).unwrap_or(Amount::ZERO)
    }
}
