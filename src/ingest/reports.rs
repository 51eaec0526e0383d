//! Monthly report exports.
//!
//! Billing exports arrive as one directory per month, one subdirectory per
//! report type, each holding CSV files:
//!
//! ```text
//! base/
//!   April/
//!     Charges By Provider/report.csv
//!     Charges By Clinic/report.csv
//!   May/
//!     ...
//! ```
//!
//! These helpers flatten that tree into a single JSON-ready structure and
//! convert standalone CSV files into JSON row arrays.

use super::LoadError;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Report type that carries per-provider CPT lines.
pub const CHARGES_BY_PROVIDER: &str = "Charges By Provider";

/// One CSV row keyed by header, columns in header order.
pub type ReportRow = serde_json::Map<String, serde_json::Value>;

/// Month directory name to report type to rows.
pub type DetailedReport = BTreeMap<String, BTreeMap<String, Vec<ReportRow>>>;

/// Read every row of a header-based CSV file.
pub fn read_csv_rows(path: &Path) -> Result<Vec<ReportRow>, LoadError> {
    let csv_error = |source| LoadError::Csv {
        origin: path.display().to_string(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_error)?;

    let headers = reader.headers().map_err(csv_error)?.clone();
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let row: ReportRow = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header.to_string(), value.into()))
            .collect();
        rows.push(row);
    }

    debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Immediate subdirectories of `dir`, sorted by name.
fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| LoadError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
        }
    }
    Ok(dirs)
}

/// CSV files directly inside `dir`, sorted by name.
fn csv_files(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| LoadError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        let is_csv = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if entry.file_type().is_file() && is_csv {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Combine a tree of monthly report directories into one structure.
///
/// Report types without any rows are left out; a month with no report
/// rows still appears with an empty map.
pub fn combine_monthly_reports(
    base_dir: &Path,
    show_progress: bool,
) -> Result<DetailedReport, LoadError> {
    if !base_dir.is_dir() {
        return Err(LoadError::Io {
            path: base_dir.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "base directory not found",
            ),
        });
    }

    let month_dirs = subdirectories(base_dir)?;
    info!(
        "Combining {} month directories under {}",
        month_dirs.len(),
        base_dir.display()
    );

    let progress_bar = if show_progress {
        let pb = ProgressBar::new(month_dirs.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut combined = DetailedReport::new();

    for month_dir in month_dirs {
        let month_name = dir_name(&month_dir);
        if let Some(ref pb) = progress_bar {
            pb.set_message(month_name.clone());
        }

        let mut reports = BTreeMap::new();
        for report_dir in subdirectories(&month_dir)? {
            let report_name = dir_name(&report_dir);
            let mut report_rows = Vec::new();

            for csv_path in csv_files(&report_dir)? {
                report_rows.extend(read_csv_rows(&csv_path)?);
            }

            if report_rows.is_empty() {
                warn!("No rows in {} / {}", month_name, report_name);
            } else {
                reports.insert(report_name, report_rows);
            }
        }

        combined.insert(month_name, reports);

        if let Some(ref pb) = progress_bar {
            pb.inc(1);
        }
    }

    if let Some(pb) = progress_bar {
        pb.finish_with_message("Reports combined");
    }

    Ok(combined)
}

/// Parse a combined report previously written by [`combine_monthly_reports`].
pub fn parse_detailed_report(text: &str, origin: &str) -> Result<DetailedReport, LoadError> {
    serde_json::from_str(text).map_err(|source| LoadError::Json {
        origin: origin.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_report(base: &Path, month: &str, report: &str, file: &str, content: &str) {
        let dir = base.join(month).join(report);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), content).unwrap();
    }

    #[test]
    fn test_combine_monthly_reports() {
        let temp = TempDir::new().unwrap();
        let base = temp.path();
        write_report(
            base,
            "April",
            CHARGES_BY_PROVIDER,
            "a.csv",
            "provider_name,code,units_billed\nSmith,99305,1\n",
        );
        write_report(
            base,
            "April",
            CHARGES_BY_PROVIDER,
            "b.csv",
            "provider_name,code,units_billed\nJones,99309,2\n",
        );
        write_report(base, "April", "Charges By Clinic", "notes.txt", "ignored");
        write_report(
            base,
            "May",
            CHARGES_BY_PROVIDER,
            "report.csv",
            "provider_name,code,units_billed\nSmith,99316,1\n",
        );

        let combined = combine_monthly_reports(base, false).unwrap();

        assert_eq!(combined.keys().collect::<Vec<_>>(), vec!["April", "May"]);
        let april = &combined["April"];
        assert!(!april.contains_key("Charges By Clinic"));
        let rows = &april[CHARGES_BY_PROVIDER];
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["provider_name"], "Smith");
        assert_eq!(rows[1]["units_billed"], "2");
        assert_eq!(combined["May"][CHARGES_BY_PROVIDER][0]["code"], "99316");
    }

    #[test]
    fn test_combine_fixture_reports() {
        let base = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/reports");
        let combined = combine_monthly_reports(&base, false).unwrap();
        assert_eq!(combined["April"][CHARGES_BY_PROVIDER].len(), 4);
        assert_eq!(combined["May"][CHARGES_BY_PROVIDER].len(), 2);

        let json = serde_json::to_string(&combined).unwrap();
        assert_eq!(parse_detailed_report(&json, "inline").unwrap(), combined);
    }

    #[test]
    fn test_combine_missing_base_dir() {
        let err = combine_monthly_reports(Path::new("/nonexistent/reports"), false).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_read_csv_rows_short_record() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("claims.csv");
        fs::write(&path, "patient_id,patient,date_of_service\n1,Doe\n").unwrap();

        let rows = read_csv_rows(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["patient"], "Doe");
        assert!(!rows[0].contains_key("date_of_service"));
    }

    #[test]
    fn test_read_csv_rows_keeps_header_order() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("claims.csv");
        fs::write(&path, "zeta,patient,alpha
1,Doe,2025-04-01
").unwrap();

        let rows = read_csv_rows(&path).unwrap();
        let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "patient", "alpha"]);
        assert_eq!(
            serde_json::to_string(&rows).unwrap(),
            r#"[{"zeta":"1","patient":"Doe","alpha":"2025-04-01"}]"#
        );
    }
}
