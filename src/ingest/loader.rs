//! Data source loading.
//!
//! A source is either a local path or an `http(s)://` URL. Each load is a
//! one-shot fetch followed by a parse; failures come back as [`LoadError`]
//! and the caller decides whether they are fatal.

use crate::models::{ClaimRow, CsvClaimRow, KpiData};
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while fetching or parsing a data source.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("invalid JSON in {origin}: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid CSV in {origin}: {source}")]
    Csv {
        origin: String,
        #[source]
        source: csv::Error,
    },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Where a data set comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Path(PathBuf),
    Url(String),
}

impl DataSource {
    pub fn is_remote(&self) -> bool {
        matches!(self, DataSource::Url(_))
    }
}

impl FromStr for DataSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with("http://") || s.starts_with("https://") {
            Ok(DataSource::Url(s.to_string()))
        } else {
            Ok(DataSource::Path(PathBuf::from(s)))
        }
    }
}

impl From<&str> for DataSource {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(source) => source,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Path(path) => write!(f, "{}", path.display()),
            DataSource::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Fetches data sources over the filesystem or HTTP.
#[derive(Debug, Clone)]
pub struct Loader {
    http_client: reqwest::Client,
}

impl Loader {
    /// Create a loader whose HTTP requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, LoadError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(LoadError::Client)?;

        Ok(Self { http_client })
    }

    /// Fetch the raw text of a source.
    pub async fn fetch_text(&self, source: &DataSource) -> Result<String, LoadError> {
        match source {
            DataSource::Path(path) => {
                debug!("Reading {}", path.display());
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| LoadError::Io {
                        path: path.clone(),
                        source,
                    })
            }
            DataSource::Url(url) => {
                debug!("Fetching {}", url);
                let http_error = |source| LoadError::Http {
                    url: url.clone(),
                    source,
                };
                let response = self.http_client.get(url).send().await.map_err(http_error)?;

                let status = response.status();
                if !status.is_success() {
                    return Err(LoadError::Status {
                        url: url.clone(),
                        status: status.as_u16(),
                    });
                }

                response.text().await.map_err(http_error)
            }
        }
    }

    /// Load the pre-aggregated provider KPI file.
    pub async fn load_kpis(&self, source: &DataSource) -> Result<KpiData, LoadError> {
        let text = self.fetch_text(source).await?;
        let kpis = parse_kpis(&text, &source.to_string())?;
        info!("Loaded KPIs for {} providers from {}", kpis.len(), source);
        Ok(kpis)
    }

    /// Load the claims JSON export.
    pub async fn load_claims(&self, source: &DataSource) -> Result<Vec<ClaimRow>, LoadError> {
        let text = self.fetch_text(source).await?;
        let claims = parse_claims(&text, &source.to_string())?;
        info!("Loaded {} claim rows from {}", claims.len(), source);
        Ok(claims)
    }

    /// Load the submitted-claims CSV.
    pub async fn load_claims_csv(
        &self,
        source: &DataSource,
    ) -> Result<Vec<CsvClaimRow>, LoadError> {
        let text = self.fetch_text(source).await?;
        let rows = parse_csv(&text, &source.to_string())?;
        info!("Loaded {} CSV rows from {}", rows.len(), source);
        Ok(rows)
    }
}

/// Parse provider KPI JSON.
pub fn parse_kpis(text: &str, origin: &str) -> Result<KpiData, LoadError> {
    serde_json::from_str(text).map_err(|source| LoadError::Json {
        origin: origin.to_string(),
        source,
    })
}

/// Parse the claims JSON array.
pub fn parse_claims(text: &str, origin: &str) -> Result<Vec<ClaimRow>, LoadError> {
    serde_json::from_str(text).map_err(|source| LoadError::Json {
        origin: origin.to_string(),
        source,
    })
}

/// Parse header-based CSV text into rows.
///
/// The first row is the header and blank lines are skipped. A row that does
/// not fit `T` is dropped and counted in a warning; a broken header fails
/// the whole parse.
pub fn parse_csv<T: DeserializeOwned>(text: &str, origin: &str) -> Result<Vec<T>, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    reader.headers().map_err(|source| LoadError::Csv {
        origin: origin.to_string(),
        source,
    })?;

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for (line, result) in reader.deserialize::<T>().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => {
                debug!("Skipping CSV record {} in {}: {}", line + 1, origin, e);
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        warn!("Skipped {} malformed CSV records in {}", skipped, origin);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_data_source_from_str() {
        assert_eq!(
            DataSource::from("https://example.com/data/provider_kpis.json"),
            DataSource::Url("https://example.com/data/provider_kpis.json".to_string())
        );
        assert_eq!(
            DataSource::from(" data/claims_data.json "),
            DataSource::Path(PathBuf::from("data/claims_data.json"))
        );
        assert!(!DataSource::from("http.json").is_remote());
    }

    #[test]
    fn test_parse_csv_header_based() {
        let text = "patient_id,patient,date_of_service,primary_billed_amount\n\
                    1,Doe,2025-04-02,100.00\n\
                    \n\
                    2,Roe,2025-05-10,25.50\n";
        let rows: Vec<CsvClaimRow> = parse_csv(text, "inline").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].patient, "Roe");
        assert_eq!(rows[1].primary_billed_amount, "25.50");
    }

    #[test]
    fn test_parse_csv_missing_columns_default() {
        let text = "date_of_service,primary_billed_amount\n2025-04-02,10\n";
        let rows: Vec<CsvClaimRow> = parse_csv(text, "inline").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].patient_id, "");
        assert_eq!(rows[0].date_of_service, "2025-04-02");
    }

    #[test]
    fn test_parse_kpis_invalid_json() {
        let err = parse_kpis("{not json", "provider_kpis.json").unwrap_err();
        assert!(matches!(err, LoadError::Json { .. }));
        assert!(err.to_string().contains("provider_kpis.json"));
    }

    #[tokio::test]
    async fn test_load_claims_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"facility_name": "A", "rendering_provider_name": "Smith"}},
                {{"facility_name": "B", "rendering_provider_name": "Jones"}}]"#
        )
        .unwrap();

        let loader = Loader::new(Duration::from_secs(5)).unwrap();
        let source = DataSource::Path(file.path().to_path_buf());
        let claims = loader.load_claims(&source).await.unwrap();

        assert_eq!(claims.len(), 2);
        assert_eq!(claims[0].facility_name, "A");
        assert_eq!(claims[1].rendering_provider_name, "Jones");
    }

    #[tokio::test]
    async fn test_load_fixture_kpis() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/provider_kpis.json");
        let loader = Loader::new(Duration::from_secs(5)).unwrap();
        let kpis = loader.load_kpis(&DataSource::Path(path)).await.unwrap();

        assert_eq!(kpis.len(), 2);
        let smith = &kpis["Jane Smith"];
        assert_eq!(
            smith.kpi(crate::models::CHARGES_KPI).map(|b| b.total()),
            Some(crate::models::Amount::from_hundredths(126025))
        );
        assert!(kpis.values().all(|s| s.inconsistent_sections().is_empty()));
    }

    #[tokio::test]
    async fn test_load_fixture_csv() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/claims.csv");
        let loader = Loader::new(Duration::from_secs(5)).unwrap();
        let rows = loader.load_claims_csv(&DataSource::Path(path)).await.unwrap();

        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].patient, "Doe, Jane");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let loader = Loader::new(Duration::from_secs(5)).unwrap();
        let source = DataSource::Path(PathBuf::from("/nonexistent/provider_kpis.json"));
        let err = tokio_test::block_on(loader.load_kpis(&source)).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
