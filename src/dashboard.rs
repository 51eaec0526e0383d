//! Dashboard state.
//!
//! [`Dashboard`] owns the loaded data sets, the navigation tree and the
//! UI-local state (selected path and expanded nodes). Loading replaces the
//! data wholesale; every view is computed from the current state on demand.

use crate::analysis::{aggregate_claims, monthly_totals, IngestStats, MonthlyTotals};
use crate::config::{DataConfig, DisplayConfig};
use crate::ingest::{DataSource, Loader};
use crate::models::{ClaimRow, CsvClaimRow, KpiData};
use crate::navigation::{build_navigation_with_root, NavigationNode};
use crate::report::table::{csv_totals_table, provider_table, DataTable};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

/// Shown when the selection does not resolve to a node.
pub const SELECT_PROMPT: &str = "Select an item from the navigation menu to get started.";

/// Shown for a provider without a summary.
pub const PROVIDER_PROMPT: &str = "Select a provider to view their data.";

/// Configured data sources. `None` switches a source off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sources {
    pub kpis: Option<DataSource>,
    pub claims: Option<DataSource>,
    pub csv: Option<DataSource>,
}

impl Sources {
    pub fn from_config(data: &DataConfig) -> Self {
        let source = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(DataSource::from)
        };

        Self {
            kpis: source(&data.kpis),
            claims: source(&data.claims),
            csv: source(&data.csv),
        }
    }
}

/// Everything derived from one load.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardData {
    pub kpis: KpiData,
    pub navigation: NavigationNode,
    pub csv_totals: Option<MonthlyTotals>,
    /// Rows accepted and dropped when summaries were derived from claims.
    pub stats: Option<IngestStats>,
    pub claim_rows: usize,
    pub loaded_at: Option<DateTime<Local>>,
}

impl DashboardData {
    /// The "no data" state.
    pub fn empty(root_label: &str) -> Self {
        Self {
            kpis: KpiData::new(),
            navigation: NavigationNode::leaf(root_label),
            csv_totals: None,
            stats: None,
            claim_rows: 0,
            loaded_at: None,
        }
    }

    /// Derive the dashboard data from loaded sources.
    ///
    /// With `kpis` absent the provider summaries are aggregated from the
    /// claims rows. The navigation tree always comes from the claims rows.
    pub fn from_parts(
        root_label: &str,
        kpis: Option<KpiData>,
        claims: Vec<ClaimRow>,
        csv_rows: Option<Vec<CsvClaimRow>>,
    ) -> Self {
        let navigation = build_navigation_with_root(
            root_label,
            claims
                .iter()
                .map(|c| (&c.facility_name, &c.rendering_provider_name)),
        );

        let (kpis, stats) = match kpis {
            Some(kpis) => (kpis, None),
            None => {
                let aggregation = aggregate_claims(&claims);
                (aggregation.summaries, Some(aggregation.stats))
            }
        };

        for (provider, summary) in &kpis {
            let sections = summary.inconsistent_sections();
            if !sections.is_empty() {
                warn!(
                    "Section totals for {} do not match their CPT rows: {:?}",
                    provider, sections
                );
            }
        }

        Self {
            kpis,
            navigation,
            csv_totals: csv_rows.as_deref().map(monthly_totals),
            stats,
            claim_rows: claims.len(),
            loaded_at: Some(Local::now()),
        }
    }
}

/// Breadcrumbs, heading, table and children of the selected node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeView {
    pub path: Vec<String>,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<DataTable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

impl NodeView {
    pub fn is_root(&self) -> bool {
        self.path.len() == 1
    }

    /// Heading of the children list: facilities under the root, providers below.
    pub fn children_heading(&self) -> String {
        if self.is_root() {
            format!("{} Facilities", self.label)
        } else {
            format!("{} Providers", self.label)
        }
    }
}

/// What the presentation layer shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum View {
    Placeholder { message: String },
    Node(NodeView),
}

/// Single owner of the dashboard's data and UI state.
pub struct Dashboard {
    sources: Sources,
    loader: Loader,
    display: DisplayConfig,
    data: DashboardData,
    selection: Vec<String>,
    expanded: BTreeSet<Vec<String>>,
}

impl Dashboard {
    pub fn new(sources: Sources, loader: Loader, display: DisplayConfig) -> Self {
        let data = DashboardData::empty(&display.root_label);
        Self {
            sources,
            loader,
            display,
            data,
            selection: Vec::new(),
            expanded: BTreeSet::new(),
        }
    }

    pub fn data(&self) -> &DashboardData {
        &self.data
    }

    pub fn sources(&self) -> &Sources {
        &self.sources
    }

    pub fn selection(&self) -> &[String] {
        &self.selection
    }

    pub fn expanded(&self) -> &BTreeSet<Vec<String>> {
        &self.expanded
    }

    pub fn root_label(&self) -> &str {
        &self.display.root_label
    }

    /// Fetch every configured source and replace the current data.
    ///
    /// The sources are fetched concurrently. A source that fails to load is
    /// logged and treated as empty.
    pub async fn load(&mut self) {
        let loader = &self.loader;
        let sources = &self.sources;

        let kpis = async {
            match &sources.kpis {
                Some(source) => Some(loader.load_kpis(source).await.unwrap_or_else(|e| {
                    error!("Failed to load provider KPIs: {}", e);
                    KpiData::new()
                })),
                None => None,
            }
        };
        let claims = async {
            match &sources.claims {
                Some(source) => loader.load_claims(source).await.unwrap_or_else(|e| {
                    error!("Failed to load claims: {}", e);
                    Vec::new()
                }),
                None => Vec::new(),
            }
        };
        let csv = async {
            match &sources.csv {
                Some(source) => Some(loader.load_claims_csv(source).await.unwrap_or_else(|e| {
                    error!("Failed to load claims CSV: {}", e);
                    Vec::new()
                })),
                None => None,
            }
        };

        let (kpis, claims, csv) = futures::future::join3(kpis, claims, csv).await;

        if kpis.is_none() {
            info!("No KPI source configured, deriving summaries from claims");
        }

        let data = DashboardData::from_parts(&self.display.root_label, kpis, claims, csv);
        self.replace(data);
    }

    /// Swap in new data. UI state is kept; a selection that no longer
    /// resolves renders as the neutral prompt.
    pub fn replace(&mut self, data: DashboardData) {
        info!(
            "Dashboard has {} providers under {} facilities",
            data.kpis.len(),
            data.navigation.children.len()
        );
        self.data = data;
    }

    /// Qualify a path with the root label when it does not start with it.
    pub fn absolute_path(&self, labels: &[String]) -> Vec<String> {
        let root = self.root_label();
        if labels.first().map(String::as_str) == Some(root) {
            labels.to_vec()
        } else {
            std::iter::once(root.to_string())
                .chain(labels.iter().cloned())
                .collect()
        }
    }

    fn resolves(&self, path: &[String]) -> bool {
        self.data.navigation.find(path).is_some()
    }

    /// Select a node. A path that does not resolve leaves the selection as is.
    pub fn select(&mut self, path: &[String]) -> bool {
        if self.resolves(path) {
            debug!("Selected {:?}", path);
            self.selection = path.to_vec();
            true
        } else {
            debug!("Path {:?} not found", path);
            false
        }
    }

    /// Select a child of the current node.
    pub fn open_child(&mut self, label: &str) -> bool {
        let mut path = if self.selection.is_empty() {
            vec![self.root_label().to_string()]
        } else {
            self.selection.clone()
        };
        path.push(label.to_string());
        self.select(&path)
    }

    /// Select the parent of the current node. The root has no parent.
    pub fn go_up(&mut self) -> bool {
        if self.selection.len() > 1 {
            self.selection.pop();
            true
        } else {
            false
        }
    }

    pub fn go_home(&mut self) {
        self.selection = vec![self.root_label().to_string()];
    }

    /// Expand a node that has children.
    pub fn expand(&mut self, path: &[String]) -> bool {
        match self.data.navigation.find(path) {
            Some(node) if !node.is_leaf() => {
                self.expanded.insert(path.to_vec());
                true
            }
            _ => false,
        }
    }

    pub fn collapse(&mut self, path: &[String]) -> bool {
        self.expanded.remove(path)
    }

    /// Flip a node's expanded state. Returns the new state.
    pub fn toggle(&mut self, path: &[String]) -> bool {
        if self.collapse(path) {
            false
        } else {
            self.expand(path)
        }
    }

    pub fn expand_all(&mut self) {
        let paths = self.data.navigation.paths();
        for path in paths {
            self.expand(&path);
        }
    }

    pub fn is_expanded(&self, path: &[String]) -> bool {
        self.expanded.contains(path)
    }

    /// View of the current selection.
    pub fn view(&self) -> View {
        self.view_of(&self.selection)
    }

    /// View of an arbitrary path, without changing the selection.
    pub fn view_of(&self, path: &[String]) -> View {
        let Some(node) = self.data.navigation.find(path) else {
            return View::Placeholder {
                message: SELECT_PROMPT.to_string(),
            };
        };

        let is_root = path.len() == 1;
        let mut table = self
            .data
            .kpis
            .get(&node.label)
            .map(|summary| provider_table(&node.label, summary, &self.display.currency_kpis));

        if is_root && table.is_none() && self.display.show_csv_row {
            table = self
                .data
                .csv_totals
                .as_ref()
                .map(|totals| csv_totals_table(&totals.bucket));
        }

        let notice = (table.is_none() && !is_root && node.is_leaf())
            .then(|| PROVIDER_PROMPT.to_string());

        View::Node(NodeView {
            path: path.to_vec(),
            label: node.label.clone(),
            table,
            notice,
            children: node.child_labels(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Amount, Month, CHARGES_KPI};
    use crate::report::table::CSV_ROW_LABEL;
    use std::path::PathBuf;
    use std::time::Duration;

    fn claim(facility: &str, provider: &str, date: &str, amount: &str, code: &str) -> ClaimRow {
        ClaimRow {
            facility_name: facility.to_string(),
            rendering_provider_name: provider.to_string(),
            date_of_service: Some(date.to_string()),
            primary_billed_amount: Some(amount.to_string()),
            procedure_code: Some(code.to_string()),
        }
    }

    fn scenario_claims() -> Vec<ClaimRow> {
        vec![
            claim("A", "Smith", "2025-01-15", "100.00", "99309"),
            claim("A", "Smith", "2025-01-20", "50.00", "99309"),
            claim("A", "Jones", "2025-02-01", "75.00", "99304"),
        ]
    }

    fn path(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    fn dashboard(data: DashboardData) -> Dashboard {
        let loader = Loader::new(Duration::from_secs(5)).unwrap();
        let mut dashboard = Dashboard::new(Sources::default(), loader, DisplayConfig::default());
        dashboard.replace(data);
        dashboard
    }

    fn scenario_dashboard() -> Dashboard {
        dashboard(DashboardData::from_parts(
            "Overall",
            None,
            scenario_claims(),
            None,
        ))
    }

    fn node(view: View) -> NodeView {
        match view {
            View::Node(node) => node,
            View::Placeholder { message } => panic!("unexpected placeholder: {}", message),
        }
    }

    #[test]
    fn test_sources_from_config() {
        let data = DataConfig {
            kpis: Some(" ".to_string()),
            claims: Some("https://example.com/claims.json".to_string()),
            csv: None,
            timeout_seconds: 5,
        };
        let sources = Sources::from_config(&data);
        assert_eq!(sources.kpis, None);
        assert!(sources.claims.as_ref().is_some_and(DataSource::is_remote));
        assert_eq!(sources.csv, None);
    }

    #[test]
    fn test_initial_view_is_placeholder() {
        let dashboard = scenario_dashboard();
        assert!(dashboard.selection().is_empty());
        assert_eq!(
            dashboard.view(),
            View::Placeholder {
                message: SELECT_PROMPT.to_string()
            }
        );
    }

    #[test]
    fn test_select_provider_shows_table() {
        let mut dashboard = scenario_dashboard();
        assert!(dashboard.select(&path(&["Overall", "A", "Smith"])));

        let view = node(dashboard.view());
        assert_eq!(view.label, "Smith");
        assert!(view.notice.is_none());
        let table = view.table.unwrap();
        let charges = table.rows.iter().find(|r| r.label == CHARGES_KPI).unwrap();
        assert_eq!(charges.values[Month::January.index()], Amount::from_units(150));
        assert_eq!(charges.total, Amount::from_units(150));
    }

    #[test]
    fn test_failed_select_keeps_selection() {
        let mut dashboard = scenario_dashboard();
        assert!(dashboard.select(&path(&["Overall", "A"])));
        assert!(!dashboard.select(&path(&["Overall", "B", "Smith"])));
        assert_eq!(dashboard.selection(), path(&["Overall", "A"]).as_slice());

        assert_eq!(
            dashboard.view_of(&path(&["Overall", "A", "Brown"])),
            View::Placeholder {
                message: SELECT_PROMPT.to_string()
            }
        );
    }

    #[test]
    fn test_facility_view_lists_providers() {
        let mut dashboard = scenario_dashboard();
        dashboard.go_home();
        assert!(dashboard.open_child("A"));

        let view = node(dashboard.view());
        assert_eq!(view.children, vec!["Jones", "Smith"]);
        assert_eq!(view.children_heading(), "A Providers");
        assert!(view.table.is_none());
        assert!(view.notice.is_none());

        assert!(dashboard.go_up());
        assert!(!dashboard.go_up());
        assert_eq!(dashboard.selection(), path(&["Overall"]).as_slice());
    }

    #[test]
    fn test_names_are_not_trimmed() {
        let mut claims = scenario_claims();
        claims.push(claim("A", "Smith ", "2025-01-22", "40.00", "99309"));
        let dashboard = dashboard(DashboardData::from_parts("Overall", None, claims, None));

        let facility = node(dashboard.view_of(&path(&["Overall", "A"])));
        assert_eq!(facility.children, vec!["Jones", "Smith", "Smith "]);

        let padded = node(dashboard.view_of(&path(&["Overall", "A", "Smith "])));
        let table = padded.table.unwrap();
        let charges = table.rows.iter().find(|r| r.label == CHARGES_KPI).unwrap();
        assert_eq!(charges.total, Amount::from_units(40));
    }

    #[test]
    fn test_provider_without_summary() {
        let mut kpis = KpiData::new();
        kpis.insert("Smith".to_string(), Default::default());
        let dashboard = dashboard(DashboardData::from_parts(
            "Overall",
            Some(kpis),
            scenario_claims(),
            None,
        ));

        let jones = node(dashboard.view_of(&path(&["Overall", "A", "Jones"])));
        assert!(jones.table.is_none());
        assert_eq!(jones.notice.as_deref(), Some(PROVIDER_PROMPT));
    }

    #[test]
    fn test_root_shows_csv_totals() {
        let rows = vec![CsvClaimRow {
            date_of_service: "2025-03-01".to_string(),
            primary_billed_amount: "1234.56".to_string(),
            ..Default::default()
        }];
        let dashboard = dashboard(DashboardData::from_parts(
            "Overall",
            None,
            scenario_claims(),
            Some(rows),
        ));

        let root = node(dashboard.view_of(&path(&["Overall"])));
        assert_eq!(root.children_heading(), "Overall Facilities");
        let table = root.table.unwrap();
        assert_eq!(table.rows[0].label, CSV_ROW_LABEL);
        assert_eq!(table.rows[0].total, Amount::from_hundredths(123456));
    }

    #[test]
    fn test_expand_collapse_toggle() {
        let mut dashboard = scenario_dashboard();
        let root = path(&["Overall"]);
        let smith = path(&["Overall", "A", "Smith"]);

        assert!(dashboard.expand(&root));
        assert!(!dashboard.expand(&smith));
        assert!(!dashboard.toggle(&root));
        assert!(!dashboard.is_expanded(&root));
        assert!(dashboard.toggle(&root));

        dashboard.expand_all();
        assert_eq!(dashboard.expanded().len(), 2);
        assert!(dashboard.collapse(&path(&["Overall", "A"])));
    }

    #[test]
    fn test_absolute_path() {
        let dashboard = scenario_dashboard();
        assert_eq!(dashboard.absolute_path(&path(&["A"])), path(&["Overall", "A"]));
        assert_eq!(
            dashboard.absolute_path(&path(&["Overall", "A"])),
            path(&["Overall", "A"])
        );
    }

    #[test]
    fn test_empty_data() {
        let dashboard = dashboard(DashboardData::empty("Overall"));
        assert!(dashboard.data().navigation.is_leaf());
        let root = node(dashboard.view_of(&path(&["Overall"])));
        assert!(root.table.is_none());
        assert!(root.notice.is_none());
        assert!(matches!(
            dashboard.view_of(&path(&["Overall", "A"])),
            View::Placeholder { .. }
        ));
    }

    #[tokio::test]
    async fn test_load_from_fixtures() {
        let fixtures = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures");
        let sources = Sources {
            kpis: Some(DataSource::Path(fixtures.join("provider_kpis.json"))),
            claims: Some(DataSource::Path(fixtures.join("claims_data.json"))),
            csv: Some(DataSource::Path(fixtures.join("claims.csv"))),
        };
        let loader = Loader::new(Duration::from_secs(5)).unwrap();
        let mut dashboard = Dashboard::new(sources, loader, DisplayConfig::default());
        dashboard.load().await;

        let data = dashboard.data();
        assert!(data.loaded_at.is_some());
        assert!(data.stats.is_none());
        assert_eq!(
            data.navigation.child_labels(),
            vec!["AHOSKIE HEALTH AND REHAB", "ALAMANCE HEALTH CARE CENTER"]
        );
        assert!(data.kpis.contains_key("John Arney"));
        assert!(data.csv_totals.is_some());

        let view = node(dashboard.view_of(&path(&[
            "Overall",
            "AHOSKIE HEALTH AND REHAB",
            "John Arney",
        ])));
        assert!(view.table.is_some());
    }

    #[tokio::test]
    async fn test_load_missing_sources_is_empty_state() {
        let sources = Sources {
            kpis: Some(DataSource::Path(PathBuf::from("/nonexistent/kpis.json"))),
            claims: Some(DataSource::Path(PathBuf::from("/nonexistent/claims.json"))),
            csv: None,
        };
        let loader = Loader::new(Duration::from_secs(5)).unwrap();
        let mut dashboard = Dashboard::new(sources, loader, DisplayConfig::default());
        dashboard.load().await;

        assert!(dashboard.data().kpis.is_empty());
        assert!(dashboard.data().navigation.is_leaf());
    }
}
