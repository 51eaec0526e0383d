//! View rendering.
//!
//! This module renders dashboard views as aligned plain text, Markdown or
//! JSON, and the navigation tree as an indented outline.

use crate::cli::OutputFormat;
use crate::dashboard::{NodeView, View};
use crate::models::{Amount, Month};
use crate::navigation::NavigationNode;
use crate::report::table::{DataTable, RowKind, TableRow};
use anyhow::Result;
use chrono::Utc;
use std::collections::BTreeSet;

/// Render a view in the requested format.
pub fn render_view(view: &View, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(view)),
        OutputFormat::Markdown => Ok(render_markdown(view)),
        OutputFormat::Json => render_json(view),
    }
}

/// Whole US dollars with thousands separators, e.g. `$1,235`.
///
/// Cents round half away from zero.
pub fn format_currency(amount: Amount) -> String {
    let dollars = amount.rounded_units();
    let sign = if dollars < 0 { "-" } else { "" };
    format!("{}${}", sign, group_thousands(dollars.unsigned_abs()))
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// A cell value: currency, an integer when whole, else two decimals.
pub fn format_value(amount: Amount, is_currency: bool) -> String {
    if is_currency {
        format_currency(amount)
    } else if amount.is_whole() {
        amount.rounded_units().to_string()
    } else {
        amount.to_string()
    }
}

/// `Home > Overall > Facility > Provider`.
pub fn breadcrumbs(path: &[String]) -> String {
    std::iter::once("Home")
        .chain(path.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" > ")
}

fn header_cells() -> Vec<String> {
    let mut cells = vec!["Section".to_string(), "Code".to_string()];
    cells.extend(Month::ALL.iter().map(|m| m.abbr().to_string()));
    cells.push("Total".to_string());
    cells
}

fn row_cells(row: &TableRow, first_in_section: bool) -> Vec<String> {
    let section = if row.kind != RowKind::Kpi && first_in_section {
        row.section.clone()
    } else {
        String::new()
    };
    let mut cells = vec![section, row.label.clone()];
    cells.extend(row.values.iter().map(|v| format_value(*v, row.is_currency)));
    cells.push(format_value(row.total, row.is_currency));
    cells
}

/// Table body as cell rows; `None` marks the spacer before the KPI rows.
fn table_cells(table: &DataTable) -> Vec<Option<Vec<String>>> {
    let mut lines = Vec::new();
    let mut previous_section: Option<&str> = None;
    let mut in_kpis = false;

    for row in &table.rows {
        if row.kind == RowKind::Kpi && !in_kpis {
            in_kpis = true;
            if !lines.is_empty() {
                lines.push(None);
            }
        }
        let first = previous_section != Some(row.section.as_str());
        previous_section = Some(row.section.as_str());
        lines.push(Some(row_cells(row, first)));
    }

    lines
}

fn text_table(table: &DataTable) -> String {
    let header = header_cells();
    let body = table_cells(table);

    let mut widths: Vec<usize> = header.iter().map(|c| c.chars().count()).collect();
    for cells in body.iter().flatten() {
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let format_line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .enumerate()
            .map(|(i, (cell, width))| {
                if i < 2 {
                    format!("{:<width$}", cell, width = width)
                } else {
                    format!("{:>width$}", cell, width = width)
                }
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    out.push_str(&format_line(&header));
    out.push('\n');
    let rule_len = widths.iter().sum::<usize>() + 2 * (widths.len() - 1);
    out.push_str(&"-".repeat(rule_len));
    out.push('\n');

    for line in &body {
        if let Some(cells) = line {
            out.push_str(&format_line(cells));
        }
        out.push('\n');
    }

    out
}

/// Render a view as aligned plain text.
pub fn render_text(view: &View) -> String {
    let node = match view {
        View::Placeholder { message } => return format!("{}\n", message),
        View::Node(node) => node,
    };

    let mut out = String::new();
    out.push_str(&breadcrumbs(&node.path));
    out.push_str("\n\n");

    let heading = format!("{} Data", node.label);
    out.push_str(&heading);
    out.push('\n');
    out.push_str(&"=".repeat(heading.chars().count()));
    out.push_str("\n\n");

    if let Some(ref table) = node.table {
        out.push_str(&text_table(table));
        out.push('\n');
    }

    if let Some(ref notice) = node.notice {
        out.push_str(notice);
        out.push_str("\n\n");
    }

    out.push_str(&text_children(node));
    out.trim_end().to_string() + "\n"
}

fn text_children(node: &NodeView) -> String {
    if node.children.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    out.push_str(&node.children_heading());
    out.push('\n');
    for child in &node.children {
        out.push_str(&format!("  - {}\n", child));
    }
    out
}

fn markdown_table(table: &DataTable) -> String {
    let header = header_cells();
    let mut out = String::new();

    out.push_str(&format!("| {} |\n", header.join(" | ")));
    let align: Vec<&str> = (0..header.len())
        .map(|i| if i < 2 { ":---" } else { "---:" })
        .collect();
    out.push_str(&format!("|{}|\n", align.join("|")));

    for line in table_cells(table) {
        let cells = line.unwrap_or_else(|| vec![String::new(); header.len()]);
        let cells: Vec<String> = cells.iter().map(|c| c.replace('|', "\\|")).collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }

    out
}

/// Render a view as Markdown.
pub fn render_markdown(view: &View) -> String {
    let node = match view {
        View::Placeholder { message } => return format!("_{}_\n", message),
        View::Node(node) => node,
    };

    let mut out = String::new();
    out.push_str(&format!("*{}*\n\n", breadcrumbs(&node.path)));
    out.push_str(&format!("## {} Data\n\n", node.label));

    if let Some(ref table) = node.table {
        out.push_str(&markdown_table(table));
        out.push('\n');
    }

    if let Some(ref notice) = node.notice {
        out.push_str(&format!("_{}_\n\n", notice));
    }

    if !node.children.is_empty() {
        out.push_str(&format!("### {}\n\n", node.children_heading()));
        for child in &node.children {
            out.push_str(&format!("- {}\n", child));
        }
        out.push('\n');
    }

    out.trim_end().to_string() + "\n"
}

/// Render a view as a JSON document with a generation timestamp.
pub fn render_json(view: &View) -> Result<String> {
    let document = serde_json::json!({
        "generated_at": Utc::now().to_rfc3339(),
        "view": view,
    });
    serde_json::to_string_pretty(&document).map_err(Into::into)
}

/// Render the navigation tree as an outline.
///
/// `▾` marks an expanded node, `▸` a collapsed one and `•` a leaf. Children
/// of collapsed nodes are hidden. The selected node is prefixed with `> `.
pub fn render_tree(
    root: &NavigationNode,
    expanded: &BTreeSet<Vec<String>>,
    selection: &[String],
) -> String {
    let mut out = String::new();
    let mut path = Vec::new();
    tree_lines(root, expanded, selection, &mut path, &mut out);
    out
}

fn tree_lines(
    node: &NavigationNode,
    expanded: &BTreeSet<Vec<String>>,
    selection: &[String],
    path: &mut Vec<String>,
    out: &mut String,
) {
    path.push(node.label.clone());

    let is_open = expanded.contains(path.as_slice());
    let marker = if node.is_leaf() {
        "•"
    } else if is_open {
        "▾"
    } else {
        "▸"
    };
    let cursor = if path.as_slice() == selection { "> " } else { "  " };
    let indent = "  ".repeat(path.len() - 1);
    out.push_str(&format!("{}{}{} {}\n", cursor, indent, marker, node.label));

    if is_open {
        for child in &node.children {
            tree_lines(child, expanded, selection, path, out);
        }
    }

    path.pop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MonthlyBucket, ProviderSummary, VisitCategory, CHARGES_KPI};
    use crate::navigation::build_navigation;
    use crate::report::table::{csv_totals_table, provider_table};

    fn path(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    fn smith_view() -> View {
        let mut summary = ProviderSummary::seeded();
        let section = summary
            .visit_data
            .get_mut(&VisitCategory::SubsequentVisits)
            .unwrap();
        let mut bucket = MonthlyBucket::new();
        bucket.add(Month::January, Amount::from_units(2));
        section.cpt_codes.insert("99309".to_string(), bucket);
        section.totals = bucket;
        summary
            .monthly_kpis
            .get_mut(CHARGES_KPI)
            .unwrap()
            .add(Month::January, Amount::from_hundredths(123456));

        View::Node(NodeView {
            path: path(&["Overall", "A", "Smith"]),
            label: "Smith".to_string(),
            table: Some(provider_table("Smith", &summary, &[CHARGES_KPI.to_string()])),
            notice: None,
            children: Vec::new(),
        })
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(Amount::from_hundredths(123456)), "$1,235");
        assert_eq!(format_currency(Amount::from_hundredths(123449)), "$1,234");
        assert_eq!(format_currency(Amount::ZERO), "$0");
        assert_eq!(format_currency(Amount::from_units(1_000_000)), "$1,000,000");
        assert_eq!(format_currency(Amount::from_units(-2500)), "-$2,500");
        assert_eq!(format_currency(Amount::from_hundredths(-20)), "$0");
        assert_eq!(format_currency(Amount::parse("0.495").unwrap()), "$0");
        assert_eq!(format_currency(Amount::parse("1234.5").unwrap()), "$1,235");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(Amount::from_units(12), false), "12");
        assert_eq!(format_value(Amount::from_hundredths(1250), false), "12.50");
        assert_eq!(format_value(Amount::from_units(12), true), "$12");
        assert_eq!(format_value(Amount::parse("0.012").unwrap(), false), "0.01");
        assert_eq!(format_value(Amount::parse("0.004").unwrap(), false), "0.00");
    }

    #[test]
    fn test_breadcrumbs() {
        assert_eq!(
            breadcrumbs(&path(&["Overall", "A", "Smith"])),
            "Home > Overall > A > Smith"
        );
        assert_eq!(breadcrumbs(&[]), "Home");
    }

    #[test]
    fn test_render_text_provider() {
        let text = render_text(&smith_view());
        assert!(text.starts_with("Home > Overall > A > Smith\n"));
        assert!(text.contains("Smith Data"));
        assert!(text.contains("Jan"));
        assert!(text.contains("$1,235"));

        let lines: Vec<&str> = text.lines().collect();
        let section_lines = lines
            .iter()
            .filter(|l| l.starts_with("Subsequent Visits"))
            .count();
        assert_eq!(section_lines, 1);

        let kpi_index = lines.iter().position(|l| l.contains("Charges")).unwrap();
        assert!(lines[kpi_index - 1].is_empty());
    }

    #[test]
    fn test_render_placeholder() {
        let view = View::Placeholder {
            message: "Select an item from the navigation menu to get started.".to_string(),
        };
        assert_eq!(
            render_text(&view),
            "Select an item from the navigation menu to get started.\n"
        );
        assert!(render_markdown(&view).starts_with('_'));
    }

    #[test]
    fn test_render_markdown_root() {
        let mut bucket = MonthlyBucket::new();
        bucket.add(Month::March, Amount::from_units(40));
        let view = View::Node(NodeView {
            path: path(&["Overall"]),
            label: "Overall".to_string(),
            table: Some(csv_totals_table(&bucket)),
            notice: None,
            children: vec!["A".to_string(), "B".to_string()],
        });

        let markdown = render_markdown(&view);
        assert!(markdown.contains("## Overall Data"));
        assert!(markdown.contains("| Section | Code | Jan |"));
        assert!(markdown.contains("Total Billed from CSV"));
        assert!(markdown.contains("### Overall Facilities"));
        assert!(markdown.contains("- B\n"));
    }

    #[test]
    fn test_render_json() {
        let json = render_json(&smith_view()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["generated_at"].is_string());
        assert_eq!(value["view"]["kind"], "node");
        assert_eq!(value["view"]["label"], "Smith");
        assert!(value["view"]["table"]["rows"].is_array());
    }

    #[test]
    fn test_render_tree() {
        let tree = build_navigation(vec![("A", "Smith"), ("A", "Jones"), ("B", "Lee")]);
        let mut expanded = BTreeSet::new();
        expanded.insert(path(&["Overall"]));
        expanded.insert(path(&["Overall", "A"]));

        let text = render_tree(&tree, &expanded, &path(&["Overall", "A", "Smith"]));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "  ▾ Overall",
                "    ▾ A",
                "      • Jones",
                ">     • Smith",
                "    ▸ B",
            ]
        );
    }
}
