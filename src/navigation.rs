//! Facility to provider navigation tree.
//!
//! The tree has a single synthetic root with one child per facility and one
//! grandchild per distinct provider at that facility, all sorted by label.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Label of the synthetic root.
pub const ROOT_LABEL: &str = "Overall";

/// A node of the navigation tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationNode {
    pub label: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NavigationNode>,
}

impl NavigationNode {
    pub fn leaf(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn child(&self, label: &str) -> Option<&NavigationNode> {
        self.children.iter().find(|c| c.label == label)
    }

    /// Resolve a path of labels starting at this node's own label.
    ///
    /// Returns `None` for an empty path or on the first label that does
    /// not match.
    pub fn find(&self, path: &[String]) -> Option<&NavigationNode> {
        let (first, rest) = path.split_first()?;
        if *first != self.label {
            return None;
        }
        rest.iter()
            .try_fold(self, |node, label| node.child(label))
    }

    /// Child labels in display order.
    pub fn child_labels(&self) -> Vec<String> {
        self.children.iter().map(|c| c.label.clone()).collect()
    }

    /// Every path from this node down, parents before children.
    pub fn paths(&self) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        self.collect_paths(&mut Vec::new(), &mut out);
        out
    }

    fn collect_paths(&self, prefix: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
        prefix.push(self.label.clone());
        out.push(prefix.clone());
        for child in &self.children {
            child.collect_paths(prefix, out);
        }
        prefix.pop();
    }
}

/// Build the tree under the default `Overall` root.
pub fn build_navigation<I, F, P>(pairs: I) -> NavigationNode
where
    I: IntoIterator<Item = (F, P)>,
    F: AsRef<str>,
    P: AsRef<str>,
{
    build_navigation_with_root(ROOT_LABEL, pairs)
}

/// Build the tree from `(facility, provider)` pairs.
///
/// Pairs are deduplicated by exact string match. A provider seen at several
/// facilities appears under each of them. Pairs with an empty side are
/// ignored.
pub fn build_navigation_with_root<I, F, P>(root_label: &str, pairs: I) -> NavigationNode
where
    I: IntoIterator<Item = (F, P)>,
    F: AsRef<str>,
    P: AsRef<str>,
{
    let mut facilities: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut ignored = 0usize;

    for (facility, provider) in pairs {
        let (facility, provider) = (facility.as_ref(), provider.as_ref());
        if facility.is_empty() || provider.is_empty() {
            ignored += 1;
            continue;
        }
        facilities
            .entry(facility.to_string())
            .or_default()
            .insert(provider.to_string());
    }

    if ignored > 0 {
        debug!("Ignored {} rows without facility or provider", ignored);
    }

    let children = facilities
        .into_iter()
        .map(|(facility, providers)| NavigationNode {
            label: facility,
            children: providers.into_iter().map(NavigationNode::leaf).collect(),
        })
        .collect();

    NavigationNode {
        label: root_label.to_string(),
        children,
    }
}

/// Split a `/`-separated selection path into labels.
pub fn parse_path(text: &str) -> Vec<String> {
    text.split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
