use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;

use super::graph::IncludeGraph;
use super::Location;
use crate::error::{Warning, WarningKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelEntry {
    pub key: String,
    pub path: PathBuf,
    pub line: usize,
}

impl LabelEntry {
    pub fn location(&self) -> Location {
        Location {
            path: self.path.clone(),
            line: self.line,
        }
    }
}

/// Label definitions of every document in the graph, first definition wins.
#[derive(Debug, Clone, Default)]
pub struct LabelIndex {
    /// Unique entries in graph discovery order
    entries: Vec<LabelEntry>,
    by_key: HashMap<String, usize>,
}

impl LabelIndex {
    /// Merges the labels of every document in breadth-first order.
    ///
    /// Later definitions of an already known key are returned as warnings.
    pub fn rebuild(graph: &IncludeGraph) -> (LabelIndex, Vec<Warning>) {
        let mut index = LabelIndex::default();
        let mut warnings = vec![];

        for document in graph.documents() {
            for label in &document.scan.labels {
                if let Some(first) = index.lookup(&label.key) {
                    warnings.push(Warning::new(
                        WarningKind::DuplicateLabel,
                        &document.path,
                        Some(label.line),
                        format!(
                            "duplicate label `{}`, first defined in {}:{}",
                            label.key,
                            first.path.display(),
                            first.line + 1
                        ),
                    ));
                    continue;
                }

                index.by_key.insert(label.key.clone(), index.entries.len());
                index.entries.push(LabelEntry {
                    key: label.key.clone(),
                    path: document.path.clone(),
                    line: label.line,
                });
            }
        }

        (index, warnings)
    }

    pub fn lookup(&self, key: &str) -> Option<&LabelEntry> {
        self.by_key.get(key).map(|idx| &self.entries[*idx])
    }

    pub fn entries(&self) -> &[LabelEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
