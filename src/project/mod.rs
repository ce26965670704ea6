//! Project-wide state: the include graph, the label index and the
//! bibliography index, bundled into one immutable [`ProjectSnapshot`].
//!
//! A snapshot is built in one go from the master document and never
//! mutated afterwards. Rebuilding means building a new snapshot.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use rayon::prelude::*;
use serde::Serialize;

use crate::bib::{self, BibEntry, BibFile, BibIndex};
use crate::config::Settings;
use crate::error::{ProjectError, Warning, WarningKind};

pub mod document;
pub mod graph;
pub mod labels;

use self::document::{normalize_path, resolve_relative, DocumentNode, OpenDocuments};
use self::graph::{build_graph, IncludeGraph};
use self::labels::LabelIndex;

/// A position in a project file. `line` is 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Location {
    pub path: PathBuf,
    pub line: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectSnapshot {
    pub master: PathBuf,
    /// `None` until the first build, or when the master could not be read
    pub graph: Option<IncludeGraph>,
    pub labels: LabelIndex,
    pub bibs: BibIndex,
    /// `.bib` files in discovery order; `bibs` additionally holds `\bibitem` sources
    pub bib_files: Vec<PathBuf>,
    pub warnings: Vec<Warning>,
}

/// What a rebuild used and what it complained about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub master: PathBuf,
    pub bib_files_used: Vec<PathBuf>,
    /// Every reachable document except the master, in discovery order
    pub include_files_used: Vec<PathBuf>,
    pub warnings: Vec<Warning>,
}

impl ProjectSnapshot {
    pub fn empty(master: &Path) -> ProjectSnapshot {
        ProjectSnapshot {
            master: master.to_path_buf(),
            ..Default::default()
        }
    }

    /// Scans the whole project reachable from `master`.
    ///
    /// Never fails: an unreadable master yields an empty snapshot carrying
    /// the corresponding warning.
    pub fn build(master: &Path, settings: &Settings, open: &OpenDocuments) -> ProjectSnapshot {
        let graph = match build_graph(master, open) {
            Ok(graph) => graph,
            Err(err) => {
                tracing::warn!("cannot index {}: {err}", master.display());
                return ProjectSnapshot {
                    warnings: vec![Warning::from(&err)],
                    ..ProjectSnapshot::empty(master)
                };
            }
        };

        let mut warnings = graph.warnings.clone();
        for document in graph.documents() {
            warnings.extend(document.scan.warnings.iter().map(|warning| {
                Warning::from(&ProjectError::MalformedInput {
                    path: document.path.clone(),
                    line: warning.line,
                    message: warning.message.clone(),
                })
            }));
        }

        let (labels, label_warnings) = LabelIndex::rebuild(&graph);
        warnings.extend(label_warnings);

        let (bib_files, bib_warnings) = discover_bibliographies(&graph, settings, open);
        warnings.extend(bib_warnings);

        let parsed: Vec<_> = bib_files
            .par_iter()
            .map(|path| (path, parse_bibliography(path, open)))
            .collect();

        let mut bibs = BibIndex::default();
        let mut used = vec![];
        for (path, result) in parsed {
            match result {
                Ok((entries, file_warnings)) => {
                    warnings.extend(file_warnings);
                    used.push(path.clone());
                    bibs.push(BibFile {
                        path: path.clone(),
                        entries,
                    });
                }
                Err(err) => warnings.push(Warning::from(&err)),
            }
        }
        for document in graph.documents() {
            if let Some((file, bibitem_warnings)) = bibitem_file(document) {
                warnings.extend(bibitem_warnings);
                bibs.push(file);
            }
        }

        tracing::info!(
            "indexed {}: {} documents, {} labels, {} bibliography entries, {} warnings",
            master.display(),
            graph.document_count(),
            labels.len(),
            bibs.entries().count(),
            warnings.len()
        );

        ProjectSnapshot {
            master: master.to_path_buf(),
            graph: Some(graph),
            labels,
            bibs,
            bib_files: used,
            warnings,
        }
    }

    pub fn is_built(&self) -> bool {
        self.graph.is_some()
    }

    pub fn master_dir(&self) -> &Path {
        self.master.parent().unwrap_or(Path::new("/"))
    }

    pub fn document(&self, path: &Path) -> Option<&DocumentNode> {
        self.graph.as_ref()?.get_document(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.document(path).is_some()
    }

    /// Position of `path` in discovery order, used to break ties.
    pub fn discovery_index(&self, path: &Path) -> Option<usize> {
        self.graph.as_ref()?.discovery_index(path)
    }

    pub fn report(&self) -> ReindexReport {
        let include_files_used = self
            .graph
            .iter()
            .flat_map(|graph| graph.documents().skip(1))
            .map(|document| document.path.clone())
            .collect();

        ReindexReport {
            master: self.master.clone(),
            bib_files_used: self.bib_files.clone(),
            include_files_used,
            warnings: self.warnings.clone(),
        }
    }
}

/// Resolves every `\bibliography` / `\addbibresource` argument in the graph.
fn discover_bibliographies(
    graph: &IncludeGraph,
    settings: &Settings,
    open: &OpenDocuments,
) -> (Vec<PathBuf>, Vec<Warning>) {
    let master_dir = graph.master_dir().to_path_buf();
    let search_paths = settings
        .bib_search_paths
        .iter()
        .map(|path| normalize_path(&master_dir.join(shellexpand::tilde(path).into_owned())))
        .collect_vec();

    let mut found = vec![];
    let mut seen = HashSet::new();
    let mut warnings = vec![];

    for document in graph.documents() {
        let document_dir = document.path.parent().unwrap_or(Path::new("/"));
        let bases = [master_dir.as_path(), document_dir]
            .into_iter()
            .chain(search_paths.iter().map(PathBuf::as_path))
            .collect_vec();

        for bibliography in &document.scan.bibliographies {
            match resolve_relative(&bibliography.key, &bases, ".bib", open) {
                Some(path) => {
                    if seen.insert(path.clone()) {
                        found.push(path);
                    }
                }
                None => warnings.push(Warning::new(
                    WarningKind::Unreadable,
                    &document.path,
                    Some(bibliography.line),
                    format!("bibliography `{}` not found", bibliography.key),
                )),
            }
        }
    }

    (found, warnings)
}

fn parse_bibliography(
    path: &Path,
    open: &OpenDocuments,
) -> crate::error::Result<(Vec<BibEntry>, Vec<Warning>)> {
    match open.get(path) {
        Some(document) => Ok(bib::parse_str(&document.text.to_string(), path)),
        None => bib::parse(path),
    }
}

/// `\bibitem` keys of one document as a bibliography source of its own.
fn bibitem_file(document: &DocumentNode) -> Option<(BibFile, Vec<Warning>)> {
    if document.scan.bibitems.is_empty() {
        return None;
    }

    let mut seen = HashSet::new();
    let mut warnings = vec![];
    let mut entries = vec![];
    for item in &document.scan.bibitems {
        if !seen.insert(item.key.as_str()) {
            warnings.push(Warning::new(
                WarningKind::DuplicateBibKey,
                &document.path,
                Some(item.line),
                format!("duplicate \\bibitem `{}`", item.key),
            ));
            continue;
        }
        entries.push(BibEntry {
            key: item.key.clone(),
            entry_type: "bibitem".to_string(),
            path: document.path.clone(),
            line: item.line,
            title: None,
            author: None,
        });
    }

    Some((
        BibFile {
            path: document.path.clone(),
            entries,
        },
        warnings,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_project_dir;
    use std::fs;

    #[test]
    fn test_build_collects_bibliographies_in_discovery_order() {
        let (_temp_dir, dir) = create_test_project_dir();
        fs::write(
            dir.join("main.tex"),
            "\\documentclass{article}\n\\bibliography{refs}\n\\input{ch}\n",
        )
        .unwrap();
        fs::write(dir.join("ch.tex"), "\\addbibresource{more.bib}\n\\bibliography{refs}\n").unwrap();
        fs::write(dir.join("refs.bib"), "@misc{a}\n").unwrap();
        fs::write(dir.join("more.bib"), "@misc{b}\n@misc{c}\n").unwrap();

        let snapshot =
            ProjectSnapshot::build(&dir.join("main.tex"), &Settings::default(), &OpenDocuments::new());

        assert_eq!(snapshot.bib_files, vec![dir.join("refs.bib"), dir.join("more.bib")]);
        assert_eq!(snapshot.bibs.entries().count(), 3);
        assert!(snapshot.warnings.is_empty());

        let report = snapshot.report();
        assert_eq!(report.include_files_used, vec![dir.join("ch.tex")]);
        assert_eq!(report.bib_files_used.len(), 2);
    }

    #[test]
    fn test_missing_bibliography_is_a_warning() {
        let (_temp_dir, dir) = create_test_project_dir();
        fs::write(dir.join("main.tex"), "\\bibliography{gone}\n").unwrap();

        let snapshot =
            ProjectSnapshot::build(&dir.join("main.tex"), &Settings::default(), &OpenDocuments::new());

        assert!(snapshot.bib_files.is_empty());
        assert_eq!(snapshot.warnings.len(), 1);
        assert_eq!(snapshot.warnings[0].kind, WarningKind::Unreadable);
        assert_eq!(snapshot.warnings[0].line, Some(0));
    }

    #[test]
    fn test_bib_search_paths_are_consulted_last() {
        let (_temp_dir, dir) = create_test_project_dir();
        fs::create_dir(dir.join("shared")).unwrap();
        fs::write(dir.join("main.tex"), "\\bibliography{global}\n").unwrap();
        fs::write(dir.join("shared/global.bib"), "@book{g}\n").unwrap();

        let settings = Settings {
            bib_search_paths: vec!["shared".to_string()],
            ..Settings::default()
        };
        let snapshot = ProjectSnapshot::build(&dir.join("main.tex"), &settings, &OpenDocuments::new());

        assert_eq!(snapshot.bib_files, vec![dir.join("shared/global.bib")]);
        assert_eq!(snapshot.bibs.lookup("g").len(), 1);
    }

    #[test]
    fn test_bibitems_are_indexed_with_their_document() {
        let (_temp_dir, dir) = create_test_project_dir();
        fs::write(
            dir.join("main.tex"),
            "\\begin{thebibliography}{9}\n\\bibitem{lamport94} Lamport.\n\\bibitem[K]{knuth84} Knuth.\n\\end{thebibliography}\n",
        )
        .unwrap();

        let snapshot =
            ProjectSnapshot::build(&dir.join("main.tex"), &Settings::default(), &OpenDocuments::new());

        let entries = snapshot.bibs.lookup("knuth84");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_type, "bibitem");
        assert_eq!(entries[0].path, dir.join("main.tex"));
        assert_eq!(entries[0].line, 2);
        assert!(snapshot.report().bib_files_used.is_empty());
    }

    #[test]
    fn test_unreadable_master_gives_empty_snapshot() {
        let (_temp_dir, dir) = create_test_project_dir();

        let snapshot =
            ProjectSnapshot::build(&dir.join("nope.tex"), &Settings::default(), &OpenDocuments::new());

        assert!(!snapshot.is_built());
        assert_eq!(snapshot.warnings.len(), 1);
        assert_eq!(snapshot.warnings[0].kind, WarningKind::Unreadable);
    }

    #[test]
    fn test_scanner_warnings_become_malformed_input() {
        let (_temp_dir, dir) = create_test_project_dir();
        fs::write(dir.join("main.tex"), "\\begin{a}\n\\end{b}\n").unwrap();

        let snapshot =
            ProjectSnapshot::build(&dir.join("main.tex"), &Settings::default(), &OpenDocuments::new());

        assert_eq!(snapshot.warnings.len(), 1);
        assert_eq!(snapshot.warnings[0].kind, WarningKind::MalformedInput);
        assert_eq!(snapshot.warnings[0].line, Some(1));
    }
}
