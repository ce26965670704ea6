//! Include graph of a LaTeX project.
//!
//! Each document is a node of a `petgraph::DiGraph` and every `\include`,
//! `\input` or `\subfile` that resolves is an edge from the includer to the
//! included file. The graph is kept acyclic: an edge whose target can
//! already reach its source is reported as a cycle and never added.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use itertools::Itertools;
use petgraph::algo::has_path_connecting;
use petgraph::prelude::*;
use rayon::prelude::*;
use walkdir::WalkDir;

use super::document::{
    exists, normalize_path, read_snapshot, resolve_relative, DocumentNode, OpenDocuments,
};
use crate::config::Settings;
use crate::error::{ProjectError, Result, Warning, WarningKind};
use crate::scanner::{self, IncludeKind, ScanResult};

/// Edge data: the directive that produced the edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeEdge {
    pub kind: IncludeKind,
    /// Argument as written in the source
    pub target: String,
    pub line: usize,
}

pub type DocumentGraph = DiGraph<DocumentNode, IncludeEdge>;

/// An include directive that could not be followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreachableInclude {
    pub from: PathBuf,
    pub target: String,
    pub line: usize,
}

/// An include directive rejected because following it would close a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleEdge {
    pub from: PathBuf,
    pub to: PathBuf,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct IncludeGraph {
    graph: DocumentGraph,
    master: NodeIndex,
    /// Breadth-first discovery order, master first
    order: Vec<NodeIndex>,
    pub unreachable: Vec<UnreachableInclude>,
    pub cycles: Vec<CycleEdge>,
    pub warnings: Vec<Warning>,
}

impl IncludeGraph {
    pub fn master(&self) -> &DocumentNode {
        &self.graph[self.master]
    }

    pub fn master_path(&self) -> &Path {
        &self.graph[self.master].path
    }

    pub fn master_dir(&self) -> &Path {
        self.master_path().parent().unwrap_or(Path::new("/"))
    }

    /// Documents in discovery order, master first.
    pub fn documents(&self) -> impl Iterator<Item = &DocumentNode> {
        self.order.iter().map(|idx| &self.graph[*idx])
    }

    pub fn document_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn get_document(&self, path: &Path) -> Option<&DocumentNode> {
        self.documents().find(|document| document.path == path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.get_document(path).is_some()
    }

    /// Position of `path` in discovery order.
    pub fn discovery_index(&self, path: &Path) -> Option<usize> {
        self.documents().position(|document| document.path == path)
    }

    /// Files included from `path`, with the directive of each edge.
    pub fn includes_of(&self, path: &Path) -> Vec<(&IncludeEdge, &Path)> {
        let Some(idx) = self.node_index(path) else {
            return vec![];
        };
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .sorted_by_key(|edge| edge.weight().line)
            .map(|edge| (edge.weight(), self.graph[edge.target()].path.as_path()))
            .collect()
    }

    /// Files whose directives include `path`.
    pub fn includers_of(&self, path: &Path) -> Vec<&Path> {
        let Some(idx) = self.node_index(path) else {
            return vec![];
        };
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .map(|neighbor| self.graph[neighbor].path.as_path())
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn node_index(&self, path: &Path) -> Option<NodeIndex> {
        self.order
            .iter()
            .copied()
            .find(|idx| self.graph[*idx].path == path)
    }
}

/// Builds the include graph breadth-first from `master`.
///
/// Every document is scanned once. Directives resolve against the master's
/// directory first, then the including file's directory. Only an unreadable
/// master is an error; everything else ends up in the graph's warnings.
pub fn build_graph(master: &Path, open: &OpenDocuments) -> Result<IncludeGraph> {
    let master_node = DocumentNode::load(master, open)?;
    let master_dir = master.parent().unwrap_or(Path::new("/")).to_path_buf();

    let mut graph = DocumentGraph::new();
    let master_idx = graph.add_node(master_node);
    let mut index_of: HashMap<PathBuf, NodeIndex> = HashMap::from([(master.to_path_buf(), master_idx)]);
    let mut order = vec![master_idx];
    let mut queue = VecDeque::from([master_idx]);
    let mut unreachable = vec![];
    let mut cycles = vec![];
    let mut warnings = vec![];

    while let Some(idx) = queue.pop_front() {
        let from = graph[idx].path.clone();
        let from_dir = from.parent().unwrap_or(Path::new("/")).to_path_buf();
        let includes = graph[idx].scan.includes.clone();

        for include in includes {
            let edge = IncludeEdge {
                kind: include.kind,
                target: include.target.clone(),
                line: include.line,
            };

            let Some(target) = resolve_relative(
                &include.target,
                &[master_dir.as_path(), from_dir.as_path()],
                ".tex",
                open,
            ) else {
                warnings.push(Warning::new(
                    WarningKind::Unreadable,
                    &from,
                    Some(include.line),
                    format!("included file `{}` not found", include.target),
                ));
                unreachable.push(UnreachableInclude {
                    from: from.clone(),
                    target: include.target,
                    line: include.line,
                });
                continue;
            };

            if let Some(&existing) = index_of.get(&target) {
                if has_path_connecting(&graph, existing, idx, None) {
                    let cycle = ProjectError::Cycle {
                        from: from.clone(),
                        to: target.clone(),
                    };
                    let mut warning = Warning::from(&cycle);
                    warning.line = Some(include.line);
                    warnings.push(warning);
                    cycles.push(CycleEdge {
                        from: from.clone(),
                        to: target,
                        line: include.line,
                    });
                } else {
                    graph.add_edge(idx, existing, edge);
                }
                continue;
            }

            match DocumentNode::load(&target, open) {
                Ok(node) => {
                    let new_idx = graph.add_node(node);
                    graph.add_edge(idx, new_idx, edge);
                    index_of.insert(target, new_idx);
                    order.push(new_idx);
                    queue.push_back(new_idx);
                }
                Err(err) => {
                    let mut warning = Warning::from(&err);
                    warning.path = from.clone();
                    warning.line = Some(include.line);
                    warnings.push(warning);
                    unreachable.push(UnreachableInclude {
                        from: from.clone(),
                        target: include.target,
                        line: include.line,
                    });
                }
            }
        }
    }

    tracing::debug!(
        "include graph of {}: {} documents, {} edges",
        master.display(),
        graph.node_count(),
        graph.edge_count()
    );

    Ok(IncludeGraph {
        graph,
        master: master_idx,
        order,
        unreachable,
        cycles,
        warnings,
    })
}

/// Finds the master document of the project `start` belongs to.
///
/// In order: the configured master, a `\documentclass` in `start`, a
/// `% mainfile:` modeline near the top or bottom of `start`, and finally
/// the outermost file that (transitively) includes `start`.
pub fn resolve_master(start: &Path, settings: &Settings, open: &OpenDocuments) -> Result<PathBuf> {
    let start_dir = start.parent().unwrap_or(Path::new("/"));

    if let Some(master) = &settings.master {
        let master = normalize_path(&start_dir.join(master));
        return match exists(&master, open) {
            true => Ok(master),
            false => Err(ProjectError::NotFound(format!(
                "configured master `{}`",
                master.display()
            ))),
        };
    }

    let (text, _) = read_snapshot(start, open)
        .map_err(|err| ProjectError::NotFound(format!("master of {}: {err}", start.display())))?;
    let scan = scanner::scan(&text);

    if scan.declares_root {
        return Ok(start.to_path_buf());
    }

    if let Some(modeline) = modeline_master(&scan, settings.modeline_lines) {
        let master = normalize_path(&start_dir.join(modeline));
        return match exists(&master, open) {
            true => Ok(master),
            false => Err(ProjectError::NotFound(format!("mainfile `{modeline}`"))),
        };
    }

    Ok(climb_to_master(start, settings, open))
}

fn modeline_master(scan: &ScanResult, lines: usize) -> Option<&str> {
    let tail_start = scan.line_count.saturating_sub(lines);
    scan.modelines
        .iter()
        .find(|modeline| modeline.line < lines || modeline.line >= tail_start)
        .map(|modeline| modeline.key.as_str())
}

/// Directory levels above a document that may hold its project's top.
const ROOT_SEARCH_LIMIT: usize = 8;

type LoadedDocuments = HashMap<PathBuf, DocumentNode>;

/// Walks up through containing documents until nothing includes the current one.
///
/// Each step looks for includers of the current document only, so the walk
/// from any document of a chain ends where the walk from its top would. When
/// the walk comes back to a document it already passed, the smallest path on
/// that cycle is the master.
fn climb_to_master(start: &Path, settings: &Settings, open: &OpenDocuments) -> PathBuf {
    let mut loaded = LoadedDocuments::new();
    let mut chain = vec![start.to_path_buf()];

    loop {
        let Some(current) = chain.last() else {
            break;
        };
        let Some(container) = find_container(current, settings, open, &mut loaded) else {
            break;
        };

        if let Some(pos) = chain.iter().position(|path| *path == container) {
            tracing::debug!(
                "include cycle while looking for the master of {}",
                start.display()
            );
            chain = chain.split_off(pos).into_iter().min().into_iter().collect();
            break;
        }

        let declares_root = loaded
            .get(&container)
            .is_some_and(|document| document.scan.declares_root);
        chain.push(container);
        if declares_root {
            break;
        }
    }

    chain.pop().unwrap_or_else(|| start.to_path_buf())
}

/// The document that includes `current`, picking the smallest path when
/// several do.
///
/// The search covers `master_search_depth` directories above `current`, or
/// more when the nearest directory holding a `\documentclass` document sits
/// further up.
fn find_container(
    current: &Path,
    settings: &Settings,
    open: &OpenDocuments,
    loaded: &mut LoadedDocuments,
) -> Option<PathBuf> {
    let current_dir = current.parent().unwrap_or(Path::new("/"));
    let ancestors = current_dir.ancestors().take(ROOT_SEARCH_LIMIT).collect_vec();

    let configured = settings.master_search_depth.min(ancestors.len().saturating_sub(1));
    let with_root = ancestors
        .iter()
        .position(|dir| holds_root_document(dir, open, loaded));
    let level = with_root.map_or(configured, |level| level.max(configured));
    let search_root = *ancestors.get(level)?;

    let candidates = candidate_paths(search_root, level + 3, open);
    load_missing(&candidates, open, loaded);

    candidates
        .into_iter()
        .filter(|candidate| candidate != current)
        .filter(|candidate| {
            loaded
                .get(candidate)
                .is_some_and(|document| includes_path(document, current, search_root, open))
        })
        .min()
}

/// Whether a `.tex` file directly inside `dir` carries a `\documentclass`.
fn holds_root_document(dir: &Path, open: &OpenDocuments, loaded: &mut LoadedDocuments) -> bool {
    let paths = candidate_paths(dir, 1, open);
    load_missing(&paths, open, loaded);
    paths.iter().any(|path| {
        loaded
            .get(path)
            .is_some_and(|document| document.scan.declares_root)
    })
}

fn is_tex(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("tex")
}

/// Every `.tex` file under `root` (plus open buffers), smallest path first.
fn candidate_paths(root: &Path, depth: usize, open: &OpenDocuments) -> Vec<PathBuf> {
    let on_disk = WalkDir::new(root)
        .max_depth(depth)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e
                    .file_name()
                    .to_str()
                    .map(|s| s.starts_with('.'))
                    .unwrap_or(false)
        })
        .flatten()
        .filter(|f| f.file_type().is_file() && is_tex(f.path()))
        .map(|f| normalize_path(f.path()))
        .collect_vec();

    let buffers = open.keys().filter(|path| {
        is_tex(path)
            && path
                .strip_prefix(root)
                .is_ok_and(|relative| relative.components().count() <= depth)
    });

    on_disk
        .into_iter()
        .chain(buffers.cloned())
        .sorted()
        .dedup()
        .collect()
}

/// Scans the paths not loaded yet.
fn load_missing(paths: &[PathBuf], open: &OpenDocuments, loaded: &mut LoadedDocuments) {
    let missing = paths
        .iter()
        .filter(|path| !loaded.contains_key(*path))
        .collect_vec();

    let documents: Vec<DocumentNode> = missing
        .par_iter()
        .flat_map(|path| DocumentNode::load(path, open).ok())
        .collect();

    loaded.extend(documents.into_iter().map(|document| (document.path.clone(), document)));
}

/// Whether one of `candidate`'s directives names `target`, resolving against
/// the candidate's directory and each of its ancestors up to `root`.
fn includes_path(candidate: &DocumentNode, target: &Path, root: &Path, open: &OpenDocuments) -> bool {
    let candidate_dir = candidate.path.parent().unwrap_or(Path::new("/"));
    let bases = candidate_dir
        .ancestors()
        .take_while(|dir| dir.starts_with(root))
        .collect_vec();

    candidate.scan.includes.iter().any(|include| {
        resolve_relative(&include.target, &bases, ".tex", open)
            .is_some_and(|resolved| resolved == target)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::document::OpenDocument;
    use crate::test_utils::create_test_project_dir;
    use ropey::Rope;
    use std::fs;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_build_graph_visits_each_file_once() {
        let (_temp_dir, dir) = create_test_project_dir();
        let main = write(
            &dir,
            "main.tex",
            "\\documentclass{book}\n\\include{a}\n\\include{b}\n",
        );
        write(&dir, "a.tex", "\\input{shared}\n");
        write(&dir, "b.tex", "\\input{shared}\n");
        write(&dir, "shared.tex", "\\label{s}\n");

        let graph = build_graph(&main, &OpenDocuments::new()).unwrap();

        assert_eq!(graph.document_count(), 4);
        assert_eq!(graph.edge_count(), 4);
        assert!(graph.cycles.is_empty());
        let names: Vec<_> = graph.documents().flat_map(|d| d.file_name()).collect();
        assert_eq!(names, vec!["main.tex", "a.tex", "b.tex", "shared.tex"]);
        assert_eq!(graph.includers_of(&dir.join("shared.tex")).len(), 2);
    }

    #[test]
    fn test_cycle_is_reported_and_not_followed() {
        let (_temp_dir, dir) = create_test_project_dir();
        let a = write(&dir, "a.tex", "\\input{b}\n");
        write(&dir, "b.tex", "\\input{a}\n");

        let graph = build_graph(&a, &OpenDocuments::new()).unwrap();

        assert_eq!(graph.document_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.cycles.len(), 1);
        assert_eq!(graph.cycles[0].from, dir.join("b.tex"));
        assert_eq!(graph.cycles[0].to, a);
        assert_eq!(
            graph
                .warnings
                .iter()
                .filter(|w| w.kind == WarningKind::Cycle)
                .count(),
            1
        );
    }

    #[test]
    fn test_self_include_is_a_cycle() {
        let (_temp_dir, dir) = create_test_project_dir();
        let a = write(&dir, "a.tex", "\\input{a}\n");

        let graph = build_graph(&a, &OpenDocuments::new()).unwrap();

        assert_eq!(graph.document_count(), 1);
        assert_eq!(graph.cycles.len(), 1);
    }

    #[test]
    fn test_cross_edges_that_close_a_cycle_are_rejected() {
        let (_temp_dir, dir) = create_test_project_dir();
        let main = write(&dir, "main.tex", "\\input{b}\n\\input{c}\n");
        write(&dir, "b.tex", "\\input{c}\n");
        write(&dir, "c.tex", "\\input{b}\n");

        let graph = build_graph(&main, &OpenDocuments::new()).unwrap();

        assert_eq!(graph.document_count(), 3);
        assert_eq!(graph.cycles.len(), 1);
        assert_eq!(graph.cycles[0].from, dir.join("c.tex"));
    }

    #[test]
    fn test_missing_include_is_unreachable() {
        let (_temp_dir, dir) = create_test_project_dir();
        let main = write(&dir, "main.tex", "\\include{ghost}\n\\include{real}\n");
        write(&dir, "real.tex", "");

        let graph = build_graph(&main, &OpenDocuments::new()).unwrap();

        assert_eq!(graph.document_count(), 2);
        assert_eq!(graph.unreachable.len(), 1);
        assert_eq!(graph.unreachable[0].target, "ghost");
        assert_eq!(graph.warnings[0].kind, WarningKind::Unreadable);
    }

    #[test]
    fn test_includes_resolve_against_master_dir_first() {
        let (_temp_dir, dir) = create_test_project_dir();
        let main = write(&dir, "main.tex", "\\input{chapters/one}\n");
        write(&dir, "chapters/one.tex", "\\input{chapters/two}\n\\input{local}\n");
        write(&dir, "chapters/two.tex", "");
        write(&dir, "chapters/local.tex", "");

        let graph = build_graph(&main, &OpenDocuments::new()).unwrap();

        assert_eq!(graph.document_count(), 4);
        assert!(graph.contains(&dir.join("chapters/two.tex")));
        assert!(graph.contains(&dir.join("chapters/local.tex")));
    }

    #[test]
    fn test_resolve_master_documentclass() {
        let (_temp_dir, dir) = create_test_project_dir();
        let main = write(&dir, "main.tex", "\\documentclass{article}\n");

        let master = resolve_master(&main, &Settings::default(), &OpenDocuments::new()).unwrap();
        assert_eq!(master, main);
    }

    #[test]
    fn test_resolve_master_modeline() {
        let (_temp_dir, dir) = create_test_project_dir();
        let main = write(&dir, "thesis.tex", "\\documentclass{report}\n");
        let chapter = write(&dir, "chapters/one.tex", "% mainfile: ../thesis.tex\n\\chapter{One}\n");

        let master = resolve_master(&chapter, &Settings::default(), &OpenDocuments::new()).unwrap();
        assert_eq!(master, main);
    }

    #[test]
    fn test_resolve_master_broken_modeline_is_not_found() {
        let (_temp_dir, dir) = create_test_project_dir();
        let chapter = write(&dir, "one.tex", "% mainfile: nowhere.tex\n");

        let err = resolve_master(&chapter, &Settings::default(), &OpenDocuments::new()).unwrap_err();
        assert!(matches!(err, ProjectError::NotFound(_)));
    }

    #[test]
    fn test_resolve_master_climbs_includers() {
        let (_temp_dir, dir) = create_test_project_dir();
        let main = write(&dir, "main.tex", "\\input{chapters/one}\n");
        let one = write(&dir, "chapters/one.tex", "\\input{chapters/section}\n");
        let section = write(&dir, "chapters/section.tex", "\\label{deep}\n");

        let settings = Settings::default();
        let open = OpenDocuments::new();

        assert_eq!(resolve_master(&section, &settings, &open).unwrap(), main);
        assert_eq!(resolve_master(&one, &settings, &open).unwrap(), main);
        assert_eq!(resolve_master(&main, &settings, &open).unwrap(), main);
    }

    #[test]
    fn test_resolve_master_through_cycle_is_stable() {
        let (_temp_dir, dir) = create_test_project_dir();
        let a = write(&dir, "a.tex", "\\input{b}\n");
        let b = write(&dir, "b.tex", "\\input{a}\n\\input{c}\n");
        let c = write(&dir, "c.tex", "\\label{leaf}\n");

        let settings = Settings::default();
        let open = OpenDocuments::new();

        assert_eq!(resolve_master(&a, &settings, &open).unwrap(), a);
        assert_eq!(resolve_master(&b, &settings, &open).unwrap(), a);
        assert_eq!(resolve_master(&c, &settings, &open).unwrap(), a);
    }

    #[test]
    fn test_resolve_master_two_levels_below() {
        let (_temp_dir, dir) = create_test_project_dir();
        let main = write(
            &dir,
            "main.tex",
            "\\documentclass{book}\n\\include{chapters/part1/one}\n",
        );
        let one = write(&dir, "chapters/part1/one.tex", "\\input{chapters/part1/details}\n");
        let details = write(&dir, "chapters/part1/details.tex", "\\label{deep}\n");

        let settings = Settings::default();
        let open = OpenDocuments::new();

        assert_eq!(resolve_master(&main, &settings, &open).unwrap(), main);
        assert_eq!(resolve_master(&one, &settings, &open).unwrap(), main);
        assert_eq!(resolve_master(&details, &settings, &open).unwrap(), main);
    }

    #[test]
    fn test_resolve_master_sees_open_buffers() {
        let (_temp_dir, dir) = create_test_project_dir();
        let chapter = write(&dir, "chapter.tex", "\\label{x}\n");
        let main = dir.join("main.tex");
        let mut open = OpenDocuments::new();
        open.insert(
            main.clone(),
            OpenDocument {
                text: Rope::from_str("\\documentclass{article}\n\\input{chapter}\n"),
                revision: 1,
            },
        );

        assert_eq!(resolve_master(&chapter, &Settings::default(), &open).unwrap(), main);
    }
}
