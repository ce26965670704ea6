use std::path::{Path, PathBuf};

use itertools::Itertools;
use serde::Serialize;

use crate::bib::BibIndex;
use crate::error::{ProjectError, Result};
use crate::project::document::{resolve_relative, OpenDocuments};
use crate::project::{Location, ProjectSnapshot};
use crate::scanner::{line_directives, strip_comment, INCLUDE_COMMANDS, REF_COMMANDS};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Resolution {
    Found(Location),
    NotFound,
    /// Every file that defines the key, in bibliography order
    Ambiguous(Vec<Location>),
}

impl Resolution {
    pub fn locations(self) -> Vec<Location> {
        match self {
            Resolution::Found(location) => vec![location],
            Resolution::NotFound => vec![],
            Resolution::Ambiguous(locations) => locations,
        }
    }

    /// A single definition of `key`, or the error describing why there isn't one.
    pub fn into_result(self, key: &str) -> Result<Location> {
        match self {
            Resolution::Found(location) => Ok(location),
            Resolution::NotFound => Err(ProjectError::NotFound(format!("`{key}`"))),
            Resolution::Ambiguous(locations) => Err(ProjectError::Ambiguous {
                key: key.to_string(),
                locations,
            }),
        }
    }
}

/// The key a directive under the cursor refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAtCursor {
    Label(String),
    Citation(String),
    Include(String),
}

pub fn resolve_label(snapshot: &ProjectSnapshot, key: &str) -> Option<Location> {
    snapshot.labels.lookup(key).map(|entry| entry.location())
}

/// Looks `key` up in `bib_paths`, or in every bibliography when empty.
pub fn resolve_citation(bibs: &BibIndex, key: &str, bib_paths: &[PathBuf]) -> Resolution {
    let locations = bibs
        .lookup(key)
        .into_iter()
        .filter(|entry| bib_paths.is_empty() || bib_paths.contains(&entry.path))
        .unique_by(|entry| entry.path.clone())
        .map(|entry| Location {
            path: entry.path.clone(),
            line: entry.line,
        })
        .collect_vec();

    match locations.len() {
        0 => Resolution::NotFound,
        1 => Resolution::Found(locations[0].clone()),
        _ => Resolution::Ambiguous(locations),
    }
}

/// Finds the label, citation key or include target under `character`.
///
/// For multi-key citations the key under the cursor is picked; with the
/// cursor on the command itself the first key is.
pub fn key_at(line: &str, character: usize) -> Option<KeyAtCursor> {
    let cursor = line
        .char_indices()
        .nth(character)
        .map(|(idx, _)| idx)
        .unwrap_or(line.len());
    let line = strip_comment(line);

    let directive = line_directives(line).into_iter().find(|directive| {
        directive
            .arg_end
            .is_some_and(|end| directive.start <= cursor && cursor <= end)
    })?;
    let argument = directive.argument()?;
    let arg_start = directive.arg_start?;

    match directive.name() {
        name if INCLUDE_COMMANDS.contains(&name) => {
            Some(KeyAtCursor::Include(argument.trim().to_string()))
        }
        name if name.contains("cite") || name.contains("Cite") => {
            let mut offset = arg_start;
            let mut keys = vec![];
            for part in argument.split(',') {
                keys.push((offset, offset + part.len(), part.trim()));
                offset += part.len() + 1;
            }
            let key = keys
                .iter()
                .find(|(start, end, key)| !key.is_empty() && *start <= cursor && cursor <= *end)
                .or_else(|| keys.iter().find(|(_, _, key)| !key.is_empty()))?
                .2;
            Some(KeyAtCursor::Citation(key.to_string()))
        }
        name if REF_COMMANDS.contains(&name) => {
            let key = argument.trim();
            (!key.is_empty()).then(|| KeyAtCursor::Label(key.to_string()))
        }
        _ => None,
    }
}

/// Definition locations for whatever is under the cursor in `path`.
///
/// `None` when the cursor is not on a reference at all, an empty list when
/// the reference doesn't resolve.
pub fn goto_definition(
    snapshot: &ProjectSnapshot,
    path: &Path,
    line_text: &str,
    character: usize,
) -> Option<Vec<Location>> {
    let key = key_at(line_text, character)?;

    let locations = match key {
        KeyAtCursor::Label(key) => resolve_label(snapshot, &key).into_iter().collect(),
        KeyAtCursor::Citation(key) => resolve_citation(&snapshot.bibs, &key, &[]).locations(),
        KeyAtCursor::Include(target) => resolve_include(snapshot, path, &target)
            .map(|path| Location { path, line: 0 })
            .into_iter()
            .collect(),
    };

    Some(locations)
}

fn resolve_include(snapshot: &ProjectSnapshot, from: &Path, target: &str) -> Option<PathBuf> {
    let edge_target = snapshot.graph.as_ref().and_then(|graph| {
        graph
            .includes_of(from)
            .into_iter()
            .find(|(edge, _)| edge.target == target)
            .map(|(_, path)| path.to_path_buf())
    });

    edge_target.or_else(|| {
        let from_dir = from.parent().unwrap_or(Path::new("/"));
        resolve_relative(
            target,
            &[snapshot.master_dir(), from_dir],
            ".tex",
            &OpenDocuments::new(),
        )
    })
}
