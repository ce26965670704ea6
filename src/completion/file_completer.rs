//! Path completion for `\include`-style directives and `\includegraphics`.
//!
//! Words are relative to the master's directory, with `/` separators, since
//! that is what the directives resolve against first. Include paths come
//! from the include graph in discovery order, followed by the `.tex` files
//! on disk that nothing includes yet.

use std::path::{Path, PathBuf};

use itertools::Itertools;
use walkdir::WalkDir;

use super::{CandidateKind, Completable, Completer, CompletionCandidate, Context};

const INCLUDE_SEARCH_DEPTH: usize = 4;
const GRAPHICS_SEARCH_DEPTH: usize = 2;

pub struct ProjectFile {
    path: PathBuf,
    relative: String,
}

fn project_files(root: &Path, max_depth: usize, mut keep: impl FnMut(&Path) -> bool) -> Vec<ProjectFile> {
    WalkDir::new(root)
        .max_depth(max_depth)
        .sort_by_file_name()
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
        .filter(|f| f.file_type().is_file() && keep(f.path()))
        .filter_map(|f| ProjectFile::new(f.path(), root))
        .collect()
}

impl ProjectFile {
    fn new(path: &Path, root: &Path) -> Option<ProjectFile> {
        let relative = pathdiff::diff_paths(path, root)?;
        let relative = relative.components().map(|c| c.as_os_str().to_string_lossy()).join("/");
        Some(ProjectFile {
            path: path.to_path_buf(),
            relative,
        })
    }
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
}

pub struct IncludeCompleter<'a> {
    context: Context<'a>,
}

impl<'a> Completer<'a> for IncludeCompleter<'a> {
    fn construct(context: Context<'a>) -> Self {
        IncludeCompleter { context }
    }

    fn completions(&self) -> Vec<impl Completable<'a, Self>> {
        let snapshot = self.context.snapshot;
        let root = snapshot.master_dir();
        let tex = ["tex".to_string()];

        let included = snapshot
            .graph
            .iter()
            .flat_map(|graph| graph.documents().skip(1))
            .filter_map(|document| ProjectFile::new(&document.path, root))
            .collect_vec();

        let on_disk = project_files(root, INCLUDE_SEARCH_DEPTH, |path| {
            path != snapshot.master.as_path()
                && has_extension(path, &tex)
                && !snapshot.contains(path)
        });

        included.into_iter().chain(on_disk).collect()
    }
}

impl<'a> Completable<'a, IncludeCompleter<'a>> for ProjectFile {
    fn completions(&self, completer: &IncludeCompleter<'a>) -> Option<CompletionCandidate> {
        let word = self
            .relative
            .strip_suffix(".tex")
            .unwrap_or(&self.relative)
            .to_string();

        Some(CompletionCandidate {
            word,
            info: completer
                .context
                .snapshot
                .contains(&self.path)
                .then(|| "included".to_string()),
            kind: CandidateKind::IncludePath,
            ambiguous: false,
        })
    }
}

pub struct GraphicsCompleter<'a> {
    context: Context<'a>,
}

impl<'a> Completer<'a> for GraphicsCompleter<'a> {
    fn construct(context: Context<'a>) -> Self {
        GraphicsCompleter { context }
    }

    fn completions(&self) -> Vec<impl Completable<'a, Self>> {
        let extensions = &self.context.settings.graphics_extensions;
        project_files(
            self.context.snapshot.master_dir(),
            GRAPHICS_SEARCH_DEPTH,
            |path| has_extension(path, extensions),
        )
    }
}

impl<'a> Completable<'a, GraphicsCompleter<'a>> for ProjectFile {
    fn completions(&self, _completer: &GraphicsCompleter<'a>) -> Option<CompletionCandidate> {
        Some(CompletionCandidate {
            word: self.relative.clone(),
            info: None,
            kind: CandidateKind::Graphic,
            ambiguous: false,
        })
    }
}
