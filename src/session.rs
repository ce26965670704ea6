//! One editing session over one LaTeX project.
//!
//! All queries are answered from an immutable [`ProjectSnapshot`]. A rebuild
//! scans everything into a fresh snapshot and only takes the write lock to
//! swap the pointer, so readers never see a half built index.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use ropey::Rope;

use crate::collaborators::ForwardSearchRequest;
use crate::completion::{self, CompletionCandidate, CompletionContext};
use crate::config::{ReindexPolicy, Settings};
use crate::environment::{self, EnvironmentSpan};
use crate::error::{ProjectError, Result};
use crate::gotodef::{self, Resolution};
use crate::project::document::{exists, normalize_path, read_snapshot, OpenDocument, OpenDocuments};
use crate::project::graph::resolve_master;
use crate::project::{Location, ProjectSnapshot, ReindexReport};

pub struct Session {
    settings: Settings,
    /// The file the session was started from
    start: PathBuf,
    master: PathBuf,
    open: RwLock<OpenDocuments>,
    snapshot: RwLock<Arc<ProjectSnapshot>>,
    /// Bumped by every rebuild request; a rebuild only lands if it is still the latest
    generation: AtomicU64,
    built: AtomicBool,
}

impl Session {
    pub fn initialize(current_file: &Path, settings: Settings) -> Result<Session> {
        Session::with_open_documents(current_file, settings, OpenDocuments::new())
    }

    /// Starts a session whose files may only exist as host buffers so far.
    pub fn with_open_documents(
        current_file: &Path,
        settings: Settings,
        open: OpenDocuments,
    ) -> Result<Session> {
        let start = std::fs::canonicalize(current_file)
            .unwrap_or_else(|_| normalize_path(current_file));
        if !exists(&start, &open) {
            return Err(ProjectError::NotFound(format!("{}", start.display())));
        }

        let master = match resolve_master(&start, &settings, &open) {
            Ok(master) => master,
            Err(err) => {
                tracing::warn!("{err}; using {} as master", start.display());
                start.clone()
            }
        };
        tracing::info!("session for {} with master {}", start.display(), master.display());

        Ok(Session {
            snapshot: RwLock::new(Arc::new(ProjectSnapshot::empty(&master))),
            settings,
            start,
            master,
            open: RwLock::new(open),
            generation: AtomicU64::new(0),
            built: AtomicBool::new(false),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn start(&self) -> &Path {
        &self.start
    }

    pub fn master(&self) -> &Path {
        &self.master
    }

    /// Rebuilds now and returns what the rebuild found.
    pub fn reindex(&self) -> ReindexReport {
        let token = self.begin_rebuild();
        self.rebuild(token)
            .unwrap_or_else(|| self.current_snapshot().report())
    }

    /// Registers a rebuild request. Any rebuild still running with an older
    /// token will drop its result.
    pub fn begin_rebuild(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Builds a new snapshot for `token`. `None` when a newer request arrived
    /// while scanning.
    pub fn rebuild(&self, token: u64) -> Option<ReindexReport> {
        let open = self.open.read().clone();
        let snapshot = ProjectSnapshot::build(&self.master, &self.settings, &open);

        let mut current = self.snapshot.write();
        if self.generation.load(Ordering::SeqCst) != token {
            tracing::debug!("dropping rebuild {token}, a newer one was requested");
            return None;
        }
        for warning in &snapshot.warnings {
            tracing::warn!("{warning}");
        }
        let report = snapshot.report();
        *current = Arc::new(snapshot);
        self.built.store(true, Ordering::SeqCst);
        Some(report)
    }

    /// The snapshot queries run against. The first query builds it unless
    /// the reindex policy is `Never`.
    pub fn snapshot(&self) -> Arc<ProjectSnapshot> {
        if !self.built.load(Ordering::SeqCst) && self.settings.reindex != ReindexPolicy::Never {
            self.reindex();
        }
        self.current_snapshot()
    }

    fn current_snapshot(&self) -> Arc<ProjectSnapshot> {
        self.snapshot.read().clone()
    }

    pub fn complete(&self, context: CompletionContext, prefix: &str) -> Vec<CompletionCandidate> {
        completion::complete(&self.snapshot(), &self.settings, context, prefix)
    }

    pub fn resolve_label(&self, key: &str) -> Option<Location> {
        gotodef::resolve_label(&self.snapshot(), key)
    }

    pub fn resolve_citation(&self, key: &str) -> Resolution {
        gotodef::resolve_citation(&self.snapshot().bibs, key, &[])
    }

    /// Innermost environment around `line` of `path`, from its current text.
    pub fn environment_at(&self, path: &Path, line: usize) -> Option<EnvironmentSpan> {
        let text = self.text_of(path)?;
        environment::locate(&text, line)
    }

    pub fn goto_definition(&self, path: &Path, line: usize, character: usize) -> Option<Vec<Location>> {
        let line_text = self.line_text(path, line)?;
        gotodef::goto_definition(&self.snapshot(), &normalize_path(path), &line_text, character)
    }

    pub fn line_text(&self, path: &Path, line: usize) -> Option<String> {
        Some(self.text_of(path)?.get_line(line)?.to_string())
    }

    pub fn open_document(&self, path: &Path, text: &str, revision: i32) {
        self.open.write().insert(
            normalize_path(path),
            OpenDocument {
                text: Rope::from_str(text),
                revision,
            },
        );
    }

    pub fn close_document(&self, path: &Path) {
        self.open.write().remove(&normalize_path(path));
    }

    pub fn is_open(&self, path: &Path) -> bool {
        self.open.read().contains_key(&normalize_path(path))
    }

    pub fn has_open_documents(&self) -> bool {
        !self.open.read().is_empty()
    }

    /// Whether `path` is the master, a reachable document or a used bibliography.
    pub fn belongs_to_project(&self, path: &Path) -> bool {
        let path = normalize_path(path);
        if path == self.master {
            return true;
        }
        let snapshot = self.current_snapshot();
        snapshot.contains(&path) || snapshot.bib_files.contains(&path)
    }

    /// Data a viewer needs to show `line` of `file` in the compiled master.
    pub fn forward_search_request(&self, file: &Path, line: usize) -> ForwardSearchRequest {
        ForwardSearchRequest {
            source: normalize_path(file),
            line,
            output: self.master.with_extension(&self.settings.output_format),
        }
    }

    fn text_of(&self, path: &Path) -> Option<Rope> {
        let path = normalize_path(path);
        if let Some(document) = self.open.read().get(&path) {
            return Some(document.text.clone());
        }
        match read_snapshot(&path, &OpenDocuments::new()) {
            Ok((text, _)) => Some(Rope::from_str(&text)),
            Err(err) => {
                tracing::debug!("{err}");
                None
            }
        }
    }
}
