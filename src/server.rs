//! Language server front end.
//!
//! Every opened file is mapped to a session. A session is reused when the
//! file belongs to its project, otherwise a new one is started from it.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ropey::Rope;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tower_lsp::jsonrpc::{Error, Result};
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionList, CompletionOptions, CompletionParams,
    CompletionResponse, Diagnostic, DiagnosticSeverity, DidChangeTextDocumentParams,
    DidCloseTextDocumentParams, DidOpenTextDocumentParams, DidSaveTextDocumentParams,
    ExecuteCommandOptions, ExecuteCommandParams, GotoDefinitionParams, GotoDefinitionResponse,
    InitializeParams, InitializeResult, InitializedParams, Location, MessageType, OneOf, Position,
    Range, ServerCapabilities, ServerInfo, TextDocumentSyncCapability, TextDocumentSyncKind, Url,
};
use tower_lsp::{Client, LanguageServer, LspService, Server};

use crate::completion::{context_at, CandidateKind, CompletionCandidate};
use crate::config::Settings;
use crate::environment::SpanMode;
use crate::error::{Warning, WarningKind};
use crate::project::ReindexReport;
use crate::scheduler::ReindexScheduler;
use crate::session::Session;

mod commands {
    pub const REINDEX: &str = "texseven.reindex";
    pub const ENVIRONMENT: &str = "texseven.environment";
}

/// Files that currently carry diagnostics, per project.
type Published = Arc<Mutex<HashSet<PathBuf>>>;

struct Project {
    scheduler: Arc<ReindexScheduler>,
    published: Published,
}

pub struct Backend {
    client: Client,
    projects: RwLock<Vec<Project>>,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Backend {
            client,
            projects: RwLock::new(vec![]),
        }
    }

    fn server_capabilities() -> ServerCapabilities {
        ServerCapabilities {
            text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL)),
            completion_provider: Some(CompletionOptions {
                trigger_characters: Some(vec!["{".into(), ",".into()]),
                resolve_provider: Some(false),
                ..Default::default()
            }),
            definition_provider: Some(OneOf::Left(true)),
            execute_command_provider: Some(ExecuteCommandOptions {
                commands: vec![commands::REINDEX.into(), commands::ENVIRONMENT.into()],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// The project `path` belongs to, if a session already covers it.
    async fn project_for(&self, path: &Path) -> Option<(Arc<ReindexScheduler>, Published)> {
        let projects = self.projects.read().await;
        projects
            .iter()
            .find(|project| {
                let session = project.scheduler.session();
                session.start() == path || session.is_open(path) || session.belongs_to_project(path)
            })
            .map(|project| (project.scheduler.clone(), project.published.clone()))
    }

    async fn session_for(&self, path: &Path) -> Option<Arc<Session>> {
        self.project_for(path)
            .await
            .map(|(scheduler, _)| scheduler.session().clone())
    }

    /// Starts a session from `path` in the background and indexes it.
    async fn start_project(&self, path: PathBuf, text: String, version: i32) {
        let settings = path
            .parent()
            .map(Settings::new)
            .unwrap_or_else(|| Ok(Settings::default()))
            .unwrap_or_else(|err| {
                tracing::warn!("invalid settings, using defaults: {err}");
                Settings::default()
            });

        let start = path.clone();
        let session = tokio::task::spawn_blocking(move || {
            let open = HashMap::from([(
                start.clone(),
                crate::project::document::OpenDocument {
                    text: ropey::Rope::from_str(&text),
                    revision: version,
                },
            )]);
            Session::with_open_documents(&start, settings, open)
        })
        .await;

        let session = match session {
            Ok(Ok(session)) => Arc::new(session),
            Ok(Err(err)) => {
                tracing::error!("cannot start a session for {}: {err}", path.display());
                return;
            }
            Err(err) => {
                tracing::error!("session task failed: {err}");
                return;
            }
        };
        self.client
            .log_message(
                MessageType::INFO,
                format!("texseven: master is {}", session.master().display()),
            )
            .await;

        let scheduler = Arc::new(ReindexScheduler::new(session));
        let published: Published = Arc::default();
        self.projects.write().await.push(Project {
            scheduler: scheduler.clone(),
            published: published.clone(),
        });

        if scheduler.session().settings().reindex != crate::config::ReindexPolicy::Never {
            self.schedule(&scheduler, published).await;
        }
    }

    async fn schedule(&self, scheduler: &ReindexScheduler, published: Published) {
        let client = self.client.clone();
        scheduler
            .trigger(move |report| async move {
                publish_report(&client, &published, &report).await;
            })
            .await;
    }

    async fn reindex_command(&self, arguments: &[Value]) -> Result<Option<Value>> {
        let path = match arguments.first() {
            Some(argument) => Some(path_argument(argument)?),
            None => None,
        };

        let projects: Vec<_> = self
            .projects
            .read()
            .await
            .iter()
            .map(|project| (project.scheduler.clone(), project.published.clone()))
            .collect();

        let mut reports = vec![];
        for (scheduler, published) in projects {
            let session = scheduler.session().clone();
            if path
                .as_ref()
                .is_some_and(|path| !session.belongs_to_project(path) && session.start() != path)
            {
                continue;
            }
            let report = tokio::task::spawn_blocking(move || session.reindex())
                .await
                .map_err(|err| Error::invalid_params(format!("reindex failed: {err}")))?;
            publish_report(&self.client, &published, &report).await;
            reports.push(report);
        }

        serde_json::to_value(reports)
            .map(Some)
            .map_err(|err| Error::invalid_params(err.to_string()))
    }

    async fn environment_command(&self, arguments: &[Value]) -> Result<Option<Value>> {
        let (Some(uri), Some(line)) = (arguments.first(), arguments.get(1)) else {
            return Err(Error::invalid_params("expected [uri, line, mode?]"));
        };
        let path = path_argument(uri)?;
        let line = line
            .as_u64()
            .ok_or_else(|| Error::invalid_params("line must be a number"))? as usize;
        let mode = match arguments.get(2).and_then(Value::as_str) {
            Some("inner") => SpanMode::Inner,
            _ => SpanMode::Outer,
        };

        let Some(session) = self.session_for(&path).await else {
            return Ok(None);
        };
        let Some(span) = session.environment_at(&path, line) else {
            return Ok(None);
        };

        Ok(Some(serde_json::json!({
            "name": span.name,
            "start_line": span.start_line,
            "end_line": span.end_line,
            "range": span.expand(mode),
        })))
    }
}

fn path_argument(value: &Value) -> Result<PathBuf> {
    value
        .as_str()
        .and_then(|uri| Url::parse(uri).ok())
        .and_then(|uri| uri.to_file_path().ok())
        .ok_or_else(|| Error::invalid_params("expected a file uri"))
}

fn to_path(uri: &Url) -> Option<PathBuf> {
    uri.to_file_path().ok()
}

/// Converts an LSP column, counted in UTF-16 code units, to a char offset.
fn char_column(line: &str, utf16_column: u32) -> usize {
    let line = Rope::from_str(line);
    line.utf16_cu_to_char((utf16_column as usize).min(line.len_utf16_cu()))
}

/// Removes the projects none of whose documents are open any more.
fn take_idle_projects(projects: &mut Vec<Project>) -> Vec<Project> {
    let (idle, active) = std::mem::take(projects)
        .into_iter()
        .partition(|project| !project.scheduler.session().has_open_documents());
    *projects = active;
    idle
}

fn line_range(line: usize) -> Range {
    Range {
        start: Position {
            line: line as u32,
            character: 0,
        },
        end: Position {
            line: line as u32,
            character: 0,
        },
    }
}

fn to_diagnostic(warning: &Warning) -> Diagnostic {
    let severity = match warning.kind {
        WarningKind::Unreadable | WarningKind::Cycle => DiagnosticSeverity::ERROR,
        _ => DiagnosticSeverity::WARNING,
    };
    Diagnostic {
        range: line_range(warning.line.unwrap_or(0)),
        severity: Some(severity),
        source: Some("texseven".into()),
        message: warning.message.clone(),
        ..Default::default()
    }
}

async fn clear_published(client: &Client, published: &Published) {
    let mut published = published.lock().await;
    for path in published.drain() {
        if let Ok(uri) = Url::from_file_path(&path) {
            client.publish_diagnostics(uri, vec![], None).await;
        }
    }
}

/// Publishes the report's warnings and clears files that no longer have any.
async fn publish_report(client: &Client, published: &Published, report: &ReindexReport) {
    let mut by_file: HashMap<PathBuf, Vec<Diagnostic>> = HashMap::new();
    for warning in &report.warnings {
        if warning.path.as_os_str().is_empty() {
            continue;
        }
        by_file
            .entry(warning.path.clone())
            .or_default()
            .push(to_diagnostic(warning));
    }

    let mut published = published.lock().await;
    let cleared: Vec<PathBuf> = published
        .iter()
        .filter(|path| !by_file.contains_key(*path))
        .cloned()
        .collect();

    for path in cleared {
        if let Ok(uri) = Url::from_file_path(&path) {
            client.publish_diagnostics(uri, vec![], None).await;
        }
        published.remove(&path);
    }
    for (path, diagnostics) in by_file {
        if let Ok(uri) = Url::from_file_path(&path) {
            client.publish_diagnostics(uri, diagnostics, None).await;
            published.insert(path);
        }
    }
}

fn to_completion_item(candidate: CompletionCandidate) -> CompletionItem {
    let kind = match candidate.kind {
        CandidateKind::Label => CompletionItemKind::REFERENCE,
        CandidateKind::CitationKey => CompletionItemKind::VALUE,
        CandidateKind::IncludePath | CandidateKind::Graphic => CompletionItemKind::FILE,
        CandidateKind::Font => CompletionItemKind::TEXT,
    };
    CompletionItem {
        label: candidate.word,
        kind: Some(kind),
        detail: candidate.info,
        ..Default::default()
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, _params: InitializeParams) -> Result<InitializeResult> {
        tracing::info!("initializing texseven");
        Ok(InitializeResult {
            capabilities: Self::server_capabilities(),
            server_info: Some(ServerInfo {
                name: "texseven".into(),
                version: Some(env!("CARGO_PKG_VERSION").into()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "texseven ready")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        tracing::info!("shutting down texseven");
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let Some(path) = to_path(&params.text_document.uri) else {
            return;
        };
        let text = params.text_document.text;
        let version = params.text_document.version;

        match self.session_for(&path).await {
            Some(session) => session.open_document(&path, &text, version),
            None => self.start_project(path, text, version).await,
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let Some(path) = to_path(&params.text_document.uri) else {
            return;
        };
        let Some(change) = params.content_changes.into_iter().last() else {
            return;
        };

        if let Some(session) = self.session_for(&path).await {
            session.open_document(&path, &change.text, params.text_document.version);
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let Some(path) = to_path(&params.text_document.uri) else {
            return;
        };
        let Some((scheduler, published)) = self.project_for(&path).await else {
            return;
        };
        if scheduler.should_reindex_on_save(&path) {
            tracing::debug!("{} saved, scheduling rebuild", path.display());
            self.schedule(&scheduler, published).await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let Some(path) = to_path(&params.text_document.uri) else {
            return;
        };
        let Some(session) = self.session_for(&path).await else {
            return;
        };
        session.close_document(&path);

        let idle = take_idle_projects(&mut *self.projects.write().await);
        for project in idle {
            tracing::debug!(
                "no open documents left in {}, dropping its session",
                project.scheduler.session().master().display()
            );
            project.scheduler.cancel().await;
            clear_published(&self.client, &project.published).await;
        }
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let position = params.text_document_position.position;
        let Some(path) = to_path(&params.text_document_position.text_document.uri) else {
            return Ok(None);
        };
        let Some(session) = self.session_for(&path).await else {
            return Ok(None);
        };
        let Some(line) = session.line_text(&path, position.line as usize) else {
            return Ok(None);
        };
        let Some(cursor) = context_at(&line, char_column(&line, position.character)) else {
            return Ok(None);
        };

        let candidates = tokio::task::spawn_blocking(move || {
            session.complete(cursor.context, &cursor.prefix)
        })
        .await
        .map_err(|err| {
            tracing::error!("completion task failed: {err}");
            Error::internal_error()
        })?;

        Ok(Some(CompletionResponse::List(CompletionList {
            is_incomplete: false,
            items: candidates.into_iter().map(to_completion_item).collect(),
        })))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let position = params.text_document_position_params.position;
        let Some(path) = to_path(&params.text_document_position_params.text_document.uri) else {
            return Ok(None);
        };
        let Some(session) = self.session_for(&path).await else {
            return Ok(None);
        };
        let Some(line) = session.line_text(&path, position.line as usize) else {
            return Ok(None);
        };

        let locations = session
            .goto_definition(&path, position.line as usize, char_column(&line, position.character))
            .map(|locations| {
                locations
                    .into_iter()
                    .filter_map(|location| {
                        Some(Location {
                            uri: Url::from_file_path(&location.path).ok()?,
                            range: line_range(location.line),
                        })
                    })
                    .collect::<Vec<_>>()
            });

        Ok(locations.map(GotoDefinitionResponse::Array))
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<Value>> {
        match params.command.as_str() {
            commands::REINDEX => self.reindex_command(&params.arguments).await,
            commands::ENVIRONMENT => self.environment_command(&params.arguments).await,
            other => Err(Error::invalid_params(format!("unknown command {other}"))),
        }
    }
}

/// Serves the language server over stdio until the client disconnects.
pub async fn run() {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(Backend::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}
