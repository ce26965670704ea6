//! Command line interface.
//!
//! Lines are 1-based on the command line and in everything printed.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};

use crate::completion::CompletionContext;
use crate::config::Settings;
use crate::environment::SpanMode;
use crate::error::ProjectError;
use crate::gotodef::Resolution;
use crate::project::{Location, ReindexReport};
use crate::scheduler;
use crate::session::Session;

#[derive(Parser, Debug)]
#[command(name = "texseven", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the language server on stdio (default)
    Lsp,
    /// Index the project of a file and print what was used
    Reindex {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Complete a prefix in the project of a file
    Complete {
        file: PathBuf,
        #[arg(value_enum)]
        context: ContextArg,
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Where a label (or with --citation a bibliography key) is defined
    Definition {
        file: PathBuf,
        key: String,
        #[arg(long)]
        citation: bool,
    },
    /// The innermost environment around a line
    Env {
        file: PathBuf,
        line: usize,
        /// Print the lines between the delimiters instead
        #[arg(long)]
        inner: bool,
    },
    /// Rebuild whenever project files change
    Watch { file: PathBuf },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextArg {
    Label,
    Citation,
    Include,
    Graphics,
    Font,
}

impl From<ContextArg> for CompletionContext {
    fn from(arg: ContextArg) -> Self {
        match arg {
            ContextArg::Label => CompletionContext::LabelReference,
            ContextArg::Citation => CompletionContext::Citation,
            ContextArg::Include => CompletionContext::IncludePath,
            ContextArg::Graphics => CompletionContext::Graphics,
            ContextArg::Font => CompletionContext::Font,
        }
    }
}

fn start_session(file: &Path) -> anyhow::Result<Session> {
    let dir = file.parent().filter(|dir| !dir.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let settings = Settings::new(dir)?;
    Ok(Session::initialize(file, settings)?)
}

fn format_location(location: &Location) -> String {
    format!("{}:{}", location.path.display(), location.line + 1)
}

pub fn format_report(report: &ReindexReport) -> String {
    let mut out = format!("master: {}\n", report.master.display());
    out.push_str(&format!("include files: {}\n", report.include_files_used.len()));
    for path in &report.include_files_used {
        out.push_str(&format!("  {}\n", path.display()));
    }
    out.push_str(&format!("bibliographies: {}\n", report.bib_files_used.len()));
    for path in &report.bib_files_used {
        out.push_str(&format!("  {}\n", path.display()));
    }
    out.push_str(&format!("warnings: {}\n", report.warnings.len()));
    for warning in &report.warnings {
        out.push_str(&format!("  {warning}\n"));
    }
    out
}

/// Runs one of the one-shot commands and returns what to print.
pub fn run(command: Command) -> anyhow::Result<String> {
    match command {
        Command::Lsp => bail!("the language server is started from main"),
        Command::Reindex { file, json } => {
            let report = start_session(&file)?.reindex();
            match json {
                true => Ok(serde_json::to_string_pretty(&report)? + "\n"),
                false => Ok(format_report(&report)),
            }
        }
        Command::Complete {
            file,
            context,
            prefix,
        } => {
            let session = start_session(&file)?;
            let mut out = String::new();
            for candidate in session.complete(context.into(), &prefix) {
                out.push_str(&candidate.word);
                if let Some(info) = &candidate.info {
                    out.push('\t');
                    out.push_str(info);
                }
                out.push('\n');
            }
            Ok(out)
        }
        Command::Definition {
            file,
            key,
            citation,
        } => {
            let session = start_session(&file)?;
            let resolution = match citation {
                true => session.resolve_citation(&key),
                false => session
                    .resolve_label(&key)
                    .map_or(Resolution::NotFound, Resolution::Found),
            };
            match resolution.into_result(&key) {
                Ok(location) => Ok(format_location(&location) + "\n"),
                Err(ProjectError::Ambiguous { locations, .. }) => Ok(locations
                    .iter()
                    .map(|location| format!("{} (ambiguous)\n", format_location(location)))
                    .collect()),
                Err(err) => Err(err.into()),
            }
        }
        Command::Env { file, line, inner } => {
            if line == 0 {
                bail!("lines start at 1");
            }
            let session = start_session(&file)?;
            let span = session
                .environment_at(session.start(), line - 1)
                .ok_or_else(|| anyhow!("no environment around line {line}"))?;
            let mode = if inner { SpanMode::Inner } else { SpanMode::Outer };
            let (start, end) = span
                .expand(mode)
                .ok_or_else(|| anyhow!("`{}` has no inner lines", span.name))?;
            Ok(format!("{} {}-{}\n", span.name, start + 1, end + 1))
        }
        Command::Watch { file } => {
            let session = start_session(&file)?;
            scheduler::watch(&session, |report| print!("{}", format_report(&report)))?;
            Ok(String::new())
        }
    }
}
