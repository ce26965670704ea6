use serde::Serialize;

use crate::{config::Settings, project::ProjectSnapshot};

use self::citation_completer::CitationCompleter;
use self::file_completer::{GraphicsCompleter, IncludeCompleter};
use self::font_completer::FontCompleter;
use self::label_completer::LabelCompleter;

mod citation_completer;
mod context;
mod file_completer;
mod font_completer;
mod label_completer;

pub use self::context::{context_at, CursorContext};

/// What kind of argument the cursor sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompletionContext {
    LabelReference,
    Citation,
    IncludePath,
    Graphics,
    Font,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CandidateKind {
    Label,
    CitationKey,
    IncludePath,
    Graphic,
    Font,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionCandidate {
    pub word: String,
    pub info: Option<String>,
    pub kind: CandidateKind,
    /// Set for a citation key defined in more than one bibliography
    pub ambiguous: bool,
}

#[derive(Clone, Copy)]
pub struct Context<'a> {
    snapshot: &'a ProjectSnapshot,
    settings: &'a Settings,
}

pub trait Completer<'a>: Sized {
    fn construct(context: Context<'a>) -> Self;

    /// Every candidate the completer knows about, in source order.
    fn completions(&self) -> Vec<impl Completable<'a, Self>>;
}

pub trait Completable<'a, T: Completer<'a>>: Sized {
    fn completions(&self, completer: &T) -> Option<CompletionCandidate>;
}

/// Candidates for `prefix` in `context`, answered from one snapshot.
///
/// Matching is a case-sensitive prefix test. The result is ordered by word;
/// equal words keep source order and collapse into the first one.
pub fn complete(
    snapshot: &ProjectSnapshot,
    settings: &Settings,
    context: CompletionContext,
    prefix: &str,
) -> Vec<CompletionCandidate> {
    let completion_context = Context { snapshot, settings };

    match context {
        CompletionContext::LabelReference => {
            run_completer::<LabelCompleter>(completion_context, prefix)
        }
        CompletionContext::Citation => {
            run_completer::<CitationCompleter>(completion_context, prefix)
        }
        CompletionContext::IncludePath => {
            run_completer::<IncludeCompleter>(completion_context, prefix)
        }
        CompletionContext::Graphics => {
            run_completer::<GraphicsCompleter>(completion_context, prefix)
        }
        CompletionContext::Font => run_completer::<FontCompleter>(completion_context, prefix),
    }
}

fn run_completer<'a, T: Completer<'a>>(
    context: Context<'a>,
    prefix: &str,
) -> Vec<CompletionCandidate> {
    let completer = T::construct(context);

    let mut candidates = completer
        .completions()
        .iter()
        .flat_map(|completable| completable.completions(&completer))
        .filter(|candidate| candidate.word.starts_with(prefix))
        .collect::<Vec<_>>();

    // stable: ties stay in source order
    candidates.sort_by(|a, b| a.word.cmp(&b.word));
    candidates.dedup_by(|later, first| later.word == first.word);

    if context.settings.completion_limit > 0 {
        candidates.truncate(context.settings.completion_limit);
    }

    candidates
}
