use crate::project::labels::LabelEntry;

use super::{CandidateKind, Completable, Completer, CompletionCandidate, Context};

/// `\ref{` and friends: every label in the project.
pub struct LabelCompleter<'a> {
    context: Context<'a>,
}

impl<'a> Completer<'a> for LabelCompleter<'a> {
    fn construct(context: Context<'a>) -> Self {
        LabelCompleter { context }
    }

    fn completions(&self) -> Vec<impl Completable<'a, Self>> {
        self.context.snapshot.labels.entries().iter().collect()
    }
}

impl<'a> Completable<'a, LabelCompleter<'a>> for &'a LabelEntry {
    fn completions(&self, _completer: &LabelCompleter<'a>) -> Option<CompletionCandidate> {
        Some(CompletionCandidate {
            word: self.key.clone(),
            info: self
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            kind: CandidateKind::Label,
            ambiguous: false,
        })
    }
}
