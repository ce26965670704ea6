use crate::fonts;

use super::{CandidateKind, Completable, Completer, CompletionCandidate, Context};

/// `\setmainfont{`, `\setmathfont{` and the other font selection commands.
pub struct FontCompleter<'a> {
    families: &'a [String],
}

impl<'a> Completer<'a> for FontCompleter<'a> {
    fn construct(_context: Context<'a>) -> Self {
        FontCompleter {
            families: fonts::installed_families(),
        }
    }

    fn completions(&self) -> Vec<impl Completable<'a, Self>> {
        self.families.iter().collect()
    }
}

impl<'a> Completable<'a, FontCompleter<'a>> for &'a String {
    fn completions(&self, _completer: &FontCompleter<'a>) -> Option<CompletionCandidate> {
        Some(CompletionCandidate {
            word: self.to_string(),
            info: None,
            kind: CandidateKind::Font,
            ambiguous: false,
        })
    }
}
