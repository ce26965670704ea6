use std::collections::HashMap;

use itertools::Itertools;

use crate::bib::BibEntry;

use super::{CandidateKind, Completable, Completer, CompletionCandidate, Context};

/// `\cite{` and friends: keys of every bibliography in the project.
pub struct CitationCompleter<'a> {
    context: Context<'a>,
}

/// One key with every entry defining it, in bibliography order.
pub struct CitationCompletion<'a> {
    key: &'a str,
    entries: Vec<&'a BibEntry>,
}

impl CitationCompletion<'_> {
    fn is_ambiguous(&self) -> bool {
        self.entries.iter().map(|entry| &entry.path).unique().count() > 1
    }
}

impl<'a> Completer<'a> for CitationCompleter<'a> {
    fn construct(context: Context<'a>) -> Self {
        CitationCompleter { context }
    }

    fn completions(&self) -> Vec<impl Completable<'a, Self>> {
        let mut grouped: Vec<CitationCompletion<'a>> = vec![];
        let mut position: HashMap<&'a str, usize> = HashMap::new();

        for entry in self.context.snapshot.bibs.entries() {
            match position.get(entry.key.as_str()) {
                Some(idx) => grouped[*idx].entries.push(entry),
                None => {
                    position.insert(&entry.key, grouped.len());
                    grouped.push(CitationCompletion {
                        key: &entry.key,
                        entries: vec![entry],
                    });
                }
            }
        }

        grouped
    }
}

impl<'a> Completable<'a, CitationCompleter<'a>> for CitationCompletion<'a> {
    fn completions(&self, completer: &CitationCompleter<'a>) -> Option<CompletionCandidate> {
        let first = self.entries.first()?;
        let ambiguous = self.is_ambiguous();

        let mut info = first
            .title
            .as_deref()
            .or(first.author.as_deref())
            .map(|text| truncate(text, completer.context.settings.bib_info_length))
            .unwrap_or_else(|| first.entry_type.clone());
        if ambiguous {
            info = format!("{info} (defined in {} files)", self.entries.len());
        }

        Some(CompletionCandidate {
            word: self.key.to_string(),
            info: Some(info),
            kind: CandidateKind::CitationKey,
            ambiguous,
        })
    }
}

fn truncate(text: &str, length: usize) -> String {
    if length == 0 || text.chars().count() <= length {
        return text.to_string();
    }
    let cut: String = text.chars().take(length).collect();
    format!("{}...", cut.trim_end())
}
