use crate::scanner::{line_directives, strip_comment, INCLUDE_COMMANDS, REF_COMMANDS};

use super::CompletionContext;

/// The completion context at a cursor together with the partial word typed
/// so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorContext {
    pub context: CompletionContext,
    pub prefix: String,
    /// Character offset where the partial word starts
    pub start: usize,
}

fn context_of(command: &str) -> Option<CompletionContext> {
    match command {
        "includegraphics" => Some(CompletionContext::Graphics),
        "includeonly" => Some(CompletionContext::IncludePath),
        name if INCLUDE_COMMANDS.contains(&name) => Some(CompletionContext::IncludePath),
        name if name.contains("cite") || name.contains("Cite") => Some(CompletionContext::Citation),
        name if REF_COMMANDS.contains(&name) => Some(CompletionContext::LabelReference),
        name if name.contains("font") || name.starts_with("setmath") => Some(CompletionContext::Font),
        _ => None,
    }
}

/// Inspects the text left of `character` for an open directive argument.
///
/// `\cite{a, kn|` gives a citation context with prefix `kn`. Inside a comment
/// or after the argument closed there is nothing to complete.
pub fn context_at(line: &str, character: usize) -> Option<CursorContext> {
    let end = line
        .char_indices()
        .nth(character)
        .map(|(idx, _)| idx)
        .unwrap_or(line.len());
    let before = &line[..end];
    if strip_comment(before).len() != before.len() {
        return None;
    }

    let directive = line_directives(before).into_iter().last()?;
    let arg_start = match (directive.arg_start, directive.arg_end) {
        (Some(start), None) => start,
        _ => return None,
    };
    let context = context_of(directive.name())?;

    let argument = &before[arg_start..];
    // a single path or font name may contain commas, a list of them may not
    let is_list = directive.name() == "includeonly"
        || !matches!(
            context,
            CompletionContext::IncludePath | CompletionContext::Graphics | CompletionContext::Font
        );
    let word_start = match is_list {
        true => arg_start + argument.rfind(',').map(|idx| idx + 1).unwrap_or(0),
        false => arg_start,
    };
    let word = &before[word_start..];
    let trimmed = word.trim_start();
    let word_start = word_start + (word.len() - trimmed.len());

    Some(CursorContext {
        context,
        prefix: trimmed.to_string(),
        start: before[..word_start].chars().count(),
    })
}
