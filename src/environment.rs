//! Innermost `\begin{..}` / `\end{..}` pair around a line of one buffer.
//!
//! Works on the buffer alone and never consults the project index.

use ropey::Rope;
use serde::Serialize;

use crate::scanner::{self, EnvironmentMarker};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentSpan {
    pub name: String,
    /// Line of the `\begin`
    pub start_line: usize,
    /// Line of the matching `\end`
    pub end_line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanMode {
    /// Lines strictly between the delimiters
    Inner,
    /// The delimiter lines included
    Outer,
}

impl EnvironmentSpan {
    /// Inclusive line range of the span. `Inner` is `None` when nothing sits
    /// between the delimiters.
    pub fn expand(&self, mode: SpanMode) -> Option<(usize, usize)> {
        match mode {
            SpanMode::Outer => Some((self.start_line, self.end_line)),
            SpanMode::Inner if self.end_line > self.start_line + 1 => {
                Some((self.start_line + 1, self.end_line - 1))
            }
            SpanMode::Inner => None,
        }
    }
}

/// Environment markers of the buffer, as the scanner reports them. Bodies of
/// verbatim-like environments contribute no markers.
fn markers(text: &Rope) -> Vec<EnvironmentMarker> {
    scanner::scan(&text.to_string()).environments
}

fn position(marker: &EnvironmentMarker) -> (usize, usize) {
    (marker.line, marker.column)
}

/// Finds the innermost environment enclosing `line`.
///
/// `\begin` markers on the cursor line count as enclosing it, as do `\end`
/// markers on that line. Unbalanced or mismatched markers give `None`.
pub fn locate(text: &Rope, line: usize) -> Option<EnvironmentSpan> {
    if line >= text.len_lines() {
        return None;
    }
    let markers = markers(text);

    let mut pending_ends: Vec<&str> = vec![];
    let open = markers
        .iter()
        .rev()
        .filter(|marker| marker.line < line || (marker.line == line && marker.is_open))
        .find_map(|marker| {
            if !marker.is_open {
                pending_ends.push(&marker.name);
                return None;
            }
            match pending_ends.pop() {
                None => Some(Ok(marker)),
                Some(name) if name == marker.name => None,
                Some(_) => Some(Err(())),
            }
        })?
        .ok()?;

    let mut pending_begins: Vec<&str> = vec![];
    let end = markers
        .iter()
        .filter(|marker| match open.line == line {
            true => position(marker) > position(open),
            false => marker.line >= line,
        })
        .find_map(|marker| {
            if marker.is_open {
                pending_begins.push(&marker.name);
                return None;
            }
            match pending_begins.pop() {
                None if marker.name == open.name => Some(Ok(marker)),
                None => Some(Err(())),
                Some(name) if name == marker.name => None,
                Some(_) => Some(Err(())),
            }
        })?
        .ok()?;

    Some(EnvironmentSpan {
        name: open.name.clone(),
        start_line: open.line,
        end_line: end.line,
    })
}
