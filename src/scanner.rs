//! Tolerant, line-oriented scanning of LaTeX source.
//!
//! The scanner knows a fixed set of command names and nothing about TeX
//! grammar. A directive is `\name`, an optional `*`, any number of `[...]`
//! option groups and a `{...}` argument closed on the same line. Anything
//! else is skipped for that line only, so half-typed markup never stops a
//! scan.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static COMMAND_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\([A-Za-z]+\*?)").unwrap());
static MODELINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*%\s*mainfile:\s*(\S+)").unwrap());

pub const INCLUDE_COMMANDS: &[&str] = &["include", "input", "subfile"];
pub const REF_COMMANDS: &[&str] = &[
    "ref", "eqref", "pageref", "autoref", "cref", "Cref", "nameref", "vref",
];
const BIBLIOGRAPHY_COMMANDS: &[&str] = &["bibliography", "addbibresource"];
/// Environments whose bodies are not markup.
const VERBATIM_ENVIRONMENTS: &[&str] = &["verbatim", "verbatim*", "lstlisting", "minted", "comment"];

/// A key or path argument together with the 0-based line it was found on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyAt {
    pub key: String,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IncludeKind {
    Include,
    Input,
    Subfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncludeDirective {
    pub kind: IncludeKind,
    /// Path exactly as written, relative to the master or the including file
    pub target: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentMarker {
    pub name: String,
    pub line: usize,
    /// Byte offset of the backslash within the line
    pub column: usize,
    pub is_open: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanWarning {
    pub line: usize,
    pub message: String,
}

/// Everything a single pass over one document extracts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub includes: Vec<IncludeDirective>,
    pub labels: Vec<KeyAt>,
    /// `\cite`-family keys. Informational, not indexed.
    pub citations: Vec<KeyAt>,
    /// `\ref`-family keys. Informational, not indexed.
    pub references: Vec<KeyAt>,
    /// `\bibitem` keys from a `thebibliography` environment
    pub bibitems: Vec<KeyAt>,
    /// Names given to `\bibliography` / `\addbibresource`
    pub bibliographies: Vec<KeyAt>,
    pub environments: Vec<EnvironmentMarker>,
    /// The document carries a `\documentclass`
    pub declares_root: bool,
    /// `% mainfile: <path>` modelines
    pub modelines: Vec<KeyAt>,
    pub line_count: usize,
    pub warnings: Vec<ScanWarning>,
}

/// One `\command[..]{arg}` occurrence on a line. Offsets are byte offsets
/// into the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineDirective<'a> {
    /// Command name without the backslash, a trailing `*` included
    pub command: &'a str,
    pub start: usize,
    /// Offset just past the opening `{`, when there is one
    pub arg_start: Option<usize>,
    /// Offset of the closing `}`. `None` when the argument runs off the line.
    pub arg_end: Option<usize>,
    line: &'a str,
}

impl<'a> LineDirective<'a> {
    /// The command name with any trailing `*` removed.
    pub fn name(&self) -> &'a str {
        self.command.trim_end_matches('*')
    }

    /// The closed argument, if the directive is well formed.
    pub fn argument(&self) -> Option<&'a str> {
        Some(&self.line[self.arg_start?..self.arg_end?])
    }

    pub fn is_terminated(&self) -> bool {
        self.arg_end.is_some()
    }
}

/// Cuts a line at its first unescaped `%`.
pub fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    for (idx, byte) in bytes.iter().enumerate() {
        if *byte != b'%' {
            continue;
        }
        let backslashes = bytes[..idx]
            .iter()
            .rev()
            .take_while(|b| **b == b'\\')
            .count();
        if backslashes % 2 == 0 {
            return &line[..idx];
        }
    }
    line
}

/// Finds every command on one (comment stripped) line, terminated or not.
pub fn line_directives(line: &str) -> Vec<LineDirective<'_>> {
    let bytes = line.as_bytes();
    let mut directives = vec![];

    for captures in COMMAND_RE.captures_iter(line) {
        let (Some(whole), Some(command)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let mut idx = whole.end();

        let mut options_closed = true;
        loop {
            while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
                idx += 1;
            }
            if idx < bytes.len() && bytes[idx] == b'[' {
                match line[idx..].find(']') {
                    Some(close) => idx += close + 1,
                    None => {
                        options_closed = false;
                        break;
                    }
                }
            } else {
                break;
            }
        }

        let (arg_start, arg_end) = if options_closed && idx < bytes.len() && bytes[idx] == b'{' {
            (Some(idx + 1), matching_brace(bytes, idx))
        } else {
            (None, None)
        };

        directives.push(LineDirective {
            command: command.as_str(),
            start: whole.start(),
            arg_start,
            arg_end,
            line,
        });
    }

    directives
}

/// Offset of the `}` closing the `{` at `open`, on the same line.
fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut idx = open;
    while idx < bytes.len() {
        match bytes[idx] {
            b'\\' => idx += 1,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
        idx += 1;
    }
    None
}

fn split_keys(argument: &str, line: usize) -> impl Iterator<Item = KeyAt> + '_ {
    argument
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(move |key| KeyAt {
            key: key.to_string(),
            line,
        })
}

pub fn scan(text: &str) -> ScanResult {
    let mut result = ScanResult::default();
    let mut open_environments: Vec<(String, usize)> = vec![];
    let mut verbatim: Option<String> = None;

    for (line_nr, raw_line) in text.lines().enumerate() {
        result.line_count = line_nr + 1;

        if let Some(captures) = MODELINE_RE.captures(raw_line) {
            if let Some(path) = captures.get(1) {
                result.modelines.push(KeyAt {
                    key: path.as_str().to_string(),
                    line: line_nr,
                });
            }
        }

        if let Some(name) = &verbatim {
            let closing = format!("\\end{{{name}}}");
            if let Some(column) = raw_line.find(&closing) {
                result.environments.push(EnvironmentMarker {
                    name: name.clone(),
                    line: line_nr,
                    column,
                    is_open: false,
                });
                if open_environments.last().is_some_and(|(open, _)| open == name) {
                    open_environments.pop();
                }
                verbatim = None;
            }
            continue;
        }

        let line = strip_comment(raw_line);
        for directive in line_directives(line) {
            let Some(argument) = directive.argument() else {
                if directive.arg_start.is_some() {
                    result.warnings.push(ScanWarning {
                        line: line_nr,
                        message: format!("unterminated argument to \\{}", directive.command),
                    });
                }
                continue;
            };

            match directive.name() {
                name if INCLUDE_COMMANDS.contains(&name) => {
                    let target = argument.trim();
                    if target.is_empty() {
                        continue;
                    }
                    let kind = match name {
                        "include" => IncludeKind::Include,
                        "input" => IncludeKind::Input,
                        _ => IncludeKind::Subfile,
                    };
                    result.includes.push(IncludeDirective {
                        kind,
                        target: target.to_string(),
                        line: line_nr,
                    });
                }
                "label" => result.labels.extend(split_keys(argument, line_nr).take(1)),
                "bibitem" => result.bibitems.extend(split_keys(argument, line_nr).take(1)),
                "documentclass" => result.declares_root = true,
                name if BIBLIOGRAPHY_COMMANDS.contains(&name) => {
                    result.bibliographies.extend(split_keys(argument, line_nr))
                }
                name if REF_COMMANDS.contains(&name) => {
                    result.references.extend(split_keys(argument, line_nr))
                }
                name if name.to_lowercase().contains("cite") => {
                    result.citations.extend(split_keys(argument, line_nr))
                }
                "begin" => {
                    let name = argument.trim().to_string();
                    result.environments.push(EnvironmentMarker {
                        name: name.clone(),
                        line: line_nr,
                        column: directive.start,
                        is_open: true,
                    });
                    if VERBATIM_ENVIRONMENTS.contains(&name.as_str()) {
                        let closing = format!("\\end{{{name}}}");
                        let rest_start = directive.arg_end.unwrap_or(line.len());
                        if let Some(offset) = raw_line[rest_start..].find(&closing) {
                            result.environments.push(EnvironmentMarker {
                                name,
                                line: line_nr,
                                column: rest_start + offset,
                                is_open: false,
                            });
                        } else {
                            open_environments.push((name.clone(), line_nr));
                            verbatim = Some(name);
                        }
                        break;
                    }
                    open_environments.push((name, line_nr));
                }
                "end" => {
                    let name = argument.trim().to_string();
                    match open_environments.pop() {
                        Some((open, _)) if open == name => {}
                        Some((open, open_line)) => result.warnings.push(ScanWarning {
                            line: line_nr,
                            message: format!(
                                "\\end{{{name}}} does not match \\begin{{{open}}} on line {}",
                                open_line + 1
                            ),
                        }),
                        None => result.warnings.push(ScanWarning {
                            line: line_nr,
                            message: format!("\\end{{{name}}} without a matching \\begin"),
                        }),
                    }
                    result.environments.push(EnvironmentMarker {
                        name,
                        line: line_nr,
                        column: directive.start,
                        is_open: false,
                    });
                }
                _ => {}
            }
        }
    }

    result
}
