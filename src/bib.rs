//! Bibliography databases.
//!
//! Only enough of the BibTeX format is understood to pull out entry keys,
//! their lines and a couple of display fields. Broken entries are dropped
//! and parsing picks up again at the next entry.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{ProjectError, Result, Warning, WarningKind};
use crate::project::document::read_source;

static ENTRY_START_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*@").unwrap());

/// Entry types that never carry a citation key.
const NON_ENTRY_TYPES: &[&str] = &["string", "preamble", "comment"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BibEntry {
    pub key: String,
    /// Lowercased entry type (`article`, `book`, ... or `bibitem` for `\bibitem`)
    pub entry_type: String,
    pub path: PathBuf,
    /// 0-based line of the `@type{` opening
    pub line: usize,
    pub title: Option<String>,
    pub author: Option<String>,
}

/// One bibliography source with its entries in file order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BibFile {
    pub path: PathBuf,
    pub entries: Vec<BibEntry>,
}

/// Every bibliography source used by a project, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BibIndex {
    pub files: Vec<BibFile>,
}

impl BibIndex {
    pub fn push(&mut self, file: BibFile) {
        self.files.push(file);
    }

    /// All entries, file by file.
    pub fn entries(&self) -> impl Iterator<Item = &BibEntry> {
        self.files.iter().flat_map(|file| file.entries.iter())
    }

    /// Every entry carrying `key`, one per file at most.
    pub fn lookup(&self, key: &str) -> Vec<&BibEntry> {
        self.entries().filter(|entry| entry.key == key).collect()
    }

    /// Restricts the index to the given files, keeping index order.
    pub fn restricted_to(&self, paths: &[PathBuf]) -> BibIndex {
        BibIndex {
            files: self
                .files
                .iter()
                .filter(|file| paths.contains(&file.path))
                .cloned()
                .collect(),
        }
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|file| file.path.clone()).collect()
    }
}

/// Reads and parses one `.bib` file.
pub fn parse(path: &Path) -> Result<(Vec<BibEntry>, Vec<Warning>)> {
    let text = read_source(path)?;
    Ok(parse_str(&text, path))
}

/// Parses bibliography text. `path` is only recorded in the entries.
pub fn parse_str(text: &str, path: &Path) -> (Vec<BibEntry>, Vec<Warning>) {
    let bytes = text.as_bytes();
    let line_starts = line_starts(text);
    let line_of = |offset: usize| line_starts.partition_point(|start| *start <= offset) - 1;

    let mut entries: Vec<BibEntry> = vec![];
    let mut warnings = vec![];
    let mut seen = HashSet::new();
    let mut pos = 0;

    while let Some(found) = text[pos..].find('@') {
        let at = pos + found;
        let mut idx = at + 1;

        let type_start = idx;
        while idx < bytes.len() && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_') {
            idx += 1;
        }
        let entry_type = text[type_start..idx].to_lowercase();
        while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
            idx += 1;
        }

        let closer = match bytes.get(idx) {
            Some(b'{') => b'}',
            Some(b'(') => b')',
            _ => {
                // Stray `@` in free text between entries.
                pos = at + 1;
                continue;
            }
        };
        if entry_type.is_empty() {
            pos = at + 1;
            continue;
        }

        let open = idx;
        let Some(close) = entry_end(bytes, open, closer) else {
            warnings.push(Warning::from(&ProjectError::MalformedInput {
                path: path.to_path_buf(),
                line: line_of(at),
                message: format!("unbalanced braces in @{entry_type} entry"),
            }));
            pos = match ENTRY_START_RE.find_at(text, at + 1) {
                Some(next) => next.start(),
                None => break,
            };
            continue;
        };
        pos = close + 1;

        if NON_ENTRY_TYPES.contains(&entry_type.as_str()) {
            continue;
        }

        let body = &text[open + 1..close];
        let (key, fields) = match body.find(',') {
            Some(comma) => (body[..comma].trim(), &body[comma + 1..]),
            None => (body.trim(), ""),
        };
        if key.is_empty() {
            warnings.push(Warning::from(&ProjectError::MalformedInput {
                path: path.to_path_buf(),
                line: line_of(at),
                message: format!("@{entry_type} entry without a key"),
            }));
            continue;
        }
        if !seen.insert(key.to_string()) {
            warnings.push(Warning::new(
                WarningKind::DuplicateBibKey,
                path,
                Some(line_of(at)),
                format!("duplicate bibliography key `{key}`"),
            ));
            continue;
        }

        let mut title = None;
        let mut author = None;
        for (name, value) in fields_of(fields) {
            match name.as_str() {
                "title" => title = Some(value),
                "author" => author = Some(value),
                _ => {}
            }
        }

        entries.push(BibEntry {
            key: key.to_string(),
            entry_type,
            path: path.to_path_buf(),
            line: line_of(at),
            title,
            author,
        });
    }

    (entries, warnings)
}

fn line_starts(text: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(text.match_indices('\n').map(|(idx, _)| idx + 1))
        .collect()
}

/// Offset of the delimiter closing the entry opened at `open`.
fn entry_end(bytes: &[u8], open: usize, closer: u8) -> Option<usize> {
    let mut depth = 0usize;
    let mut idx = open + 1;
    while idx < bytes.len() {
        match bytes[idx] {
            b'\\' => idx += 1,
            b'{' => depth += 1,
            b'}' if depth > 0 => depth -= 1,
            b if b == closer && depth == 0 => return Some(idx),
            _ => {}
        }
        idx += 1;
    }
    None
}

/// Splits `name = value, ...` at top-level commas.
fn fields_of(body: &str) -> Vec<(String, String)> {
    let mut parts = vec![];
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut start = 0;
    for (idx, ch) in body.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '"' if depth == 0 => in_quotes = !in_quotes,
            ',' if depth == 0 && !in_quotes => {
                parts.push(&body[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);

    parts
        .into_iter()
        .filter_map(|part| {
            let (name, value) = part.split_once('=')?;
            Some((name.trim().to_lowercase(), clean_value(value)))
        })
        .collect()
}

fn clean_value(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !matches!(ch, '{' | '}' | '"'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_test(text: &str) -> (Vec<BibEntry>, Vec<Warning>) {
        parse_str(text, Path::new("/project/refs.bib"))
    }

    #[test]
    fn test_parse_entries_with_fields() {
        let text = r#"@article{knuth84,
  author = {Donald E. Knuth},
  title = {Literate {P}rogramming},
  year = 1984
}

@book{ lamport94 ,
  title = "LaTeX: A Document Preparation System",
}
"#;

        let (entries, warnings) = parse_test(text);

        assert!(warnings.is_empty());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "knuth84");
        assert_eq!(entries[0].entry_type, "article");
        assert_eq!(entries[0].line, 0);
        assert_eq!(entries[0].title.as_deref(), Some("Literate Programming"));
        assert_eq!(entries[0].author.as_deref(), Some("Donald E. Knuth"));
        assert_eq!(entries[1].key, "lamport94");
        assert_eq!(entries[1].line, 6);
        assert_eq!(
            entries[1].title.as_deref(),
            Some("LaTeX: A Document Preparation System")
        );
    }

    #[test]
    fn test_nested_braces_do_not_end_entry() {
        let text = "@misc{a, note = {x {y} @z}}\n@misc{b}\n";

        let (entries, _) = parse_test(text);

        let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_malformed_entry_is_dropped_and_parsing_resumes() {
        let text = "@article{broken,\n  title = {never closed,\n@book{good,\n  title = {Fine}\n}\n";

        let (entries, warnings) = parse_test(text);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "good");
        assert_eq!(entries[0].line, 2);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::MalformedInput);
        assert_eq!(warnings[0].line, Some(0));
    }

    #[test]
    fn test_string_and_comment_entries_are_skipped() {
        let text = "@string{ieee = \"IEEE\"}\n@comment{ignore me}\n@inproceedings{real, booktitle = ieee}\n";

        let (entries, _) = parse_test(text);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "real");
        assert_eq!(entries[0].entry_type, "inproceedings");
    }

    #[test]
    fn test_duplicate_key_in_one_file_keeps_first() {
        let text = "@misc{dup, title = {One}}\n@misc{dup, title = {Two}}\n";

        let (entries, warnings) = parse_test(text);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title.as_deref(), Some("One"));
        assert_eq!(warnings[0].kind, WarningKind::DuplicateBibKey);
        assert_eq!(warnings[0].line, Some(1));
    }

    #[test]
    fn test_stray_at_sign_is_ignored() {
        let text = "Contact: someone@example.org\n@misc{k}\n";

        let (entries, warnings) = parse_test(text);

        assert_eq!(entries.len(), 1);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_index_lookup_across_files() {
        let mut index = BibIndex::default();
        let (a, _) = parse_str("@misc{foo}\n", Path::new("/p/a.bib"));
        let (b, _) = parse_str("@misc{foo}\n@misc{bar}\n", Path::new("/p/b.bib"));
        index.push(BibFile {
            path: PathBuf::from("/p/a.bib"),
            entries: a,
        });
        index.push(BibFile {
            path: PathBuf::from("/p/b.bib"),
            entries: b,
        });

        assert_eq!(index.lookup("foo").len(), 2);
        assert_eq!(index.lookup("bar").len(), 1);
        let only_b = index.restricted_to(&[PathBuf::from("/p/b.bib")]);
        assert_eq!(only_b.lookup("foo").len(), 1);
    }
}
