//! texseven: cross-file intelligence for multi-file LaTeX projects
//!
//! This crate finds the master document of a project, follows its
//! `\include`/`\input`/`\subfile` graph and indexes labels and bibliography
//! keys across every reachable file. On top of that index it answers
//! completion and go-to-definition queries and locates the environment
//! around a line.
//!
//! # Architecture
//!
//! - [`scanner`]: tolerant, line-oriented extraction of LaTeX directives
//! - [`bib`]: BibTeX parsing into keyed entries
//! - [`project`]: include graph, label index and the immutable snapshot
//! - [`environment`]: innermost `\begin`/`\end` pair around a line
//! - [`completion`], [`gotodef`]: queries answered from a snapshot
//! - [`fonts`]: installed font families for font selection commands
//! - [`session`]: one project, its open buffers and snapshot swapping
//! - [`scheduler`]: debounced rebuilds and file watching
//! - [`server`], [`cli`]: the language server and command line front ends
//!
//! # Usage
//!
//! ```ignore
//! use texseven::config::Settings;
//! use texseven::session::Session;
//!
//! let session = Session::initialize(&chapter_path, Settings::default())?;
//! let report = session.reindex();
//! let target = session.resolve_label("sec:intro");
//! ```

pub mod bib;
pub mod cli;
pub mod collaborators;
pub mod completion;
pub mod config;
pub mod environment;
pub mod error;
pub mod fonts;
pub mod gotodef;
pub mod project;
pub mod scanner;
pub mod scheduler;
pub mod server;
pub mod session;

#[cfg(test)]
pub mod test_utils;
