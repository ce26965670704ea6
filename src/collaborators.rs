//! Interfaces to the programs around an editing session.
//!
//! Running the compiler and driving a viewer are left to the host. The
//! session only hands out the data they need.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::project::Location;

/// A message a compiler run reported against a source line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompilerDiagnostic {
    pub location: Location,
    pub message: String,
    pub is_error: bool,
}

pub trait Compiler {
    /// Compiles `master` with the named compiler (`latexmk`, `pdflatex`, ...).
    fn compile(&self, master: &Path, compiler: &str) -> anyhow::Result<Vec<CompilerDiagnostic>>;
}

/// Where a viewer should jump for a source position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForwardSearchRequest {
    pub source: PathBuf,
    /// 0-based source line
    pub line: usize,
    /// The compiled master, e.g. `main.pdf`
    pub output: PathBuf,
}

pub trait ForwardSearch {
    fn forward_search(&self, request: &ForwardSearchRequest) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_session;
    use std::cell::RefCell;
    use std::fs;

    #[derive(Default)]
    struct RecordingViewer {
        requests: RefCell<Vec<ForwardSearchRequest>>,
    }

    impl ForwardSearch for RecordingViewer {
        fn forward_search(&self, request: &ForwardSearchRequest) -> anyhow::Result<()> {
            self.requests.borrow_mut().push(request.clone());
            Ok(())
        }
    }

    struct FailingCompiler;

    impl Compiler for FailingCompiler {
        fn compile(&self, master: &Path, compiler: &str) -> anyhow::Result<Vec<CompilerDiagnostic>> {
            Ok(vec![CompilerDiagnostic {
                location: Location {
                    path: master.to_path_buf(),
                    line: 0,
                },
                message: format!("{compiler}: Undefined control sequence"),
                is_error: true,
            }])
        }
    }

    #[test]
    fn test_viewer_gets_request_for_included_file() {
        let (_temp_dir, dir, session) = create_test_session("chapters/one.tex", |dir| {
            fs::create_dir(dir.join("chapters")).unwrap();
            fs::write(dir.join("thesis.tex"), "\\documentclass{report}\n\\input{chapters/one}\n").unwrap();
            fs::write(dir.join("chapters/one.tex"), "Text\n").unwrap();
        });
        let viewer = RecordingViewer::default();

        let request = session.forward_search_request(session.start(), 7);
        viewer.forward_search(&request).unwrap();

        let requests = viewer.requests.borrow();
        assert_eq!(requests[0].source, dir.join("chapters/one.tex"));
        assert_eq!(requests[0].output, dir.join("thesis.pdf"));
    }

    #[test]
    fn test_compiler_runs_on_master() {
        let (_temp_dir, dir, session) = create_test_session("main.tex", |dir| {
            fs::write(dir.join("main.tex"), "\\documentclass{article}\n").unwrap();
        });

        let diagnostics = FailingCompiler.compile(session.master(), "latexmk").unwrap();

        assert_eq!(diagnostics[0].location.path, dir.join("main.tex"));
        assert!(diagnostics[0].message.starts_with("latexmk"));
    }
}
