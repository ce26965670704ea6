//! Shared test utilities for texseven.
//!
//! This module provides common helpers used across multiple test modules.
//! It is only compiled when running tests.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::Settings;
use crate::session::Session;

/// Creates a temporary project directory for testing.
///
/// Returns a tuple of (TempDir, PathBuf) where:
/// - TempDir: The temp directory handle (must be kept alive for the test duration)
/// - PathBuf: The canonical path of the project subdirectory
///
/// Master detection walks directories with WalkDir and skips hidden ones.
/// Temp directories may live under paths like `/tmp/.tmpXXXXX`, so tests get
/// a non-hidden "project" subdirectory. It is canonicalized so that paths
/// built by tests compare equal to the ones a session resolves.
pub fn create_test_project_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let project_dir = temp_dir.path().join("project");
    fs::create_dir(&project_dir).expect("Failed to create project subdirectory");
    let project_dir = fs::canonicalize(&project_dir).expect("Failed to canonicalize project dir");
    (temp_dir, project_dir)
}

/// Creates a project with `setup_fn` and starts a session from `start`
/// (relative to the project directory) with default settings.
///
/// ```ignore
/// let (_temp_dir, dir, session) = create_test_session("main.tex", |dir| {
///     std::fs::write(dir.join("main.tex"), "\\label{a}").unwrap();
/// });
/// ```
pub fn create_test_session<F>(start: &str, setup_fn: F) -> (TempDir, PathBuf, Session)
where
    F: FnOnce(&Path),
{
    let (temp_dir, project_dir) = create_test_project_dir();
    setup_fn(&project_dir);
    let session = Session::initialize(&project_dir.join(start), Settings::default())
        .expect("Failed to start test session");
    (temp_dir, project_dir, session)
}
