use std::path::Path;

use anyhow::anyhow;
use config::{Config, File};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// Explicit master file, relative to the file the session starts from
    pub master: Option<String>,
    pub reindex: ReindexPolicy,
    /// Quiet period before a burst of triggers becomes one rebuild
    pub debounce_ms: u64,
    /// How many lines at the top and bottom of a file may hold a `% mainfile:` modeline
    pub modeline_lines: usize,
    /// Directories above the start file searched for a containing master
    pub master_search_depth: usize,
    /// Bib titles longer than this are truncated in completion info
    pub bib_info_length: usize,
    /// Extra directories searched for `.bib` files
    pub bib_search_paths: Vec<String>,
    pub graphics_extensions: Vec<String>,
    /// Extension of the compiled artifact handed to the viewer
    pub output_format: String,
    /// 0 means no limit
    pub completion_limit: usize,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub enum ReindexPolicy {
    /// Only when the host asks for it
    OnDemand,
    /// On every saved file that belongs to the project
    OnSave,
    /// Never automatically, not even on the first query
    Never,
}

impl Settings {
    pub fn new(root_dir: &Path) -> anyhow::Result<Settings> {
        let expanded = shellexpand::tilde("~/.config/texseven/settings");
        let settings = Config::builder()
            .add_source(File::with_name(&expanded).required(false))
            .add_source(
                File::with_name(&format!(
                    "{}/.texseven",
                    root_dir
                        .to_str()
                        .ok_or(anyhow!("Can't convert root_dir to str"))?
                ))
                .required(false),
            )
            .set_default("reindex", "OnSave")?
            .set_default("debounce_ms", 300)?
            .set_default("modeline_lines", 3)?
            .set_default("master_search_depth", 1)?
            .set_default("bib_info_length", 40)?
            .set_default("bib_search_paths", Vec::<String>::new())?
            .set_default(
                "graphics_extensions",
                vec!["pdf", "png", "jpg", "jpeg", "eps"],
            )?
            .set_default("output_format", "pdf")?
            .set_default("completion_limit", 0)?
            .build()
            .map_err(|err| anyhow!("Build err: {err}"))?;

        let settings = settings.try_deserialize::<Settings>()?;

        anyhow::Ok(settings)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            master: None,
            reindex: ReindexPolicy::OnSave,
            debounce_ms: 300,
            modeline_lines: 3,
            master_search_depth: 1,
            bib_info_length: 40,
            bib_search_paths: vec![],
            graphics_extensions: ["pdf", "png", "jpg", "jpeg", "eps"]
                .into_iter()
                .map(String::from)
                .collect(),
            output_format: "pdf".to_string(),
            completion_limit: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_project_file() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::new(temp_dir.path()).unwrap();

        assert_eq!(settings.modeline_lines, 3);
        assert_eq!(settings.output_format, "pdf");
        assert!(settings.master.is_none());
    }

    #[test]
    fn test_project_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(".texseven.toml"),
            "master = \"thesis.tex\"\nreindex = \"Never\"\ndebounce_ms = 50\n",
        )
        .unwrap();

        let settings = Settings::new(temp_dir.path()).unwrap();

        assert_eq!(settings.master.as_deref(), Some("thesis.tex"));
        assert_eq!(settings.reindex, ReindexPolicy::Never);
        assert_eq!(settings.debounce_ms, 50);
    }
}
