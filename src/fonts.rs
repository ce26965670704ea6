//! Font family names installed on the host, for `fontspec` and
//! `unicode-math` arguments.
//!
//! The list comes from fontconfig (`fc-list`) and is queried once per
//! process. Without fontconfig it is empty.

use std::process::Command;

use anyhow::{bail, Context};
use itertools::Itertools;
use once_cell::sync::Lazy;

static INSTALLED: Lazy<Vec<String>> = Lazy::new(|| match query_fontconfig() {
    Ok(families) => {
        tracing::debug!("{} font families installed", families.len());
        families
    }
    Err(err) => {
        tracing::debug!("no font list: {err:#}");
        vec![]
    }
});

pub fn installed_families() -> &'static [String] {
    &INSTALLED
}

fn query_fontconfig() -> anyhow::Result<Vec<String>> {
    let output = Command::new("fc-list")
        .args([":", "family"])
        .output()
        .context("failed to run fc-list")?;

    if !output.status.success() {
        bail!("fc-list exited with {}", output.status);
    }

    Ok(parse_families(&String::from_utf8_lossy(&output.stdout)))
}

/// First family of each `fc-list : family` line, sorted and deduplicated.
pub fn parse_families(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split([':', ',']).next())
        .map(str::trim)
        .filter(|family| !family.is_empty())
        .map(String::from)
        .sorted()
        .dedup()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_families_keeps_first_name_per_line() {
        let output = "DejaVu Sans,DejaVu Sans Condensed\nLatin Modern Math\n\nDejaVu Sans\nTeX Gyre Pagella:style=Regular\n";

        assert_eq!(
            parse_families(output),
            vec!["DejaVu Sans", "Latin Modern Math", "TeX Gyre Pagella"]
        );
    }
}
