use crate::error::Error;
use regex::Regex;
use serde::Deserialize;

/// Replace a storage-level path (e.g. `.../realdata/mdt3/projects`) with the
/// name users know it by.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PathRemap {
    pub pattern: String,
    pub replacement: String,
}

pub fn default_path_remaps() -> Vec<PathRemap> {
    [
        ("^/lustre/scratch115/realdata/mdt[0-9]/projects", "/lustre/scratch115/projects"),
        ("^/lustre/scratch119/realdata/mdt[0-9]/projects", "/lustre/scratch119/humgen/projects"),
        ("^/lustre/scratch115/realdata/mdt[0-9]/teams", "/lustre/scratch115/teams"),
        ("^/lustre/scratch119/realdata/mdt[0-9]/teams", "/lustre/scratch119/humgen/teams"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| PathRemap {
        pattern: pattern.to_string(),
        replacement: replacement.to_string(),
    })
    .collect()
}

#[derive(Debug, Clone, Default)]
pub struct PathRemapper {
    remaps: Vec<(Regex, String)>,
}

impl PathRemapper {
    pub fn new(remaps: &[PathRemap]) -> Result<Self, Error> {
        let remaps = remaps
            .iter()
            .map(|r| Ok((Regex::new(&r.pattern)?, r.replacement.clone())))
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(Self { remaps })
    }

    /// First matching alias rewrites the path; unmatched paths pass through.
    pub fn remap(&self, path: &str) -> String {
        for (pattern, replacement) in &self.remaps {
            if pattern.is_match(path) {
                return pattern.replacen(path, 1, replacement.as_str()).into_owned();
            }
        }
        path.to_string()
    }
}

/// A shared directory reported under a synthetic group rather than the
/// unix group that happens to own its files.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PseudoGroup {
    pub path_prefix: String,
    pub group_id: u32,
    pub group_name: String,
    #[serde(default)]
    pub pi_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PseudoGroups {
    entries: Vec<PseudoGroup>,
}

impl PseudoGroups {
    pub fn new(entries: Vec<PseudoGroup>) -> Self {
        Self { entries }
    }

    pub fn lookup(&self, path: &str) -> Option<&PseudoGroup> {
        self.entries.iter().find(|g| path.starts_with(&g.path_prefix))
    }
}
