use crate::error::Error;
use regex::Regex;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FiletypeRule {
    pub name: String,
    pub pattern: String,
}

impl FiletypeRule {
    pub fn new(name: &str, pattern: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
        }
    }
}

pub fn default_filetype_rules() -> Vec<FiletypeRule> {
    vec![
        FiletypeRule::new("BAM", r"\.(bam|sam)(\.gz)?$"),
        FiletypeRule::new("CRAM", r"\.cram(\.gz)?$"),
        FiletypeRule::new("VCF", r"\.(vcf|bcf|gvcf)(\.gz)?$"),
        FiletypeRule::new("PEDBED", r"\.(ped|bed)(\.gz)?$"),
    ]
}

/// Ordered filename patterns; the first matching rule names the category.
#[derive(Debug, Clone)]
pub struct FiletypeClassifier {
    rules: Vec<(String, Regex)>,
}

impl FiletypeClassifier {
    pub fn new(rules: &[FiletypeRule]) -> Result<Self, Error> {
        let rules = rules
            .iter()
            .map(|rule| Ok((rule.name.clone(), Regex::new(&rule.pattern)?)))
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(Self { rules })
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn classify(&self, path: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|(_, re)| re.is_match(path))
            .map(|(name, _)| name.as_str())
    }
}

impl Default for FiletypeClassifier {
    fn default() -> Self {
        // The built-in patterns are constant and known to compile.
        Self::new(&default_filetype_rules()).unwrap_or_else(|_| Self::empty())
    }
}
