//! Keyword taxonomy for health-staffing biddings.
//!
//! Patterns are written against [`normalize`](crate::normalize)d text
//! (lowercase, accents folded), use `\b` word boundaries, and spell out
//! singular/plural and connector variants explicitly.

use regex::{Regex, RegexBuilder};
use thiserror::Error;

/// Default taxonomy. Any single match marks a record as relevant.
pub const DEFAULT_PATTERNS: &[&str] = &[
    r"\bconsultas?\b",
    r"\benfermage[mn]s?\b",
    r"\benfermeiros?\b",
    r"\bequipes?\s+(?:de\s+)?enfermage[mn]s?\b",
    r"\bequipes?\s+(?:para\s+)?enfermage[mn]s?\b",
    r"\bequipes?\s+medicas?\b",
    r"\bespecialidades?\s+medicas?\b",
    r"\bgest(?:ao|oes)\s+(?:de\s+)?enfermage[mn]s?\b",
    r"\bgest(?:ao|oes)\s+medic[ao]s?\b",
    r"\bmaos?\s+(?:de\s+)?obras?\s+(?:de\s+)?enfermage[mn]s?\b",
    r"\bmaos?\s+(?:de\s+)?obras?\s+medicas?\b",
    r"\bmedicos?\b",
    r"\bservicos?\s+medic[oa]s?\b",
    r"\btele\s*atendimentos?\b",
    r"\bteleatendimentos?\b",
];

#[derive(Debug, Error)]
#[error("invalid taxonomy pattern {pattern:?}: {source}")]
pub struct TaxonomyError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// Ordered, compiled set of keyword patterns.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    patterns: Vec<Regex>,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::from_patterns(DEFAULT_PATTERNS).expect("default taxonomy patterns compile")
    }
}

impl Taxonomy {
    /// Compile patterns case-insensitively, preserving their order.
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self, TaxonomyError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p.as_ref())
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| TaxonomyError {
                        pattern: p.as_ref().to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Same patterns, evaluated in reverse order.
    pub fn reversed(&self) -> Self {
        Self {
            patterns: self.patterns.iter().rev().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &Regex> {
        self.patterns.iter()
    }

    /// First pattern (in evaluation order) matching `text`.
    pub fn first_match(&self, text: &str) -> Option<&Regex> {
        self.patterns.iter().find(|re| re.is_match(text))
    }
}
