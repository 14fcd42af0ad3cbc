//! Keyword classification of bidding records.
//!
//! A record is relevant when any taxonomy pattern matches its normalised
//! searchable text (object + item list). Evaluation stops at the first match;
//! pattern order only changes how fast a verdict is reached, never the verdict.

use licita_core::{ClassifiedRecord, RawRecord};
use tracing::debug;

use crate::normalize::{NormalizedText, normalize};
use crate::taxonomy::Taxonomy;

/// Taxonomy-backed relevance classifier.
#[derive(Debug, Clone, Default)]
pub struct TextClassifier {
    taxonomy: Taxonomy,
}

/// Counts from classifying a batch of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassificationSummary {
    pub total: usize,
    pub matched: usize,
}

impl TextClassifier {
    pub fn new(taxonomy: Taxonomy) -> Self {
        Self { taxonomy }
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// True iff any pattern matches. Empty text never matches.
    pub fn matches(&self, text: &NormalizedText) -> bool {
        self.matching_pattern(text).is_some()
    }

    /// The first pattern (in taxonomy order) that matches, for diagnostics.
    pub fn matching_pattern(&self, text: &NormalizedText) -> Option<&str> {
        if text.is_empty() {
            return None;
        }
        self.taxonomy.first_match(text.as_str()).map(|re| re.as_str())
    }

    /// Normalise then match free text.
    pub fn is_relevant(&self, text: &str) -> bool {
        self.matches(&normalize(text))
    }

    /// Classify a single record. The raw record is carried through untouched.
    pub fn classify(&self, raw: RawRecord) -> ClassifiedRecord {
        let text = raw.searchable_text();
        let normalized = normalize(&text);
        let pattern = self.matching_pattern(&normalized);
        debug!(
            bulletin_id = %raw.bulletin_id,
            record_id = raw.record_id,
            pattern = pattern.unwrap_or("-"),
            "classified record"
        );
        let matched = pattern.is_some();
        ClassifiedRecord { raw, text, matched }
    }

    /// Classify a batch, preserving input order.
    pub fn classify_batch(
        &self,
        records: Vec<RawRecord>,
    ) -> (Vec<ClassifiedRecord>, ClassificationSummary) {
        let classified: Vec<ClassifiedRecord> =
            records.into_iter().map(|r| self.classify(r)).collect();
        let summary = ClassificationSummary {
            total: classified.len(),
            matched: classified.iter().filter(|c| c.matched).count(),
        };
        (classified, summary)
    }
}
