//! Classification layer: accent-folding normalisation and keyword taxonomy matching.

mod classifier;
mod normalize;
mod taxonomy;

pub use classifier::{ClassificationSummary, TextClassifier};
pub use normalize::{NormalizedText, normalize};
pub use taxonomy::{DEFAULT_PATTERNS, Taxonomy, TaxonomyError};
