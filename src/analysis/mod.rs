//! Synthesis and conflict detection over settled capability results.

pub mod conflicts;
pub mod extractors;
pub mod synthesizer;
pub mod weights;

pub use conflicts::{ConflictDetector, ConflictRule, FactSource, DEFAULT_RESOLUTION};
pub use extractors::{
    ExtractorRegistry, Extractor, FactorTemplate, FieldExtractor, Insights, RiskTemplate,
};
pub use synthesizer::{aggregate, overall_confidence, Synthesizer};
pub use weights::{WeightTable, WEIGHT_EPSILON};
