//! Weighted synthesis of capability results.
//!
//! `overall_confidence = sum(weight(name) * confidence(name))` over the whole
//! weight table. A capability with no result contributes zero but keeps its
//! weight, so a missing provider always drags the score down.

use crate::analysis::extractors::ExtractorRegistry;
use crate::analysis::weights::{WeightTable, WEIGHT_EPSILON};
use crate::error::{Error, Result};
use crate::models::{AnalysisResult, Recommendation, SynthesisReport};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Risk line used when no risks were found.
pub const NO_RISKS_PLACEHOLDER: &str = "No major risks identified";

/// Next step for a PROCEED recommendation.
pub const NEXT_STEPS_PROCEED: &str = "Proceed to feasibility study";

/// Next step for CAUTION and REJECT.
pub const NEXT_STEPS_OTHERWISE: &str = "Further analysis required";

/// Precision the overall confidence is rounded to before banding, so that
/// floating-point noise cannot push a score across a band boundary.
const CONFIDENCE_PRECISION: f64 = 1e9;

/// Fixed follow-up for each recommendation.
pub fn next_steps_for(recommendation: Recommendation) -> &'static str {
    match recommendation {
        Recommendation::Proceed => NEXT_STEPS_PROCEED,
        Recommendation::Caution | Recommendation::Reject => NEXT_STEPS_OTHERWISE,
    }
}

/// Weighted confidence over every capability in `weights`.
///
/// Fails only if the inputs produce a non-finite or out-of-range score.
pub fn overall_confidence(
    results: &BTreeMap<String, AnalysisResult>,
    weights: &WeightTable,
) -> Result<f64> {
    let mut total = 0.0;

    for (name, weight) in weights.iter() {
        let confidence = match results.get(name) {
            Some(result) => result.confidence,
            None => {
                warn!("{}; counting it as zero", Error::MissingResult(name.to_string()));
                0.0
            }
        };
        total += weight * confidence;
    }

    if !total.is_finite() {
        return Err(Error::SynthesisFailure(format!(
            "overall confidence is not a number ({})",
            total
        )));
    }

    // A table may sum to 1.0 +/- WEIGHT_EPSILON, so a perfect run can land
    // just past 1.0.
    let rounded = (total * CONFIDENCE_PRECISION).round() / CONFIDENCE_PRECISION;
    if !(-WEIGHT_EPSILON..=1.0 + WEIGHT_EPSILON).contains(&rounded) {
        return Err(Error::SynthesisFailure(format!(
            "overall confidence {} is outside [0, 1]",
            rounded
        )));
    }

    Ok(rounded.clamp(0.0, 1.0))
}

/// Builds the full synthesis report.
pub fn aggregate(
    results: &BTreeMap<String, AnalysisResult>,
    weights: &WeightTable,
    extractors: &ExtractorRegistry,
) -> Result<SynthesisReport> {
    let overall = overall_confidence(results, weights)?;
    let recommendation = Recommendation::from_confidence(overall);

    let mut key_factors = Vec::new();
    let mut risks = Vec::new();

    // Weighted capabilities first, in table order, then any extras.
    let extras = results
        .keys()
        .map(String::as_str)
        .filter(|name| !weights.contains(name));
    for name in weights.names().chain(extras) {
        let Some(result) = results.get(name) else {
            risks.push(format!("{} unavailable: no result", name));
            continue;
        };

        if let Some(ref error) = result.error {
            risks.push(format!("{} unavailable: {}", name, error));
        }

        let insights = extractors.extract(name, result);
        key_factors.extend(insights.key_factors);
        risks.extend(insights.risks);
    }

    if risks.is_empty() {
        risks.push(NO_RISKS_PLACEHOLDER.to_string());
    }

    debug!(
        "Synthesized overall confidence {:.3} -> {}",
        overall, recommendation
    );

    Ok(SynthesisReport {
        overall_confidence: overall,
        recommendation,
        key_factors,
        risks,
        next_steps: next_steps_for(recommendation).to_string(),
    })
}

/// A weight table bound to its extractor registry.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    weights: WeightTable,
    extractors: ExtractorRegistry,
}

impl Synthesizer {
    pub fn new(weights: WeightTable, extractors: ExtractorRegistry) -> Self {
        Self {
            weights,
            extractors,
        }
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    pub fn extractors(&self) -> &ExtractorRegistry {
        &self.extractors
    }

    pub fn aggregate(&self, results: &BTreeMap<String, AnalysisResult>) -> Result<SynthesisReport> {
        aggregate(results, &self.weights, &self.extractors)
    }
}
