// Tier 1: Pattern Detector
//
// Concept: Decide once per run whether photos follow notes one-to-one in order
// (numbered) or need open-ended matching (unnumbered).
//
// Algorithm:
// 1. ratio = photos / notes; inside the configured window -> numbered
// 2. Otherwise sample the first N notes for ordinal prefixes
// 3. Prefixed share >= threshold -> numbered, else unnumbered
//
// Heuristic only. Ambiguous input always yields a decision, never an error.

use crate::pipeline::tier1::note_parser::ordinal_prefix;
use crate::pipeline::types::{MatchStrategy, PatternDecision, StructuredNote};
use insp_common::config::MatchingConfig;

pub struct PatternDetector {
    config: MatchingConfig,
}

impl PatternDetector {
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }

    pub fn detect(&self, photo_count: usize, notes: &[StructuredNote]) -> PatternDecision {
        let note_count = notes.len();

        if note_count == 0 {
            return PatternDecision {
                strategy: MatchStrategy::Unnumbered,
                ratio: None,
                prefixed_share: None,
                reason: "no notes to pair with".to_string(),
            };
        }

        let ratio = photo_count as f64 / note_count as f64;
        if ratio >= self.config.numbered_ratio_min && ratio <= self.config.numbered_ratio_max {
            return PatternDecision {
                strategy: MatchStrategy::Numbered,
                ratio: Some(ratio),
                prefixed_share: None,
                reason: format!(
                    "photo/note ratio {:.2} within {:.2}..={:.2}",
                    ratio, self.config.numbered_ratio_min, self.config.numbered_ratio_max
                ),
            };
        }

        let sample: Vec<&StructuredNote> = notes.iter().take(self.config.prefix_sample_size).collect();
        let prefixed = sample
            .iter()
            .filter(|note| ordinal_prefix(&note.text).is_some())
            .count();
        let share = prefixed as f64 / sample.len() as f64;

        let strategy = if share >= self.config.numbered_prefix_threshold {
            MatchStrategy::Numbered
        } else {
            MatchStrategy::Unnumbered
        };

        tracing::debug!(
            ratio,
            prefixed,
            sampled = sample.len(),
            strategy = ?strategy,
            "Ratio outside window, decided by ordinal prefixes"
        );

        PatternDecision {
            strategy,
            ratio: Some(ratio),
            prefixed_share: Some(share),
            reason: format!(
                "photo/note ratio {:.2} outside window; {}/{} sampled notes carry an ordinal prefix",
                ratio,
                prefixed,
                sample.len()
            ),
        }
    }
}
