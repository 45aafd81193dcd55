// Orchestrator
//
// Concept: Own the end-to-end contract (photos, notes) -> (assignments,
// photo names, diagnostics).
//
// Workflow:
// 1. Analyze all photos concurrently (Tier 1, external)
// 2. Parse notes (Tier 1, local)
// 3. Detect the matching strategy (Tier 1, local)
// 4. Match (Tier 2)
// 5. Validate, verify when needed, repair (Tier 3)
// 6. Name photos from the final assignment
//
// Never fails: every external failure is absorbed by the stage that made the
// call, and the worst case is a low-confidence but structurally valid result.

use crate::pipeline::context::PipelineContext;
use crate::pipeline::photo_namer::PhotoNamer;
use crate::pipeline::tier1::classifier::Classifier;
use crate::pipeline::tier1::note_parser::NoteParser;
use crate::pipeline::tier1::pattern_detector::PatternDetector;
use crate::pipeline::tier1::photo_analyzer::PhotoAnalyzer;
use crate::pipeline::tier2::matcher::Matcher;
use crate::pipeline::tier3::assignment_validator::AssignmentValidator;
use crate::pipeline::tier3::fallback_repairer::FallbackRepairer;
use crate::pipeline::tier3::verifier::Verifier;
use crate::pipeline::types::{
    AssignmentReasoning, Diagnostics, NoteId, ObservationNote, OrchestrationResult, Photo,
};
use chrono::Utc;
use insp_common::config::{MatchingConfig, TimeoutConfig, TomlConfig};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// End-to-end assignment orchestrator
pub struct Orchestrator {
    classifier: Arc<dyn Classifier>,
    matching: MatchingConfig,
    timeouts: TimeoutConfig,
}

impl Orchestrator {
    pub fn new(classifier: Arc<dyn Classifier>, config: &TomlConfig) -> Self {
        Self {
            classifier,
            matching: config.matching.clone(),
            timeouts: config.timeouts.clone(),
        }
    }

    /// Run the full pipeline
    ///
    /// Photos are identified by position (1-based) regardless of any id they
    /// carry. Notes keep their own ids; a repeated id keeps the first note.
    pub async fn orchestrate(
        &self,
        photos: Vec<Photo>,
        notes: Vec<ObservationNote>,
    ) -> OrchestrationResult {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let photos = renumber(photos);
        let notes = dedupe_notes(notes);

        tracing::info!(
            run_id = %run_id,
            photos = photos.len(),
            notes = notes.len(),
            classifier = self.classifier.name(),
            "Starting assignment run"
        );

        // Phase 1: photo analysis (concurrent)
        let analyzer = PhotoAnalyzer::new(self.classifier.clone(), self.timeouts.analyze());
        let photo_metadata = analyzer.analyze_all(&photos).await;

        // Phase 2: note parsing
        let structured = NoteParser::default().parse_all(&notes);

        let context = PipelineContext {
            run_id,
            classifier: self.classifier.clone(),
            matching: self.matching.clone(),
            timeouts: self.timeouts.clone(),
            photo_filenames: photos.iter().map(|p| (p.id, p.filename.clone())).collect(),
            photo_metadata,
            notes: structured,
        };
        drop(photos);

        // Phase 3: strategy
        let pattern = PatternDetector::new(context.matching.clone())
            .detect(context.photo_count(), &context.notes);
        tracing::info!(strategy = ?pattern.strategy, reason = %pattern.reason, "Matching strategy selected");

        // Phase 4: matching
        let matched = Matcher::new().run(&context, pattern.strategy).await;

        // Phase 5: validation, verification, repair
        let validator = AssignmentValidator::new(context.matching.low_confidence_threshold);
        let report = validator.validate(&matched.assignments, context.photo_count(), context.note_count());

        let verification = Verifier::new(validator.clone())
            .verify(&context, matched.assignments, report)
            .await;

        let note_ids: Vec<NoteId> = context.notes.iter().map(|n| n.note_id).collect();
        let repaired = FallbackRepairer::new(validator.clone()).repair(
            verification.assignments,
            &note_ids,
            context.photo_count(),
        );
        let final_report = validator.validate(&repaired.assignments, context.photo_count(), context.note_count());

        if !final_report.valid {
            if is_degenerate(context.photo_count(), context.note_count()) {
                tracing::warn!(
                    photos = context.photo_count(),
                    notes = context.note_count(),
                    errors = final_report.error_count(),
                    "Input cannot satisfy coverage, returning best effort"
                );
            } else {
                tracing::error!(
                    run_id = %run_id,
                    errors = ?final_report.errors,
                    "Assignment invalid after fallback repair"
                );
            }
        }

        // Phase 6: naming
        let naming = PhotoNamer::new().name_photos(&context, &repaired.assignments).await;

        let assignment_reasoning = repaired
            .assignments
            .iter()
            .map(|(&note_id, a)| {
                (
                    note_id,
                    AssignmentReasoning {
                        reasoning: a.reasoning.clone(),
                        confidence: a.confidence,
                    },
                )
            })
            .collect();
        let assignments = repaired
            .assignments
            .iter()
            .map(|(&note_id, a)| (note_id, a.photo_ids.clone()))
            .collect();

        tracing::info!(
            run_id = %run_id,
            valid = final_report.valid,
            warnings = final_report.warnings.len(),
            repairs = repaired.actions.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Assignment run complete"
        );

        let PipelineContext {
            photo_metadata,
            notes,
            ..
        } = context;

        OrchestrationResult {
            run_id,
            assignments,
            photo_names: naming.names,
            diagnostics: Diagnostics {
                photo_metadata,
                structured_notes: notes.into_iter().map(|n| (n.note_id, n)).collect(),
                assignment_reasoning,
                validation: final_report,
                pattern,
                matching_fallback_used: matched.fallback_used,
                verification: verification.outcome,
                repairs: repaired.actions,
                naming: naming.report,
                completed_at: Utc::now(),
            },
        }
    }
}

/// Assign 1-based ids by position
fn renumber(photos: Vec<Photo>) -> Vec<Photo> {
    photos
        .into_iter()
        .enumerate()
        .map(|(index, mut photo)| {
            let id = index as u32 + 1;
            if photo.id != id {
                tracing::debug!(given = photo.id, assigned = id, filename = %photo.filename, "Photo renumbered by position");
                photo.id = id;
            }
            photo
        })
        .collect()
}

/// Keep the first note for each id
fn dedupe_notes(notes: Vec<ObservationNote>) -> Vec<ObservationNote> {
    let mut seen = BTreeSet::new();
    notes
        .into_iter()
        .filter(|note| {
            let first = seen.insert(note.id);
            if !first {
                tracing::warn!(note_id = note.id, "Duplicate note id, keeping the first note");
            }
            first
        })
        .collect()
}

/// Inputs for which no assignment can satisfy every rule
///
/// No notes leaves photos uncovered; fewer photos than notes leaves a note
/// empty or a photo shared.
fn is_degenerate(photo_count: usize, note_count: usize) -> bool {
    (note_count == 0 && photo_count > 0) || photo_count < note_count
}

/// Notes whose final confidence is below `threshold`, for reviewer triage
pub fn low_confidence_notes(result: &OrchestrationResult, threshold: f64) -> BTreeMap<NoteId, f64> {
    result
        .diagnostics
        .assignment_reasoning
        .iter()
        .filter(|(_, r)| r.confidence < threshold)
        .map(|(&id, r)| (id, r.confidence))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tier1::classifier::UnavailableClassifier;

    fn photo(name: &str) -> Photo {
        Photo::new(0, name, "image/jpeg", vec![0xFF, 0xD8])
    }

    #[test]
    fn test_renumber_by_position() {
        let photos = renumber(vec![photo("b.jpg"), photo("a.jpg")]);
        assert_eq!(photos[0].id, 1);
        assert_eq!(photos[1].id, 2);
        assert_eq!(photos[1].filename, "a.jpg");
    }

    #[test]
    fn test_duplicate_note_ids_keep_first() {
        let notes = dedupe_notes(vec![
            ObservationNote::new(1, "first"),
            ObservationNote::new(1, "second"),
            ObservationNote::new(2, "third"),
        ]);
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].text, "first");
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(is_degenerate(3, 0));
        assert!(is_degenerate(1, 2));
        assert!(!is_degenerate(2, 2));
        assert!(!is_degenerate(0, 0));
    }

    #[tokio::test]
    async fn test_unavailable_classifier_still_covers_everything() {
        let orchestrator = Orchestrator::new(Arc::new(UnavailableClassifier), &TomlConfig::default());
        let result = orchestrator
            .orchestrate(
                vec![photo("a.jpg"), photo("b.jpg"), photo("c.jpg"), photo("d.jpg")],
                vec![
                    ObservationNote::new(4, "Trailing cable"),
                    ObservationNote::new(7, "Missing guardrail"),
                ],
            )
            .await;

        assert!(result.diagnostics.validation.valid);
        let mut covered: Vec<u32> = result.assignments.values().flatten().copied().collect();
        covered.sort_unstable();
        assert_eq!(covered, vec![1, 2, 3, 4]);
        assert_eq!(result.photo_names.len(), 4);
        assert!(!low_confidence_notes(&result, 0.7).is_empty());
    }

    #[tokio::test]
    async fn test_empty_input() {
        let orchestrator = Orchestrator::new(Arc::new(UnavailableClassifier), &TomlConfig::default());
        let result = orchestrator.orchestrate(Vec::new(), Vec::new()).await;
        assert!(result.assignments.is_empty());
        assert!(result.photo_names.is_empty());
        assert!(result.diagnostics.validation.valid);
    }
}
