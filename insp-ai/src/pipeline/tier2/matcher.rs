// Tier 2: Matcher
//
// Concept: Produce note -> photos assignments with one of two strategies,
// selected once per run by the pattern detector.
//
// Direct strategy (numbered):
// 1. Pair photo i with note i (notes in input order) when sentiment allows
// 2. Incompatible pair -> zero-photo placeholder for the note (0.35)
// 3. Excess and mismatched photos -> one external call, merged append-only
// 4. Call failure -> keep the direct matches (accepted partial result)
//
// Enhanced strategy (unnumbered):
// 1. All photos and notes in one external call
// 2. Call failure -> sentiment round-robin fallback (0.4)
//
// External failures are always recovered here and never reach the caller.

use crate::pipeline::context::PipelineContext;
use crate::pipeline::prompts;
use crate::pipeline::tier1::classifier::call_with_timeout;
use crate::pipeline::tier1::response_decoder::decode;
use crate::pipeline::tier2::raw_assignment::{complete_map, parse_entries, ParsedEntry, RawAssignments};
use crate::pipeline::types::{
    AssignmentMap, CallPurpose, ClassifierRequest, DecodeError, MatchOutcome, MatchStrategy,
    NoteAssignment, NoteId, PhotoId, Sentiment, StageError,
};
use std::collections::BTreeSet;

/// Confidence of a sentiment-compatible direct pair
pub const DIRECT_CONFIDENCE: f64 = 0.95;

/// Confidence of a placeholder left by an incompatible or missing pair
pub const PLACEHOLDER_CONFIDENCE: f64 = 0.35;

/// Confidence of every entry produced by the round-robin fallback
pub const ROUND_ROBIN_CONFIDENCE: f64 = 0.4;

/// Confidence assumed when the classifier omits one
const CLASSIFIER_DEFAULT_CONFIDENCE: f64 = 0.7;

/// Matcher (Tier 2 concept)
#[derive(Debug, Default)]
pub struct Matcher;

impl Matcher {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self, context: &PipelineContext, strategy: MatchStrategy) -> MatchOutcome {
        tracing::info!(
            run_id = %context.run_id,
            strategy = ?strategy,
            photos = context.photo_count(),
            notes = context.note_count(),
            "Matching photos to notes"
        );

        match strategy {
            MatchStrategy::Numbered => self.direct_strategy(context).await,
            MatchStrategy::Unnumbered => self.enhanced_strategy(context).await,
        }
    }

    // ------------------------------------------------------------------------
    // Direct strategy
    // ------------------------------------------------------------------------

    async fn direct_strategy(&self, context: &PipelineContext) -> MatchOutcome {
        let (mut assignments, unmatched) = direct_matches(context);

        let mut fallback_used = false;
        if !unmatched.is_empty() && context.note_count() > 0 {
            match self.request_excess(context, &unmatched, &assignments).await {
                Ok(entries) => {
                    let placed = merge_excess(&mut assignments, entries, &unmatched);
                    tracing::info!(
                        unmatched = unmatched.len(),
                        placed,
                        "Excess photos merged into direct matches"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        unmatched = unmatched.len(),
                        error = %e,
                        "Excess photo matching failed, keeping direct matches only"
                    );
                    fallback_used = true;
                }
            }
        }

        MatchOutcome {
            assignments,
            strategy: MatchStrategy::Numbered,
            fallback_used,
        }
    }

    async fn request_excess(
        &self,
        context: &PipelineContext,
        unmatched: &[PhotoId],
        current: &AssignmentMap,
    ) -> Result<Vec<ParsedEntry>, StageError> {
        let request = ClassifierRequest::text(
            CallPurpose::MatchExcessPhotos,
            prompts::match_excess_photos(context, unmatched, current),
            context.timeouts.excess_match(),
        );
        let text = call_with_timeout(context.classifier.as_ref(), request).await?;
        let raw: RawAssignments = decode(&text)?;
        Ok(parse_entries(&raw.into_vec(), context, CLASSIFIER_DEFAULT_CONFIDENCE))
    }

    // ------------------------------------------------------------------------
    // Enhanced strategy
    // ------------------------------------------------------------------------

    async fn enhanced_strategy(&self, context: &PipelineContext) -> MatchOutcome {
        if context.photo_count() == 0 || context.note_count() == 0 {
            return MatchOutcome {
                assignments: sentiment_round_robin(context),
                strategy: MatchStrategy::Unnumbered,
                fallback_used: false,
            };
        }

        match self.request_all(context).await {
            Ok(assignments) => MatchOutcome {
                assignments,
                strategy: MatchStrategy::Unnumbered,
                fallback_used: false,
            },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Enhanced matching failed, using sentiment round-robin fallback"
                );
                MatchOutcome {
                    assignments: sentiment_round_robin(context),
                    strategy: MatchStrategy::Unnumbered,
                    fallback_used: true,
                }
            }
        }
    }

    async fn request_all(&self, context: &PipelineContext) -> Result<AssignmentMap, StageError> {
        let request = ClassifierRequest::text(
            CallPurpose::MatchAllPhotos,
            prompts::match_all_photos(context),
            context.timeouts.enhanced_match(),
        );
        let text = call_with_timeout(context.classifier.as_ref(), request).await?;
        let raw: RawAssignments = decode(&text)?;
        let entries = parse_entries(&raw.into_vec(), context, CLASSIFIER_DEFAULT_CONFIDENCE);

        if entries.iter().all(|e| e.photo_ids.is_empty()) {
            return Err(DecodeError::Invalid {
                message: "response assigned no photos to known notes".to_string(),
            }
            .into());
        }

        Ok(complete_map(entries, context))
    }
}

/// Index pairing for the numbered case
///
/// Returns one entry per note plus the photos left unpaired (incompatible
/// pairs and photos beyond the note count), ascending.
pub fn direct_matches(context: &PipelineContext) -> (AssignmentMap, Vec<PhotoId>) {
    let photo_ids: Vec<PhotoId> = context.photo_ids().collect();
    let mut assignments = AssignmentMap::new();
    let mut unmatched = Vec::new();

    for (index, note) in context.notes.iter().enumerate() {
        let Some(&photo_id) = photo_ids.get(index) else {
            assignments.insert(
                note.note_id,
                NoteAssignment::placeholder(
                    format!("No photo at position {}", index + 1),
                    PLACEHOLDER_CONFIDENCE,
                ),
            );
            continue;
        };

        let sentiment = context.metadata_or_unknown(photo_id).sentiment;
        if sentiment.is_compatible_with(note.is_positive) {
            assignments.insert(
                note.note_id,
                NoteAssignment::new(
                    vec![photo_id],
                    format!("Photo {} follows note {} in sequence", photo_id, note.note_id),
                    DIRECT_CONFIDENCE,
                ),
            );
        } else {
            tracing::debug!(
                photo_id,
                note_id = note.note_id,
                sentiment = sentiment.as_str(),
                note_is_positive = note.is_positive,
                "Sentiment mismatch, leaving placeholder"
            );
            assignments.insert(
                note.note_id,
                NoteAssignment::placeholder(
                    format!(
                        "Photo {} at this position has {} sentiment, incompatible with a {} note",
                        photo_id,
                        sentiment.as_str(),
                        if note.is_positive { "positive" } else { "negative" }
                    ),
                    PLACEHOLDER_CONFIDENCE,
                ),
            );
            unmatched.push(photo_id);
        }
    }

    unmatched.extend(photo_ids.iter().skip(context.note_count()).copied());
    unmatched.sort_unstable();

    (assignments, unmatched)
}

/// Append classifier-placed photos to existing entries
///
/// Only photos from `unmatched` are accepted, each at most once; photos
/// already in an entry are never moved. Returns how many photos were placed.
pub fn merge_excess(
    assignments: &mut AssignmentMap,
    entries: Vec<ParsedEntry>,
    unmatched: &[PhotoId],
) -> usize {
    let mut pending: BTreeSet<PhotoId> = unmatched.iter().copied().collect();
    let mut placed = 0;

    for entry in entries {
        let Some(assignment) = assignments.get_mut(&entry.note_id) else {
            continue;
        };

        let added: Vec<PhotoId> = entry
            .photo_ids
            .into_iter()
            .filter(|photo_id| pending.remove(photo_id))
            .collect();
        if added.is_empty() {
            continue;
        }

        let was_empty = assignment.photo_ids.is_empty();
        placed += added.len();
        assignment.photo_ids.extend(added);
        assignment.confidence = if was_empty {
            entry.confidence
        } else {
            assignment.confidence.min(entry.confidence)
        };
        assignment.reasoning = format!("{}; {}", assignment.reasoning, entry.reasoning);
    }

    placed
}

/// Deterministic fallback: distribute photos by sentiment bucket
///
/// `problem` and `neutral` photos go round-robin over negative notes,
/// `good_practice` photos over positive notes. A bucket whose note group is
/// empty spreads over all notes. Empty notes then take a photo from the most
/// loaded note holding more than one.
pub fn sentiment_round_robin(context: &PipelineContext) -> AssignmentMap {
    let all_notes: Vec<NoteId> = context.notes.iter().map(|n| n.note_id).collect();
    let mut assignments: AssignmentMap = all_notes
        .iter()
        .map(|&id| {
            (
                id,
                NoteAssignment::placeholder(
                    "Sentiment round-robin fallback",
                    ROUND_ROBIN_CONFIDENCE,
                ),
            )
        })
        .collect();
    if all_notes.is_empty() {
        return assignments;
    }

    let negative_notes: Vec<NoteId> = context
        .notes
        .iter()
        .filter(|n| !n.is_positive)
        .map(|n| n.note_id)
        .collect();
    let positive_notes: Vec<NoteId> = context
        .notes
        .iter()
        .filter(|n| n.is_positive)
        .map(|n| n.note_id)
        .collect();

    let (good, other): (Vec<PhotoId>, Vec<PhotoId>) = context
        .photo_ids()
        .partition(|&id| context.metadata_or_unknown(id).sentiment == Sentiment::GoodPractice);

    for (bucket, group) in [(other, &negative_notes), (good, &positive_notes)] {
        let targets = if group.is_empty() { &all_notes } else { group };
        for (index, photo_id) in bucket.into_iter().enumerate() {
            let note_id = targets[index % targets.len()];
            if let Some(assignment) = assignments.get_mut(&note_id) {
                assignment.photo_ids.push(photo_id);
            }
        }
    }

    rebalance_empty_notes(&mut assignments);
    assignments
}

/// Give each empty note the last photo of the most loaded multi-photo note
fn rebalance_empty_notes(assignments: &mut AssignmentMap) {
    let empty: Vec<NoteId> = assignments
        .iter()
        .filter(|(_, a)| a.photo_ids.is_empty())
        .map(|(&id, _)| id)
        .collect();

    for note_id in empty {
        let donor = assignments
            .iter()
            .filter(|(_, a)| a.photo_ids.len() > 1)
            .max_by(|(ida, a), (idb, b)| a.photo_ids.len().cmp(&b.photo_ids.len()).then(idb.cmp(ida)))
            .map(|(&id, _)| id);
        let Some(donor) = donor else {
            break;
        };

        let moved = assignments
            .get_mut(&donor)
            .and_then(|a| a.photo_ids.pop());
        if let (Some(photo_id), Some(target)) = (moved, assignments.get_mut(&note_id)) {
            target.photo_ids.push(photo_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::fixtures;
    use crate::pipeline::types::{ClassifierError, ClassifierRequest};
    use crate::pipeline::tier1::classifier::Classifier;
    use async_trait::async_trait;
    use std::sync::Arc;
    use Sentiment::*;

    struct Canned(&'static str);

    #[async_trait]
    impl Classifier for Canned {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn complete(&self, _request: &ClassifierRequest) -> Result<String, ClassifierError> {
            Ok(self.0.to_string())
        }
    }

    const NOTES: &[(NoteId, &str)] = &[
        (1, "1. Worker without harness on scaffold"),
        (2, "2. Missing guardrail at slab edge"),
        (3, "3. Good housekeeping, walkways kept clear"),
    ];

    #[test]
    fn test_direct_matches_compatible_pairs() {
        let context = fixtures::context(&[Problem, Problem, GoodPractice], NOTES);
        let (assignments, unmatched) = direct_matches(&context);

        assert!(unmatched.is_empty());
        for (note_id, photo_id) in [(1, 1), (2, 2), (3, 3)] {
            assert_eq!(assignments[&note_id].photo_ids, vec![photo_id]);
            assert_eq!(assignments[&note_id].confidence, DIRECT_CONFIDENCE);
        }
    }

    #[test]
    fn test_incompatible_pair_leaves_placeholder() {
        let context = fixtures::context(&[Problem, Problem, Problem], NOTES);
        let (assignments, unmatched) = direct_matches(&context);

        assert!(assignments[&3].photo_ids.is_empty());
        assert_eq!(assignments[&3].confidence, PLACEHOLDER_CONFIDENCE);
        assert_eq!(unmatched, vec![3]);
    }

    #[test]
    fn test_direct_never_pairs_opposite_sentiments() {
        let sentiments = [GoodPractice, Problem, Problem];
        let context = fixtures::context(&sentiments, NOTES);
        let (assignments, _) = direct_matches(&context);

        for note in &context.notes {
            for photo_id in &assignments[&note.note_id].photo_ids {
                let sentiment = context.metadata_or_unknown(*photo_id).sentiment;
                assert!(sentiment.is_compatible_with(note.is_positive));
            }
        }
    }

    #[test]
    fn test_more_notes_than_photos() {
        let context = fixtures::context(&[Neutral], NOTES);
        let (assignments, unmatched) = direct_matches(&context);
        assert_eq!(assignments.len(), 3);
        assert!(assignments[&2].photo_ids.is_empty());
        assert!(unmatched.is_empty());
    }

    #[test]
    fn test_merge_excess_is_append_only() {
        let mut assignments = AssignmentMap::new();
        assignments.insert(1, NoteAssignment::new(vec![1], "direct", 0.95));
        assignments.insert(2, NoteAssignment::placeholder("mismatch", 0.35));

        let entries = vec![
            ParsedEntry { note_id: 1, photo_ids: vec![1, 4], reasoning: "also rail".into(), confidence: 0.8 },
            ParsedEntry { note_id: 2, photo_ids: vec![3, 4], reasoning: "cable".into(), confidence: 0.75 },
        ];
        let placed = merge_excess(&mut assignments, entries, &[3, 4]);

        assert_eq!(placed, 2);
        assert_eq!(assignments[&1].photo_ids, vec![1, 4]);
        assert_eq!(assignments[&1].confidence, 0.8);
        assert_eq!(assignments[&2].photo_ids, vec![3]);
        assert_eq!(assignments[&2].confidence, 0.75);
    }

    #[test]
    fn test_round_robin_by_sentiment_bucket() {
        let context = fixtures::context(&[Problem, GoodPractice, Neutral, Problem, GoodPractice], NOTES);
        let assignments = sentiment_round_robin(&context);

        // problem + neutral (1, 3, 4) over notes 1, 2; good practice (2, 5) over note 3
        assert_eq!(assignments[&1].photo_ids, vec![1, 4]);
        assert_eq!(assignments[&2].photo_ids, vec![3]);
        assert_eq!(assignments[&3].photo_ids, vec![2, 5]);
        assert!(assignments.values().all(|a| a.confidence == ROUND_ROBIN_CONFIDENCE));
    }

    #[test]
    fn test_round_robin_rebalances_empty_notes() {
        // every photo is problem; positive note 3 would otherwise be empty
        let context = fixtures::context(&[Problem, Problem, Problem, Problem], NOTES);
        let assignments = sentiment_round_robin(&context);

        assert!(assignments.values().all(|a| !a.photo_ids.is_empty()));
        let total: usize = assignments.values().map(|a| a.photo_ids.len()).sum();
        assert_eq!(total, 4);
    }

    #[tokio::test]
    async fn test_enhanced_uses_classifier_output() {
        let classifier = Arc::new(Canned(
            r#"[{"noteId": 1, "photoIds": [1, 2], "reasoning": "harness", "confidence": 0.9},
                {"noteId": 2, "photoIds": [2], "reasoning": "rail"}]"#,
        ));
        let context = fixtures::context_with(classifier, &[Problem, Problem], NOTES);
        let outcome = Matcher::new().run(&context, MatchStrategy::Unnumbered).await;

        assert!(!outcome.fallback_used);
        assert_eq!(outcome.assignments[&1].photo_ids, vec![1, 2]);
        // duplicate kept for validation
        assert_eq!(outcome.assignments[&2].photo_ids, vec![2]);
        assert_eq!(outcome.assignments[&2].confidence, CLASSIFIER_DEFAULT_CONFIDENCE);
        assert!(outcome.assignments[&3].photo_ids.is_empty());
    }

    #[tokio::test]
    async fn test_enhanced_falls_back_on_unusable_output() {
        let classifier = Arc::new(Canned(r#"[{"noteId": 42, "photoIds": [1]}]"#));
        let context = fixtures::context_with(classifier, &[Problem, GoodPractice], NOTES);
        let outcome = Matcher::new().run(&context, MatchStrategy::Unnumbered).await;

        assert!(outcome.fallback_used);
        assert!(outcome.assignments.values().all(|a| a.confidence == ROUND_ROBIN_CONFIDENCE));
    }

    #[tokio::test]
    async fn test_direct_keeps_partial_result_when_excess_call_fails() {
        let context = fixtures::context(&[Problem, Problem, GoodPractice, Neutral, Neutral], NOTES);
        let outcome = Matcher::new().run(&context, MatchStrategy::Numbered).await;

        assert!(outcome.fallback_used);
        assert_eq!(outcome.assignments.len(), 3);
        assert_eq!(outcome.assignments[&1].photo_ids, vec![1]);
    }
}
