// Photo Namer
//
// Concept: One unique, descriptive slug per photo, derived from the final
// assignment.
//
// Suggestion flow is an explicit state machine with a bounded retry:
//
//   Initial --all accepted / call failed--> Final
//   Initial --some rejected--> Rejected --one scoped retry--> Retried --> Final
//
// Rejected is only reachable from Initial, so at most two naming calls are
// made per run.
//
// Selection per photo: accepted suggestion -> note description slug ->
// original filename slug -> "photo-<id>", then deduplicated by SlugRegistry.

use crate::pipeline::context::PipelineContext;
use crate::pipeline::prompts::{self, NamingPrompt};
use crate::pipeline::slug::{self, SlugRegistry};
use crate::pipeline::tier1::classifier::call_with_timeout;
use crate::pipeline::tier1::response_decoder::decode;
use crate::pipeline::tier2::raw_assignment::coerce_id;
use crate::pipeline::types::{
    AssignmentMap, CallPurpose, ClassifierRequest, NamingReport, NoteId, PhotoId, RejectedName,
    SlugSource, StageError, StructuredNote,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNames {
    List(Vec<RawName>),
    Wrapped {
        #[serde(alias = "suggestions", alias = "photoNames", alias = "photo_names")]
        names: Vec<RawName>,
    },
}

#[derive(Debug, Deserialize)]
struct RawName {
    #[serde(rename = "photoId", alias = "photo_id", alias = "id", default)]
    photo_id: Value,
    #[serde(rename = "suggestedName", alias = "suggested_name", alias = "name", alias = "slug", default)]
    suggested_name: Option<String>,
}

/// Where the suggestion flow is
#[derive(Debug)]
enum NamingState {
    Initial,
    Rejected(Vec<RejectedName>),
    Retried,
    Final,
}

/// Per-photo naming input
struct Subject<'a> {
    photo_id: PhotoId,
    note: Option<&'a StructuredNote>,
    filename: &'a str,
    metadata_summary: String,
}

/// Final names plus diagnostics
#[derive(Debug, Clone, Default)]
pub struct NamingResult {
    pub names: BTreeMap<PhotoId, String>,
    pub report: NamingReport,
}

#[derive(Debug, Default)]
pub struct PhotoNamer;

impl PhotoNamer {
    pub fn new() -> Self {
        Self
    }

    pub async fn name_photos(
        &self,
        context: &PipelineContext,
        assignments: &AssignmentMap,
    ) -> NamingResult {
        let subjects = subjects(context, assignments);
        if subjects.is_empty() {
            return NamingResult::default();
        }

        let mut accepted: BTreeMap<PhotoId, String> = BTreeMap::new();
        let mut report = NamingReport::default();
        let mut state = NamingState::Initial;

        loop {
            state = match state {
                NamingState::Initial => {
                    let requested: Vec<&Subject> = subjects.iter().collect();
                    match self.request(context, &requested, &BTreeMap::new()).await {
                        Ok(names) => {
                            let rejected = screen(&requested, names, &mut accepted);
                            report.rejected_initial = rejected.clone();
                            if rejected.is_empty() {
                                NamingState::Final
                            } else {
                                NamingState::Rejected(rejected)
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Naming call failed, deriving names locally");
                            NamingState::Final
                        }
                    }
                }
                NamingState::Rejected(rejected) => {
                    report.retried = true;
                    let reasons: BTreeMap<PhotoId, String> = rejected
                        .iter()
                        .map(|r| (r.photo_id, r.reason.clone()))
                        .collect();
                    let scoped: Vec<&Subject> = subjects
                        .iter()
                        .filter(|s| reasons.contains_key(&s.photo_id))
                        .collect();

                    tracing::info!(photos = scoped.len(), "Retrying rejected photo names once");

                    report.rejected_after_retry = match self.request(context, &scoped, &reasons).await {
                        Ok(names) => screen(&scoped, names, &mut accepted),
                        Err(e) => {
                            tracing::warn!(error = %e, "Naming retry failed");
                            rejected
                        }
                    };
                    NamingState::Retried
                }
                NamingState::Retried => NamingState::Final,
                NamingState::Final => break,
            };
        }

        let (names, sources) = select_and_deduplicate(&subjects, &accepted);
        report.sources = sources;

        tracing::info!(
            photos = names.len(),
            suggested = report.sources.values().filter(|s| **s == SlugSource::Suggested).count(),
            retried = report.retried,
            "Photo names assigned"
        );

        NamingResult { names, report }
    }

    async fn request(
        &self,
        context: &PipelineContext,
        subjects: &[&Subject<'_>],
        reasons: &BTreeMap<PhotoId, String>,
    ) -> Result<Vec<(PhotoId, Option<String>)>, StageError> {
        let prompt_rows: Vec<NamingPrompt<'_>> = subjects
            .iter()
            .map(|s| NamingPrompt {
                photo_id: s.photo_id,
                note_text: s.note.map(|n| n.description.as_str()),
                metadata_summary: s.metadata_summary.clone(),
                rejection: reasons.get(&s.photo_id).map(String::as_str),
            })
            .collect();

        let request = ClassifierRequest::text(
            CallPurpose::SuggestPhotoNames,
            prompts::suggest_photo_names(&prompt_rows),
            context.timeouts.naming(),
        );
        let text = call_with_timeout(context.classifier.as_ref(), request).await?;

        let names = match decode::<RawNames>(&text)? {
            RawNames::List(names) | RawNames::Wrapped { names } => names,
        };
        Ok(names
            .into_iter()
            .filter_map(|n| coerce_id(&n.photo_id).map(|id| (id, n.suggested_name)))
            .collect())
    }
}

fn subjects<'a>(context: &'a PipelineContext, assignments: &AssignmentMap) -> Vec<Subject<'a>> {
    let mut note_of: BTreeMap<PhotoId, NoteId> = BTreeMap::new();
    for (&note_id, assignment) in assignments {
        for &photo_id in &assignment.photo_ids {
            note_of.entry(photo_id).or_insert(note_id);
        }
    }

    context
        .photo_filenames
        .iter()
        .map(|(&photo_id, filename)| Subject {
            photo_id,
            note: note_of.get(&photo_id).and_then(|id| context.note(*id)),
            filename,
            metadata_summary: context.metadata_or_unknown(photo_id).summary(),
        })
        .collect()
}

/// Accept valid suggestions for requested photos; return the rejections
///
/// A requested photo with no suggestion counts as rejected.
fn screen(
    requested: &[&Subject<'_>],
    names: Vec<(PhotoId, Option<String>)>,
    accepted: &mut BTreeMap<PhotoId, String>,
) -> Vec<RejectedName> {
    let mut suggestions: BTreeMap<PhotoId, String> = BTreeMap::new();
    for (photo_id, name) in names {
        if let Some(name) = name {
            suggestions.entry(photo_id).or_insert(name);
        }
    }

    let mut rejected = Vec::new();
    for subject in requested {
        let Some(raw) = suggestions.remove(&subject.photo_id) else {
            rejected.push(RejectedName {
                photo_id: subject.photo_id,
                suggestion: None,
                reason: "no name was suggested for this photo".to_string(),
            });
            continue;
        };

        let slug = slug::sanitize(&raw);
        match slug::rejection_reason(&slug) {
            None => {
                accepted.insert(subject.photo_id, slug);
            }
            Some(reason) => {
                tracing::debug!(photo_id = subject.photo_id, suggestion = %raw, reason = %reason, "Name rejected");
                rejected.push(RejectedName {
                    photo_id: subject.photo_id,
                    suggestion: Some(raw),
                    reason,
                });
            }
        }
    }
    rejected
}

fn select_and_deduplicate(
    subjects: &[Subject<'_>],
    accepted: &BTreeMap<PhotoId, String>,
) -> (BTreeMap<PhotoId, String>, BTreeMap<PhotoId, SlugSource>) {
    let mut registry = SlugRegistry::new();
    let mut names = BTreeMap::new();
    let mut sources = BTreeMap::new();

    for subject in subjects {
        let from_note = subject.note.and_then(|n| slug::slug_from_text(&n.description));
        let from_filename = slug::slug_from_filename(subject.filename);

        let (candidate, source) = if let Some(suggested) = accepted.get(&subject.photo_id) {
            (suggested.clone(), SlugSource::Suggested)
        } else if let Some(slug) = from_note.clone() {
            (slug, SlugSource::NoteDescription)
        } else if let Some(slug) = from_filename.clone() {
            (slug, SlugSource::OriginalFilename)
        } else {
            (format!("photo-{}", subject.photo_id), SlugSource::PhotoId)
        };

        let location = subject.note.map(|n| n.location.as_str());
        let keywords = slug::keyword_tokens(
            [from_note.as_deref(), from_filename.as_deref(), location]
                .into_iter()
                .flatten(),
        );

        let name = registry.claim(&candidate, subject.photo_id, &keywords);
        names.insert(subject.photo_id, name);
        sources.insert(subject.photo_id, source);
    }

    (names, sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::fixtures;
    use crate::pipeline::tier1::classifier::Classifier;
    use crate::pipeline::types::{ClassifierError, NoteAssignment, Sentiment};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Replies in order; fails once replies run out
    struct Sequence {
        replies: Vec<&'static str>,
        calls: AtomicUsize,
    }

    impl Sequence {
        fn new(replies: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                replies,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Classifier for Sequence {
        fn name(&self) -> &'static str {
            "sequence"
        }

        async fn complete(&self, _request: &ClassifierRequest) -> Result<String, ClassifierError> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .get(index)
                .map(|r| r.to_string())
                .ok_or_else(|| ClassifierError::Transport("no more replies".to_string()))
        }
    }

    const NOTES: &[(u32, &str)] = &[
        (1, "1. Blocked fire exit in stairwell"),
        (2, "2. Good housekeeping in the stores area"),
    ];

    fn assignments() -> AssignmentMap {
        let mut map = AssignmentMap::new();
        map.insert(1, NoteAssignment::new(vec![1], "a", 0.95));
        map.insert(2, NoteAssignment::new(vec![2], "b", 0.95));
        map
    }

    #[tokio::test]
    async fn test_accepted_suggestions_used() {
        let classifier = Sequence::new(vec![
            r#"[{"photoId": 1, "suggestedName": "Blocked Fire Exit"}, {"photoId": 2, "suggestedName": "tidy-stores-area"}]"#,
        ]);
        let context = fixtures::context_with(classifier.clone(), &[Sentiment::Problem, Sentiment::GoodPractice], NOTES);

        let result = PhotoNamer::new().name_photos(&context, &assignments()).await;
        assert_eq!(result.names[&1], "blocked-fire-exit");
        assert_eq!(result.names[&2], "tidy-stores-area");
        assert!(!result.report.retried);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejection_retries_once_scoped() {
        let classifier = Sequence::new(vec![
            r#"[{"photoId": 1, "suggestedName": "blocked-fire-exit"}, {"photoId": 2, "suggestedName": "positive-observation"}]"#,
            r#"[{"photoId": 2, "suggestedName": "good-practice"}]"#,
            r#"[{"photoId": 2, "suggestedName": "never-requested"}]"#,
        ]);
        let context = fixtures::context_with(classifier.clone(), &[Sentiment::Problem, Sentiment::GoodPractice], NOTES);

        let result = PhotoNamer::new().name_photos(&context, &assignments()).await;
        assert!(result.report.retried);
        assert_eq!(result.report.rejected_initial.len(), 1);
        assert_eq!(result.report.rejected_after_retry.len(), 1);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.names[&2], "housekeeping-stores-area");
        assert_eq!(result.report.sources[&2], SlugSource::NoteDescription);
    }

    #[tokio::test]
    async fn test_call_failure_skips_retry() {
        let context = fixtures::context(&[Sentiment::Problem, Sentiment::GoodPractice], NOTES);
        let result = PhotoNamer::new().name_photos(&context, &assignments()).await;

        assert!(!result.report.retried);
        assert_eq!(result.names[&1], "blocked-fire-exit-stairwell");
        assert_eq!(result.names[&2], "housekeeping-stores-area");
    }

    #[tokio::test]
    async fn test_unassigned_photo_falls_back_to_photo_id() {
        let context = fixtures::context(&[Sentiment::Neutral], &[]);
        let result = PhotoNamer::new().name_photos(&context, &AssignmentMap::new()).await;
        assert_eq!(result.names[&1], "photo-1");
        assert_eq!(result.report.sources[&1], SlugSource::PhotoId);
    }

    #[tokio::test]
    async fn test_identical_notes_get_distinct_names() {
        let notes: &[(u32, &str)] = &[(1, "Trailing cable at level 2"), (2, "Trailing cable at level 2")];
        let context = fixtures::context(&[Sentiment::Problem, Sentiment::Problem], notes);
        let result = PhotoNamer::new().name_photos(&context, &assignments()).await;

        assert_ne!(result.names[&1], result.names[&2]);
        assert!(result.names.values().all(|n| n.starts_with("trailing-cable-level")));
    }
}
