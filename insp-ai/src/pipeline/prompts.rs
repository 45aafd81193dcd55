// Classifier Prompts
//
// Every external call states the exact JSON shape it expects back. Responses
// are still decoded leniently; the shapes here only make success more likely.

use crate::pipeline::context::PipelineContext;
use crate::pipeline::types::{AssignmentMap, PhotoId, ValidationReport};
use std::fmt::Write;

const HARD_RULES: &str = "\
HARD RULES:
- Every photo id must appear in exactly one note's photoIds.
- Every note must receive at least one photo.
- Multiple photos may map to one note.
- A photo with sentiment \"problem\" must not document a positive note; a photo \
with sentiment \"good_practice\" must not document a negative note. \"neutral\" photos fit any note.";

const ASSIGNMENT_SHAPE: &str = r#"[{"noteId": 1, "photoIds": [1, 2], "reasoning": "...", "confidence": 0.85}]"#;

pub fn analyze_photo() -> String {
    r#"You are a construction site safety inspector reviewing one site photograph.
Describe what the photo shows. Respond with a single JSON object and nothing else:
{
  "location": "where on site the photo was taken",
  "equipment": ["visible equipment, PPE, tools"],
  "people": ["short description of each person visible"],
  "safetyIssues": ["each safety problem visible"],
  "conditions": ["weather, lighting, housekeeping state"],
  "confidence": "high | medium | low",
  "sentiment": "problem | good_practice | neutral"
}
Use "problem" when the photo documents a hazard or non-compliance, "good_practice" when it
documents something done well, and "neutral" when it is neither."#
        .to_string()
}

/// One line per photo: id, filename, metadata summary
fn photo_lines(context: &PipelineContext, photo_ids: &[PhotoId]) -> String {
    let mut out = String::new();
    for &photo_id in photo_ids {
        let filename = context
            .photo_filenames
            .get(&photo_id)
            .map(String::as_str)
            .unwrap_or("");
        let _ = writeln!(
            out,
            "- Photo {} ({}): {}",
            photo_id,
            filename,
            context.metadata_or_unknown(photo_id).summary()
        );
    }
    out
}

/// One line per note: id, polarity, issue type, location, text
fn note_lines(context: &PipelineContext) -> String {
    let mut out = String::new();
    for note in &context.notes {
        let _ = writeln!(
            out,
            "- Note {} [{}; {}; location: {}]: {}",
            note.note_id,
            if note.is_positive { "positive" } else { "negative" },
            note.issue_type.as_str(),
            note.location,
            note.description
        );
    }
    out
}

fn assignment_lines(assignments: &AssignmentMap) -> String {
    let mut out = String::new();
    for (note_id, assignment) in assignments {
        let photos = if assignment.photo_ids.is_empty() {
            "none".to_string()
        } else {
            assignment
                .photo_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let _ = writeln!(
            out,
            "- Note {}: photos [{}] (confidence {:.2})",
            note_id, photos, assignment.confidence
        );
    }
    out
}

/// Numbered strategy overflow: place leftover photos into existing notes
pub fn match_excess_photos(
    context: &PipelineContext,
    unmatched: &[PhotoId],
    current: &AssignmentMap,
) -> String {
    format!(
        "You are matching construction site photos to inspection notes.\n\
Most photos were already paired with notes in order. Assign each of the REMAINING photos \
below to the single best note.\n\n\
REMAINING PHOTOS:\n{}\n\
NOTES:\n{}\n\
CURRENT ASSIGNMENTS:\n{}\n\
Only use the remaining photo ids. Respect sentiment: problem photos go to negative notes, \
good_practice photos to positive notes.\n\
Respond with a JSON array and nothing else:\n{}",
        photo_lines(context, unmatched),
        note_lines(context),
        assignment_lines(current),
        ASSIGNMENT_SHAPE
    )
}

/// Unnumbered strategy: one call for all photos and notes
pub fn match_all_photos(context: &PipelineContext) -> String {
    let photo_ids: Vec<PhotoId> = context.photo_ids().collect();
    format!(
        "You are matching construction site photos to inspection notes.\n\n\
PHOTOS:\n{}\n\
NOTES:\n{}\n\
Think step by step for each photo:\n\
1. Sentiment compatibility first.\n\
2. Then location.\n\
3. Then issue type.\n\
4. Then keyword overlap with the note text.\n\n\
{}\n\n\
Respond with a JSON array with one entry per note and nothing else:\n{}",
        photo_lines(context, &photo_ids),
        note_lines(context),
        HARD_RULES,
        ASSIGNMENT_SHAPE
    )
}

/// Independent re-check of a flawed assignment
pub fn verify_assignments(
    context: &PipelineContext,
    current: &AssignmentMap,
    report: &ValidationReport,
) -> String {
    let photo_ids: Vec<PhotoId> = context.photo_ids().collect();

    let mut findings = String::new();
    for error in &report.errors {
        let _ = writeln!(findings, "- ERROR: {}", error);
    }
    for warning in &report.warnings {
        let _ = writeln!(findings, "- WARNING: {}", warning);
    }

    format!(
        "You are independently verifying photo-to-note assignments for a site inspection.\n\n\
PHOTOS:\n{}\n\
NOTES:\n{}\n\
CURRENT ASSIGNMENTS:\n{}\n\
PROBLEMS FOUND:\n{}\n\
{}\n\n\
Correct the assignments so that every problem is resolved. Explain every correction you make.\n\
Respond with a JSON object and nothing else:\n\
{{\"correctedAssignments\": {}, \"fixesApplied\": [\"Moved photo 3 from note 1 to note 2 because ...\"]}}",
        photo_lines(context, &photo_ids),
        note_lines(context),
        assignment_lines(current),
        findings,
        HARD_RULES,
        ASSIGNMENT_SHAPE
    )
}

/// Per-photo input to the naming call
pub struct NamingPrompt<'a> {
    pub photo_id: PhotoId,
    pub note_text: Option<&'a str>,
    pub metadata_summary: String,
    /// Present only on the retry: why the previous suggestion was rejected
    pub rejection: Option<&'a str>,
}

const NAMING_RULES: &str = "\
Each name must be lowercase words joined by hyphens, 2 to 4 words, describing the specific \
subject (for example \"missing-guardrail-level3\" or \"blocked-fire-exit\"). Do not use generic \
names such as \"photo\", \"image\", \"observation\", \"positive-observation\" or \"safety-issue\".";

pub fn suggest_photo_names(photos: &[NamingPrompt<'_>]) -> String {
    let retry = photos.iter().any(|p| p.rejection.is_some());

    let mut lines = String::new();
    for photo in photos {
        let _ = write!(lines, "- Photo {}: {}", photo.photo_id, photo.metadata_summary);
        if let Some(text) = photo.note_text {
            let _ = write!(lines, "; note: {}", text);
        }
        if let Some(reason) = photo.rejection {
            let _ = write!(lines, "; PREVIOUS NAME REJECTED: {}", reason);
        }
        lines.push('\n');
    }

    let intro = if retry {
        "Your previous file name suggestions for these photos were rejected. Suggest better names."
    } else {
        "Suggest a short descriptive file name for each construction site photo."
    };

    format!(
        "{}\n\n{}\n\nPHOTOS:\n{}\n\
Respond with a JSON array and nothing else:\n\
[{{\"photoId\": 1, \"suggestedName\": \"missing-guardrail-level3\"}}]",
        intro, NAMING_RULES, lines
    )
}
