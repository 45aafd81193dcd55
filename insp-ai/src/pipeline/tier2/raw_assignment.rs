// Tier 2: Raw Assignment Payloads
//
// Classifier-shaped assignment lists, shared by the matcher and verifier.
// Ids may arrive as numbers or strings ("Photo 3"), confidence as a number
// or a label, and the list may be bare or wrapped in an object.

use crate::pipeline::context::PipelineContext;
use crate::pipeline::types::{AssignmentMap, NoteAssignment, NoteId, PhotoId};
use serde::Deserialize;
use serde_json::Value;

/// A bare list or `{"assignments": [...]}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawAssignments {
    List(Vec<RawAssignment>),
    Wrapped {
        #[serde(alias = "correctedAssignments", alias = "matches")]
        assignments: Vec<RawAssignment>,
    },
}

impl RawAssignments {
    pub fn into_vec(self) -> Vec<RawAssignment> {
        match self {
            Self::List(items) => items,
            Self::Wrapped { assignments } => assignments,
        }
    }
}

/// One classifier-proposed entry
#[derive(Debug, Clone, Deserialize)]
pub struct RawAssignment {
    #[serde(rename = "noteId", alias = "note_id", alias = "note", default)]
    note_id: Value,
    #[serde(rename = "photoIds", alias = "photo_ids", alias = "photos", default)]
    photo_ids: Value,
    #[serde(alias = "reason", default)]
    reasoning: Option<String>,
    #[serde(default)]
    confidence: Option<Value>,
}

/// A raw entry after id coercion and range filtering
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEntry {
    pub note_id: NoteId,
    pub photo_ids: Vec<PhotoId>,
    pub reasoning: String,
    pub confidence: f64,
}

/// First run of digits in a number or string
pub fn coerce_id(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => {
            let digits: String = s
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

fn coerce_id_list(value: &Value) -> Vec<u32> {
    match value {
        Value::Array(items) => items.iter().filter_map(coerce_id).collect(),
        Value::String(s) => s
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter_map(|part| coerce_id(&Value::String(part.to_string())))
            .collect(),
        other => coerce_id(other).into_iter().collect(),
    }
}

/// Numeric confidence (clamped; percentages scaled) or a high/medium/low label
pub fn coerce_confidence(value: Option<&Value>, default: f64) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "high" => Some(0.9),
            "medium" | "moderate" => Some(0.7),
            "low" => Some(0.5),
            other => other.trim_end_matches('%').parse::<f64>().ok(),
        },
        _ => None,
    };

    match parsed {
        Some(c) if c.is_finite() && c > 1.0 && c <= 100.0 => c / 100.0,
        Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
        _ => default,
    }
}

impl RawAssignment {
    /// Coerce ids, dropping entries for unknown notes and out-of-range photos
    pub fn parse(&self, context: &PipelineContext, default_confidence: f64) -> Option<ParsedEntry> {
        let Some(note_id) = coerce_id(&self.note_id) else {
            tracing::warn!(note_id = %self.note_id, "Discarding assignment with unreadable note id");
            return None;
        };
        if context.note(note_id).is_none() {
            tracing::warn!(note_id, "Discarding assignment for unknown note");
            return None;
        }

        let mut photo_ids = Vec::new();
        for photo_id in coerce_id_list(&self.photo_ids) {
            if !context.has_photo(photo_id) {
                tracing::warn!(note_id, photo_id, "Discarding out-of-range photo id");
                continue;
            }
            if !photo_ids.contains(&photo_id) {
                photo_ids.push(photo_id);
            }
        }

        Some(ParsedEntry {
            note_id,
            photo_ids,
            reasoning: self
                .reasoning
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .unwrap_or("No reasoning given")
                .to_string(),
            confidence: coerce_confidence(self.confidence.as_ref(), default_confidence),
        })
    }
}

/// Parse every entry, keeping input order
pub fn parse_entries(
    raw: &[RawAssignment],
    context: &PipelineContext,
    default_confidence: f64,
) -> Vec<ParsedEntry> {
    raw.iter()
        .filter_map(|entry| entry.parse(context, default_confidence))
        .collect()
}

/// Build a complete map with one entry per input note
///
/// Repeated entries for one note are merged. Notes the classifier skipped get
/// an empty placeholder with confidence 0.0. Photos assigned to several notes
/// are kept as-is so validation can report them.
pub fn complete_map(entries: Vec<ParsedEntry>, context: &PipelineContext) -> AssignmentMap {
    let mut map = AssignmentMap::new();

    for entry in entries {
        match map.get_mut(&entry.note_id) {
            Some(existing) => {
                for photo_id in entry.photo_ids {
                    if !existing.photo_ids.contains(&photo_id) {
                        existing.photo_ids.push(photo_id);
                    }
                }
                existing.confidence = existing.confidence.min(entry.confidence);
                existing.reasoning = format!("{}; {}", existing.reasoning, entry.reasoning);
            }
            None => {
                map.insert(
                    entry.note_id,
                    NoteAssignment::new(entry.photo_ids, entry.reasoning, entry.confidence),
                );
            }
        }
    }

    for note in &context.notes {
        map.entry(note.note_id)
            .or_insert_with(|| NoteAssignment::placeholder("Not assigned by classifier", 0.0));
    }

    map
}
