// Tier 1: Note Parser
//
// Concept: Convert one raw numbered note into structured intent, locally and
// deterministically (no external calls).
//
// Algorithm:
// 1. Strip the ordinal prefix ("3.", "3)", "3 -", "Note 3", "Observation 3")
// 2. Location: earliest known site-location phrase, or "level/floor/zone N"
// 3. Issue type: category with most keyword hits (ties -> declaration order)
// 4. Polarity: positive cues must outnumber problem cues
// 5. Keywords: meaningful lowercase tokens, deduplicated in order
// 6. Required elements: equipment the note mentions

use crate::pipeline::types::{IssueType, ObservationNote, StructuredNote};

const LOCATION_PHRASES: &[&str] = &[
    "site entrance",
    "loading bay",
    "plant room",
    "lift shaft",
    "car park",
    "stairwell",
    "staircase",
    "scaffold",
    "roof",
    "basement",
    "warehouse",
    "office",
    "kitchen",
    "canteen",
    "welfare",
    "corridor",
    "compound",
    "yard",
    "workshop",
    "excavation",
    "entrance",
    "stairs",
];

/// Words followed by an identifier ("level 3", "zone B")
const LOCATION_QUALIFIERS: &[&str] = &["level", "floor", "zone", "block", "bay", "area", "gridline"];

const ISSUE_KEYWORDS: &[(IssueType, &[&str])] = &[
    (
        IssueType::Ppe,
        &[
            "ppe", "helmet", "hard hat", "hardhat", "hi-vis", "hi vis", "high visibility", "vest",
            "gloves", "goggles", "glasses", "boots", "ear protection", "ear defenders",
            "respirator", "mask",
        ],
    ),
    (
        IssueType::Barriers,
        &[
            "barrier", "barricade", "fence", "fencing", "guardrail", "guard rail", "cordon",
            "exclusion zone", "signage", "sign", "heras",
        ],
    ),
    (
        IssueType::Housekeeping,
        &[
            "housekeeping", "tidy", "untidy", "clutter", "cluttered", "debris", "rubbish", "waste",
            "trip hazard", "storage", "stacked", "spill", "mess", "walkway",
        ],
    ),
    (
        IssueType::Electrical,
        &[
            "electrical", "cable", "cables", "extension lead", "socket", "wire", "wiring",
            "generator", "rcd", "distribution board", "power",
        ],
    ),
    (
        IssueType::WorkingAtHeight,
        &[
            "height", "ladder", "scaffold", "scaffolding", "harness", "edge protection",
            "leading edge", "roof", "mewp", "platform", "fall", "lanyard", "handrail", "toe board",
        ],
    ),
    (
        IssueType::Emergency,
        &[
            "fire", "extinguisher", "emergency", "fire exit", "escape route", "first aid",
            "evacuation", "assembly point", "alarm", "eyewash",
        ],
    ),
];

const EQUIPMENT: &[&str] = &[
    "harness", "lanyard", "helmet", "hard hat", "hi-vis", "vest", "gloves", "goggles", "glasses",
    "boots", "ear defenders", "respirator", "guardrail", "handrail", "toe board", "barrier",
    "fence", "signage", "extinguisher", "first aid kit", "ladder", "scaffold",
];

const POSITIVE_CUES: &[&str] = &[
    "good", "well", "correct", "correctly", "properly", "compliant", "tidy", "excellent",
    "commend", "commended", "positive", "neat", "organised", "organized", "maintained",
    "secured", "adequate", "appropriate", "great", "clear", "worn", "wearing",
];

const NEGATIVE_CUES: &[&str] = &[
    "missing", "no", "not", "without", "damaged", "unsafe", "blocked", "exposed", "lack",
    "lacking", "broken", "loose", "unsecured", "uncovered", "hazard", "poor", "inadequate",
    "failed", "defect", "defective", "obstructed", "overloaded", "expired", "incorrect",
    "improper", "unguarded", "untidy", "cluttered", "risk", "isn", "aren", "wasn", "don",
    "doesn", "needs", "must",
];

const POSITIVE_PHRASES: &[&str] = &["good practice", "in place", "well done", "well maintained"];

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "was", "were", "are", "has", "have", "had", "this", "that",
    "there", "their", "from", "into", "onto", "been", "being", "but", "not", "all", "any",
    "out", "off", "our", "its", "his", "her", "they", "them", "which", "who", "while", "where",
    "when", "also", "very", "some", "near", "than", "then", "should", "would", "could", "will",
    "note", "observation", "photo", "noted", "seen", "observed",
];

/// Local note parser
#[derive(Debug, Default, Clone)]
pub struct NoteParser;

impl NoteParser {
    /// Parse one note
    pub fn parse(&self, note: &ObservationNote) -> StructuredNote {
        let (ordinal, description) = match ordinal_prefix(&note.text) {
            Some((number, rest)) => (Some(number), rest.trim().to_string()),
            None => (None, note.text.trim().to_string()),
        };

        let lower = description.to_lowercase();
        let tokens = tokenize(&lower);

        let structured = StructuredNote {
            note_id: note.id,
            text: note.text.clone(),
            location: detect_location(&lower, &tokens),
            issue_type: classify_issue(&lower, &tokens),
            keywords: keywords(&tokens),
            required_elements: required_elements(&lower, &tokens),
            is_positive: is_positive(&lower, &tokens),
            ordinal,
            description,
        };

        tracing::debug!(
            note_id = note.id,
            issue_type = structured.issue_type.as_str(),
            is_positive = structured.is_positive,
            location = %structured.location,
            "Parsed note"
        );

        structured
    }

    /// Parse notes, preserving input order
    pub fn parse_all(&self, notes: &[ObservationNote]) -> Vec<StructuredNote> {
        notes.iter().map(|note| self.parse(note)).collect()
    }
}

/// Recognize an explicit ordinal prefix
///
/// Accepted forms: `"<n>."`, `"<n>)"`, `"<n>:"`, `"<n> -"`, `"note <n>"`,
/// `"observation <n>"` (case-insensitive, optional `#`). Returns the number
/// and the remaining text.
pub fn ordinal_prefix(text: &str) -> Option<(u32, &str)> {
    let trimmed = text.trim_start();
    let lower = trimmed.to_ascii_lowercase();

    for word in ["observation", "note"] {
        if lower.starts_with(word) {
            let after = trimmed[word.len()..].trim_start();
            let after = after.strip_prefix('#').unwrap_or(after);
            let (number, rest) = leading_number(after)?;
            let rest = rest
                .trim_start()
                .trim_start_matches(['.', ':', ')', '-'])
                .trim_start();
            return Some((number, rest));
        }
    }

    let (number, rest) = leading_number(trimmed)?;
    for marker in ['.', ')', ':'] {
        if let Some(after) = rest.strip_prefix(marker) {
            // "3.5m" is a measurement, not a prefix
            if after.starts_with(|c: char| c.is_ascii_digit()) {
                return None;
            }
            return Some((number, after.trim_start()));
        }
    }
    rest.trim_start()
        .strip_prefix('-')
        .map(|after| (number, after.trim_start()))
}

fn leading_number(text: &str) -> Option<(u32, &str)> {
    let digits = text.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 || digits > 6 {
        return None;
    }
    let number = text[..digits].parse().ok()?;
    Some((number, &text[digits..]))
}

/// Lowercase alphanumeric tokens (hyphenated words kept whole)
fn tokenize(lower: &str) -> Vec<String> {
    lower
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .map(|t| t.trim_matches('-'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Phrase match: multi-word phrases by substring, single words by token
fn mentions(lower: &str, tokens: &[String], phrase: &str) -> bool {
    if phrase.contains(' ') {
        lower.contains(phrase)
    } else {
        tokens.iter().any(|t| t == phrase)
    }
}

fn detect_location(lower: &str, tokens: &[String]) -> String {
    let mut best: Option<(usize, String)> = None;
    let mut consider = |position: usize, label: String| {
        if best.as_ref().map_or(true, |(p, _)| position < *p) {
            best = Some((position, label));
        }
    };

    for phrase in LOCATION_PHRASES {
        if mentions(lower, tokens, phrase) {
            if let Some(position) = lower.find(phrase) {
                consider(position, phrase.to_string());
            }
        }
    }

    for window in tokens.windows(2) {
        if LOCATION_QUALIFIERS.contains(&window[0].as_str()) && window[1].len() <= 4 {
            let label = format!("{} {}", window[0], window[1]);
            if let Some(position) = lower.find(&label) {
                consider(position, label);
            }
        }
    }

    best.map(|(_, label)| label)
        .unwrap_or_else(|| "unspecified".to_string())
}

fn classify_issue(lower: &str, tokens: &[String]) -> IssueType {
    let mut best = (IssueType::Other, 0usize);
    for (issue_type, words) in ISSUE_KEYWORDS {
        let hits = words.iter().filter(|w| mentions(lower, tokens, w)).count();
        if hits > best.1 {
            best = (*issue_type, hits);
        }
    }
    best.0
}

fn is_positive(lower: &str, tokens: &[String]) -> bool {
    let mut positive = tokens
        .iter()
        .filter(|t| POSITIVE_CUES.contains(&t.as_str()))
        .count();
    let negative = tokens
        .iter()
        .filter(|t| NEGATIVE_CUES.contains(&t.as_str()))
        .count();

    positive += 2 * POSITIVE_PHRASES
        .iter()
        .filter(|p| lower.contains(*p))
        .count();

    positive > negative
}

fn keywords(tokens: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for token in tokens {
        if token.chars().count() < 3
            || token.chars().all(|c| c.is_ascii_digit())
            || STOP_WORDS.contains(&token.as_str())
        {
            continue;
        }
        if !seen.contains(token) {
            seen.push(token.clone());
        }
    }
    seen
}

fn required_elements(lower: &str, tokens: &[String]) -> Vec<String> {
    EQUIPMENT
        .iter()
        .filter(|item| mentions(lower, tokens, item))
        .map(|item| item.to_string())
        .collect()
}
