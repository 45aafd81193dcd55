// Shared Types and Data Contracts
//
// This module defines the data contracts between the three tiers of the
// assignment pipeline:
// - Tier 1 outputs: PhotoMetadata (per photo) and StructuredNote (per note)
// - Tier 2 output: AssignmentMap (note -> photos)
// - Tier 3 outputs: ValidationReport, verified/repaired AssignmentMap
// - Final output: OrchestrationResult (assignments, photo names, diagnostics)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// 1-based ordinal position of a photo within its batch
pub type PhotoId = u32;

/// Inspector-assigned note number (not necessarily contiguous)
pub type NoteId = u32;

// ============================================================================
// Inputs
// ============================================================================

/// A single field photograph
#[derive(Clone)]
pub struct Photo {
    pub id: PhotoId,
    pub filename: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl Photo {
    pub fn new(
        id: PhotoId,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        Self {
            id,
            filename: filename.into(),
            mime_type: mime_type.into(),
            content,
        }
    }
}

impl fmt::Debug for Photo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Photo")
            .field("id", &self.id)
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.content.len())
            .finish()
    }
}

/// A raw numbered inspection note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationNote {
    pub id: NoteId,
    pub text: String,
}

impl ObservationNote {
    pub fn new(id: NoteId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }
}

// ============================================================================
// Tier 1 Outputs
// ============================================================================

/// Classifier-assigned polarity of a photo's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Problem,
    GoodPractice,
    Neutral,
}

impl Sentiment {
    /// Lenient parse of classifier labels
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "problem" | "negative" | "issue" | "hazard" | "unsafe" | "concern" => Self::Problem,
            "good_practice" | "good" | "positive" | "safe" | "compliant" => Self::GoodPractice,
            _ => Self::Neutral,
        }
    }

    /// Whether a photo with this sentiment may document a note of the given polarity
    pub fn is_compatible_with(self, note_is_positive: bool) -> bool {
        match self {
            Self::Neutral => true,
            Self::Problem => !note_is_positive,
            Self::GoodPractice => note_is_positive,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Problem => "problem",
            Self::GoodPractice => "good_practice",
            Self::Neutral => "neutral",
        }
    }
}

/// Classifier self-reported certainty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "high" | "very high" | "certain" => Self::High,
            "medium" | "moderate" | "med" => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// Visual metadata for one photo (produced once, never mutated)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoMetadata {
    pub location: String,
    pub equipment: Vec<String>,
    pub people: Vec<String>,
    pub safety_issues: Vec<String>,
    pub conditions: Vec<String>,
    pub confidence: ConfidenceLevel,
    pub sentiment: Sentiment,
}

impl PhotoMetadata {
    /// Metadata used when the classifier cannot describe a photo
    pub fn unknown() -> Self {
        Self {
            location: "unknown".to_string(),
            equipment: Vec::new(),
            people: Vec::new(),
            safety_issues: Vec::new(),
            conditions: Vec::new(),
            confidence: ConfidenceLevel::Low,
            sentiment: Sentiment::Neutral,
        }
    }

    /// One-line description used in matching prompts
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("location: {}", self.location)];
        if !self.equipment.is_empty() {
            parts.push(format!("equipment: {}", self.equipment.join(", ")));
        }
        if !self.safety_issues.is_empty() {
            parts.push(format!("issues: {}", self.safety_issues.join(", ")));
        }
        if !self.conditions.is_empty() {
            parts.push(format!("conditions: {}", self.conditions.join(", ")));
        }
        parts.push(format!("sentiment: {}", self.sentiment.as_str()));
        parts.join("; ")
    }
}

/// Safety issue category of a note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Ppe,
    Barriers,
    Housekeeping,
    Electrical,
    WorkingAtHeight,
    Emergency,
    Other,
}

impl IssueType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ppe => "ppe",
            Self::Barriers => "barriers",
            Self::Housekeeping => "housekeeping",
            Self::Electrical => "electrical",
            Self::WorkingAtHeight => "working_at_height",
            Self::Emergency => "emergency",
            Self::Other => "other",
        }
    }
}

/// Structured intent extracted locally from one note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredNote {
    pub note_id: NoteId,
    /// Raw note text (prefix included)
    pub text: String,
    /// Note text with any ordinal prefix removed
    pub description: String,
    /// Ordinal written in front of the note, if any
    pub ordinal: Option<u32>,
    pub location: String,
    pub issue_type: IssueType,
    pub keywords: Vec<String>,
    pub required_elements: Vec<String>,
    pub is_positive: bool,
}

// ============================================================================
// Pattern Detection
// ============================================================================

/// Matching strategy, selected once per run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Photos follow notes one-to-one in order
    Numbered,
    /// Open-ended matching
    Unnumbered,
}

/// Why a strategy was selected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDecision {
    pub strategy: MatchStrategy,
    pub ratio: Option<f64>,
    pub prefixed_share: Option<f64>,
    pub reason: String,
}

// ============================================================================
// Tier 2 Output: Assignments
// ============================================================================

/// Photos assigned to one note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteAssignment {
    pub photo_ids: Vec<PhotoId>,
    pub reasoning: String,
    pub confidence: f64,
}

impl NoteAssignment {
    pub fn new(photo_ids: Vec<PhotoId>, reasoning: impl Into<String>, confidence: f64) -> Self {
        Self {
            photo_ids,
            reasoning: reasoning.into(),
            confidence,
        }
    }

    /// Zero-photo entry kept so later stages can still target the note
    pub fn placeholder(reasoning: impl Into<String>, confidence: f64) -> Self {
        Self::new(Vec::new(), reasoning, confidence)
    }
}

/// noteId -> assignment; iteration order is ascending note id
pub type AssignmentMap = BTreeMap<NoteId, NoteAssignment>;

/// Result of the matching stage
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub assignments: AssignmentMap,
    pub strategy: MatchStrategy,
    /// True when an external call failed and a local result was used
    pub fallback_used: bool,
}

// ============================================================================
// Tier 3: Validation, Verification, Repair
// ============================================================================

/// A hard-constraint violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    DuplicatePhoto { photo_id: PhotoId, note_ids: Vec<NoteId> },
    MissingPhoto { photo_id: PhotoId },
    UnknownPhoto { photo_id: PhotoId, note_id: NoteId },
    EntryCountMismatch { expected: usize, actual: usize },
    EmptyNote { note_id: NoteId },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicatePhoto { photo_id, note_ids } => write!(
                f,
                "Photo {} assigned {} times (notes {})",
                photo_id,
                note_ids.len(),
                join_ids(note_ids)
            ),
            Self::MissingPhoto { photo_id } => write!(f, "Photo {} is not assigned to any note", photo_id),
            Self::UnknownPhoto { photo_id, note_id } => {
                write!(f, "Note {} references unknown photo {}", note_id, photo_id)
            }
            Self::EntryCountMismatch { expected, actual } => write!(
                f,
                "Expected {} assignment entries (one per note), found {}",
                expected, actual
            ),
            Self::EmptyNote { note_id } => write!(f, "Note {} has no photos", note_id),
        }
    }
}

/// A soft finding that never affects validity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
    LowConfidence { note_id: NoteId, confidence: f64 },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowConfidence { note_id, confidence } => write!(
                f,
                "Note {} assignment has low confidence ({:.2})",
                note_id, confidence
            ),
        }
    }
}

/// Complete validation report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn needs_verification(&self) -> bool {
        !self.errors.is_empty() || !self.warnings.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

/// What the Verifier did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerifierOutcome {
    /// Validator reported nothing to verify
    NotNeeded,
    /// Correction accepted
    Accepted {
        errors_before: usize,
        errors_after: usize,
        fixes_applied: Vec<String>,
    },
    /// Correction did not improve constraint satisfaction
    Rejected {
        errors_before: usize,
        errors_after: usize,
    },
    /// Call failed, timed out, or was unparseable
    Failed { error: String },
}

// ============================================================================
// Naming
// ============================================================================

/// Which priority tier produced a photo's final slug
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlugSource {
    Suggested,
    NoteDescription,
    OriginalFilename,
    PhotoId,
}

/// A classifier suggestion that failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedName {
    pub photo_id: PhotoId,
    pub suggestion: Option<String>,
    pub reason: String,
}

/// Naming diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamingReport {
    pub retried: bool,
    pub rejected_initial: Vec<RejectedName>,
    pub rejected_after_retry: Vec<RejectedName>,
    pub sources: BTreeMap<PhotoId, SlugSource>,
}

// ============================================================================
// Final Output
// ============================================================================

/// Reasoning retained per note for human triage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentReasoning {
    pub reasoning: String,
    pub confidence: f64,
}

/// Everything a reviewer needs to triage low-confidence matches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub photo_metadata: BTreeMap<PhotoId, PhotoMetadata>,
    pub structured_notes: BTreeMap<NoteId, StructuredNote>,
    pub assignment_reasoning: BTreeMap<NoteId, AssignmentReasoning>,
    pub validation: ValidationReport,
    pub pattern: PatternDecision,
    pub matching_fallback_used: bool,
    pub verification: VerifierOutcome,
    pub repairs: Vec<String>,
    pub naming: NamingReport,
    pub completed_at: DateTime<Utc>,
}

/// End-to-end orchestrator output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationResult {
    pub run_id: Uuid,
    pub assignments: BTreeMap<NoteId, Vec<PhotoId>>,
    pub photo_names: BTreeMap<PhotoId, String>,
    pub diagnostics: Diagnostics,
}

// ============================================================================
// External Calls
// ============================================================================

/// Which of the classifier's uses a request serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPurpose {
    AnalyzePhoto,
    MatchExcessPhotos,
    MatchAllPhotos,
    VerifyAssignments,
    SuggestPhotoNames,
}

/// Image attached to a classifier request
#[derive(Clone)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Uniform request contract: text prompt plus zero or more images
#[derive(Debug, Clone)]
pub struct ClassifierRequest {
    pub purpose: CallPurpose,
    pub prompt: String,
    pub images: Vec<ImagePayload>,
    pub timeout: Duration,
}

impl ClassifierRequest {
    pub fn text(purpose: CallPurpose, prompt: String, timeout: Duration) -> Self {
        Self {
            purpose,
            prompt,
            images: Vec::new(),
            timeout,
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Classifier transport failure (always recovered by the calling stage)
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClassifierError {
    #[error("Classifier request failed: {0}")]
    Transport(String),

    #[error("Classifier returned error status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Classifier call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Classifier returned an empty response")]
    EmptyResponse,

    #[error("Classifier not configured: {0}")]
    NotConfigured(String),
}

/// Classifier output that could not be decoded even after repair
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("No JSON object or array found in response")]
    NoJson,

    #[error("Response JSON did not match expected shape after repair: {message}")]
    Invalid { message: String },
}

/// Failure of a single external call site
#[derive(Debug, Clone, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

fn join_ids(ids: &[NoteId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentiment_labels() {
        assert_eq!(Sentiment::from_label("Problem"), Sentiment::Problem);
        assert_eq!(Sentiment::from_label("good-practice"), Sentiment::GoodPractice);
        assert_eq!(Sentiment::from_label("Good Practice"), Sentiment::GoodPractice);
        assert_eq!(Sentiment::from_label("hazard"), Sentiment::Problem);
        assert_eq!(Sentiment::from_label("???"), Sentiment::Neutral);
    }

    #[test]
    fn test_sentiment_compatibility() {
        assert!(Sentiment::Neutral.is_compatible_with(true));
        assert!(Sentiment::Neutral.is_compatible_with(false));
        assert!(Sentiment::Problem.is_compatible_with(false));
        assert!(!Sentiment::Problem.is_compatible_with(true));
        assert!(Sentiment::GoodPractice.is_compatible_with(true));
        assert!(!Sentiment::GoodPractice.is_compatible_with(false));
    }

    #[test]
    fn test_validation_error_messages() {
        let dup = ValidationError::DuplicatePhoto {
            photo_id: 2,
            note_ids: vec![1, 3],
        };
        assert_eq!(dup.to_string(), "Photo 2 assigned 2 times (notes 1, 3)");
        assert_eq!(
            ValidationError::EmptyNote { note_id: 4 }.to_string(),
            "Note 4 has no photos"
        );
    }

    #[test]
    fn test_photo_debug_hides_bytes() {
        let photo = Photo::new(1, "a.jpg", "image/jpeg", vec![0u8; 2048]);
        let rendered = format!("{:?}", photo);
        assert!(rendered.contains("bytes: 2048"));
    }
}
