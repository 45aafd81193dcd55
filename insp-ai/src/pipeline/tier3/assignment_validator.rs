// Tier 3: Assignment Validator
//
// Concept: Pure constraint check of an assignment map.
// Synchronization: Used after matching, on the verifier's proposal, and after
// fallback repair.
//
// Checks (all evaluated, none short-circuit):
// 1. Each photo 1..=photo_count appears exactly once (duplicates and
//    omissions reported per photo); ids outside the range are reported too
// 2. Entry count equals note count
// 3. Every entry has at least one photo
// 4. confidence < threshold -> warning only

use crate::pipeline::types::{
    AssignmentMap, NoteId, PhotoId, ValidationError, ValidationReport, ValidationWarning,
};
use std::collections::BTreeMap;

/// Assignment validator (Tier 3 concept)
///
/// **Legible Software Principle:**
/// - Independent module: no I/O, no classifier, no context
/// - Explicit synchronization: map + counts in, ValidationReport out
/// - Integrity: `valid` is true iff `errors` is empty
#[derive(Debug, Clone)]
pub struct AssignmentValidator {
    low_confidence_threshold: f64,
}

impl Default for AssignmentValidator {
    fn default() -> Self {
        Self {
            low_confidence_threshold: 0.7,
        }
    }
}

impl AssignmentValidator {
    pub fn new(low_confidence_threshold: f64) -> Self {
        Self {
            low_confidence_threshold,
        }
    }

    pub fn validate(
        &self,
        assignments: &AssignmentMap,
        photo_count: usize,
        note_count: usize,
    ) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // Check 1: photo coverage
        let holders = photo_holders(assignments);

        for photo_id in 1..=photo_count as PhotoId {
            match holders.get(&photo_id) {
                None => errors.push(ValidationError::MissingPhoto { photo_id }),
                Some(note_ids) if note_ids.len() > 1 => errors.push(ValidationError::DuplicatePhoto {
                    photo_id,
                    note_ids: note_ids.clone(),
                }),
                Some(_) => {}
            }
        }

        for (&photo_id, note_ids) in &holders {
            if photo_id == 0 || photo_id as usize > photo_count {
                for &note_id in note_ids {
                    errors.push(ValidationError::UnknownPhoto { photo_id, note_id });
                }
            }
        }

        // Check 2: one entry per note
        if assignments.len() != note_count {
            errors.push(ValidationError::EntryCountMismatch {
                expected: note_count,
                actual: assignments.len(),
            });
        }

        // Checks 3 + 4: per entry
        for (&note_id, assignment) in assignments {
            if assignment.photo_ids.is_empty() {
                errors.push(ValidationError::EmptyNote { note_id });
            }
            if assignment.confidence < self.low_confidence_threshold {
                warnings.push(ValidationWarning::LowConfidence {
                    note_id,
                    confidence: assignment.confidence,
                });
            }
        }

        tracing::debug!(
            entries = assignments.len(),
            photo_count,
            note_count,
            errors = errors.len(),
            warnings = warnings.len(),
            "Assignment validated"
        );

        ValidationReport {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

/// Photo id -> notes holding it, in ascending note order
pub fn photo_holders(assignments: &AssignmentMap) -> BTreeMap<PhotoId, Vec<NoteId>> {
    let mut holders: BTreeMap<PhotoId, Vec<NoteId>> = BTreeMap::new();
    for (&note_id, assignment) in assignments {
        for &photo_id in &assignment.photo_ids {
            holders.entry(photo_id).or_default().push(note_id);
        }
    }
    holders
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::NoteAssignment;

    fn map(entries: &[(NoteId, &[PhotoId], f64)]) -> AssignmentMap {
        entries
            .iter()
            .map(|(note_id, photos, confidence)| {
                (*note_id, NoteAssignment::new(photos.to_vec(), "test", *confidence))
            })
            .collect()
    }

    #[test]
    fn test_valid_assignment() {
        let report = AssignmentValidator::default().validate(
            &map(&[(1, &[1], 0.95), (2, &[2, 3], 0.9)]),
            3,
            2,
        );
        assert!(report.valid);
        assert!(report.errors.is_empty());
        assert!(report.warnings.is_empty());
        assert!(!report.needs_verification());
    }

    #[test]
    fn test_duplicate_and_missing_reported_individually() {
        let report = AssignmentValidator::default().validate(
            &map(&[(1, &[1, 2], 0.9), (2, &[2], 0.9)]),
            4,
            2,
        );
        assert!(!report.valid);
        assert_eq!(
            report.errors,
            vec![
                ValidationError::DuplicatePhoto { photo_id: 2, note_ids: vec![1, 2] },
                ValidationError::MissingPhoto { photo_id: 3 },
                ValidationError::MissingPhoto { photo_id: 4 },
            ]
        );
    }

    #[test]
    fn test_all_checks_run_together() {
        let report = AssignmentValidator::default().validate(
            &map(&[(1, &[1, 9], 0.5), (2, &[], 0.35)]),
            2,
            3,
        );
        assert!(report.errors.contains(&ValidationError::MissingPhoto { photo_id: 2 }));
        assert!(report.errors.contains(&ValidationError::UnknownPhoto { photo_id: 9, note_id: 1 }));
        assert!(report.errors.contains(&ValidationError::EntryCountMismatch { expected: 3, actual: 2 }));
        assert!(report.errors.contains(&ValidationError::EmptyNote { note_id: 2 }));
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn test_low_confidence_is_warning_only() {
        let report = AssignmentValidator::default().validate(&map(&[(1, &[1], 0.4)]), 1, 1);
        assert!(report.valid);
        assert_eq!(
            report.warnings,
            vec![ValidationWarning::LowConfidence { note_id: 1, confidence: 0.4 }]
        );
        assert!(report.needs_verification());
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let report = AssignmentValidator::new(0.7).validate(&map(&[(1, &[1], 0.7)]), 1, 1);
        assert!(report.warnings.is_empty());
    }
}
