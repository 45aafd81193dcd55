//! Test Helper Utilities
//!
//! Shared utilities for testing insp-ai

#![allow(dead_code)]

pub mod scripted_classifier;

// Re-export commonly used items
pub use scripted_classifier::{photo, photos, Reply, ScriptedClassifier};

use insp_ai::pipeline::types::OrchestrationResult;
use insp_ai::ObservationNote;

/// Notes numbered from 1
pub fn notes(texts: &[&str]) -> Vec<ObservationNote> {
    texts
        .iter()
        .enumerate()
        .map(|(index, text)| ObservationNote::new(index as u32 + 1, *text))
        .collect()
}

/// Every photo covered exactly once, every note present and non-empty
pub fn assert_structurally_valid(result: &OrchestrationResult, photo_count: usize, note_count: usize) {
    assert_eq!(result.assignments.len(), note_count, "one entry per note");
    for (note_id, photo_ids) in &result.assignments {
        assert!(!photo_ids.is_empty(), "note {} has no photos", note_id);
    }

    let mut covered: Vec<u32> = result.assignments.values().flatten().copied().collect();
    covered.sort_unstable();
    let expected: Vec<u32> = (1..=photo_count as u32).collect();
    assert_eq!(covered, expected, "photos covered exactly once");
    assert!(result.diagnostics.validation.valid, "{:?}", result.diagnostics.validation.errors);
}
