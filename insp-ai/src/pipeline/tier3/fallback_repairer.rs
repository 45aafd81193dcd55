// Tier 3: Fallback Repairer
//
// Concept: Deterministic, local repair that leaves the assignment structurally
// valid even when every external call failed.
//
// Algorithm (only when validation still reports errors):
// 0. Normalize: one entry per input note, drop out-of-range photo ids, keep
//    the first holder of a duplicated photo (ascending note id)
// 1. orphans = photos in no entry, empties = entries with no photos
// 2. Both non-empty: zip one orphan per empty note in order; leftover
//    orphans go to the last entry
// 3. Orphans only: round-robin over all entries by index
// 4. Empties only: take the last photo from the most loaded entry holding
//    two or more. With fewer photos than notes no donor exists and photo 1
//    is reused as a placeholder
//
// Every touched entry gets confidence min(current, 0.3) and a reasoning note.

use crate::pipeline::tier3::assignment_validator::AssignmentValidator;
use crate::pipeline::types::{AssignmentMap, NoteAssignment, NoteId, PhotoId};
use std::collections::BTreeSet;

/// Confidence ceiling for entries the repairer touched
pub const REPAIR_CONFIDENCE: f64 = 0.3;

/// Repaired map and a log of what changed
#[derive(Debug, Clone, Default)]
pub struct RepairOutcome {
    pub assignments: AssignmentMap,
    pub actions: Vec<String>,
}

pub struct FallbackRepairer {
    validator: AssignmentValidator,
}

impl FallbackRepairer {
    pub fn new(validator: AssignmentValidator) -> Self {
        Self { validator }
    }

    /// Repair `assignments` for the given notes and photo count
    ///
    /// `note_ids` are the input notes; the result has exactly one entry for
    /// each. Idempotent: a valid map is returned unchanged.
    pub fn repair(
        &self,
        assignments: AssignmentMap,
        note_ids: &[NoteId],
        photo_count: usize,
    ) -> RepairOutcome {
        let report = self.validator.validate(&assignments, photo_count, note_ids.len());
        if report.valid {
            return RepairOutcome {
                assignments,
                actions: Vec::new(),
            };
        }

        tracing::info!(
            errors = report.error_count(),
            photo_count,
            note_count = note_ids.len(),
            "Applying fallback repair"
        );

        let mut repair = Repair {
            assignments,
            actions: Vec::new(),
            touched: BTreeSet::new(),
        };

        repair.normalize(note_ids, photo_count);
        repair.redistribute(photo_count);

        let Repair {
            mut assignments,
            actions,
            touched,
        } = repair;

        for note_id in touched {
            if let Some(entry) = assignments.get_mut(&note_id) {
                entry.confidence = entry.confidence.min(REPAIR_CONFIDENCE);
                if !entry.reasoning.contains("Adjusted by fallback repair") {
                    entry.reasoning = format!("{} (Adjusted by fallback repair)", entry.reasoning);
                }
            }
        }

        for action in &actions {
            tracing::debug!(action = %action, "Repair action");
        }

        RepairOutcome {
            assignments,
            actions,
        }
    }
}

/// Working state for one repair pass
struct Repair {
    assignments: AssignmentMap,
    actions: Vec<String>,
    touched: BTreeSet<NoteId>,
}

impl Repair {
    fn normalize(&mut self, note_ids: &[NoteId], photo_count: usize) {
        let wanted: BTreeSet<NoteId> = note_ids.iter().copied().collect();

        let stray: Vec<NoteId> = self
            .assignments
            .keys()
            .filter(|id| !wanted.contains(id))
            .copied()
            .collect();
        for note_id in stray {
            self.assignments.remove(&note_id);
            self.actions.push(format!("Removed entry for unknown note {}", note_id));
        }

        for &note_id in note_ids {
            if !self.assignments.contains_key(&note_id) {
                self.assignments.insert(
                    note_id,
                    NoteAssignment::placeholder("Missing entry restored", REPAIR_CONFIDENCE),
                );
                self.actions.push(format!("Restored missing entry for note {}", note_id));
                self.touched.insert(note_id);
            }
        }

        let mut seen: BTreeSet<PhotoId> = BTreeSet::new();
        for (&note_id, entry) in self.assignments.iter_mut() {
            let before = entry.photo_ids.len();
            let mut kept = Vec::with_capacity(before);
            for &photo_id in &entry.photo_ids {
                if photo_id == 0 || photo_id as usize > photo_count {
                    self.actions.push(format!(
                        "Dropped unknown photo {} from note {}",
                        photo_id, note_id
                    ));
                } else if !seen.insert(photo_id) {
                    self.actions.push(format!(
                        "Removed duplicate photo {} from note {}",
                        photo_id, note_id
                    ));
                } else {
                    kept.push(photo_id);
                }
            }
            if kept.len() != before {
                entry.photo_ids = kept;
                self.touched.insert(note_id);
            }
        }
    }

    fn orphans(&self, photo_count: usize) -> Vec<PhotoId> {
        let held: BTreeSet<PhotoId> = self
            .assignments
            .values()
            .flat_map(|a| a.photo_ids.iter().copied())
            .collect();
        (1..=photo_count as PhotoId)
            .filter(|id| !held.contains(id))
            .collect()
    }

    fn empties(&self) -> Vec<NoteId> {
        self.assignments
            .iter()
            .filter(|(_, a)| a.photo_ids.is_empty())
            .map(|(&id, _)| id)
            .collect()
    }

    fn place(&mut self, photo_id: PhotoId, note_id: NoteId, how: &str) {
        if let Some(entry) = self.assignments.get_mut(&note_id) {
            entry.photo_ids.push(photo_id);
            self.touched.insert(note_id);
            self.actions
                .push(format!("{} photo {} to note {}", how, photo_id, note_id));
        }
    }

    fn redistribute(&mut self, photo_count: usize) {
        if self.assignments.is_empty() {
            return;
        }

        let orphans = self.orphans(photo_count);
        let empties = self.empties();

        match (orphans.is_empty(), empties.is_empty()) {
            (false, false) => {
                let paired = orphans.len().min(empties.len());
                for (&photo_id, &note_id) in orphans.iter().zip(&empties) {
                    self.place(photo_id, note_id, "Assigned orphaned");
                }
                let last = self.assignments.keys().next_back().copied();
                if let Some(last) = last {
                    for &photo_id in &orphans[paired..] {
                        self.place(photo_id, last, "Appended orphaned");
                    }
                }
            }
            (false, true) => {
                let note_ids: Vec<NoteId> = self.assignments.keys().copied().collect();
                for (index, &photo_id) in orphans.iter().enumerate() {
                    self.place(photo_id, note_ids[index % note_ids.len()], "Distributed orphaned");
                }
            }
            _ => {}
        }

        // Empties left over from step 2 (more empties than orphans) or step 0
        for note_id in self.empties() {
            match self.donor() {
                Some(donor) => {
                    let moved = self
                        .assignments
                        .get_mut(&donor)
                        .and_then(|a| a.photo_ids.pop());
                    if let Some(photo_id) = moved {
                        self.touched.insert(donor);
                        self.place(photo_id, note_id, &format!("Moved from note {}:", donor));
                    }
                }
                None if photo_count > 0 => {
                    self.place(1, note_id, "Placeholder: reused");
                }
                None => {}
            }
        }
    }

    /// Most loaded entry with two or more photos (lowest note id on ties)
    fn donor(&self) -> Option<NoteId> {
        let mut best: Option<(NoteId, usize)> = None;
        for (&note_id, entry) in &self.assignments {
            let len = entry.photo_ids.len();
            if len >= 2 && best.map_or(true, |(_, best_len)| len > best_len) {
                best = Some((note_id, len));
            }
        }
        best.map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tier3::assignment_validator::photo_holders;

    fn map(entries: &[(NoteId, &[PhotoId])]) -> AssignmentMap {
        entries
            .iter()
            .map(|(id, photos)| (*id, NoteAssignment::new(photos.to_vec(), "matched", 0.9)))
            .collect()
    }

    fn repairer() -> FallbackRepairer {
        FallbackRepairer::new(AssignmentValidator::default())
    }

    fn assert_valid(assignments: &AssignmentMap, photos: usize, notes: usize) {
        let report = AssignmentValidator::default().validate(assignments, photos, notes);
        assert!(report.valid, "still invalid: {:?}", report.errors);
    }

    #[test]
    fn test_valid_map_untouched() {
        let input = map(&[(1, &[1]), (2, &[2])]);
        let outcome = repairer().repair(input.clone(), &[1, 2], 2);
        assert_eq!(outcome.assignments, input);
        assert!(outcome.actions.is_empty());
    }

    #[test]
    fn test_orphans_zip_into_empty_notes() {
        let outcome = repairer().repair(map(&[(1, &[1]), (2, &[]), (3, &[])]), &[1, 2, 3], 4);
        let a = &outcome.assignments;
        assert_eq!(a[&2].photo_ids, vec![2]);
        assert_eq!(a[&3].photo_ids, vec![3, 4]); // leftover goes to the last entry
        assert_eq!(a[&1].confidence, 0.9);
        assert_eq!(a[&2].confidence, REPAIR_CONFIDENCE);
        assert_valid(a, 4, 3);
    }

    #[test]
    fn test_orphans_only_round_robin() {
        let outcome = repairer().repair(map(&[(1, &[1]), (2, &[2])]), &[1, 2], 5);
        let a = &outcome.assignments;
        assert_eq!(a[&1].photo_ids, vec![1, 3, 5]);
        assert_eq!(a[&2].photo_ids, vec![2, 4]);
        assert_valid(a, 5, 2);
    }

    #[test]
    fn test_duplicates_resolved_to_first_holder() {
        let outcome = repairer().repair(map(&[(1, &[1, 2]), (2, &[2]), (3, &[3])]), &[1, 2, 3], 3);
        let a = &outcome.assignments;
        // note 2 lost its duplicate, then took a photo from note 1
        assert_eq!(photo_holders(a).values().filter(|h| h.len() > 1).count(), 0);
        assert!(!a[&2].photo_ids.is_empty());
        assert_valid(a, 3, 3);
    }

    #[test]
    fn test_missing_and_stray_entries_normalized() {
        let outcome = repairer().repair(map(&[(1, &[1, 2]), (9, &[3])]), &[1, 2], 3);
        let a = &outcome.assignments;
        assert_eq!(a.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_valid(a, 3, 2);
    }

    #[test]
    fn test_fewer_photos_than_notes_reuses_photo_one() {
        let outcome = repairer().repair(map(&[(1, &[1]), (2, &[])]), &[1, 2], 1);
        assert_eq!(outcome.assignments[&2].photo_ids, vec![1]);
        assert_eq!(outcome.assignments[&2].confidence, REPAIR_CONFIDENCE);
    }

    #[test]
    fn test_repair_is_idempotent() {
        let once = repairer().repair(map(&[(1, &[1, 1, 7]), (2, &[]), (3, &[2])]), &[1, 2, 3], 4);
        let twice = repairer().repair(once.assignments.clone(), &[1, 2, 3], 4);
        assert_eq!(once.assignments, twice.assignments);
        assert!(twice.actions.is_empty());
    }

    #[test]
    fn test_no_notes_leaves_map_empty() {
        let outcome = repairer().repair(AssignmentMap::new(), &[], 3);
        assert!(outcome.assignments.is_empty());
    }
}
