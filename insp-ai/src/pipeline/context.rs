// Pipeline Context
//
// Run-scoped, read-only state threaded through every stage: Tier 1 outputs,
// configuration, and the classifier handle. Built once by the orchestrator
// after analysis and note parsing; no stage mutates it.

use crate::pipeline::tier1::classifier::Classifier;
use crate::pipeline::types::{NoteId, PhotoId, PhotoMetadata, StructuredNote};
use insp_common::config::{MatchingConfig, TimeoutConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Per-run context shared by matching, verification, repair and naming
pub struct PipelineContext {
    pub run_id: Uuid,
    pub classifier: Arc<dyn Classifier>,
    pub matching: MatchingConfig,
    pub timeouts: TimeoutConfig,
    /// Original filenames, keyed by photo id
    pub photo_filenames: BTreeMap<PhotoId, String>,
    /// Classifier metadata for every photo (unknown() when analysis failed)
    pub photo_metadata: BTreeMap<PhotoId, PhotoMetadata>,
    /// Structured notes in input order
    pub notes: Vec<StructuredNote>,
}

impl PipelineContext {
    pub fn photo_count(&self) -> usize {
        self.photo_filenames.len()
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    /// Photo ids 1..=photo_count
    pub fn photo_ids(&self) -> impl Iterator<Item = PhotoId> + '_ {
        self.photo_filenames.keys().copied()
    }

    pub fn has_photo(&self, photo_id: PhotoId) -> bool {
        self.photo_filenames.contains_key(&photo_id)
    }

    pub fn note(&self, note_id: NoteId) -> Option<&StructuredNote> {
        self.notes.iter().find(|n| n.note_id == note_id)
    }

    pub fn metadata(&self, photo_id: PhotoId) -> Option<&PhotoMetadata> {
        self.photo_metadata.get(&photo_id)
    }

    /// Metadata for a photo, falling back to unknown() for a missing slot
    pub fn metadata_or_unknown(&self, photo_id: PhotoId) -> PhotoMetadata {
        self.metadata(photo_id)
            .cloned()
            .unwrap_or_else(PhotoMetadata::unknown)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Context builders for stage unit tests

    use super::*;
    use crate::pipeline::tier1::note_parser::NoteParser;
    use crate::pipeline::tier1::classifier::UnavailableClassifier;
    use crate::pipeline::types::{ObservationNote, Sentiment};

    pub fn metadata(sentiment: Sentiment, location: &str) -> PhotoMetadata {
        PhotoMetadata {
            location: location.to_string(),
            sentiment,
            ..PhotoMetadata::unknown()
        }
    }

    /// Context with one photo per sentiment and parsed notes
    pub fn context(sentiments: &[Sentiment], notes: &[(NoteId, &str)]) -> PipelineContext {
        context_with(Arc::new(UnavailableClassifier), sentiments, notes)
    }

    pub fn context_with(
        classifier: Arc<dyn Classifier>,
        sentiments: &[Sentiment],
        notes: &[(NoteId, &str)],
    ) -> PipelineContext {
        let parser = NoteParser::default();
        let mut photo_filenames = BTreeMap::new();
        let mut photo_metadata = BTreeMap::new();
        for (index, sentiment) in sentiments.iter().enumerate() {
            let id = index as PhotoId + 1;
            photo_filenames.insert(id, format!("IMG_{:04}.jpg", id));
            photo_metadata.insert(id, metadata(*sentiment, "site"));
        }
        let notes = notes
            .iter()
            .map(|(id, text)| parser.parse(&ObservationNote::new(*id, *text)))
            .collect();

        PipelineContext {
            run_id: Uuid::new_v4(),
            classifier,
            matching: MatchingConfig::default(),
            timeouts: TimeoutConfig::default(),
            photo_filenames,
            photo_metadata,
            notes,
        }
    }
}
