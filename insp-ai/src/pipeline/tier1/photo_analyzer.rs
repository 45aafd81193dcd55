// Tier 1: Photo Analyzer
//
// Concept: Send one photo to the classifier and get structured visual metadata.
//
// Failure is never fatal: a failed or unparseable call yields
// PhotoMetadata::unknown() for that photo and the run continues.

use crate::pipeline::prompts;
use crate::pipeline::tier1::classifier::{call_with_timeout, Classifier};
use crate::pipeline::tier1::response_decoder::decode;
use crate::pipeline::types::{
    CallPurpose, ClassifierRequest, ConfidenceLevel, ImagePayload, Photo, PhotoId, PhotoMetadata,
    Sentiment, StageError,
};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Metadata as the classifier returns it; every field optional
///
/// Scalar fields are kept as raw JSON so one oddly typed field (a numeric
/// confidence, a null location) cannot discard the rest of the record.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawPhotoMetadata {
    location: Option<Value>,
    #[serde(deserialize_with = "string_list")]
    equipment: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    people: Vec<String>,
    #[serde(alias = "safety_issues", alias = "issues", deserialize_with = "string_list")]
    safety_issues: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    conditions: Vec<String>,
    confidence: Option<Value>,
    sentiment: Option<Value>,
}

impl From<RawPhotoMetadata> for PhotoMetadata {
    fn from(raw: RawPhotoMetadata) -> Self {
        let location = raw
            .location
            .as_ref()
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or("unknown")
            .to_string();

        Self {
            location,
            equipment: raw.equipment,
            people: raw.people,
            safety_issues: raw.safety_issues,
            conditions: raw.conditions,
            confidence: raw
                .confidence
                .as_ref()
                .and_then(confidence_level)
                .unwrap_or(ConfidenceLevel::Low),
            sentiment: raw
                .sentiment
                .as_ref()
                .and_then(Value::as_str)
                .map(Sentiment::from_label)
                .unwrap_or(Sentiment::Neutral),
        }
    }
}

/// Label ("high") or score (0.92, or 92 as a percentage)
fn confidence_level(value: &Value) -> Option<ConfidenceLevel> {
    match value {
        Value::String(label) => Some(ConfidenceLevel::from_label(label)),
        Value::Number(n) => {
            let score = n.as_f64()?;
            let score = if score > 1.0 && score <= 100.0 { score / 100.0 } else { score };
            Some(if score >= 0.8 {
                ConfidenceLevel::High
            } else if score >= 0.5 {
                ConfidenceLevel::Medium
            } else {
                ConfidenceLevel::Low
            })
        }
        _ => None,
    }
}

/// Accept a list of strings, a single string, or null
fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        serde_json::Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    })
}

/// Photo analyzer (Tier 1 extractor concept)
pub struct PhotoAnalyzer {
    classifier: Arc<dyn Classifier>,
    timeout: Duration,
}

impl PhotoAnalyzer {
    pub fn new(classifier: Arc<dyn Classifier>, timeout: Duration) -> Self {
        Self {
            classifier,
            timeout,
        }
    }

    /// Analyze one photo, degrading to unknown metadata on failure
    pub async fn analyze(&self, photo: &Photo) -> PhotoMetadata {
        match self.try_analyze(photo).await {
            Ok(metadata) => {
                tracing::debug!(
                    photo_id = photo.id,
                    sentiment = metadata.sentiment.as_str(),
                    location = %metadata.location,
                    "Photo analyzed"
                );
                metadata
            }
            Err(e) => {
                tracing::warn!(
                    photo_id = photo.id,
                    filename = %photo.filename,
                    error = %e,
                    "Photo analysis failed, using unknown metadata"
                );
                PhotoMetadata::unknown()
            }
        }
    }

    async fn try_analyze(&self, photo: &Photo) -> Result<PhotoMetadata, StageError> {
        let request = ClassifierRequest {
            purpose: CallPurpose::AnalyzePhoto,
            prompt: prompts::analyze_photo(),
            images: vec![ImagePayload {
                mime_type: photo.mime_type.clone(),
                data: photo.content.clone(),
            }],
            timeout: self.timeout,
        };

        let text = call_with_timeout(self.classifier.as_ref(), request).await?;
        let raw: RawPhotoMetadata = decode(&text)?;
        Ok(raw.into())
    }

    /// Analyze every photo concurrently
    ///
    /// Each call owns a distinct slot keyed by photo id; results are collected
    /// after all calls finish.
    pub async fn analyze_all(&self, photos: &[Photo]) -> BTreeMap<PhotoId, PhotoMetadata> {
        tracing::info!(photos = photos.len(), "Analyzing photos");

        let results = join_all(photos.iter().map(|photo| async move {
            (photo.id, self.analyze(photo).await)
        }))
        .await;

        results.into_iter().collect()
    }
}
