//! insp-ai library interface
//!
//! Photo-to-observation assignment: bundles site photos and inspection notes
//! into note -> photos assignments with unique descriptive photo names.
//!
//! Exposes public APIs for the CLI and integration testing.

pub mod intake;
pub mod pipeline;

pub use pipeline::orchestrator::Orchestrator;
pub use pipeline::tier1::classifier::{Classifier, UnavailableClassifier};
pub use pipeline::tier1::http_classifier::HttpClassifier;
pub use pipeline::types::{ObservationNote, OrchestrationResult, Photo};

use insp_common::config::{resolve_api_key, TomlConfig};
use std::sync::Arc;

/// Build the classifier for a configuration
///
/// Without an API key every call fails immediately and each stage takes its
/// local fallback.
pub fn build_classifier(config: &TomlConfig) -> insp_common::Result<Arc<dyn Classifier>> {
    match resolve_api_key(config) {
        Some(key) => Ok(Arc::new(HttpClassifier::new(&config.classifier, key)?)),
        None => {
            tracing::warn!(
                "No classifier API key configured; running with local fallbacks only"
            );
            Ok(Arc::new(UnavailableClassifier))
        }
    }
}
