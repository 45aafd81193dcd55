// Tier 1: Classifier Abstraction
//
// Concept: The one external capability the pipeline consumes. Every use
// (photo analysis, excess matching, full matching, verification, naming)
// goes through the same text+images in, free text out contract.
//
// Deadlines are enforced here, at the call site, so every implementation
// gets the same cancellable-call behavior. Admission (rate limiting) happens
// in ready(), before the deadline starts.

use crate::pipeline::types::{ClassifierError, ClassifierRequest};
use async_trait::async_trait;

/// Multimodal classification/reasoning service
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Identifier for logs
    fn name(&self) -> &'static str;

    /// Wait until a request may be sent
    ///
    /// Not counted against the request deadline.
    async fn ready(&self) {}

    /// Send one request and return the raw response text
    ///
    /// The text is untrusted: it may be fenced, wrapped in prose, or
    /// malformed. Decoding is the caller's job.
    async fn complete(&self, request: &ClassifierRequest) -> Result<String, ClassifierError>;
}

/// Issue a request under its deadline
///
/// The deadline starts once the classifier admits the request. On expiry
/// the in-flight future is dropped and `ClassifierError::Timeout` is
/// returned; nothing is retried here.
pub async fn call_with_timeout(
    classifier: &dyn Classifier,
    request: ClassifierRequest,
) -> Result<String, ClassifierError> {
    let deadline = request.timeout;

    classifier.ready().await;

    tracing::debug!(
        classifier = classifier.name(),
        purpose = ?request.purpose,
        prompt_len = request.prompt.len(),
        images = request.images.len(),
        timeout_secs = deadline.as_secs_f64(),
        "Issuing classifier call"
    );

    let text = match tokio::time::timeout(deadline, classifier.complete(&request)).await {
        Ok(result) => result?,
        Err(_) => return Err(ClassifierError::Timeout(deadline)),
    };

    if text.trim().is_empty() {
        return Err(ClassifierError::EmptyResponse);
    }

    tracing::debug!(
        classifier = classifier.name(),
        purpose = ?request.purpose,
        response_len = text.len(),
        "Classifier call returned"
    );

    Ok(text)
}

/// Classifier used when no API key is configured
///
/// Every call fails immediately, so every stage takes its local fallback.
pub struct UnavailableClassifier;

#[async_trait]
impl Classifier for UnavailableClassifier {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn complete(&self, _request: &ClassifierRequest) -> Result<String, ClassifierError> {
        Err(ClassifierError::NotConfigured(
            "no classifier API key configured".to_string(),
        ))
    }
}
