//! Scripted Classifier
//!
//! Deterministic stand-in for the external service. Replies are queued per
//! call purpose; an exhausted queue fails the call. Photo analysis can echo
//! the image bytes back so each photo carries its own metadata JSON.

use async_trait::async_trait;
use insp_ai::pipeline::tier1::classifier::Classifier;
use insp_ai::pipeline::types::{CallPurpose, ClassifierError, ClassifierRequest, Photo};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// One scripted reply
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail,
    /// Never answers before the call deadline
    Timeout,
}

pub struct ScriptedClassifier {
    echo_images: bool,
    queues: Mutex<HashMap<CallPurpose, VecDeque<Reply>>>,
    calls: Mutex<Vec<CallPurpose>>,
}

impl ScriptedClassifier {
    /// Every call fails unless scripted
    pub fn new() -> Self {
        Self {
            echo_images: false,
            queues: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Photo analysis returns the image bytes as the response text
    pub fn with_vision() -> Self {
        Self {
            echo_images: true,
            ..Self::new()
        }
    }

    pub fn script(self, purpose: CallPurpose, reply: Reply) -> Self {
        self.queues
            .lock()
            .unwrap()
            .entry(purpose)
            .or_default()
            .push_back(reply);
        self
    }

    pub fn reply(self, purpose: CallPurpose, text: &str) -> Self {
        self.script(purpose, Reply::Text(text.to_string()))
    }

    pub fn calls(&self) -> Vec<CallPurpose> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, purpose: CallPurpose) -> usize {
        self.calls().iter().filter(|p| **p == purpose).count()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, request: &ClassifierRequest) -> Result<String, ClassifierError> {
        self.calls.lock().unwrap().push(request.purpose);

        if self.echo_images && request.purpose == CallPurpose::AnalyzePhoto {
            if let Some(image) = request.images.first() {
                return Ok(String::from_utf8_lossy(&image.data).into_owned());
            }
        }

        let next = self
            .queues
            .lock()
            .unwrap()
            .get_mut(&request.purpose)
            .and_then(VecDeque::pop_front);

        match next {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Timeout) => {
                tokio::time::sleep(request.timeout + Duration::from_secs(60)).await;
                Ok("[]".to_string())
            }
            Some(Reply::Fail) | None => Err(ClassifierError::Transport(format!(
                "scripted failure for {:?}",
                request.purpose
            ))),
        }
    }
}

/// Photo whose bytes are the metadata JSON the classifier will "see"
pub fn photo(sentiment: &str, location: &str) -> Photo {
    let metadata = format!(
        r#"{{"location": "{}", "equipment": [], "people": [], "safetyIssues": [], "conditions": [], "confidence": "high", "sentiment": "{}"}}"#,
        location, sentiment
    );
    Photo::new(0, "IMG_0001.jpg", "image/jpeg", metadata.into_bytes())
}

/// Photos numbered by position with camera-style filenames
pub fn photos(sentiments: &[&str]) -> Vec<Photo> {
    sentiments
        .iter()
        .enumerate()
        .map(|(index, sentiment)| {
            let mut p = photo(sentiment, "level 3");
            p.id = index as u32 + 1;
            p.filename = format!("IMG_{:04}.jpg", index + 1);
            p
        })
        .collect()
}
