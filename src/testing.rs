//! In-process stand-ins for the remote services.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::poster::PosterError;
use crate::replicate::{PosterInput, Prediction, PredictionApi, PredictionStatus};
use crate::verdict::{TextGenerator, VerdictError};

/// Replies with a canned text, or fails like a dead network.
pub(crate) struct StubText {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl StubText {
    pub(crate) fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TextGenerator for StubText {
    async fn generate(&self, prompt: &str) -> Result<String, VerdictError> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());
        self.reply
            .clone()
            .ok_or_else(|| VerdictError::Transport("connection refused".to_string()))
    }
}

/// Walks through a fixed list of statuses, one per create/get call, then
/// repeats the last one forever.
pub(crate) struct StubPredictions {
    statuses: Mutex<VecDeque<PredictionStatus>>,
    output: Option<Value>,
    created: Mutex<Vec<PosterInput>>,
}

impl StubPredictions {
    pub(crate) fn new(statuses: Vec<PredictionStatus>, output: Option<Value>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            output,
            created: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn created(&self) -> Vec<PosterInput> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next(&self, id: &str) -> Prediction {
        let mut statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        let status = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().copied()
        }
        .unwrap_or(PredictionStatus::Pending);
        Prediction {
            id: id.to_string(),
            status,
            output: (status == PredictionStatus::Succeeded)
                .then(|| self.output.clone())
                .flatten(),
            error: (status == PredictionStatus::Failed).then(|| "model crashed".to_string()),
        }
    }
}

#[async_trait]
impl PredictionApi for StubPredictions {
    async fn create(&self, input: &PosterInput) -> Result<Prediction, PosterError> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(input.clone());
        Ok(self.next("stub-job"))
    }

    async fn get(&self, id: &str) -> Result<Prediction, PosterError> {
        Ok(self.next(id))
    }
}
