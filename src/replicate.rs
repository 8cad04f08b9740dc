//! Replicate predictions API client.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};
use url::Url;

use crate::constants::{PHOTOMAKER_STEPS, PHOTOMAKER_STYLE, PHOTOMAKER_TRIGGER};
use crate::poster::PosterError;

/// Where a remote job stands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PredictionStatus {
    /// Queued or running.
    Pending,
    /// Finished with output.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Stopped before finishing.
    Canceled,
}

impl PredictionStatus {
    /// Maps Replicate's status strings; unknown values count as pending.
    pub fn from_remote(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            _ => Self::Pending,
        }
    }

    /// True once the job won't change any more.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A handle to one image-generation job.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    /// Remote job id.
    pub id: String,
    /// Current status.
    pub status: PredictionStatus,
    /// Output, present once succeeded.
    pub output: Option<Value>,
    /// Remote error text, if any.
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPrediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl From<RawPrediction> for Prediction {
    fn from(raw: RawPrediction) -> Self {
        let error = match raw.error {
            None | Some(Value::Null) => None,
            Some(Value::String(message)) => Some(message),
            Some(other) => Some(other.to_string()),
        };
        Self {
            id: raw.id,
            status: PredictionStatus::from_remote(&raw.status),
            output: raw.output.filter(|output| !output.is_null()),
            error,
        }
    }
}

/// Model inputs for one poster.
///
/// How these are named on the wire depends on the model; see [`InputSchema`].
#[derive(Clone, Debug, PartialEq)]
pub struct PosterInput {
    /// The photo as a data URI.
    pub image: String,
    /// The noun the prompt uses for the person in the photo.
    pub subject: String,
    /// Positive prompt.
    pub prompt: String,
    /// Negative prompt.
    pub negative_prompt: String,
    /// How far the output may stray from the photo.
    pub strength: f32,
    /// Classifier-free guidance scale.
    pub guidance_scale: f32,
    /// Output aspect ratio, e.g. `2:3`.
    pub aspect_ratio: String,
}

/// The input names a model expects.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InputSchema {
    /// `tencentarc/photomaker`: `input_image`, style presets, and the
    /// trigger word right after the subject in the prompt.
    PhotoMaker,
    /// `image`, `strength` and `aspect_ratio`, as image-to-image models take them.
    ImageToImage,
}

impl InputSchema {
    /// Picks the schema from a model reference.
    pub fn for_model(model: &str) -> Self {
        if model.to_ascii_lowercase().contains("photomaker") {
            Self::PhotoMaker
        } else {
            Self::ImageToImage
        }
    }

    /// The `input` object for a create request.
    pub fn render(self, input: &PosterInput) -> Value {
        match self {
            Self::PhotoMaker => json!({
                "input_image": input.image,
                "prompt": with_trigger_word(&input.prompt, &input.subject),
                "negative_prompt": input.negative_prompt,
                "guidance_scale": input.guidance_scale,
                "num_steps": PHOTOMAKER_STEPS,
                "style_name": PHOTOMAKER_STYLE,
            }),
            Self::ImageToImage => json!({
                "image": input.image,
                "prompt": input.prompt,
                "negative_prompt": input.negative_prompt,
                "strength": input.strength,
                "guidance_scale": input.guidance_scale,
                "aspect_ratio": input.aspect_ratio,
            }),
        }
    }
}

/// Puts the trigger word after the first mention of `subject`.
fn with_trigger_word(prompt: &str, subject: &str) -> String {
    if prompt
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .any(|word| word == PHOTOMAKER_TRIGGER)
    {
        return prompt.to_string();
    }
    let needle = format!(" {subject} ");
    match prompt.find(&needle) {
        Some(at) if !subject.is_empty() => {
            let split = at + needle.len() - 1;
            format!("{} {}{}", &prompt[..split], PHOTOMAKER_TRIGGER, &prompt[split..])
        }
        _ => format!("{prompt}, {PHOTOMAKER_TRIGGER}"),
    }
}

/// Starts and inspects image-generation jobs.
#[async_trait]
pub trait PredictionApi: Send + Sync {
    /// Submits a new job.
    async fn create(&self, input: &PosterInput) -> Result<Prediction, PosterError>;
    /// Reloads a job by id.
    async fn get(&self, id: &str) -> Result<Prediction, PosterError>;
}

/// Which model a job runs on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ModelRef {
    /// A pinned version hash, from `owner/name:hash` or a bare hash.
    Version(String),
    /// An official model addressed by `owner/name`.
    Named(String),
}

impl ModelRef {
    /// Parses a model reference.
    pub fn parse(model: &str) -> Self {
        let model = model.trim();
        match model.rsplit_once(':') {
            Some((_, version)) => Self::Version(version.to_string()),
            None if model.contains('/') => Self::Named(model.to_string()),
            None => Self::Version(model.to_string()),
        }
    }
}

/// Talks to the Replicate REST API.
#[derive(Clone, Debug)]
pub struct ReplicateClient {
    http: reqwest::Client,
    api_token: String,
    model: ModelRef,
    schema: InputSchema,
    base_url: Url,
}

impl ReplicateClient {
    /// Creates a client for `model` rooted at `base_url`.
    pub fn new(http: reqwest::Client, api_token: &str, model: &str, base_url: Url) -> Self {
        Self {
            http,
            api_token: api_token.to_string(),
            model: ModelRef::parse(model),
            schema: InputSchema::for_model(model),
            base_url,
        }
    }

    fn base(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    fn create_body(&self, input: &PosterInput) -> Value {
        let mut body = json!({ "input": self.schema.render(input) });
        if let ModelRef::Version(version) = &self.model {
            body["version"] = Value::String(version.clone());
        }
        body
    }

    fn create_endpoint(&self) -> String {
        match &self.model {
            ModelRef::Version(_) => format!("{}/predictions", self.base()),
            ModelRef::Named(name) => format!("{}/models/{}/predictions", self.base(), name),
        }
    }

    async fn read_prediction(
        &self,
        response: reqwest::Response,
    ) -> Result<Prediction, PosterError> {
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| PosterError::Transport(err.to_string()))?;
        if !status.is_success() {
            return Err(PosterError::Api {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).to_string(),
            });
        }
        let raw: RawPrediction = serde_json::from_slice(&bytes)
            .map_err(|err| PosterError::MalformedOutput(err.to_string()))?;
        Ok(raw.into())
    }
}

#[async_trait]
impl PredictionApi for ReplicateClient {
    async fn create(&self, input: &PosterInput) -> Result<Prediction, PosterError> {
        let endpoint = self.create_endpoint();
        info!("Submitting poster job to {}", endpoint);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_token)
            .json(&self.create_body(input))
            .send()
            .await
            .map_err(|err| PosterError::Transport(err.to_string()))?;
        let prediction = self.read_prediction(response).await?;
        debug!("Created prediction {} ({:?})", prediction.id, prediction.status);
        Ok(prediction)
    }

    async fn get(&self, id: &str) -> Result<Prediction, PosterError> {
        let response = self
            .http
            .get(format!("{}/predictions/{}", self.base(), id))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|err| PosterError::Transport(err.to_string()))?;
        self.read_prediction(response).await
    }
}
