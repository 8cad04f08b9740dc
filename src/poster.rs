//! Turns a headshot and an archetype into a poster URL.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalog::Archetype;
use crate::clock::Clock;
use crate::constants::{
    ASPECT_RATIO, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_POLL_TIMEOUT_SECS, GUIDANCE_SCALE,
    NEGATIVE_PROMPT, PROMPT_STRENGTH,
};
use crate::photo::{JpegPhoto, PhotoError};
use crate::replicate::{Prediction, PredictionApi, PredictionStatus, PosterInput};

/// How the subject should be described in the prompt.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Presentation {
    /// "actor"
    #[default]
    Actor,
    /// "actress"
    Actress,
}

impl Presentation {
    /// The noun used in the prompt.
    pub fn noun(self) -> &'static str {
        match self {
            Self::Actor => "actor",
            Self::Actress => "actress",
        }
    }
}

impl FromStr for Presentation {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "actor" => Ok(Self::Actor),
            "actress" => Ok(Self::Actress),
            other => Err(format!("unknown presentation {other:?}")),
        }
    }
}

/// Why no poster came back.
#[derive(Debug)]
pub enum PosterError {
    /// The upload isn't a usable photo.
    InvalidPhoto(PhotoError),
    /// The request never got a response.
    Transport(String),
    /// The API answered with a non-success status.
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, for the logs.
        body: String,
    },
    /// The job finished with an error.
    Failed(String),
    /// The job was canceled remotely.
    Canceled,
    /// The job was still pending when the time budget ran out.
    TimedOut(Duration),
    /// The job succeeded but its output wasn't an image reference.
    MalformedOutput(String),
}

impl std::fmt::Display for PosterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPhoto(err) => write!(f, "{err}"),
            Self::Transport(err) => write!(f, "Image generation request failed: {err}"),
            Self::Api { status, body } => {
                write!(f, "Image generation API returned {status}: {body}")
            }
            Self::Failed(err) => write!(f, "Image generation failed: {err}"),
            Self::Canceled => write!(f, "Image generation was canceled"),
            Self::TimedOut(after) => {
                write!(f, "Image generation timed out after {}s", after.as_secs())
            }
            Self::MalformedOutput(err) => write!(f, "Image generation output was malformed: {err}"),
        }
    }
}

impl std::error::Error for PosterError {}

impl From<PhotoError> for PosterError {
    fn from(err: PhotoError) -> Self {
        Self::InvalidPhoto(err)
    }
}

/// Poll cadence and time budget.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollSettings {
    /// Wait between status checks.
    pub interval: Duration,
    /// Give up after this long.
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
        }
    }
}

/// The positive prompt for a subject and style.
pub fn build_prompt(presentation: Presentation, style: &str) -> String {
    format!(
        "A photo of an {} as a {}, cinematic movie poster, high quality",
        presentation.noun(),
        style.trim().trim_end_matches('.')
    )
}

/// The first URL of a list output, or the scalar output itself.
pub fn extract_output(output: &Value) -> Option<String> {
    let first = match output {
        Value::Array(items) => items.first()?,
        other => other,
    };
    match first {
        Value::String(url) if !url.trim().is_empty() => Some(url.trim().to_string()),
        _ => None,
    }
}

/// Polls `prediction` until it reaches a terminal state or the budget runs out.
///
/// Both the sleeps and the status checks are raced against the remaining
/// budget, so this returns no later than `settings.timeout`.
pub async fn await_prediction(
    api: &dyn PredictionApi,
    clock: &dyn Clock,
    prediction: Prediction,
    settings: PollSettings,
) -> Result<Prediction, PosterError> {
    let started = clock.now();
    let mut prediction = prediction;
    loop {
        match prediction.status {
            PredictionStatus::Succeeded => return Ok(prediction),
            PredictionStatus::Failed => {
                return Err(PosterError::Failed(
                    prediction
                        .error
                        .unwrap_or_else(|| "no error detail".to_string()),
                ));
            }
            PredictionStatus::Canceled => return Err(PosterError::Canceled),
            PredictionStatus::Pending => {}
        }

        let elapsed = clock.now().saturating_duration_since(started);
        if elapsed >= settings.timeout {
            warn!(
                "Prediction {} still pending after {}s",
                prediction.id,
                elapsed.as_secs()
            );
            return Err(PosterError::TimedOut(settings.timeout));
        }
        clock
            .sleep(settings.interval.min(settings.timeout - elapsed))
            .await;

        let remaining = settings
            .timeout
            .saturating_sub(clock.now().saturating_duration_since(started));
        let id = prediction.id.clone();
        prediction = tokio::select! {
            biased;
            checked = api.get(&id) => checked?,
            () = clock.sleep(remaining) => {
                warn!("Status check for prediction {} outlived the time budget", id);
                return Err(PosterError::TimedOut(settings.timeout));
            }
        };
        debug!("Prediction {} is {:?}", prediction.id, prediction.status);
    }
}

/// Submits poster jobs and waits for them.
#[derive(Clone)]
pub struct PosterGenerator {
    api: Arc<dyn PredictionApi>,
    clock: Arc<dyn Clock>,
    settings: PollSettings,
}

impl PosterGenerator {
    /// Creates a generator.
    pub fn new(api: Arc<dyn PredictionApi>, clock: Arc<dyn Clock>, settings: PollSettings) -> Self {
        Self {
            api,
            clock,
            settings,
        }
    }

    /// Checks and normalizes an upload before anything is sent upstream.
    pub fn prepare(upload: &[u8]) -> Result<JpegPhoto, PosterError> {
        Ok(JpegPhoto::from_upload(upload)?)
    }

    /// Builds the model inputs for a photo.
    pub fn input_for(
        photo: &JpegPhoto,
        archetype: &Archetype,
        presentation: Presentation,
    ) -> PosterInput {
        PosterInput {
            image: photo.data_uri(),
            subject: presentation.noun().to_string(),
            prompt: build_prompt(presentation, &archetype.style),
            negative_prompt: NEGATIVE_PROMPT.to_string(),
            strength: PROMPT_STRENGTH,
            guidance_scale: GUIDANCE_SCALE,
            aspect_ratio: ASPECT_RATIO.to_string(),
        }
    }

    /// Generates a poster and returns its URL.
    pub async fn generate(
        &self,
        photo: &JpegPhoto,
        archetype: &Archetype,
        presentation: Presentation,
    ) -> Result<String, PosterError> {
        let input = Self::input_for(photo, archetype, presentation);
        let prediction = self.api.create(&input).await?;
        info!(
            "Poster job {} started for {}",
            prediction.id, archetype.label
        );
        let finished = await_prediction(
            self.api.as_ref(),
            self.clock.as_ref(),
            prediction,
            self.settings,
        )
        .await?;

        let output = finished
            .output
            .as_ref()
            .ok_or_else(|| PosterError::MalformedOutput("succeeded without output".to_string()))?;
        extract_output(output)
            .ok_or_else(|| PosterError::MalformedOutput(format!("unexpected output {output}")))
    }
}
