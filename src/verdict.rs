//! Picks the casting archetype from the collected answers.
//!
//! The text model is asked for a small JSON object. Anything that goes wrong
//! (transport, garbage output, a label outside the roster) is handled by an
//! explicit [`FallbackPolicy`], so [`VerdictResolver::resolve`] always yields a
//! label from the catalog.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use rand::{Rng, RngExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::Catalog;

/// The resolved outcome of a session.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Archetype label, always one of the catalog labels.
    pub label: String,
    /// Short justification shown to the user.
    pub reason: String,
}

/// Errors from asking the text model for a verdict.
#[derive(Debug)]
pub enum VerdictError {
    /// The request never got a response.
    Transport(String),
    /// The API answered with a non-success status.
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, for the logs.
        body: String,
    },
    /// The reply didn't contain the expected JSON.
    Malformed(String),
    /// The reply named an archetype that isn't in the catalog.
    UnknownLabel(String),
}

impl std::fmt::Display for VerdictError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "Text generation request failed: {err}"),
            Self::Api { status, body } => {
                write!(f, "Text generation API returned {status}: {body}")
            }
            Self::Malformed(err) => write!(f, "Text generation reply was malformed: {err}"),
            Self::UnknownLabel(label) => write!(f, "Text generation picked unknown archetype {label:?}"),
        }
    }
}

impl std::error::Error for VerdictError {}

/// A text-generation backend: one prompt in, free text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Sends `prompt` and returns the raw reply text.
    async fn generate(&self, prompt: &str) -> Result<String, VerdictError>;
}

/// What to return when the text model can't be used.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, clap::ValueEnum)]
pub enum FallbackPolicy {
    /// Always the catalog's fallback label.
    #[default]
    Fixed,
    /// A uniformly random catalog label.
    Random,
}

impl FallbackPolicy {
    /// Builds the fallback verdict. The reason is always the catalog's
    /// generic fallback sentence.
    pub fn verdict<R: Rng + ?Sized>(self, catalog: &Catalog, rng: &mut R) -> Verdict {
        let label = match self {
            Self::Fixed => catalog.fallback.label.clone(),
            Self::Random => {
                let index = rng.random_range(0..catalog.archetypes.len());
                catalog
                    .archetypes
                    .get(index)
                    .map(|archetype| archetype.label.clone())
                    .unwrap_or_else(|| catalog.fallback.label.clone())
            }
        };
        Verdict {
            label,
            reason: catalog.fallback.reason.clone(),
        }
    }
}

#[allow(clippy::expect_used)] // literal pattern
static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").expect("code fence pattern")
});

/// Removes Markdown code-fence markup around a reply, if any.
pub fn strip_code_fences(text: &str) -> &str {
    match CODE_FENCE.captures(text).and_then(|captures| captures.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => text.trim(),
    }
}

/// Builds the instruction sent to the text model.
pub fn build_prompt(tags: &[String], labels: &[&str]) -> String {
    let traits = if tags.is_empty() {
        "(none)".to_string()
    } else {
        tags.join(", ")
    };
    let roster = labels
        .iter()
        .map(|label| format!("\"{label}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "You are a Hollywood casting director. The user picked these traits, in order: {traits}.\n\
         Match them to exactly one archetype from this list: {roster}.\n\
         Reply with JSON only: {{\"archetype\": \"<one label from the list>\", \"reason\": \"<one short sentence>\"}}"
    )
}

#[derive(Deserialize)]
struct RawVerdict {
    archetype: String,
    #[serde(default)]
    reason: String,
}

/// Parses a model reply into a verdict with a canonical catalog label.
pub fn parse_verdict(text: &str, catalog: &Catalog) -> Result<Verdict, VerdictError> {
    let body = strip_code_fences(text);
    let raw: RawVerdict = match serde_json::from_str(body) {
        Ok(raw) => raw,
        // Models sometimes wrap the object in prose.
        Err(err) => match (body.find('{'), body.rfind('}')) {
            (Some(start), Some(end)) if start < end => serde_json::from_str(&body[start..=end])
                .map_err(|_| VerdictError::Malformed(err.to_string()))?,
            _ => return Err(VerdictError::Malformed(err.to_string())),
        },
    };

    let archetype = catalog
        .find_archetype(&raw.archetype)
        .ok_or_else(|| VerdictError::UnknownLabel(raw.archetype.clone()))?;
    let reason = raw.reason.trim();
    if reason.is_empty() {
        return Err(VerdictError::Malformed("empty reason".to_string()));
    }
    Ok(Verdict {
        label: archetype.label.clone(),
        reason: reason.to_string(),
    })
}

/// Turns answers into a verdict via a [`TextGenerator`] plus a fallback.
#[derive(Clone)]
pub struct VerdictResolver {
    generator: Arc<dyn TextGenerator>,
    catalog: Arc<Catalog>,
    policy: FallbackPolicy,
}

impl VerdictResolver {
    /// Creates a resolver.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        catalog: Arc<Catalog>,
        policy: FallbackPolicy,
    ) -> Self {
        Self {
            generator,
            catalog,
            policy,
        }
    }

    /// Asks the model once, without any fallback.
    pub async fn try_resolve(&self, tags: &[String]) -> Result<Verdict, VerdictError> {
        let prompt = build_prompt(tags, &self.catalog.labels());
        debug!("Verdict prompt: {}", prompt);
        let reply = self.generator.generate(&prompt).await?;
        debug!("Verdict reply: {}", reply);
        parse_verdict(&reply, &self.catalog)
    }

    /// Asks the model once and falls back on any failure.
    pub async fn resolve(&self, tags: &[String]) -> Verdict {
        match self.try_resolve(tags).await {
            Ok(verdict) => verdict,
            Err(err) => {
                warn!("Falling back to {:?} verdict: {}", self.policy, err);
                self.policy.verdict(&self.catalog, &mut rand::rng())
            }
        }
    }
}
