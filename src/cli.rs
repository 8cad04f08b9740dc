//! CLI parser
use clap::{Args, Parser, ValueEnum};
use std::num::NonZeroU16;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::catalog::Catalog;
use crate::clock::TokioClock;
use crate::config::{ConfigError, Credentials};
use crate::constants::{
    DEFAULT_BRACKET_SIZE, DEFAULT_IMAGE_MODEL, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_POLL_TIMEOUT_SECS, DEFAULT_TEXT_MODEL, GEMINI_API_BASE, HTTP_REQUEST_TIMEOUT_SECS,
    REPLICATE_API_BASE,
};
use crate::flow::Ballot;
use crate::gemini::GeminiClient;
use crate::poster::{PollSettings, PosterGenerator};
use crate::replicate::ReplicateClient;
use crate::verdict::{FallbackPolicy, VerdictResolver};

#[derive(Parser, Debug)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "CASTING_DEBUG")]
    /// Enable debug logging. Env: CASTING_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "9000", env = "CASTING_PORT")]
    /// http listener, defaults to `9000`.
    /// Env: CASTING_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "CASTING_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: CASTING_LISTEN_ADDRESS
    pub listen_address: String,
    #[clap(long, value_enum, default_value = "questions", env = "CASTING_MODE")]
    /// Fixed questions or a bracket of archetypes.
    /// Env: CASTING_MODE
    pub mode: BallotMode,
    #[clap(long, default_value_t = DEFAULT_BRACKET_SIZE, env = "CASTING_BRACKET_SIZE")]
    /// Entrants in bracket mode; a power of two.
    pub bracket_size: usize,
    #[clap(long, default_value = "./static", env = "CASTING_STATIC_DIR")]
    /// Directory served under `/static`.
    pub static_dir: PathBuf,

    #[command(flatten)]
    /// API and catalog settings.
    pub services: ServiceOptions,
}

/// How answers are collected.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum BallotMode {
    /// The catalog's fixed questions.
    Questions,
    /// A single-elimination bracket over the archetypes.
    Bracket,
}

impl CliOptions {
    /// Builds the ballot for the chosen mode.
    pub fn ballot(&self, catalog: &Catalog) -> Result<Ballot, ConfigError> {
        match self.mode {
            BallotMode::Questions => Ok(Ballot::questions(catalog)),
            BallotMode::Bracket => Ok(Ballot::bracket(catalog, self.bracket_size)?),
        }
    }
}

#[derive(Args, Debug, Clone)]
/// Settings shared by the server and the one-shot CLI.
pub struct ServiceOptions {
    #[arg(long, env = "GOOGLE_KEY", hide_env_values = true)]
    /// Gemini API key. Env: GOOGLE_KEY
    pub google_api_key: Option<String>,
    #[arg(long, env = "REPLICATE_API_TOKEN", hide_env_values = true)]
    /// Replicate API token. Env: REPLICATE_API_TOKEN
    pub replicate_api_token: Option<String>,
    #[arg(long, env = "REPLICATE_KEY", hide_env_values = true, hide = true)]
    /// Older name for the Replicate token, read only when the token is unset.
    /// Env: REPLICATE_KEY
    pub replicate_key: Option<String>,
    #[arg(long, env = "CASTING_CATALOG")]
    /// JSON catalog to use instead of the bundled one.
    /// Env: CASTING_CATALOG
    pub catalog_path: Option<PathBuf>,
    #[arg(long, value_enum, default_value = "fixed")]
    /// What to do when the text model fails.
    pub fallback: FallbackPolicy,
    #[arg(long, default_value = DEFAULT_TEXT_MODEL)]
    /// Gemini model id.
    pub text_model: String,
    #[arg(long, default_value = DEFAULT_IMAGE_MODEL)]
    /// Replicate model, `owner/name` or `owner/name:version`.
    pub image_model: String,
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    /// Seconds between job status checks.
    pub poll_interval_secs: u64,
    #[arg(long, default_value_t = DEFAULT_POLL_TIMEOUT_SECS)]
    /// Seconds before giving up on a job.
    pub poll_timeout_secs: u64,
    #[arg(long, default_value = GEMINI_API_BASE)]
    /// Gemini API root.
    pub text_api_base: Url,
    #[arg(long, default_value = REPLICATE_API_BASE)]
    /// Replicate API root.
    pub image_api_base: Url,
}

/// The external collaborators, wired up.
#[derive(Clone)]
pub struct Services {
    /// Picks the archetype.
    pub resolver: VerdictResolver,
    /// Makes the poster.
    pub posters: PosterGenerator,
    /// Plain client for poster downloads.
    pub http: reqwest::Client,
}

impl ServiceOptions {
    /// Loads the configured catalog.
    pub fn catalog(&self) -> Result<Catalog, ConfigError> {
        Ok(Catalog::load(self.catalog_path.as_deref())?)
    }

    /// Both credentials, or the first one missing.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let replicate = self
            .replicate_api_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .or(self.replicate_key.as_deref());
        Credentials::new(self.google_api_key.as_deref(), replicate)
    }

    /// Poll cadence; both values must be non-zero.
    pub fn poll_settings(&self) -> Result<PollSettings, ConfigError> {
        if self.poll_interval_secs == 0 || self.poll_timeout_secs == 0 {
            return Err(ConfigError::InvalidPollSettings);
        }
        Ok(PollSettings {
            interval: Duration::from_secs(self.poll_interval_secs),
            timeout: Duration::from_secs(self.poll_timeout_secs),
        })
    }

    /// Builds the API clients around `catalog`.
    pub fn services(&self, catalog: Arc<Catalog>) -> Result<Services, ConfigError> {
        let credentials = self.credentials()?;
        let settings = self.poll_settings()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|err| ConfigError::HttpClient(err.to_string()))?;

        let gemini = GeminiClient::new(
            http.clone(),
            &credentials.google_api_key,
            &self.text_model,
            self.text_api_base.clone(),
        );
        let replicate = ReplicateClient::new(
            http.clone(),
            &credentials.replicate_api_token,
            &self.image_model,
            self.image_api_base.clone(),
        );
        Ok(Services {
            resolver: VerdictResolver::new(Arc::new(gemini), catalog, self.fallback),
            posters: PosterGenerator::new(Arc::new(replicate), Arc::new(TokioClock), settings),
            http,
        })
    }
}
