//! Config handling

use tracing::log::LevelFilter;

use crate::catalog::CatalogError;
use crate::flow::FlowError;

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("reqwest", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("tower_sessions", LevelFilter::Info)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// Startup failures; all of them are fatal.
#[derive(Debug)]
pub enum ConfigError {
    /// A required API credential is missing or blank.
    MissingCredential(&'static str),
    /// The catalog couldn't be loaded.
    Catalog(CatalogError),
    /// The ballot settings don't fit the catalog.
    Ballot(FlowError),
    /// Poll interval or timeout is zero.
    InvalidPollSettings,
    /// The HTTP client couldn't be built.
    HttpClient(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCredential(name) => write!(f, "{name} is missing; set it in the environment"),
            Self::Catalog(err) => write!(f, "{err}"),
            Self::Ballot(err) => write!(f, "{err}"),
            Self::InvalidPollSettings => {
                write!(f, "Poll interval and timeout must both be greater than zero")
            }
            Self::HttpClient(err) => write!(f, "Failed to build HTTP client: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<CatalogError> for ConfigError {
    fn from(err: CatalogError) -> Self {
        Self::Catalog(err)
    }
}

impl From<FlowError> for ConfigError {
    fn from(err: FlowError) -> Self {
        Self::Ballot(err)
    }
}

/// The two API secrets.
#[derive(Clone)]
pub struct Credentials {
    /// Gemini API key.
    pub google_api_key: String,
    /// Replicate API token.
    pub replicate_api_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").finish_non_exhaustive()
    }
}

impl Credentials {
    /// Both secrets must be present and non-blank.
    pub fn new(
        google_api_key: Option<&str>,
        replicate_api_token: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let google_api_key = non_blank(google_api_key).ok_or(ConfigError::MissingCredential("GOOGLE_KEY"))?;
        let replicate_api_token = non_blank(replicate_api_token)
            .ok_or(ConfigError::MissingCredential("REPLICATE_API_TOKEN"))?;
        Ok(Self {
            google_api_key,
            replicate_api_token,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
