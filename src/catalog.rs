//! Archetype roster and quiz questions, loaded once at startup and injected
//! into the flow.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// One casting outcome: a label plus the style fragment fed to the image model.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct Archetype {
    /// Short display label, e.g. `Noir Mastermind`.
    pub label: String,
    /// Style description embedded in the poster prompt.
    pub style: String,
    /// Optional icon shown next to the label.
    #[serde(default)]
    pub icon: Option<String>,
}

/// One of the two choices of a [`Question`].
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct AnswerOption {
    /// Button text.
    pub label: String,
    /// Category tag recorded when this option is picked.
    pub tag: String,
}

/// A quiz question with exactly two options.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct Question {
    /// Question text.
    pub prompt: String,
    /// The two options.
    pub options: [AnswerOption; 2],
}

/// The verdict used when the text model can't be trusted.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct FallbackVerdict {
    /// Label used by the fixed fallback policy.
    pub label: String,
    /// Sentence paired with any fallback label.
    pub reason: String,
}

/// The static tables of the application.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct Catalog {
    /// Page title.
    pub title: String,
    /// Every label the verdict may resolve to.
    pub archetypes: Vec<Archetype>,
    /// Questions for the question-mode ballot, in order.
    #[serde(default)]
    pub questions: Vec<Question>,
    /// Fallback verdict.
    pub fallback: FallbackVerdict,
}

/// Errors returned when loading the catalog.
#[derive(Debug)]
pub enum CatalogError {
    /// The catalog file couldn't be read.
    Io(PathBuf, std::io::Error),
    /// The JSON payload could not be parsed.
    Parse(serde_json::Error),
    /// No archetypes were defined.
    NoArchetypes,
    /// A label was blank.
    BlankLabel,
    /// The same label appears twice.
    DuplicateLabel(String),
    /// The fallback label isn't one of the archetypes.
    UnknownFallback(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(path, err) => write!(f, "Failed to read catalog {}: {err}", path.display()),
            Self::Parse(err) => write!(f, "Failed to parse catalog JSON: {err}"),
            Self::NoArchetypes => write!(f, "Catalog defines no archetypes"),
            Self::BlankLabel => write!(f, "Catalog contains a blank label or tag"),
            Self::DuplicateLabel(label) => write!(f, "Duplicate archetype label: {label}"),
            Self::UnknownFallback(label) => {
                write!(f, "Fallback label {label:?} is not a known archetype")
            }
        }
    }
}

impl std::error::Error for CatalogError {}

impl Catalog {
    /// The catalog bundled into the binary.
    pub fn bundled() -> Result<Self, CatalogError> {
        let raw = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/catalog.json"));
        Self::from_json(raw)
    }

    /// Reads a catalog from a JSON file on disk.
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| CatalogError::Io(path.to_path_buf(), err))?;
        Self::from_json(&raw)
    }

    /// Loads from `path` if given, else the bundled catalog.
    pub fn load(path: Option<&Path>) -> Result<Self, CatalogError> {
        match path {
            Some(path) => Self::from_path(path),
            None => Self::bundled(),
        }
    }

    /// Parses and validates a catalog.
    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_json::from_str(raw).map_err(CatalogError::Parse)?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.archetypes.is_empty() {
            return Err(CatalogError::NoArchetypes);
        }
        let mut seen = HashSet::new();
        for archetype in &self.archetypes {
            let label = archetype.label.trim();
            if label.is_empty() {
                return Err(CatalogError::BlankLabel);
            }
            if !seen.insert(label.to_ascii_lowercase()) {
                return Err(CatalogError::DuplicateLabel(label.to_string()));
            }
        }
        let blank_option = self
            .questions
            .iter()
            .flat_map(|question| question.options.iter())
            .any(|option| option.label.trim().is_empty() || option.tag.trim().is_empty());
        if blank_option {
            return Err(CatalogError::BlankLabel);
        }
        if self.archetype(&self.fallback.label).is_none() {
            return Err(CatalogError::UnknownFallback(self.fallback.label.clone()));
        }
        Ok(())
    }

    /// Exact label lookup.
    pub fn archetype(&self, label: &str) -> Option<&Archetype> {
        self.archetypes.iter().find(|archetype| archetype.label == label)
    }

    /// Lookup that tolerates surrounding whitespace and ASCII case.
    pub fn find_archetype(&self, label: &str) -> Option<&Archetype> {
        let label = label.trim();
        self.archetype(label).or_else(|| {
            self.archetypes
                .iter()
                .find(|archetype| archetype.label.eq_ignore_ascii_case(label))
        })
    }

    /// All valid verdict labels, in catalog order.
    pub fn labels(&self) -> Vec<&str> {
        self.archetypes
            .iter()
            .map(|archetype| archetype.label.as_str())
            .collect()
    }
}
