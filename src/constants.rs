//! Shared constants/defaults
//!

/// Default Gemini model used for verdicts.
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.0-flash";

/// Default Replicate model reference used for posters.
pub const DEFAULT_IMAGE_MODEL: &str =
    "tencentarc/photomaker:ddfc2b6a45641951921a882ee57bd56130286cd9ad95130daef6795f63d50839";

/// Gemini REST API root.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Replicate REST API root.
pub const REPLICATE_API_BASE: &str = "https://api.replicate.com/v1";

/// Things the poster must never look like.
pub const NEGATIVE_PROMPT: &str =
    "ugly, distorted, low quality, deformed face, extra limbs, wedding, text, watermark";

/// How far the poster may drift from the uploaded photo.
pub const PROMPT_STRENGTH: f32 = 0.8;

/// Guidance scale for the image model.
pub const GUIDANCE_SCALE: f32 = 5.0;

/// Poster aspect ratio.
pub const ASPECT_RATIO: &str = "2:3";

/// Seconds between job status checks.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// Seconds before a pending job is abandoned.
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 300;

/// Timeout for a single outbound HTTP request, in seconds.
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Largest accepted request body; headshots come straight off phones.
pub const MAX_UPLOAD_BYTES: usize = 15 * 1024 * 1024;

/// Photos are shrunk so neither side exceeds this many pixels.
pub const MAX_PHOTO_EDGE: u32 = 1536;

/// Sessions expire after this many hours of inactivity.
pub const SESSION_INACTIVITY_HOURS: i64 = 2;

/// Default bracket size in tournament mode.
pub const DEFAULT_BRACKET_SIZE: usize = 8;

/// Word photomaker expects right after the subject in its prompt.
pub const PHOTOMAKER_TRIGGER: &str = "img";

/// Sampling steps sent to photomaker.
pub const PHOTOMAKER_STEPS: u32 = 30;

/// Photomaker style preset.
pub const PHOTOMAKER_STYLE: &str = "Photographic";
