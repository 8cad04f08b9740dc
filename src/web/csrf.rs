//! Per-session form tokens.

use rand::RngExt;
use rand::distr::Alphanumeric;
use tower_sessions::Session;

use crate::error::CastingError;

const CSRF_SESSION_KEY: &str = "casting.csrf";
const TOKEN_LENGTH: usize = 32;

/// Returns the session's token, minting one on first use.
pub(crate) async fn issue_token(session: &Session) -> Result<String, CastingError> {
    if let Some(token) = session.get::<String>(CSRF_SESSION_KEY).await? {
        return Ok(token);
    }
    let token: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect();
    session.insert(CSRF_SESSION_KEY, &token).await?;
    Ok(token)
}

/// Rejects a form whose token doesn't match the session's.
pub(crate) async fn verify(session: &Session, submitted: &str) -> Result<(), CastingError> {
    match session.get::<String>(CSRF_SESSION_KEY).await? {
        Some(expected) if !submitted.is_empty() && expected == submitted => Ok(()),
        _ => Err(CastingError::Unauthorized),
    }
}
