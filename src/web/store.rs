//! Loads and saves the casting state in the cookie session.

use tower_sessions::Session;

use crate::error::CastingError;
use crate::flow::CastingSession;

const CASTING_SESSION_KEY: &str = "casting.session";

pub(crate) async fn load(session: &Session) -> Result<CastingSession, CastingError> {
    Ok(session
        .get::<CastingSession>(CASTING_SESSION_KEY)
        .await?
        .unwrap_or_default())
}

pub(crate) async fn save(session: &Session, casting: &CastingSession) -> Result<(), CastingError> {
    session.insert(CASTING_SESSION_KEY, casting).await?;
    Ok(())
}

/// Drops the request's cached copy and reads the store again, picking up
/// writes made by other requests in the meantime.
pub(crate) async fn reload(session: &Session) -> Result<CastingSession, CastingError> {
    session.load().await?;
    load(session).await
}
