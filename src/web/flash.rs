//! One-shot notices shown on the next page render.

use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::error::CastingError;

const NOTICE_SESSION_KEY: &str = "casting.notice";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub(crate) enum Notice {
    PosterFailed,
    PosterTimedOut,
    BadPhoto,
    DownloadFailed,
}

impl Notice {
    pub(crate) fn text(self) -> &'static str {
        match self {
            Notice::PosterFailed => "The studio couldn't develop your poster. Please try again.",
            Notice::PosterTimedOut => {
                "The studio took too long to develop your poster. Please try again."
            }
            Notice::BadPhoto => "That file doesn't look like a photo. Upload a JPEG or PNG headshot.",
            Notice::DownloadFailed => {
                "The poster couldn't be downloaded right now. It is still shown below."
            }
        }
    }

    pub(crate) fn class(self) -> &'static str {
        match self {
            Notice::PosterFailed | Notice::PosterTimedOut => "error",
            Notice::BadPhoto | Notice::DownloadFailed => "warning",
        }
    }
}

pub(crate) async fn set_notice(session: &Session, notice: Notice) -> Result<(), CastingError> {
    session.insert(NOTICE_SESSION_KEY, notice).await?;
    Ok(())
}

pub(crate) async fn take_notice(session: &Session) -> Result<Option<Notice>, CastingError> {
    Ok(session.remove::<Notice>(NOTICE_SESSION_KEY).await?)
}
