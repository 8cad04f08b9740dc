use super::prelude::*;
use crate::download::{download_filename, fetch_poster};
use crate::flow::Matchup;
use crate::poster::{PosterError, PosterGenerator, Presentation};
use axum::body::Body;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use chrono::Utc;

#[derive(Template, WebTemplate)]
#[template(path = "quiz.html")]
pub(crate) struct QuizTemplate {
    title: String,
    step_number: usize,
    total_steps: usize,
    matchup: Matchup,
    csrf_token: String,
    notice: Option<Notice>,
}

#[derive(Template, WebTemplate)]
#[template(path = "upload.html")]
pub(crate) struct UploadTemplate {
    title: String,
    answers: Vec<String>,
    csrf_token: String,
    notice: Option<Notice>,
}

#[derive(Template, WebTemplate)]
#[template(path = "result.html")]
pub(crate) struct ResultTemplate {
    title: String,
    label: String,
    icon: String,
    reason: String,
    poster_url: String,
    csrf_token: String,
    notice: Option<Notice>,
}

/// Renders whichever screen the session is on.
pub(crate) async fn home_handler(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, CastingError> {
    let loaded = store::load(&session).await?;
    let casting = state
        .ballot
        .seed(loaded.clone(), &state.catalog, &mut rand::rng());
    if casting != loaded {
        store::save(&session, &casting).await?;
    }
    let csrf_token = csrf::issue_token(&session).await?;
    let notice = flash::take_notice(&session).await?;
    let title = state.catalog.title.clone();

    let response = match casting.stage(&state.ballot) {
        Stage::Collecting { step } => {
            let matchup = state.ballot.matchup(&casting).ok_or_else(|| {
                CastingError::InternalServerError(format!("no matchup for step {step}"))
            })?;
            QuizTemplate {
                title,
                step_number: step + 1,
                total_steps: state.ballot.rounds(),
                matchup,
                csrf_token,
                notice,
            }
            .into_response()
        }
        Stage::Resolving => UploadTemplate {
            title,
            answers: casting.answers,
            csrf_token,
            notice,
        }
        .into_response(),
        Stage::Presenting => {
            let (Some(verdict), Some(poster_url)) = (casting.verdict, casting.poster_url) else {
                return Err(CastingError::InternalServerError(
                    "presenting without a verdict".to_string(),
                ));
            };
            let icon = state
                .catalog
                .archetype(&verdict.label)
                .and_then(|archetype| archetype.icon.clone())
                .unwrap_or_default();
            ResultTemplate {
                title,
                label: verdict.label,
                icon,
                reason: verdict.reason,
                poster_url,
                csrf_token,
                notice,
            }
            .into_response()
        }
    };
    Ok(response)
}

#[derive(Deserialize, Debug)]
pub(crate) struct ChooseForm {
    csrf_token: String,
    option: usize,
}

/// Records one answer.
pub(crate) async fn choose_handler(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<ChooseForm>,
) -> Result<Redirect, CastingError> {
    csrf::verify(&session, &form.csrf_token).await?;
    let casting = store::load(&session).await?;
    let next = reduce(&state.ballot, casting, Action::Choose(form.option))?;
    debug!("Recorded answer {} of {}", next.answers.len(), state.ballot.rounds());
    store::save(&session, &next).await?;
    Ok(Redirect::to("/"))
}

/// Takes the photo, asks for the verdict, then waits for the poster.
pub(crate) async fn cast_handler(
    State(state): State<AppState>,
    session: Session,
    mut multipart: Multipart,
) -> Result<Redirect, CastingError> {
    let mut submitted_token = String::new();
    let mut presentation = Presentation::default();
    let mut photo: Option<Vec<u8>> = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "csrf_token" => submitted_token = field.text().await?,
            "presentation" => {
                presentation = field
                    .text()
                    .await?
                    .parse()
                    .map_err(|_| CastingError::BadRequest)?;
            }
            "photo" => photo = Some(field.bytes().await?.to_vec()),
            _ => {}
        }
    }
    csrf::verify(&session, &submitted_token).await?;

    let casting = store::load(&session).await?;
    if casting.stage(&state.ballot) != Stage::Resolving {
        return Err(CastingError::WrongStage);
    }
    let photo = match photo.as_deref().map(PosterGenerator::prepare) {
        Some(Ok(photo)) => photo,
        Some(Err(err)) => {
            info!("Rejected upload: {}", err);
            flash::set_notice(&session, Notice::BadPhoto).await?;
            return Ok(Redirect::to("/"));
        }
        None => {
            flash::set_notice(&session, Notice::BadPhoto).await?;
            return Ok(Redirect::to("/"));
        }
    };

    let verdict = state.services.resolver.resolve(&casting.answers).await;
    let archetype = state.catalog.archetype(&verdict.label).ok_or_else(|| {
        CastingError::InternalServerError(format!("verdict {} is not in the catalog", verdict.label))
    })?;
    let outcome = state
        .services
        .posters
        .generate(&photo, archetype, presentation)
        .await;

    // Another tab may have restarted or finished while the poster developed.
    let current = store::reload(&session).await?;
    if current != casting {
        info!("Session changed during poster generation, dropping the result");
        return Ok(Redirect::to("/"));
    }
    match outcome {
        Ok(poster_url) => {
            let next = reduce(
                &state.ballot,
                current,
                Action::Cast {
                    verdict,
                    poster_url,
                },
            )?;
            store::save(&session, &next).await?;
        }
        Err(PosterError::TimedOut(after)) => {
            warn!("Poster job timed out after {:?}", after);
            flash::set_notice(&session, Notice::PosterTimedOut).await?;
        }
        Err(err) => {
            warn!("Poster generation failed: {}", err);
            flash::set_notice(&session, Notice::PosterFailed).await?;
        }
    }
    Ok(Redirect::to("/"))
}

/// Serves the poster as an attachment.
pub(crate) async fn download_handler(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, CastingError> {
    let casting = store::load(&session).await?;
    let (Some(verdict), Some(poster_url)) = (casting.verdict, casting.poster_url) else {
        return Err(CastingError::WrongStage);
    };
    match fetch_poster(&state.services.http, &poster_url).await {
        Ok(download) => {
            let filename =
                download_filename(&verdict.label, &download.content_type, Utc::now().date_naive());
            Ok(Response::builder()
                .header(CONTENT_TYPE, download.content_type)
                .header(
                    CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{filename}\""),
                )
                .body(Body::from(download.bytes))?)
        }
        Err(err) => {
            warn!("{}", err);
            flash::set_notice(&session, Notice::DownloadFailed).await?;
            Ok(Redirect::to("/").into_response())
        }
    }
}

#[derive(Deserialize, Debug)]
pub(crate) struct RestartForm {
    csrf_token: String,
}

/// Clears the answers and verdict.
pub(crate) async fn restart_handler(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RestartForm>,
) -> Result<Redirect, CastingError> {
    csrf::verify(&session, &form.csrf_token).await?;
    let casting = store::load(&session).await?;
    let next = reduce(&state.ballot, casting, Action::Restart)?;
    store::save(&session, &next).await?;
    Ok(Redirect::to("/"))
}
