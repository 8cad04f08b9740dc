//! The browser front end: one page that follows the session through the quiz.

use std::num::NonZeroU16;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::signal;
use tower_http::services::ServeDir;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};
use tracing::{error, info};

use crate::catalog::Catalog;
use crate::cli::Services;
use crate::constants::{MAX_UPLOAD_BYTES, SESSION_INACTIVITY_HOURS};
use crate::flow::Ballot;

pub(crate) mod csrf;
pub(crate) mod flash;
mod prelude;
pub(crate) mod store;
mod views;

use views::{cast_handler, choose_handler, download_handler, home_handler, restart_handler};

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    catalog: Arc<Catalog>,
    ballot: Arc<Ballot>,
    services: Services,
    static_dir: PathBuf,
}

impl AppState {
    /// Bundles the loaded catalog, ballot and API clients.
    pub fn new(catalog: Arc<Catalog>, ballot: Ballot, services: Services, static_dir: PathBuf) -> Self {
        Self {
            catalog,
            ballot: Arc::new(ballot),
            services,
            static_dir,
        }
    }
}

/// Builds the router with sessions, static files and the upload limit.
pub fn create_router(state: AppState) -> Router {
    let sessions = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(
            SESSION_INACTIVITY_HOURS,
        )));

    Router::new()
        .route("/", get(home_handler))
        .route("/choose", post(choose_handler))
        .route("/cast", post(cast_handler))
        .route("/poster/download", get(download_handler))
        .route("/restart", post(restart_handler))
        .nest_service("/static", ServeDir::new(&state.static_dir))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(sessions)
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
    }
    info!("Shutting down");
}

/// Serves the app until ctrl-c.
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    state: AppState,
) -> Result<(), anyhow::Error> {
    let app = create_router(state);

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    use crate::clock::ManualClock;
    use crate::photo::sample_png;
    use crate::poster::{PollSettings, PosterError, PosterGenerator};
    use crate::replicate::{PosterInput, Prediction, PredictionApi, PredictionStatus};
    use crate::testing::{StubPredictions, StubText};
    use crate::verdict::{FallbackPolicy, VerdictResolver};

    const BOUNDARY: &str = "casting-test-boundary";

    fn services(catalog: &Arc<Catalog>, reply: &str, predictions: StubPredictions) -> Services {
        Services {
            resolver: VerdictResolver::new(
                Arc::new(StubText::replying(reply)),
                catalog.clone(),
                FallbackPolicy::Fixed,
            ),
            posters: PosterGenerator::new(
                Arc::new(predictions),
                Arc::new(ManualClock::new()),
                PollSettings::default(),
            ),
            http: reqwest::Client::new(),
        }
    }

    fn app_with(ballot_size: Option<usize>, predictions: StubPredictions) -> Router {
        let catalog = Arc::new(Catalog::bundled().expect("catalog"));
        let ballot = match ballot_size {
            Some(size) => Ballot::bracket(&catalog, size).expect("bracket"),
            None => Ballot::questions(&catalog),
        };
        let services = services(
            &catalog,
            r#"{"archetype": "Cyberpunk Vigilante", "reason": "Neon suits you."}"#,
            predictions,
        );
        create_router(AppState::new(
            catalog,
            ballot,
            services,
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("static"),
        ))
    }

    fn succeeding() -> StubPredictions {
        StubPredictions::new(
            vec![PredictionStatus::Pending, PredictionStatus::Succeeded],
            Some(json!(["http://127.0.0.1:1/poster.png"])),
        )
    }

    /// Keeps the session cookie between requests.
    struct Browser {
        app: Router,
        cookie: Option<String>,
    }

    impl Browser {
        fn new(app: Router) -> Self {
            Self { app, cookie: None }
        }

        async fn send(
            &mut self,
            request: axum::http::request::Builder,
            body: Body,
        ) -> axum::response::Response {
            let response = self
                .app
                .clone()
                .oneshot(self.request(request, body))
                .await
                .unwrap();
            if let Some(value) = response.headers().get(SET_COOKIE) {
                let pair = value.to_str().unwrap().split(';').next().unwrap();
                self.cookie = Some(pair.to_string());
            }
            response
        }

        fn request(&self, request: axum::http::request::Builder, body: Body) -> Request<Body> {
            let request = match &self.cookie {
                Some(cookie) => request.header(COOKIE, cookie),
                None => request,
            };
            request.body(body).unwrap()
        }

        fn photo_request(&self, token: &str, photo: &[u8]) -> Request<Body> {
            self.request(
                Request::builder().method("POST").uri("/cast").header(
                    CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                ),
                Body::from(multipart_body(token, "actress", photo)),
            )
        }

        async fn get(&mut self, uri: &str) -> axum::response::Response {
            self.send(Request::builder().method("GET").uri(uri), Body::empty())
                .await
        }

        async fn page(&mut self, uri: &str) -> String {
            let response = self.get(uri).await;
            assert_eq!(response.status(), StatusCode::OK);
            read_body(response).await
        }

        async fn post_form(&mut self, uri: &str, form: String) -> axum::response::Response {
            self.send(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded"),
                Body::from(form),
            )
            .await
        }

        async fn post_photo(&mut self, token: &str, photo: &[u8]) -> axum::response::Response {
            let request = self.photo_request(token, photo);
            self.app.clone().oneshot(request).await.unwrap()
        }
    }

    fn multipart_body(token: &str, presentation: &str, photo: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in [("csrf_token", token), ("presentation", presentation)] {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"photo\"; filename=\"me.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(photo);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn read_body(response: axum::response::Response) -> String {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        String::from_utf8_lossy(&bytes).to_string()
    }

    fn csrf_from(page: &str) -> String {
        let marker = "name=\"csrf_token\" value=\"";
        let start = page.find(marker).expect("csrf field") + marker.len();
        let end = page[start..].find('"').expect("csrf end");
        page[start..start + end].to_string()
    }

    fn assert_redirects_home(response: &axum::response::Response) {
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/");
    }

    async fn answer_everything(browser: &mut Browser, rounds: usize) -> String {
        for step in 0..rounds {
            let page = browser.page("/").await;
            assert!(page.contains(&format!("{} of {}", step + 1, rounds)));
            let token = csrf_from(&page);
            let response = browser
                .post_form("/choose", format!("csrf_token={token}&option={}", step % 2))
                .await;
            assert_redirects_home(&response);
        }
        browser.page("/").await
    }

    #[tokio::test]
    async fn quiz_to_poster_and_back() {
        let mut browser = Browser::new(app_with(None, succeeding()));

        let first = browser.page("/").await;
        assert!(first.contains("Hollywood Casting"));
        assert!(first.contains("THE FRONTIER"));

        let upload = answer_everything(&mut browser, 3).await;
        assert!(upload.contains("type=\"file\""));
        let token = csrf_from(&upload);

        let response = browser.post_photo(&token, &sample_png(64, 96)).await;
        assert_redirects_home(&response);

        let result = browser.page("/").await;
        assert!(result.contains("Cyberpunk Vigilante"));
        assert!(result.contains("Neon suits you."));
        assert!(result.contains("poster.png"));
        assert!(result.contains("/poster/download"));

        let token = csrf_from(&result);
        let response = browser
            .post_form("/restart", format!("csrf_token={token}"))
            .await;
        assert_redirects_home(&response);
        let again = browser.page("/").await;
        assert!(again.contains("1 of 3"));
    }

    #[tokio::test]
    async fn choose_requires_the_session_token() {
        let mut browser = Browser::new(app_with(None, succeeding()));
        browser.page("/").await;

        let response = browser
            .post_form("/choose", "csrf_token=forged&option=0".to_string())
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(browser.page("/").await.contains("1 of 3"));
    }

    #[tokio::test]
    async fn out_of_range_option_is_rejected() {
        let mut browser = Browser::new(app_with(None, succeeding()));
        let token = csrf_from(&browser.page("/").await);

        let response = browser
            .post_form("/choose", format!("csrf_token={token}&option=2"))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn photo_before_answers_goes_back_to_the_quiz() {
        let mut browser = Browser::new(app_with(None, succeeding()));
        let token = csrf_from(&browser.page("/").await);

        let response = browser.post_photo(&token, &sample_png(8, 8)).await;
        assert_redirects_home(&response);
        assert!(browser.page("/").await.contains("1 of 3"));
    }

    #[tokio::test]
    async fn failed_poster_stays_on_upload_with_notice() {
        let failing = StubPredictions::new(vec![PredictionStatus::Failed], None);
        let mut browser = Browser::new(app_with(None, failing));
        let upload = answer_everything(&mut browser, 3).await;
        let token = csrf_from(&upload);

        let response = browser.post_photo(&token, &sample_png(64, 64)).await;
        assert_redirects_home(&response);

        let page = browser.page("/").await;
        assert!(page.contains("type=\"file\""));
        assert!(page.contains("develop your poster"));

        // the notice is shown once
        let page = browser.page("/").await;
        assert!(!page.contains("develop your poster"));
    }

    #[tokio::test]
    async fn garbage_upload_is_a_notice() {
        let mut browser = Browser::new(app_with(None, succeeding()));
        let upload = answer_everything(&mut browser, 3).await;
        let token = csrf_from(&upload);

        let response = browser.post_photo(&token, b"definitely not a photo").await;
        assert_redirects_home(&response);
        let page = browser.page("/").await;
        assert!(page.contains("JPEG or PNG"));
        assert!(page.contains("type=\"file\""));
    }

    #[tokio::test]
    async fn download_failure_keeps_the_result() {
        let mut browser = Browser::new(app_with(None, succeeding()));
        let upload = answer_everything(&mut browser, 3).await;
        let token = csrf_from(&upload);
        browser.post_photo(&token, &sample_png(32, 32)).await;

        // nothing listens on port 1
        let response = browser.get("/poster/download").await;
        assert_redirects_home(&response);
        assert!(response.headers().get(CONTENT_DISPOSITION).is_none());

        let page = browser.page("/").await;
        assert!(page.contains("Cyberpunk Vigilante"));
        assert!(page.contains("still shown below"));
    }

    #[tokio::test]
    async fn download_before_result_redirects() {
        let mut browser = Browser::new(app_with(None, succeeding()));
        let response = browser.get("/poster/download").await;
        assert_redirects_home(&response);
    }

    #[tokio::test]
    async fn bracket_mode_runs_all_matches() {
        let mut browser = Browser::new(app_with(Some(4), succeeding()));
        let first = browser.page("/").await;
        assert!(first.contains("Round 1"));

        let upload = answer_everything(&mut browser, 3).await;
        assert!(upload.contains("type=\"file\""));
    }

    /// Holds the poster job open until the test lets it finish.
    struct GatedPredictions {
        entered: Arc<tokio::sync::Notify>,
        release: Arc<tokio::sync::Notify>,
    }

    #[async_trait::async_trait]
    impl PredictionApi for GatedPredictions {
        async fn create(&self, _input: &PosterInput) -> Result<Prediction, PosterError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(Prediction {
                id: "gated".to_string(),
                status: PredictionStatus::Succeeded,
                output: Some(json!(["http://127.0.0.1:1/late.png"])),
                error: None,
            })
        }

        async fn get(&self, id: &str) -> Result<Prediction, PosterError> {
            Err(PosterError::Failed(format!("{id} was never polled")))
        }
    }

    #[tokio::test]
    async fn restart_during_generation_wins() {
        let entered = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());
        let catalog = Arc::new(Catalog::bundled().expect("catalog"));
        let mut services = services(
            &catalog,
            r#"{"archetype": "Zen Master", "reason": "Calm."}"#,
            succeeding(),
        );
        services.posters = PosterGenerator::new(
            Arc::new(GatedPredictions {
                entered: entered.clone(),
                release: release.clone(),
            }),
            Arc::new(ManualClock::new()),
            PollSettings::default(),
        );
        let ballot = Ballot::questions(&catalog);
        let app = create_router(AppState::new(
            catalog,
            ballot,
            services,
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("static"),
        ));
        let mut browser = Browser::new(app);
        let upload = answer_everything(&mut browser, 3).await;
        let token = csrf_from(&upload);

        let cast = tokio::spawn(
            browser
                .app
                .clone()
                .oneshot(browser.photo_request(&token, &sample_png(16, 16))),
        );
        entered.notified().await;

        let response = browser
            .post_form("/restart", format!("csrf_token={token}"))
            .await;
        assert_redirects_home(&response);
        release.notify_one();
        let response = cast.await.expect("cast task").expect("cast response");
        assert_redirects_home(&response);

        let page = browser.page("/").await;
        assert!(page.contains("1 of 3"));
        assert!(!page.contains("Zen Master"));
    }
}
