//! HTTP server for the live waterfall image.
//!
//! Serves an auto-refreshing page that embeds the most recently rendered PNG.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub const DEFAULT_REFRESH_SECS: u64 = 5;

/// Configuration for the waterfall HTTP server.
#[derive(Debug, Clone)]
pub struct WaterfallServerConfig {
    pub addr: SocketAddr,
    /// PNG the page embeds; served under its file name.
    pub image_path: PathBuf,
    pub refresh_secs: u64,
}

impl WaterfallServerConfig {
    #[must_use]
    pub const fn new(addr: SocketAddr, image_path: PathBuf) -> Self {
        Self {
            addr,
            image_path,
            refresh_secs: DEFAULT_REFRESH_SECS,
        }
    }

    #[must_use]
    pub const fn with_refresh_secs(mut self, refresh_secs: u64) -> Self {
        self.refresh_secs = refresh_secs;
        self
    }

    fn image_name(&self) -> String {
        self.image_path
            .file_name()
            .map_or_else(|| "waterfall.png".to_string(), |name| name.to_string_lossy().into_owned())
    }
}

/// HTTP server wrapper.
pub struct WaterfallServer {
    config: WaterfallServerConfig,
}

impl WaterfallServer {
    #[must_use]
    pub const fn new(config: WaterfallServerConfig) -> Self {
        Self { config }
    }

    /// Runs the HTTP server until the task is dropped.
    ///
    /// # Errors
    /// Returns any listener or server error.
    pub async fn serve(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.config.addr;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let app = build_router(&self.config);

        info!("waterfall view listening on http://{addr}/");
        axum::serve(listener, app).await?;
        Ok(())
    }

    /// Runs the server as a background task, logging a failure if it stops.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(err) = self.serve().await {
                error!("waterfall view server failed: {err}");
            }
        })
    }
}

#[derive(Debug)]
struct ViewState {
    image_path: PathBuf,
    image_name: String,
    refresh_secs: u64,
}

/// Builds the router for `/`, the image and `/health`.
pub fn build_router(config: &WaterfallServerConfig) -> Router {
    let state = Arc::new(ViewState {
        image_path: config.image_path.clone(),
        image_name: config.image_name(),
        refresh_secs: config.refresh_secs,
    });
    let image_route = format!("/{}", state.image_name);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route(&image_route, get(image))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn index(State(state): State<Arc<ViewState>>) -> Html<String> {
    Html(format!(
        "<html><head><meta http-equiv=\"refresh\" content=\"{}\"></head>\
         <body><img src=\"{}\"></img></body></html>",
        state.refresh_secs, state.image_name
    ))
}

async fn image(State(state): State<Arc<ViewState>>) -> Response {
    match tokio::fs::read(&state.image_path).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "image/png"),
                (header::CACHE_CONTROL, "no-store"),
            ],
            bytes,
        )
            .into_response(),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, "waterfall not rendered yet").into_response()
        }
        Err(err) => {
            warn!("cannot read {}: {err}", state.image_path.display());
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    fn config(dir: &tempfile::TempDir) -> WaterfallServerConfig {
        WaterfallServerConfig::new(
            "127.0.0.1:0".parse().unwrap(),
            dir.path().join("waterfall.png"),
        )
    }

    async fn get_path(router: Router, path: &str) -> (StatusCode, Vec<u8>) {
        let response = router
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn index_refreshes_and_embeds_image() {
        let dir = tempfile::tempdir().unwrap();
        let router = build_router(&config(&dir).with_refresh_secs(7));

        let (status, body) = get_path(router, "/").await;
        let body = String::from_utf8(body).unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("content=\"7\""));
        assert!(body.contains("<img src=\"waterfall.png\">"));
    }

    #[tokio::test]
    async fn image_is_missing_until_written() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);

        let (status, _) = get_path(build_router(&config), "/waterfall.png").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        std::fs::write(&config.image_path, b"\x89PNG fake").unwrap();
        let (status, body) = get_path(build_router(&config), "/waterfall.png").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"\x89PNG fake");
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get_path(build_router(&config(&dir)), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }
}
