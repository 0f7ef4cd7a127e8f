//! `FileWatchServer`: the axum router, WebSocket upgrade and server lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use axum::Router;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, header};
use axum::response::{Html, Response};
use axum::routing::get;
use futures::StreamExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ServerConfig, SourcePaths};
use crate::demo::run_demo_writer;
use crate::error::Result;
use crate::hint::ResumeHint;
use crate::page::{read_file_if_modified, render_home};
use crate::session::run_session;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<ServerConfig>,
    sources: SourcePaths,
    shutdown: CancellationToken,
}

/// Query key carrying the resume hint.
const LAST_MOD_PARAM: &str = "lastMod";

/// The HTTP + WebSocket server.
pub struct FileWatchServer {
    state: AppState,
}

impl FileWatchServer {
    /// Validates `config` and prepares the server.
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let sources = config.sources()?;
        Ok(Self {
            state: AppState {
                config: Arc::new(config),
                sources,
                shutdown: CancellationToken::new(),
            },
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Cancelling this token stops the server and closes every session.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Build the router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(home_handler))
            .route("/ws", get(ws_handler))
            .with_state(self.state.clone())
    }

    /// Binds the configured address and serves in the background.
    pub async fn listen(self) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
        let listener = TcpListener::bind(&self.state.config.addr).await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(self.serve(listener));
        Ok((addr, handle))
    }

    /// Serves on `listener` until the shutdown token is cancelled.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        let router = self.router();
        let config = &self.state.config;

        if config.demo {
            let paths = config.paths.clone();
            let interval = config.demo_interval();
            let shutdown = self.state.shutdown.clone();
            tokio::spawn(async move {
                if let Err(e) = run_demo_writer(paths, interval, shutdown).await {
                    error!(error = %e, "demo writer stopped");
                }
            });
        }

        info!(%addr, primary = %self.state.sources.primary.display(), "filewatch server started");

        let shutdown = self.state.shutdown.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("filewatch server stopped");
        Ok(())
    }
}

/// GET /: the page with the current file content.
async fn home_handler(State(state): State<AppState>, headers: HeaderMap) -> Html<String> {
    let host = headers
        .get(header::HOST)
        .and_then(|host| host.to_str().ok())
        .unwrap_or("localhost");

    let (data, last_mod) = match read_file_if_modified(&state.sources.primary, UNIX_EPOCH).await {
        Ok((content, modified)) => (
            String::from_utf8_lossy(content.as_deref().unwrap_or_default()).into_owned(),
            ResumeHint::from_system_time(modified),
        ),
        Err(e) => (e.to_string(), ResumeHint::EPOCH),
    };

    Html(render_home(host, &data, last_mod))
}

/// GET /ws: upgrades and runs a streaming session.
async fn ws_handler(
    ws: WebSocketUpgrade,
    query: std::result::Result<Query<Vec<(String, String)>>, QueryRejection>,
    State(state): State<AppState>,
) -> Response {
    let resume_hint = match &query {
        Ok(Query(pairs)) => resume_hint_from(pairs),
        Err(e) => {
            debug!(error = %e, "unreadable query, resuming from epoch");
            ResumeHint::EPOCH
        }
    };
    let max_message_size = state.config.session.max_message_size;

    ws.max_message_size(max_message_size)
        .max_frame_size(max_message_size)
        .on_failed_upgrade(|e| warn!(error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| handle_socket(socket, state, resume_hint))
}

/// The first `lastMod` value wins; absent or malformed hints mean the epoch.
fn resume_hint_from(pairs: &[(String, String)]) -> ResumeHint {
    let last_mod = pairs
        .iter()
        .find(|(key, _)| key == LAST_MOD_PARAM)
        .map(|(_, value)| value.as_str());
    ResumeHint::parse(last_mod)
}

async fn handle_socket(socket: WebSocket, state: AppState, resume_hint: ResumeHint) {
    let (sink, stream) = socket.split();
    run_session(
        sink,
        stream,
        state.sources.clone(),
        &state.config.session,
        resume_hint,
        &state.shutdown,
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::TempLogFile;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn make_server(file: &TempLogFile) -> FileWatchServer {
        let config = ServerConfig {
            addr: "127.0.0.1:0".into(),
            paths: vec![file.path().to_path_buf()],
            ..ServerConfig::default()
        };
        FileWatchServer::new(config).unwrap()
    }

    async fn body_text(resp: Response) -> String {
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ServerConfig {
            session: crate::config::SessionConfig {
                heartbeat_period_ms: 10,
                liveness_timeout_ms: 10,
                ..Default::default()
            },
            paths: vec!["x.log".into()],
            ..ServerConfig::default()
        };
        assert!(FileWatchServer::new(config).is_err());
    }

    #[test]
    fn test_new_requires_a_file() {
        assert!(FileWatchServer::new(ServerConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_home_shows_file_content_and_last_mod() {
        let file = TempLogFile::with_content("hello a\n").unwrap();
        let server = make_server(&file);

        let req = Request::builder()
            .uri("/")
            .header(header::HOST, "example.test:8080")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let modified = std::fs::metadata(file.path()).unwrap().modified().unwrap();
        let last_mod = ResumeHint::from_system_time(modified);

        let page = body_text(resp).await;
        assert!(page.contains("hello a"));
        assert!(page.contains(&format!("ws://example.test:8080/ws?lastMod={last_mod}")));
    }

    #[tokio::test]
    async fn test_home_reports_read_errors_in_page() {
        let file = TempLogFile::new().unwrap();
        let server = make_server(&file);
        std::fs::remove_file(file.path()).unwrap();

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let page = body_text(resp).await;
        assert!(page.contains("I/O error"));
        assert!(page.contains("lastMod=0"));
    }

    #[tokio::test]
    async fn test_home_rejects_other_methods() {
        let file = TempLogFile::new().unwrap();
        let server = make_server(&file);

        let req = Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_unknown_route_returns_404() {
        let file = TempLogFile::new().unwrap();
        let server = make_server(&file);

        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ws_requires_upgrade() {
        let file = TempLogFile::new().unwrap();
        let server = make_server(&file);

        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn test_resume_hint_from_query() {
        assert_eq!(resume_hint_from(&pairs(&[("lastMod", "1f")])).nanos(), 0x1f);
        assert_eq!(resume_hint_from(&pairs(&[])), ResumeHint::EPOCH);
        assert_eq!(resume_hint_from(&pairs(&[("lastMod", "zz")])), ResumeHint::EPOCH);
    }

    #[test]
    fn test_first_duplicate_last_mod_wins() {
        let query = pairs(&[("other", "x"), ("lastMod", "1"), ("lastMod", "2")]);
        assert_eq!(resume_hint_from(&query).nanos(), 1);
    }

    #[tokio::test]
    async fn test_listen_and_shutdown() {
        let file = TempLogFile::new().unwrap();
        let server = make_server(&file);
        let shutdown = server.shutdown_token();

        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        shutdown.cancel();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
