use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info, warn};

mod metrics;

use hirogari_decoder::{DecodeService, Decoded, ErrorPayload, Opts, Platform};

#[derive(Parser, Debug)]
#[command(name = "hirogari-server")]
#[command(about = "Local HTTP decode service for AX.25 recordings")]
struct Params {
    /// TCP port to listen on.
    #[arg(default_value_t = 8080)]
    port: u16,

    /// Host interface to bind to.
    #[arg(long = "host", default_value = "127.0.0.1")]
    host: String,

    /// Engine executable to run instead of the platform default.
    #[arg(short = 'd', long = "decoder")]
    decoder: Option<PathBuf>,

    /// Working directory for the engine process.
    #[arg(long = "decoder-dir")]
    decoder_dir: Option<PathBuf>,

    /// Seconds to wait for the engine before killing it (0 waits forever).
    #[arg(short = 't', long = "timeout-secs", default_value_t = 300)]
    timeout_secs: u64,
}

impl Params {
    fn opts(&self) -> Opts {
        Opts {
            program: self.decoder.clone(),
            working_dir: self.decoder_dir.clone(),
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
        }
    }
}

/// How long in-flight requests may keep running after `/close`.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Clone)]
struct AppState {
    service: DecodeService,
    close: Arc<watch::Sender<bool>>,
}

#[derive(Debug, Default, Deserialize)]
struct DecodeQuery {
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    baudrate: Option<String>,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl From<hirogari_decoder::Error> for AppError {
    fn from(err: hirogari_decoder::Error) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            message: ErrorPayload::from(&err).message,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorPayload {
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

#[tokio::main]
async fn main() {
    hirogari_decoder::init_logging();

    if let Err(err) = run().await {
        error!(error = ?err, "hirogari-server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let params = Params::parse();

    metrics::init();

    if let Err(err) = Platform::current() {
        warn!(os = std::env::consts::OS, error = %err, "decode requests will be rejected");
    }

    let addr: SocketAddr = format!("{}:{}", params.host, params.port)
        .parse()
        .context("invalid host/port bind address")?;

    let service = DecodeService::new(params.opts()).context("invalid decoder options")?;
    let (close_tx, close_rx) = watch::channel(false);
    let close = Arc::new(close_tx);
    let state = AppState {
        service,
        close: close.clone(),
    };

    tokio::spawn(close_on_interrupt(close));

    let listener = TcpListener::bind(addr).await.context("bind failed")?;
    info!(%addr, "listening");
    serve(listener, state, close_rx).await
}

/// Serve until closed, then give in-flight requests [`CLOSE_GRACE`] to finish.
///
/// Requests still running after that are abandoned. Their engine processes are killed
/// once the runtime drops the request tasks.
async fn serve(
    listener: TcpListener,
    state: AppState,
    close_rx: watch::Receiver<bool>,
) -> Result<()> {
    let server = axum::serve(listener, router(state))
        .with_graceful_shutdown(closed(close_rx.clone()))
        .into_future();

    tokio::select! {
        res = server => res.context("server error")?,
        () = abandon_after_grace(close_rx) => {
            warn!(
                grace_ms = CLOSE_GRACE.as_millis() as u64,
                "dropping requests still in flight"
            );
        }
    }

    info!("server stopped");
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics::prometheus_metrics))
        .route("/api/decode-result", get(decode_result))
        .route("/close", get(close))
        .route_layer(from_fn(metrics::track_http_metrics))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}

async fn closed(mut close_rx: watch::Receiver<bool>) {
    // A dropped sender can never close the server, so treat it as closed.
    let _ = close_rx.wait_for(|closed| *closed).await;
}

async fn abandon_after_grace(close_rx: watch::Receiver<bool>) {
    closed(close_rx).await;
    tokio::time::sleep(CLOSE_GRACE).await;
}

async fn close_on_interrupt(close: Arc<watch::Sender<bool>>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("interrupt received");
            close.send_replace(true);
        }
        Err(err) => warn!(error = %err, "failed to listen for ctrl-c, waiting for /close"),
    }
}

async fn root() -> &'static str {
    "hirogari-server: GET /api/decode-result?protocol=ax25&path=<file>&baudrate=<baud>"
}

async fn healthz() -> &'static str {
    "ok"
}

async fn close(State(state): State<AppState>) -> &'static str {
    info!("close requested");
    state.close.send_replace(true);
    "closing"
}

async fn decode_result(
    State(state): State<AppState>,
    Query(query): Query<DecodeQuery>,
) -> std::result::Result<Response, AppError> {
    let res = state
        .service
        .decode_result(
            query.protocol.as_deref(),
            query.path.as_deref(),
            query.baudrate.as_deref(),
        )
        .await;

    let decoded = match res {
        Ok(decoded) => decoded,
        Err(err) => {
            metrics::record_decode(metrics::DecodeOutcome::Failed);
            return Err(err.into());
        }
    };

    metrics::record_decode(outcome_of(&decoded));
    Ok((
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        )],
        decoded.text(),
    )
        .into_response())
}

fn outcome_of(decoded: &Decoded) -> metrics::DecodeOutcome {
    if decoded.is_degraded() {
        metrics::DecodeOutcome::Degraded
    } else {
        metrics::DecodeOutcome::Complete
    }
}
