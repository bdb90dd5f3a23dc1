use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, OnceLock,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use opener_common::{
    dispatch::{CommandTransport, LinkStatus, TransportError, TransportResponse},
    Dispatcher, OpenerConfig, OpenerEngine, StatusFrame, SystemClock, TickOutcome, TlsMode,
    Uplink, WallClock,
};

/// Simulated button levels, written by the control API and sampled by the
/// loop thread.
#[derive(Debug, Default)]
struct SimButtons {
    unlock: AtomicBool,
    lock: AtomicBool,
}

impl SimButtons {
    fn slot(&self, id: &str) -> Option<&AtomicBool> {
        match id {
            "a" | "A" => Some(&self.unlock),
            "b" | "B" => Some(&self.lock),
            _ => None,
        }
    }
}

#[derive(Clone)]
struct AppState {
    buttons: Arc<SimButtons>,
    last_frame: Arc<Mutex<Option<StatusFrame>>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct ButtonsView {
    a: bool,
    b: bool,
}

#[derive(Debug, Serialize)]
struct StatusView {
    buttons: ButtonsView,
    screen: Option<StatusFrame>,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = OpenerConfig::default();
    apply_env(&mut config, |key| std::env::var(key).ok());
    config.sanitize();

    if !config.api.has_credentials() {
        warn!("SWITCHBOT_TOKEN / SWITCHBOT_SECRET / SWITCHBOT_DEVICE_ID not all set; API will reject commands");
    }

    let app_state = AppState {
        buttons: Arc::new(SimButtons::default()),
        last_frame: Arc::new(Mutex::new(None)),
    };

    let transport = build_transport(config.api.tls, config.api.timeout_ms).await?;
    spawn_opener_loop(config, transport, app_state.clone())?;

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/buttons/{id}/press", post(handle_button_press))
        .route("/api/buttons/{id}/release", post(handle_button_release))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let addr: SocketAddr = std::env::var("OPENER_HTTP_ADDR")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080)));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind simulator control API at {addr}"))?;

    info!("simulator control API listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn apply_env<F>(config: &mut OpenerConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(token) = lookup("SWITCHBOT_TOKEN") {
        config.api.token = token;
    }
    if let Some(secret) = lookup("SWITCHBOT_SECRET") {
        config.api.secret = secret;
    }
    if let Some(device_id) = lookup("SWITCHBOT_DEVICE_ID") {
        config.api.device_id = device_id;
    }
    if let Some(host) = lookup("SWITCHBOT_API_HOST") {
        config.api.host = host;
    }
    if let Some(verify) = lookup("OPENER_TLS_VERIFY") {
        config.api.tls = if matches!(verify.as_str(), "1" | "true") {
            TlsMode::Verified
        } else {
            TlsMode::Insecure
        };
    }
    if let Some(ms) = lookup("OPENER_HTTP_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        config.api.timeout_ms = ms;
    }
    if let Some(ms) = lookup("OPENER_LONG_PRESS_MS").and_then(|v| v.parse().ok()) {
        config.timing.long_press_ms = ms;
    }
    if let Some(ms) = lookup("OPENER_COOLDOWN_MS").and_then(|v| v.parse().ok()) {
        config.timing.cooldown_ms = ms;
    }
    if let Some(ms) = lookup("OPENER_ERROR_OVERLAY_MS").and_then(|v| v.parse().ok()) {
        config.timing.error_overlay_ms = ms;
    }
    if let Some(ms) = lookup("OPENER_REFRESH_MS").and_then(|v| v.parse().ok()) {
        config.timing.display_refresh_ms = ms;
    }
    if let Some(hours) = lookup("OPENER_UTC_OFFSET_HOURS").and_then(|v| v.parse().ok()) {
        config.display.utc_offset_hours = hours;
    }
    if let Some(label) = lookup("OPENER_TZ_LABEL") {
        config.display.timezone_label = label;
    }
}

/// Builds the blocking HTTP client off the async runtime, where reqwest's
/// blocking client may not be created.
async fn build_transport(tls: TlsMode, timeout_ms: u64) -> anyhow::Result<ReqwestTransport> {
    tokio::task::spawn_blocking(move || ReqwestTransport::new(tls, timeout_ms))
        .await
        .context("HTTP client setup task failed")?
}

/// Runs the opener loop on its own OS thread; the HTTPS call blocks it the
/// same way it blocks the firmware loop.
fn spawn_opener_loop(
    config: OpenerConfig,
    transport: ReqwestTransport,
    app_state: AppState,
) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("opener-loop".into())
        .spawn(move || {
            let mut dispatcher = Dispatcher::new(config.api.clone(), transport);
            let mut engine = OpenerEngine::new(&config);
            let clock = SystemClock;
            let link = HostLink;

            engine.force_redraw();
            info!(
                "opener loop started: long-press {}ms, cooldown {}ms",
                config.timing.long_press_ms, config.timing.cooldown_ms
            );

            loop {
                let now_ms = monotonic_ms();
                let unlock_pressed = app_state.buttons.unlock.load(Ordering::Relaxed);
                let lock_pressed = app_state.buttons.lock.load(Ordering::Relaxed);

                if let Some(outcome) = engine.tick(
                    unlock_pressed,
                    lock_pressed,
                    now_ms,
                    Uplink {
                        dispatcher: &mut dispatcher,
                        link: &link,
                        clock: &clock,
                    },
                    monotonic_ms,
                ) {
                    log_outcome(&outcome);
                }

                if let Some(frame) = engine.frame_if_due(monotonic_ms(), clock.epoch_secs(), || None)
                {
                    info!(
                        label = frame.label,
                        battery = %frame.battery_text,
                        time = %frame.time_text,
                        overlay = frame.error_overlay,
                        "screen redraw"
                    );
                    match app_state.last_frame.lock() {
                        Ok(mut last) => *last = Some(frame),
                        Err(err) => warn!("frame slot poisoned: {err}"),
                    }
                }

                thread::sleep(Duration::from_millis(config.timing.tick_ms));
            }
        })
        .context("failed to spawn opener loop thread")?;
    Ok(())
}

fn log_outcome(outcome: &TickOutcome) {
    let command = outcome.command.as_str();
    match &outcome.result {
        Ok(response) => info!(command, status = response.status, "command sent"),
        Err(err) if err.is_connectivity() => warn!(command, "command not sent: {err}"),
        Err(err) => warn!(command, "command failed: {err}"),
    }
}

/// The desktop's network is assumed up; reqwest reports real failures.
struct HostLink;

impl LinkStatus for HostLink {
    fn is_connected(&self) -> bool {
        true
    }
}

struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    fn new(tls: TlsMode, timeout_ms: u64) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .danger_accept_invalid_certs(tls == TlsMode::Insecure)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl CommandTransport for ReqwestTransport {
    fn post(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<TransportResponse, TransportError> {
        let mut request = self.client.post(url).body(body.to_vec());
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request
            .send()
            .map_err(|err| TransportError(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| TransportError(err.to_string()))?;

        Ok(TransportResponse { status, body })
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let screen = match state.last_frame.lock() {
        Ok(last) => last.clone(),
        Err(_) => {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "frame slot poisoned");
        }
    };

    Json(StatusView {
        buttons: buttons_view(&state.buttons),
        screen,
    })
    .into_response()
}

async fn handle_button_press(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    set_button(&state, &id, true)
}

async fn handle_button_release(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    set_button(&state, &id, false)
}

fn set_button(state: &AppState, id: &str, pressed: bool) -> axum::response::Response {
    let Some(slot) = state.buttons.slot(id) else {
        return error_response(StatusCode::NOT_FOUND, "Unknown button (expected 'a' or 'b')");
    };
    slot.store(pressed, Ordering::Relaxed);
    Json(buttons_view(&state.buttons)).into_response()
}

fn buttons_view(buttons: &SimButtons) -> ButtonsView {
    ButtonsView {
        a: buttons.unlock.load(Ordering::Relaxed),
        b: buttons.lock.load(Ordering::Relaxed),
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
