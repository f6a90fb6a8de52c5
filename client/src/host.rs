use std::{
    collections::HashMap, io::ErrorKind, net::SocketAddr, path::PathBuf, sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot},
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use lamp_common::{
    DeviceRequest, EngineAction, EngineError, HexColor, LampEngine, LampStatus, RemoteAlarm,
    RuntimeConfig, UpdateOrigin, PATH_GET_ALARM, PATH_GET_BRIGHTNESS, PATH_GET_COLOR,
};

use crate::device::DeviceClient;

const EVENT_QUEUE_DEPTH: usize = 64;
const WRITE_QUEUE_DEPTH: usize = 128;

#[derive(Clone)]
struct AppState {
    events: mpsc::Sender<EngineEvent>,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
}

#[derive(Debug)]
enum EngineEvent {
    AlarmTick(NaiveDateTime),
    AlarmPolled(String),
    BrightnessPolled(String),
    ColorPolled(String),
    User(UserCommand, oneshot::Sender<Result<LampStatus, EngineError>>),
}

#[derive(Debug)]
enum UserCommand {
    EditAlarm {
        enabled: Option<bool>,
        time: Option<String>,
    },
    BeginAlarmEdit,
    EndAlarmEdit,
    BeginInteraction,
    EndInteraction,
    Picker {
        color: HexColor,
        brightness: u8,
    },
    Command(String),
    TestAlarm,
    Status,
}

/// Monotonic milliseconds since startup, on tokio's clock so paused-time
/// tests drive it too.
#[derive(Debug, Clone, Copy)]
struct Clock {
    start: Instant,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct AlarmEdit {
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PickerUpdate {
    color: String,
    brightness: u8,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    apply_env_overrides(&mut runtime, |key| std::env::var(key).ok());
    runtime.sanitize();

    let device = DeviceClient::new(&runtime.device)
        .context("failed to build device client")?;
    info!("controlling lamp at {}", device.base_url());

    let mut engine = LampEngine::new(runtime.lamp.clone());
    load_initial_state(&device, &mut engine).await;

    let (events, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let writes = spawn_write_loop(device.clone());

    spawn_alarm_ticker(events.clone(), Duration::from_millis(runtime.lamp.alarm_tick_ms));
    let poll_interval = Duration::from_millis(runtime.lamp.poll_interval_ms);
    spawn_poll_loop(
        device.clone(),
        PATH_GET_ALARM,
        poll_interval,
        events.clone(),
        EngineEvent::AlarmPolled,
    );
    spawn_poll_loop(
        device.clone(),
        PATH_GET_BRIGHTNESS,
        poll_interval,
        events.clone(),
        EngineEvent::BrightnessPolled,
    );
    spawn_poll_loop(
        device,
        PATH_GET_COLOR,
        poll_interval,
        events.clone(),
        EngineEvent::ColorPolled,
    );
    tokio::spawn(run_engine_loop(engine, events_rx, writes, Clock::new()));

    let app = router(AppState { events });

    let addr = SocketAddr::from(([0, 0, 0, 0], runtime.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind control server at {addr}"))?;

    info!("control panel listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/alarm", put(handle_put_alarm))
        .route("/api/alarm/edit/begin", post(handle_alarm_edit_begin))
        .route("/api/alarm/edit/end", post(handle_alarm_edit_end))
        .route("/api/alarm/test", post(handle_alarm_test))
        .route("/api/picker", post(handle_post_picker))
        .route("/api/picker/begin", post(handle_picker_begin))
        .route("/api/picker/end", post(handle_picker_end))
        .route("/api/command", post(handle_post_command))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn load_initial_state(device: &DeviceClient, engine: &mut LampEngine) {
    let (color, brightness, alarm) = tokio::join!(
        device.fetch_text(PATH_GET_COLOR),
        device.fetch_text(PATH_GET_BRIGHTNESS),
        device.fetch_text(PATH_GET_ALARM),
    );

    let color = color
        .inspect_err(|err| warn!("initial color fetch failed: {err}"))
        .ok();
    let brightness = brightness
        .inspect_err(|err| warn!("initial brightness fetch failed: {err}"))
        .ok();
    let alarm = alarm
        .inspect_err(|err| warn!("initial alarm fetch failed: {err}"))
        .ok()
        .and_then(|body| {
            RemoteAlarm::from_json(&body)
                .inspect_err(|err| warn!("discarding initial alarm payload: {err}"))
                .ok()
        });

    for err in engine.load_initial(color.as_deref(), brightness.as_deref(), alarm.as_ref()) {
        warn!("discarding initial device value: {err}");
    }
    info!(
        "loaded device state: color {}, brightness {}, alarm {:?} at {:?}",
        engine.color(),
        engine.brightness(),
        engine.alarm().enabled,
        engine.alarm().time
    );
}

fn spawn_alarm_ticker(events: mpsc::Sender<EngineEvent>, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let now = Local::now().naive_local();
            if events.send(EngineEvent::AlarmTick(now)).await.is_err() {
                break;
            }
        }
    });
}

fn spawn_poll_loop(
    device: DeviceClient,
    path: &'static str,
    period: Duration,
    events: mpsc::Sender<EngineEvent>,
    wrap: fn(String) -> EngineEvent,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match device.fetch_text(path).await {
                Ok(body) => {
                    if events.send(wrap(body)).await.is_err() {
                        break;
                    }
                }
                Err(err) => warn!("device poll failed: {err}"),
            }
        }
    });
}

/// Sends device writes one at a time, in the order the engine produced them.
fn spawn_write_loop(device: DeviceClient) -> mpsc::Sender<DeviceRequest> {
    let (writes, mut pending) = mpsc::channel::<DeviceRequest>(WRITE_QUEUE_DEPTH);
    tokio::spawn(async move {
        while let Some(request) = pending.recv().await {
            if let Err(err) = device.send(&request).await {
                warn!("device write failed: {err}");
            }
        }
    });
    writes
}

async fn run_engine_loop(
    mut engine: LampEngine,
    mut events: mpsc::Receiver<EngineEvent>,
    writes: mpsc::Sender<DeviceRequest>,
    clock: Clock,
) {
    loop {
        let deadline = engine.next_deadline_ms().map(|ms| clock.instant_at(ms));
        let actions = tokio::select! {
            event = events.recv() => match event {
                Some(event) => handle_engine_event(&mut engine, event, clock.now_ms()),
                None => break,
            },
            _ = sleep_until_deadline(deadline) => engine.advance(clock.now_ms()),
        };
        execute_engine_actions(actions, &writes);
    }
    info!("engine loop stopped");
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn handle_engine_event(
    engine: &mut LampEngine,
    event: EngineEvent,
    now_ms: u64,
) -> Vec<EngineAction> {
    match event {
        EngineEvent::AlarmTick(now) => return engine.tick_alarm(now, now_ms),
        EngineEvent::AlarmPolled(body) => match RemoteAlarm::from_json(&body) {
            Ok(remote) => {
                if engine.apply_remote_alarm(&remote) {
                    debug!("alarm updated from device: {remote:?}");
                }
            }
            Err(err) => warn!("discarding alarm payload: {err}"),
        },
        EngineEvent::BrightnessPolled(body) => match engine.apply_remote_brightness(&body) {
            Ok(true) => debug!("brightness updated from device: {}", engine.brightness()),
            Ok(false) => {}
            Err(err) => warn!("discarding brightness payload: {err}"),
        },
        EngineEvent::ColorPolled(body) => match engine.apply_remote_color(&body) {
            Ok(true) => debug!("color updated from device: {}", engine.color()),
            Ok(false) => {}
            Err(err) => warn!("discarding color payload: {err}"),
        },
        EngineEvent::User(command, reply) => {
            let (result, actions) = handle_user_command(engine, command, now_ms);
            // The HTTP caller may have gone away; the change still stands.
            let _ = reply.send(result);
            return actions;
        }
    }
    Vec::new()
}

fn handle_user_command(
    engine: &mut LampEngine,
    command: UserCommand,
    now_ms: u64,
) -> (Result<LampStatus, EngineError>, Vec<EngineAction>) {
    let outcome = match command {
        UserCommand::EditAlarm { enabled, time } => {
            if let Some(time) = time {
                engine.set_alarm_time(&time, now_ms);
            }
            if let Some(enabled) = enabled {
                engine.set_alarm_enabled(enabled, now_ms);
            }
            Ok(Vec::new())
        }
        UserCommand::BeginAlarmEdit => {
            engine.begin_alarm_edit();
            Ok(Vec::new())
        }
        UserCommand::EndAlarmEdit => {
            engine.end_alarm_edit();
            Ok(Vec::new())
        }
        UserCommand::BeginInteraction => {
            engine.begin_interaction();
            Ok(Vec::new())
        }
        UserCommand::EndInteraction => {
            engine.end_interaction();
            Ok(Vec::new())
        }
        UserCommand::Picker { color, brightness } => {
            let (_, actions) =
                engine.picker_changed(color, brightness, UpdateOrigin::Local, now_ms);
            Ok(actions)
        }
        UserCommand::Command(value) => engine.send_command(&value),
        UserCommand::TestAlarm => engine.test_alarm(now_ms),
        UserCommand::Status => Ok(Vec::new()),
    };

    match outcome {
        Ok(actions) => (Ok(engine.status()), actions),
        Err(err) => (Err(err), Vec::new()),
    }
}

fn execute_engine_actions(actions: Vec<EngineAction>, writes: &mpsc::Sender<DeviceRequest>) {
    for action in actions {
        if let EngineAction::StatusChanged(status) = &action {
            if status.is_empty() {
                info!("status cleared");
            } else {
                info!("status: {status}");
            }
            continue;
        }

        let Some(request) = action.request() else {
            continue;
        };
        debug!("device write: {action:?}");
        if let Err(err) = writes.try_send(request) {
            warn!("dropping device write {action:?}: {err}");
        }
    }
}

async fn dispatch(state: &AppState, command: UserCommand) -> Response {
    let (reply, response) = oneshot::channel();
    if state
        .events
        .send(EngineEvent::User(command, reply))
        .await
        .is_err()
    {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Engine is not running");
    }

    match response.await {
        Ok(Ok(status)) => Json(status).into_response(),
        Ok(Err(err @ EngineError::RampInProgress)) => {
            error_response(StatusCode::CONFLICT, &err.to_string())
        }
        Ok(Err(err @ EngineError::EmptyCommand)) => {
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
        Err(_) => error_response(StatusCode::SERVICE_UNAVAILABLE, "Engine dropped the request"),
    }
}

async fn handle_get_status(State(state): State<AppState>) -> Response {
    dispatch(&state, UserCommand::Status).await
}

async fn handle_put_alarm(State(state): State<AppState>, Json(edit): Json<AlarmEdit>) -> Response {
    dispatch(
        &state,
        UserCommand::EditAlarm {
            enabled: edit.enabled,
            time: edit.time,
        },
    )
    .await
}

async fn handle_alarm_edit_begin(State(state): State<AppState>) -> Response {
    dispatch(&state, UserCommand::BeginAlarmEdit).await
}

async fn handle_alarm_edit_end(State(state): State<AppState>) -> Response {
    dispatch(&state, UserCommand::EndAlarmEdit).await
}

async fn handle_alarm_test(State(state): State<AppState>) -> Response {
    dispatch(&state, UserCommand::TestAlarm).await
}

async fn handle_picker_begin(State(state): State<AppState>) -> Response {
    dispatch(&state, UserCommand::BeginInteraction).await
}

async fn handle_picker_end(State(state): State<AppState>) -> Response {
    dispatch(&state, UserCommand::EndInteraction).await
}

async fn handle_post_picker(
    State(state): State<AppState>,
    Json(update): Json<PickerUpdate>,
) -> Response {
    let Ok(color) = HexColor::parse(&update.color) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid color, expected #RRGGBB");
    };
    if update.brightness > 100 {
        return error_response(StatusCode::BAD_REQUEST, "Invalid brightness value (0-100)");
    }

    dispatch(
        &state,
        UserCommand::Picker {
            color,
            brightness: update.brightness,
        },
    )
    .await
}

async fn handle_post_command(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    dispatch(&state, UserCommand::Command(value.clone())).await
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("LAMP_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.lamp"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw).with_context(|| {
                format!("invalid runtime config at {}", self.runtime_path.display())
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

impl Clock {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.start
            .elapsed()
            .as_millis()
            .try_into()
            .unwrap_or(u64::MAX)
    }

    fn instant_at(&self, ms: u64) -> Instant {
        self.start + Duration::from_millis(ms)
    }
}

fn apply_env_overrides(runtime: &mut RuntimeConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("LAMP_DEVICE_URL") {
        runtime.device.base_url = url;
    }
    if let Some(port) = lookup("LAMP_HTTP_PORT").and_then(|value| value.parse().ok()) {
        runtime.http_port = port;
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use lamp_common::{LampConfig, PATH_BRIGHTNESS, PATH_SET_ALARM};

    use super::*;

    fn spawn_engine() -> (mpsc::Sender<EngineEvent>, mpsc::Receiver<DeviceRequest>) {
        let engine = LampEngine::new(LampConfig::default());
        let (events, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let (writes, writes_rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        tokio::spawn(run_engine_loop(engine, events_rx, writes, Clock::new()));
        (events, writes_rx)
    }

    async fn request(
        events: &mpsc::Sender<EngineEvent>,
        command: UserCommand,
    ) -> Result<LampStatus, EngineError> {
        let (reply, response) = oneshot::channel();
        events.send(EngineEvent::User(command, reply)).await.unwrap();
        response.await.unwrap()
    }

    #[test]
    fn env_overrides_replace_device_url_and_port() {
        let mut runtime = RuntimeConfig::default();
        apply_env_overrides(&mut runtime, |key| match key {
            "LAMP_DEVICE_URL" => Some("http://10.0.0.7".to_string()),
            "LAMP_HTTP_PORT" => Some("9090".to_string()),
            _ => None,
        });

        assert_eq!(runtime.device.base_url, "http://10.0.0.7");
        assert_eq!(runtime.http_port, 9090);
    }

    #[test]
    fn unparsable_port_override_is_ignored() {
        let mut runtime = RuntimeConfig::default();
        apply_env_overrides(&mut runtime, |key| {
            (key == "LAMP_HTTP_PORT").then(|| "eighty".to_string())
        });

        assert_eq!(runtime.http_port, RuntimeConfig::default().http_port);
    }

    #[tokio::test]
    async fn missing_runtime_file_yields_defaults() {
        let store = AppStore {
            runtime_path: Arc::new(std::env::temp_dir().join("lamp-client-missing/runtime.json")),
        };

        let runtime = store.load_runtime_config().await.unwrap();
        assert_eq!(runtime.http_port, RuntimeConfig::default().http_port);
    }

    #[test]
    fn bad_poll_payloads_leave_state_untouched() {
        let mut engine = LampEngine::new(LampConfig::default());

        let actions = handle_engine_event(&mut engine, EngineEvent::ColorPolled("nope".into()), 0);
        assert!(actions.is_empty());
        let actions =
            handle_engine_event(&mut engine, EngineEvent::BrightnessPolled("250".into()), 0);
        assert!(actions.is_empty());
        let actions = handle_engine_event(&mut engine, EngineEvent::AlarmPolled("[]".into()), 0);
        assert!(actions.is_empty());

        assert_eq!(engine.color().to_string(), "#FF0000");
        assert_eq!(engine.brightness(), 100);
    }

    #[test]
    fn empty_command_is_rejected_without_writes() {
        let mut engine = LampEngine::new(LampConfig::default());

        let (result, actions) =
            handle_user_command(&mut engine, UserCommand::Command("   ".into()), 0);

        assert!(matches!(result, Err(EngineError::EmptyCommand)));
        assert!(actions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn alarm_edit_is_written_after_quiet_period() {
        let (events, mut writes) = spawn_engine();

        let status = request(
            &events,
            UserCommand::EditAlarm {
                enabled: Some(true),
                time: Some("06:30".into()),
            },
        )
        .await
        .unwrap();
        assert!(status.alarm_enabled);
        assert_eq!(status.alarm_time, "06:30");

        let started = Instant::now();
        let write = writes.recv().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(write.path, PATH_SET_ALARM);
        assert_eq!(
            write.query,
            vec![("enabled", "1".to_string()), ("time", "06:30".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_alarm_ramps_up_in_order_and_refuses_overlap() {
        let (events, mut writes) = spawn_engine();

        let status = request(&events, UserCommand::TestAlarm).await.unwrap();
        assert!(status.ramp_in_progress);
        assert_eq!(status.status, "Testing alarm");

        let second = request(&events, UserCommand::TestAlarm).await;
        assert!(matches!(second, Err(EngineError::RampInProgress)));

        let mut values = Vec::new();
        loop {
            let write = writes.recv().await.unwrap();
            assert_eq!(write.path, PATH_BRIGHTNESS);
            let value: u8 = write.query[0].1.parse().unwrap();
            values.push(value);
            if value == 100 {
                break;
            }
        }

        assert_eq!(values.first(), Some(&0));
        assert!(values.windows(2).all(|pair| pair[0] < pair[1]));

        let status = request(&events, UserCommand::Status).await.unwrap();
        assert!(!status.ramp_in_progress);
        assert_eq!(status.status, "Alarm test completed");
        assert_eq!(status.current_brightness, 100);
    }
}
