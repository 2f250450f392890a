use std::{
    io::ErrorKind,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::{net::TcpListener, sync::Mutex};
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

use bed_common::{
    boot_epoch, config::NetworkConfig, ActuatorOutput, Axis, Bed, BedError, BedStatusPayload,
    Clock, CommandRequest, Direction, LimitsPayload, MonotonicClock, PositionStore, PresetSlot,
    RuntimeConfig, SlotSignal, StoreError, MAX_MQTT_PAYLOAD_BYTES, TOPIC_CMD_COMMAND,
    TOPIC_CONTROLLER_STATE,
};

type HostBed = Bed<SimulatedOutput, FileStore>;

#[derive(Clone)]
struct AppState {
    bed: Arc<HostBed>,
    clock: Arc<MonotonicClock>,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    positions_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Logs actuator line changes instead of driving relays.
#[derive(Debug, Default)]
struct SimulatedOutput {
    head: Direction,
    foot: Direction,
    power: bool,
}

impl ActuatorOutput for SimulatedOutput {
    fn set_axis_output(&mut self, axis: Axis, direction: Direction) {
        let line = match axis {
            Axis::Head => &mut self.head,
            Axis::Foot => &mut self.foot,
        };
        if *line != direction {
            info!(axis = axis.as_str(), direction = direction.as_str(), "actuator");
        }
        *line = direction;
    }

    fn set_power_enable(&mut self, enabled: bool) {
        if self.power != enabled {
            info!(enabled, "actuator power");
        }
        self.power = enabled;
    }
}

/// Position store persisted as one JSON object on disk.
struct FileStore {
    path: PathBuf,
    values: Map<String, Value>,
}

impl FileStore {
    fn open(path: PathBuf) -> anyhow::Result<Self> {
        let values = match std::fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw)
                .with_context(|| format!("corrupt position store at {}", path.display()))?,
            Err(err) if err.kind() == ErrorKind::NotFound => Map::new(),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read position store at {}", path.display()))
            }
        };
        Ok(Self { path, values })
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value);
        self.flush().map_err(|err| StoreError::write(key, format!("{err:#}")))
    }

    fn flush(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_vec_pretty(&self.values)?;
        // a crash mid-write must leave the previous file intact
        let staging = self.staging_path();
        std::fs::write(&staging, payload)
            .with_context(|| format!("failed to write {}", staging.display()))?;
        std::fs::rename(&staging, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }
}

impl PositionStore for FileStore {
    fn get_i32(&self, key: &str, default: i32) -> i32 {
        self.values
            .get(key)
            .and_then(Value::as_i64)
            .and_then(|value| i32::try_from(value).ok())
            .unwrap_or(default)
    }

    fn set_i32(&mut self, key: &str, value: i32) -> Result<(), StoreError> {
        self.set(key, value.into())
    }

    fn get_string(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn set_string(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set(key, value.into())
    }
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
    apply_env_overrides(&mut runtime.network);

    let clock = Arc::new(MonotonicClock);
    let positions = FileStore::open(store.positions_path.as_ref().clone())?;
    let bed = Arc::new(Bed::begin(
        runtime.motion.clone(),
        SimulatedOutput::default(),
        positions,
        clock.clone(),
    ));

    let app_state = AppState {
        bed: bed.clone(),
        clock,
    };

    spawn_control_loop(bed.clone(), runtime.motion.tick_period_ms);
    if runtime.network.mqtt_enabled() {
        let (mqtt, eventloop) = connect_mqtt(&runtime.network);
        mqtt.subscribe(TOPIC_CMD_COMMAND, QoS::AtMostOnce).await?;
        spawn_mqtt_loop(app_state.clone(), eventloop);
        spawn_state_publish_loop(
            app_state.clone(),
            mqtt,
            runtime.motion.state_publish_interval_ms,
        );
    } else {
        info!("mqtt bridge disabled (no MQTT_HOST configured)");
    }

    let web_root = format!("{}/web", env!("CARGO_MANIFEST_DIR"));
    let app = Router::new()
        .route("/rpc/Bed.Command", post(handle_command))
        .route("/rpc/Bed.Status", post(handle_get_status))
        .route("/api/status", get(handle_get_status))
        .route("/api/limits", get(handle_get_limits).put(handle_put_limits))
        .fallback_service(ServeDir::new(web_root))
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], runtime.network.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind bed controller server at {addr}"))?;

    info!("bed controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(bed))
        .await?;
    Ok(())
}

fn apply_env_overrides(network: &mut NetworkConfig) {
    if let Some(port) = env_parse::<u16>("BED_HTTP_PORT") {
        network.http_port = port;
    }
    if let Ok(host) = std::env::var("MQTT_HOST") {
        network.mqtt_host = host;
    }
    if let Some(port) = env_parse::<u16>("MQTT_PORT") {
        network.mqtt_port = port;
    }
    if let Ok(user) = std::env::var("MQTT_USER") {
        network.mqtt_user = user;
    }
    if let Ok(pass) = std::env::var("MQTT_PASS") {
        network.mqtt_pass = pass;
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}

fn connect_mqtt(network: &NetworkConfig) -> (AsyncClient, rumqttc::EventLoop) {
    let mut mqtt_options = MqttOptions::new(
        "bed-controller-rust",
        network.mqtt_host.clone(),
        network.mqtt_port,
    );
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    if !network.mqtt_user.is_empty() {
        mqtt_options.set_credentials(network.mqtt_user.clone(), network.mqtt_pass.clone());
    }
    AsyncClient::new(mqtt_options, 64)
}

async fn shutdown_signal(bed: Arc<HostBed>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        return;
    }
    info!("shutting down; stopping actuators");
    if let Err(err) = bed.stop() {
        warn!("stop on shutdown failed: {err}");
    }
}

fn spawn_control_loop(bed: Arc<HostBed>, tick_period_ms: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(tick_period_ms.max(1)));
        loop {
            interval.tick().await;
            if let Err(err) = bed.tick() {
                warn!("control tick skipped: {err}");
            }
        }
    });
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, &message.topic, &message.payload)
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_state_publish_loop(app_state: AppState, mqtt: AsyncClient, interval_ms: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(1_000)));
        loop {
            interval.tick().await;

            let payload = status_payload(&app_state, 0, None)
                .map_err(anyhow::Error::from)
                .and_then(|payload| serde_json::to_vec(&payload).map_err(anyhow::Error::from));

            match payload {
                Ok(body) => {
                    if let Err(err) = mqtt
                        .publish(TOPIC_CONTROLLER_STATE, QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("bed state publish failed: {err}");
                    }
                }
                Err(err) => warn!("bed state serialization failed: {err:#}"),
            }
        }
    });
}

fn handle_mqtt_message(app_state: &AppState, topic: &str, payload: &[u8]) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }
    if topic != TOPIC_CMD_COMMAND {
        return Ok(());
    }

    let message = std::str::from_utf8(payload).context("non utf8 mqtt payload")?;
    let request = CommandRequest::from_payload(message);
    let command = request.parse()?;
    let outcome = app_state.bed.execute(command, request.label.as_deref())?;
    debug!(
        "mqtt command {} scheduled {} ms",
        outcome.command, outcome.max_wait_ms
    );
    Ok(())
}

fn status_payload(
    state: &AppState,
    max_wait_ms: u32,
    signal: Option<(SlotSignal, PresetSlot)>,
) -> Result<BedStatusPayload, BedError> {
    let snapshot = state.bed.snapshot()?;
    let uptime = state.clock.now_ms() / 1000;
    Ok(BedStatusPayload::new(
        &snapshot,
        boot_epoch(Utc::now(), uptime),
        uptime,
        max_wait_ms,
        signal,
    ))
}

async fn handle_command(
    State(state): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> impl IntoResponse {
    let command = match request.parse() {
        Ok(command) => command,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    let outcome = match state.bed.execute(command, request.label.as_deref()) {
        Ok(outcome) => outcome,
        Err(err) => return bed_error_response(err),
    };

    match status_payload(&state, outcome.max_wait_ms, outcome.signal) {
        Ok(payload) => Json(payload).into_response(),
        Err(err) => bed_error_response(err),
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    match status_payload(&state, 0, None) {
        Ok(payload) => Json(payload).into_response(),
        Err(err) => bed_error_response(err),
    }
}

async fn handle_get_limits(State(state): State<AppState>) -> impl IntoResponse {
    match state.bed.limits() {
        Ok(limits) => Json(LimitsPayload {
            head_max_ms: limits.head_max_ms,
            foot_max_ms: limits.foot_max_ms,
        })
        .into_response(),
        Err(err) => bed_error_response(err),
    }
}

async fn handle_put_limits(
    State(state): State<AppState>,
    Json(update): Json<LimitsPayload>,
) -> impl IntoResponse {
    match state.bed.set_limits(update.head_max_ms, update.foot_max_ms) {
        Ok(limits) => Json(LimitsPayload {
            head_max_ms: limits.head_max_ms,
            foot_max_ms: limits.foot_max_ms,
        })
        .into_response(),
        Err(err) => bed_error_response(err),
    }
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("BED_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.bed"));
        Self::in_dir(&data_dir)
    }

    fn in_dir(data_dir: &Path) -> Self {
        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            positions_path: Arc::new(data_dir.join("positions.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

fn bed_error_response(err: BedError) -> axum::response::Response {
    let status = match err {
        BedError::LockUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        BedError::Command(_) => StatusCode::BAD_REQUEST,
    };
    error_response(status, &err.to_string())
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

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bed-controller-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn file_store_round_trips_through_disk() {
        let dir = scratch_dir("store");
        let path = dir.join("positions.json");

        let mut store = FileStore::open(path.clone()).unwrap();
        assert_eq!(store.get_i32("headPos", -1), -1);
        store.set_i32("headPos", 12_500).unwrap();
        store.set_string("p1_label", "Reading").unwrap();

        let reopened = FileStore::open(path).unwrap();
        assert_eq!(reopened.get_i32("headPos", -1), 12_500);
        assert_eq!(reopened.get_string("p1_label").as_deref(), Some("Reading"));
        assert_eq!(reopened.get_i32("p1_label", 7), 7);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn interrupted_write_keeps_previous_file() {
        let dir = scratch_dir("staging");
        let path = dir.join("positions.json");

        let mut store = FileStore::open(path.clone()).unwrap();
        store.set_i32("footPos", 8_000).unwrap();
        assert!(!store.staging_path().exists());

        // a half-written staging file left behind by a crash is ignored
        std::fs::write(store.staging_path(), b"{\"footPos\": 9").unwrap();
        let reopened = FileStore::open(path.clone()).unwrap();
        assert_eq!(reopened.get_i32("footPos", -1), 8_000);

        store.set_i32("footPos", 9_500).unwrap();
        assert!(!store.staging_path().exists());
        assert_eq!(FileStore::open(path).unwrap().get_i32("footPos", -1), 9_500);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn corrupt_store_is_an_error() {
        let dir = scratch_dir("corrupt");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("positions.json");
        std::fs::write(&path, b"{not json").unwrap();

        assert!(FileStore::open(path).is_err());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn bed_survives_restart_with_file_store() {
        let dir = scratch_dir("restart");
        let path = dir.join("positions.json");
        let clock = Arc::new(MonotonicClock);

        let bed = Bed::begin(
            Default::default(),
            SimulatedOutput::default(),
            FileStore::open(path.clone()).unwrap(),
            clock.clone(),
        );
        bed.set_limits(30_000, 45_000).unwrap();
        bed.save_preset(PresetSlot::Slot2, Some("Movie")).unwrap();
        drop(bed);

        let bed = Bed::begin(
            Default::default(),
            SimulatedOutput::default(),
            FileStore::open(path).unwrap(),
            clock,
        );
        let limits = bed.limits().unwrap();
        assert_eq!((limits.head_max_ms, limits.foot_max_ms), (30_000, 45_000));
        assert_eq!(bed.preset(PresetSlot::Slot2).unwrap().label, "Movie");

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn error_status_codes_follow_error_kind() {
        assert_eq!(
            bed_error_response(BedError::LockUnavailable).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            bed_error_response(BedError::Command(bed_common::CommandError::Empty)).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
