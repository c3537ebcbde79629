use std::{
    collections::HashMap, io::ErrorKind, net::SocketAddr, path::PathBuf, sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::{
    net::TcpListener,
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use hvac_common::{
    AdapterError, AdapterStatePayload, DeviceError, HeatingCoolingState, HvacDevice,
    RuntimeConfig, TemperatureDisplayUnits, UnitAdapter, TOPIC_BRIDGE_CMD_DISPLAY_UNITS,
    TOPIC_BRIDGE_CMD_TARGET_STATE, TOPIC_BRIDGE_CMD_TARGET_TEMP, TOPIC_BRIDGE_STATE,
};

use crate::mqtt_device::{MqttDevice, UNIT_STATE_TOPICS};

type Adapter = UnitAdapter<MqttDevice>;

#[derive(Clone)]
struct AppState {
    adapter: Arc<Adapter>,
    mqtt: AsyncClient,
    store: AppStore,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct ValueBody<T: Serialize> {
    value: T,
}

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
const COMMAND_QUEUE_DEPTH: usize = 32;

/// Capability command received over MQTT: topic and trimmed payload.
type BridgeCommand = (String, String);

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options = MqttOptions::new("hvac-bridge-rust", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let device = Arc::new(MqttDevice::new(runtime.device.clone(), mqtt.clone()));
    info!(
        "accessory: {} ({} {}), serial {}",
        device.name(),
        runtime.device.manufacturer,
        runtime.device.model,
        device.mac_address()
    );

    let adapter = Arc::new(UnitAdapter::new(
        Arc::clone(&device),
        runtime.adapter.clone(),
        runtime.settings.display_units,
    ));

    let app_state = AppState {
        adapter: Arc::clone(&adapter),
        mqtt,
        store,
    };

    subscribe_topics(&app_state.mqtt).await?;
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    spawn_command_worker(app_state.clone(), commands_rx);
    spawn_mqtt_loop(commands_tx, device, eventloop);
    spawn_state_publish_loop(app_state.clone());

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route(
            "/api/heating-cooling/current",
            get(handle_get_current_state),
        )
        .route(
            "/api/heating-cooling/target",
            get(handle_get_target_state).post(handle_set_target_state),
        )
        .route("/api/temperature/current", get(handle_get_current_temp))
        .route(
            "/api/temperature/target",
            get(handle_get_target_temp).post(handle_set_target_temp),
        )
        .route(
            "/api/display-units",
            get(handle_get_display_units).put(handle_put_display_units),
        )
        .with_state(app_state);

    let port = std::env::var("BRIDGE_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind bridge server at {addr}"))?;

    info!("bridge listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    adapter.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    let command_topics = [
        TOPIC_BRIDGE_CMD_TARGET_STATE,
        TOPIC_BRIDGE_CMD_TARGET_TEMP,
        TOPIC_BRIDGE_CMD_DISPLAY_UNITS,
    ];

    for topic in UNIT_STATE_TOPICS.into_iter().chain(command_topics) {
        mqtt.subscribe(topic, QoS::AtMostOnce)
            .await
            .with_context(|| format!("failed to subscribe to {topic}"))?;
    }
    Ok(())
}

fn spawn_mqtt_loop(
    commands: mpsc::Sender<BridgeCommand>,
    device: Arc<MqttDevice>,
    mut eventloop: rumqttc::EventLoop,
) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) = handle_mqtt_message(
                        &commands,
                        &device,
                        message.topic,
                        message.payload.to_vec(),
                    ) {
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

fn spawn_state_publish_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        loop {
            interval.tick().await;

            let status = match app_state.adapter.status().await {
                Ok(status) => status,
                Err(err) => {
                    debug!("state publish skipped: {err}");
                    continue;
                }
            };

            match serde_json::to_vec(&AdapterStatePayload::from(&status)) {
                Ok(body) => {
                    if let Err(err) = app_state
                        .mqtt
                        .publish(TOPIC_BRIDGE_STATE, QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("bridge state publish failed: {err}");
                    }
                }
                Err(err) => warn!("bridge state serialization failed: {err}"),
            }
        }
    });
}

/// Applies capability commands one at a time in arrival order. Runs until every
/// sender is gone.
fn spawn_command_worker(
    app_state: AppState,
    mut commands: mpsc::Receiver<BridgeCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some((topic, message)) = commands.recv().await {
            if let Err(err) = handle_bridge_command(&app_state, &topic, &message).await {
                warn!("bridge command on {topic} failed: {err:#}");
            }
        }
    })
}

/// Unit state reports update the device cache in place. Capability commands are
/// queued for the command worker; the event loop never waits on a command, since
/// commands publish through that same loop.
fn handle_mqtt_message(
    commands: &mpsc::Sender<BridgeCommand>,
    device: &MqttDevice,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;

    if UNIT_STATE_TOPICS.contains(&topic.as_str()) {
        if !device.apply_report(&topic, &message) {
            warn!("ignoring malformed unit report on {topic}: {message:?}");
        }
        return Ok(());
    }

    let message = message.trim().to_string();
    match commands.try_send((topic, message)) {
        Ok(()) => Ok(()),
        Err(mpsc::error::TrySendError::Full((topic, _))) => {
            warn!("command queue full, dropping command on {topic}");
            Ok(())
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            anyhow::bail!("command worker stopped")
        }
    }
}

async fn handle_bridge_command(
    app_state: &AppState,
    topic: &str,
    message: &str,
) -> anyhow::Result<()> {
    match topic {
        TOPIC_BRIDGE_CMD_TARGET_STATE => {
            let value = message
                .parse::<u8>()
                .with_context(|| format!("invalid target state {message:?}"))?;
            let state = HeatingCoolingState::try_from(value)?;
            app_state.adapter.set_target_heating_cooling_state(state).await?;
        }
        TOPIC_BRIDGE_CMD_TARGET_TEMP => {
            let celsius = message
                .parse::<f64>()
                .with_context(|| format!("invalid target temperature {message:?}"))?;
            app_state.adapter.set_target_temperature(celsius).await?;
        }
        TOPIC_BRIDGE_CMD_DISPLAY_UNITS => {
            let value = message
                .parse::<u8>()
                .with_context(|| format!("invalid display units {message:?}"))?;
            let units = TemperatureDisplayUnits::try_from(value)?;
            update_display_units(app_state, units).await?;
        }
        _ => {}
    }
    Ok(())
}

async fn handle_get_status(State(state): State<AppState>) -> axum::response::Response {
    match state.adapter.status().await {
        Ok(status) => Json(status).into_response(),
        Err(err) => adapter_error_response(err),
    }
}

async fn handle_get_current_state(State(state): State<AppState>) -> axum::response::Response {
    match state.adapter.current_heating_cooling_state().await {
        Ok(value) => Json(ValueBody {
            value: value.as_u8(),
        })
        .into_response(),
        Err(err) => adapter_error_response(err),
    }
}

async fn handle_get_target_state(State(state): State<AppState>) -> axum::response::Response {
    match state.adapter.target_heating_cooling_state().await {
        Ok(value) => Json(ValueBody {
            value: value.as_u8(),
        })
        .into_response(),
        Err(err) => adapter_error_response(err),
    }
}

async fn handle_set_target_state(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> axum::response::Response {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Ok(value) = value.parse::<u8>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid state. Use 0, 1, 2 or 3");
    };
    let requested = match HeatingCoolingState::try_from(value) {
        Ok(requested) => requested,
        Err(err) => return adapter_error_response(err),
    };

    if let Err(err) = state.adapter.set_target_heating_cooling_state(requested).await {
        return adapter_error_response(err);
    }

    status_or_value(&state, requested.as_u8()).await
}

/// Response to an accepted write: the full status, or just the written value when
/// the unit has not reported everything the status needs yet.
async fn status_or_value<T: Serialize>(state: &AppState, value: T) -> axum::response::Response {
    match state.adapter.status().await {
        Ok(status) => Json(status).into_response(),
        Err(err) => {
            debug!("status unavailable after write: {err}");
            Json(ValueBody { value }).into_response()
        }
    }
}

async fn handle_get_current_temp(State(state): State<AppState>) -> axum::response::Response {
    match state.adapter.current_temperature().await {
        Ok(value) => Json(ValueBody { value }).into_response(),
        Err(err) => adapter_error_response(err),
    }
}

async fn handle_get_target_temp(State(state): State<AppState>) -> axum::response::Response {
    match state.adapter.target_temperature().await {
        Ok(value) => Json(ValueBody { value }).into_response(),
        Err(err) => adapter_error_response(err),
    }
}

async fn handle_set_target_temp(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> axum::response::Response {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Ok(celsius) = value.parse::<f64>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid temperature value");
    };

    if let Err(err) = state.adapter.set_target_temperature(celsius).await {
        return adapter_error_response(err);
    }

    status_or_value(&state, celsius).await
}

async fn handle_get_display_units(State(state): State<AppState>) -> axum::response::Response {
    let units = state.adapter.temperature_display_units().await;
    Json(ValueBody {
        value: units.as_u8(),
    })
    .into_response()
}

async fn handle_put_display_units(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> axum::response::Response {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Ok(value) = value.parse::<u8>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid display units. Use 0 or 1");
    };
    let units = match TemperatureDisplayUnits::try_from(value) {
        Ok(units) => units,
        Err(err) => return adapter_error_response(err),
    };

    if let Err(err) = update_display_units(&state, units).await {
        warn!("failed to persist display units update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist runtime settings",
        );
    }

    handle_get_display_units(State(state)).await
}

/// Persists the preference first and only then applies it, all under the store
/// lock, so a failed write leaves the live preference untouched.
async fn update_display_units(
    state: &AppState,
    units: TemperatureDisplayUnits,
) -> anyhow::Result<()> {
    let _guard = state.store.lock.lock().await;
    if state.adapter.temperature_display_units().await == units {
        return Ok(());
    }

    let mut runtime = state.store.read_runtime_config().await?;
    runtime.settings.display_units = units;
    state.store.write_runtime_config(&runtime).await?;

    state.adapter.set_temperature_display_units(units).await;
    Ok(())
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("HVAC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.hvac"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        self.read_runtime_config().await
    }

    // Callers hold `lock`.
    async fn read_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let path = self.runtime_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(runtime)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

fn adapter_error_status(err: &AdapterError) -> StatusCode {
    match err {
        AdapterError::InvalidTargetState(_)
        | AdapterError::InvalidDisplayUnits(_)
        | AdapterError::InvalidTemperature(_) => StatusCode::BAD_REQUEST,
        AdapterError::Device(DeviceError::StateUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        AdapterError::Device(_) => StatusCode::BAD_GATEWAY,
    }
}

fn adapter_error_response(err: AdapterError) -> axum::response::Response {
    let status = adapter_error_status(&err);
    if status != StatusCode::BAD_REQUEST {
        warn!("adapter request failed: {err}");
    }
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
