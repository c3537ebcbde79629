use std::{
    sync::OnceLock,
    time::{Duration, Instant},
};

use anyhow::Context;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::sync::mpsc;
use tracing::{info, warn};

use hvac_common::{
    TemperatureUnit, TOPIC_UNIT_CMD_MODE, TOPIC_UNIT_CMD_POWER, TOPIC_UNIT_CMD_TEMPERATURE,
};

use crate::unit::{SimulatedUnit, DEFAULT_WARM_UP_MS};

const DRIFT_EVERY_TICKS: u64 = 10;
const REPUBLISH_EVERY_TICKS: u64 = 30;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);
    let warm_up_ms = std::env::var("SIM_WARM_UP_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(DEFAULT_WARM_UP_MS);
    let unit = match std::env::var("SIM_UNIT").as_deref() {
        Ok("C") | Ok("c") => TemperatureUnit::Celsius,
        _ => TemperatureUnit::Fahrenheit,
    };

    let mut mqtt_options = MqttOptions::new("hvac-unit-sim-rust", mqtt_host, mqtt_port);

    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 32);

    for topic in [
        TOPIC_UNIT_CMD_POWER,
        TOPIC_UNIT_CMD_MODE,
        TOPIC_UNIT_CMD_TEMPERATURE,
    ] {
        mqtt.subscribe(topic, QoS::AtLeastOnce)
            .await
            .with_context(|| format!("failed to subscribe to {topic}"))?;
    }

    let (commands_tx, mut commands_rx) = mpsc::channel::<(String, String)>(32);

    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    let payload = String::from_utf8_lossy(&message.payload).into_owned();
                    if commands_tx.send((message.topic, payload)).await.is_err() {
                        break;
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => info!("mqtt connected"),
                Ok(_) => {}
                Err(err) => {
                    warn!("unit mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });

    let mut unit = SimulatedUnit::new(unit, warm_up_ms);
    info!(
        "simulated unit started, reporting in {}",
        unit.unit().symbol()
    );
    publish_state(&mqtt, &unit).await?;

    let mut tick: u64 = 0;
    let mut interval = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                tick = tick.saturating_add(1);
                let mut changed = unit.tick(monotonic_ms());
                if changed {
                    info!("power-on transition finished");
                }
                if tick % DRIFT_EVERY_TICKS == 0 && unit.drift() {
                    info!("room temperature now {}{}", unit.room(), unit.unit().symbol());
                    changed = true;
                }
                if changed || tick % REPUBLISH_EVERY_TICKS == 0 {
                    publish_state(&mqtt, &unit).await?;
                }
            }
            Some((topic, payload)) = commands_rx.recv() => {
                match unit.apply_command(&topic, payload.trim(), monotonic_ms()) {
                    Ok(true) => info!(
                        "applied {topic} = {payload} (power {}, mode {}, target {})",
                        unit.power().as_str(),
                        unit.mode().as_str(),
                        unit.target()
                    ),
                    Ok(false) => info!("{topic} = {payload} already in effect"),
                    Err(err) => warn!("{topic} = {payload} refused: {err}"),
                }
                // Report back after every command, accepted or not.
                publish_state(&mqtt, &unit).await?;
            }
        }
    }
}

async fn publish_state(mqtt: &AsyncClient, unit: &SimulatedUnit) -> anyhow::Result<()> {
    for (topic, payload) in unit.reports() {
        mqtt.publish(topic, QoS::AtLeastOnce, true, payload)
            .await
            .with_context(|| format!("failed to publish {topic}"))?;
    }
    Ok(())
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
