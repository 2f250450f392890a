use core::convert::TryInto;
use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use anyhow::{anyhow, Context};
use chrono::Utc;
use embedded_svc::{
    http::Method,
    io::{Read, Write},
    mqtt::client::{Details, EventPayload, QoS},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    gpio::{Output, PinDriver},
    ledc::LEDC,
};
#[cfg(feature = "hbridge")]
use esp_idf_hal::{
    ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver, Resolution, TIMER1},
    units::Hertz,
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{gpio::AnyOutputPin, modem::Modem, prelude::Peripherals},
    http::server::{Configuration as HttpConfiguration, EspHttpServer},
    log::EspLogger,
    mqtt::client::{EspMqttClient, EspMqttConnection, MqttClientConfiguration},
    nvs::{EspDefaultNvsPartition, EspNvs},
    sntp::EspSntp,
    wifi::{BlockingWifi, EspWifi},
};
use log::{debug, info, warn};
use serde::Serialize;

use bed_common::{
    boot_epoch, config::NetworkConfig, ActuatorOutput, Axis, Bed, BedError, BedStatusPayload,
    Clock, CommandRequest, Direction, LimitsPayload, MonotonicClock, PositionStore, PresetSlot,
    RuntimeConfig, SlotSignal, StoreError, MAX_MQTT_PAYLOAD_BYTES, TOPIC_CMD_COMMAND,
    TOPIC_CONTROLLER_STATE,
};
#[cfg(feature = "hbridge")]
use bed_common::DutyRamp;

const NVS_NAMESPACE: &str = "bed";
const NVS_RUNTIME_KEY: &str = "runtime_json";
const NVS_STRING_BUFFER: usize = 4096;
const MAX_HTTP_BODY: usize = 1024;
const WATCHDOG_TIMEOUT_SEC: u32 = 30;
const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;

#[cfg(feature = "hbridge")]
const MOTOR_PWM_FREQ_HZ: u32 = 20_000;
#[cfg(feature = "hbridge")]
const MOTOR_PWM_RAMP_STEP: u32 = 64;

/// Actuator drive GPIOs. The same pins carry relay coils or H-bridge inputs.
struct ActuatorPins {
    head_up: i32,
    head_down: i32,
    foot_up: i32,
    foot_down: i32,
    transfer: i32,
}

#[cfg(esp32s3)]
const ACTUATOR_PINS: ActuatorPins = ActuatorPins {
    head_up: 4,
    head_down: 5,
    foot_up: 6,
    foot_down: 7,
    transfer: 10,
};

#[cfg(not(esp32s3))]
const ACTUATOR_PINS: ActuatorPins = ActuatorPins {
    head_up: 16,
    head_down: 17,
    foot_up: 18,
    foot_down: 19,
    transfer: 23,
};

type Relay = PinDriver<'static, AnyOutputPin, Output>;

#[cfg(not(feature = "hbridge"))]
type EspOutput = RelayOutput;
#[cfg(feature = "hbridge")]
type EspOutput = HBridgeOutput;

type EspBed = Bed<EspOutput, NvsStore>;

#[derive(Clone)]
struct SharedState {
    bed: Arc<EspBed>,
    clock: Arc<MonotonicClock>,
}

/// Up/down relay pair per axis plus the actuator power transfer relay.
#[cfg(not(feature = "hbridge"))]
struct RelayOutput {
    head_up: Relay,
    head_down: Relay,
    foot_up: Relay,
    foot_down: Relay,
    transfer: Relay,
}

#[cfg(not(feature = "hbridge"))]
impl RelayOutput {
    fn new(pins: &ActuatorPins, _ledc: LEDC) -> anyhow::Result<Self> {
        Ok(Self {
            head_up: relay(pins.head_up)?,
            head_down: relay(pins.head_down)?,
            foot_up: relay(pins.foot_up)?,
            foot_down: relay(pins.foot_down)?,
            transfer: relay(pins.transfer)?,
        })
    }
}

fn relay(pin: i32) -> anyhow::Result<Relay> {
    let mut driver = unsafe { PinDriver::output(AnyOutputPin::new(pin)) }
        .with_context(|| format!("failed to configure relay on GPIO{pin}"))?;
    driver.set_high()?;
    Ok(driver)
}

fn set_relay(relay: &mut Relay, energized: bool) {
    let result = if energized {
        relay.set_low()
    } else {
        relay.set_high()
    };
    if let Err(err) = result {
        warn!("relay write failed on GPIO{}: {err:?}", relay.pin());
    }
}

#[cfg(not(feature = "hbridge"))]
impl ActuatorOutput for RelayOutput {
    fn set_axis_output(&mut self, axis: Axis, direction: Direction) {
        let (up, down) = match axis {
            Axis::Head => (&mut self.head_up, &mut self.head_down),
            Axis::Foot => (&mut self.foot_up, &mut self.foot_down),
        };
        // release the opposite line before energizing
        match direction {
            Direction::Stopped => {
                set_relay(up, false);
                set_relay(down, false);
            }
            Direction::Extending => {
                set_relay(down, false);
                set_relay(up, true);
            }
            Direction::Retracting => {
                set_relay(up, false);
                set_relay(down, true);
            }
        }
    }

    fn set_power_enable(&mut self, enabled: bool) {
        set_relay(&mut self.transfer, enabled);
    }
}

/// One DRV8871 per axis in sign-magnitude mode: the active input carries PWM,
/// the other is held low, and both low lets the motor coast.
#[cfg(feature = "hbridge")]
struct HBridgeAxis {
    up: LedcDriver<'static>,
    down: LedcDriver<'static>,
    ramp: DutyRamp,
}

#[cfg(feature = "hbridge")]
impl HBridgeAxis {
    fn apply(&mut self) {
        let (up_duty, down_duty) = self.ramp.channel_duties();
        // drop the idle input before raising the active one
        if up_duty == 0 {
            set_motor_duty(&mut self.up, 0);
            set_motor_duty(&mut self.down, down_duty);
        } else {
            set_motor_duty(&mut self.down, 0);
            set_motor_duty(&mut self.up, up_duty);
        }
    }
}

#[cfg(feature = "hbridge")]
fn set_motor_duty(channel: &mut LedcDriver<'static>, duty: u32) {
    if let Err(err) = channel.set_duty(duty) {
        warn!("motor pwm write failed: {err:?}");
    }
}

#[cfg(feature = "hbridge")]
struct HBridgeOutput {
    _timer: LedcTimerDriver<'static, TIMER1>,
    head: HBridgeAxis,
    foot: HBridgeAxis,
    transfer: Relay,
}

#[cfg(feature = "hbridge")]
impl HBridgeOutput {
    fn new(pins: &ActuatorPins, ledc: LEDC) -> anyhow::Result<Self> {
        let timer = LedcTimerDriver::new(
            ledc.timer1,
            &TimerConfig::default()
                .frequency(Hertz(MOTOR_PWM_FREQ_HZ))
                .resolution(Resolution::Bits10),
        )
        .context("motor pwm timer init failed")?;

        let pin = |gpio: i32| unsafe { AnyOutputPin::new(gpio) };
        let head_up = LedcDriver::new(ledc.channel3, &timer, pin(pins.head_up))?;
        let head_down = LedcDriver::new(ledc.channel4, &timer, pin(pins.head_down))?;
        let foot_up = LedcDriver::new(ledc.channel5, &timer, pin(pins.foot_up))?;
        let foot_down = LedcDriver::new(ledc.channel6, &timer, pin(pins.foot_down))?;
        let ramp = DutyRamp::new(head_up.get_max_duty(), MOTOR_PWM_RAMP_STEP);

        let mut output = Self {
            _timer: timer,
            head: HBridgeAxis {
                up: head_up,
                down: head_down,
                ramp,
            },
            foot: HBridgeAxis {
                up: foot_up,
                down: foot_down,
                ramp,
            },
            transfer: relay(pins.transfer)?,
        };
        output.head.apply();
        output.foot.apply();
        Ok(output)
    }

    fn axis_mut(&mut self, axis: Axis) -> &mut HBridgeAxis {
        match axis {
            Axis::Head => &mut self.head,
            Axis::Foot => &mut self.foot,
        }
    }
}

#[cfg(feature = "hbridge")]
impl ActuatorOutput for HBridgeOutput {
    fn set_axis_output(&mut self, axis: Axis, direction: Direction) {
        let axis = self.axis_mut(axis);
        axis.ramp.set_direction(direction);
        axis.apply();
    }

    fn set_power_enable(&mut self, enabled: bool) {
        set_relay(&mut self.transfer, enabled);
    }

    fn update(&mut self) {
        for axis in [&mut self.head, &mut self.foot] {
            if axis.ramp.step() {
                axis.apply();
            }
        }
    }
}

#[derive(Clone)]
struct NvsStore {
    partition: EspDefaultNvsPartition,
}

impl NvsStore {
    fn open(&self) -> anyhow::Result<EspNvs<esp_idf_svc::nvs::NvsDefault>> {
        Ok(EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?)
    }

    fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let nvs = self.open()?;
        let mut buffer = vec![0_u8; NVS_STRING_BUFFER];

        match nvs.get_str(NVS_RUNTIME_KEY, &mut buffer)? {
            Some(value) => Ok(serde_json::from_str::<RuntimeConfig>(value)?),
            None => Ok(RuntimeConfig::default()),
        }
    }
}

impl PositionStore for NvsStore {
    fn get_i32(&self, key: &str, default: i32) -> i32 {
        self.open()
            .ok()
            .and_then(|nvs| nvs.get_i32(key).ok().flatten())
            .unwrap_or(default)
    }

    fn set_i32(&mut self, key: &str, value: i32) -> Result<(), StoreError> {
        let mut nvs = self.open().map_err(|err| StoreError::write(key, err))?;
        nvs.set_i32(key, value)
            .map_err(|err| StoreError::write(key, err))
    }

    fn get_string(&self, key: &str) -> Option<String> {
        let nvs = self.open().ok()?;
        let mut buffer = vec![0_u8; NVS_STRING_BUFFER];
        nvs.get_str(key, &mut buffer)
            .ok()
            .flatten()
            .map(str::to_string)
    }

    fn set_string(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut nvs = self.open().map_err(|err| StoreError::write(key, err))?;
        nvs.set_str(key, value)
            .map_err(|err| StoreError::write(key, err))
    }
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let nvs_store = NvsStore {
        partition: nvs_partition.clone(),
    };

    let mut runtime = nvs_store.load_runtime_config().unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        RuntimeConfig::default()
    });
    ensure_wifi_defaults(&mut runtime);

    let Peripherals { modem, ledc, .. } = Peripherals::take()?;

    // Outputs first so the actuators are released before anything else runs.
    let output = EspOutput::new(&ACTUATOR_PINS, ledc).context("actuator output init failed")?;
    let clock = Arc::new(MonotonicClock);
    let bed = Arc::new(Bed::begin(
        runtime.motion.clone(),
        output,
        nvs_store,
        clock.clone(),
    ));
    let state = SharedState {
        bed: bed.clone(),
        clock,
    };

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;

    let wifi = match connect_wifi(modem, sys_loop, nvs_partition, &runtime.network) {
        Ok(wifi) => wifi,
        Err(err) => {
            warn!("wifi startup failed ({err:#}); restarting");
            bed.stop().ok();
            thread::sleep(Duration::from_secs(5));
            unsafe { esp_idf_svc::sys::esp_restart() };
        }
    };

    let _sntp = EspSntp::new_default().context("failed to start SNTP")?;
    info!("SNTP initialized");

    let mqtt = if runtime.network.mqtt_enabled() {
        let (client, conn) = create_mqtt_client(&runtime.network)?;
        let client = Arc::new(Mutex::new(client));
        subscribe_topics(&client)?;
        spawn_mqtt_receiver(state.clone(), conn, client.clone())?;
        Some(client)
    } else {
        info!("mqtt bridge disabled (no broker configured)");
        None
    };

    spawn_control_loop(
        state.clone(),
        mqtt,
        runtime.motion.tick_period_ms,
        runtime.motion.state_publish_interval_ms,
    )?;

    let server = create_http_server(state)?;

    // Keep services alive for the program lifetime.
    let _wifi = wifi;
    let _server = server;

    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

fn ensure_wifi_defaults(runtime: &mut RuntimeConfig) {
    if runtime.network.wifi_ssid.is_empty() {
        if let Some(ssid) = option_env!("WIFI_SSID") {
            runtime.network.wifi_ssid = ssid.to_string();
        }
    }

    if runtime.network.wifi_pass.is_empty() {
        if let Some(pass) = option_env!("WIFI_PASS") {
            runtime.network.wifi_pass = pass.to_string();
        }
    }
}

fn status_payload(
    state: &SharedState,
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

fn bed_error_status(err: &BedError) -> u16 {
    match err {
        BedError::LockUnavailable => 503,
        BedError::Command(_) => 400,
    }
}

fn create_http_server(state: SharedState) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        stack_size: 16 * 1024,
        ..Default::default()
    };

    let mut server = EspHttpServer::new(&conf)?;

    {
        let state = state.clone();
        server.fn_handler::<anyhow::Error, _>("/rpc/Bed.Command", Method::Post, move |mut req| {
            let body = read_request_body(&mut req)?;
            let Ok(request) = serde_json::from_slice::<CommandRequest>(&body) else {
                return write_error(req, 400, "invalid command payload");
            };
            let command = match request.parse() {
                Ok(command) => command,
                Err(err) => return write_error(req, 400, &err.to_string()),
            };

            let outcome = match state.bed.execute(command, request.label.as_deref()) {
                Ok(outcome) => outcome,
                Err(err) => return write_error(req, bed_error_status(&err), &err.to_string()),
            };
            match status_payload(&state, outcome.max_wait_ms, outcome.signal) {
                Ok(payload) => write_json(req, &payload),
                Err(err) => write_error(req, bed_error_status(&err), &err.to_string()),
            }
        })?;
    }

    for (path, method) in [
        ("/rpc/Bed.Status", Method::Post),
        ("/api/status", Method::Get),
    ] {
        let state = state.clone();
        server.fn_handler(path, method, move |req| match status_payload(&state, 0, None) {
            Ok(payload) => write_json(req, &payload),
            Err(err) => write_error(req, bed_error_status(&err), &err.to_string()),
        })?;
    }

    {
        let state = state.clone();
        server.fn_handler("/api/limits", Method::Get, move |req| {
            match state.bed.limits() {
                Ok(limits) => write_json(
                    req,
                    &LimitsPayload {
                        head_max_ms: limits.head_max_ms,
                        foot_max_ms: limits.foot_max_ms,
                    },
                ),
                Err(err) => write_error(req, bed_error_status(&err), &err.to_string()),
            }
        })?;
    }

    {
        let state = state.clone();
        server.fn_handler::<anyhow::Error, _>("/api/limits", Method::Put, move |mut req| {
            let body = read_request_body(&mut req)?;
            let update: LimitsPayload =
                serde_json::from_slice(&body).context("invalid limits payload")?;

            match state.bed.set_limits(update.head_max_ms, update.foot_max_ms) {
                Ok(limits) => write_json(
                    req,
                    &LimitsPayload {
                        head_max_ms: limits.head_max_ms,
                        foot_max_ms: limits.foot_max_ms,
                    },
                ),
                Err(err) => write_error(req, bed_error_status(&err), &err.to_string()),
            }
        })?;
    }

    Ok(server)
}

fn read_request_body(
    req: &mut esp_idf_svc::http::server::Request<
        &mut esp_idf_svc::http::server::EspHttpConnection<'_>,
    >,
) -> anyhow::Result<Vec<u8>> {
    let len = req.content_len().unwrap_or(0) as usize;
    if len > MAX_HTTP_BODY {
        return Err(anyhow!("request body too large"));
    }

    let mut body = vec![0_u8; len];
    if len > 0 {
        req.read_exact(&mut body)?;
    }
    Ok(body)
}

fn write_json<T: Serialize>(
    req: esp_idf_svc::http::server::Request<
        &mut esp_idf_svc::http::server::EspHttpConnection<'_>,
    >,
    payload: &T,
) -> anyhow::Result<()> {
    let body = serde_json::to_vec(payload)?;
    req.into_response(
        200,
        Some("OK"),
        &[("Content-Type", "application/json; charset=utf-8")],
    )?
    .write_all(&body)?;
    Ok(())
}

fn write_error(
    req: esp_idf_svc::http::server::Request<
        &mut esp_idf_svc::http::server::EspHttpConnection<'_>,
    >,
    status_code: u16,
    message: &str,
) -> anyhow::Result<()> {
    let payload = serde_json::json!({ "error": message });
    let body = serde_json::to_vec(&payload)?;
    req.into_response(
        status_code,
        None,
        &[("Content-Type", "application/json; charset=utf-8")],
    )?
    .write_all(&body)?;
    Ok(())
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<EspWifi<'static>> {
    let ssid = network.wifi_ssid.trim();
    if ssid.is_empty() {
        return Err(anyhow!("wifi credentials missing; set WIFI_SSID at build time"));
    }

    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: ssid.try_into().map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{ssid}`");

    let mut last_err = None;
    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        feed_watchdog();
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi connected on attempt {attempt}");
                last_err = None;
                break;
            }
            Err(err) => {
                warn!("wifi connect attempt {attempt}/{WIFI_CONNECT_ATTEMPTS} failed: {err:#}");
                last_err = Some(err);
            }
        }

        if attempt < WIFI_CONNECT_ATTEMPTS {
            let _ = wifi.disconnect();
            thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
        }
    }

    match last_err {
        None => Ok(esp_wifi),
        Some(err) => Err(err).context("all wifi connect attempts failed"),
    }
}

fn create_mqtt_client(
    network: &NetworkConfig,
) -> anyhow::Result<(EspMqttClient<'static>, EspMqttConnection)> {
    let url = format!("mqtt://{}:{}", network.mqtt_host, network.mqtt_port);

    let conf = MqttClientConfiguration {
        client_id: Some("bed-controller"),
        username: if network.mqtt_user.is_empty() {
            None
        } else {
            Some(network.mqtt_user.as_str())
        },
        password: if network.mqtt_pass.is_empty() {
            None
        } else {
            Some(network.mqtt_pass.as_str())
        },
        ..Default::default()
    };

    Ok(EspMqttClient::new(url.as_str(), &conf)?)
}

fn subscribe_topics(mqtt: &Arc<Mutex<EspMqttClient<'static>>>) -> anyhow::Result<()> {
    let mut mqtt = mqtt
        .lock()
        .map_err(|_| anyhow!("mqtt client lock poisoned"))?;
    mqtt.subscribe(TOPIC_CMD_COMMAND, QoS::AtMostOnce)?;
    Ok(())
}

fn spawn_mqtt_receiver(
    state: SharedState,
    mut conn: EspMqttConnection,
    mqtt: Arc<Mutex<EspMqttClient<'static>>>,
) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("mqtt-rx".into())
        .stack_size(12 * 1024)
        .spawn(move || loop {
            match conn.next() {
                Ok(event) => {
                    if let EventPayload::Received {
                        topic: Some(topic),
                        data,
                        details,
                        ..
                    } = event.payload()
                    {
                        if !matches!(details, Details::Complete) {
                            continue;
                        }

                        if data.len() > MAX_MQTT_PAYLOAD_BYTES {
                            warn!(
                                "dropping oversized MQTT payload on topic {} ({} bytes)",
                                topic,
                                data.len()
                            );
                            continue;
                        }

                        if let Ok(message) = core::str::from_utf8(data) {
                            if let Err(err) = handle_mqtt_message(&state, topic, message) {
                                warn!("mqtt message handling failed: {err:#}");
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!("mqtt receive loop error: {err:?}");
                    thread::sleep(Duration::from_secs(2));
                    if let Err(sub_err) = subscribe_topics(&mqtt) {
                        warn!("mqtt re-subscribe failed: {sub_err:#}");
                    }
                }
            }
        })
        .context("failed to spawn mqtt receiver thread")?;
    Ok(())
}

fn handle_mqtt_message(state: &SharedState, topic: &str, message: &str) -> anyhow::Result<()> {
    if topic != TOPIC_CMD_COMMAND {
        return Ok(());
    }

    let request = CommandRequest::from_payload(message);
    let command = request.parse()?;
    let outcome = state.bed.execute(command, request.label.as_deref())?;
    debug!(
        "mqtt command {} scheduled {} ms",
        outcome.command, outcome.max_wait_ms
    );
    Ok(())
}

fn spawn_control_loop(
    state: SharedState,
    mqtt: Option<Arc<Mutex<EspMqttClient<'static>>>>,
    tick_period_ms: u64,
    publish_interval_ms: u64,
) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("control-loop".into())
        .stack_size(12 * 1024)
        .spawn(move || {
            if let Err(err) = add_current_task_to_watchdog() {
                warn!("failed to register control loop with watchdog: {err:#}");
            }

            let mut last_state_publish_ms = 0_u64;
            loop {
                feed_watchdog();
                if let Err(err) = state.bed.tick() {
                    warn!("control tick skipped: {err}");
                }

                let now_ms = state.clock.now_ms();
                if let Some(mqtt) = &mqtt {
                    if now_ms.saturating_sub(last_state_publish_ms) >= publish_interval_ms {
                        last_state_publish_ms = now_ms;
                        if let Err(err) = publish_state(&state, mqtt) {
                            warn!("state publish failed: {err:#}");
                        }
                    }
                }

                thread::sleep(Duration::from_millis(tick_period_ms.max(1)));
            }
        })
        .context("failed to spawn control loop thread")?;
    Ok(())
}

fn publish_state(
    state: &SharedState,
    mqtt: &Arc<Mutex<EspMqttClient<'static>>>,
) -> anyhow::Result<()> {
    let payload = serde_json::to_vec(&status_payload(state, 0, None)?)?;

    let mut client = mqtt
        .lock()
        .map_err(|_| anyhow!("mqtt client lock poisoned"))?;
    client.publish(TOPIC_CONTROLLER_STATE, QoS::AtLeastOnce, true, &payload)?;
    Ok(())
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = esp_idf_svc::sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_init(&config) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_init failed with code {}", rc))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_add failed with code {}", rc))
}

fn feed_watchdog() {
    let _ = unsafe { esp_idf_svc::sys::esp_task_wdt_reset() };
}
