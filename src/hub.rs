use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError, RwLock,
};

use common::{
    frame::{
        encode_motor_power, encode_output_command, encode_play_sound, encode_set_color,
        CommandFrame,
    },
    physical::{Color, DeviceType, SensorKey, Sound},
};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, instrument, trace};

use crate::{
    decoder::InboundDecoder,
    error::HubError,
    externals::ble::transport::HubTransport,
    models::{
        config::HubConfig,
        hub_event::HubEvent,
        port_registry::{Port, PortRegistry},
        session_state::SessionState,
        value_store::ValueStore,
    },
    session::{ConnectionSession, HandlerId},
    tasks::{
        rate_limiter::RateLimiter, sensor_subscription::task_subscribe_sensor_ports,
        session_events::task_forward_session_state,
    },
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Write `frame` unless its port was detached while the frame waited in the
/// rate limiter.
pub(crate) async fn write_to_attached_port(
    registry: Arc<RwLock<PortRegistry>>,
    session: Arc<ConnectionSession>,
    frame: CommandFrame,
) -> Result<(), HubError> {
    registry
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .require_attached(frame.port_id())?;
    session.write(frame.as_bytes()).await
}

/// One LWP3 hub: a connection session plus everything learned from its
/// notifications. Commands go through a rate limiter, reads come straight
/// from memory and never wait.
pub struct Hub {
    config: HubConfig,
    session: Arc<ConnectionSession>,
    registry: Arc<RwLock<PortRegistry>>,
    store: Arc<RwLock<ValueStore>>,
    decoder: InboundDecoder,
    tx_events: broadcast::Sender<HubEvent>,
    limiter: Mutex<Option<RateLimiter>>,

    /// Tasks of the current connection.
    tracker: TaskTracker,

    /// Tasks living as long as the hub.
    background: TaskTracker,
    forwarding_state: AtomicBool,
    token: CancellationToken,
    decoder_handler: HandlerId,
}

impl Hub {
    pub fn new(transport: Arc<dyn HubTransport>, config: HubConfig) -> Self {
        let session = Arc::new(ConnectionSession::new(transport));
        let registry = Arc::new(RwLock::new(PortRegistry::new()));
        let store = Arc::new(RwLock::new(ValueStore::new()));
        let (tx_events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let decoder = InboundDecoder::new(registry.clone(), store.clone(), tx_events.clone());
        let handler_decoder = decoder.clone();
        let decoder_handler =
            session.on_notification(move |frame| handler_decoder.handle_frame(frame));

        Self {
            config,
            session,
            registry,
            store,
            decoder,
            tx_events,
            limiter: Mutex::new(None),
            tracker: TaskTracker::new(),
            background: TaskTracker::new(),
            forwarding_state: AtomicBool::new(false),
            token: CancellationToken::new(),
            decoder_handler,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Scan for and connect to the hub described by the configured filter.
    /// Ports and readings from an earlier connection are forgotten.
    #[instrument(skip_all)]
    pub async fn connect(&self) -> Result<(), HubError> {
        if self.session.state() != SessionState::Disconnected {
            return Err(HubError::Connection(format!(
                "Hub is already {}.",
                self.session.state()
            )));
        }
        self.decoder.reset();

        if !self.forwarding_state.swap(true, Ordering::SeqCst) {
            self.background.spawn(task_forward_session_state(
                self.token.child_token(),
                self.session.watch_state(),
                self.tx_events.clone(),
            ));
        }

        // subscribe first, attach events arrive right after the link is up
        let rx_events = self.tx_events.subscribe();

        self.session
            .connect(&self.config.filter, self.config.scan_timeout)
            .await?;

        let token = self.session.connection_token();
        let limiter =
            RateLimiter::spawn(&self.tracker, token.clone(), self.config.min_send_interval);
        *self.limiter.lock().unwrap_or_else(PoisonError::into_inner) = Some(limiter.clone());

        self.tracker.spawn(task_subscribe_sensor_ports(
            token,
            rx_events,
            limiter,
            self.session.clone(),
            self.registry.clone(),
            self.config.notification_delta,
        ));

        info!("Hub ready.");
        Ok(())
    }

    /// Release the link, or abort a connect still scanning. Outstanding
    /// commands fail with `HubError::Connection`. Safe to call repeatedly.
    #[instrument(skip_all)]
    pub async fn disconnect(&self) {
        self.session.disconnect().await;
        self.limiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Wait until a device is attached to `port_id`. Fails with
    /// `HubError::Connection` once the hub is disconnected.
    pub async fn wait_for_port(&self, port_id: u8) -> Result<Port, HubError> {
        let mut rx_events = self.tx_events.subscribe();
        loop {
            if let Some(port) = self.port(port_id) {
                return Ok(port);
            }
            if self.state() == SessionState::Disconnected {
                return Err(HubError::Connection(format!(
                    "Hub disconnected before port 0x{:02X} was attached.",
                    port_id
                )));
            }

            match rx_events.recv().await {
                Ok(event) => trace!("Still waiting for port 0x{:02X}, got {}.", port_id, event),
                Err(RecvError::Lagged(missed)) => debug!("Missed {} hub events.", missed),
                Err(RecvError::Closed) => {
                    return Err(HubError::Connection("Hub event channel closed.".into()))
                }
            }
        }
    }

    /// Drive the motor on `port` at `power` percent, clamped to -100..=100.
    pub async fn motor_pwm(&self, port: u8, power: i32) -> Result<(), HubError> {
        self.require_attached(port)?;
        self.send(encode_motor_power(port, power)?).await
    }

    /// Raw output command addressed to `port`.
    pub async fn send_output_command(
        &self,
        port: u8,
        sub_command: u8,
        payload: &[u8],
    ) -> Result<(), HubError> {
        self.require_attached(port)?;
        self.send(encode_output_command(port, sub_command, payload)?).await
    }

    /// Set the hub's RGB light, wherever it is attached.
    pub async fn set_led_color(&self, color: Color) -> Result<(), HubError> {
        let port = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .find(DeviceType::RgbLight)
            .ok_or_else(|| HubError::InvalidArgument("No RGB light is attached.".into()))?;
        self.send(encode_set_color(port, color)?).await
    }

    pub async fn play_sound(&self, port: u8, sound: Sound) -> Result<(), HubError> {
        self.require_attached(port)?;
        self.send(encode_play_sound(port, sound)?).await
    }

    /// Latest reading, `None` before the sensor reported.
    pub fn input_value(&self, port: u8, key: SensorKey) -> Option<i32> {
        self.store()
            .get(port, key)
            .map(|reading| reading.value)
    }

    pub fn read(&self, port: u8, key: SensorKey, default: i32) -> i32 {
        self.store().read(port, key, default)
    }

    pub fn port(&self, port: u8) -> Option<Port> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(port)
    }

    pub fn ports(&self) -> Vec<Port> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ports()
    }

    /// Stream of hub events from now on. A slow consumer sees a `Lagged`
    /// error instead of blocking the hub.
    pub fn events(&self) -> BroadcastStream<HubEvent> {
        BroadcastStream::new(self.tx_events.subscribe())
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<HubEvent> {
        self.tx_events.subscribe()
    }

    fn require_attached(&self, port: u8) -> Result<DeviceType, HubError> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .require_attached(port)
    }

    async fn send(&self, frame: CommandFrame) -> Result<(), HubError> {
        let limiter = self
            .limiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|limiter| !limiter.is_closed())
            .ok_or_else(|| HubError::Connection("Hub is not connected.".into()))?;

        debug!("Scheduling {}.", frame);
        let registry = self.registry.clone();
        let session = self.session.clone();
        limiter
            .schedule(move || write_to_attached_port(registry, session, frame))
            .await
    }

    fn store(&self) -> std::sync::RwLockReadGuard<'_, ValueStore> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        self.session.remove_handler(self.decoder_handler);
        self.token.cancel();
        self.session.connection_token().cancel();
    }
}
