use crate::config::AppConfig;
use crate::error::{RelayError, Result};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

const REQUEST_CHANNEL_CAPACITY: usize = 100;
const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Outbound publish primitive. Implementations enqueue and return; they
/// never wait for subscribers.
pub trait AlertSink: Send + Sync {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub leg: &'static str,
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

impl BrokerSettings {
    /// Inbound leg, where the stadium simulator publishes.
    pub fn simulator(config: &AppConfig) -> Self {
        Self::for_leg(config, "simulator", &config.simulator_broker, config.simulator_port)
    }

    /// Outbound leg, where alert subscribers listen.
    pub fn client(config: &AppConfig) -> Self {
        Self::for_leg(config, "client", &config.client_broker, config.client_port)
    }

    fn for_leg(config: &AppConfig, leg: &'static str, host: &str, port: u16) -> Self {
        // Both legs may share one broker, so their client ids must differ.
        let client_id = format!("{}-{}-{}", config.mqtt_client_id, leg, Uuid::new_v4().simple());
        Self {
            leg,
            host: host.to_string(),
            port,
            client_id,
            keep_alive: config.keep_alive(),
            connect_timeout: config.connect_timeout(),
            reconnect_initial: config.reconnect_initial(),
            reconnect_max: config.reconnect_max(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Inbound subscription: every publish received on `topic` is forwarded to
/// `tx` in arrival order.
pub struct Subscription {
    pub topic: String,
    pub tx: mpsc::Sender<Vec<u8>>,
}

/// Exponential reconnect delay, doubling from `initial` up to `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self { initial, max, current: initial }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

pub struct MqttConnection {
    settings: BrokerSettings,
    client: AsyncClient,
    state: watch::Receiver<ConnectionState>,
    driver: JoinHandle<()>,
}

impl fmt::Debug for MqttConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttConnection")
            .field("leg", &self.settings.leg)
            .field("broker", &self.settings.address())
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl MqttConnection {
    /// Connects and waits for the broker's CONNACK. Fails if the broker
    /// refuses, is unreachable, or does not answer within the timeout.
    pub async fn connect(
        settings: BrokerSettings,
        subscription: Option<Subscription>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let address = settings.address();
        info!("Connecting {} leg to MQTT broker at {}", settings.leg, address);

        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(settings.keep_alive);
        options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let connection_error = |reason: String| RelayError::Connection {
            broker: address.clone(),
            reason,
        };

        match tokio::time::timeout(settings.connect_timeout, wait_for_connack(&mut eventloop)).await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                state_tx.send_replace(ConnectionState::Disconnected);
                return Err(connection_error(e.to_string()));
            }
            Err(_) => {
                state_tx.send_replace(ConnectionState::Disconnected);
                return Err(connection_error(format!(
                    "no CONNACK within {:?}",
                    settings.connect_timeout
                )));
            }
        }
        state_tx.send_replace(ConnectionState::Connected);
        info!("Connected {} leg to MQTT broker at {}", settings.leg, address);

        if let Some(sub) = &subscription {
            client
                .subscribe(&sub.topic, QoS::AtLeastOnce)
                .await
                .map_err(|e| connection_error(format!("subscribe to '{}' failed: {}", sub.topic, e)))?;
            info!("Subscribed to {}", sub.topic);
        }

        let driver = tokio::spawn(drive_event_loop(
            settings.leg,
            eventloop,
            client.clone(),
            subscription,
            state_tx,
            shutdown,
            Backoff::new(settings.reconnect_initial, settings.reconnect_max),
        ));

        Ok(Self {
            settings,
            client,
            state: state_rx,
            driver,
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn publisher(&self) -> MqttPublisher {
        MqttPublisher {
            client: self.client.clone(),
        }
    }

    pub fn into_driver(self) -> JoinHandle<()> {
        self.driver
    }
}

#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl AlertSink for MqttPublisher {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| RelayError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> std::result::Result<(), rumqttc::ConnectionError> {
    loop {
        if let Event::Incoming(Packet::ConnAck(_)) = eventloop.poll().await? {
            return Ok(());
        }
    }
}

async fn drive_event_loop(
    leg: &'static str,
    mut eventloop: EventLoop,
    client: AsyncClient,
    subscription: Option<Subscription>,
    state: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
    mut backoff: Backoff,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                break;
            }
            notification = eventloop.poll() => {
                match notification {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let Some(sub) = &subscription else { continue };
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            sent = sub.tx.send(publish.payload.to_vec()) => {
                                if sent.is_err() {
                                    warn!("Inbound consumer dropped, stopping {} leg", leg);
                                    break;
                                }
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        backoff.reset();
                        state.send_replace(ConnectionState::Connected);
                        info!("MQTT {} leg reconnected", leg);
                        if let Some(sub) = &subscription {
                            if let Err(e) = client.try_subscribe(&sub.topic, QoS::AtLeastOnce) {
                                error!("Failed to re-subscribe to {}: {}", sub.topic, e);
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        info!("Subscription confirmed on {} leg", leg);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if shutdown.is_cancelled() {
                            break;
                        }
                        let previous = state.send_replace(ConnectionState::Disconnected);
                        if previous == ConnectionState::Connected {
                            warn!("Unexpected disconnection on {} leg: {}", leg, e);
                        }
                        let delay = backoff.next_delay();
                        warn!("MQTT {} leg error: {}. Retrying in {:?}", leg, e, delay);
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                        state.send_replace(ConnectionState::Connecting);
                    }
                }
            }
        }
    }

    flush_disconnect(leg, &mut eventloop, &client).await;
    state.send_replace(ConnectionState::Disconnected);
}

/// Best effort: give the event loop a short window to put DISCONNECT on
/// the wire before the socket is dropped.
async fn flush_disconnect(leg: &'static str, eventloop: &mut EventLoop, client: &AsyncClient) {
    let _ = client.try_disconnect();
    let flushed = tokio::time::timeout(DISCONNECT_GRACE, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;
    if flushed.is_err() {
        warn!("MQTT {} leg did not disconnect cleanly", leg);
    }
}
