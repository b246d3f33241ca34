use crate::config::AppConfig;
use crate::error::{RelayError, Result};
use crate::models::{Alert, EmergencyEvent};
use crate::mqtt::{AlertSink, BrokerSettings, ConnectionState, MqttConnection, Subscription};
use crate::processor::{decode_event, project, AlertBuilder};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Custom per-event processing. When installed it replaces the default
/// build-and-broadcast policy entirely.
pub type EventHook = Arc<dyn Fn(&RelayHandler, EmergencyEvent) + Send + Sync>;

struct Running {
    shutdown: CancellationToken,
    inbound: MqttConnection,
    outbound: MqttConnection,
    processor: JoinHandle<()>,
}

/// Receives emergency events on the simulator leg and republishes them as
/// client alerts on the client leg.
pub struct RelayHandler {
    config: AppConfig,
    builder: AlertBuilder,
    hook: RwLock<Option<EventHook>>,
    sink: RwLock<Option<Arc<dyn AlertSink>>>,
    running: AtomicBool,
    connections: Mutex<Option<Running>>,
}

impl RelayHandler {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            builder: AlertBuilder::new(),
            hook: RwLock::new(None),
            sink: RwLock::new(None),
            running: AtomicBool::new(false),
            connections: Mutex::new(None),
        }
    }

    /// Handler that publishes through `sink` without owning any broker
    /// connection. `start` is not needed before `broadcast`/`send_to_client`.
    pub fn with_sink(config: AppConfig, sink: Arc<dyn AlertSink>) -> Self {
        let handler = Self::new(config);
        handler.set_sink(Some(sink));
        handler
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_event_hook<F>(&self, hook: F)
    where
        F: Fn(&RelayHandler, EmergencyEvent) + Send + Sync + 'static,
    {
        *self.hook.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }

    pub fn clear_event_hook(&self) {
        *self.hook.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn has_event_hook(&self) -> bool {
        self.hook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn set_sink(&self, sink: Option<Arc<dyn AlertSink>>) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = sink;
    }

    /// Opens the client leg, then the simulator leg, and starts draining
    /// inbound events. Either connection failing aborts startup.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut connections = self.connections.lock().await;
        if connections.is_some() {
            warn!("Alert relay already started");
            return Ok(());
        }

        let shutdown = CancellationToken::new();

        let outbound = MqttConnection::connect(
            BrokerSettings::client(&self.config),
            None,
            shutdown.child_token(),
        )
        .await?;

        let (tx, rx) = mpsc::channel(self.config.inbound_channel_capacity);
        let subscription = Subscription {
            topic: self.config.simulator_topic.clone(),
            tx,
        };
        let inbound = match MqttConnection::connect(
            BrokerSettings::simulator(&self.config),
            Some(subscription),
            shutdown.child_token(),
        )
        .await
        {
            Ok(conn) => conn,
            Err(e) => {
                // Winds down the client leg driver, which flushes a DISCONNECT.
                shutdown.cancel();
                drop(outbound);
                return Err(e);
            }
        };

        self.set_sink(Some(Arc::new(outbound.publisher())));
        let processor = tokio::spawn(process_inbound(Arc::clone(self), rx, shutdown.clone()));

        *connections = Some(Running {
            shutdown,
            inbound,
            outbound,
            processor,
        });
        self.running.store(true, Ordering::SeqCst);
        info!("Alert relay started");
        Ok(())
    }

    /// Tears down both legs. Idempotent and best-effort: it never fails and
    /// waits at most a bounded time for the background tasks.
    pub async fn stop(&self) {
        let running = self.connections.lock().await.take();
        self.running.store(false, Ordering::SeqCst);
        let Some(running) = running else {
            return;
        };

        running.shutdown.cancel();
        self.set_sink(None);

        let tasks = vec![
            running.processor,
            running.inbound.into_driver(),
            running.outbound.into_driver(),
        ];
        join_or_abort(tasks, STOP_TIMEOUT).await;
        info!("Alert relay stopped");
    }

    /// `(simulator leg, client leg)` connection states.
    pub async fn connection_states(&self) -> (ConnectionState, ConnectionState) {
        match self.connections.lock().await.as_ref() {
            Some(running) => (running.inbound.state(), running.outbound.state()),
            None => (ConnectionState::Disconnected, ConnectionState::Disconnected),
        }
    }

    /// Handles one raw inbound payload. Bad payloads are logged and dropped.
    pub fn on_inbound_message(&self, payload: &[u8]) {
        let event = match decode_event(payload) {
            Ok(event) => event,
            Err(e @ RelayError::Decode(_)) => {
                error!("Failed to decode JSON: {}", e);
                return;
            }
            Err(e) => {
                error!("Dropping emergency event: {}", e);
                return;
            }
        };

        info!(
            "Received emergency event {} ({})",
            event.event_id, event.event_type
        );

        let hook = self
            .hook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let event_id = event.event_id.clone();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match hook {
            Some(hook) => hook(self, event),
            None => {
                let alert = self.build_alert(&event);
                self.broadcast(&alert);
            }
        }));
        if let Err(cause) = outcome {
            error!(
                "Processing of emergency event {} panicked: {}",
                event_id,
                panic_message(cause.as_ref())
            );
        }
    }

    pub fn build_alert(&self, event: &EmergencyEvent) -> Alert {
        self.builder.build(event)
    }

    /// Id of the last alert this handler built, 0 if none.
    pub fn last_alert_id(&self) -> u64 {
        self.builder.last_id()
    }

    pub fn broadcast(&self, alert: &Alert) {
        match self.publish_alert(&self.config.broadcast_topic, alert) {
            Ok(()) => info!("Broadcast alert {} to all clients", alert.id),
            Err(e) => error!("Failed to broadcast alert {}: {}", alert.id, e),
        }
    }

    pub fn send_to_client(&self, client_id: &str, alert: &Alert) {
        let topic = self.config.client_topic(client_id);
        match self.publish_alert(&topic, alert) {
            Ok(()) => info!("Sent alert {} to client {}", alert.id, client_id),
            Err(e) => error!("Failed to send alert {} to client {}: {}", alert.id, client_id, e),
        }
    }

    fn publish_alert(&self, topic: &str, alert: &Alert) -> Result<()> {
        let payload = serde_json::to_vec(&project(alert)).map_err(|e| RelayError::Publish {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;

        let sink = self
            .sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| RelayError::Publish {
                topic: topic.to_string(),
                reason: "client leg is not connected".to_string(),
            })?;
        sink.publish(topic, payload)
    }
}

/// Waits for every task up to `limit`, then aborts whichever are left.
async fn join_or_abort(mut tasks: Vec<JoinHandle<()>>, limit: Duration) {
    let joined =
        tokio::time::timeout(limit, futures::future::join_all(tasks.iter_mut())).await;
    match joined {
        Ok(results) => {
            for res in results {
                if let Err(e) = res {
                    warn!("Relay task ended abnormally: {}", e);
                }
            }
        }
        Err(_) => {
            warn!("Relay tasks did not finish within {:?}, aborting", limit);
            for task in &tasks {
                task.abort();
            }
        }
    }
}

fn panic_message(cause: &(dyn Any + Send)) -> &str {
    if let Some(msg) = cause.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = cause.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic payload"
    }
}

async fn process_inbound(
    handler: Arc<RelayHandler>,
    mut rx: mpsc::Receiver<Vec<u8>>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = rx.recv() => match msg {
                Some(payload) => handler.on_inbound_message(&payload),
                None => break,
            },
        }
    }
}
