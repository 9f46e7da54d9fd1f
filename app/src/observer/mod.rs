use crate::config::Config;
use crate::error::{BrokerError, ObserverError, PersistenceError, StartupError};
use crate::models::Store;
use crate::mqtt::router::TEST_PUBLISH_TOPIC;
use crate::mqtt::{default_routes, Dispatcher, MqttClient, TopicQueues, TopicRouter};
use crate::sensor::IngestContext;
use fastscale_core::{Record, Sensor};
use rumqttc::{
    ConnAck, ConnectReturnCode, Event, EventLoop, Outgoing, Packet, Publish, SubscribeReasonCode,
};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};


pub const TEST_MESSAGE: &str = "Hello from fastscale";

const DEMO_SENSORS: [(&str, &str); 3] = [
    ("demo1", "kitchen"),
    ("demo2", "bathroom"),
    ("demo3", "bedroom"),
];
const ROTATE_AFTER_FAILURES: u32 = 3;
const MAX_RECONNECT_DELAY_S: u64 = 30;

pub struct ConcurrentObserver {
    config: Arc<Config>,
    ctx: Arc<IngestContext>,
    dispatcher: Arc<Dispatcher>,
    queues: TopicQueues,
    mqtt_client: MqttClient,
    eventloop: Mutex<Option<EventLoop>>,
}

impl Debug for ConcurrentObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentObserver").finish()
    }
}

impl ConcurrentObserver {
    pub fn new(config: Arc<Config>, store: Arc<dyn Store>) -> Result<Arc<Self>, StartupError> {
        let router = default_routes()?;
        Ok(Self::with_router(config, store, router))
    }

    pub fn with_router(
        config: Arc<Config>,
        store: Arc<dyn Store>,
        router: TopicRouter,
    ) -> Arc<Self> {
        let ctx = Arc::new(IngestContext::new(store));
        let dispatcher = Arc::new(Dispatcher::new(ctx.clone(), router));
        let (mqtt_client, eventloop) = MqttClient::new(&config);

        let observer = ConcurrentObserver {
            queues: TopicQueues::new(dispatcher.clone()),
            eventloop: Mutex::new(Some(eventloop)),
            mqtt_client,
            dispatcher,
            ctx,
            config,
        };
        Arc::new(observer)
    }

    /// Prepares storage, then connects and subscribes every route
    ///
    /// Nothing gets subscribed unless the schema exists, any failure is
    /// fatal for the process.
    #[tracing::instrument]
    pub async fn start(&self) -> Result<(), StartupError> {
        self.prepare_storage().await.map_err(StartupError::Schema)?;

        let mut guard = self.eventloop.lock().await;
        let eventloop = guard.as_mut().ok_or_else(|| {
            BrokerError::Connect(
                self.config.current_mqtt_broker().to_string(),
                "event loop closed".to_owned(),
            )
        })?;
        self.connect_broker(eventloop).await?;
        self.await_subscriptions(eventloop).await?;

        info!("Observer started");
        Ok(())
    }

    /// Polls the broker connection and queues each received message
    /// Reconnects with exponential backoff until `shutdown` fires
    /// Blocks caller in a loop
    pub async fn dispatch_mqtt_receive_loop(
        self: Arc<ConcurrentObserver>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let Ok(mut guard) = self.eventloop.try_lock() else {
            error!("dispatch_mqtt_receive_loop() already called!");
            return;
        };
        let Some(eventloop) = guard.as_mut() else {
            error!("MQTT event loop already closed");
            return;
        };

        info!("Start capturing mqtt events");
        let mut failures: u32 = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }
            let event = tokio::select! {
                _ = shutdown.changed() => break,
                event = eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => self.on_publish(publish),
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if self.on_connack(&ack) {
                        failures = 0;
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    let rejected = ack
                        .return_codes
                        .iter()
                        .filter(|code| matches!(code, SubscribeReasonCode::Failure))
                        .count();
                    if rejected > 0 {
                        error!(rejected = rejected, "Broker rejected subscriptions");
                    } else {
                        debug!(filters = ack.return_codes.len(), "Resubscribed routes");
                    }
                }
                Ok(_) => (),
                Err(e) => {
                    self.mqtt_client.set_connected(false);
                    failures += 1;
                    let delay = reconnect_delay(failures);
                    warn!(
                        failures = failures,
                        "MQTT connection error: {}, retry in {} s",
                        e,
                        delay.as_secs()
                    );

                    let rotate = failures % ROTATE_AFTER_FAILURES == 0;
                    if rotate && self.config.mqtt_brokers().len() > 1 {
                        let next = self.config.next_mqtt_broker();
                        info!(broker = %next, "Rotating to next broker");
                        eventloop.mqtt_options = MqttClient::options_for(&self.config, &next);
                    }

                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(delay) => (),
                    }
                }
            }
        }
        info!("Stopped capturing mqtt events");
    }

    /// Stops intake, drains queued messages, then releases broker and database
    #[tracing::instrument]
    pub async fn shutdown(&self) {
        self.queues.close();
        info!("Stopped accepting messages");

        self.queues.drain(self.config.drain_timeout()).await;
        self.disconnect_broker().await;
        self.ctx.store().close().await;
        info!("Shutdown complete");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_mqtt_connected(&self) -> bool {
        self.mqtt_client.is_connected()
    }

    /// Loads the device cache on first use, falls back to the cached count
    pub async fn known_devices(&self) -> usize {
        let registry = self.ctx.registry();
        match registry.known_ids(self.ctx.store()).await {
            Ok(ids) => ids.len(),
            Err(e) => {
                warn!("Failed loading known devices: {}", e);
                registry.len()
            }
        }
    }

    pub async fn database_state(&self) -> String {
        match self.ctx.store().ping().await {
            Ok(()) => "connected".to_owned(),
            Err(e) => format!("unavailable: {}", e),
        }
    }

    pub async fn publish_test_message(&self) -> Result<(), ObserverError> {
        self.mqtt_client
            .publish(TEST_PUBLISH_TOPIC, TEST_MESSAGE)
            .await?;
        info!(topic = TEST_PUBLISH_TOPIC, "Published test message");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn close_eventloop(&self) {
        self.eventloop.lock().await.take();
    }

    /// Resubscribes after an accepted reconnect, returns false if the broker refused
    fn on_connack(&self, ack: &ConnAck) -> bool {
        let broker = self.config.current_mqtt_broker();
        if ack.code != ConnectReturnCode::Success {
            self.mqtt_client.set_connected(false);
            error!(broker = %broker, "Broker refused connection: {:?}", ack.code);
            return false;
        }

        self.mqtt_client.set_connected(true);
        info!(broker = %broker, "Reconnected to broker");
        // clean sessions drop subscriptions on the broker side
        if let Err(e) = self.mqtt_client.subscribe_routes(self.dispatcher.router()) {
            error!("Failed resubscribing routes: {}", e);
        }
        true
    }

    fn on_publish(&self, publish: Publish) {
        debug!(topic = %publish.topic, "Received publish");
        if !self.queues.enqueue(publish) {
            debug!("Shutting down, dropped message");
        }
    }

    #[tracing::instrument]
    pub(crate) async fn prepare_storage(&self) -> Result<(), PersistenceError> {
        let store = self.ctx.store();
        store.ensure_schema().await?;
        info!("Ensured database schema");

        self.ctx.registry().refresh(store).await?;
        if self.config.seed_demo_sensors() {
            self.seed_demo_sensors().await?;
        }
        Ok(())
    }

    async fn seed_demo_sensors(&self) -> Result<(), PersistenceError> {
        let store = self.ctx.store();
        if store.count_sensors().await? > 0 {
            debug!("Sensors present, skipping demo sensors");
            return Ok(());
        }
        for (name, location) in DEMO_SENSORS {
            store
                .insert(&Record::Sensor(Sensor::new(name, location)))
                .await?;
        }
        info!(count = DEMO_SENSORS.len(), "Seeded demo sensors");
        Ok(())
    }

    /// Tries each configured broker once, in order
    async fn connect_broker(&self, eventloop: &mut EventLoop) -> Result<(), BrokerError> {
        let mut last_error = String::new();
        for attempt in 0..self.config.mqtt_brokers().len() {
            if attempt > 0 {
                let next = self.config.next_mqtt_broker();
                eventloop.mqtt_options = MqttClient::options_for(&self.config, &next);
            }

            let broker = self.config.current_mqtt_broker();
            let handshake = self.await_connack(eventloop);
            match tokio::time::timeout(self.config.mqtt_timeout(), handshake).await {
                Ok(Ok(())) => {
                    self.mqtt_client.set_connected(true);
                    info!(broker = %broker, "Connected to broker");
                    return Ok(());
                }
                Ok(Err(e)) => {
                    warn!(broker = %broker, "Failed connecting broker: {}", e);
                    last_error = e;
                }
                Err(_) => {
                    warn!(broker = %broker, "Broker handshake timed out");
                    last_error = "handshake timed out".to_owned();
                }
            }
        }

        let brokers: Vec<String> = self
            .config
            .mqtt_brokers()
            .iter()
            .map(|b| b.to_string())
            .collect();
        Err(BrokerError::Connect(brokers.join(", "), last_error))
    }

    async fn await_connack(&self, eventloop: &mut EventLoop) -> Result<(), String> {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    return match ack.code {
                        ConnectReturnCode::Success => Ok(()),
                        code => Err(format!("connection refused: {:?}", code)),
                    };
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => self.on_publish(publish),
                Ok(_) => (),
                Err(e) => return Err(e.to_string()),
            }
        }
    }

    async fn await_subscriptions(&self, eventloop: &mut EventLoop) -> Result<(), BrokerError> {
        let requested = self.mqtt_client.subscribe_routes(self.dispatcher.router())?;
        let wait = async {
            let mut acked = 0;
            while acked < requested {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::SubAck(ack))) => {
                        if ack
                            .return_codes
                            .iter()
                            .any(|code| matches!(code, SubscribeReasonCode::Failure))
                        {
                            return Err(BrokerError::Subscribe(format!("{:?}", ack.return_codes)));
                        }
                        acked += ack.return_codes.len();
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => self.on_publish(publish),
                    Ok(_) => (),
                    Err(e) => {
                        return Err(BrokerError::Connect(
                            self.config.current_mqtt_broker().to_string(),
                            e.to_string(),
                        ))
                    }
                }
            }
            Ok::<(), BrokerError>(())
        };

        match tokio::time::timeout(self.config.mqtt_timeout(), wait).await {
            Ok(res) => res?,
            Err(_) => return Err(BrokerError::Timeout()),
        }
        info!(filters = requested, "Subscribed all routes");
        Ok(())
    }

    async fn disconnect_broker(&self) {
        let was_connected = self.mqtt_client.is_connected();
        if let Err(e) = self.mqtt_client.disconnect() {
            warn!("Failed requesting disconnect: {}", e);
            return;
        }
        if !was_connected {
            return;
        }

        let lock = tokio::time::timeout(self.config.mqtt_timeout(), self.eventloop.lock());
        let Ok(mut guard) = lock.await else {
            warn!("Event loop busy, skipping disconnect flush");
            return;
        };
        let Some(eventloop) = guard.as_mut() else {
            return;
        };

        let flush = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => (),
                }
            }
        };
        if tokio::time::timeout(self.config.mqtt_timeout(), flush).await.is_err() {
            warn!("Timed out flushing disconnect");
        } else {
            info!("Disconnected from broker");
        }
    }
}

/// 1 s doubling per consecutive failure, capped at 30 s
fn reconnect_delay(failures: u32) -> Duration {
    let exp = failures.saturating_sub(1).min(5);
    Duration::from_secs((1u64 << exp).min(MAX_RECONNECT_DELAY_S))
}
