use crate::config::{Config, MqttBroker};
use crate::error::BrokerError;
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS, SubscribeFilter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

pub mod dispatcher;
pub mod queue;
pub mod router;

pub use dispatcher::Dispatcher;
pub use queue::TopicQueues;
pub use router::{default_routes, TopicRouter};

const REQUEST_CAPACITY: usize = 64;

pub struct MqttClient {
    client: AsyncClient,
    timeout: Duration,
    is_connected: AtomicBool,
}

impl MqttClient {
    /// Creates the client, the returned event loop has to be polled to connect
    pub fn new(config: &Config) -> (Self, EventLoop) {
        let options = Self::options_for(config, &config.current_mqtt_broker());
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let client = MqttClient {
            client,
            timeout: config.mqtt_timeout(),
            is_connected: AtomicBool::new(false),
        };
        (client, eventloop)
    }

    pub fn options_for(config: &Config, broker: &MqttBroker) -> MqttOptions {
        let mut options =
            MqttOptions::new(config.mqtt_client_id(), broker.host.clone(), broker.port);
        options
            .set_keep_alive(config.mqtt_keep_alive())
            .set_clean_session(true);
        options
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::Relaxed)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.is_connected.store(connected, Ordering::Relaxed)
    }

    /// Queues one SUBSCRIBE for all filters of the router
    ///
    /// Doesn't wait, the SUBACK arrives through the event loop. Returns the
    /// number of requested filters.
    pub fn subscribe_routes(&self, router: &TopicRouter) -> Result<usize, BrokerError> {
        let filters: Vec<SubscribeFilter> = router
            .subscriptions()
            .into_iter()
            .map(|(pattern, qos)| SubscribeFilter::new(pattern, qos))
            .collect();
        let count = filters.len();
        if count == 0 {
            return Ok(0);
        }

        self.client.try_subscribe_many(filters)?;
        debug!(filters = count, "Requested subscriptions");
        Ok(count)
    }

    pub async fn publish(&self, topic: &str, payload: &str) -> Result<(), BrokerError> {
        let request = self
            .client
            .publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec());
        match tokio::time::timeout(self.timeout, request).await {
            Ok(res) => res?,
            Err(_) => return Err(BrokerError::Timeout()),
        }
        debug!(topic = %topic, "Published message");
        Ok(())
    }

    pub fn disconnect(&self) -> Result<(), BrokerError> {
        self.client.try_disconnect()?;
        self.set_connected(false);
        info!("Requested broker disconnect");
        Ok(())
    }
}
