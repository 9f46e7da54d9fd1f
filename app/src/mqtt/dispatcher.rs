use super::router::{Handler, TopicRouter};
use crate::error::{PersistenceError, PipelineError};
use crate::sensor::IngestContext;
use fastscale_core::{EnviroSensor, RecordKind};
use rumqttc::QoS;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Result of one route handling one message
#[derive(Debug)]
pub enum Outcome {
    Stored {
        kind: RecordKind,
        created_device: bool,
    },
    Registered {
        created: bool,
    },
    Logged(&'static str),
    Dropped(PipelineError),
}

impl Outcome {
    #[cfg(test)]
    pub fn is_dropped(&self) -> bool {
        matches!(self, Outcome::Dropped(_))
    }

    fn log(&self) {
        match self {
            Outcome::Stored {
                kind,
                created_device,
            } => debug!(kind = %kind, created_device = created_device, "Stored record"),
            Outcome::Registered { created } => debug!(created = created, "Handled registration"),
            Outcome::Logged(_) => (),
            Outcome::Dropped(e) => debug!("Dropped message: {}", e),
        }
    }
}

pub struct Dispatcher {
    ctx: Arc<IngestContext>,
    router: TopicRouter,
}

impl Dispatcher {
    pub fn new(ctx: Arc<IngestContext>, router: TopicRouter) -> Self {
        Dispatcher { ctx, router }
    }

    pub fn router(&self) -> &TopicRouter {
        &self.router
    }

    #[cfg(test)]
    pub fn context(&self) -> &IngestContext {
        &self.ctx
    }

    /// Runs every route matching `topic`, failures of one route don't affect the others
    pub async fn dispatch(&self, topic: &str, payload: &[u8], qos: QoS) -> Vec<Outcome> {
        let span = info_span!("message", topic = %topic, qos = qos as u8);
        async {
            debug!(bytes = payload.len(), "Received message");
            let mut outcomes = Vec::new();
            for route in self.router.routes_for(topic) {
                let outcome = self.handle(topic, payload, &route.handler).await;
                outcome.log();
                outcomes.push(outcome);
            }
            if outcomes.is_empty() {
                debug!("No route for topic");
            }
            outcomes
        }
        .instrument(span)
        .await
    }

    async fn handle(&self, topic: &str, payload: &[u8], handler: &Handler) -> Outcome {
        let res = match handler {
            Handler::Log(label) => {
                info!(
                    label = label,
                    payload = %String::from_utf8_lossy(payload),
                    "Received {} on {}", label, topic
                );
                return Outcome::Logged(*label);
            }
            Handler::Register => self.register(payload).await,
            Handler::Persist(kind) => self.persist(*kind, payload).await,
        };

        match res {
            Ok(outcome) => outcome,
            Err(PipelineError::Validation(e)) => {
                warn!("Dropped invalid message: {}", e);
                Outcome::Dropped(e.into())
            }
            Err(PipelineError::Persistence(e)) => {
                error!("Failed persisting message: {}", e);
                Outcome::Dropped(e.into())
            }
        }
    }

    async fn register(&self, payload: &[u8]) -> Result<Outcome, PipelineError> {
        let device = EnviroSensor::decode(payload)?;
        let created = self
            .ctx
            .registry()
            .register_if_unknown(self.ctx.store(), &device)
            .await?;
        Ok(Outcome::Registered { created })
    }

    async fn persist(&self, kind: RecordKind, payload: &[u8]) -> Result<Outcome, PipelineError> {
        let record = kind.decode(payload)?;
        let store = self.ctx.store();
        let registry = self.ctx.registry();

        let device = record.implied_device();
        let mut created_device = false;
        if let Some(device) = &device {
            created_device = registry.register_if_unknown(store, device).await?;
        }

        match (store.insert(&record).await, &device) {
            (Err(PersistenceError::ForeignKey(reason)), Some(device)) => {
                // device row vanished behind the cache, register it again once
                warn!(uid = %device.uid, "Device missing, registering again: {}", reason);
                registry.forget(&device.uid);
                created_device |= registry.register_if_unknown(store, device).await?;
                store.insert(&record).await?;
            }
            (res, _) => {
                res?;
            }
        }

        Ok(Outcome::Stored {
            kind,
            created_device,
        })
    }
}
