use super::dispatcher::Dispatcher;
use parking_lot::Mutex;
use rumqttc::Publish;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Time a topic worker waits for new messages before it stops
pub const IDLE_WORKER_TIMEOUT: Duration = Duration::from_secs(60);

type Senders = Arc<Mutex<HashMap<String, UnboundedSender<Publish>>>>;

/// One queue and worker per concrete topic
///
/// Messages of a topic are dispatched in delivery order, distinct topics
/// are dispatched concurrently. A worker without messages for the idle
/// timeout removes its queue, the next message of that topic starts a new one.
pub struct TopicQueues {
    dispatcher: Arc<Dispatcher>,
    senders: Senders,
    workers: Mutex<JoinSet<()>>,
    closed: AtomicBool,
    idle_timeout: Duration,
}

impl TopicQueues {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self::with_idle_timeout(dispatcher, IDLE_WORKER_TIMEOUT)
    }

    pub fn with_idle_timeout(dispatcher: Arc<Dispatcher>, idle_timeout: Duration) -> Self {
        TopicQueues {
            dispatcher,
            senders: Arc::new(Mutex::new(HashMap::new())),
            workers: Mutex::new(JoinSet::new()),
            closed: AtomicBool::new(false),
            idle_timeout,
        }
    }

    /// Returns false if the queues no longer accept messages
    pub fn enqueue(&self, publish: Publish) -> bool {
        if self.is_closed() {
            return false;
        }

        // workers remove their own entry under this lock, a send never hits a stopped worker
        let mut senders = self.senders.lock();
        let sender = senders
            .entry(publish.topic.clone())
            .or_insert_with_key(|topic| self.spawn_worker(topic));
        sender.send(publish).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub fn topic_count(&self) -> usize {
        self.senders.lock().len()
    }

    #[cfg(test)]
    pub fn worker_count(&self) -> usize {
        let mut workers = self.workers.lock();
        while workers.try_join_next().is_some() {}
        workers.len()
    }

    /// Stops accepting messages, queued messages are still processed
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.senders.lock().clear();
    }

    /// Closes the queues and waits at most `timeout` for the workers
    ///
    /// Workers still busy afterwards are aborted. Returns true if every
    /// queued message got dispatched.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.close();
        let mut workers = std::mem::take(&mut *self.workers.lock());
        let pending = workers.len();

        let finished = tokio::time::timeout(timeout, async {
            while workers.join_next().await.is_some() {}
        })
        .await
        .is_ok();

        if finished {
            info!(workers = pending, "Drained topic queues");
        } else {
            warn!(
                remaining = workers.len(),
                "Drain timed out after {} ms, aborting workers",
                timeout.as_millis()
            );
            workers.abort_all();
            while workers.join_next().await.is_some() {}
        }
        finished
    }

    fn spawn_worker(&self, topic: &str) -> UnboundedSender<Publish> {
        let (sender, receiver) = unbounded_channel::<Publish>();
        let worker = TopicWorker {
            topic: topic.to_owned(),
            receiver,
            dispatcher: self.dispatcher.clone(),
            senders: self.senders.clone(),
            idle_timeout: self.idle_timeout,
        };
        debug!(topic = %topic, "Starting topic worker");

        let mut workers = self.workers.lock();
        // reap stopped idle workers
        while workers.try_join_next().is_some() {}
        workers.spawn(worker.run());
        sender
    }
}

struct TopicWorker {
    topic: String,
    receiver: UnboundedReceiver<Publish>,
    dispatcher: Arc<Dispatcher>,
    senders: Senders,
    idle_timeout: Duration,
}

impl TopicWorker {
    async fn run(mut self) {
        loop {
            let next = tokio::time::timeout(self.idle_timeout, self.receiver.recv()).await;
            let publish = match next {
                Ok(Some(publish)) => publish,
                Ok(None) => return,
                Err(_) => match self.take_or_retire() {
                    Some(publish) => publish,
                    None => return,
                },
            };
            self.dispatcher
                .dispatch(&publish.topic, &publish.payload, publish.qos)
                .await;
        }
    }

    /// Returns a message that raced the idle timeout, otherwise removes the queue
    fn take_or_retire(&mut self) -> Option<Publish> {
        let mut senders = self.senders.lock();
        if let Ok(publish) = self.receiver.try_recv() {
            return Some(publish);
        }
        senders.remove(&self.topic);
        debug!(topic = %self.topic, active = senders.len(), "Stopped idle topic worker");
        None
    }
}
