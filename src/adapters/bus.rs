//! In-process message bus. Delivers every emitted event to the saga
//! dispatcher, one message at a time and in emission order per key. While a
//! message waits for redelivery, later messages with the same key are held
//! back and follow it in order; other keys keep flowing.
//!
//! Nothing is persisted: messages in flight are lost on shutdown and the
//! reconciliation jobs pick the affected entities up again.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::dispatcher::SagaDispatcher;
use crate::error::EmitError;
use crate::events::EventEnvelope;
use crate::ports::EventEmitter;

#[derive(Debug, Clone)]
struct BusMessage {
    topic: String,
    envelope: EventEnvelope,
    attempt: u32,
}

/// Redelivery policy for messages whose handler failed with a retryable error.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(500),
        }
    }
}

pub struct InProcessBus {
    sender: mpsc::UnboundedSender<BusMessage>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<BusMessage>>>,
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessBus {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Consumes messages until `shutdown` flips to true. Can only run once
    /// per bus.
    pub async fn run(
        &self,
        dispatcher: Arc<SagaDispatcher>,
        retry: RetryPolicy,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let mut receiver = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow::anyhow!("bus consumer already started"))?;
        info!("Bus consumer started");

        let (redeliver, mut redeliveries) = mpsc::unbounded_channel::<BusMessage>();
        let mut held: HashMap<String, VecDeque<BusMessage>> = HashMap::new();
        loop {
            tokio::select! {
                message = receiver.recv() => {
                    let Some(message) = message else { break };
                    if let Some(queue) = held.get_mut(&message.envelope.key) {
                        debug!(
                            topic = %message.topic,
                            key = %message.envelope.key,
                            "holding message behind a pending redelivery"
                        );
                        queue.push_back(message);
                        continue;
                    }
                    deliver_in_key_order(&dispatcher, retry, &redeliver, &mut held, message).await;
                }
                Some(message) = redeliveries.recv() => {
                    deliver_in_key_order(&dispatcher, retry, &redeliver, &mut held, message).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Bus consumer stopped");
        Ok(())
    }

    /// Delivers everything queued, including what the handlers emit along
    /// the way, and returns once the queue is empty. Used by one-off runs
    /// that have no long-lived consumer.
    pub async fn drain(&self, dispatcher: &SagaDispatcher, retry: RetryPolicy) -> anyhow::Result<usize> {
        let mut guard = self.receiver.lock().await;
        let receiver = guard
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("bus consumer already started"))?;

        let mut delivered = 0;
        while let Ok(message) = receiver.try_recv() {
            delivered += 1;
            let mut next = Some(message);
            while let Some(message) = next.take() {
                if let Some((again, delay)) = deliver(dispatcher, retry, message).await {
                    tokio::time::sleep(delay).await;
                    next = Some(again);
                }
            }
        }
        Ok(delivered)
    }
}

/// Delivers `message`, then whatever was held behind its key. Stops at the
/// first message that needs a redelivery, keeping the rest held until that
/// redelivery comes back through `redeliver`.
async fn deliver_in_key_order(
    dispatcher: &SagaDispatcher,
    retry: RetryPolicy,
    redeliver: &mpsc::UnboundedSender<BusMessage>,
    held: &mut HashMap<String, VecDeque<BusMessage>>,
    message: BusMessage,
) {
    let key = message.envelope.key.clone();
    let mut next = Some(message);
    while let Some(message) = next.take() {
        if let Some((again, delay)) = deliver(dispatcher, retry, message).await {
            held.entry(key.clone()).or_default();
            let redeliver = redeliver.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = redeliver.send(again);
            });
            return;
        }
        next = held.get_mut(&key).and_then(VecDeque::pop_front);
    }
    held.remove(&key);
}

/// Hands one message to the dispatcher. Returns the message to redeliver and
/// the delay before doing so, if the failure is worth retrying.
async fn deliver(
    dispatcher: &SagaDispatcher,
    retry: RetryPolicy,
    message: BusMessage,
) -> Option<(BusMessage, Duration)> {
    match dispatcher.dispatch(&message.topic, &message.envelope).await {
        Ok(outcome) => {
            debug!(topic = %message.topic, ?outcome, "message delivered");
            None
        }
        Err(e) if e.is_retryable() && message.attempt + 1 < retry.max_attempts => {
            let delay = retry.backoff * (message.attempt + 1);
            warn!(
                topic = %message.topic,
                key = %message.envelope.key,
                attempt = message.attempt + 1,
                error = %e,
                "handler failed, redelivering in {:?}",
                delay
            );
            Some((
                BusMessage {
                    attempt: message.attempt + 1,
                    ..message
                },
                delay,
            ))
        }
        Err(e) => {
            error!(
                topic = %message.topic,
                key = %message.envelope.key,
                attempts = message.attempt + 1,
                error = %e,
                "handler failed, dropping message"
            );
            None
        }
    }
}

#[async_trait]
impl EventEmitter for InProcessBus {
    async fn emit(&self, topic: &str, envelope: &EventEnvelope) -> Result<(), EmitError> {
        self.sender
            .send(BusMessage {
                topic: topic.to_string(),
                envelope: envelope.clone(),
                attempt: 0,
            })
            .map_err(|_| EmitError::NoSubscriber(topic.to_string()))
    }
}
