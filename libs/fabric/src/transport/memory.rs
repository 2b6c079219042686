use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use mqrpc_core::{AckToken, Envelope};

use crate::error::{Error, Result};
use crate::transport::{MessageDeleter, MessageReceiver, MessageSender};

/// Receive-side queue settings
///
/// Key names match the receiver section of the queue configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Maximum number of messages returned by one receive call
    #[serde(rename = "number_messages_per_receive")]
    pub batch_size: usize,
    /// Seconds a delivered message stays hidden before it is redelivered
    #[serde(rename = "visibility_timeout")]
    pub visibility_timeout_secs: u64,
    /// Seconds a receive call waits for messages when the queue is empty
    #[serde(rename = "wait_time_seconds")]
    pub wait_time_secs: u64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            visibility_timeout_secs: 30,
            wait_time_secs: 1,
        }
    }
}

/// In-process message queue with visibility-timeout redelivery
///
/// Messages are stored in their serialized envelope form, so everything that
/// travels through the queue goes through the same JSON boundary a networked
/// queue would impose. A delivered message stays invisible until it is deleted
/// or its visibility timeout elapses, after which it is delivered again with a
/// new ack token.
#[derive(Clone)]
pub struct MemoryQueue {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    notify: Notify,
    batch_size: usize,
    visibility_timeout: Duration,
    wait_time: Duration,
}

#[derive(Default)]
struct State {
    ready: VecDeque<String>,
    in_flight: HashMap<String, InFlight>,
    closed: bool,
}

struct InFlight {
    body: String,
    visible_at: Instant,
}

impl State {
    fn requeue_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, message)| message.visible_at <= now)
            .map(|(token, _)| token.clone())
            .collect();

        for token in expired {
            if let Some(message) = self.in_flight.remove(&token) {
                tracing::debug!(ack = %token, "visibility timeout elapsed, requeueing message");
                self.ready.push_back(message.body);
            }
        }
    }

    fn next_visible_at(&self) -> Option<Instant> {
        self.in_flight.values().map(|message| message.visible_at).min()
    }
}

impl MemoryQueue {
    /// Create a queue with default settings
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a queue from receiver configuration
    pub fn from_config(config: &ReceiverConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Create a builder for configuring the queue
    pub fn builder() -> MemoryQueueBuilder {
        MemoryQueueBuilder::new()
    }

    /// Number of messages currently visible to receivers
    pub fn visible_len(&self) -> usize {
        self.inner.state.lock().ready.len()
    }

    /// Number of delivered messages awaiting delete or redelivery
    pub fn in_flight_len(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }

    /// Close the queue
    ///
    /// Pending and future receives and sends fail with `QueueClosed`.
    pub fn close(&self) {
        self.inner.state.lock().closed = true;
        self.inner.notify.notify_waiters();
    }

    fn deliver(&self, state: &mut State, now: Instant) -> Result<Vec<Envelope>> {
        let count = state.ready.len().min(self.inner.batch_size);
        let bodies: Vec<String> = state.ready.drain(..count).collect();

        // Hide everything first so an unparsable body is redelivered like any
        // other unacknowledged message.
        let mut deliveries = Vec::with_capacity(bodies.len());
        for body in bodies {
            let token = Uuid::new_v4().to_string();
            state.in_flight.insert(
                token.clone(),
                InFlight {
                    body: body.clone(),
                    visible_at: now + self.inner.visibility_timeout,
                },
            );
            deliveries.push((token, body));
        }

        let batch = deliveries
            .into_iter()
            .map(|(token, body)| {
                Envelope::from_json(&body)
                    .map(|envelope| envelope.with_ack_token(AckToken::new(token)))
                    .map_err(Error::from)
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(count = batch.len(), "delivered batch");
        Ok(batch)
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MessageSender for MemoryQueue {
    async fn send(&self, envelope: Envelope) -> Result<()> {
        let body = envelope.to_json()?;
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(Error::QueueClosed);
            }
            state.ready.push_back(body);
        }
        tracing::trace!(%envelope, "enqueued message");
        self.inner.notify.notify_waiters();
        Ok(())
    }
}

#[async_trait::async_trait]
impl MessageReceiver for MemoryQueue {
    async fn receive_batch(&self) -> Result<Vec<Envelope>> {
        let deadline = Instant::now() + self.inner.wait_time;

        loop {
            // Register interest before inspecting state so a send racing with
            // this check still wakes us.
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake_at = {
                let mut state = self.inner.state.lock();
                if state.closed {
                    return Err(Error::QueueClosed);
                }

                let now = Instant::now();
                state.requeue_expired(now);
                if !state.ready.is_empty() {
                    return self.deliver(&mut state, now);
                }
                if now >= deadline {
                    return Ok(Vec::new());
                }

                state
                    .next_visible_at()
                    .map_or(deadline, |visible_at| visible_at.min(deadline))
            };

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }
}

#[async_trait::async_trait]
impl MessageDeleter for MemoryQueue {
    async fn delete(&self, envelope: &Envelope) -> Result<()> {
        let token = envelope
            .ack_token()
            .ok_or_else(|| Error::MissingAckToken {
                service: envelope.service_name().clone(),
                method: envelope.method_name().clone(),
            })?;

        self.inner
            .state
            .lock()
            .in_flight
            .remove(token.as_str())
            .map(drop)
            .ok_or_else(|| Error::UnknownAckToken(token.to_string()))
    }
}

/// Builder for configuring a memory queue
#[derive(Debug, Clone)]
pub struct MemoryQueueBuilder {
    batch_size: usize,
    visibility_timeout: Duration,
    wait_time: Duration,
}

impl Default for MemoryQueueBuilder {
    fn default() -> Self {
        let config = ReceiverConfig::default();
        Self {
            batch_size: config.batch_size,
            visibility_timeout: Duration::from_secs(config.visibility_timeout_secs),
            wait_time: Duration::from_secs(config.wait_time_secs),
        }
    }
}

impl MemoryQueueBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply all settings from receiver configuration
    pub fn config(self, config: &ReceiverConfig) -> Self {
        self.batch_size(config.batch_size)
            .visibility_timeout(Duration::from_secs(config.visibility_timeout_secs))
            .wait_time(Duration::from_secs(config.wait_time_secs))
    }

    /// Set the maximum batch size (at least one)
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set how long a delivered message stays hidden
    pub fn visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Set how long an empty receive waits for messages
    pub fn wait_time(mut self, wait: Duration) -> Self {
        self.wait_time = wait;
        self
    }

    /// Build the queue
    pub fn build(self) -> MemoryQueue {
        MemoryQueue {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                batch_size: self.batch_size,
                visibility_timeout: self.visibility_timeout,
                wait_time: self.wait_time,
            }),
        }
    }
}
