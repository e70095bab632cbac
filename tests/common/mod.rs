use std::{
    collections::{HashMap, VecDeque},
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use notification_service::{
    clients::{
        broadcaster::ChannelBroadcaster,
        store::{MemoryStore, NotificationStore},
    },
    consumer::QueueConsumer,
    error::{QueueError, StoreError},
    models::{message::FailedMessage, notification::NewNotification},
    pipeline::NotificationPipeline,
    queue::{ChannelConnector, Delivery, DeliveryChannel},
};
use tracing::subscriber::DefaultGuard;
use uuid::Uuid;

/// In-memory stand-in for the broker. Unacknowledged deliveries go back to
/// the head of the queue when their session closes, like RabbitMQ does.
#[derive(Clone, Default)]
pub struct FakeBroker {
    state: Arc<Mutex<BrokerState>>,
}

#[derive(Default)]
struct BrokerState {
    queue: VecDeque<Delivery>,
    next_tag: u64,
    in_flight: HashMap<u64, Delivery>,
    acked: Vec<Vec<u8>>,
    requeued: u32,
    discarded: Vec<Vec<u8>>,
    failed: Vec<FailedMessage>,
    fail_next_ack: bool,
    fail_next_recv: bool,
    fail_next_publish: bool,
    sessions: u32,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, payload: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.next_tag += 1;
        let tag = state.next_tag;
        state.queue.push_back(Delivery {
            tag,
            data: payload.to_vec(),
            redelivered: false,
        });
    }

    pub fn channel(&self) -> FakeChannel {
        self.state.lock().unwrap().sessions += 1;
        FakeChannel {
            state: self.state.clone(),
            wait_when_idle: false,
        }
    }

    /// Returns unsettled deliveries to the queue, marked as redelivered.
    pub fn close_session(&self) {
        let mut state = self.state.lock().unwrap();
        let mut pending: Vec<Delivery> = state.in_flight.drain().map(|(_, d)| d).collect();
        pending.sort_by_key(|d| d.tag);
        for mut delivery in pending.into_iter().rev() {
            delivery.redelivered = true;
            state.queue.push_front(delivery);
        }
    }

    pub fn fail_next_ack(&self) {
        self.state.lock().unwrap().fail_next_ack = true;
    }

    pub fn fail_next_recv(&self) {
        self.state.lock().unwrap().fail_next_recv = true;
    }

    pub fn fail_next_publish(&self) {
        self.state.lock().unwrap().fail_next_publish = true;
    }

    pub fn acked(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().acked.clone()
    }

    pub fn requeued(&self) -> u32 {
        self.state.lock().unwrap().requeued
    }

    pub fn discarded(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().discarded.clone()
    }

    pub fn failed(&self) -> Vec<FailedMessage> {
        self.state.lock().unwrap().failed.clone()
    }

    pub fn queued(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().unwrap().in_flight.len()
    }

    pub fn sessions(&self) -> u32 {
        self.state.lock().unwrap().sessions
    }
}

pub struct FakeChannel {
    state: Arc<Mutex<BrokerState>>,
    wait_when_idle: bool,
}

impl FakeChannel {
    /// Keeps the session open while the queue is empty instead of ending it.
    pub fn waiting(mut self) -> Self {
        self.wait_when_idle = true;
        self
    }

    fn take_next(&self) -> Option<Result<Delivery, QueueError>> {
        let mut state = self.state.lock().unwrap();

        if state.fail_next_recv {
            state.fail_next_recv = false;
            return Some(Err(QueueError::Stream("connection reset".to_string())));
        }

        let delivery = state.queue.pop_front()?;
        state.in_flight.insert(delivery.tag, delivery.clone());
        Some(Ok(delivery))
    }
}

#[async_trait]
impl DeliveryChannel for FakeChannel {
    async fn recv(&mut self) -> Option<Result<Delivery, QueueError>> {
        loop {
            match self.take_next() {
                Some(next) => return Some(next),
                None if self.wait_when_idle => tokio::time::sleep(Duration::from_millis(5)).await,
                None => return None,
            }
        }
    }

    async fn acknowledge(&self, tag: u64) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();

        if state.fail_next_ack {
            state.fail_next_ack = false;
            return Err(QueueError::Ack {
                tag,
                reason: "channel closed".to_string(),
            });
        }

        let delivery = state.in_flight.remove(&tag).ok_or_else(|| QueueError::Ack {
            tag,
            reason: "unknown delivery tag".to_string(),
        })?;
        state.acked.push(delivery.data);
        Ok(())
    }

    async fn reject(&self, tag: u64, requeue: bool) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();

        let mut delivery = state.in_flight.remove(&tag).ok_or_else(|| QueueError::Reject {
            tag,
            reason: "unknown delivery tag".to_string(),
        })?;

        if requeue {
            delivery.redelivered = true;
            state.requeued += 1;
            state.queue.push_back(delivery);
        } else {
            state.discarded.push(delivery.data);
        }
        Ok(())
    }

    async fn publish_failed(&self, message: &FailedMessage) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();

        if state.fail_next_publish {
            state.fail_next_publish = false;
            return Err(QueueError::Publish {
                queue: "notification_queue.failed".to_string(),
                reason: "channel closed".to_string(),
            });
        }

        state.failed.push(message.clone());
        Ok(())
    }
}

pub struct FakeConnector {
    broker: FakeBroker,
    failures_remaining: AtomicU32,
}

impl FakeConnector {
    pub fn new(broker: FakeBroker, failures: u32) -> Self {
        Self {
            broker,
            failures_remaining: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl ChannelConnector for FakeConnector {
    type Channel = FakeChannel;

    async fn connect(&self) -> Result<FakeChannel, QueueError> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(QueueError::Connection("connection refused".to_string()));
        }

        Ok(self.broker.channel().waiting())
    }
}

/// Fails the first `failures` saves, then behaves like [`MemoryStore`].
pub struct FlakyStore {
    failures_remaining: AtomicU32,
    attempts: AtomicU32,
    inner: MemoryStore,
}

impl FlakyStore {
    pub fn new(failures: u32) -> Self {
        Self {
            failures_remaining: AtomicU32::new(failures),
            attempts: AtomicU32::new(0),
            inner: MemoryStore::new(),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn records(&self) -> Vec<notification_service::models::notification::NotificationRecord> {
        self.inner.records()
    }
}

#[async_trait]
impl NotificationStore for FlakyStore {
    async fn save(&self, notification: &NewNotification) -> Result<Uuid, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }

        self.inner.save(notification).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Never completes a save.
pub struct HangingStore;

#[async_trait]
impl NotificationStore for HangingStore {
    async fn save(&self, _: &NewNotification) -> Result<Uuid, StoreError> {
        std::future::pending().await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

pub struct PanickingStore;

#[async_trait]
impl NotificationStore for PanickingStore {
    async fn save(&self, _: &NewNotification) -> Result<Uuid, StoreError> {
        panic!("driver bug")
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Collects formatted log output for the current thread.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    pub fn install(&self) -> DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();

        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines_containing(&self, needle: &str) -> Vec<String> {
        let buffer = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buffer)
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn pipeline(
    store: Arc<dyn NotificationStore>,
    broadcaster: Arc<ChannelBroadcaster>,
) -> Arc<NotificationPipeline> {
    Arc::new(NotificationPipeline::new(
        store,
        broadcaster,
        Duration::from_secs(1),
    ))
}

pub fn consumer(pipeline: Arc<NotificationPipeline>) -> QueueConsumer {
    QueueConsumer::new(pipeline, Duration::from_secs(1), Duration::ZERO)
}
