use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_lock::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::client::diagnostics::Diagnostics;
use crate::client::outcome::{DeliveryOutcome, DropReason, SendOptions};
use crate::config::ObservabilityConfig;
use crate::persistence::{default_local_storage, default_session_storage, StorageHandle};
use crate::platform::runtime;
use crate::queue::{
    DrainPolicy, DrainReport, PersistentQueue, QueueItemKind, QueuedPayload, DEFAULT_DRAIN_BATCH,
};
use crate::session::SessionResolver;
use crate::transport::{Dispatcher, HttpTransport, TransportHandle};

/// Period of the durable-queue drain timer.
pub const DRAIN_INTERVAL: Duration = Duration::from_secs(10);
/// Unit of the drain backoff: `unit * retryBackoff^retry_count`.
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
struct BufferedSend {
    kind: QueueItemKind,
    payload: QueuedPayload,
    queue_on_failure: bool,
}

/// Orchestrates batching, immediate sends, and queue-backed retries against the collector.
///
/// Cloning is cheap; clones share the batch buffer, the durable queue and the timers.
#[derive(Clone)]
pub struct DeliveryClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ObservabilityConfig,
    dispatcher: Dispatcher,
    queue: PersistentQueue,
    buffer: Mutex<Vec<BufferedSend>>,
    drain_policy: DrainPolicy,
    local_storage: StorageHandle,
    session_storage: StorageHandle,
    diagnostics: Diagnostics,
    running: AtomicBool,
    generation: AtomicU64,
}

impl ClientInner {
    fn timers_current(&self, generation: u64) -> bool {
        self.running.load(Ordering::Acquire) && self.generation.load(Ordering::Acquire) == generation
    }
}

pub struct DeliveryClientBuilder {
    config: ObservabilityConfig,
    transport: Option<TransportHandle>,
    local_storage: Option<StorageHandle>,
    session_storage: Option<StorageHandle>,
    backoff_unit: Duration,
}

impl DeliveryClientBuilder {
    pub fn transport(mut self, transport: TransportHandle) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Origin-scoped storage holding the durable queue and the user id override.
    pub fn local_storage(mut self, storage: StorageHandle) -> Self {
        self.local_storage = Some(storage);
        self
    }

    /// Tab-scoped storage holding the session.
    pub fn session_storage(mut self, storage: StorageHandle) -> Self {
        self.session_storage = Some(storage);
        self
    }

    pub fn backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    pub fn build(self) -> DeliveryClient {
        let diagnostics = Diagnostics::new(self.config.dev_mode);
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HttpTransport::new()));
        let local_storage = self
            .local_storage
            .unwrap_or_else(|| default_local_storage(&self.config.storage_scope()));
        let session_storage = self.session_storage.unwrap_or_else(default_session_storage);
        let queue = PersistentQueue::load(local_storage.clone(), diagnostics.clone());

        diagnostics.debug(format!(
            "delivery client ready for {} (batch {} / {:?})",
            self.config.service_url, self.config.batch_size, self.config.batch_interval
        ));

        DeliveryClient {
            inner: Arc::new(ClientInner {
                dispatcher: Dispatcher::new(transport, &self.config),
                drain_policy: DrainPolicy::from_config(&self.config, self.backoff_unit),
                config: self.config,
                queue,
                buffer: Mutex::new(Vec::new()),
                local_storage,
                session_storage,
                diagnostics,
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
            }),
        }
    }
}

impl DeliveryClient {
    pub fn builder(config: ObservabilityConfig) -> DeliveryClientBuilder {
        DeliveryClientBuilder {
            config,
            transport: None,
            local_storage: None,
            session_storage: None,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
        }
    }

    /// Client with the platform's default transport and storage.
    pub fn new(config: ObservabilityConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &ObservabilityConfig {
        &self.inner.config
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.inner.diagnostics
    }

    pub fn queue(&self) -> &PersistentQueue {
        &self.inner.queue
    }

    /// A resolver over the same storage this client was built with.
    pub fn session_resolver(&self) -> SessionResolver {
        SessionResolver::new(
            self.inner.session_storage.clone(),
            self.inner.local_storage.clone(),
            self.inner.diagnostics.clone(),
        )
    }

    /// Sends `payload` to a collector endpoint. Never fails; the outcome says what happened.
    pub async fn send(&self, endpoint: &str, payload: Value, options: SendOptions) -> DeliveryOutcome {
        let inner = &self.inner;
        if inner.config.test_mode {
            inner
                .diagnostics
                .debug(format!("test mode: would send to {endpoint}: {payload}"));
            return DeliveryOutcome::Delivered;
        }

        let Some(kind) = QueueItemKind::from_endpoint(endpoint) else {
            inner
                .diagnostics
                .warn(format!("dropping payload for unknown endpoint {endpoint}"));
            return DeliveryOutcome::Dropped(DropReason::UnsupportedEndpoint);
        };
        let payload = QueuedPayload {
            endpoint: kind.endpoint().to_string(),
            body: payload,
        };

        if options.immediate {
            return self.deliver(kind, payload, options.queue_on_failure).await;
        }

        let full_batch = {
            let mut buffer = inner.buffer.lock().await;
            buffer.push(BufferedSend {
                kind,
                payload,
                queue_on_failure: options.queue_on_failure,
            });
            if buffer.len() >= inner.config.batch_size {
                Some(std::mem::take(&mut *buffer))
            } else {
                None
            }
        };
        if let Some(batch) = full_batch {
            // Collector I/O never runs on the caller's task.
            let client = self.clone();
            runtime::spawn_detached(async move {
                client.deliver_batch(batch).await;
            });
        }
        DeliveryOutcome::Buffered
    }

    /// Serializes `payload` first; a value that cannot be encoded is dropped, never queued.
    pub async fn send_serializable<T>(
        &self,
        endpoint: &str,
        payload: &T,
        options: SendOptions,
    ) -> DeliveryOutcome
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_value(payload) {
            Ok(value) => self.send(endpoint, value, options).await,
            Err(err) => {
                self.inner
                    .diagnostics
                    .warn(format!("dropping unserializable payload for {endpoint}: {err}"));
                DeliveryOutcome::Dropped(DropReason::Serialization)
            }
        }
    }

    /// Attempts every buffered payload in order. One failure does not stop the rest.
    pub async fn flush(&self) -> Vec<DeliveryOutcome> {
        let batch = std::mem::take(&mut *self.inner.buffer.lock().await);
        self.deliver_batch(batch).await
    }

    async fn deliver_batch(&self, batch: Vec<BufferedSend>) -> Vec<DeliveryOutcome> {
        if batch.is_empty() {
            return Vec::new();
        }
        self.inner
            .diagnostics
            .debug(format!("flushing {} buffered payloads", batch.len()));

        let mut outcomes = Vec::with_capacity(batch.len());
        for entry in batch {
            outcomes.push(
                self.deliver(entry.kind, entry.payload, entry.queue_on_failure)
                    .await,
            );
        }
        outcomes
    }

    async fn deliver(
        &self,
        kind: QueueItemKind,
        payload: QueuedPayload,
        queue_on_failure: bool,
    ) -> DeliveryOutcome {
        let inner = &self.inner;
        let failure = match inner
            .dispatcher
            .attempt(&payload.endpoint, &payload.body)
            .await
        {
            Ok(_) => return DeliveryOutcome::Delivered,
            Err(failure) => failure,
        };

        if !failure.is_retryable() {
            inner.diagnostics.warn(format!(
                "request to {} blocked, not queueing: {failure}",
                payload.endpoint
            ));
            return DeliveryOutcome::Dropped(DropReason::Blocked);
        }
        if !queue_on_failure {
            inner
                .diagnostics
                .debug(format!("send to {} failed: {failure}", payload.endpoint));
            return DeliveryOutcome::Dropped(DropReason::NotQueued);
        }

        let endpoint = payload.endpoint.clone();
        let item = inner.queue.enqueue(kind, payload).await;
        inner.diagnostics.debug(format!(
            "send to {endpoint} failed ({failure}), queued as {}",
            item.id
        ));
        DeliveryOutcome::Queued { item_id: item.id }
    }

    /// One pass over the oldest queued items. Skipped while another pass runs.
    pub async fn drain_queue(&self) -> DrainReport {
        if self.inner.config.test_mode {
            return DrainReport::default();
        }
        self.inner
            .queue
            .drain(
                &self.inner.dispatcher,
                &self.inner.drain_policy,
                DEFAULT_DRAIN_BATCH,
            )
            .await
    }

    /// `GET /health`. Always healthy in test mode.
    pub async fn check_health(&self) -> bool {
        if self.inner.config.test_mode {
            return true;
        }
        let healthy = self.inner.dispatcher.health().await;
        self.inner.diagnostics.debug(format!(
            "health check: {}",
            if healthy { "healthy" } else { "unhealthy" }
        ));
        healthy
    }

    pub async fn buffered_len(&self) -> usize {
        self.inner.buffer.lock().await.len()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Starts the batch-flush and queue-drain timers. Calling it again while running is a no-op.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        spawn_flush_timer(
            Arc::downgrade(&self.inner),
            self.inner.config.batch_interval,
            generation,
        );
        spawn_drain_timer(Arc::downgrade(&self.inner), DRAIN_INTERVAL, generation);
    }

    /// Opportunistic drain when the host regains foreground visibility.
    pub fn notify_foreground(&self) {
        let client = self.clone();
        runtime::spawn_detached(async move {
            let report = client.drain_queue().await;
            if !report.skipped && !report.visited.is_empty() {
                client
                    .inner
                    .diagnostics
                    .debug(format!("foreground drain visited {} items", report.visited.len()));
            }
        });
    }

    /// Stops the timers and flushes whatever is still buffered.
    pub async fn shutdown(&self) -> Vec<DeliveryOutcome> {
        self.inner.running.store(false, Ordering::Release);
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        self.flush().await
    }
}

impl fmt::Debug for DeliveryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryClient")
            .field("service_url", &self.inner.config.service_url)
            .field("running", &self.is_running())
            .finish()
    }
}

fn spawn_flush_timer(weak: Weak<ClientInner>, interval: Duration, generation: u64) {
    runtime::spawn_detached(async move {
        loop {
            runtime::sleep(interval).await;
            let Some(inner) = weak.upgrade() else { break };
            if !inner.timers_current(generation) {
                break;
            }
            let client = DeliveryClient { inner };
            client.flush().await;
        }
    });
}

fn spawn_drain_timer(weak: Weak<ClientInner>, interval: Duration, generation: u64) {
    runtime::spawn_detached(async move {
        loop {
            runtime::sleep(interval).await;
            let Some(inner) = weak.upgrade() else { break };
            if !inner.timers_current(generation) {
                break;
            }
            let client = DeliveryClient { inner };
            client.drain_queue().await;
        }
    });
}
