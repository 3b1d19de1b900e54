//! Job event dispatcher.
//!
//! [`JobEventDispatcher`] subscribes to the status and validation topics
//! of one job, decodes every inbound message, and turns it into at most
//! one [`JobEvent`]. Events go to the listeners registered for their
//! [`JobEventKind`] and to a [`tokio::sync::broadcast`] channel.
//!
//! Messages are handled strictly one at a time on a single task: every
//! listener for message n returns before message n+1 is decoded.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broker::{BrokerConnection, BrokerConnector, BrokerError, ConnectionOptions, InboundMessage, QoS};
use crate::event::{resolve_event, DispatcherId, JobEvent, JobEventKind};
use crate::manage::ManageCommand;
use crate::message::decode;
use crate::topic::{manage_topic, status_filter, validate_filter};

/// Broadcast channel capacity for job events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

type Listener = Arc<dyn Fn(&JobEvent) + Send + Sync>;
type ListenerMap = Arc<RwLock<HashMap<JobEventKind, Vec<Listener>>>>;

/// Receives lifecycle events for one job.
pub struct JobEventDispatcher {
    id: DispatcherId,
    options: ConnectionOptions,
    connector: Arc<dyn BrokerConnector>,
    listeners: ListenerMap,
    event_tx: broadcast::Sender<JobEvent>,
    running: Mutex<Option<Running>>,
}

/// Bookkeeping for a started dispatcher.
struct Running {
    cancel: CancellationToken,
    task_handle: JoinHandle<Result<(), BrokerError>>,
}

impl JobEventDispatcher {
    pub fn new(
        connector: Arc<dyn BrokerConnector>,
        options: ConnectionOptions,
        job_id: impl Into<String>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            id: DispatcherId {
                client_id: options.client_id.clone(),
                job_id: job_id.into(),
            },
            options,
            connector,
            listeners: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            running: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &DispatcherId {
        &self.id
    }

    pub fn job_id(&self) -> &str {
        &self.id.job_id
    }

    /// Register `listener` for events of `kind`.
    ///
    /// Listeners run on the dispatch task and should return quickly;
    /// message handling waits for them. A panicking listener is logged
    /// and skipped.
    pub fn on<F>(&self, kind: JobEventKind, listener: F)
    where
        F: Fn(&JobEvent) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(Arc::new(listener));
    }

    /// Subscribe to every event this dispatcher emits.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    /// Whether the dispatch task is running.
    pub async fn is_started(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.task_handle.is_finished())
    }

    /// Connect and subscribe to the job's status and validation topics.
    ///
    /// Does nothing when already started. If the previous connection was
    /// lost, a new one is opened.
    pub async fn start(&self) -> Result<(), BrokerError> {
        let mut running = self.running.lock().await;
        if running
            .as_ref()
            .is_some_and(|r| !r.task_handle.is_finished())
        {
            tracing::debug!(job_id = %self.id.job_id, "Dispatcher already started");
            return Ok(());
        }

        let mut conn = self.connector.connect(&self.options).await?;
        let filters = [
            status_filter(&self.options.base_topic, &self.id.job_id),
            validate_filter(&self.options.base_topic, &self.id.job_id),
        ];
        for filter in &filters {
            if let Err(e) = conn.subscribe(filter, QoS::ExactlyOnce).await {
                tracing::error!(filter = %filter, error = %e, "Subscription failed");
                if let Err(e) = conn.disconnect().await {
                    tracing::warn!(error = %e, "Disconnect after failed subscription failed");
                }
                return Err(e);
            }
        }

        tracing::info!(
            job_id = %self.id.job_id,
            client_id = %self.id.client_id,
            host = %self.options.host,
            port = self.options.port,
            "Job event dispatcher started",
        );

        let cancel = CancellationToken::new();
        let task_handle = tokio::spawn(run_dispatch_loop(
            conn,
            self.id.clone(),
            Arc::clone(&self.listeners),
            self.event_tx.clone(),
            cancel.clone(),
        ));

        *running = Some(Running {
            cancel,
            task_handle,
        });
        Ok(())
    }

    /// Stop dispatching and disconnect. Safe to call repeatedly.
    ///
    /// Returns the error from disconnecting the broker connection, if any.
    /// Later calls return `Ok(())`.
    pub async fn dispose(&self) -> Result<(), BrokerError> {
        let Some(running) = self.running.lock().await.take() else {
            return Ok(());
        };

        running.cancel.cancel();
        let result = match running.task_handle.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(job_id = %self.id.job_id, error = %e, "Dispatch task ended abnormally");
                Ok(())
            }
        };
        tracing::info!(job_id = %self.id.job_id, "Job event dispatcher disposed");
        result
    }

    /// Ask the job manager to run this job again.
    ///
    /// Uses its own short-lived connection, independent of [`start`](Self::start).
    pub async fn publish_rerun(&self) -> Result<(), BrokerError> {
        let topic = manage_topic(&self.options.base_topic, &self.options.client_id);
        let body = ManageCommand::rerun(self.id.job_id.clone()).to_json()?;

        let mut conn = self.connector.connect(&self.options).await?;
        let published = conn.publish(&topic, &body, QoS::ExactlyOnce).await;
        if let Err(e) = conn.disconnect().await {
            tracing::warn!(error = %e, "Disconnect after rerun publish failed");
        }
        published?;

        tracing::info!(job_id = %self.id.job_id, topic = %topic, "Requested job rerun");
        Ok(())
    }
}

/// Read, decode and dispatch messages until cancelled or the connection ends.
///
/// Resolves to the result of disconnecting.
async fn run_dispatch_loop(
    mut conn: Box<dyn BrokerConnection>,
    id: DispatcherId,
    listeners: ListenerMap,
    event_tx: broadcast::Sender<JobEvent>,
    cancel: CancellationToken,
) -> Result<(), BrokerError> {
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = conn.recv() => received,
        };

        match received {
            Ok(Some(inbound)) => dispatch_one(&inbound, &id, &listeners, &event_tx),
            Ok(None) => {
                tracing::info!(job_id = %id.job_id, "Broker connection closed");
                break;
            }
            Err(e) => {
                tracing::error!(job_id = %id.job_id, error = %e, "Broker receive error");
                break;
            }
        }
    }

    let disconnected = conn.disconnect().await;
    if let Err(e) = &disconnected {
        tracing::warn!(job_id = %id.job_id, error = %e, "Broker disconnect failed");
    }
    disconnected
}

fn dispatch_one(
    inbound: &InboundMessage,
    id: &DispatcherId,
    listeners: &ListenerMap,
    event_tx: &broadcast::Sender<JobEvent>,
) {
    let message = decode(&inbound.topic, &inbound.payload);
    if message.is_unknown() {
        tracing::warn!(topic = %inbound.topic, "Dropping undecodable broker message");
        return;
    }

    let Some(event) = resolve_event(&message, id) else {
        tracing::trace!(topic = %inbound.topic, "Message produced no event");
        return;
    };

    let kind = event.kind();
    tracing::debug!(job_id = %id.job_id, ?kind, "Dispatching job event");

    // Listeners are cloned out so one may register another without deadlocking.
    let targets: Vec<Listener> = listeners
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&kind)
        .cloned()
        .unwrap_or_default();
    for listener in targets {
        if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
            tracing::error!(job_id = %id.job_id, ?kind, "Job event listener panicked");
        }
    }

    // No receivers is fine.
    let _ = event_tx.send(event);
}
