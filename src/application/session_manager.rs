// Stream session manager - per-connection live metric emission
//
// Every (session, binding) pair runs as its own task ("lane"). A lane ticks
// at its binding's interval, asks its provider for a value and publishes it
// into a single-slot watch channel, so a slow consumer only ever has the
// latest value waiting per binding. Control frames (subscribed, unknown
// bindings) travel on a separate bounded queue; a lane's terminal error goes
// through its own slot.
use crate::application::provider_registry::{MetricProvider, ProviderError, ProviderRegistry};
use crate::domain::dashboard::DataBinding;
use crate::domain::metric::{FrameErrorCode, StreamFrame};
use crate::infrastructure::config::StreamingConfig;
use futures::stream::{Stream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamMap;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

const CONTROL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Opening,
    Active,
    Closing,
    Closed,
}

type Slot = watch::Receiver<Option<StreamFrame>>;

#[derive(Clone)]
pub struct SessionManager {
    registry: Arc<ProviderRegistry>,
    config: StreamingConfig,
    shutdown: CancellationToken,
    next_id: Arc<AtomicU64>,
    open: Arc<AtomicUsize>,
}

impl SessionManager {
    pub fn new(registry: Arc<ProviderRegistry>, config: StreamingConfig) -> Self {
        Self {
            registry,
            config,
            shutdown: CancellationToken::new(),
            next_id: Arc::new(AtomicU64::new(1)),
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Accept a new connection. The returned output must be drained by the
    /// transport; the session handle drives subscriptions and teardown.
    pub fn open(&self) -> (Session, SessionOutput) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let (lanes_tx, lanes_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SessionState::Opening);
        let open = self.open.fetch_add(1, Ordering::Relaxed) + 1;

        tracing::info!(session = id, open_sessions = open, "live session opened");

        let session = Session {
            id,
            state,
            cancel: self.shutdown.child_token(),
            registry: self.registry.clone(),
            config: self.config.clone(),
            lanes: HashMap::new(),
            tasks: JoinSet::new(),
            control_tx,
            lanes_tx,
            open: self.open.clone(),
        };
        let output = SessionOutput {
            control_rx,
            lanes_rx,
        };

        (session, output)
    }

    /// Cancel every session; transports observe this through
    /// `Session::cancel_token` and close.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn open_sessions(&self) -> usize {
        self.open.load(Ordering::Relaxed)
    }
}

/// One attached binding of a session.
struct Attached {
    topic: String,
    /// Cancelled on unsubscribe, on session close, or by the lane itself
    /// once its provider is exhausted.
    cancel: CancellationToken,
}

impl Attached {
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

pub struct Session {
    id: u64,
    state: watch::Sender<SessionState>,
    cancel: CancellationToken,
    registry: Arc<ProviderRegistry>,
    config: StreamingConfig,
    /// binding id -> lane
    lanes: HashMap<String, Attached>,
    tasks: JoinSet<()>,
    control_tx: mpsc::Sender<StreamFrame>,
    lanes_tx: mpsc::UnboundedSender<(String, Slot)>,
    open: Arc<AtomicUsize>,
}

impl Session {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Cancelled on server shutdown or once the session starts closing.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Ids of the bindings that are still emitting.
    pub fn bindings(&self) -> impl Iterator<Item = &str> {
        self.lanes
            .iter()
            .filter(|(_, lane)| lane.is_live())
            .map(|(id, _)| id.as_str())
    }

    /// Attach a binding under its own source key.
    pub fn subscribe(&mut self, binding: &DataBinding) -> Result<String, ProviderError> {
        let id = binding.source().unwrap_or_default().to_string();
        self.subscribe_as(id, binding)
    }

    /// Attach a binding under `id` and start its emission lane. Frames of
    /// the lane are tagged with `id`, so several bindings on one source each
    /// keep their own interval. Reusing an attached id restarts that lane.
    ///
    /// An unresolvable binding is reported to the client and returned as an
    /// error; the session and its other lanes are unaffected.
    pub fn subscribe_as(
        &mut self,
        id: impl Into<String>,
        binding: &DataBinding,
    ) -> Result<String, ProviderError> {
        let id = id.into();
        if self.cancel.is_cancelled() {
            return Err(ProviderError::Failed("session is closing".into()));
        }

        let provider = match self.registry.resolve(binding) {
            Ok(provider) => provider,
            Err(e) => {
                let topic = binding.source();
                tracing::warn!(session = self.id, binding = %id, topic = ?topic, "unknown binding: {}", e);
                self.notify(StreamFrame::error(
                    Some(&id),
                    topic,
                    FrameErrorCode::UnknownBinding,
                    e.to_string(),
                ));
                return Err(e);
            }
        };

        // resolve() succeeded, so the binding has a source
        let topic = binding.source().unwrap_or_default().to_string();
        let period = self.config.period(binding.interval);

        if let Some(previous) = self.lanes.remove(&id) {
            previous.cancel.cancel();
        }
        self.lanes.retain(|_, lane| lane.is_live());
        while self.tasks.try_join_next().is_some() {}

        let lane_cancel = self.cancel.child_token();
        let (slot_tx, slot_rx) = watch::channel(None);

        self.notify(StreamFrame::Subscribed {
            binding: id.clone(),
            topic: topic.clone(),
            interval: period.as_millis() as u64,
        });
        if self.lanes_tx.send((id.clone(), slot_rx)).is_err() {
            tracing::debug!(session = self.id, binding = %id, "session output already dropped");
        }

        let lane = Lane {
            session: self.id,
            binding: id.clone(),
            topic: topic.clone(),
            provider,
            period,
            timeout: self.config.provider_timeout(),
            threshold: self.config.failure_threshold.max(1),
            slot: slot_tx,
            cancel: lane_cancel.clone(),
        };
        self.tasks.spawn(lane.run());
        self.lanes.insert(
            id.clone(),
            Attached {
                topic: topic.clone(),
                cancel: lane_cancel,
            },
        );

        self.state.send_if_modified(|s| {
            let opening = *s == SessionState::Opening;
            if opening {
                *s = SessionState::Active;
            }
            opening
        });

        tracing::debug!(session = self.id, binding = %id, topic = %topic, period_ms = period.as_millis() as u64, "subscribed");
        Ok(id)
    }

    /// Stop one lane. Returns false if the binding was not attached or its
    /// lane already ended.
    pub fn unsubscribe(&mut self, id: &str) -> bool {
        match self.lanes.remove(id) {
            Some(lane) if lane.is_live() => {
                lane.cancel.cancel();
                self.notify(StreamFrame::Unsubscribed {
                    binding: id.to_string(),
                    topic: lane.topic,
                });
                tracing::debug!(session = self.id, binding = %id, "unsubscribed");
                true
            }
            _ => false,
        }
    }

    /// Queue a control frame for the client (dropped if the client is
    /// too far behind to take it).
    pub fn notify(&self, frame: StreamFrame) {
        if let Err(mpsc::error::TrySendError::Full(frame)) = self.control_tx.try_send(frame) {
            tracing::warn!(session = self.id, binding = ?frame.binding(), "control queue full, dropping frame");
        }
    }

    /// Cancel every lane, wait up to the grace period for in-flight
    /// provider calls, then abort whatever is left.
    pub async fn close(mut self) {
        self.state.send_replace(SessionState::Closing);
        self.cancel.cancel();

        let grace = self.config.grace_period();
        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(grace, async move {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                session = self.id,
                pending = self.tasks.len(),
                "lanes still busy after {:?}, aborting",
                grace
            );
            self.tasks.abort_all();
        }

        self.lanes.clear();
        self.state.send_replace(SessionState::Closed);
        tracing::info!(session = self.id, "live session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Lanes notice the cancellation at their next suspension point.
        self.cancel.cancel();
        self.tasks.detach_all();
        if *self.state.borrow() != SessionState::Closed {
            self.state.send_replace(SessionState::Closed);
            tracing::debug!(session = self.id, "live session dropped without close");
        }
        self.open.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Receiving half of a session, merged into one frame stream.
pub struct SessionOutput {
    control_rx: mpsc::Receiver<StreamFrame>,
    lanes_rx: mpsc::UnboundedReceiver<(String, Slot)>,
}

impl SessionOutput {
    /// Frames in arrival order per binding; no ordering across bindings.
    /// Ends once the session is gone and every lane has finished.
    pub fn into_stream(self) -> impl Stream<Item = StreamFrame> + Send + 'static {
        let SessionOutput {
            mut control_rx,
            mut lanes_rx,
        } = self;

        async_stream::stream! {
            let mut lanes: StreamMap<String, WatchStream<Option<StreamFrame>>> = StreamMap::new();
            loop {
                let frame = tokio::select! {
                    biased;
                    Some(frame) = control_rx.recv() => frame,
                    Some((binding, slot)) = lanes_rx.recv() => {
                        lanes.insert(binding, WatchStream::from_changes(slot));
                        continue;
                    }
                    Some((_, latest)) = lanes.next(), if !lanes.is_empty() => match latest {
                        Some(frame) => frame,
                        None => continue,
                    },
                    else => break,
                };
                yield frame;
            }
        }
    }
}

struct Lane {
    session: u64,
    binding: String,
    topic: String,
    provider: Arc<dyn MetricProvider>,
    period: Duration,
    timeout: Duration,
    threshold: u32,
    slot: watch::Sender<Option<StreamFrame>>,
    cancel: CancellationToken,
}

impl Lane {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tick: u64 = 0;
        let mut failures: u32 = 0;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tick += 1;

            // In-flight calls are allowed to settle; close() bounds the wait.
            let produced = match tokio::time::timeout(self.timeout, self.provider.produce()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(self.timeout)),
            };

            if self.cancel.is_cancelled() {
                break;
            }

            match produced {
                Ok(metric) => {
                    failures = 0;
                    self.slot.send_replace(Some(StreamFrame::Value {
                        binding: self.binding.clone(),
                        topic: self.topic.clone(),
                        seq: tick,
                        metric,
                    }));
                    if self.slot.receiver_count() == 0 {
                        // replaced by a newer subscription or the client went away
                        break;
                    }
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        session = self.session,
                        binding = %self.binding,
                        topic = %self.topic,
                        failures,
                        "skipping tick: {}",
                        e
                    );
                    if failures >= self.threshold {
                        tracing::warn!(session = self.session, binding = %self.binding, "provider exhausted, closing subscription");
                        // Detach before the client can see the error.
                        self.cancel.cancel();
                        // Terminal frame goes through the slot, never the control queue.
                        self.slot.send_replace(Some(StreamFrame::error(
                            Some(&self.binding),
                            Some(&self.topic),
                            FrameErrorCode::ProviderExhausted,
                            format!("{} consecutive failures, last: {}", failures, e),
                        )));
                        break;
                    }
                }
            }
        }
    }
}
