//! Rate-bounded delivery of backend push events.
//!
//! Backend workers can emit bursts of notifications far faster than the UI
//! should re-render. A [`Subscription`] listens on one named channel of the
//! [`EventBus`] and applies a coalescing [`Strategy`] before invoking the
//! consumer's sink:
//!
//! - **Debounce**: deliver only the latest event once the channel goes
//!   quiet for a full window. For status updates where only the final
//!   value matters.
//! - **Batch**: deliver everything received during a window as one ordered
//!   list. For log lines, where no event may be dropped.
//! - **Throttle**: deliver the first event immediately, suppress the rest
//!   of the window, and deliver the most recent suppressed event when the
//!   window closes.
//!
//! Each subscription owns its timer privately; teardown (explicit
//! [`Subscription::unsubscribe`] or drop) cancels any pending delivery and
//! releases the channel listener.

use backend_gateway::{EventBus, PushEvent};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Window used to coalesce status-change events before UI updates.
pub const STATUS_WINDOW: Duration = Duration::from_millis(150);

/// Window used before triggering a downstream full-list refresh.
pub const REFRESH_WINDOW: Duration = Duration::from_millis(750);

/// How a subscription folds a burst of events into deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Debounce,
    Batch,
    Throttle,
}

/// Per-subscription coalescing configuration.
#[derive(Debug, Clone, Copy)]
pub struct CoalesceConfig {
    pub strategy: Strategy,
    pub window: Duration,
}

impl CoalesceConfig {
    pub fn debounce(window: Duration) -> Self {
        Self {
            strategy: Strategy::Debounce,
            window,
        }
    }

    pub fn batch(window: Duration) -> Self {
        Self {
            strategy: Strategy::Batch,
            window,
        }
    }

    pub fn throttle(window: Duration) -> Self {
        Self {
            strategy: Strategy::Throttle,
            window,
        }
    }
}

/// Consumer callback. Debounce and throttle deliver a single-element list;
/// batch delivers the whole window's events in arrival order.
pub type EventSink = Arc<dyn Fn(Vec<PushEvent>) + Send + Sync>;

/// A live coalesced subscription to one event channel.
///
/// Dropping the handle aborts the worker task, which cancels any pending
/// timer and unregisters the channel listener.
pub struct Subscription {
    channel: String,
    sink: Arc<RwLock<EventSink>>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Register on `channel` and start the coalescing task.
    ///
    /// The bus listener is registered before this returns, so every event
    /// published afterwards is observed.
    pub fn spawn(
        bus: &EventBus,
        channel: impl Into<String>,
        config: CoalesceConfig,
        sink: EventSink,
    ) -> Self {
        let channel = channel.into();
        let rx = bus.listen();
        let sink = Arc::new(RwLock::new(sink));

        let task = tokio::spawn(run(rx, channel.clone(), config, sink.clone()));

        Self {
            channel,
            sink,
            task,
        }
    }

    /// The channel this subscription listens on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Swap the consumer callback in place.
    ///
    /// The channel listener is untouched, so no events are missed and no
    /// duplicate registration occurs.
    pub fn set_sink(&self, sink: EventSink) {
        *self.sink.write().expect("sink lock poisoned") = sink;
    }

    /// Tear down the subscription, cancelling any pending delivery.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn deliver(sink: &Arc<RwLock<EventSink>>, events: Vec<PushEvent>) {
    let sink = sink.read().expect("sink lock poisoned").clone();
    sink(events);
}

async fn run(
    mut rx: tokio::sync::broadcast::Receiver<PushEvent>,
    channel: String,
    config: CoalesceConfig,
    sink: Arc<RwLock<EventSink>>,
) {
    // Timer state owned by this task alone. `deadline` is Some while a
    // window is open; `latest` holds the debounce/throttle candidate and
    // `buffer` the batch accumulator.
    let mut deadline: Option<Instant> = None;
    let mut latest: Option<PushEvent> = None;
    let mut buffer: Vec<PushEvent> = Vec::new();

    loop {
        let timer = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            () = timer => {
                let delivery = match config.strategy {
                    Strategy::Debounce | Strategy::Throttle => latest.take().map(|ev| vec![ev]),
                    Strategy::Batch => {
                        if buffer.is_empty() {
                            None
                        } else {
                            Some(std::mem::take(&mut buffer))
                        }
                    }
                };
                // A trailing throttle delivery opens a fresh suppression
                // window; everything else just closes the window.
                deadline = match (config.strategy, &delivery) {
                    (Strategy::Throttle, Some(_)) => Some(Instant::now() + config.window),
                    _ => None,
                };
                if let Some(events) = delivery {
                    deliver(&sink, events);
                }
            }
            recv = rx.recv() => match recv {
                Ok(event) => {
                    if event.channel != channel {
                        continue;
                    }
                    match config.strategy {
                        Strategy::Debounce => {
                            latest = Some(event);
                            deadline = Some(Instant::now() + config.window);
                        }
                        Strategy::Batch => {
                            if buffer.is_empty() {
                                deadline = Some(Instant::now() + config.window);
                            }
                            buffer.push(event);
                        }
                        Strategy::Throttle => {
                            if deadline.is_none() {
                                deliver(&sink, vec![event]);
                                deadline = Some(Instant::now() + config.window);
                            } else {
                                latest = Some(event);
                            }
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(channel = %channel, skipped, "subscriber lagged; oldest events dropped");
                }
                Err(RecvError::Closed) => {
                    debug!(channel = %channel, "event bus closed, flushing subscription");
                    let remaining = match config.strategy {
                        Strategy::Debounce | Strategy::Throttle => {
                            latest.take().map(|ev| vec![ev])
                        }
                        Strategy::Batch => {
                            if buffer.is_empty() {
                                None
                            } else {
                                Some(std::mem::take(&mut buffer))
                            }
                        }
                    };
                    if let Some(events) = remaining {
                        deliver(&sink, events);
                    }
                    break;
                }
            }
        }
    }
}
