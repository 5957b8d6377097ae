use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::{ExecutionEvent, ExecutionObserver};

type ObserverList = Arc<ArcSwap<Vec<Arc<dyn ExecutionObserver>>>>;

enum Message {
    Event(ExecutionEvent),
    Flush(oneshot::Sender<()>),
}

/// Fan-out point between an engine and its observers.
///
/// `emit` only enqueues; observers are called on a dedicated dispatcher thread in emit
/// order, so a slow observer never holds up a step. The observer list is swapped
/// atomically and may change at any time; each event goes to the observers attached when
/// the dispatcher reaches it.
pub struct MonitorHub {
    observers: ObserverList,
    tx: mpsc::UnboundedSender<Message>,
}

impl Default for MonitorHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorHub {
    pub fn new() -> Self {
        let observers: ObserverList = Arc::new(ArcSwap::from_pointee(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel();

        let list = observers.clone();
        let spawned = std::thread::Builder::new()
            .name("lineflow-monitor".to_string())
            .spawn(move || dispatch_loop(rx, list));
        if let Err(e) = spawned {
            warn!(error = %e, "monitor dispatcher could not start, events will be dropped");
        }

        Self { observers, tx }
    }

    pub fn attach(&self, observer: Arc<dyn ExecutionObserver>) {
        self.observers.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(observer.clone());
            next
        });
    }

    /// Remove every observer with the given name; returns whether any was removed.
    pub fn detach(&self, name: &str) -> bool {
        let previous = self.observers.rcu(|current| {
            current
                .iter()
                .filter(|o| o.name() != name)
                .cloned()
                .collect::<Vec<_>>()
        });
        previous.iter().any(|o| o.name() == name)
    }

    /// Queue an event for delivery. Never waits on an observer.
    pub fn emit(&self, event: &ExecutionEvent) {
        if self.observers.load().is_empty() {
            return;
        }
        let _ = self.tx.send(Message::Event(event.clone()));
    }

    /// Resolves once every event emitted before the call has been delivered.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(Message::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// [`flush`](Self::flush) for callers outside an async runtime.
    pub fn flush_blocking(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(Message::Flush(done)).is_ok() {
            let _ = wait.blocking_recv();
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.observers
            .load()
            .iter()
            .map(|o| o.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.observers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.load().is_empty()
    }
}

fn dispatch_loop(mut rx: mpsc::UnboundedReceiver<Message>, observers: ObserverList) {
    while let Some(message) = rx.blocking_recv() {
        match message {
            Message::Event(event) => {
                for observer in observers.load().iter() {
                    let delivered = catch_unwind(AssertUnwindSafe(|| observer.on_event(&event)));
                    if delivered.is_err() {
                        warn!(observer = observer.name(), "observer panicked while handling event");
                    }
                }
            }
            Message::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("monitor dispatcher stopped");
}

impl fmt::Debug for MonitorHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorHub")
            .field("observers", &self.names())
            .finish()
    }
}
