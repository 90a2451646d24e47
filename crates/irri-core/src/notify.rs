//! ---
//! irri_section: "06-coordination-engine"
//! irri_subsection: "module"
//! irri_type: "source"
//! irri_scope: "code"
//! irri_description: "Primary coordination engine and lifecycle management."
//! irri_version: "v0.1.0-alpha"
//! irri_owner: "tbd"
//! ---
use irri_msg::LiveUpdate;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Clone)]
struct Observer {
    id: Uuid,
    tx: mpsc::Sender<LiveUpdate>,
}

/// Fan-out of live updates to the currently connected observers.
///
/// Membership is self-healing: an observer whose channel has closed is
/// removed during the broadcast that discovers it, without aborting delivery
/// to the rest. Broadcast iterates over a snapshot of the membership, so
/// register/unregister during a broadcast is safe. Delivery per observer is
/// a bounded FIFO; a full queue drops the frame for that observer only and
/// never stalls the caller.
pub struct LiveNotifier {
    observers: Mutex<Vec<Observer>>,
    queue_depth: usize,
}

/// Receiving end handed to one connected observer.
pub struct ObserverHandle {
    id: Uuid,
    rx: mpsc::Receiver<LiveUpdate>,
}

impl ObserverHandle {
    /// Stable identifier for [`LiveNotifier::unregister`].
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Await the next frame; `None` once the notifier dropped this observer.
    pub async fn recv(&mut self) -> Option<LiveUpdate> {
        self.rx.recv().await
    }
}

impl LiveNotifier {
    /// Create a notifier whose observers each buffer `queue_depth` frames.
    pub fn new(queue_depth: usize) -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
            queue_depth: queue_depth.max(1),
        }
    }

    /// Attach a new observer and return its receiving handle.
    pub fn register(&self) -> ObserverHandle {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let id = Uuid::new_v4();
        self.observers.lock().push(Observer { id, tx });
        debug!(observer = %id, "observer registered");
        ObserverHandle { id, rx }
    }

    /// Detach an observer; returns whether it was present.
    pub fn unregister(&self, id: Uuid) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|observer| observer.id != id);
        let removed = observers.len() < before;
        if removed {
            debug!(observer = %id, "observer unregistered");
        }
        removed
    }

    /// Number of currently attached observers.
    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    /// Deliver a frame to every observer, best-effort.
    ///
    /// Returns the number of observers the frame was queued for.
    pub fn broadcast(&self, frame: LiveUpdate) -> usize {
        let snapshot: Vec<Observer> = self.observers.lock().clone();
        if snapshot.is_empty() {
            return 0;
        }

        let mut delivered = 0usize;
        let mut dead: Vec<Uuid> = Vec::new();
        for observer in &snapshot {
            match observer.tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(observer = %observer.id, "observer queue full; dropping frame");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.push(observer.id);
                }
            }
        }

        if !dead.is_empty() {
            let mut observers = self.observers.lock();
            observers.retain(|observer| !dead.contains(&observer.id));
            for id in &dead {
                debug!(observer = %id, "observer gone; removed from broadcast set");
            }
        }
        delivered
    }
}
