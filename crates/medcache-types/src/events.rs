//! Cache and session notifications.
//!
//! Caches publish [`CacheEvent`]s and the session store publishes
//! [`SessionEvent`]s to any registered [`Observer`]. Delivery is
//! synchronous and best-effort: an observer that returns an error is
//! logged and skipped, and the operation that raised the event proceeds.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::warn;

/// Object or ad-hoc cache notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// A key was stored that was not present before.
    Added { key: String },
    /// A key was stored over an existing entry.
    Updated { key: String },
    /// A key was removed, explicitly or by invalidation.
    Removed { key: String },
}

impl CacheEvent {
    /// Key the event refers to.
    pub fn key(&self) -> &str {
        match self {
            CacheEvent::Added { key } | CacheEvent::Updated { key } | CacheEvent::Removed { key } => {
                key
            }
        }
    }
}

/// Session lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// An establish attempt finished. Raised for failures too.
    Established {
        principal: String,
        session_id: Option<String>,
        success: bool,
    },
    /// A session was renewed from its refresh token.
    Extended {
        principal: String,
        previous_session_id: String,
        session_id: String,
    },
    /// A session was explicitly ended.
    Abandoned {
        principal: String,
        session_id: String,
    },
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Established { success, .. } => {
                write!(f, "Established(success={success})")
            }
            SessionEvent::Extended { .. } => write!(f, "Extended"),
            SessionEvent::Abandoned { .. } => write!(f, "Abandoned"),
        }
    }
}

/// Error returned by an observer. Never propagated to the caller of the
/// operation that raised the event.
#[derive(Debug, thiserror::Error)]
#[error("Observer failed: {0}")]
pub struct ObserverError(pub String);

/// Subscriber for events of type `E`.
pub trait Observer<E>: Send + Sync {
    /// Handle an event.
    fn on_event(&self, event: &E) -> Result<(), ObserverError>;
}

/// Set of observers for one event type.
pub struct ObserverRegistry<E> {
    observers: RwLock<Vec<Arc<dyn Observer<E>>>>,
}

impl<E: fmt::Debug> ObserverRegistry<E> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Register an observer.
    pub fn subscribe(&self, observer: Arc<dyn Observer<E>>) {
        self.observers.write().push(observer);
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Whether no observers are registered.
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Deliver `event` to every observer.
    pub fn notify(&self, event: &E) {
        // Snapshot so observers may subscribe from inside a callback.
        let observers = self.observers.read().clone();
        for observer in observers {
            if let Err(e) = observer.on_event(event) {
                warn!(error = %e, event = ?event, "Observer failed, continuing");
            }
        }
    }
}

impl<E: fmt::Debug> Default for ObserverRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for ObserverRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.observers.read().len())
            .finish()
    }
}

/// Observer that keeps every event it receives, in order.
///
/// Useful as an audit tap and in tests.
#[derive(Debug)]
pub struct RecordingObserver<E> {
    events: Mutex<Vec<E>>,
}

impl<E: Clone> RecordingObserver<E> {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Events received so far.
    pub fn events(&self) -> Vec<E> {
        self.events.lock().clone()
    }

    /// Drop recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl<E: Clone> Default for RecordingObserver<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + Send> Observer<E> for RecordingObserver<E> {
    fn on_event(&self, event: &E) -> Result<(), ObserverError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
