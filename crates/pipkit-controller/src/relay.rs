//! Lifecycle relay registered with the host window.
//!
//! A relay carries no state besides its id and a weak reference to whoever
//! listens for overlay mode changes. Hosts that recreate their listeners
//! (e.g. after process death) rebuild the relay from its id alone; such an
//! orphan can still be found and removed, and forwards nothing.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::debug;
use uuid::Uuid;

const RELAY_PREFIX: &str = "PipRelay_";
const ORPHANED_ID: &str = "PipRelay_orphaned";

/// Receives overlay mode changes from a relay.
pub trait OverlayModeListener: Send + Sync {
    fn on_overlay_mode_changed(&self, active: bool);
}

// MARK: - RelayId

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelayId(String);

impl RelayId {
    pub fn generate() -> Self {
        Self(format!("{RELAY_PREFIX}{}", Uuid::new_v4()))
    }

    /// Rebuilds an id saved by the host.
    pub fn from_saved(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RelayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// MARK: - LifecycleRelay

struct NoListener;

impl OverlayModeListener for NoListener {
    fn on_overlay_mode_changed(&self, _active: bool) {}
}

pub struct LifecycleRelay {
    id: RelayId,
    listener: Weak<dyn OverlayModeListener>,
}

impl LifecycleRelay {
    pub fn new(listener: Weak<dyn OverlayModeListener>) -> Self {
        Self { id: RelayId::generate(), listener }
    }

    /// A relay recreated by the host without its listener.
    pub fn orphan(id: Option<RelayId>) -> Self {
        let listener: Weak<dyn OverlayModeListener> = Weak::<NoListener>::new();
        Self {
            id: id.unwrap_or_else(|| RelayId(ORPHANED_ID.to_owned())),
            listener,
        }
    }

    pub fn id(&self) -> &RelayId {
        &self.id
    }

    pub fn is_orphaned(&self) -> bool {
        self.listener.strong_count() == 0
    }

    /// Forwards to the listener if it is still alive.
    pub fn on_overlay_mode_changed(&self, active: bool) {
        match self.listener.upgrade() {
            Some(listener) => listener.on_overlay_mode_changed(active),
            None => debug!("[{}] mode change ({}) with no listener — ignored", self.id, active),
        }
    }
}

impl std::fmt::Debug for LifecycleRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleRelay")
            .field("id", &self.id)
            .field("orphaned", &self.is_orphaned())
            .finish()
    }
}

// MARK: - RelayRegistry

/// Id-keyed set of relays for window-system implementations.
///
/// Registration and deregistration are idempotent.
#[derive(Default)]
pub struct RelayRegistry {
    relays: Mutex<BTreeMap<RelayId, Arc<LifecycleRelay>>>,
}

impl RelayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if a relay with the same id was already present.
    pub fn register(&self, relay: Arc<LifecycleRelay>) -> bool {
        let mut relays = self.relays.lock().unwrap_or_else(PoisonError::into_inner);
        if relays.contains_key(relay.id()) {
            return false;
        }
        relays.insert(relay.id().clone(), relay);
        true
    }

    pub fn deregister(&self, id: &RelayId) -> Option<Arc<LifecycleRelay>> {
        self.relays.lock().unwrap_or_else(PoisonError::into_inner).remove(id)
    }

    pub fn find(&self, id: &RelayId) -> Option<Arc<LifecycleRelay>> {
        self.relays.lock().unwrap_or_else(PoisonError::into_inner).get(id).cloned()
    }

    pub fn ids(&self) -> Vec<RelayId> {
        self.relays.lock().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.relays.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers a mode change to every registered relay.
    ///
    /// The registry lock is not held while relays run, so listeners may
    /// register or deregister from inside the callback.
    pub fn notify(&self, active: bool) {
        let relays: Vec<_> = self
            .relays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for relay in relays {
            relay.on_overlay_mode_changed(active);
        }
    }
}
