//! Consent-changed notification chain
//!
//! The consent platform fires a single "consent changed" signal. Every
//! interested party registers a listener; listeners run in registration
//! order, so anything registered before the store keeps running first.

use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct ChangeHooks {
    listeners: RwLock<Vec<Listener>>,
}

impl ChangeHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide chain the consent platform notifies.
    pub fn global() -> &'static ChangeHooks {
        static GLOBAL: OnceLock<ChangeHooks> = OnceLock::new();
        GLOBAL.get_or_init(ChangeHooks::new)
    }

    /// Append a listener to the end of the chain
    pub fn register<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Fire the chain. A panicking listener is logged and skipped.
    pub fn notify_consent_changed(&self) {
        // Snapshot so listeners may register more listeners while running
        let listeners: Vec<Listener> = self.listeners.read().clone();

        tracing::debug!(listeners = listeners.len(), "Consent changed");

        for (position, listener) in listeners.iter().enumerate() {
            if panic::catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
                tracing::error!(position, "Consent change listener panicked");
            }
        }
    }
}

impl std::fmt::Debug for ChangeHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeHooks")
            .field("listeners", &self.len())
            .finish()
    }
}
