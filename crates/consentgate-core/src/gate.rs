//! Process-wide consent store
//!
//! The first `install` builds the store, reads the cookie, joins the
//! global consent-changed chain and binds the global data layer. Every
//! later `install` hands back that same store and ignores its arguments.

use std::sync::{Arc, OnceLock};

use consentgate_cookie::CookieSource;
use consentgate_store::{ChangeHooks, ConsentCategory, ConsentStore, Dispatch, TagOutcome};

use crate::config::Config;
use crate::error::CoreError;
use crate::Result;

static STORE: OnceLock<Arc<ConsentStore>> = OnceLock::new();

pub struct ConsentGate;

impl ConsentGate {
    /// Install the process-wide store, or return the one already installed.
    pub fn install<S>(config: &Config, source: S) -> &'static ConsentStore
    where
        S: CookieSource + 'static,
    {
        let store = STORE.get_or_init(|| {
            let store = ConsentStore::new(config.store_options(), source);
            store.initialize(ChangeHooks::global());
            store.set_data_layer(None);

            tracing::info!(cookie = %config.cookie_name, "Installed consent gate");
            store
        });

        store
    }

    /// The installed store, if any
    pub fn instance() -> Option<&'static ConsentStore> {
        STORE.get().map(|store| store.as_ref())
    }

    /// Run or queue a tag on the installed store.
    pub fn run_with_consent<F, R>(category: &str, tag: F) -> Result<Dispatch>
    where
        F: FnOnce(ConsentCategory) -> R + Send + 'static,
        R: TagOutcome,
    {
        let store = Self::instance().ok_or(CoreError::NotInstalled)?;
        Ok(store.run_with_consent(category, tag)?)
    }

    /// Signal that the consent platform recorded a new choice.
    pub fn notify_consent_changed() {
        ChangeHooks::global().notify_consent_changed();
    }
}
