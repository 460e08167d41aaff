//! ConsentGate Core
//!
//! Gates tags on the consent platform's cookie. One consent store lives
//! for the whole process; the platform's "consent changed" signal re-reads
//! the cookie and releases whatever tags were waiting.

mod config;
mod error;
mod gate;

pub use config::Config;
pub use error::CoreError;
pub use gate::ConsentGate;

// Re-export the public surface
pub use consentgate_cookie::{
    cookies_fn, parse_consent_payload, ConsentPayload, CookieSource, FnCookies, PayloadParser,
    StaticCookies,
};
pub use consentgate_store::{
    ChangeHooks, ConsentCategory, ConsentSnapshot, ConsentStore, ConsentValue, DataLayer,
    Dispatch, StoreError, TagOutcome,
};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    subscriber().init();
}

/// Like [`init_logging`], but reports an already-installed subscriber as an error.
pub fn try_init_logging() -> Result<()> {
    subscriber()
        .try_init()
        .map_err(|e| CoreError::Logging(e.to_string()))
}

fn subscriber() -> tracing_subscriber::fmt::SubscriberBuilder<
    tracing_subscriber::fmt::format::DefaultFields,
    tracing_subscriber::fmt::format::Format,
    tracing_subscriber::EnvFilter,
> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true)
}
