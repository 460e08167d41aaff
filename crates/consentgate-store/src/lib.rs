//! ConsentGate Store
//!
//! Holds the current consent value per category and the tags waiting on
//! each one:
//! - Tags for a granted category run immediately
//! - Everything else is queued, FIFO, per category
//! - A consent-changed notification re-reads the cookie and drains the
//!   queues of every category that is now granted

mod category;
mod data_layer;
mod error;
mod hooks;
mod store;
mod tag;

pub use category::{ConsentCategory, ConsentValue};
pub use data_layer::{DataLayer, GLOBAL_DATA_LAYER};
pub use error::StoreError;
pub use hooks::ChangeHooks;
pub use store::{ConsentSnapshot, ConsentStore, Dispatch, StoreOptions};
pub use tag::TagOutcome;

pub type Result<T> = std::result::Result<T, StoreError>;
