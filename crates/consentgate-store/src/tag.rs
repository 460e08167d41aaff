//! Tag invocation
//!
//! A tag is any `FnOnce(ConsentCategory)` returning `()` or
//! `Result<(), E: Display>`. Failures and panics are contained here and
//! only ever logged.

use std::any::Any;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};

use crate::category::ConsentCategory;

/// What a tag may return.
pub trait TagOutcome {
    fn into_outcome(self) -> Result<(), String>;
}

impl TagOutcome for () {
    fn into_outcome(self) -> Result<(), String> {
        Ok(())
    }
}

impl<E: Display> TagOutcome for Result<(), E> {
    fn into_outcome(self) -> Result<(), String> {
        self.map_err(|e| e.to_string())
    }
}

pub(crate) type BoxedTag = Box<dyn FnOnce(ConsentCategory) -> Result<(), String> + Send>;

pub(crate) fn boxed<F, R>(tag: F) -> BoxedTag
where
    F: FnOnce(ConsentCategory) -> R + Send + 'static,
    R: TagOutcome,
{
    Box::new(move |category| tag(category).into_outcome())
}

/// Run a tag, returning whether it completed cleanly.
pub(crate) fn invoke(tag: BoxedTag, category: ConsentCategory) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| tag(category))) {
        Ok(Ok(())) => true,
        Ok(Err(error)) => {
            tracing::error!(category = %category, error = %error, "Tag returned an error");
            false
        }
        Err(payload) => {
            tracing::error!(
                category = %category,
                panic = %panic_message(payload.as_ref()),
                "Tag panicked"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
