//! Cookie header access
//!
//! The hosting page owns the cookie jar; we only ever see the raw
//! `name=value; name=value` header it hands us.

use parking_lot::RwLock;
use percent_encoding::percent_decode_str;

use crate::Result;

/// Supplies the current raw cookie header on demand.
pub trait CookieSource: Send + Sync {
    /// The full header, or `None` when the host has no cookie string.
    fn cookie_header(&self) -> Option<String>;
}

/// Adapts a closure into a [`CookieSource`].
pub struct FnCookies<F>(F);

/// Build a [`CookieSource`] that calls `f` on every read.
pub fn cookies_fn<F>(f: F) -> FnCookies<F>
where
    F: Fn() -> Option<String> + Send + Sync,
{
    FnCookies(f)
}

impl<F> CookieSource for FnCookies<F>
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn cookie_header(&self) -> Option<String> {
        (self.0)()
    }
}

/// In-memory cookie header the host overwrites whenever its jar changes.
#[derive(Debug, Default)]
pub struct StaticCookies {
    header: RwLock<Option<String>>,
}

impl StaticCookies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(header: impl Into<String>) -> Self {
        Self {
            header: RwLock::new(Some(header.into())),
        }
    }

    /// Replace the header
    pub fn set(&self, header: impl Into<String>) {
        *self.header.write() = Some(header.into());
    }

    pub fn clear(&self) {
        *self.header.write() = None;
    }
}

impl CookieSource for StaticCookies {
    fn cookie_header(&self) -> Option<String> {
        self.header.read().clone()
    }
}

impl<T: CookieSource + ?Sized> CookieSource for std::sync::Arc<T> {
    fn cookie_header(&self) -> Option<String> {
        (**self).cookie_header()
    }
}

/// Find the raw (still encoded) value of the first cookie named exactly `name`.
pub fn find_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim_start().split_once('='))
        .find(|(key, _)| key.trim_end() == name)
        .map(|(_, value)| value.trim())
}

/// Percent-decode a cookie value.
pub fn decode_value(raw: &str) -> Result<String> {
    let decoded = percent_decode_str(raw).decode_utf8()?;
    Ok(decoded.into_owned())
}
