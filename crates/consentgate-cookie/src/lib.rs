//! ConsentGate Cookie
//!
//! Reads the consent platform's cookie out of a raw `Cookie` header:
//! - Locate the consent cookie by exact name
//! - URL-decode its value
//! - Extract the `groups` parameter (`C0001:1,C0002:0;...`)
//! - Parse each `code:int` pair, skipping malformed ones

mod error;
mod jar;
mod payload;

pub use error::CookieError;
pub use jar::{cookies_fn, decode_value, find_cookie, CookieSource, FnCookies, StaticCookies};
pub use payload::{parse_consent_payload, ConsentPayload, PayloadParser};

pub type Result<T> = std::result::Result<T, CookieError>;
