//! Cookie error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CookieError {
    #[error("Cookie value is not valid UTF-8 after decoding: {0}")]
    Decode(#[from] std::str::Utf8Error),
}
