//! Consent payload parsing
//!
//! The consent cookie carries a query-style value once decoded, e.g.
//! `isGpcEnabled=0&datestamp=...&groups=C0001:1,C0002:0,C0004:0&...`.
//! Only the `groups` parameter matters here.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::jar::{decode_value, find_cookie};

/// Default consent cookie name
pub const DEFAULT_COOKIE_NAME: &str = "OptanonConsent";

/// Default name of the parameter holding the group list
pub const DEFAULT_GROUPS_PARAM: &str = "groups";

/// Parsed `code -> value` mapping from the consent cookie.
///
/// Values are the raw integers the platform wrote, not booleans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConsentPayload(BTreeMap<String, i64>);

impl ConsentPayload {
    pub fn get(&self, code: &str) -> Option<i64> {
        self.0.get(code).copied()
    }

    /// Whether `code` is present with the value `1`
    pub fn is_granted(&self, code: &str) -> bool {
        self.get(code) == Some(1)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> + '_ {
        self.0.iter().map(|(code, value)| (code.as_str(), *value))
    }
}

impl FromIterator<(String, i64)> for ConsentPayload {
    fn from_iter<I: IntoIterator<Item = (String, i64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Extracts a [`ConsentPayload`] from a raw cookie header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadParser {
    cookie_name: String,
    groups_param: String,
}

impl PayloadParser {
    pub fn new(cookie_name: impl Into<String>, groups_param: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            groups_param: groups_param.into(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn groups_param(&self) -> &str {
        &self.groups_param
    }

    /// Parse the consent payload out of a full cookie header.
    ///
    /// Returns `None` ("no data") when there is no header, no consent cookie,
    /// an undecodable value, or no non-empty group list. A group list whose
    /// pairs are all malformed still yields `Some` with an empty mapping.
    pub fn parse<'a>(&self, header: impl Into<Option<&'a str>>) -> Option<ConsentPayload> {
        let header = header.into()?;
        let raw = find_cookie(header, &self.cookie_name)?;

        let decoded = match decode_value(raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(cookie = %self.cookie_name, error = %e, "Failed to decode consent cookie");
                return None;
            }
        };

        // Already decoded once; parameters are read verbatim
        let groups = decoded
            .split('&')
            .filter_map(|param| param.split_once('='))
            .find(|(key, _)| *key == self.groups_param)
            .map(|(_, value)| value)?;

        parse_groups(groups)
    }
}

impl Default for PayloadParser {
    fn default() -> Self {
        Self::new(DEFAULT_COOKIE_NAME, DEFAULT_GROUPS_PARAM)
    }
}

/// Parse a consent payload using the default cookie and parameter names.
pub fn parse_consent_payload<'a>(header: impl Into<Option<&'a str>>) -> Option<ConsentPayload> {
    PayloadParser::default().parse(header)
}

/// Parse `C0001:1,C0002:0[;...]` into a payload.
fn parse_groups(groups: &str) -> Option<ConsentPayload> {
    let list = groups.split(';').next().unwrap_or_default().trim();
    if list.is_empty() {
        return None;
    }

    let mut payload = BTreeMap::new();
    for pair in list.split(',') {
        let Some((code, value)) = pair.split_once(':') else {
            tracing::debug!(pair = %pair, "Skipping malformed consent pair");
            continue;
        };

        let code = code.trim();
        match (code.is_empty(), parse_int(value)) {
            (false, Some(value)) => {
                payload.insert(code.to_string(), value);
            }
            _ => {
                tracing::debug!(pair = %pair, "Skipping malformed consent pair");
            }
        }
    }

    Some(ConsentPayload(payload))
}

/// Base-10 integer prefix parse: leading whitespace, optional sign, digits.
/// Trailing garbage is ignored; no digits at all is `None`.
fn parse_int(input: &str) -> Option<i64> {
    let input = input.trim_start();
    let (negative, rest) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        _ => (false, input),
    };

    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if digits_end == 0 {
        return None;
    }

    let magnitude: i64 = rest[..digits_end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}
