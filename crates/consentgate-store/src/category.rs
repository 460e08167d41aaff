//! Consent categories and values
//!
//! | Category           | Code  |
//! | STRICTLY_NECESSARY | C0001 |
//! | PERFORMANCE        | C0002 |
//! | FUNCTIONAL         | C0003 |
//! | TARGETING          | C0004 |

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentCategory {
    StrictlyNecessary,
    Performance,
    Functional,
    Targeting,
}

impl ConsentCategory {
    pub const ALL: [ConsentCategory; 4] = [
        ConsentCategory::StrictlyNecessary,
        ConsentCategory::Performance,
        ConsentCategory::Functional,
        ConsentCategory::Targeting,
    ];

    pub fn all() -> &'static [ConsentCategory] {
        &Self::ALL
    }

    /// All external codes, in category order
    pub fn codes() -> [&'static str; 4] {
        Self::ALL.map(|category| category.code())
    }

    /// External short code used by the consent platform
    pub fn code(&self) -> &'static str {
        match self {
            ConsentCategory::StrictlyNecessary => "C0001",
            ConsentCategory::Performance => "C0002",
            ConsentCategory::Functional => "C0003",
            ConsentCategory::Targeting => "C0004",
        }
    }

    /// Position in [`ConsentCategory::ALL`]
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentCategory::StrictlyNecessary => "STRICTLY_NECESSARY",
            ConsentCategory::Performance => "PERFORMANCE",
            ConsentCategory::Functional => "FUNCTIONAL",
            ConsentCategory::Targeting => "TARGETING",
        }
    }

    /// Data layer field suffix (`strictly_necessary`, ...)
    pub fn field_suffix(&self) -> &'static str {
        match self {
            ConsentCategory::StrictlyNecessary => "strictly_necessary",
            ConsentCategory::Performance => "performance",
            ConsentCategory::Functional => "functional",
            ConsentCategory::Targeting => "targeting",
        }
    }
}

impl std::fmt::Display for ConsentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConsentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STRICTLY_NECESSARY" => Ok(ConsentCategory::StrictlyNecessary),
            "PERFORMANCE" => Ok(ConsentCategory::Performance),
            "FUNCTIONAL" => Ok(ConsentCategory::Functional),
            "TARGETING" => Ok(ConsentCategory::Targeting),
            _ => Err(format!("Unknown consent category: {}", s)),
        }
    }
}

/// Tri-state consent value.
///
/// `Unknown` means no consent payload has ever been applied; it is never
/// produced by a successful refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConsentValue {
    Granted,
    Denied,
    #[default]
    Unknown,
}

impl ConsentValue {
    pub fn is_granted(&self) -> bool {
        matches!(self, ConsentValue::Granted)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ConsentValue::Unknown)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConsentValue::Granted => Some(true),
            ConsentValue::Denied => Some(false),
            ConsentValue::Unknown => None,
        }
    }

    /// JSON form: `true`, `false` or `null`
    pub fn to_json(&self) -> serde_json::Value {
        match self.as_bool() {
            Some(value) => serde_json::Value::Bool(value),
            None => serde_json::Value::Null,
        }
    }
}

impl From<Option<bool>> for ConsentValue {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => ConsentValue::Granted,
            Some(false) => ConsentValue::Denied,
            None => ConsentValue::Unknown,
        }
    }
}

impl From<bool> for ConsentValue {
    fn from(value: bool) -> Self {
        Some(value).into()
    }
}

impl Serialize for ConsentValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_bool().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ConsentValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<bool>::deserialize(deserializer).map(ConsentValue::from)
    }
}
