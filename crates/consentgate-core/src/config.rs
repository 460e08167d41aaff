//! Gate configuration

use serde::{Deserialize, Serialize};

use consentgate_cookie::PayloadParser;
use consentgate_store::StoreOptions;

use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the consent platform's cookie
    pub cookie_name: String,
    /// Parameter inside the cookie value holding the group list
    pub groups_param: String,
    /// Prefix for consent fields mirrored into the data layer
    pub data_layer_prefix: String,
}

impl Config {
    /// Load from JSON; absent fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn parser(&self) -> PayloadParser {
        PayloadParser::new(self.cookie_name.clone(), self.groups_param.clone())
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            parser: self.parser(),
            data_layer_prefix: self.data_layer_prefix.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let options = StoreOptions::default();

        Self {
            cookie_name: options.parser.cookie_name().to_string(),
            groups_param: options.parser.groups_param().to_string(),
            data_layer_prefix: options.data_layer_prefix,
        }
    }
}
