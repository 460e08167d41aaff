//! Analytics data layer
//!
//! A shared key/value object analytics tags read from. Live fields are
//! read-only and recomputed on every access, so they always reflect the
//! current consent state.

use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// Name of the well-known default data layer
pub const GLOBAL_DATA_LAYER: &str = "utag_data";

type LiveField = Arc<dyn Fn() -> Value + Send + Sync>;

enum Field {
    Static(Value),
    Live(LiveField),
}

pub struct DataLayer {
    name: String,
    fields: RwLock<BTreeMap<String, Field>>,
}

impl DataLayer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: RwLock::new(BTreeMap::new()),
        }
    }

    /// The default data layer used when no other target is bound.
    pub fn global() -> Arc<DataLayer> {
        static GLOBAL: OnceLock<Arc<DataLayer>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(DataLayer::new(GLOBAL_DATA_LAYER))))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set a plain field. Returns `false` if `key` is a read-only live field.
    pub fn set(&self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        let mut fields = self.fields.write();

        if matches!(fields.get(&key), Some(Field::Live(_))) {
            tracing::debug!(data_layer = %self.name, field = %key, "Ignoring write to live field");
            return false;
        }

        fields.insert(key, Field::Static(value));
        true
    }

    /// Define (or redefine) a read-only field computed on each access.
    pub fn define_live<F>(&self, key: impl Into<String>, compute: F)
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.fields
            .write()
            .insert(key.into(), Field::Live(Arc::new(compute)));
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        // Clone the accessor out so it runs without holding the lock
        let live = match self.fields.read().get(key)? {
            Field::Static(value) => return Some(value.clone()),
            Field::Live(compute) => Arc::clone(compute),
        };
        Some(live())
    }

    pub fn is_live(&self, key: &str) -> bool {
        matches!(self.fields.read().get(key), Some(Field::Live(_)))
    }

    /// Current values of every field, live fields evaluated now.
    pub fn snapshot(&self) -> Map<String, Value> {
        let keys: Vec<String> = self.fields.read().keys().cloned().collect();
        keys.into_iter()
            .filter_map(|key| self.get(&key).map(|value| (key, value)))
            .collect()
    }
}

impl std::fmt::Debug for DataLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLayer")
            .field("name", &self.name)
            .field("fields", &self.fields.read().len())
            .finish()
    }
}
