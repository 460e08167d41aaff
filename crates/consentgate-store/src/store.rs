//! Consent Store
//!
//! Owns one entry per category: its external code, tri-state value and
//! the queue of tags waiting for it. Values change only when the consent
//! cookie is re-read; `run_with_consent` only reads and enqueues.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use consentgate_cookie::{ConsentPayload, CookieSource, PayloadParser};

use crate::category::{ConsentCategory, ConsentValue};
use crate::data_layer::DataLayer;
use crate::error::StoreError;
use crate::hooks::ChangeHooks;
use crate::tag::{self, BoxedTag, TagOutcome};
use crate::Result;

/// Default prefix for mirrored data layer fields
pub const DEFAULT_DATA_LAYER_PREFIX: &str = "consent_";

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub parser: PayloadParser,
    /// Mirrored fields are named `<prefix><category>`, e.g. `consent_performance`
    pub data_layer_prefix: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            parser: PayloadParser::default(),
            data_layer_prefix: DEFAULT_DATA_LAYER_PREFIX.to_string(),
        }
    }
}

/// What `run_with_consent` did with a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Consent was granted; the tag already ran
    Ran,
    /// Consent is denied or unknown; the tag waits in the category queue
    Queued,
}

/// Point-in-time copy of every category's value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConsentSnapshot(BTreeMap<ConsentCategory, ConsentValue>);

impl ConsentSnapshot {
    pub fn get(&self, category: ConsentCategory) -> ConsentValue {
        self.0.get(&category).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConsentCategory, ConsentValue)> + '_ {
        self.0.iter().map(|(category, value)| (*category, *value))
    }
}

impl std::fmt::Display for ConsentSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (category, value) in self.iter() {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            match value.as_bool() {
                Some(value) => write!(f, "{}={}", category, value)?,
                None => write!(f, "{}=unknown", category)?,
            }
        }
        Ok(())
    }
}

struct ConsentEntry {
    code: &'static str,
    value: ConsentValue,
    queue: VecDeque<BoxedTag>,
}

impl ConsentEntry {
    fn new(category: ConsentCategory) -> Self {
        Self {
            code: category.code(),
            value: ConsentValue::Unknown,
            queue: VecDeque::new(),
        }
    }
}

pub struct ConsentStore {
    me: Weak<ConsentStore>,
    /// Indexed by `ConsentCategory::index`
    entries: Mutex<[ConsentEntry; 4]>,
    by_code: HashMap<&'static str, ConsentCategory>,
    parser: PayloadParser,
    source: Box<dyn CookieSource>,
    data_layer: RwLock<Option<Arc<DataLayer>>>,
    data_layer_prefix: String,
    initialized: AtomicBool,
}

impl ConsentStore {
    /// Create a store with every value unknown. Call [`initialize`] to read
    /// the cookie and join a notification chain.
    ///
    /// [`initialize`]: ConsentStore::initialize
    pub fn new<S>(options: StoreOptions, source: S) -> Arc<Self>
    where
        S: CookieSource + 'static,
    {
        let by_code = ConsentCategory::ALL
            .iter()
            .map(|category| (category.code(), *category))
            .collect();

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            entries: Mutex::new(ConsentCategory::ALL.map(ConsentEntry::new)),
            by_code,
            parser: options.parser,
            source: Box::new(source),
            data_layer: RwLock::new(None),
            data_layer_prefix: options.data_layer_prefix,
            initialized: AtomicBool::new(false),
        })
    }

    /// Read the cookie once and append this store to `hooks`.
    ///
    /// Only the first call has any effect; returns whether it was that call.
    pub fn initialize(&self, hooks: &ChangeHooks) -> bool {
        if self.initialized.swap(true, Ordering::SeqCst) {
            tracing::debug!("Consent store already initialized");
            return false;
        }

        let payload = self.refresh_consents();

        let me = self.me.clone();
        hooks.register(move || {
            if let Some(store) = me.upgrade() {
                store.handle_consent_changed();
            }
        });

        tracing::info!(
            codes = payload.len(),
            consents = %self.get_consents(),
            "Initialized consent store"
        );

        true
    }

    /// Run `tag` now if `category` is granted, otherwise queue it.
    ///
    /// Unknown categories are logged and rejected; the tag is dropped.
    pub fn run_with_consent<F, R>(&self, category: &str, tag: F) -> Result<Dispatch>
    where
        F: FnOnce(ConsentCategory) -> R + Send + 'static,
        R: TagOutcome,
    {
        let parsed = category.parse::<ConsentCategory>().map_err(|_| {
            tracing::error!(category = %category, "run_with_consent called with unknown category");
            StoreError::UnknownCategory(category.to_string())
        })?;

        Ok(self.run_with(parsed, tag))
    }

    /// Typed form of [`run_with_consent`](ConsentStore::run_with_consent)
    pub fn run_with<F, R>(&self, category: ConsentCategory, tag: F) -> Dispatch
    where
        F: FnOnce(ConsentCategory) -> R + Send + 'static,
        R: TagOutcome,
    {
        let tag = tag::boxed(tag);

        {
            let mut entries = self.entries.lock();
            let entry = &mut entries[category.index()];
            if !entry.value.is_granted() {
                entry.queue.push_back(tag);
                tracing::debug!(
                    category = %category,
                    queued = entry.queue.len(),
                    "Queued tag until consent is granted"
                );
                return Dispatch::Queued;
            }
        }

        // Lock released: the tag may call back into the store
        tag::invoke(tag, category);
        Dispatch::Ran
    }

    pub fn get_consents(&self) -> ConsentSnapshot {
        let entries = self.entries.lock();
        ConsentSnapshot(
            ConsentCategory::ALL
                .iter()
                .map(|category| (*category, entries[category.index()].value))
                .collect(),
        )
    }

    pub fn consent(&self, category: ConsentCategory) -> ConsentValue {
        self.entries.lock()[category.index()].value
    }

    /// Value for a category identifier; `Unknown` if it is not recognized.
    pub fn get_consent(&self, category: &str) -> ConsentValue {
        category
            .parse::<ConsentCategory>()
            .map(|category| self.consent(category))
            .unwrap_or_default()
    }

    /// Value for an external code; `Unknown` if it is not recognized.
    pub fn get_consent_by_code(&self, code: &str) -> ConsentValue {
        self.get_consent_type_by_code(code)
            .map(|category| self.consent(category))
            .unwrap_or_default()
    }

    pub fn get_consent_types(&self) -> &'static [ConsentCategory] {
        ConsentCategory::all()
    }

    pub fn get_consent_codes(&self) -> [&'static str; 4] {
        ConsentCategory::codes()
    }

    pub fn get_consent_type_by_code(&self, code: &str) -> Option<ConsentCategory> {
        self.by_code.get(code).copied()
    }

    pub fn get_consent_code_by_type(&self, category: &str) -> Option<&'static str> {
        category
            .parse::<ConsentCategory>()
            .ok()
            .map(|category| category.code())
    }

    /// Number of tags waiting on `category`
    pub fn queued_tags(&self, category: ConsentCategory) -> usize {
        self.entries.lock()[category.index()].queue.len()
    }

    pub fn queue_lengths(&self) -> BTreeMap<ConsentCategory, usize> {
        let entries = self.entries.lock();
        ConsentCategory::ALL
            .iter()
            .map(|category| (*category, entries[category.index()].queue.len()))
            .collect()
    }

    /// Mirror consent values into `layer`, or the global data layer if `None`.
    ///
    /// Each category gets a live read-only field (`true`, `false` or `null`).
    pub fn set_data_layer(&self, layer: Option<Arc<DataLayer>>) {
        let layer = layer.unwrap_or_else(DataLayer::global);

        for category in ConsentCategory::ALL {
            let me = self.me.clone();
            let field = format!("{}{}", self.data_layer_prefix, category.field_suffix());
            layer.define_live(field, move || {
                me.upgrade()
                    .map(|store| store.consent(category).to_json())
                    .unwrap_or(serde_json::Value::Null)
            });
        }

        tracing::debug!(data_layer = %layer.name(), "Bound consent data layer");
        *self.data_layer.write() = Some(layer);
    }

    pub fn data_layer(&self) -> Option<Arc<DataLayer>> {
        self.data_layer.read().clone()
    }

    /// Re-read the live cookie and apply it. Queues are not drained.
    pub fn fetch_consents(&self) -> ConsentPayload {
        self.refresh_consents()
    }

    /// Apply a consent-changed notification: refresh, then drain the queue
    /// of every category that is now granted.
    pub fn handle_consent_changed(&self) {
        let payload = self.refresh_consents();

        tracing::info!(
            codes = payload.len(),
            consents = %self.get_consents(),
            "Consent changed"
        );

        self.drain_granted();
    }

    /// Returns the raw parsed payload, empty when the cookie had no data.
    fn refresh_consents(&self) -> ConsentPayload {
        let header = self.source.cookie_header();

        let Some(payload) = self.parser.parse(header.as_deref()) else {
            tracing::debug!(
                cookie = %self.parser.cookie_name(),
                "No consent payload, leaving consent state untouched"
            );
            return ConsentPayload::default();
        };

        {
            let mut entries = self.entries.lock();
            for entry in entries.iter_mut() {
                entry.value = payload.is_granted(entry.code).into();
            }
        }

        for (code, value) in payload.iter() {
            if self.get_consent_type_by_code(code).is_none() {
                tracing::debug!(code = %code, value, "Ignoring unrecognized consent code");
            }
        }

        payload
    }

    fn drain_granted(&self) {
        for category in ConsentCategory::ALL {
            let mut ran = 0usize;
            let mut failed = 0usize;

            while let Some(tag) = self.next_granted_tag(category) {
                if tag::invoke(tag, category) {
                    ran += 1;
                } else {
                    failed += 1;
                }
            }

            let waiting = self.queued_tags(category);
            if ran + failed > 0 {
                tracing::info!(category = %category, ran, failed, "Drained tag queue");
            } else if waiting > 0 {
                tracing::debug!(category = %category, waiting, "Tags still waiting for consent");
            }
        }
    }

    /// Pop the oldest tag, but only while the category is granted.
    fn next_granted_tag(&self, category: ConsentCategory) -> Option<BoxedTag> {
        let mut entries = self.entries.lock();
        let entry = &mut entries[category.index()];
        if entry.value.is_granted() {
            entry.queue.pop_front()
        } else {
            None
        }
    }
}

impl std::fmt::Debug for ConsentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentStore")
            .field("consents", &self.get_consents())
            .field("queues", &self.queue_lengths())
            .field("parser", &self.parser)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consentgate_cookie::StaticCookies;
    use serde_json::json;

    type Calls = Arc<Mutex<Vec<String>>>;

    fn store_with(header: Option<&str>) -> (Arc<ConsentStore>, Arc<StaticCookies>) {
        let cookies = Arc::new(StaticCookies::new());
        if let Some(header) = header {
            cookies.set(header);
        }
        let store = ConsentStore::new(StoreOptions::default(), Arc::clone(&cookies));
        (store, cookies)
    }

    fn recorder(calls: &Calls, name: &str) -> impl FnOnce(ConsentCategory) + Send + 'static {
        let calls = Arc::clone(calls);
        let name = name.to_string();
        move |category| calls.lock().push(format!("{}:{}", name, category))
    }

    fn grant(cookies: &StaticCookies, groups: &str) {
        cookies.set(format!("OptanonConsent=groups={}", groups));
    }

    #[test]
    fn test_initial_state_is_unknown() {
        let (store, _) = store_with(None);

        for category in ConsentCategory::all() {
            assert_eq!(store.get_consent(category.as_str()), ConsentValue::Unknown);
        }
        assert_eq!(store.get_consent("BOGUS"), ConsentValue::Unknown);
        assert_eq!(store.get_consent_by_code("C0009"), ConsentValue::Unknown);
    }

    #[test]
    fn test_code_lookups_are_inverse() {
        let (store, _) = store_with(None);

        for category in store.get_consent_types() {
            let code = store.get_consent_code_by_type(category.as_str()).unwrap();
            assert_eq!(store.get_consent_type_by_code(code), Some(*category));
        }
        for code in store.get_consent_codes() {
            let category = store.get_consent_type_by_code(code).unwrap();
            assert_eq!(store.get_consent_code_by_type(category.as_str()), Some(code));
        }

        assert_eq!(store.get_consent_type_by_code("C9999"), None);
        assert_eq!(store.get_consent_code_by_type("BOGUS"), None);
    }

    #[test]
    fn test_granted_runs_immediately() {
        let (store, _) = store_with(Some("OptanonConsent=groups%3DC0002%3A1"));
        store.initialize(&ChangeHooks::new());

        let calls: Calls = Arc::default();
        let dispatch = store
            .run_with_consent("PERFORMANCE", recorder(&calls, "analytics"))
            .unwrap();

        assert_eq!(dispatch, Dispatch::Ran);
        assert_eq!(*calls.lock(), vec!["analytics:PERFORMANCE"]);
        assert_eq!(store.queued_tags(ConsentCategory::Performance), 0);
    }

    #[test]
    fn test_denied_or_unknown_queues() {
        let (store, _) = store_with(Some("OptanonConsent=groups=C0001:1,C0004:0"));
        let calls: Calls = Arc::default();

        // Unknown: not yet initialized
        assert_eq!(
            store.run_with_consent("TARGETING", recorder(&calls, "a")),
            Ok(Dispatch::Queued)
        );

        store.initialize(&ChangeHooks::new());
        assert_eq!(store.consent(ConsentCategory::Targeting), ConsentValue::Denied);

        // Denied
        assert_eq!(
            store.run_with(ConsentCategory::Targeting, recorder(&calls, "b")),
            Dispatch::Queued
        );

        assert!(calls.lock().is_empty());
        assert_eq!(store.queued_tags(ConsentCategory::Targeting), 2);
    }

    #[test]
    fn test_unknown_category_rejected() {
        let (store, _) = store_with(None);
        let calls: Calls = Arc::default();

        let result = store.run_with_consent("BOGUS", recorder(&calls, "x"));

        assert_eq!(result, Err(StoreError::UnknownCategory("BOGUS".to_string())));
        assert!(calls.lock().is_empty());
        assert!(store.queue_lengths().values().all(|len| *len == 0));
    }

    #[test]
    fn test_refresh_without_payload_leaves_state() {
        let (store, cookies) = store_with(Some("OptanonConsent=groups=C0001:1"));
        store.initialize(&ChangeHooks::new());
        assert_eq!(store.consent(ConsentCategory::StrictlyNecessary), ConsentValue::Granted);

        cookies.set("theme=dark");
        assert!(store.fetch_consents().is_empty());
        assert_eq!(store.consent(ConsentCategory::StrictlyNecessary), ConsentValue::Granted);
        assert_eq!(store.consent(ConsentCategory::Performance), ConsentValue::Denied);
    }

    #[test]
    fn test_refresh_sets_unmentioned_to_denied() {
        let (store, cookies) = store_with(None);
        grant(&cookies, "C0001:1,C0003:2");

        let payload = store.fetch_consents();
        assert_eq!(payload.get("C0003"), Some(2));

        let consents = store.get_consents();
        assert_eq!(consents.get(ConsentCategory::StrictlyNecessary), ConsentValue::Granted);
        assert_eq!(consents.get(ConsentCategory::Performance), ConsentValue::Denied);
        // Only the integer 1 grants
        assert_eq!(consents.get(ConsentCategory::Functional), ConsentValue::Denied);
        assert_eq!(consents.get(ConsentCategory::Targeting), ConsentValue::Denied);
    }

    #[test]
    fn test_refresh_ignores_unrecognized_codes() {
        let (store, cookies) = store_with(None);
        grant(&cookies, "C0009:1,C0002:1");

        let payload = store.fetch_consents();
        assert_eq!(payload.get("C0009"), Some(1));
        assert_eq!(store.get_consent_by_code("C0009"), ConsentValue::Unknown);
        assert_eq!(store.consent(ConsentCategory::Performance), ConsentValue::Granted);
        assert_eq!(store.consent(ConsentCategory::Targeting), ConsentValue::Denied);
    }

    #[test]
    fn test_notification_drains_in_fifo_order() {
        let (store, cookies) = store_with(None);
        let hooks = ChangeHooks::new();
        store.initialize(&hooks);

        let calls: Calls = Arc::default();
        for name in ["first", "second", "third"] {
            store.run_with(ConsentCategory::Functional, recorder(&calls, name));
        }
        store.run_with(ConsentCategory::Targeting, recorder(&calls, "ads"));

        grant(&cookies, "C0001:1,C0003:1,C0004:0");
        hooks.notify_consent_changed();

        assert_eq!(
            *calls.lock(),
            vec![
                "first:FUNCTIONAL",
                "second:FUNCTIONAL",
                "third:FUNCTIONAL"
            ]
        );
        assert_eq!(store.queued_tags(ConsentCategory::Functional), 0);
        assert_eq!(store.queued_tags(ConsentCategory::Targeting), 1);

        // A second notification runs nothing twice
        hooks.notify_consent_changed();
        assert_eq!(calls.lock().len(), 3);

        grant(&cookies, "C0004:1");
        hooks.notify_consent_changed();
        assert_eq!(calls.lock().last().map(String::as_str), Some("ads:TARGETING"));
        assert_eq!(store.queued_tags(ConsentCategory::Targeting), 0);
    }

    #[test]
    fn test_fetch_does_not_drain() {
        let (store, cookies) = store_with(None);
        let calls: Calls = Arc::default();
        store.run_with(ConsentCategory::Performance, recorder(&calls, "late"));

        grant(&cookies, "C0002:1");
        store.fetch_consents();

        assert!(calls.lock().is_empty());
        assert_eq!(store.queued_tags(ConsentCategory::Performance), 1);

        // Already granted now, so new tags run straight away
        store.run_with(ConsentCategory::Performance, recorder(&calls, "now"));
        assert_eq!(*calls.lock(), vec!["now:PERFORMANCE"]);
    }

    #[test]
    fn test_failing_tags_do_not_stop_drain() {
        let (store, cookies) = store_with(None);
        let hooks = ChangeHooks::new();
        store.initialize(&hooks);

        let calls: Calls = Arc::default();
        store.run_with(ConsentCategory::Performance, |_| -> std::result::Result<(), String> {
            panic!("tag exploded")
        });
        store.run_with(ConsentCategory::Performance, recorder(&calls, "after-panic"));
        store.run_with(ConsentCategory::Performance, |_| Err::<(), _>("bad response"));
        store.run_with(ConsentCategory::Targeting, recorder(&calls, "other-category"));

        grant(&cookies, "C0002:1,C0004:1");
        hooks.notify_consent_changed();

        assert_eq!(
            *calls.lock(),
            vec!["after-panic:PERFORMANCE", "other-category:TARGETING"]
        );
        assert!(store.queue_lengths().values().all(|len| *len == 0));
    }

    #[test]
    fn test_immediate_tag_panic_is_contained() {
        let (store, _) = store_with(Some("OptanonConsent=groups=C0001:1"));
        store.initialize(&ChangeHooks::new());

        let dispatch = store.run_with(
            ConsentCategory::StrictlyNecessary,
            |_| -> std::result::Result<(), String> { panic!("immediate failure") },
        );

        assert_eq!(dispatch, Dispatch::Ran);
        assert_eq!(store.consent(ConsentCategory::StrictlyNecessary), ConsentValue::Granted);
    }

    #[test]
    fn test_tag_may_reenter_store() {
        let (store, cookies) = store_with(None);
        let hooks = ChangeHooks::new();
        store.initialize(&hooks);

        let calls: Calls = Arc::default();
        {
            let inner = Arc::clone(&store);
            let calls = Arc::clone(&calls);
            store.run_with(ConsentCategory::Functional, move |_| {
                inner.run_with(ConsentCategory::Functional, recorder(&calls, "nested"));
            });
        }

        grant(&cookies, "C0003:1");
        hooks.notify_consent_changed();

        assert_eq!(*calls.lock(), vec!["nested:FUNCTIONAL"]);
    }

    #[test]
    fn test_initialize_once() {
        let (store, cookies) = store_with(None);
        let hooks = ChangeHooks::new();

        assert!(store.initialize(&hooks));
        assert!(!store.initialize(&hooks));
        assert_eq!(hooks.len(), 1);

        let calls: Calls = Arc::default();
        store.run_with(ConsentCategory::Targeting, recorder(&calls, "once"));
        grant(&cookies, "C0004:1");
        hooks.notify_consent_changed();

        assert_eq!(*calls.lock(), vec!["once:TARGETING"]);
    }

    #[test]
    fn test_previous_hook_runs_first() {
        let (store, cookies) = store_with(None);
        let hooks = ChangeHooks::new();
        let calls: Calls = Arc::default();

        {
            let calls = Arc::clone(&calls);
            hooks.register(move || calls.lock().push("platform".to_string()));
        }
        store.initialize(&hooks);
        store.run_with(ConsentCategory::Performance, recorder(&calls, "tag"));

        grant(&cookies, "C0002:1");
        hooks.notify_consent_changed();

        assert_eq!(*calls.lock(), vec!["platform", "tag:PERFORMANCE"]);
    }

    #[test]
    fn test_data_layer_mirror_is_live() {
        let (store, cookies) = store_with(None);
        let layer = Arc::new(DataLayer::new("analytics"));
        layer.set("page", json!("home"));
        store.set_data_layer(Some(Arc::clone(&layer)));

        assert_eq!(layer.get("consent_performance"), Some(serde_json::Value::Null));

        grant(&cookies, "C0002:1");
        store.fetch_consents();
        assert_eq!(layer.get("consent_performance"), Some(json!(true)));
        assert_eq!(layer.get("consent_targeting"), Some(json!(false)));
        assert!(!layer.set("consent_performance", json!(false)));
        assert_eq!(layer.get("page"), Some(json!("home")));
    }

    #[test]
    fn test_rebinding_data_layer_keeps_state() {
        let (store, cookies) = store_with(None);
        let calls: Calls = Arc::default();
        store.run_with(ConsentCategory::Functional, recorder(&calls, "queued"));
        grant(&cookies, "C0001:1");
        store.fetch_consents();

        let before = store.get_consents();
        store.set_data_layer(Some(Arc::new(DataLayer::new("first"))));
        store.set_data_layer(None);

        assert_eq!(store.get_consents(), before);
        assert_eq!(store.queued_tags(ConsentCategory::Functional), 1);
        assert_eq!(
            store.data_layer().map(|layer| layer.name().to_string()),
            Some(crate::GLOBAL_DATA_LAYER.to_string())
        );
    }

    #[test]
    fn test_snapshot_formats() {
        let (store, cookies) = store_with(None);
        assert_eq!(
            store.get_consents().to_string(),
            "STRICTLY_NECESSARY=unknown PERFORMANCE=unknown FUNCTIONAL=unknown TARGETING=unknown"
        );

        grant(&cookies, "C0001:1");
        store.fetch_consents();
        assert_eq!(
            serde_json::to_value(store.get_consents()).unwrap(),
            json!({
                "STRICTLY_NECESSARY": true,
                "PERFORMANCE": false,
                "FUNCTIONAL": false,
                "TARGETING": false
            })
        );
    }
}
