use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::models::Theme;
use crate::persistence::Gateway;

pub const MIN_FONT_SIZE: u16 = 80;
pub const MAX_FONT_SIZE: u16 = 150;

pub const FONT_FAMILY_PRESETS: &[&str] = &["Helvetica", "Georgia", "Merriweather"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    pub theme: Theme,
    pub font_size: u16,
    pub font_family: String,
    pub line_height: f32,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: Theme::Oled,
            font_size: 100,
            font_family: "Helvetica".to_string(),
            line_height: 1.5,
        }
    }
}

impl Preferences {
    pub fn merge(&mut self, update: PreferenceUpdate) {
        if let Some(theme) = update.theme {
            self.theme = theme;
        }
        if let Some(font_size) = update.font_size {
            self.font_size = font_size;
        }
        if let Some(font_family) = update.font_family {
            self.font_family = font_family;
        }
        if let Some(line_height) = update.line_height {
            self.line_height = line_height;
        }
        self.normalize();
    }

    fn normalize(&mut self) {
        self.font_size = self.font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
        if !self.line_height.is_finite() || self.line_height <= 0.0 {
            self.line_height = Preferences::default().line_height;
        }
        if self.font_family.trim().is_empty() {
            self.font_family = Preferences::default().font_family;
        }
    }

    /// Reads a stored record over the defaults. A field that is missing or
    /// holds the wrong type keeps its default without touching the others.
    /// Only a record that is not a JSON object at all is an error.
    pub fn from_record(json: &str) -> Result<Self, serde_json::Error> {
        let record: Map<String, JsonValue> = serde_json::from_str(json)?;
        let mut prefs = Preferences::default();
        if let Some(theme) = field(&record, "theme") {
            prefs.theme = theme;
        }
        // Stored sizes may carry a fraction.
        if let Some(font_size) = field::<f64>(&record, "fontSize") {
            if font_size.is_finite() {
                prefs.font_size = font_size
                    .round()
                    .clamp(MIN_FONT_SIZE as f64, MAX_FONT_SIZE as f64) as u16;
            }
        }
        if let Some(font_family) = field(&record, "fontFamily") {
            prefs.font_family = font_family;
        }
        if let Some(line_height) = field(&record, "lineHeight") {
            prefs.line_height = line_height;
        }
        prefs.normalize();
        Ok(prefs)
    }
}

fn field<T: DeserializeOwned>(record: &Map<String, JsonValue>, key: &str) -> Option<T> {
    let value = record.get(key)?;
    match T::deserialize(value) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, %err, "ignoring unreadable preference");
            None
        }
    }
}

/// A partial set of preference fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreferenceUpdate {
    pub theme: Option<Theme>,
    pub font_size: Option<u16>,
    pub font_family: Option<String>,
    pub line_height: Option<f32>,
}

impl PreferenceUpdate {
    pub fn theme(theme: Theme) -> Self {
        Self { theme: Some(theme), ..Default::default() }
    }

    pub fn font_size(font_size: u16) -> Self {
        Self { font_size: Some(font_size), ..Default::default() }
    }

    pub fn font_family(font_family: &str) -> Self {
        Self { font_family: Some(font_family.to_string()), ..Default::default() }
    }

    pub fn line_height(line_height: f32) -> Self {
        Self { line_height: Some(line_height), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Which fields differ between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreferenceChange {
    pub theme: bool,
    pub font_size: bool,
    pub font_family: bool,
    pub line_height: bool,
}

impl PreferenceChange {
    pub fn between(before: &Preferences, after: &Preferences) -> Self {
        Self {
            theme: before.theme != after.theme,
            font_size: before.font_size != after.font_size,
            font_family: before.font_family != after.font_family,
            line_height: before.line_height != after.line_height,
        }
    }

    /// Theme and line height are baked into the registered style variants.
    pub fn needs_restyle(&self) -> bool {
        self.theme || self.line_height
    }
}

pub type Subscriber = Arc<dyn Fn(&Preferences, PreferenceChange) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// The single process-wide preference record. Construct one and hand an
/// `Arc` to every consumer.
pub struct PreferenceStore {
    current: Mutex<Preferences>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    next_id: AtomicU64,
    gateway: Gateway,
}

impl PreferenceStore {
    /// Loads the stored record over the defaults. An unreadable record is
    /// logged and replaced by defaults.
    pub async fn load(gateway: Gateway) -> Arc<Self> {
        let prefs = match gateway.load_preferences_record().await {
            Ok(Some(json)) => Preferences::from_record(&json).unwrap_or_else(|err| {
                warn!(?err, "stored preferences are unreadable, using defaults");
                Preferences::default()
            }),
            Ok(None) => Preferences::default(),
            Err(err) => {
                warn!(?err, "failed to read stored preferences, using defaults");
                Preferences::default()
            }
        };
        debug!(?prefs, "loaded preferences");
        Arc::new(Self::with_preferences(gateway, prefs))
    }

    pub fn with_preferences(gateway: Gateway, prefs: Preferences) -> Self {
        Self {
            current: Mutex::new(prefs),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            gateway,
        }
    }

    pub fn get(&self) -> Preferences {
        self.current.lock().clone()
    }

    /// Merges `update`, persists the merged record and notifies subscribers.
    /// The in-memory record and subscribers are updated even if the write
    /// fails; the write error is returned.
    pub async fn set(&self, update: PreferenceUpdate) -> Result<Preferences, StoreError> {
        let (before, after) = {
            let mut current = self.current.lock();
            let before = current.clone();
            current.merge(update);
            (before, current.clone())
        };

        let change = PreferenceChange::between(&before, &after);
        let persisted = match serde_json::to_string(&after) {
            Ok(json) => self.gateway.save_preferences_record(json).await,
            Err(err) => Err(err.into()),
        };

        if change != PreferenceChange::default() {
            self.notify(&after, change);
        }

        persisted.map(|_| after)
    }

    pub fn subscribe(&self, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, subscriber));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.lock().retain(|(sub_id, _)| *sub_id != id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn notify(&self, prefs: &Preferences, change: PreferenceChange) {
        // Subscribers may subscribe or unsubscribe while being notified.
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, subscriber)| subscriber.clone())
            .collect();
        for subscriber in subscribers {
            subscriber(prefs, change);
        }
    }
}
