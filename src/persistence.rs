//! Durable record set for the reading session: the book payload and its
//! metadata, last-read location, precise reading position and two scroll
//! offsets. Every read goes to the backing store.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::models::{BookMeta, ScrollChannel};
use crate::store::{KeyValueStore, Value, Write};

pub const BOOK_STORAGE_KEY: &str = "bunkai_book";
pub const BOOK_META_KEY: &str = "bunkai_book_meta";
pub const READING_POSITION_KEY: &str = "bunkai_reading_position";
pub const LAST_CHAPTER_KEY: &str = "bunkai_last_chapter";
pub const SIDEBAR_SCROLL_KEY: &str = "bunkai_sidebar_scroll";
pub const TOC_SCROLL_KEY: &str = "bunkai_toc_scroll";
pub const SETTINGS_KEY: &str = "bunkai_settings";

/// Keys that belong to the currently stored book, besides the payload.
pub const ANCILLARY_KEYS: [&str; 4] = [
    READING_POSITION_KEY,
    LAST_CHAPTER_KEY,
    SIDEBAR_SCROLL_KEY,
    TOC_SCROLL_KEY,
];

fn scroll_key(channel: ScrollChannel) -> &'static str {
    match channel {
        ScrollChannel::Contents => TOC_SCROLL_KEY,
        ScrollChannel::Sidebar => SIDEBAR_SCROLL_KEY,
    }
}

#[derive(Clone)]
pub struct Gateway {
    store: Arc<dyn KeyValueStore>,
}

impl Gateway {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Replaces the stored book and its metadata and drops the reading state
    /// of the previous one, in a single batch. On failure the previous book
    /// and its state are left as they were.
    pub async fn store_book(&self, bytes: &[u8], meta: &BookMeta) -> Result<(), StoreError> {
        let meta_json = serde_json::to_string(meta)?;
        let mut writes = vec![
            Write::Set(BOOK_STORAGE_KEY.to_string(), Value::Bytes(bytes.to_vec())),
            Write::Set(BOOK_META_KEY.to_string(), Value::Text(meta_json)),
        ];
        writes.extend(ANCILLARY_KEYS.iter().map(|key| Write::Delete(key.to_string())));
        self.store.write_batch(writes).await?;
        debug!(title = %meta.title, size = bytes.len(), "stored book payload");
        Ok(())
    }

    pub async fn load_book(&self) -> Result<Option<Vec<u8>>, StoreError> {
        match self.store.get(BOOK_STORAGE_KEY).await? {
            Some(value) => Ok(Some(value.into_bytes(BOOK_STORAGE_KEY)?)),
            None => Ok(None),
        }
    }

    pub async fn load_book_meta(&self) -> Result<Option<BookMeta>, StoreError> {
        match self.store.get(BOOK_META_KEY).await? {
            Some(value) => {
                let text = value.into_text(BOOK_META_KEY)?;
                Ok(Some(serde_json::from_str(&text)?))
            }
            None => Ok(None),
        }
    }

    pub async fn save_location(&self, href: &str) -> Result<(), StoreError> {
        self.store
            .set(LAST_CHAPTER_KEY, Value::Text(href.to_string()))
            .await
    }

    pub async fn load_location(&self) -> Result<Option<String>, StoreError> {
        self.load_text(LAST_CHAPTER_KEY).await
    }

    pub async fn save_reading_position(&self, position: &str) -> Result<(), StoreError> {
        self.store
            .set(READING_POSITION_KEY, Value::Text(position.to_string()))
            .await
    }

    pub async fn load_reading_position(&self) -> Result<Option<String>, StoreError> {
        self.load_text(READING_POSITION_KEY).await
    }

    pub async fn save_scroll_offset(&self, channel: ScrollChannel, y: f64) -> Result<(), StoreError> {
        self.store
            .set(scroll_key(channel), Value::Text(y.to_string()))
            .await
    }

    /// Missing, unreadable or non-numeric offsets all read as 0.
    pub async fn load_scroll_offset(&self, channel: ScrollChannel) -> f64 {
        let key = scroll_key(channel);
        match self.load_text(key).await {
            Ok(Some(text)) => text.parse::<f64>().ok().filter(|y| y.is_finite()).unwrap_or(0.0),
            Ok(None) => 0.0,
            Err(err) => {
                warn!(?err, key, "failed to read scroll offset");
                0.0
            }
        }
    }

    pub async fn load_preferences_record(&self) -> Result<Option<String>, StoreError> {
        self.load_text(SETTINGS_KEY).await
    }

    pub async fn save_preferences_record(&self, json: String) -> Result<(), StoreError> {
        self.store.set(SETTINGS_KEY, Value::Text(json)).await
    }

    /// Removes the book payload, its metadata and every ancillary key. Every
    /// delete is attempted; any failure is reported once for all of them.
    pub async fn clear_all(&self) -> Result<(), StoreError> {
        let mut keys = vec![BOOK_STORAGE_KEY, BOOK_META_KEY];
        keys.extend_from_slice(&ANCILLARY_KEYS);
        self.delete_all(&keys).await
    }

    async fn delete_all(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut failed = Vec::new();
        let mut first_reason = None;
        for key in keys {
            if let Err(err) = self.store.delete(key).await {
                failed.push(key.to_string());
                first_reason.get_or_insert_with(|| err.to_string());
            }
        }

        match first_reason {
            None => Ok(()),
            Some(reason) => Err(StoreError::ClearIncomplete { keys: failed, reason }),
        }
    }

    async fn load_text(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.store.get(key).await? {
            Some(value) => Ok(Some(value.into_text(key)?)),
            None => Ok(None),
        }
    }
}
