//! Key-value persistence for conversation history and preferences.
//!
//! Values are JSON documents stored under string keys. Conversation
//! messages for a page live under [`history_key`].

use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::turn::ConversationMessage;

const HISTORY_PREFIX: &str = "messages_";
const MAX_KEY_BODY: usize = 100;

/// Persistence boundary.
pub trait Store {
    /// Returns the value stored under `key`, if any.
    fn load(&self, key: &str) -> Result<Option<Value>>;
    fn save(&self, key: &str, value: &Value) -> Result<()>;
    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Per-page history key.
///
/// Lossy: the scheme is dropped, every character other than an ASCII letter
/// or digit becomes `_` and the result is cut to 100 characters, so distinct
/// URLs can share a key.
pub fn history_key(url: &str) -> String {
    let stripped = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let body: String = stripped
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(MAX_KEY_BODY)
        .collect();
    format!("{HISTORY_PREFIX}{body}")
}

/// Collision-free history key: the prefix plus the SHA-256 hex digest of the
/// full URL.
pub fn history_key_v2(url: &str) -> String {
    let mut key = String::from(HISTORY_PREFIX);
    for byte in Sha256::digest(url.as_bytes()) {
        let _ = write!(key, "{byte:02x}");
    }
    key
}

/// Loads the stored conversation for `url`; a missing entry is an empty history.
pub fn load_messages(store: &dyn Store, url: &str) -> Result<Vec<ConversationMessage>> {
    let key = history_key(url);
    match store.load(&key)? {
        Some(value) => serde_json::from_value(value)
            .with_context(|| format!("Failed to parse stored messages under {key}")),
        None => Ok(Vec::new()),
    }
}

pub fn save_messages(store: &dyn Store, url: &str, messages: &[ConversationMessage]) -> Result<()> {
    let value = serde_json::to_value(messages).context("Failed to serialize messages")?;
    store.save(&history_key(url), &value)
}

pub fn clear_messages(store: &dyn Store, url: &str) -> Result<()> {
    store.remove(&history_key(url))
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, value: &Value) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// One pretty-printed JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under `${PAGECHAT_HOME}/store`.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(crate::config::paths::store_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'));
        if !valid {
            anyhow::bail!("Invalid store key: {key:?}");
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl Store for FileStore {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .map(Some)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn save(&self, key: &str, value: &Value) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create directory {}", self.dir.display()))?;

        let contents = serde_json::to_string_pretty(value)
            .with_context(|| format!("Failed to serialize value for {key}"))?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, contents)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;
        debug!(key, path = %path.display(), "store entry saved");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::provider::Role;

    #[test]
    fn test_history_key_is_lossy() {
        assert_eq!(
            history_key("https://example.com/a-b?c=1"),
            "messages_example_com_a_b_c_1"
        );
        assert_eq!(history_key("http://example.com/"), "messages_example_com_");
        // Distinct URLs collide.
        assert_eq!(
            history_key("https://example.com/a-b"),
            history_key("https://example.com/a_b")
        );
        assert_eq!(
            history_key("https://example.com/a"),
            history_key("http://example.com/a")
        );
    }

    #[test]
    fn test_history_key_is_truncated() {
        let url = format!("https://example.com/{}", "x".repeat(500));
        let key = history_key(&url);
        assert_eq!(key.len(), HISTORY_PREFIX.len() + 100);
    }

    #[test]
    fn test_history_key_replaces_non_ascii_per_char() {
        assert_eq!(history_key("https://é.fr"), "messages___fr");
    }

    #[test]
    fn test_history_key_v2_distinguishes_urls() {
        let a = history_key_v2("https://example.com/a-b");
        let b = history_key_v2("https://example.com/a_b");
        assert_ne!(a, b);
        assert_eq!(a.len(), HISTORY_PREFIX.len() + 64);
        assert_eq!(
            history_key_v2(""),
            "messages_e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_memory_store_round_trip_and_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.load("k").unwrap(), None);
        store.save("k", &json!({"a": 1})).unwrap();
        assert_eq!(store.load("k").unwrap(), Some(json!({"a": 1})));
        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.load("k").unwrap(), None);
    }

    #[test]
    fn test_file_store_persists_messages() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("store"));
        let url = "https://example.com/page";
        let messages = vec![
            ConversationMessage::new(Role::User, "hi"),
            ConversationMessage::new(Role::Assistant, "hello"),
        ];

        assert!(load_messages(&store, url).unwrap().is_empty());
        save_messages(&store, url, &messages).unwrap();

        let file = dir.path().join("store").join("messages_example_com_page.json");
        assert!(file.exists());
        let reopened = FileStore::new(dir.path().join("store"));
        assert_eq!(load_messages(&reopened, url).unwrap(), messages);

        clear_messages(&reopened, url).unwrap();
        assert!(!file.exists());
        assert!(load_messages(&reopened, url).unwrap().is_empty());
    }

    #[test]
    fn test_stored_message_shape() {
        let store = MemoryStore::new();
        let message = ConversationMessage {
            role: Role::Assistant,
            content: "x".to_string(),
            timestamp: 1_700_000_000_000,
        };
        save_messages(&store, "https://a.b", &[message]).unwrap();
        assert_eq!(
            store.load("messages_a_b").unwrap(),
            Some(json!([{"role": "assistant", "content": "x", "timestamp": 1_700_000_000_000_i64}]))
        );
    }

    #[test]
    fn test_file_store_rejects_path_like_keys() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.save("../escape", &json!(1)).is_err());
        assert!(store.load("").is_err());
    }

    #[test]
    fn test_corrupt_file_reports_path() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        fs::write(dir.path().join("preferences.json"), "{not json").unwrap();
        let err = store.load("preferences").unwrap_err();
        assert!(format!("{err:#}").contains("preferences.json"));
    }
}
