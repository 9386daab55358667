//! Key-value storage of user-supplied base configs.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SublinkError};
use crate::pipeline::{render_nodes, ConvertRequest, TargetKind};
use crate::rules::RuleSelection;
use crate::types::Node;

/// Stored base configs expire after 30 days.
pub const BASE_CONFIG_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 30);

const CONFIG_ID_LEN: usize = 8;

/// Saved configs live under `config:<id>`.
const CONFIG_PREFIX: &str = "config:";

/// A key-value store with optional per-key expiry.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;
}

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory [`KvStore`].
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some(entry) => entry.is_expired(Instant::now()),
            None => return Ok(None),
        };
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let now = Instant::now();
        let expires_at = ttl.map(|ttl| now + ttl);
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| !entry.is_expired(now));
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Validate and store a base config, returning its id `<target>_<random>`.
///
/// Clash YAML is stored as JSON; sing-box must be a JSON object; Surge
/// profiles are stored as text.
pub fn save_base_config(store: &dyn KvStore, target: TargetKind, content: &str) -> Result<String> {
    let stored = match target {
        TargetKind::SingBox => {
            let value: serde_json::Value = serde_json::from_str(content)?;
            if !value.is_object() {
                return Err(SublinkError::ConfigValidation(
                    "sing-box base config must be a JSON object".to_string(),
                ));
            }
            serde_json::to_string(&value)?
        }
        TargetKind::Clash => {
            let value: serde_yaml::Value = serde_yaml::from_str(content)?;
            if !value.is_mapping() {
                return Err(SublinkError::ConfigValidation(
                    "clash base config must be a YAML mapping".to_string(),
                ));
            }
            serde_json::to_string(&value)?
        }
        TargetKind::Surge => {
            if !content.lines().any(|l| l.trim().starts_with('[')) {
                return Err(SublinkError::ConfigValidation(
                    "surge base config has no [Section]".to_string(),
                ));
            }
            content.to_string()
        }
    };

    let id = new_id(target);
    store.put(&id, stored.into_bytes(), Some(BASE_CONFIG_TTL))?;
    debug!(id = %id, "stored base config");
    Ok(id)
}

/// Load a stored base config as text, `None` when absent or expired.
pub fn load_base_config(store: &dyn KvStore, id: &str) -> Result<Option<String>> {
    match store.get(id)? {
        Some(bytes) => String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| SublinkError::Store(format!("base config {} is not UTF-8: {}", id, e))),
        None => Ok(None),
    }
}

fn new_id(target: TargetKind) -> String {
    format!(
        "{}_{}",
        target,
        Alphanumeric.sample_string(&mut rand::rng(), CONFIG_ID_LEN)
    )
}

/// A saved subscription: its nodes, how to render them, and the last
/// rendered document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedConfig {
    pub id: String,
    pub target: TargetKind,
    /// Base document text the proxies, groups and rules are merged into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default)]
    pub selection: RuleSelection,
    pub nodes: Vec<Node>,
    pub content: String,
}

impl SavedConfig {
    fn render(&self) -> Result<String> {
        let mut request =
            ConvertRequest::new(self.target, Vec::new()).with_selection(self.selection.clone());
        if let Some(base) = &self.base {
            request = request.with_base(base.as_str());
        }
        render_nodes(&request, &self.nodes)
    }

    fn store(&self, store: &dyn KvStore) -> Result<()> {
        let bytes = serde_json::to_vec(self)?;
        store.put(&config_key(&self.id), bytes, Some(BASE_CONFIG_TTL))
    }
}

fn config_key(id: &str) -> String {
    format!("{}{}", CONFIG_PREFIX, id)
}

/// Render `nodes` and save them with the document, returning the record.
///
/// Fails without storing anything when the document cannot be built, e.g.
/// when the target can express none of the nodes.
pub fn save_config(
    store: &dyn KvStore,
    target: TargetKind,
    base: Option<&str>,
    selection: RuleSelection,
    nodes: Vec<Node>,
) -> Result<SavedConfig> {
    let mut config = SavedConfig {
        id: new_id(target),
        target,
        base: base.filter(|b| !b.trim().is_empty()).map(str::to_string),
        selection,
        nodes,
        content: String::new(),
    };
    config.content = config.render()?;
    config.store(store)?;
    debug!(id = %config.id, nodes = config.nodes.len(), "saved config");
    Ok(config)
}

/// Load a saved config, `None` when absent or expired.
pub fn load_config(store: &dyn KvStore, id: &str) -> Result<Option<SavedConfig>> {
    match store.get(&config_key(id))? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Merge `new_nodes` into a saved config and re-render it.
///
/// Nodes are keyed by tag: a new node whose tag is already saved is
/// dropped and the saved one kept.
pub fn update_config_nodes(
    store: &dyn KvStore,
    id: &str,
    new_nodes: &[Node],
) -> Result<SavedConfig> {
    let mut config = load_config(store, id)?
        .ok_or_else(|| SublinkError::Store(format!("config {} not found", id)))?;

    let mut tags: HashSet<String> = config.nodes.iter().map(|n| n.tag().to_string()).collect();
    let before = config.nodes.len();
    for node in new_nodes {
        if tags.insert(node.tag().to_string()) {
            config.nodes.push(node.clone());
        }
    }

    config.content = config.render()?;
    config.store(store)?;
    debug!(
        id,
        added = config.nodes.len() - before,
        total = config.nodes.len(),
        "updated config nodes"
    );
    Ok(config)
}
