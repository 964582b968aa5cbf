//! Persisted alert deduplication
//!
//! A [`DedupStore`] remembers which signals were delivered, keyed by
//! [`DedupKey`], and when. Alongside the entries it keeps a per-stream
//! watermark: the newest bar identity ever recorded for a
//! (symbol, scope, kind, zone) stream. Entries age out through [`DedupStore::gc`];
//! watermarks do not, so expiring an entry never lets its bar alert again.
//!
//! The file is a JSON object written atomically (temp file, then rename).

use std::{
    collections::BTreeMap,
    fmt, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::{
    signal::{Scope, SignalKind},
    zone::Zone,
    Result, SignalError,
};

const SEPARATOR: char = '|';

/// Identity of one delivered alert: `symbol|scope|kind|zone|bar_identity`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    pub symbol: String,
    pub scope: Scope,
    pub kind: SignalKind,
    pub zone: Zone,
    pub bar_identity: i64,
}

impl DedupKey {
    /// The key without its bar: `symbol|scope|kind|zone`
    pub fn stream_id(&self) -> String {
        format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            self.symbol, self.scope, self.kind, self.zone
        )
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.stream_id(), self.bar_identity)
    }
}

impl FromStr for DedupKey {
    type Err = SignalError;

    /// Parses from the right so that the symbol may itself contain `|`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || SignalError::InvalidKey(s.to_string());
        let mut parts = s.rsplitn(5, SEPARATOR);

        let bar_identity = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let zone = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let kind = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let scope = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let symbol = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;

        Ok(Self {
            symbol: symbol.to_string(),
            scope,
            kind,
            zone,
            bar_identity,
        })
    }
}

impl Serialize for DedupKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DedupKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

// ============================================================
// ON-DISK FORMAT
// ============================================================

#[derive(Serialize)]
struct SnapshotRef<'a> {
    entries: &'a BTreeMap<DedupKey, i64>,
    watermarks: &'a BTreeMap<String, i64>,
}

/// Unknown top-level fields are ignored. A legacy map never matches because
/// its values are numbers, not an `entries` object.
#[derive(Deserialize)]
struct Snapshot {
    entries: BTreeMap<String, i64>,
    #[serde(default)]
    watermarks: BTreeMap<String, i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredState {
    Snapshot(Snapshot),
    /// Flat `key -> last-sent seconds` map with no watermarks
    Legacy(BTreeMap<String, i64>),
}

// ============================================================
// STORE
// ============================================================

/// Single-writer dedup state, optionally backed by a file
#[derive(Debug, Clone, Default)]
pub struct DedupStore {
    path: Option<PathBuf>,
    entries: BTreeMap<DedupKey, i64>,
    watermarks: BTreeMap<String, i64>,
    dirty: bool,
}

impl DedupStore {
    /// Empty store that saves to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Empty store that never touches disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load from `path`. A missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path: PathBuf = path.into();
        let mut store = Self::new(path.clone());

        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no dedup state yet, starting empty");
                return Ok(store);
            }
            Err(e) => return Err(e.into()),
        };

        let (entries, watermarks) = match serde_json::from_slice::<StoredState>(&raw)? {
            StoredState::Snapshot(s) => (s.entries, s.watermarks),
            StoredState::Legacy(entries) => {
                info!(path = %path.display(), "converting legacy dedup state");
                (entries, BTreeMap::new())
            }
        };

        let mut skipped = 0usize;
        for (raw_key, ts) in entries {
            match raw_key.parse::<DedupKey>() {
                Ok(key) => store.insert(key, ts),
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(path = %path.display(), skipped, "dropped unreadable dedup keys");
        }
        for (stream, bar) in watermarks {
            store.raise_watermark(stream, bar);
        }

        debug!(path = %path.display(), entries = store.len(), "loaded dedup state");
        store.dirty = false;
        Ok(store)
    }

    /// Like [`load`](Self::load), but a corrupt or unreadable file logs a
    /// warning and yields an empty store for the same path.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::load(path.clone()) {
            Ok(store) => store,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "dedup state unreadable, starting empty");
                Self::new(path)
            }
        }
    }

    /// True when `key` has not been delivered and its bar is newer than
    /// anything delivered on the same stream.
    pub fn should_emit(&self, key: &DedupKey) -> bool {
        if self.entries.contains_key(key) {
            return false;
        }
        match self.watermarks.get(&key.stream_id()) {
            Some(&seen) => key.bar_identity > seen,
            None => true,
        }
    }

    /// Mark `key` as delivered at Unix second `sent_at`
    pub fn record(&mut self, key: DedupKey, sent_at: i64) {
        self.insert(key, sent_at);
        self.dirty = true;
    }

    /// Drop entries older than `retention_secs` relative to `now`.
    /// Returns how many were removed.
    pub fn gc(&mut self, retention_secs: u64, now: i64) -> usize {
        let retention = i64::try_from(retention_secs).unwrap_or(i64::MAX);
        let before = self.entries.len();
        self.entries.retain(|_, sent_at| now.saturating_sub(*sent_at) <= retention);

        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "dedup gc");
            self.dirty = true;
        }
        removed
    }

    /// Write the state atomically. In-memory stores succeed without I/O.
    /// On failure the in-memory state is kept and stays dirty.
    pub fn save(&mut self) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            self.dirty = false;
            return Ok(());
        };

        let snapshot = SnapshotRef {
            entries: &self.entries,
            watermarks: &self.watermarks,
        };
        let body = serde_json::to_vec_pretty(&snapshot)?;

        let tmp = temp_path(path);
        fs::write(&tmp, body)?;
        fs::rename(&tmp, path)?;

        debug!(path = %path.display(), entries = self.entries.len(), "saved dedup state");
        self.dirty = false;
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Unix second `key` was last delivered, if still retained
    pub fn last_sent(&self, key: &DedupKey) -> Option<i64> {
        self.entries.get(key).copied()
    }

    /// Newest bar identity recorded for a stream
    pub fn watermark(&self, stream_id: &str) -> Option<i64> {
        self.watermarks.get(stream_id).copied()
    }

    fn insert(&mut self, key: DedupKey, sent_at: i64) {
        self.raise_watermark(key.stream_id(), key.bar_identity);
        self.entries.insert(key, sent_at);
    }

    fn raise_watermark(&mut self, stream: String, bar: i64) {
        let mark = self.watermarks.entry(stream).or_insert(bar);
        *mark = (*mark).max(bar);
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Current Unix time in seconds
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
