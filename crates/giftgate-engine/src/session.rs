#![forbid(unsafe_code)]

//! Session-scoped state records and their storage backends.
//!
//! Two JSON records are persisted per browser session: [`GiftState`] (the
//! tracker's view of what was shown and selected) and [`SessionSkip`] (the
//! per-session opt-out). Storage goes through the [`SessionStore`] trait:
//! an in-memory backend is always available, a JSON file backend sits
//! behind the `session-file` feature.
//!
//! Loads are corruption-tolerant: a missing or unreadable record degrades
//! to defaults rather than failing, since losing advisory promotion state
//! must never break the host page.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::warn;

use giftgate_core::cart::VariantId;
use giftgate_core::tier::Tier;

use crate::error::{StorageError, StorageResult};

// ─────────────────────────────────────────────────────────────────────────
// Storage backends
// ─────────────────────────────────────────────────────────────────────────

/// Key/value storage scoped to one browser session.
///
/// Implementations must be thread-safe; the engine may touch the store
/// from a background fetch thread.
pub trait SessionStore: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Read a record, `None` if absent.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Write or replace a record.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Delete a record if present.
    fn remove(&self, key: &str) -> StorageResult<()>;
}

/// In-memory session store for tests and ephemeral embedding.
#[derive(Default)]
pub struct MemorySessionStore {
    data: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn name(&self) -> &str {
        "MemorySessionStore"
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let guard = self
            .data
            .read()
            .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
        guard.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
        guard.remove(key);
        Ok(())
    }
}

impl fmt::Debug for MemorySessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.data.read().map(|g| g.len()).unwrap_or(0);
        f.debug_struct("MemorySessionStore")
            .field("records", &count)
            .finish()
    }
}

#[cfg(feature = "session-file")]
mod file_store {
    use super::*;
    use std::fs::{self, File};
    use std::io::{BufReader, BufWriter, Write};
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    /// On-disk format: a single JSON object of records.
    #[derive(Serialize, Deserialize, Default)]
    struct StoreFile {
        format_version: u32,
        records: HashMap<String, String>,
    }

    impl StoreFile {
        const FORMAT_VERSION: u32 = 1;
    }

    /// JSON-file session store with atomic write-rename persistence.
    ///
    /// Writes go to `{path}.tmp`, are flushed, then renamed over the
    /// target so a crash mid-write never leaves a half-written file.
    pub struct FileSessionStore {
        path: PathBuf,
        // Serializes read-modify-write cycles across threads.
        lock: Mutex<()>,
    }

    impl FileSessionStore {
        #[must_use]
        pub fn new(path: impl AsRef<Path>) -> Self {
            Self {
                path: path.as_ref().to_path_buf(),
                lock: Mutex::new(()),
            }
        }

        fn load_file(&self) -> StorageResult<StoreFile> {
            if !self.path.exists() {
                return Ok(StoreFile {
                    format_version: StoreFile::FORMAT_VERSION,
                    records: HashMap::new(),
                });
            }
            let file = File::open(&self.path)?;
            serde_json::from_reader(BufReader::new(file))
                .map_err(|e| StorageError::Corruption(e.to_string()))
        }

        fn save_file(&self, store: &StoreFile) -> StorageResult<()> {
            let tmp = self.path.with_extension("tmp");
            {
                let file = File::create(&tmp)?;
                let mut writer = BufWriter::new(file);
                serde_json::to_writer(&mut writer, store)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                writer.flush()?;
            }
            fs::rename(&tmp, &self.path)?;
            Ok(())
        }
    }

    impl SessionStore for FileSessionStore {
        fn name(&self) -> &str {
            "FileSessionStore"
        }

        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            let _guard = self
                .lock
                .lock()
                .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
            Ok(self.load_file()?.records.get(key).cloned())
        }

        fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            let _guard = self
                .lock
                .lock()
                .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
            let mut store = self.load_file().unwrap_or_default();
            store.format_version = StoreFile::FORMAT_VERSION;
            store.records.insert(key.to_owned(), value.to_owned());
            self.save_file(&store)
        }

        fn remove(&self, key: &str) -> StorageResult<()> {
            let _guard = self
                .lock
                .lock()
                .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
            let mut store = self.load_file().unwrap_or_default();
            store.records.remove(key);
            self.save_file(&store)
        }
    }
}

#[cfg(feature = "session-file")]
pub use file_store::FileSessionStore;

// ─────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────

/// Gifts selected so far, grouped by the tier whose popup confirmed them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedGifts {
    #[serde(default)]
    pub tier1: Vec<VariantId>,
    #[serde(default)]
    pub tier2: Vec<VariantId>,
    #[serde(default)]
    pub tier3: Vec<VariantId>,
}

impl SelectedGifts {
    #[must_use]
    pub fn for_tier(&self, tier: Tier) -> &[VariantId] {
        match tier {
            Tier::One => &self.tier1,
            Tier::Two => &self.tier2,
            Tier::Three => &self.tier3,
        }
    }

    pub fn for_tier_mut(&mut self, tier: Tier) -> &mut Vec<VariantId> {
        match tier {
            Tier::One => &mut self.tier1,
            Tier::Two => &mut self.tier2,
            Tier::Three => &mut self.tier3,
        }
    }

    /// Total gifts selected across all tiers.
    #[must_use]
    pub fn count(&self) -> usize {
        self.tier1.len() + self.tier2.len() + self.tier3.len()
    }

    /// All selected ids in tier order.
    #[must_use]
    pub fn all(&self) -> Vec<VariantId> {
        let mut ids = Vec::with_capacity(self.count());
        for tier in Tier::ALL {
            ids.extend_from_slice(self.for_tier(tier));
        }
        ids
    }

    /// Retain only selections present in `live`; returns the dropped ids.
    pub fn retain_present(&mut self, live: &[VariantId]) -> Vec<VariantId> {
        let mut dropped = Vec::new();
        for tier in Tier::ALL {
            let list = self.for_tier_mut(tier);
            list.retain(|id| {
                let keep = live.contains(id);
                if !keep {
                    dropped.push(id.clone());
                }
                keep
            });
        }
        dropped
    }
}

/// The tracker's persisted per-session state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftState {
    pub session_id: String,
    /// Highest tier whose popup has been shown this session, if any.
    ///
    /// A single monotonic watermark rather than per-tier flags: a tier's
    /// popup is due exactly when the tier is crossed and sits above the
    /// watermark, so duplicate or reordered total events can never re-show
    /// a lower tier after a higher one.
    #[serde(default)]
    pub shown_watermark: Option<Tier>,
    #[serde(default)]
    pub selected: SelectedGifts,
    #[serde(default)]
    pub last_total_cents: u64,
    /// Cooperative guard against re-entrant popup opens.
    #[serde(default)]
    pub is_processing: bool,
}

impl GiftState {
    /// Fresh state with a newly generated session id.
    #[must_use]
    pub fn new_session() -> Self {
        Self {
            session_id: generate_session_id(),
            shown_watermark: None,
            selected: SelectedGifts::default(),
            last_total_cents: 0,
            is_processing: false,
        }
    }

    /// Whether a tier's popup has already been shown this session.
    #[must_use]
    pub fn is_shown(&self, tier: Tier) -> bool {
        self.shown_watermark.is_some_and(|w| w >= tier)
    }

    /// Advance the watermark to at least `tier`.
    pub fn mark_shown(&mut self, tier: Tier) {
        self.shown_watermark = Some(self.shown_watermark.map_or(tier, |w| w.max(tier)));
    }

    /// Lower the watermark to `floor` (or clear it) after a demotion, so
    /// re-crossing upward re-prompts.
    pub fn lower_watermark(&mut self, floor: Option<Tier>) {
        self.shown_watermark = match (self.shown_watermark, floor) {
            (Some(w), Some(f)) => Some(w.min(f)),
            (Some(_), None) => None,
            (None, _) => None,
        };
    }
}

/// A per-session opt-out of further automatic popups.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSkip {
    pub session_id: String,
    /// Unix timestamp (seconds) when the skip was recorded.
    pub timestamp: u64,
}

/// Generate a session id: unix nanos plus a process-local counter,
/// base-36 encoded. Unique within a session scope without a RNG.
#[must_use]
pub fn generate_session_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", to_base36(nanos), to_base36(seq))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_owned();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ascii")
}

// ─────────────────────────────────────────────────────────────────────────
// Typed record access
// ─────────────────────────────────────────────────────────────────────────

/// Typed wrapper over a [`SessionStore`] for the two tracker records.
pub struct StateStore {
    store: Arc<dyn SessionStore>,
    state_key: String,
    skip_key: String,
}

impl StateStore {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, state_key: String, skip_key: String) -> Self {
        Self {
            store,
            state_key,
            skip_key,
        }
    }

    /// Load the gift state, degrading to a fresh session on any failure.
    #[must_use]
    pub fn load_state(&self) -> GiftState {
        match self.store.get(&self.state_key) {
            Ok(Some(raw)) => match serde_json::from_str::<GiftState>(&raw) {
                Ok(mut state) => {
                    if state.session_id.is_empty() {
                        state.session_id = generate_session_id();
                    }
                    // A stale processing flag would wedge the popup guard.
                    state.is_processing = false;
                    state
                }
                Err(e) => {
                    warn!(store = self.store.name(), error = %e, "gift state corrupt, resetting");
                    GiftState::new_session()
                }
            },
            Ok(None) => GiftState::new_session(),
            Err(e) => {
                warn!(store = self.store.name(), error = %e, "gift state unreadable, resetting");
                GiftState::new_session()
            }
        }
    }

    /// Persist the gift state. Failures are logged and swallowed.
    pub fn save_state(&self, state: &GiftState) {
        let raw = match serde_json::to_string(state) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "gift state serialization failed");
                return;
            }
        };
        if let Err(e) = self.store.set(&self.state_key, &raw) {
            warn!(store = self.store.name(), error = %e, "gift state save failed");
        }
    }

    /// Record a skip for the given session.
    pub fn record_skip(&self, session_id: &str) {
        let skip = SessionSkip {
            session_id: session_id.to_owned(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        };
        match serde_json::to_string(&skip) {
            Ok(raw) => {
                if let Err(e) = self.store.set(&self.skip_key, &raw) {
                    warn!(store = self.store.name(), error = %e, "session skip save failed");
                }
            }
            Err(e) => warn!(error = %e, "session skip serialization failed"),
        }
    }

    /// Whether a skip is recorded for this session id.
    #[must_use]
    pub fn is_skipped(&self, session_id: &str) -> bool {
        match self.store.get(&self.skip_key) {
            Ok(Some(raw)) => serde_json::from_str::<SessionSkip>(&raw)
                .map(|skip| skip.session_id == session_id)
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Remove the skip record (e.g. when the host clears storage).
    pub fn clear_skip(&self) {
        if let Err(e) = self.store.remove(&self.skip_key) {
            warn!(store = self.store.name(), error = %e, "session skip clear failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_store() -> StateStore {
        StateStore::new(
            Arc::new(MemorySessionStore::new()),
            "tiered_gift_state".into(),
            "tiered_gift_session_skip".into(),
        )
    }

    #[test]
    fn load_generates_session_on_first_use() {
        let store = state_store();
        let state = store.load_state();
        assert!(!state.session_id.is_empty());
        assert_eq!(state.shown_watermark, None);
        assert_eq!(state.selected.count(), 0);
    }

    #[test]
    fn state_round_trips() {
        let store = state_store();
        let mut state = store.load_state();
        state.mark_shown(Tier::Two);
        state.selected.for_tier_mut(Tier::One).push("100".into());
        state.last_total_cents = 6000;
        store.save_state(&state);

        let loaded = store.load_state();
        assert_eq!(loaded.session_id, state.session_id);
        assert_eq!(loaded.shown_watermark, Some(Tier::Two));
        assert_eq!(
            loaded.selected.for_tier(Tier::One),
            std::slice::from_ref(&VariantId::new("100"))
        );
        assert_eq!(loaded.last_total_cents, 6000);
    }

    #[test]
    fn processing_flag_never_survives_a_load() {
        let store = state_store();
        let mut state = store.load_state();
        state.is_processing = true;
        store.save_state(&state);
        assert!(!store.load_state().is_processing);
    }

    #[test]
    fn corrupt_state_resets_to_fresh_session() {
        let backend = Arc::new(MemorySessionStore::new());
        backend.set("tiered_gift_state", "{not json").unwrap();
        let store = StateStore::new(
            backend,
            "tiered_gift_state".into(),
            "tiered_gift_session_skip".into(),
        );
        let state = store.load_state();
        assert!(!state.session_id.is_empty());
        assert_eq!(state.selected.count(), 0);
    }

    #[test]
    fn skip_matches_only_its_session() {
        let store = state_store();
        store.record_skip("session-a");
        assert!(store.is_skipped("session-a"));
        assert!(!store.is_skipped("session-b"));
        store.clear_skip();
        assert!(!store.is_skipped("session-a"));
    }

    #[test]
    fn watermark_is_monotone_and_lowerable() {
        let mut state = GiftState::new_session();
        assert!(!state.is_shown(Tier::One));
        state.mark_shown(Tier::Two);
        assert!(state.is_shown(Tier::One));
        assert!(state.is_shown(Tier::Two));
        assert!(!state.is_shown(Tier::Three));

        // Marking a lower tier never regresses the watermark.
        state.mark_shown(Tier::One);
        assert!(state.is_shown(Tier::Two));

        state.lower_watermark(Some(Tier::One));
        assert!(state.is_shown(Tier::One));
        assert!(!state.is_shown(Tier::Two));

        state.lower_watermark(None);
        assert!(!state.is_shown(Tier::One));
    }

    #[test]
    fn retain_present_reports_dropped_ids() {
        let mut selected = SelectedGifts::default();
        selected.for_tier_mut(Tier::One).push("100".into());
        selected.for_tier_mut(Tier::Two).push("200".into());
        let dropped = selected.retain_present(&["200".into()]);
        assert_eq!(dropped, vec![VariantId::new("100")]);
        assert_eq!(selected.count(), 1);
    }

    #[test]
    fn session_ids_are_unique() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_ne!(a, b);
    }

    #[cfg(feature = "session-file")]
    #[test]
    fn file_store_round_trips_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        {
            let store = FileSessionStore::new(&path);
            store.set("k", "v").unwrap();
            assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        }
        let reopened = FileSessionStore::new(&path);
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("v"));
        reopened.remove("k").unwrap();
        assert_eq!(reopened.get("k").unwrap(), None);
    }
}
