//! Persistence: save and load engine state to a JSON file.
//! A restarted process resumes with the same transactions, transcripts, and ratings.

use crate::store::StoreSnapshot;
use crate::types::{ChatMessage, Rating};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Full persisted state.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct PersistedState {
    pub store: StoreSnapshot,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub ratings: Vec<Rating>,
}

/// File-based persistence: one JSON file. Save after state changes; load on startup.
/// Clones share one writer lock, so concurrent saves never interleave. Blocking I/O;
/// async callers run it on the blocking pool.
#[derive(Clone, Debug)]
pub struct FilePersistence {
    path: std::path::PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FilePersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Writes to a sibling temp file, then renames over the target.
    pub fn save(&self, state: &PersistedState) -> Result<(), String> {
        self.save_with(|| state.clone())
    }

    /// Takes the snapshot and writes it under one lock, so a later snapshot is
    /// never overwritten by an earlier one.
    pub fn save_with(&self, snapshot: impl FnOnce() -> PersistedState) -> Result<(), String> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let json = serde_json::to_string_pretty(&snapshot()).map_err(|e| e.to_string())?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(|e| e.to_string())?;
        std::fs::rename(&tmp, &self.path).map_err(|e| e.to_string())
    }

    /// Returns `Ok(None)` if the file does not exist.
    pub fn load(&self) -> Result<Option<PersistedState>, String> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.to_string()),
        };
        let state: PersistedState = serde_json::from_str(&data).map_err(|e| e.to_string())?;
        Ok(Some(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn missing_file_loads_as_none() {
        let p = FilePersistence::new(std::env::temp_dir().join("offset_exchange_missing_state.json"));
        assert!(p.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join(format!("offset_exchange_state_{}.json", std::process::id()));
        let p = FilePersistence::new(&path);
        let state = PersistedState {
            store: StoreSnapshot {
                next_id: 7,
                transactions: Vec::new(),
            },
            ..Default::default()
        };
        p.save(&state).unwrap();
        let loaded = p.load().unwrap().unwrap();
        assert_eq!(loaded.store.next_id, 7);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn concurrent_saves_keep_the_latest_snapshot() {
        let path = std::env::temp_dir().join(format!("offset_exchange_race_{}.json", std::process::id()));
        let p = FilePersistence::new(&path);
        let version = Arc::new(AtomicU64::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let p = p.clone();
                let version = Arc::clone(&version);
                std::thread::spawn(move || {
                    p.save_with(|| PersistedState {
                        store: StoreSnapshot {
                            next_id: version.fetch_add(1, Ordering::SeqCst) + 1,
                            transactions: Vec::new(),
                        },
                        ..Default::default()
                    })
                    .unwrap()
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(p.load().unwrap().unwrap().store.next_id, 8);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("offset_exchange_corrupt_{}.json", std::process::id()));
        std::fs::write(&path, "{ not json").unwrap();
        let p = FilePersistence::new(&path);
        assert!(p.load().is_err());
        let _ = std::fs::remove_file(&path);
    }
}
