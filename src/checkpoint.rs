//! Resume cursor for the batch indexer.
//!
//! Persisted as pretty JSON. All I/O here is soft: a missing or unreadable
//! file means "start from scratch", and a failed write is logged while
//! indexing carries on without a durable resume point for that stride.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default)]
    pub quran_chapter: u32,
    #[serde(default)]
    pub quran_verse: u32,
    #[serde(default)]
    pub quran_done: bool,
    #[serde(default)]
    pub names_done: bool,
    /// 1-based position of the book in the collection.
    #[serde(default)]
    pub hadith_book: u32,
    #[serde(default)]
    pub hadith_num: u32,
    #[serde(default)]
    pub hadith_done: bool,
    #[serde(default)]
    pub tafsir_done: bool,
}

impl Checkpoint {
    pub fn all_done(&self) -> bool {
        self.quran_done && self.names_done && self.tafsir_done && self.hadith_done
    }
}

/// Where checkpoints live. `None` disables persistence (fresh rebuilds).
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: Option<PathBuf>,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// An unfinished run left a resume point behind.
    pub fn exists(&self) -> bool {
        self.path.as_deref().is_some_and(Path::exists)
    }

    pub fn load(&self) -> Checkpoint {
        let Some(path) = &self.path else {
            return Checkpoint::default();
        };
        match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!("ignoring unreadable checkpoint {}: {}", path.display(), e);
                Checkpoint::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Checkpoint::default(),
            Err(e) => {
                tracing::warn!("failed to read checkpoint {}: {}", path.display(), e);
                Checkpoint::default()
            }
        }
    }

    /// Persist `cp`. Returns whether the write succeeded.
    pub fn save(&self, cp: &Checkpoint) -> bool {
        let Some(path) = &self.path else {
            return false;
        };
        let result = serde_json::to_vec_pretty(cp)
            .map_err(std::io::Error::other)
            .and_then(|bytes| {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, bytes)
            });
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("failed to write checkpoint {}: {}", path.display(), e);
                false
            }
        }
    }

    pub fn clear(&self) {
        if let Some(path) = &self.path {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!("removed checkpoint {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("failed to remove checkpoint {}: {}", path.display(), e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_default() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path().join("cp.json"));
        assert_eq!(store.load(), Checkpoint::default());
    }

    #[test]
    fn test_corrupt_file_is_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cp.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(CheckpointStore::new(&path).load(), Checkpoint::default());
    }

    #[test]
    fn test_save_load_clear() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path().join("nested").join("cp.json"));
        let cp = Checkpoint {
            quran_chapter: 2,
            quran_verse: 150,
            quran_done: false,
            names_done: true,
            ..Checkpoint::default()
        };
        assert!(store.save(&cp));
        assert_eq!(store.load(), cp);

        let raw = std::fs::read_to_string(store.path().unwrap()).unwrap();
        assert!(raw.contains("\"quran_verse\": 150"));

        store.clear();
        assert!(!store.path().unwrap().exists());
        assert_eq!(store.load(), Checkpoint::default());
    }

    #[test]
    fn test_disabled_store() {
        let store = CheckpointStore::disabled();
        assert!(!store.save(&Checkpoint::default()));
        store.clear();
        assert_eq!(store.load(), Checkpoint::default());
    }

    #[test]
    fn test_all_done() {
        let mut cp = Checkpoint {
            quran_done: true,
            names_done: true,
            tafsir_done: true,
            ..Checkpoint::default()
        };
        assert!(!cp.all_done());
        cp.hadith_done = true;
        assert!(cp.all_done());
    }
}
