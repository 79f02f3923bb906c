use lru::LruCache;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::warn;

use crate::persistence::record::CharacterRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid character name '{0}'")]
    InvalidName(String),
    #[error("{action} {path} failed: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("character file {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },
    #[error("could not encode {name}: {message}")]
    Encode { name: String, message: String },
}

/// The persistence boundary. Safe to call from any session thread.
pub trait CharacterStore: Send + Sync {
    fn load(&self, name: &str) -> Result<Option<CharacterRecord>, StoreError>;
    fn save(&self, record: &CharacterRecord) -> Result<(), StoreError>;
    fn exists(&self, name: &str) -> bool;
    /// Saves a brand new character. `Ok(false)` when the name is already taken,
    /// in which case nothing is written.
    fn create(&self, record: &CharacterRecord) -> Result<bool, StoreError>;
}

fn storage_key(name: &str) -> Result<String, StoreError> {
    if name.is_empty() || !name.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(name.to_ascii_lowercase())
}

/// One YAML file per character, previous version kept as `.bak`.
pub struct FileCharacterStore {
    dir: PathBuf,
    cache: Mutex<LruCache<String, CharacterRecord>>,
}

impl FileCharacterStore {
    pub fn new(dir: impl Into<PathBuf>, cache_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            dir: dir.into(),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.yml", key))
    }

    fn backup_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.yml.bak", key))
    }

    fn read_record(path: &Path) -> Result<Option<CharacterRecord>, StoreError> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    action: "read",
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_yaml::from_str(&data)
            .map(Some)
            .map_err(|err| StoreError::Corrupt {
                path: path.to_path_buf(),
                message: err.to_string(),
            })
    }

    fn read_from_disk(&self, key: &str) -> Result<Option<CharacterRecord>, StoreError> {
        let path = self.path(key);
        match Self::read_record(&path) {
            Ok(Some(record)) => Ok(Some(record)),
            Ok(None) => Self::read_record(&self.backup_path(key)),
            Err(err) => match Self::read_record(&self.backup_path(key)) {
                Ok(Some(record)) => {
                    warn!(path = %path.display(), error = %err, "character file unreadable, using backup");
                    Ok(Some(record))
                }
                _ => Err(err),
            },
        }
    }
}

impl CharacterStore for FileCharacterStore {
    fn load(&self, name: &str) -> Result<Option<CharacterRecord>, StoreError> {
        let key = storage_key(name)?;
        {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(record) = cache.get(&key) {
                return Ok(Some(record.clone()));
            }
        }
        let record = self.read_from_disk(&key)?;
        if let Some(record) = &record {
            self.cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .put(key, record.clone());
        }
        Ok(record)
    }

    fn save(&self, record: &CharacterRecord) -> Result<(), StoreError> {
        let key = storage_key(&record.name)?;
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            action: "create",
            path: self.dir.clone(),
            source,
        })?;
        let data = serde_yaml::to_string(record).map_err(|err| StoreError::Encode {
            name: record.name.clone(),
            message: err.to_string(),
        })?;
        let path = self.path(&key);
        if path.exists() {
            let backup = self.backup_path(&key);
            fs::copy(&path, &backup).map_err(|source| StoreError::Io {
                action: "back up",
                path: backup,
                source,
            })?;
        }
        fs::write(&path, data).map_err(|source| StoreError::Io {
            action: "write",
            path: path.clone(),
            source,
        })?;
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key, record.clone());
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        let Ok(key) = storage_key(name) else {
            return false;
        };
        if self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key)
        {
            return true;
        }
        self.path(&key).exists() || self.backup_path(&key).exists()
    }

    fn create(&self, record: &CharacterRecord) -> Result<bool, StoreError> {
        let key = storage_key(&record.name)?;
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            action: "create",
            path: self.dir.clone(),
            source,
        })?;
        if self.backup_path(&key).exists() {
            return Ok(false);
        }
        let data = serde_yaml::to_string(record).map_err(|err| StoreError::Encode {
            name: record.name.clone(),
            message: err.to_string(),
        })?;
        let path = self.path(&key);
        // create_new makes the name claim atomic across sessions.
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
            Err(source) => {
                return Err(StoreError::Io {
                    action: "create",
                    path,
                    source,
                })
            }
        };
        if let Err(source) = file.write_all(data.as_bytes()).and_then(|()| file.sync_all()) {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(StoreError::Io {
                action: "write",
                path,
                source,
            });
        }
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key, record.clone());
        Ok(true)
    }
}

/// Keeps records for the life of the process.
#[derive(Debug, Default)]
pub struct MemoryCharacterStore {
    records: Mutex<HashMap<String, CharacterRecord>>,
}

impl MemoryCharacterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CharacterStore for MemoryCharacterStore {
    fn load(&self, name: &str) -> Result<Option<CharacterRecord>, StoreError> {
        let key = storage_key(name)?;
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned())
    }

    fn save(&self, record: &CharacterRecord) -> Result<(), StoreError> {
        let key = storage_key(&record.name)?;
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, record.clone());
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        storage_key(name).map_or(false, |key| {
            self.records
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(&key)
        })
    }

    fn create(&self, record: &CharacterRecord) -> Result<bool, StoreError> {
        let key = storage_key(&record.name)?;
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        match records.entry(key) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::room::Vnum;

    fn record(name: &str, gold: i64) -> CharacterRecord {
        let mut record = CharacterRecord::new(name, "secret".to_string());
        record.gold = gold;
        record.room = Some(Vnum(3001));
        record
    }

    #[test]
    fn file_store_round_trip_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCharacterStore::new(dir.path(), 4);
        assert!(!store.exists("Bob"));
        assert!(store.load("Bob").unwrap().is_none());

        store.save(&record("Bob", 10)).unwrap();
        assert!(dir.path().join("bob.yml").exists());
        assert!(store.exists("BOB"));

        let fresh = FileCharacterStore::new(dir.path(), 4);
        assert_eq!(fresh.load("bob").unwrap(), Some(record("Bob", 10)));
    }

    #[test]
    fn overwrite_keeps_a_backup_and_corrupt_primary_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCharacterStore::new(dir.path(), 4);
        store.save(&record("Bob", 10)).unwrap();
        store.save(&record("Bob", 20)).unwrap();
        assert!(dir.path().join("bob.yml.bak").exists());

        fs::write(dir.path().join("bob.yml"), "name: [unterminated").unwrap();
        let fresh = FileCharacterStore::new(dir.path(), 4);
        assert_eq!(fresh.load("Bob").unwrap().unwrap().gold, 10);
    }

    #[test]
    fn corrupt_file_without_backup_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bob.yml"), "gold: lots").unwrap();
        let store = FileCharacterStore::new(dir.path(), 4);
        assert!(matches!(store.load("Bob"), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn file_create_claims_a_name_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FileCharacterStore::new(dir.path(), 4));
        let claims: Vec<bool> = (0..8)
            .map(|gold| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || store.create(&record("Bob", gold)).unwrap())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();
        assert_eq!(claims.iter().filter(|claimed| **claimed).count(), 1);
        assert!(!dir.path().join("bob.yml.bak").exists());

        let winner = FileCharacterStore::new(dir.path(), 4).load("Bob").unwrap().unwrap();
        assert!(!store.create(&record("bob", 99)).unwrap());
        let fresh = FileCharacterStore::new(dir.path(), 4);
        assert_eq!(fresh.load("Bob").unwrap(), Some(winner));
    }

    #[test]
    fn memory_create_refuses_taken_names() {
        let store = MemoryCharacterStore::new();
        assert!(store.create(&record("Bob", 1)).unwrap());
        assert!(!store.create(&record("BOB", 2)).unwrap());
        assert_eq!(store.load("bob").unwrap().unwrap().gold, 1);
        assert!(matches!(
            store.create(&record("Bob2", 1)),
            Err(StoreError::InvalidName(_))
        ));
    }

    #[test]
    fn cache_serves_recent_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCharacterStore::new(dir.path(), 1);
        store.save(&record("Bob", 10)).unwrap();
        fs::remove_file(dir.path().join("bob.yml")).unwrap();
        assert_eq!(store.load("Bob").unwrap().unwrap().gold, 10);

        store.save(&record("Amy", 5)).unwrap();
        assert!(store.load("Bob").unwrap().is_none());
    }

    #[test]
    fn names_that_are_not_words_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCharacterStore::new(dir.path(), 4);
        assert!(matches!(
            store.save(&record("../etc", 0)),
            Err(StoreError::InvalidName(_))
        ));
        assert!(!store.exists("../etc"));
    }

    #[test]
    fn memory_store_behaves_like_a_store() {
        let store = MemoryCharacterStore::new();
        assert!(store.is_empty());
        store.save(&record("Bob", 3)).unwrap();
        assert!(store.exists("bob"));
        assert_eq!(store.load("BOB").unwrap().unwrap().gold, 3);
        assert_eq!(store.len(), 1);
    }
}
