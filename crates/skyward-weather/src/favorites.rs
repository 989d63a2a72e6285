//! Favorite cities and their persistence.

use crate::catalog::CityCatalog;
use crate::types::StoreError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A named key-value slot holding a list of strings.
pub trait SlotStorage: Send + Sync + 'static {
    /// `Ok(None)` when the slot has never been written
    fn read(&self, slot: &str) -> Result<Option<Vec<String>>, StoreError>;
    fn write(&self, slot: &str, values: &[String]) -> Result<(), StoreError>;
}

/// Slots kept in one JSON object on disk: `{"slot": ["a", "b"]}`
#[derive(Debug)]
pub struct JsonFileSlots {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileSlots {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, Vec<String>>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let json = fs::read_to_string(&self.path)?;
        if json.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&json)?)
    }
}

impl SlotStorage for JsonFileSlots {
    fn read(&self, slot: &str) -> Result<Option<Vec<String>>, StoreError> {
        Ok(self.read_all()?.remove(slot))
    }

    fn write(&self, slot: &str, values: &[String]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();

        let mut slots = match self.read_all() {
            Ok(slots) => slots,
            Err(e) => {
                tracing::warn!("Replacing unreadable slot file {:?}: {}", self.path, e);
                BTreeMap::new()
            }
        };
        slots.insert(slot.to_string(), values.to_vec());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&slots)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        tracing::debug!("Wrote slot '{}' to {:?}", slot, self.path);
        Ok(())
    }
}

/// In-memory slots, for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemorySlots {
    slots: Mutex<HashMap<String, Vec<String>>>,
}

impl SlotStorage for MemorySlots {
    fn read(&self, slot: &str) -> Result<Option<Vec<String>>, StoreError> {
        Ok(self.slots.lock().get(slot).cloned())
    }

    fn write(&self, slot: &str, values: &[String]) -> Result<(), StoreError> {
        self.slots.lock().insert(slot.to_string(), values.to_vec());
        Ok(())
    }
}

/// Unique city names, iterated in sorted order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FavoriteSet(BTreeSet<String>);

impl FavoriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.0.insert(name.into())
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.0.remove(name)
    }

    /// Add if absent, remove if present. Returns whether it is now a favorite.
    pub fn toggle(&mut self, name: &str) -> bool {
        if self.0.remove(name) {
            false
        } else {
            self.0.insert(name.to_string());
            true
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for FavoriteSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Persists the favorite set into one slot, validating names against the catalog
#[derive(Clone)]
pub struct FavoritesStore {
    storage: Arc<dyn SlotStorage>,
    catalog: Arc<CityCatalog>,
    slot: String,
}

impl std::fmt::Debug for FavoritesStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FavoritesStore").field("slot", &self.slot).finish()
    }
}

impl FavoritesStore {
    pub const DEFAULT_SLOT: &'static str = "favCities";

    pub fn new(
        storage: Arc<dyn SlotStorage>,
        catalog: Arc<CityCatalog>,
        slot: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            catalog,
            slot: slot.into(),
        }
    }

    pub fn save(&self, favorites: &FavoriteSet) -> Result<(), StoreError> {
        self.storage.write(&self.slot, &favorites.to_vec())?;
        tracing::info!("Saved {} favorite(s)", favorites.len());
        Ok(())
    }

    /// Missing slot or unreadable storage yields an empty set. Names the
    /// catalog doesn't know are dropped.
    pub fn load(&self) -> FavoriteSet {
        let names = match self.storage.read(&self.slot) {
            Ok(Some(names)) => names,
            Ok(None) => return FavoriteSet::new(),
            Err(e) => {
                tracing::error!("Failed to load favorites: {}", e);
                return FavoriteSet::new();
            }
        };

        let favorites: FavoriteSet = names
            .into_iter()
            .filter(|name| {
                let known = self.catalog.contains(name);
                if !known {
                    tracing::warn!("Dropping unknown favorite '{}'", name);
                }
                known
            })
            .collect();

        tracing::info!("Loaded {} favorite(s)", favorites.len());
        favorites
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    fn store(storage: Arc<dyn SlotStorage>) -> FavoritesStore {
        FavoritesStore::new(
            storage,
            Arc::new(CityCatalog::builtin()),
            FavoritesStore::DEFAULT_SLOT,
        )
    }

    #[test]
    fn test_missing_slot_is_empty() {
        let store = store(Arc::new(MemorySlots::default()));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_round_trip_filters_unknown_names() {
        let store = store(Arc::new(MemorySlots::default()));
        let favorites: FavoriteSet = ["London", "Tokyo", "Atlantis"].into_iter().collect();

        store.save(&favorites).unwrap();
        let loaded = store.load();

        let expected: FavoriteSet = ["London", "Tokyo"].into_iter().collect();
        assert_eq!(loaded, expected);
    }

    #[test]
    fn test_toggle() {
        let mut favorites = FavoriteSet::new();
        assert!(favorites.toggle("Rome"));
        assert!(favorites.contains("Rome"));
        assert!(!favorites.toggle("Rome"));
        assert!(favorites.is_empty());
    }

    #[test]
    fn test_sorted_iteration() {
        let favorites: FavoriteSet = ["Tokyo", "Dubai", "London"].into_iter().collect();
        assert_eq!(favorites.iter().collect::<Vec<_>>(), vec!["Dubai", "London", "Tokyo"]);
    }

    #[test]
    fn test_json_file_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("favorites.json");

        let favorites: FavoriteSet = ["Paris", "Sydney"].into_iter().collect();
        store(Arc::new(JsonFileSlots::new(&path))).save(&favorites).unwrap();

        let reloaded = store(Arc::new(JsonFileSlots::new(&path))).load();
        assert_eq!(reloaded, favorites);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["favCities"], serde_json::json!(["Paris", "Sydney"]));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_json_file_keeps_other_slots() {
        let dir = tempfile::tempdir().unwrap();
        let slots = JsonFileSlots::new(dir.path().join("favorites.json"));

        slots.write("other", &["x".to_string()]).unwrap();
        slots.write("favCities", &["Rome".to_string()]).unwrap();

        assert_eq!(slots.read("other").unwrap(), Some(vec!["x".to_string()]));
        assert_eq!(slots.read("favCities").unwrap(), Some(vec!["Rome".to_string()]));
        assert_eq!(slots.read("absent").unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorites.json");
        fs::write(&path, "{ not json").unwrap();

        let store = store(Arc::new(JsonFileSlots::new(&path)));
        assert!(store.load().is_empty());

        // Next save replaces the unreadable file
        let favorites: FavoriteSet = ["Delhi"].into_iter().collect();
        store.save(&favorites).unwrap();
        assert_eq!(store.load(), favorites);
    }
}
