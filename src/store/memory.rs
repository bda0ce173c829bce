//! In-memory document store with JSON snapshot persistence.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::path;
use super::{Document, DocumentStore, Filter, StoreError, StoreResult, Update, UpdateResult};

const ID_FIELD: &str = "_id";

/// Documents and unique key tuples of one collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CollectionData {
    documents: Vec<Document>,
    #[serde(default)]
    unique_indexes: Vec<Vec<String>>,
}

impl CollectionData {
    /// Find a document other than `skip` sharing a unique key tuple with `candidate`.
    fn conflict(&self, candidate: &Document, skip: Option<usize>) -> Option<String> {
        let id_key = vec![ID_FIELD.to_string()];
        std::iter::once(&id_key)
            .chain(self.unique_indexes.iter())
            .find_map(|keys| {
                let wanted = key_tuple(candidate, keys);
                if keys.len() == 1 && keys[0] == ID_FIELD && wanted[0].is_null() {
                    return None;
                }
                self.documents
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| Some(*i) != skip)
                    .any(|(_, existing)| key_tuple(existing, keys) == wanted)
                    .then(|| describe_key(keys, &wanted))
            })
    }

    fn update(
        &mut self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        limit: Option<usize>,
    ) -> StoreResult<UpdateResult> {
        let mut result = UpdateResult::default();
        for index in 0..self.documents.len() {
            if limit.is_some_and(|l| result.matched as usize >= l) {
                break;
            }
            let Some(found) = filter.matches(&self.documents[index]) else {
                continue;
            };
            result.matched += 1;

            let mut candidate = self.documents[index].clone();
            if !update.apply(&mut candidate, found.position)? {
                continue;
            }
            if let Some(key) = self.conflict(&candidate, Some(index)) {
                return Err(StoreError::DuplicateKey {
                    collection: collection.to_string(),
                    key,
                });
            }
            self.documents[index] = candidate;
            result.modified += 1;
        }
        Ok(result)
    }

    fn insert(&mut self, collection: &str, mut document: Document) -> StoreResult<()> {
        document
            .entry(ID_FIELD.to_string())
            .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
        if let Some(key) = self.conflict(&document, None) {
            return Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                key,
            });
        }
        self.documents.push(document);
        Ok(())
    }
}

fn key_tuple(doc: &Document, keys: &[String]) -> Vec<Value> {
    keys.iter()
        .map(|k| path::get(doc, k).cloned().unwrap_or(Value::Null))
        .collect()
}

fn describe_key(keys: &[String], values: &[Value]) -> String {
    keys.iter()
        .zip(values)
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A thread-safe, process-local document store.
///
/// Every operation holds the collection's shard lock for its whole
/// duration, so each call is atomic with respect to other calls on the
/// same collection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, CollectionData>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new(snapshot_path: Option<PathBuf>) -> Self {
        Self {
            collections: DashMap::new(),
            snapshot_path,
        }
    }

    /// Load from a snapshot file if it exists; otherwise start empty.
    pub fn load_from_file(path: &Path) -> StoreResult<Self> {
        let store = Self::new(Some(path.to_path_buf()));
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let snapshot: HashMap<String, CollectionData> = serde_json::from_reader(reader)?;
            for (name, data) in snapshot {
                store.collections.insert(name, data);
            }
            tracing::info!(
                path = %path.display(),
                collections = store.collections.len(),
                "Loaded store snapshot"
            );
        }
        Ok(store)
    }

    /// Write the snapshot file, if this store has one.
    pub fn save_to_file(&self) -> StoreResult<()> {
        if let Some(path) = &self.snapshot_path {
            let snapshot: HashMap<String, CollectionData> = self
                .collections
                .iter()
                .map(|r| (r.key().clone(), r.value().clone()))
                .collect();

            let writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer(writer, &snapshot)?;
            tracing::debug!(path = %path.display(), collections = snapshot.len(), "Saved store snapshot");
        }
        Ok(())
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Names of the collections holding at least one document or index.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }
}

impl DocumentStore for MemoryStore {
    fn create_unique_index(&self, collection: &str, keys: &[&str]) -> StoreResult<()> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        let mut data = self.collections.entry(collection.to_string()).or_default();
        if data.unique_indexes.contains(&keys) {
            return Ok(());
        }

        let mut seen = Vec::with_capacity(data.documents.len());
        for doc in &data.documents {
            let tuple = key_tuple(doc, &keys);
            if seen.contains(&tuple) {
                return Err(StoreError::DuplicateKey {
                    collection: collection.to_string(),
                    key: describe_key(&keys, &tuple),
                });
            }
            seen.push(tuple);
        }
        data.unique_indexes.push(keys);
        Ok(())
    }

    fn insert(&self, collection: &str, document: Document) -> StoreResult<()> {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(collection, document)
    }

    fn update_one(&self, collection: &str, filter: &Filter, update: &Update) -> StoreResult<UpdateResult> {
        match self.collections.get_mut(collection) {
            Some(mut data) => data.update(collection, filter, update, Some(1)),
            None => Ok(UpdateResult::default()),
        }
    }

    fn update_many(&self, collection: &str, filter: &Filter, update: &Update) -> StoreResult<UpdateResult> {
        match self.collections.get_mut(collection) {
            Some(mut data) => data.update(collection, filter, update, None),
            None => Ok(UpdateResult::default()),
        }
    }

    fn upsert(&self, collection: &str, filter: &Filter, update: &Update) -> StoreResult<UpdateResult> {
        let mut data = self.collections.entry(collection.to_string()).or_default();
        let result = data.update(collection, filter, update, Some(1))?;
        if result.matched > 0 {
            return Ok(result);
        }

        let mut seeded = Document::new();
        for (field, value) in filter.equalities() {
            let segments = path::resolve(field, None)?;
            *path::slot_mut(&mut seeded, &segments)? = value.clone();
        }
        update.apply(&mut seeded, None)?;
        data.insert(collection, seeded)?;

        Ok(UpdateResult {
            matched: 0,
            modified: 0,
            upserted: true,
        })
    }

    fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Document>> {
        Ok(self
            .collections
            .get(collection)
            .map(|data| {
                data.documents
                    .iter()
                    .filter(|doc| filter.matches(doc).is_some())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_insert_assigns_id() {
        let store = MemoryStore::new(None);
        store.insert("c", doc(json!({"a": 1}))).unwrap();
        let found = store.find("c", &Filter::new()).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].get("_id").unwrap().is_string());
    }

    #[test]
    fn test_unique_index_conflict() {
        let store = MemoryStore::new(None);
        store.create_unique_index("c", &["s", "i"]).unwrap();
        store.insert("c", doc(json!({"s": "x", "i": 1}))).unwrap();
        store.insert("c", doc(json!({"s": "x", "i": 2}))).unwrap();
        let err = store.insert("c", doc(json!({"s": "x", "i": 1}))).unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(store.count("c", &Filter::new()).unwrap(), 2);
    }

    #[test]
    fn test_unique_index_on_existing_duplicates() {
        let store = MemoryStore::new(None);
        store.insert("c", doc(json!({"n": 1}))).unwrap();
        store.insert("c", doc(json!({"n": 1}))).unwrap();
        assert!(store.create_unique_index("c", &["n"]).unwrap_err().is_duplicate_key());
    }

    #[test]
    fn test_update_one_vs_many() {
        let store = MemoryStore::new(None);
        for i in 0..3 {
            store.insert("c", doc(json!({"g": "a", "i": i}))).unwrap();
        }
        let one = store.update_one("c", &Filter::new().eq("g", "a"), &Update::new().inc("hits", 1)).unwrap();
        assert_eq!((one.matched, one.modified), (1, 1));
        let many = store.update_many("c", &Filter::new().eq("g", "a"), &Update::new().inc("hits", 1)).unwrap();
        assert_eq!((many.matched, many.modified), (3, 3));
        assert_eq!(store.count("c", &Filter::new().eq("hits", 2)).unwrap(), 1);
    }

    #[test]
    fn test_update_missing_collection_is_noop() {
        let store = MemoryStore::new(None);
        let r = store.update_one("nothing", &Filter::new(), &Update::new().set("a", 1)).unwrap();
        assert_eq!(r, UpdateResult::default());
    }

    #[test]
    fn test_update_cannot_break_uniqueness() {
        let store = MemoryStore::new(None);
        store.create_unique_index("c", &["name"]).unwrap();
        store.insert("c", doc(json!({"name": "a"}))).unwrap();
        store.insert("c", doc(json!({"name": "b"}))).unwrap();
        let err = store
            .update_one("c", &Filter::new().eq("name", "b"), &Update::new().set("name", "a"))
            .unwrap_err();
        assert!(err.is_duplicate_key());
    }

    #[test]
    fn test_upsert_inserts_then_updates() {
        let store = MemoryStore::new(None);
        let filter = Filter::new().eq("k", "x").eq("nested.k", 2);
        let first = store.upsert("c", &filter, &Update::new().set("v", 1)).unwrap();
        assert!(first.upserted);
        let second = store.upsert("c", &filter, &Update::new().set("v", 2)).unwrap();
        assert!(!second.upserted);
        assert_eq!(second.matched, 1);

        let docs = store.find("c", &Filter::new()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["nested"], json!({"k": 2}));
        assert_eq!(docs[0]["v"], json!(2));
    }

    #[test]
    fn test_failed_update_leaves_document_untouched() {
        let store = MemoryStore::new(None);
        store.insert("c", doc(json!({"name": "x", "n": 1}))).unwrap();
        let update = Update::new().inc("n", 1).inc("name", 1);
        assert!(store.update_one("c", &Filter::new(), &update).is_err());
        assert_eq!(store.find("c", &Filter::new()).unwrap()[0]["n"], json!(1));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = MemoryStore::new(Some(path.clone()));
        store.create_unique_index("c", &["name"]).unwrap();
        store.insert("c", doc(json!({"name": "a"}))).unwrap();
        store.save_to_file().unwrap();

        let loaded = MemoryStore::load_from_file(&path).unwrap();
        assert_eq!(loaded.count("c", &Filter::new().eq("name", "a")).unwrap(), 1);
        assert!(loaded.insert("c", doc(json!({"name": "a"}))).unwrap_err().is_duplicate_key());
        assert_eq!(loaded.collection_names(), vec!["c".to_string()]);
    }

    #[test]
    fn test_load_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::load_from_file(&dir.path().join("absent.json")).unwrap();
        assert!(store.collection_names().is_empty());
    }
}
