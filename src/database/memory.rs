//! In-memory query engine.
//!
//! # Responsibilities
//! - Run finds and updates against a [`MemoryStore`]
//! - Keep per-namespace index declarations (`_id_` is implicit)
//! - Describe each execution in the legacy explain layout
//!
//! # Design Decisions
//! - Plan choice: the index whose leading keys cover the most filter
//!   fields wins, ties go to the earlier declaration; no candidate means a
//!   collection scan
//! - A plan is reported index-only when every filter field is a key of
//!   the chosen index
//! - Indexes drive the reported plan only; matching always scans the
//!   stored documents

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde_json::{json, Value};

use crate::instrument::{
    Explain, ExplainError, FindOperation, FindRequest, Namespace, OperationError, QueryCursor,
    UpdateOperation, UpdateOutcome, UpdateRequest,
};
use crate::store::{Document, DocumentStore, Filter, MemoryStore, Update};

const ID_INDEX: &str = "_id_";

/// A declared index: ordered (field, direction) keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub keys: Vec<(String, i32)>,
}

impl IndexSpec {
    /// Named the server way: `store_1_sold_-1`.
    pub fn new(keys: &[(&str, i32)]) -> Self {
        let name = keys
            .iter()
            .map(|(field, direction)| format!("{}_{}", field, direction))
            .collect::<Vec<_>>()
            .join("_");
        Self {
            name,
            keys: keys.iter().map(|(f, d)| (f.to_string(), *d)).collect(),
        }
    }

    fn id() -> Self {
        Self {
            name: ID_INDEX.to_string(),
            keys: vec![("_id".to_string(), 1)],
        }
    }

    /// How many leading keys appear among `fields`.
    fn prefix_len(&self, fields: &[&str]) -> usize {
        self.keys
            .iter()
            .take_while(|(key, _)| fields.contains(&key.as_str()))
            .count()
    }

    fn covers(&self, fields: &[&str]) -> bool {
        fields.iter().all(|f| self.keys.iter().any(|(key, _)| key == f))
    }
}

fn cursor_name(index: Option<&IndexSpec>) -> String {
    match index {
        Some(index) => format!("BtreeCursor {}", index.name),
        None => "BasicCursor".to_string(),
    }
}

struct Planned {
    chosen: Option<IndexSpec>,
    candidates: Vec<IndexSpec>,
    covered: bool,
}

impl Planned {
    fn render(&self, returned: usize, scanned: usize, started: Instant) -> Value {
        let mut all_plans: Vec<Value> = self
            .candidates
            .iter()
            .map(|index| json!({ "cursor": cursor_name(Some(index)) }))
            .collect();
        all_plans.push(json!({ "cursor": cursor_name(None) }));

        json!({
            "cursor": cursor_name(self.chosen.as_ref()),
            "isMultiKey": false,
            "n": returned,
            "nscannedObjects": scanned,
            "nscanned": scanned,
            "indexOnly": self.covered,
            "millis": started.elapsed().as_millis() as u64,
            "allPlans": all_plans,
            "server": "memory",
        })
    }
}

/// Query engine over a shared [`MemoryStore`]. Namespace `db.coll` maps to
/// store collection `"db.coll"`.
pub struct MemoryDatabase {
    store: Arc<MemoryStore>,
    indexes: DashMap<Namespace, Vec<IndexSpec>>,
}

impl MemoryDatabase {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            indexes: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Declare an index; returns its name. Declaring twice is a no-op.
    pub fn ensure_index(&self, namespace: &Namespace, keys: &[(&str, i32)]) -> String {
        let spec = IndexSpec::new(keys);
        let name = spec.name.clone();
        let mut declared = self.indexes.entry(namespace.clone()).or_default();
        if !declared.contains(&spec) {
            declared.push(spec);
        }
        name
    }

    /// Every index of the namespace, `_id_` first.
    pub fn indexes(&self, namespace: &Namespace) -> Vec<IndexSpec> {
        let mut all = vec![IndexSpec::id()];
        if let Some(declared) = self.indexes.get(namespace) {
            all.extend(declared.iter().cloned());
        }
        all
    }

    /// Store a document without tracing.
    pub fn insert(&self, namespace: &Namespace, document: Value) -> Result<(), OperationError> {
        match document {
            Value::Object(document) => Ok(self.store.insert(&namespace.to_string(), document)?),
            other => Err(OperationError::InvalidQuery(format!("not a document: {}", other))),
        }
    }

    fn plan(&self, namespace: &Namespace, filter: &Filter) -> Planned {
        let fields = filter.fields();
        let mut candidates: Vec<(usize, IndexSpec)> = self
            .indexes(namespace)
            .into_iter()
            .map(|index| (index.prefix_len(&fields), index))
            .filter(|(len, _)| *len > 0)
            .collect();
        // Stable sort keeps declaration order among equal prefixes.
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        let chosen = candidates.first().map(|(_, index)| index.clone());
        let covered = chosen.as_ref().is_some_and(|index| index.covers(&fields));
        Planned {
            chosen,
            candidates: candidates.into_iter().map(|(_, index)| index).collect(),
            covered,
        }
    }

    fn parse_filter(filter: &Value) -> Result<Filter, OperationError> {
        Filter::from_query(filter).map_err(|e| OperationError::InvalidQuery(e.to_string()))
    }

    fn scanned(&self, collection: &str, planned: &Planned, returned: usize) -> Result<usize, OperationError> {
        Ok(match planned.chosen {
            Some(_) => returned,
            None => self.store.count(collection, &Filter::new())?,
        })
    }
}

/// Documents of a finished find plus the plan that produced them.
pub struct MemoryCursor {
    documents: std::vec::IntoIter<Document>,
    plan: Value,
}

impl Iterator for MemoryCursor {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        self.documents.next()
    }
}

impl Explain for MemoryCursor {
    fn explain(&self) -> Result<Value, ExplainError> {
        Ok(self.plan.clone())
    }
}

impl FindOperation for MemoryDatabase {
    fn find(&self, request: &FindRequest<'_>) -> Result<Box<dyn QueryCursor>, OperationError> {
        let started = Instant::now();
        let collection = request.namespace.to_string();
        let filter = Self::parse_filter(request.filter)?;
        let planned = self.plan(request.namespace, &filter);

        let documents = self.store.find(&collection, &filter)?;
        let scanned = self.scanned(&collection, &planned, documents.len())?;
        let plan = planned.render(documents.len(), scanned, started);

        Ok(Box::new(MemoryCursor {
            documents: documents.into_iter(),
            plan,
        }))
    }
}

impl UpdateOperation for MemoryDatabase {
    fn update(&self, request: &UpdateRequest<'_>) -> Result<UpdateOutcome, OperationError> {
        let collection = request.namespace.to_string();
        let filter = Self::parse_filter(request.filter)?;
        let update = Update::from_document(request.changes)
            .map_err(|e| OperationError::InvalidQuery(e.to_string()))?;

        let result = if request.multi {
            self.store.update_many(&collection, &filter, &update)?
        } else {
            self.store.update_one(&collection, &filter, &update)?
        };
        Ok(UpdateOutcome {
            matched: result.matched,
            modified: result.modified,
        })
    }

    fn explain_update(&self, request: &UpdateRequest<'_>) -> Result<Value, ExplainError> {
        let started = Instant::now();
        let collection = request.namespace.to_string();
        let filter = Self::parse_filter(request.filter).map_err(|e| ExplainError::Unavailable(e.to_string()))?;
        let planned = self.plan(request.namespace, &filter);

        let matched = self
            .store
            .count(&collection, &filter)
            .map_err(|e| ExplainError::Unavailable(e.to_string()))?;
        let returned = if request.multi { matched } else { matched.min(1) };
        let scanned = self
            .scanned(&collection, &planned, returned)
            .map_err(|e| ExplainError::Unavailable(e.to_string()))?;
        Ok(planned.render(returned, scanned, started))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::instrument::Operations;

    fn setup() -> (Arc<MemoryDatabase>, Database, Namespace) {
        let engine = Arc::new(MemoryDatabase::new(Arc::new(MemoryStore::default())));
        let namespace = Namespace::new("shop", "foo");
        engine.ensure_index(&namespace, &[("store", 1), ("widget", 1), ("sold", -1)]);
        engine.ensure_index(&namespace, &[("store", 1), ("widget", 1), ("in_stock", 1)]);
        for i in 0..20 {
            engine
                .insert(
                    &namespace,
                    json!({"store": format!("store_{}", i % 2), "widget": format!("w{}", i), "sold": i, "in_stock": 20 - i}),
                )
                .unwrap();
        }
        let db = Database::new("shop", Arc::new(Operations::from_engine(engine.clone())));
        (engine, db, namespace)
    }

    #[test]
    fn test_collection_scan_plan() {
        let (_, db, _) = setup();
        let cursor = db.collection("foo").find(&json!({"sold": {"$gt": 9}})).unwrap();
        let plan = cursor.explain().unwrap();

        assert_eq!(plan["cursor"], "BasicCursor");
        assert_eq!(plan["n"], 10);
        assert_eq!(plan["nscanned"], 20);
        assert_eq!(plan["indexOnly"], false);
        assert_eq!(cursor.count(), 10);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let (_, db, _) = setup();
        let foo = db.collection("foo");

        let plan = foo.find(&json!({"store": "store_0"})).unwrap().explain().unwrap();
        assert_eq!(plan["cursor"], "BtreeCursor store_1_widget_1_sold_-1");

        let plan = foo
            .find(&json!({"store": "store_0", "widget": "w0", "in_stock": 20}))
            .unwrap()
            .explain()
            .unwrap();
        assert_eq!(plan["cursor"], "BtreeCursor store_1_widget_1_in_stock_1");
        assert_eq!(plan["indexOnly"], true);
        assert_eq!(plan["allPlans"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_update_and_explain_update() {
        let (engine, db, namespace) = setup();
        let foo = db.collection("foo");
        let filter = json!({"store": "store_0"});
        let changes = json!({"$inc": {"sold": 1, "in_stock": -1}});

        let outcome = foo.update_many(&filter, &changes).unwrap();
        assert_eq!(outcome, UpdateOutcome { matched: 10, modified: 10 });
        assert_eq!(foo.find_one(&json!({"widget": "w0"})).unwrap().unwrap()["sold"], 1);

        let request = UpdateRequest {
            namespace: &namespace,
            filter: &filter,
            changes: &changes,
            multi: false,
            caller: std::panic::Location::caller(),
        };
        let plan = engine.explain_update(&request).unwrap();
        assert_eq!(plan["n"], 1);
        assert_eq!(plan["cursor"], "BtreeCursor store_1_widget_1_sold_-1");
    }

    #[test]
    fn test_invalid_query_propagates() {
        let (_, db, _) = setup();
        let err = db.collection("foo").find(&json!({"$where": "1"})).err().unwrap();
        assert!(matches!(err, OperationError::InvalidQuery(_)));
    }
}
