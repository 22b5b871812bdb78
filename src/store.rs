// src/store.rs

use std::collections::HashSet;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use log::debug;
use mongodb::bson::{doc, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, ClientSession, Database};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::EngineError;

/// One operation inside an all-or-nothing commit.
///
/// A `Patch` carrying `expected_version` only matches a document whose
/// `version` field still equals that value; a mismatch aborts the whole
/// batch with `ConcurrentOverwrite`. Every patch increments `version`.
#[derive(Debug, Clone)]
pub enum BatchOp {
    Create {
        collection: String,
        data: Document,
    },
    Patch {
        collection: String,
        id: String,
        data: Document,
        expected_version: Option<i64>,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl BatchOp {
    fn collection(&self) -> &str {
        match self {
            BatchOp::Create { collection, .. } => collection,
            BatchOp::Patch { collection, .. } => collection,
            BatchOp::Delete { collection, .. } => collection,
        }
    }
}

/// The document-store boundary the engine is written against.
///
/// Every successful write publishes the touched collection names on the
/// change feed after the commit lands, so subscribers see a commit's
/// collections exactly once and only once it is visible. The feed is
/// coarse-grained by contract: subscribers re-scan, they do not get
/// deltas.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_all(&self, collection: &str) -> Result<Vec<Document>, EngineError>;
    async fn get_where(&self, collection: &str, filter: Document) -> Result<Vec<Document>, EngineError>;
    async fn get_one(&self, collection: &str, id: &str) -> Result<Document, EngineError>;
    async fn create(&self, collection: &str, data: Document) -> Result<String, EngineError>;
    async fn patch(&self, collection: &str, id: &str, data: Document) -> Result<(), EngineError>;
    async fn batch_commit(&self, ops: Vec<BatchOp>) -> Result<(), EngineError>;

    /// Collection-level change feed. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<String>;
}

/// Production store backed by MongoDB. `batch_commit` maps onto a client
/// session transaction.
pub struct MongoStore {
    pub client: Client,
    pub db: Database,
    feed: broadcast::Sender<String>,
}

impl MongoStore {
    pub async fn init(uri: &str, db_name: &str) -> Self {
        let client_options = ClientOptions::parse(uri)
            .await
            .expect("Failed to parse MongoDB connection string");
        let client = Client::with_options(client_options).expect("Failed to initialize client");
        let db = client.database(db_name);
        let (feed, _) = broadcast::channel(256);
        MongoStore { client, db, feed }
    }

    fn publish(&self, collections: Vec<String>) {
        let mut seen = HashSet::new();
        for collection in collections {
            if seen.insert(collection.clone()) {
                debug!("store change: {}", collection);
                // send only errs when nobody is subscribed
                let _ = self.feed.send(collection);
            }
        }
    }

    async fn apply_batch(
        &self,
        session: &mut ClientSession,
        ops: &[BatchOp],
    ) -> Result<(), EngineError> {
        for op in ops {
            match op {
                BatchOp::Create { collection, data } => {
                    let mut data = data.clone();
                    if data.get_str("_id").is_err() {
                        data.insert("_id", Uuid::new_v4().to_string());
                    }
                    self.db
                        .collection::<Document>(collection)
                        .insert_one(data)
                        .session(&mut *session)
                        .await
                        .map_err(|e| EngineError::WriteFailed(e.to_string()))?;
                }
                BatchOp::Patch {
                    collection,
                    id,
                    data,
                    expected_version,
                } => {
                    let mut filter = doc! { "_id": id };
                    if let Some(v) = expected_version {
                        filter.insert("version", *v);
                    }
                    let update = doc! { "$set": data.clone(), "$inc": { "version": 1_i64 } };
                    let result = self
                        .db
                        .collection::<Document>(collection)
                        .update_one(filter, update)
                        .session(&mut *session)
                        .await
                        .map_err(|e| EngineError::WriteFailed(e.to_string()))?;
                    if result.matched_count == 0 {
                        let exists = self
                            .db
                            .collection::<Document>(collection)
                            .find_one(doc! { "_id": id })
                            .session(&mut *session)
                            .await
                            .map_err(|e| EngineError::WriteFailed(e.to_string()))?
                            .is_some();
                        return Err(if exists {
                            EngineError::ConcurrentOverwrite(format!("{}/{}", collection, id))
                        } else {
                            EngineError::NotFound(format!("{}/{}", collection, id))
                        });
                    }
                }
                BatchOp::Delete { collection, id } => {
                    self.db
                        .collection::<Document>(collection)
                        .delete_one(doc! { "_id": id })
                        .session(&mut *session)
                        .await
                        .map_err(|e| EngineError::WriteFailed(e.to_string()))?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn get_all(&self, collection: &str) -> Result<Vec<Document>, EngineError> {
        self.db
            .collection::<Document>(collection)
            .find(doc! {})
            .await
            .map_err(|e| EngineError::Store(e.to_string()))?
            .try_collect()
            .await
            .map_err(|e| EngineError::Store(e.to_string()))
    }

    async fn get_where(&self, collection: &str, filter: Document) -> Result<Vec<Document>, EngineError> {
        self.db
            .collection::<Document>(collection)
            .find(filter)
            .await
            .map_err(|e| EngineError::Store(e.to_string()))?
            .try_collect()
            .await
            .map_err(|e| EngineError::Store(e.to_string()))
    }

    async fn get_one(&self, collection: &str, id: &str) -> Result<Document, EngineError> {
        match self
            .db
            .collection::<Document>(collection)
            .find_one(doc! { "_id": id })
            .await
        {
            Ok(Some(document)) => Ok(document),
            Ok(None) => Err(EngineError::NotFound(format!("{}/{}", collection, id))),
            Err(e) => Err(EngineError::Store(e.to_string())),
        }
    }

    async fn create(&self, collection: &str, data: Document) -> Result<String, EngineError> {
        let mut data = data;
        let id = match data.get_str("_id") {
            Ok(id) => id.to_string(),
            Err(_) => {
                let id = Uuid::new_v4().to_string();
                data.insert("_id", id.clone());
                id
            }
        };
        self.db
            .collection::<Document>(collection)
            .insert_one(data)
            .await
            .map_err(|e| EngineError::WriteFailed(e.to_string()))?;
        self.publish(vec![collection.to_string()]);
        Ok(id)
    }

    async fn patch(&self, collection: &str, id: &str, data: Document) -> Result<(), EngineError> {
        let update = doc! { "$set": data, "$inc": { "version": 1_i64 } };
        let result = self
            .db
            .collection::<Document>(collection)
            .update_one(doc! { "_id": id }, update)
            .await
            .map_err(|e| EngineError::WriteFailed(e.to_string()))?;
        if result.matched_count == 0 {
            return Err(EngineError::NotFound(format!("{}/{}", collection, id)));
        }
        self.publish(vec![collection.to_string()]);
        Ok(())
    }

    async fn batch_commit(&self, ops: Vec<BatchOp>) -> Result<(), EngineError> {
        let touched: Vec<String> = ops.iter().map(|op| op.collection().to_string()).collect();
        let mut session = self
            .client
            .start_session()
            .await
            .map_err(|e| EngineError::WriteFailed(e.to_string()))?;
        session
            .start_transaction()
            .await
            .map_err(|e| EngineError::WriteFailed(e.to_string()))?;
        match self.apply_batch(&mut session, &ops).await {
            Ok(()) => {
                session
                    .commit_transaction()
                    .await
                    .map_err(|e| EngineError::WriteFailed(e.to_string()))?;
                self.publish(touched);
                Ok(())
            }
            Err(e) => {
                let _ = session.abort_transaction().await;
                Err(e)
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.feed.subscribe()
    }
}

#[cfg(test)]
pub mod memory {
    //! In-memory store with the same commit/feed semantics as the Mongo
    //! implementation, so the engine properties can be tested without a
    //! live database.

    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use mongodb::bson::Document;
    use tokio::sync::broadcast;
    use uuid::Uuid;

    use super::{BatchOp, DocumentStore};
    use crate::error::EngineError;

    pub struct MemoryStore {
        collections: Mutex<HashMap<String, Vec<Document>>>,
        feed: broadcast::Sender<String>,
        fail_next_commit: AtomicBool,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            let (feed, _) = broadcast::channel(64);
            MemoryStore {
                collections: Mutex::new(HashMap::new()),
                feed,
                fail_next_commit: AtomicBool::new(false),
            }
        }

        /// Make the next `batch_commit` fail without touching anything.
        pub fn fail_next_commit(&self) {
            self.fail_next_commit.store(true, Ordering::SeqCst);
        }

        /// Insert fixture documents without publishing change events.
        pub fn seed(&self, collection: &str, docs: Vec<Document>) {
            let mut map = self.collections.lock().unwrap();
            map.entry(collection.to_string()).or_default().extend(docs);
        }

        pub fn count(&self, collection: &str) -> usize {
            let map = self.collections.lock().unwrap();
            map.get(collection).map(Vec::len).unwrap_or(0)
        }

        fn matches(document: &Document, filter: &Document) -> bool {
            filter
                .iter()
                .all(|(key, value)| document.get(key) == Some(value))
        }

        fn publish(&self, collections: Vec<String>) {
            let mut seen = HashSet::new();
            for collection in collections {
                if seen.insert(collection.clone()) {
                    let _ = self.feed.send(collection);
                }
            }
        }

        fn apply_patch(document: &mut Document, data: &Document) {
            for (key, value) in data {
                document.insert(key.clone(), value.clone());
            }
            let version = document.get_i64("version").unwrap_or(0);
            document.insert("version", version + 1);
        }
    }

    #[async_trait]
    impl DocumentStore for MemoryStore {
        async fn get_all(&self, collection: &str) -> Result<Vec<Document>, EngineError> {
            let map = self.collections.lock().unwrap();
            Ok(map.get(collection).cloned().unwrap_or_default())
        }

        async fn get_where(
            &self,
            collection: &str,
            filter: Document,
        ) -> Result<Vec<Document>, EngineError> {
            let map = self.collections.lock().unwrap();
            Ok(map
                .get(collection)
                .map(|docs| {
                    docs.iter()
                        .filter(|d| Self::matches(d, &filter))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn get_one(&self, collection: &str, id: &str) -> Result<Document, EngineError> {
            let map = self.collections.lock().unwrap();
            map.get(collection)
                .and_then(|docs| docs.iter().find(|d| d.get_str("_id").map_or(false, |v| v == id)))
                .cloned()
                .ok_or_else(|| EngineError::NotFound(format!("{}/{}", collection, id)))
        }

        async fn create(&self, collection: &str, data: Document) -> Result<String, EngineError> {
            let mut data = data;
            let id = match data.get_str("_id") {
                Ok(id) => id.to_string(),
                Err(_) => {
                    let id = Uuid::new_v4().to_string();
                    data.insert("_id", id.clone());
                    id
                }
            };
            {
                let mut map = self.collections.lock().unwrap();
                map.entry(collection.to_string()).or_default().push(data);
            }
            self.publish(vec![collection.to_string()]);
            Ok(id)
        }

        async fn patch(&self, collection: &str, id: &str, data: Document) -> Result<(), EngineError> {
            {
                let mut map = self.collections.lock().unwrap();
                let document = map
                    .get_mut(collection)
                    .and_then(|docs| docs.iter_mut().find(|d| d.get_str("_id").map_or(false, |v| v == id)))
                    .ok_or_else(|| EngineError::NotFound(format!("{}/{}", collection, id)))?;
                Self::apply_patch(document, &data);
            }
            self.publish(vec![collection.to_string()]);
            Ok(())
        }

        async fn batch_commit(&self, ops: Vec<BatchOp>) -> Result<(), EngineError> {
            if self.fail_next_commit.swap(false, Ordering::SeqCst) {
                return Err(EngineError::WriteFailed("simulated commit failure".to_string()));
            }
            let touched: Vec<String> = ops.iter().map(|op| op.collection().to_string()).collect();
            {
                let mut map = self.collections.lock().unwrap();

                // Validate everything before mutating anything, so a bad op
                // leaves the whole batch unapplied.
                for op in &ops {
                    if let BatchOp::Patch {
                        collection,
                        id,
                        expected_version,
                        ..
                    } = op
                    {
                        let document = map
                            .get(collection.as_str())
                            .and_then(|docs| docs.iter().find(|d| d.get_str("_id").map_or(false, |v| v == id)))
                            .ok_or_else(|| EngineError::NotFound(format!("{}/{}", collection, id)))?;
                        if let Some(expected) = expected_version {
                            let current = document.get_i64("version").unwrap_or(0);
                            if current != *expected {
                                return Err(EngineError::ConcurrentOverwrite(format!(
                                    "{}/{}",
                                    collection, id
                                )));
                            }
                        }
                    }
                }

                for op in ops {
                    match op {
                        BatchOp::Create { collection, data } => {
                            let mut data = data;
                            if data.get_str("_id").is_err() {
                                data.insert("_id", Uuid::new_v4().to_string());
                            }
                            map.entry(collection).or_default().push(data);
                        }
                        BatchOp::Patch {
                            collection, id, data, ..
                        } => {
                            if let Some(document) = map
                                .get_mut(collection.as_str())
                                .and_then(|docs| docs.iter_mut().find(|d| d.get_str("_id").map_or(false, |v| v == id)))
                            {
                                Self::apply_patch(document, &data);
                            }
                        }
                        BatchOp::Delete { collection, id } => {
                            if let Some(docs) = map.get_mut(collection.as_str()) {
                                docs.retain(|d| d.get_str("_id").map_or(true, |v| v != id));
                            }
                        }
                    }
                }
            }
            self.publish(touched);
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<String> {
            self.feed.subscribe()
        }
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::doc;

    use super::memory::MemoryStore;
    use super::{BatchOp, DocumentStore};
    use crate::error::EngineError;

    #[tokio::test]
    async fn batch_is_all_or_nothing_on_version_conflict() {
        let store = MemoryStore::new();
        store.seed(
            "campaigns",
            vec![doc! { "_id": "c1", "status": "Draft", "version": 3_i64 }],
        );

        let result = store
            .batch_commit(vec![
                BatchOp::Create {
                    collection: "uploader_tasks".to_string(),
                    data: doc! { "campaignId": "c1" },
                },
                BatchOp::Patch {
                    collection: "campaigns".to_string(),
                    id: "c1".to_string(),
                    data: doc! { "status": "Assigned" },
                    expected_version: Some(2),
                },
            ])
            .await;

        assert!(matches!(result, Err(EngineError::ConcurrentOverwrite(_))));
        assert_eq!(store.count("uploader_tasks"), 0);
        let campaign = store.get_one("campaigns", "c1").await.unwrap();
        assert_eq!(campaign.get_str("status").unwrap(), "Draft");
    }

    #[tokio::test]
    async fn patch_increments_version() {
        let store = MemoryStore::new();
        store.seed("users", vec![doc! { "_id": "u1", "balance": 0.0, "version": 0_i64 }]);
        store
            .patch("users", "u1", doc! { "balance": 10.0 })
            .await
            .unwrap();
        let user = store.get_one("users", "u1").await.unwrap();
        assert_eq!(user.get_i64("version").unwrap(), 1);
    }

    #[tokio::test]
    async fn batch_delete_removes_the_document() {
        let store = MemoryStore::new();
        store.seed("coupons", vec![doc! { "_id": "SAVE10", "discountPercent": 10.0 }]);

        store
            .batch_commit(vec![BatchOp::Delete {
                collection: "coupons".to_string(),
                id: "SAVE10".to_string(),
            }])
            .await
            .unwrap();

        assert_eq!(store.count("coupons"), 0);
    }

    #[tokio::test]
    async fn commits_publish_each_touched_collection_once() {
        let store = MemoryStore::new();
        store.seed("campaigns", vec![doc! { "_id": "c1", "version": 0_i64 }]);
        let mut feed = store.subscribe();

        store
            .batch_commit(vec![
                BatchOp::Patch {
                    collection: "campaigns".to_string(),
                    id: "c1".to_string(),
                    data: doc! { "status": "Assigned" },
                    expected_version: Some(0),
                },
                BatchOp::Create {
                    collection: "uploader_tasks".to_string(),
                    data: doc! { "campaignId": "c1" },
                },
                BatchOp::Create {
                    collection: "uploader_tasks".to_string(),
                    data: doc! { "campaignId": "c1" },
                },
            ])
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Ok(collection) = feed.try_recv() {
            events.push(collection);
        }
        assert_eq!(events, vec!["campaigns".to_string(), "uploader_tasks".to_string()]);
    }
}
