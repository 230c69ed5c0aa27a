// In-process store backend
// Used by tests and by callers that only need a throwaway collection

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CollectionSchema, StoreClient, StoreError, StoragePoint, WriteAck};

#[derive(Debug)]
struct MemoryCollection {
    schema: CollectionSchema,
    points: BTreeMap<Uuid, StoragePoint>,
}

/// A [`StoreClient`] backed by a map. Counts calls so tests can assert that
/// nothing was sent.
#[derive(Debug)]
pub struct MemoryClient {
    collections: RwLock<HashMap<String, MemoryCollection>>,
    lookup_calls: AtomicUsize,
    create_calls: AtomicUsize,
    upsert_calls: AtomicUsize,
    write_ack: WriteAck,
    latency: Option<Duration>,
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClient {
    #[inline]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            lookup_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            upsert_calls: AtomicUsize::new(0),
            write_ack: WriteAck::Completed,
            latency: None,
        }
    }

    /// Answer every upsert with `ack`. Points are only stored for full acks.
    #[inline]
    pub fn with_write_ack(mut self, ack: WriteAck) -> Self {
        self.write_ack = ack;
        self
    }

    /// Delay every call by `latency`
    #[inline]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    #[inline]
    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    #[inline]
    pub async fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    #[inline]
    pub async fn schema(&self, name: &str) -> Option<CollectionSchema> {
        self.collections
            .read()
            .await
            .get(name)
            .map(|c| c.schema.clone())
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl StoreClient for MemoryClient {
    async fn collection_exists(&self, name: &str) -> Result<bool, StoreError> {
        self.delay().await;
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), StoreError> {
        self.delay().await;
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        // Give concurrent creators a chance to interleave like a remote store would
        tokio::task::yield_now().await;

        let mut collections = self.collections.write().await;
        if collections.contains_key(&schema.name) {
            return Err(StoreError::DuplicateCollection(schema.name.clone()));
        }
        collections.insert(
            schema.name.clone(),
            MemoryCollection {
                schema: schema.clone(),
                points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn upsert_points(
        &self,
        collection: &str,
        points: Vec<StoragePoint>,
    ) -> Result<WriteAck, StoreError> {
        self.delay().await;
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        let dim = target.schema.dense_dim;
        if let Some(point) = points.iter().find(|p| p.dense.len() != dim) {
            return Err(StoreError::Rejected(format!(
                "point {} has {} dimensions, collection expects {}",
                point.id,
                point.dense.len(),
                dim
            )));
        }

        if matches!(self.write_ack, WriteAck::Acknowledged | WriteAck::Completed) {
            for point in points {
                target.points.insert(point.id, point);
            }
        }
        Ok(self.write_ack)
    }

    async fn retrieve_point(
        &self,
        collection: &str,
        id: Uuid,
    ) -> Result<Option<StoragePoint>, StoreError> {
        self.delay().await;
        let collections = self.collections.read().await;
        let target = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        Ok(target.points.get(&id).cloned())
    }

    async fn count_points(&self, collection: &str) -> Result<usize, StoreError> {
        self.delay().await;
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(|c| c.points.len())
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))
    }
}
