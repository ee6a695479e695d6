//! RocksDB implementation of the `DocumentStore` trait

use async_trait::async_trait;
use chainshrew_sync::{
    AggregateOptions, DistinctCursor, Document, DocumentStore, SortOrder, SyncError, SyncResult,
    UpsertOutcome, ADDRESS_FIELD, BLOCK_COLL, HEIGHT_FIELD, STATE_COLL, TRANSACTION_COLL,
};
use log::{debug, info};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::cursor::{MemoryCursor, SpillCursor};
use crate::keys;

/// Indexes declared on every store: checkpoint lookups, transaction natural
/// keys and account addresses.
pub const DEFAULT_INDEXES: [(&str, &str); 4] = [
    (BLOCK_COLL, HEIGHT_FIELD),
    (TRANSACTION_COLL, "hash"),
    (TRANSACTION_COLL, "txID"),
    (STATE_COLL, ADDRESS_FIELD),
];

fn storage_err(context: &str, e: impl std::fmt::Display) -> SyncError {
    SyncError::Storage(format!("{}: {}", context, e))
}

/// Document store keeping every collection in one RocksDB keyspace.
///
/// Writes of a single call (`insert_many` included) go through one
/// `WriteBatch` and are atomic. Secondary indexes are kept in the same batch.
#[derive(Clone)]
pub struct RocksDocumentStore {
    pub db: Arc<DB>,
    indexes: Arc<RwLock<HashMap<String, HashSet<String>>>>,
    write_lock: Arc<Mutex<()>>,
    next_scratch: Arc<AtomicU64>,
}

impl RocksDocumentStore {
    /// Create a store over an existing DB handle
    pub fn new(db: Arc<DB>) -> SyncResult<Self> {
        let store = Self {
            db,
            indexes: Arc::new(RwLock::new(HashMap::new())),
            write_lock: Arc::new(Mutex::new(())),
            next_scratch: Arc::new(AtomicU64::new(0)),
        };
        store.release_stale_scratch()?;
        store.load_declared_indexes()?;
        for (collection, field) in DEFAULT_INDEXES {
            store.ensure_index(collection, field)?;
        }
        Ok(store)
    }

    pub fn open(path: String, opts: Options) -> SyncResult<Self> {
        let db = DB::open(&opts, &path).map_err(|e| storage_err("Failed to open database", e))?;
        info!("opened document store at {}", path);
        Self::new(Arc::new(db))
    }

    /// Options tuned for append-heavy ingestion
    pub fn get_optimized_options() -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(256 * 1024 * 1024);
        opts.set_max_write_buffer_number(4);
        opts.increase_parallelism(num_cpus::get() as i32);
        opts
    }

    pub fn open_optimized(path: String) -> SyncResult<Self> {
        let opts = Self::get_optimized_options();
        Self::open(path, opts)
    }

    fn release_stale_scratch(&self) -> SyncResult<()> {
        let root = keys::scratch_root();
        let mut batch = WriteBatch::default();
        batch.delete_range(&root, &keys::prefix_end(&root));
        self.db
            .write(batch)
            .map_err(|e| storage_err("Failed to clear scratch space", e))
    }

    fn load_declared_indexes(&self) -> SyncResult<()> {
        let prefix = keys::declared_index_prefix();
        let mut indexes = self
            .indexes
            .write()
            .map_err(|_| SyncError::Storage("index registry poisoned".to_string()))?;
        for item in self
            .db
            .iterator(IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, _) = item.map_err(|e| storage_err("Failed to read indexes", e))?;
            if !key.starts_with(&prefix) {
                break;
            }
            if let Some((collection, field)) = keys::parse_declared_index_key(&key) {
                indexes.entry(collection).or_default().insert(field);
            }
        }
        Ok(())
    }

    fn indexed_fields(&self, collection: &str) -> SyncResult<Vec<String>> {
        let indexes = self
            .indexes
            .read()
            .map_err(|_| SyncError::Storage("index registry poisoned".to_string()))?;
        Ok(indexes
            .get(collection)
            .map(|fields| fields.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn is_indexed(&self, collection: &str, field: &str) -> SyncResult<bool> {
        Ok(self.indexed_fields(collection)?.iter().any(|f| f == field))
    }

    fn read_u64(&self, key: &[u8]) -> SyncResult<u64> {
        match self.db.get(key) {
            Ok(Some(value)) => keys::decode_seq(&value)
                .ok_or_else(|| SyncError::Storage("Invalid counter data".to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(storage_err("Database error", e)),
        }
    }

    fn load_document(&self, collection: &str, seq: u64) -> SyncResult<Option<Document>> {
        match self.db.get(keys::doc_key(collection, seq)) {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| storage_err("Corrupt document", e)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err("Database error", e)),
        }
    }

    /// Every `(seq, document)` of `collection` in insertion order.
    fn scan(&self, collection: &str) -> SyncResult<Vec<(u64, Document)>> {
        let prefix = keys::doc_prefix(collection);
        let mut documents = Vec::new();
        for item in self
            .db
            .iterator(IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, value) = item.map_err(|e| storage_err("Failed to scan", e))?;
            if !key.starts_with(&prefix) {
                break;
            }
            let seq = keys::decode_seq(&key)
                .ok_or_else(|| SyncError::Storage("Invalid document key".to_string()))?;
            let document =
                serde_json::from_slice(&value).map_err(|e| storage_err("Corrupt document", e))?;
            documents.push((seq, document));
        }
        Ok(documents)
    }

    /// Sequence numbers under an index prefix, in key order.
    fn index_seqs(
        &self,
        prefix: &[u8],
        order: SortOrder,
        limit: usize,
    ) -> SyncResult<Vec<u64>> {
        let end = keys::prefix_end(prefix);
        let mode = match order {
            SortOrder::Ascending => IteratorMode::From(prefix, Direction::Forward),
            SortOrder::Descending => IteratorMode::From(&end, Direction::Reverse),
        };
        let mut seqs = Vec::new();
        for item in self.db.iterator(mode) {
            let (key, _) = item.map_err(|e| storage_err("Failed to read index", e))?;
            if !key.starts_with(prefix) {
                if order == SortOrder::Descending && &key[..] >= end.as_slice() {
                    continue;
                }
                break;
            }
            if let Some(seq) = keys::decode_seq(&key) {
                seqs.push(seq);
            }
            if seqs.len() == limit {
                break;
            }
        }
        Ok(seqs)
    }

    fn find_with_seq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> SyncResult<Option<(u64, Document)>> {
        if self.is_indexed(collection, field)? {
            let prefix = keys::index_value_prefix(collection, field, Some(value));
            for seq in self.index_seqs(&prefix, SortOrder::Ascending, usize::MAX)? {
                if let Some(document) = self.load_document(collection, seq)? {
                    if document.get(field) == Some(value) {
                        return Ok(Some((seq, document)));
                    }
                }
            }
            return Ok(None);
        }
        Ok(self
            .scan(collection)?
            .into_iter()
            .find(|(_, document)| document.get(field) == Some(value)))
    }

    /// Stage `documents` under freshly allocated sequence numbers.
    fn stage_inserts(
        &self,
        batch: &mut WriteBatch,
        collection: &str,
        documents: &[Document],
    ) -> SyncResult<()> {
        let fields = self.indexed_fields(collection)?;
        let mut seq = self.read_u64(&keys::seq_key(collection))?;
        for document in documents {
            let bytes =
                serde_json::to_vec(document).map_err(|e| storage_err("Failed to encode", e))?;
            batch.put(keys::doc_key(collection, seq), bytes);
            for field in &fields {
                batch.put(
                    keys::index_key(collection, field, document.get(field), seq),
                    b"",
                );
            }
            seq += 1;
        }
        let count = self.read_u64(&keys::count_key(collection))? + documents.len() as u64;
        batch.put(keys::seq_key(collection), seq.to_be_bytes());
        batch.put(keys::count_key(collection), count.to_be_bytes());
        Ok(())
    }

    fn write_documents(&self, collection: &str, documents: &[Document]) -> SyncResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| SyncError::Storage("write lock poisoned".to_string()))?;
        let mut batch = WriteBatch::default();
        self.stage_inserts(&mut batch, collection, documents)?;
        self.db
            .write(batch)
            .map_err(|e| storage_err("Failed to write documents", e))
    }

    /// Declare an index and backfill it from the stored documents.
    fn ensure_index(&self, collection: &str, field: &str) -> SyncResult<()> {
        if self.is_indexed(collection, field)? {
            return Ok(());
        }
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| SyncError::Storage("write lock poisoned".to_string()))?;
        let mut batch = WriteBatch::default();
        let documents = self.scan(collection)?;
        for (seq, document) in &documents {
            batch.put(
                keys::index_key(collection, field, document.get(field), *seq),
                b"",
            );
        }
        batch.put(keys::declared_index_key(collection, field), b"");
        self.db
            .write(batch)
            .map_err(|e| storage_err("Failed to build index", e))?;
        self.indexes
            .write()
            .map_err(|_| SyncError::Storage("index registry poisoned".to_string()))?
            .entry(collection.to_string())
            .or_default()
            .insert(field.to_string());
        debug!(
            "built index {}.{} over {} documents",
            collection,
            field,
            documents.len()
        );
        Ok(())
    }

    /// Distinct values of `field`, keyed by their sortable encoding.
    fn collect_distinct(&self, collection: &str, field: &str) -> SyncResult<BTreeMap<Vec<u8>, Value>> {
        let mut distinct = BTreeMap::new();
        for (_, document) in self.scan(collection)? {
            let value = document.get(field);
            distinct
                .entry(keys::encoded(value))
                .or_insert_with(|| value.cloned().unwrap_or(Value::Null));
        }
        Ok(distinct)
    }

    fn spill_distinct(&self, collection: &str, field: &str) -> SyncResult<Vec<u8>> {
        let scratch = self.next_scratch.fetch_add(1, Ordering::SeqCst);
        let prefix = keys::scratch_prefix(scratch);
        let docs = keys::doc_prefix(collection);
        let mut batch = WriteBatch::default();
        let mut staged = 0usize;
        for item in self
            .db
            .iterator(IteratorMode::From(&docs, Direction::Forward))
        {
            let (key, bytes) = item.map_err(|e| storage_err("Failed to scan", e))?;
            if !key.starts_with(&docs) {
                break;
            }
            let document: Document =
                serde_json::from_slice(&bytes).map_err(|e| storage_err("Corrupt document", e))?;
            let value = document.get(field).cloned().unwrap_or(Value::Null);
            let encoded =
                serde_json::to_vec(&value).map_err(|e| storage_err("Failed to encode", e))?;
            batch.put(keys::scratch_key(scratch, Some(&value)), encoded);
            staged += 1;
            if staged % 10_000 == 0 {
                self.db
                    .write(std::mem::take(&mut batch))
                    .map_err(|e| storage_err("Failed to spill", e))?;
            }
        }
        self.db
            .write(batch)
            .map_err(|e| storage_err("Failed to spill", e))?;
        debug!("spilled {} group keys of {}.{}", staged, collection, field);
        Ok(prefix)
    }
}

#[async_trait]
impl DocumentStore for RocksDocumentStore {
    async fn estimated_count(&self, collection: &str) -> SyncResult<u64> {
        self.read_u64(&keys::count_key(collection))
    }

    async fn find_sorted(
        &self,
        collection: &str,
        field: &str,
        order: SortOrder,
        limit: usize,
    ) -> SyncResult<Vec<Document>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        if self.is_indexed(collection, field)? {
            let prefix = keys::index_prefix(collection, field);
            let mut documents = Vec::new();
            for seq in self.index_seqs(&prefix, order, limit)? {
                if let Some(document) = self.load_document(collection, seq)? {
                    documents.push(document);
                }
            }
            return Ok(documents);
        }

        let mut documents: Vec<(Vec<u8>, Document)> = self
            .scan(collection)?
            .into_iter()
            .map(|(_, document)| (keys::encoded(document.get(field)), document))
            .collect();
        documents.sort_by(|a, b| match order {
            SortOrder::Ascending => a.0.cmp(&b.0),
            SortOrder::Descending => b.0.cmp(&a.0),
        });
        Ok(documents
            .into_iter()
            .take(limit)
            .map(|(_, document)| document)
            .collect())
    }

    async fn find_one(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> SyncResult<Option<Document>> {
        Ok(self
            .find_with_seq(collection, field, value)?
            .map(|(_, document)| document))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> SyncResult<()> {
        self.write_documents(collection, &[document])
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> SyncResult<()> {
        if documents.is_empty() {
            return Ok(());
        }
        self.write_documents(collection, &documents)
    }

    async fn upsert_one(
        &self,
        collection: &str,
        key_field: &str,
        key: &Value,
        fields: Document,
    ) -> SyncResult<UpsertOutcome> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| SyncError::Storage("write lock poisoned".to_string()))?;
        let mut batch = WriteBatch::default();

        let outcome = match self.find_with_seq(collection, key_field, key)? {
            Some((seq, mut document)) => {
                for field in self.indexed_fields(collection)? {
                    if let Some(value) = fields.get(&field) {
                        batch.delete(keys::index_key(collection, &field, document.get(&field), seq));
                        batch.put(keys::index_key(collection, &field, Some(value), seq), b"");
                    }
                }
                document.extend(fields);
                let bytes = serde_json::to_vec(&document)
                    .map_err(|e| storage_err("Failed to encode", e))?;
                batch.put(keys::doc_key(collection, seq), bytes);
                UpsertOutcome::Updated
            }
            None => {
                let mut document = Document::new();
                document.insert(key_field.to_string(), key.clone());
                document.extend(fields);
                self.stage_inserts(&mut batch, collection, &[document])?;
                UpsertOutcome::Inserted
            }
        };

        self.db
            .write(batch)
            .map_err(|e| storage_err("Failed to upsert", e))?;
        Ok(outcome)
    }

    async fn create_index(&self, collection: &str, field: &str) -> SyncResult<()> {
        self.ensure_index(collection, field)
    }

    async fn group_distinct(
        &self,
        collection: &str,
        field: &str,
        options: AggregateOptions,
    ) -> SyncResult<Box<dyn DistinctCursor>> {
        if options.allow_disk_use {
            let prefix = self.spill_distinct(collection, field)?;
            return Ok(Box::new(SpillCursor::new(
                self.db.clone(),
                prefix,
                options.batch_size,
            )));
        }
        let values = self
            .collect_distinct(collection, field)?
            .into_values()
            .collect();
        Ok(Box::new(MemoryCursor::new(values, options.batch_size)))
    }
}
