//! Mock implementations for testing

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, RwLock};

use crate::{
    AccountFields, AggregateOptions, BatchCall, ChainAdapter, ChainBlock, ChainFamily,
    DistinctCursor, Document, DocumentStore, JsonRpcError, RpcTransport, SortOrder, SyncError,
    SyncResult, UpsertOutcome,
};

/// Mock chain adapter serving pre-normalized blocks.
#[derive(Debug, Clone)]
pub struct MockChain {
    family: ChainFamily,
    blocks: Arc<RwLock<HashMap<u64, ChainBlock>>>,
    tip_height: Arc<RwLock<u64>>,
    accounts: Arc<RwLock<HashMap<String, AccountFields>>>,
    failing_heights: Arc<RwLock<HashSet<u64>>>,
    fetched: Arc<Mutex<Vec<u64>>>,
    account_requests: Arc<Mutex<Vec<String>>>,
    connected: Arc<RwLock<bool>>,
}

impl MockChain {
    pub fn new(family: ChainFamily) -> Self {
        Self {
            family,
            blocks: Arc::new(RwLock::new(HashMap::new())),
            tip_height: Arc::new(RwLock::new(0)),
            accounts: Arc::new(RwLock::new(HashMap::new())),
            failing_heights: Arc::new(RwLock::new(HashSet::new())),
            fetched: Arc::new(Mutex::new(Vec::new())),
            account_requests: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(RwLock::new(true)),
        }
    }

    /// Add a block, moving the tip up when it is the highest so far.
    pub fn add_block(&self, block: ChainBlock) {
        let height = block.height;
        self.blocks.write().unwrap().insert(height, block);
        let mut tip = self.tip_height.write().unwrap();
        if height > *tip {
            *tip = height;
        }
    }

    pub fn set_tip(&self, height: u64) {
        *self.tip_height.write().unwrap() = height;
    }

    pub fn set_account(&self, address: &str, fields: AccountFields) {
        self.accounts
            .write()
            .unwrap()
            .insert(address.to_string(), fields);
    }

    /// Make every fetch of `height` fail with an RPC error.
    pub fn fail_at(&self, height: u64) {
        self.failing_heights.write().unwrap().insert(height);
    }

    pub fn set_connected(&self, connected: bool) {
        *self.connected.write().unwrap() = connected;
    }

    /// Heights fetched so far, in request order.
    pub fn fetched_heights(&self) -> Vec<u64> {
        self.fetched.lock().unwrap().clone()
    }

    /// Addresses whose account fields were requested, in request order.
    pub fn account_requests(&self) -> Vec<String> {
        self.account_requests.lock().unwrap().clone()
    }

    fn ensure_connected(&self) -> SyncResult<()> {
        if !*self.connected.read().unwrap() {
            return Err(SyncError::Rpc("Node not connected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainAdapter for MockChain {
    fn family(&self) -> ChainFamily {
        self.family
    }

    async fn get_remote_tip_height(&self) -> SyncResult<u64> {
        self.ensure_connected()?;
        Ok(*self.tip_height.read().unwrap())
    }

    async fn get_block_by_height(&self, height: u64, include_txs: bool) -> SyncResult<ChainBlock> {
        self.ensure_connected()?;
        self.fetched.lock().unwrap().push(height);
        if self.failing_heights.read().unwrap().contains(&height) {
            return Err(SyncError::Rpc(format!("injected failure at {}", height)));
        }
        let mut block = self
            .blocks
            .read()
            .unwrap()
            .get(&height)
            .cloned()
            .ok_or_else(|| SyncError::Rpc(format!("Block {} not found", height)))?;
        if !include_txs {
            block.transactions.clear();
            block.receipts.clear();
            block.transaction_infos.clear();
        }
        Ok(block)
    }

    async fn get_receipts(&self, height: u64) -> SyncResult<Vec<Document>> {
        self.ensure_connected()?;
        if self.family != ChainFamily::Ethereum {
            return Err(SyncError::Unsupported("receipts".to_string()));
        }
        self.blocks
            .read()
            .unwrap()
            .get(&height)
            .map(|block| block.receipts.clone())
            .ok_or_else(|| SyncError::Rpc(format!("Block {} not found", height)))
    }

    async fn batch_get_account_fields(&self, address: &str) -> SyncResult<AccountFields> {
        self.ensure_connected()?;
        if self.family.balance_decimals().is_none() {
            return Err(SyncError::Unsupported("account state".to_string()));
        }
        self.account_requests
            .lock()
            .unwrap()
            .push(address.to_string());
        self.accounts
            .read()
            .unwrap()
            .get(address)
            .cloned()
            .ok_or_else(|| SyncError::Rpc(format!("unknown account {}", address)))
    }
}

/// A store operation, recorded in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    InsertOne { collection: String },
    InsertMany { collection: String, count: usize },
    Upsert { collection: String },
    CreateIndex { collection: String, field: String },
}

/// Mock in-memory document store
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    collections: Arc<Mutex<HashMap<String, Vec<Document>>>>,
    indexes: Arc<Mutex<HashSet<(String, String)>>>,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    failing_collections: Arc<RwLock<HashSet<String>>>,
    index_error: Arc<RwLock<bool>>,
    batches_served: Arc<AtomicUsize>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write to `collection` fails from now on.
    pub fn fail_writes_to(&self, collection: &str) {
        self.failing_collections
            .write()
            .unwrap()
            .insert(collection.to_string());
    }

    /// Make `create_index` fail.
    pub fn set_index_error(&self, fail: bool) {
        *self.index_error.write().unwrap() = fail;
    }

    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn count(&self, collection: &str) -> usize {
        self.documents(collection).len()
    }

    /// Seed a collection directly, bypassing the operation log.
    pub fn seed(&self, collection: &str, documents: Vec<Document>) {
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
    }

    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().unwrap().clone()
    }

    pub fn has_index(&self, collection: &str, field: &str) -> bool {
        self.indexes
            .lock()
            .unwrap()
            .contains(&(collection.to_string(), field.to_string()))
    }

    /// Cursor batches handed out by `group_distinct` cursors.
    pub fn batches_served(&self) -> usize {
        self.batches_served.load(AtomicOrdering::SeqCst)
    }

    fn ensure_writable(&self, collection: &str) -> SyncResult<()> {
        if self.failing_collections.read().unwrap().contains(collection) {
            return Err(SyncError::Storage(format!("write to {} refused", collection)));
        }
        Ok(())
    }

    fn record(&self, op: StoreOp) {
        self.operations.lock().unwrap().push(op);
    }
}

/// Numeric value of a JSON number or an extended-JSON number wrapper.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Object(wrapper) if wrapper.len() == 1 => {
            let (key, inner) = wrapper.iter().next()?;
            match key.as_str() {
                "$numberInt" | "$numberLong" | "$numberDouble" => inner.as_str()?.parse().ok(),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Rank used to order values of different JSON types: absent/null, numbers, strings, the rest.
fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(v) if numeric(v).is_some() => 1,
        Some(Value::String(_)) => 2,
        Some(_) => 3,
    }
}

fn compare_field(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    type_rank(a).cmp(&type_rank(b)).then_with(|| match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) if x.is_i64() && y.is_i64() => {
            x.as_i64().cmp(&y.as_i64())
        }
        (Some(x), Some(y)) => match (numeric(x), numeric(y)) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => match (x, y) {
                (Value::String(x), Value::String(y)) => x.cmp(y),
                _ => x.to_string().cmp(&y.to_string()),
            },
        },
        _ => Ordering::Equal,
    })
}

#[async_trait]
impl DocumentStore for MockStore {
    async fn estimated_count(&self, collection: &str) -> SyncResult<u64> {
        Ok(self.count(collection) as u64)
    }

    async fn find_sorted(
        &self,
        collection: &str,
        field: &str,
        order: SortOrder,
        limit: usize,
    ) -> SyncResult<Vec<Document>> {
        let mut documents = self.documents(collection);
        documents.sort_by(|a, b| {
            let ordering = compare_field(a.get(field), b.get(field));
            match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });
        documents.truncate(limit);
        Ok(documents)
    }

    async fn find_one(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> SyncResult<Option<Document>> {
        Ok(self
            .documents(collection)
            .into_iter()
            .find(|document| document.get(field) == Some(value)))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> SyncResult<()> {
        self.ensure_writable(collection)?;
        self.record(StoreOp::InsertOne {
            collection: collection.to_string(),
        });
        self.seed(collection, vec![document]);
        Ok(())
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> SyncResult<()> {
        self.ensure_writable(collection)?;
        self.record(StoreOp::InsertMany {
            collection: collection.to_string(),
            count: documents.len(),
        });
        self.seed(collection, documents);
        Ok(())
    }

    async fn upsert_one(
        &self,
        collection: &str,
        key_field: &str,
        key: &Value,
        fields: Document,
    ) -> SyncResult<UpsertOutcome> {
        self.ensure_writable(collection)?;
        self.record(StoreOp::Upsert {
            collection: collection.to_string(),
        });
        let mut collections = self.collections.lock().unwrap();
        let documents = collections.entry(collection.to_string()).or_default();
        if let Some(existing) = documents
            .iter_mut()
            .find(|document| document.get(key_field) == Some(key))
        {
            existing.extend(fields);
            return Ok(UpsertOutcome::Updated);
        }
        let mut document = Document::new();
        document.insert(key_field.to_string(), key.clone());
        document.extend(fields);
        documents.push(document);
        Ok(UpsertOutcome::Inserted)
    }

    async fn create_index(&self, collection: &str, field: &str) -> SyncResult<()> {
        if *self.index_error.read().unwrap() {
            return Err(SyncError::Storage("not authorized to create index".to_string()));
        }
        self.record(StoreOp::CreateIndex {
            collection: collection.to_string(),
            field: field.to_string(),
        });
        self.indexes
            .lock()
            .unwrap()
            .insert((collection.to_string(), field.to_string()));
        Ok(())
    }

    async fn group_distinct(
        &self,
        collection: &str,
        field: &str,
        options: AggregateOptions,
    ) -> SyncResult<Box<dyn DistinctCursor>> {
        let mut seen = HashSet::new();
        let mut values = VecDeque::new();
        for document in self.documents(collection) {
            let value = document.get(field).cloned().unwrap_or(Value::Null);
            if seen.insert(value.to_string()) {
                values.push_back(value);
            }
        }
        Ok(Box::new(MockCursor {
            values,
            batch_size: options.batch_size.max(1) as usize,
            batches_served: self.batches_served.clone(),
        }))
    }
}

struct MockCursor {
    values: VecDeque<Value>,
    batch_size: usize,
    batches_served: Arc<AtomicUsize>,
}

#[async_trait]
impl DistinctCursor for MockCursor {
    async fn next_batch(&mut self) -> SyncResult<Option<Vec<Value>>> {
        if self.values.is_empty() {
            return Ok(None);
        }
        let take = self.batch_size.min(self.values.len());
        self.batches_served.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(Some(self.values.drain(..take).collect()))
    }
}

/// Canned response for a mocked call.
pub type MockResponse = Result<Value, JsonRpcError>;

/// Mock transport answering from canned responses keyed by method and params.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    calls: Arc<RwLock<HashMap<String, MockResponse>>>,
    posts: Arc<RwLock<HashMap<String, Value>>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn call_key(method: &str, params: &[Value]) -> String {
        format!("{}{}", method, Value::Array(params.to_vec()))
    }

    fn post_key(path: &str, body: &Value) -> String {
        format!("{}{}", path, body)
    }

    /// Answer `method(params)` with `result`.
    pub fn on_call(&self, method: &str, params: Vec<Value>, result: Value) {
        self.calls
            .write()
            .unwrap()
            .insert(Self::call_key(method, &params), Ok(result));
    }

    /// Answer `method(params)` with a JSON-RPC error.
    pub fn on_call_error(&self, method: &str, params: Vec<Value>, message: &str) {
        self.calls.write().unwrap().insert(
            Self::call_key(method, &params),
            Err(JsonRpcError {
                code: -32000,
                message: message.to_string(),
                data: None,
            }),
        );
    }

    /// Answer a POST of `body` to `path` with `response`.
    pub fn on_post(&self, path: &str, body: Value, response: Value) {
        self.posts
            .write()
            .unwrap()
            .insert(Self::post_key(path, &body), response);
    }

    /// Every request made so far, as `method[params]` or `path{body}`.
    pub fn requests(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn lookup(&self, method: &str, params: &[Value]) -> SyncResult<MockResponse> {
        let key = Self::call_key(method, params);
        self.log.lock().unwrap().push(key.clone());
        self.calls
            .read()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| SyncError::Rpc(format!("unexpected call {}", key)))
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn call(&self, method: &str, params: Vec<Value>) -> SyncResult<Value> {
        self.lookup(method, &params)?
            .map_err(|e| SyncError::Rpc(format!("{}: {}", method, e)))
    }

    async fn batch(&self, calls: Vec<BatchCall>) -> SyncResult<Vec<Result<Value, JsonRpcError>>> {
        calls
            .iter()
            .map(|call| self.lookup(&call.method, &call.params))
            .collect()
    }

    async fn post(&self, path: &str, body: Value) -> SyncResult<Value> {
        let key = Self::post_key(path, &body);
        self.log.lock().unwrap().push(key.clone());
        self.posts
            .read()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| SyncError::Rpc(format!("unexpected post {}", key)))
    }
}
