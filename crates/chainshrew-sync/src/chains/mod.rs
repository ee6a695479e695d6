//! Chain adapters, one per family.
//!
//! Each adapter wraps an [`RpcTransport`] and turns the node's block payload
//! into a [`ChainBlock`](crate::ChainBlock): numeric `height` attached to every
//! document, embedded transactions split out, family extras fetched.

pub mod bitcoin;
pub mod ethereum;
pub mod tron;

pub use bitcoin::BitcoinAdapter;
pub use ethereum::EthereumAdapter;
pub use tron::TronAdapter;

use serde_json::{json, Value};

use crate::{AccountFields, BatchCall, Document, RpcTransport, SyncError, SyncResult, HEIGHT_FIELD};

/// Block tag used for every account query.
pub const LATEST: &str = "latest";

/// Storage slot captured in account snapshots.
pub const STORAGE_SLOT_ZERO: &str = "0x0";

/// `0x`-prefixed quantity encoding.
pub fn to_hex_quantity(n: u64) -> String {
    format!("0x{:x}", n)
}

/// Decode a `0x`-prefixed hex quantity.
pub fn parse_hex_quantity(value: &Value, height: u64, field: &str) -> SyncResult<u64> {
    let s = value.as_str().ok_or_else(|| SyncError::Decode {
        height,
        message: format!("{} is not a hex string: {}", field, value),
    })?;
    let digits = s.strip_prefix("0x").ok_or_else(|| SyncError::Decode {
        height,
        message: format!("{} lacks 0x prefix: {}", field, s),
    })?;
    u64::from_str_radix(digits, 16).map_err(|e| SyncError::Decode {
        height,
        message: format!("{} {}: {}", field, s, e),
    })
}

/// Require a JSON object, as every block, transaction and receipt is.
pub fn into_document(value: Value, height: u64, what: &str) -> SyncResult<Document> {
    match value {
        Value::Object(document) => Ok(document),
        other => Err(SyncError::Decode {
            height,
            message: format!("{} is not an object: {}", what, other),
        }),
    }
}

/// Take an embedded array out of `document`. A missing or null member is an empty list.
pub fn take_array(document: &mut Document, key: &str, height: u64) -> SyncResult<Vec<Value>> {
    match document.remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(SyncError::Decode {
            height,
            message: format!("{} is not an array: {}", key, other),
        }),
    }
}

/// Turn a list of JSON values into documents carrying `height`.
pub fn with_height(items: Vec<Value>, height: u64, what: &str) -> SyncResult<Vec<Document>> {
    items
        .into_iter()
        .map(|item| {
            let mut document = into_document(item, height, what)?;
            document.insert(HEIGHT_FIELD.to_string(), Value::from(height));
            Ok(document)
        })
        .collect()
}

/// One batched round trip for balance, code and storage slot `0x0` at `latest`.
///
/// A per-call error inside the batch fails the whole fetch.
pub async fn fetch_account_fields<T>(transport: &T, address: &str) -> SyncResult<AccountFields>
where
    T: RpcTransport + ?Sized,
{
    let calls = vec![
        BatchCall::new("eth_getBalance", vec![json!(address), json!(LATEST)]),
        BatchCall::new("eth_getCode", vec![json!(address), json!(LATEST)]),
        BatchCall::new(
            "eth_getStorageAt",
            vec![json!(address), json!(STORAGE_SLOT_ZERO), json!(LATEST)],
        ),
    ];
    let methods: Vec<String> = calls.iter().map(|c| c.method.clone()).collect();
    let results = transport.batch(calls).await?;
    if results.len() != methods.len() {
        return Err(SyncError::Rpc(format!(
            "batch for {} returned {} results, expected {}",
            address,
            results.len(),
            methods.len()
        )));
    }

    let mut fields = Vec::with_capacity(methods.len());
    for (method, result) in methods.iter().zip(results) {
        let value = result.map_err(|e| SyncError::Rpc(format!("{} {}: {}", method, address, e)))?;
        let s = value
            .as_str()
            .ok_or_else(|| SyncError::Rpc(format!("{} {} returned {}", method, address, value)))?;
        fields.push(s.to_string());
    }

    let storage = fields.pop().unwrap_or_default();
    let code = fields.pop().unwrap_or_default();
    let balance = fields.pop().unwrap_or_default();
    Ok(AccountFields {
        balance,
        code,
        storage,
    })
}
