//! Checkpoint resolution.
//!
//! The checkpoint is never stored on its own: it is the highest `height`
//! present in the block collection, recomputed from the store on every run.

use log::debug;
use serde_json::Value;

use crate::{DocumentStore, SortOrder, SyncError, SyncResult};

/// Return the highest stored height in `collection`, or `None` when it is empty.
pub async fn resolve_local_latest<S>(
    store: &S,
    collection: &str,
    field: &str,
) -> SyncResult<Option<u64>>
where
    S: DocumentStore + ?Sized,
{
    if store.estimated_count(collection).await? == 0 {
        return Ok(None);
    }

    let mut latest = store
        .find_sorted(collection, field, SortOrder::Descending, 1)
        .await?;
    let Some(document) = latest.pop() else {
        return Ok(None);
    };

    let value = document
        .get(field)
        .ok_or_else(|| SyncError::UnknownHeight(format!("missing {} field", field)))?;
    let height = decode_height(value)?;
    debug!("local latest {} in {}", height, collection);
    Ok(Some(height))
}

/// Decode a stored height written under any of the known encodings.
///
/// Plain JSON integers cover the 32/64-bit signed and unsigned widths.
/// Extended-JSON `$numberInt` / `$numberLong` wrappers are accepted as well.
pub fn decode_height(value: &Value) -> SyncResult<u64> {
    let signed = match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| SyncError::UnknownHeight(n.to_string()))?,
        Value::Object(wrapper) if wrapper.len() == 1 => {
            let (key, inner) = wrapper
                .iter()
                .next()
                .ok_or_else(|| SyncError::UnknownHeight(value.to_string()))?;
            match (key.as_str(), inner) {
                ("$numberInt", Value::String(s)) => s
                    .parse::<i32>()
                    .map(i64::from)
                    .map_err(|_| SyncError::UnknownHeight(value.to_string()))?,
                ("$numberLong", Value::String(s)) => s
                    .parse::<i64>()
                    .map_err(|_| SyncError::UnknownHeight(value.to_string()))?,
                _ => return Err(SyncError::UnknownHeight(value.to_string())),
            }
        }
        other => return Err(SyncError::UnknownHeight(other.to_string())),
    };

    u64::try_from(signed).map_err(|_| SyncError::UnknownHeight(signed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_plain_integers() {
        assert_eq!(decode_height(&json!(0)).unwrap(), 0);
        assert_eq!(decode_height(&json!(u32::MAX)).unwrap(), u32::MAX as u64);
        assert_eq!(decode_height(&json!(i64::MAX)).unwrap(), i64::MAX as u64);
    }

    #[test]
    fn test_decode_extended_json() {
        assert_eq!(decode_height(&json!({"$numberInt": "42"})).unwrap(), 42);
        assert_eq!(
            decode_height(&json!({"$numberLong": "17000000"})).unwrap(),
            17_000_000
        );
    }

    #[test]
    fn test_decode_rejects_unknown_encodings() {
        for value in [
            json!(1.5),
            json!("0x10"),
            json!(-1),
            json!(u64::MAX),
            json!(null),
            json!({"$numberDouble": "1.0"}),
            json!({"$numberInt": "99999999999"}),
        ] {
            assert!(
                matches!(decode_height(&value), Err(SyncError::UnknownHeight(_))),
                "{} should be rejected",
                value
            );
        }
    }

    #[tokio::test]
    async fn test_mixed_encodings_sort_numerically() {
        use crate::mock::MockStore;
        use crate::{Document, BLOCK_COLL, HEIGHT_FIELD};

        let block = |height: serde_json::Value| -> Document {
            let mut document = Document::new();
            document.insert(HEIGHT_FIELD.to_string(), height);
            document
        };
        let store = MockStore::new();
        store.seed(
            BLOCK_COLL,
            vec![
                block(json!(7)),
                block(json!({"$numberLong": "120"})),
                block(json!({"$numberInt": "30"})),
            ],
        );
        assert_eq!(
            resolve_local_latest(&store, BLOCK_COLL, HEIGHT_FIELD).await.unwrap(),
            Some(120)
        );

        store.seed(BLOCK_COLL, vec![block(json!(200))]);
        assert_eq!(
            resolve_local_latest(&store, BLOCK_COLL, HEIGHT_FIELD).await.unwrap(),
            Some(200)
        );
    }
}
