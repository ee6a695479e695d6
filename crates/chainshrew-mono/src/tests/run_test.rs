use crate::{run, Args};
use chainshrew_rocksdb::RocksDocumentStore;
use chainshrew_sync::mock::MockChain;
use chainshrew_sync::{
    AccountFields, ChainBlock, ChainFamily, Document, DocumentStore, BLOCK_COLL, STATE_COLL,
    TRANSACTION_COLL,
};
use serde_json::{json, Value};
use tempfile::tempdir;

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

fn args(db_path: std::path::PathBuf) -> Args {
    Args {
        chain: "tron-nile".to_string(),
        db_path: Some(db_path),
        end: None,
        check: false,
        preload: false,
        state: false,
        rpc_url: "http://localhost:8090".to_string(),
        auth: None,
        tron_jsonrpc_url: None,
        bucket_size: Some(5),
        aggregate_batch_size: 2,
    }
}

fn tron_chain() -> MockChain {
    let chain = MockChain::new(ChainFamily::Tron);
    for height in 0..=7u64 {
        chain.add_block(ChainBlock {
            height,
            block: doc(json!({"blockID": format!("b{}", height), "height": height, "miner": "41aa"})),
            transactions: vec![doc(json!({
                "txID": format!("t{}", height),
                "from": "41bb",
                "to": "41cc",
                "height": height,
            }))],
            ..Default::default()
        });
    }
    for address in ["41aa", "41bb", "41cc"] {
        chain.set_account(
            address,
            AccountFields {
                balance: "0xf4240".to_string(),
                code: "0x".to_string(),
                storage: "0x0".to_string(),
            },
        );
    }
    chain
}

#[tokio::test]
async fn test_run_applies_switches_in_order() {
    let dir = tempdir().unwrap();
    let store =
        RocksDocumentStore::open_optimized(dir.path().to_string_lossy().to_string()).unwrap();
    let chain = tron_chain();

    let mut args = args(dir.path().to_path_buf());
    args.check = true;
    args.preload = true;
    args.state = true;
    run(args, chain.clone(), store.clone()).await.unwrap();

    // check ran on an empty store, so only preload fetched: 0..=5
    assert_eq!(chain.fetched_heights(), vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(store.estimated_count(BLOCK_COLL).await.unwrap(), 6);
    assert_eq!(store.estimated_count(TRANSACTION_COLL).await.unwrap(), 6);
    assert_eq!(store.estimated_count(STATE_COLL).await.unwrap(), 3);

    let state = store
        .find_one(STATE_COLL, "address", &json!("41bb"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state["balance"], 1.0);
}

#[tokio::test]
async fn test_run_without_switches_does_nothing() {
    let dir = tempdir().unwrap();
    let store =
        RocksDocumentStore::open_optimized(dir.path().to_string_lossy().to_string()).unwrap();
    let chain = tron_chain();
    run(args(dir.path().to_path_buf()), chain.clone(), store.clone())
        .await
        .unwrap();
    assert!(chain.fetched_heights().is_empty());
    assert_eq!(store.estimated_count(BLOCK_COLL).await.unwrap(), 0);
}
