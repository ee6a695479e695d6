//! Ethereum adapter end to end: preload, receipt parity and account state.

use chainshrew_sync::mock::{MockStore, MockTransport};
use chainshrew_sync::{
    ChainFamily, ChainSync, DocumentStore, EthereumAdapter, SyncError, SyncManager, BLOCK_COLL,
    RECEIPT_COLL, STATE_COLL, TRANSACTION_COLL,
};
use serde_json::json;

use super::block_builder::EthBlockBuilder;
use super::TestUtils;

fn eth_block(height: u64) -> EthBlockBuilder {
    EthBlockBuilder::new(height)
        .add_transaction(&format!("0xt{}a", height), "0xalice", Some("0xbob"))
        .add_transaction(&format!("0xt{}b", height), "0xbob", None)
}

fn scripted_chain(tip: u64) -> MockTransport {
    let transport = MockTransport::new();
    EthBlockBuilder::install_tip(&transport, tip);
    for height in 0..=tip {
        eth_block(height).install(&transport);
    }
    transport
}

#[tokio::test]
async fn test_preload_into_rocksdb() {
    let (_dir, store) = TestUtils::open_store();
    let transport = scripted_chain(25);
    let sync = ChainSync::new(
        EthereumAdapter::new(transport),
        store.clone(),
        TestUtils::config(ChainFamily::Ethereum, 10),
    )
    .unwrap();

    let report = sync.preload(None).await.unwrap();
    assert_eq!((report.from, report.to), (Some(0), Some(20)));
    assert_eq!(report.transactions, 42);
    assert_eq!(store.estimated_count(BLOCK_COLL).await.unwrap(), 21);
    assert_eq!(store.estimated_count(TRANSACTION_COLL).await.unwrap(), 42);
    assert_eq!(store.estimated_count(RECEIPT_COLL).await.unwrap(), 42);

    let block = store
        .find_one(BLOCK_COLL, "height", &json!(20))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(block["time"], 1_438_269_988u64 + 240);
    assert!(!block.contains_key("transactions"));

    let tx = store
        .find_one(TRANSACTION_COLL, "hash", &json!("0xt17b"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tx["height"], 17);
    assert_eq!(sync.local_latest().await.unwrap(), Some(20));
}

#[tokio::test]
async fn test_only_genesis_below_first_bucket() {
    let transport = scripted_chain(50);
    let store = MockStore::new();
    let sync = ChainSync::new(
        EthereumAdapter::new(transport.clone()),
        store.clone(),
        TestUtils::config(ChainFamily::Ethereum, 100),
    )
    .unwrap();

    sync.preload(Some(5)).await.unwrap();
    assert_eq!(store.count(BLOCK_COLL), 1);
    let fetched: Vec<String> = transport
        .requests()
        .into_iter()
        .filter(|r| r.starts_with("eth_getBlockByNumber"))
        .collect();
    assert_eq!(fetched, vec![r#"eth_getBlockByNumber["0x0",true]"#.to_string()]);
}

#[tokio::test]
async fn test_receipt_mismatch_aborts_before_writes() {
    let transport = scripted_chain(10);
    eth_block(3).receipts(1).install(&transport);
    let store = MockStore::new();
    let sync = ChainSync::new(
        EthereumAdapter::new(transport),
        store.clone(),
        TestUtils::config(ChainFamily::Ethereum, 5),
    )
    .unwrap();

    let err = sync.preload(None).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::ReceiptMismatch {
            height: 3,
            transactions: 2,
            receipts: 1
        }
    ));
    assert_eq!(sync.local_latest().await.unwrap(), Some(2));
    assert!(store
        .documents(TRANSACTION_COLL)
        .iter()
        .all(|tx| tx["height"] != 3));
    assert!(store.documents(RECEIPT_COLL).iter().all(|r| r["height"] != 3));
}

#[tokio::test]
async fn test_maintain_state_replaces_snapshots() {
    let (_dir, store) = TestUtils::open_store();
    let transport = scripted_chain(3);
    EthBlockBuilder::install_account(&transport, "0xminer", "0x0");
    EthBlockBuilder::install_account(&transport, "0xalice", "0xde0b6b3a7640000");
    EthBlockBuilder::install_account(&transport, "0xbob", "0x6f05b59d3b20000");
    let sync = ChainSync::new(
        EthereumAdapter::new(transport.clone()),
        store.clone(),
        TestUtils::config(ChainFamily::Ethereum, 1),
    )
    .unwrap();
    sync.preload(None).await.unwrap();

    // miner; from: alice, bob; to: bob (contract creations grouped as null)
    let report = sync.maintain_state().await.unwrap();
    assert_eq!(report.addresses, 4);
    assert_eq!(store.estimated_count(STATE_COLL).await.unwrap(), 3);

    let bob = store
        .find_one(STATE_COLL, "address", &json!("0xbob"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bob["balance"], 0.5);
    assert_eq!(bob["hexBalance"], "0x6f05b59d3b20000");
    assert_eq!(bob["code"], "0x");

    EthBlockBuilder::install_account(&transport, "0xbob", "0x29a2241af62c0000");
    sync.maintain_state().await.unwrap();
    assert_eq!(store.estimated_count(STATE_COLL).await.unwrap(), 3);
    let bob = store
        .find_one(STATE_COLL, "address", &json!("0xbob"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bob["balance"], 3.0);
}

#[tokio::test]
async fn test_account_call_error_aborts_state() {
    let transport = scripted_chain(0);
    EthBlockBuilder::install_account(&transport, "0xminer", "0x1");
    EthBlockBuilder::install_account(&transport, "0xalice", "0x1");
    transport.on_call_error("eth_getCode", vec![json!("0xalice"), json!("latest")], "missing trie node");
    let store = MockStore::new();
    let sync = ChainSync::new(
        EthereumAdapter::new(transport),
        store.clone(),
        TestUtils::config(ChainFamily::Ethereum, 1),
    )
    .unwrap();
    sync.preload(None).await.unwrap();

    assert!(matches!(sync.maintain_state().await, Err(SyncError::Rpc(_))));
    // the miner pass completed before the failure
    assert_eq!(store.count(STATE_COLL), 1);
}
