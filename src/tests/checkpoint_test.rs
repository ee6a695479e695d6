//! Checkpoint resolution against the RocksDB store.

use chainshrew_sync::mock::MockTransport;
use chainshrew_sync::{
    resolve_local_latest, ChainFamily, ChainSync, DocumentStore, EthereumAdapter, SyncError,
    SyncManager, BLOCK_COLL, HEIGHT_FIELD,
};
use serde_json::json;

use super::block_builder::EthBlockBuilder;
use super::TestUtils;

fn scripted_chain(tip: u64) -> MockTransport {
    let transport = MockTransport::new();
    EthBlockBuilder::install_tip(&transport, tip);
    for height in 0..=tip {
        EthBlockBuilder::new(height)
            .add_transaction(&format!("0x{}", height), "0xa", Some("0xb"))
            .install(&transport);
    }
    transport
}

#[tokio::test]
async fn test_checkpoint_survives_reopen() {
    let (dir, store) = TestUtils::open_store();
    {
        let sync = ChainSync::new(
            EthereumAdapter::new(scripted_chain(12)),
            store,
            TestUtils::config(ChainFamily::Ethereum, 5),
        )
        .unwrap();
        sync.preload(None).await.unwrap();
    }

    let store = TestUtils::reopen_store(&dir);
    let transport = scripted_chain(17);
    let sync = ChainSync::new(
        EthereumAdapter::new(transport.clone()),
        store,
        TestUtils::config(ChainFamily::Ethereum, 5),
    )
    .unwrap();
    assert_eq!(sync.local_latest().await.unwrap(), Some(10));

    let report = sync.preload(None).await.unwrap();
    assert_eq!((report.from, report.to), (Some(11), Some(15)));
    let first_fetch = transport
        .requests()
        .into_iter()
        .find(|r| r.starts_with("eth_getBlockByNumber"));
    assert_eq!(
        first_fetch.as_deref(),
        Some(r#"eth_getBlockByNumber["0xb",true]"#)
    );
}

#[tokio::test]
async fn test_checkpoint_across_encodings() {
    let (_dir, store) = TestUtils::open_store();
    assert_eq!(
        resolve_local_latest(&store, BLOCK_COLL, HEIGHT_FIELD).await.unwrap(),
        None
    );
    store
        .insert_many(
            BLOCK_COLL,
            vec![
                TestUtils::doc(json!({"height": 5})),
                TestUtils::doc(json!({"height": {"$numberLong": "7"}})),
                TestUtils::doc(json!({"height": {"$numberInt": "6"}})),
            ],
        )
        .await
        .unwrap();
    assert_eq!(
        resolve_local_latest(&store, BLOCK_COLL, HEIGHT_FIELD).await.unwrap(),
        Some(7)
    );
}

#[tokio::test]
async fn test_undecodable_checkpoint() {
    for bad in [json!(2.5), json!("12"), json!({"$numberLong": "x"})] {
        let (_dir, store) = TestUtils::open_store();
        store
            .insert_many(
                BLOCK_COLL,
                vec![
                    TestUtils::doc(json!({"height": 1})),
                    TestUtils::doc(json!({ "height": bad })),
                ],
            )
            .await
            .unwrap();
        assert!(matches!(
            resolve_local_latest(&store, BLOCK_COLL, HEIGHT_FIELD).await,
            Err(SyncError::UnknownHeight(_))
        ));
    }
}
