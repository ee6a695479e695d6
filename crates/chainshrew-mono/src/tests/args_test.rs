use crate::Args;
use chainshrew_sync::ChainFamily;
use clap::Parser;
use std::path::PathBuf;

fn parse(extra: &[&str]) -> Args {
    let mut argv = vec![
        "chainshrew-mono",
        "--chain",
        "eth-mainnet",
        "--db-path",
        "/tmp/chainshrew",
        "--rpc-url",
        "http://localhost:8545",
    ];
    argv.extend_from_slice(extra);
    Args::try_parse_from(argv).unwrap()
}

#[test]
fn test_switches_default_off() {
    let args = parse(&[]);
    assert!(!args.check && !args.preload && !args.state);
    assert_eq!(args.end, None);
    assert_eq!(args.aggregate_batch_size, 1);
    assert_eq!(args.family().unwrap(), ChainFamily::Ethereum);
}

#[test]
fn test_switches_and_end() {
    let args = parse(&["--check", "--preload", "--state", "--end", "5"]);
    assert!(args.check && args.preload && args.state);
    assert_eq!(args.end, Some(5));
}

#[test]
fn test_bucket_size_falls_back_to_family_default() {
    let args = parse(&[]);
    assert_eq!(args.sync_config(ChainFamily::Tron).bucket_size, 1000);
    let args = parse(&["--bucket-size", "10", "--aggregate-batch-size", "50"]);
    let config = args.sync_config(ChainFamily::Ethereum);
    assert_eq!(config.bucket_size, 10);
    assert_eq!(config.aggregate_batch_size, 50);
}

#[test]
fn test_tron_jsonrpc_url() {
    let mut args = parse(&[]);
    args.rpc_url = "http://tron:8090/".to_string();
    assert_eq!(args.tron_jsonrpc_url(), "http://tron:8090/jsonrpc");
    args.tron_jsonrpc_url = Some("http://tron:50545/jsonrpc".to_string());
    assert_eq!(args.tron_jsonrpc_url(), "http://tron:50545/jsonrpc");
}

#[test]
fn test_unknown_chain_rejected() {
    let mut args = parse(&[]);
    args.chain = "solana".to_string();
    assert!(args.family().is_err());
}

#[test]
fn test_db_path_defaults_per_chain() {
    let args = parse(&[]);
    assert_eq!(args.db_path(), PathBuf::from("/tmp/chainshrew"));

    let argv = [
        "chainshrew-mono",
        "--chain",
        "tron-nile",
        "--rpc-url",
        "http://localhost:8090",
    ];
    let args = Args::try_parse_from(argv).unwrap();
    assert_eq!(args.db_path, None);
    assert_eq!(args.db_path(), PathBuf::from("tron-nilerpc"));
}
