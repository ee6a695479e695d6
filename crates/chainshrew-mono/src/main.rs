use anyhow::Result;
use chainshrew_mono::{run_prod, Args};
use clap::Parser;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let args = Args::parse();
    info!("Starting chainshrew-mono for chain {}", args.chain);
    info!("System has {} CPU cores available", num_cpus::get());

    run_prod(args).await
}
