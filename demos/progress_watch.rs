//! Watches one campaign's funding progress and the pledge result queues.
//!
//! Usage: `cargo run --example progress_watch -- <token-file> <campaign-id> [ws-url]`

use std::sync::Arc;

use anyhow::{Context, bail};
use crowdfund_realtime::{
    Binding, ClientConfig, ConnectionState, DEFAULT_ENDPOINT, RealtimeClient, storage::FileTokenStore,
    topics,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(token_file), Some(campaign)) = (args.next(), args.next()) else {
        bail!("usage: progress_watch <token-file> <campaign-id> [ws-url]");
    };
    let url = args.next().unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

    let client = RealtimeClient::new(ClientConfig::new(url), Arc::new(FileTokenStore::new(token_file)));
    client.on_connect(|info| println!("connected (session {:?})", info.session));
    client.on_error(|e| eprintln!("realtime error: {e}"));
    client.on_close(|reason| println!("connection closed: {reason:?}"));

    client.connect().await;
    let mut state = client.watch_state();
    state
        .wait_for(|s| *s == ConnectionState::Connected)
        .await
        .context("client dropped before connecting")?;

    let mut progress = Binding::new(client.clone(), |id: &String| topics::campaign_progress(id), |event| {
        println!("[{}] progress: {}", event.received_at, event.payload);
    });
    progress.bind(campaign)?;

    let mut success = Binding::fixed(client.clone(), topics::PLEDGE_SUCCESS, |event| {
        println!("pledge accepted: {}", event.payload);
    });
    success.bind(())?;
    let mut failure = Binding::fixed(client.clone(), topics::PLEDGE_ERROR, |event| {
        println!("pledge rejected: {}", event.payload);
    });
    failure.bind(())?;

    tokio::signal::ctrl_c().await?;
    drop((progress, success, failure));
    client.disconnect().await;
    Ok(())
}
