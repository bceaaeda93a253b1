use anyhow::{anyhow, bail, Context};
use std::sync::Arc;
use tokio::signal;

use polytix_client::chain::{HttpWalletProvider, JsonRpcClient, RpcCampaignContract};
use polytix_client::config::Config;
use polytix_client::models::{CampaignFilter, CampaignId};
use polytix_client::service::VotingClient;
use polytix_client::telemetry::init_telemetry;

type Client = VotingClient<HttpWalletProvider, RpcCampaignContract>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_telemetry(&config.rust_log);

    let retry = (&config.confirmation).into();
    let reader_rpc = Arc::new(JsonRpcClient::new(config.chain.rpc_url()));
    tracing::debug!(rpc = reader_rpc.url(), "Campaign reads use chain RPC");
    let reader = Arc::new(RpcCampaignContract::with_retry_config(
        reader_rpc,
        config.contract.address,
        retry,
    ));

    let (provider, signer, watcher) = match &config.wallet.provider_url {
        Some(url) => {
            let wallet_rpc = Arc::new(JsonRpcClient::new(url.as_str()));
            let provider = Arc::new(HttpWalletProvider::new(Arc::clone(&wallet_rpc)));
            let signer = Arc::new(RpcCampaignContract::with_retry_config(
                wallet_rpc,
                config.contract.address,
                (&config.confirmation).into(),
            ));
            let watcher = provider.spawn_change_watcher(config.wallet.event_poll_interval);
            (Some(provider), Some(signer), Some(watcher))
        }
        None => (None, None, None),
    };

    tracing::info!(
        chain = %config.chain.chain_id,
        contract = %config.contract.address,
        wallet = config.wallet.provider_url.is_some(),
        "Starting Polytix client"
    );

    let client: Client = VotingClient::new(
        config.chain.clone(),
        config.wallet.balance_poll_interval,
        provider,
        reader,
        signer,
    );
    client.init().await;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = run(&client, &args, &config.chain.native_currency.symbol).await;

    client.teardown();
    if let Some(watcher) = watcher {
        watcher.abort();
    }
    result
}

async fn run(client: &Client, args: &[String], currency: &str) -> anyhow::Result<()> {
    let command = args.first().map(String::as_str).unwrap_or("list");
    match command {
        "list" => {
            let filter = CampaignFilter {
                search: args.get(1).cloned(),
                restriction: None,
            };
            for campaign in client.campaigns(&filter).await? {
                println!(
                    "#{:<4} {:<10} {:<24} {}",
                    campaign.id,
                    campaign.status.to_string(),
                    campaign.restriction.to_string(),
                    campaign.description
                );
            }
        }
        "show" => {
            let id = campaign_id(args)?;
            let view = client.campaign_view(id).await?;
            print_json(&view)?;
        }
        "connect" => {
            let wallet = client.connect().await?;
            if let Some(address) = wallet.address() {
                println!("Connected {} ({} {currency})", address.short(), wallet.formatted_balance());
            }
        }
        "register" => {
            let id = campaign_id(args)?;
            let key = args.get(2).map(String::as_str);
            let outcome = client.register(id, key).await?;
            println!("Registered in campaign {id}: {}", outcome.receipt.hash);
        }
        "vote" => {
            let id = campaign_id(args)?;
            let proposal: u64 = args
                .get(2)
                .ok_or_else(|| anyhow!("usage: vote <campaign-id> <proposal-id>"))?
                .parse()?;
            let outcome = client.vote(id, proposal).await?;
            println!("Voted for proposal {proposal} in campaign {id}: {}", outcome.receipt.hash);
        }
        "watch" => watch(client).await?,
        other => bail!("unknown command `{other}`; expected list, show, connect, register, vote or watch"),
    }
    Ok(())
}

/// Prints wallet updates and notices until interrupted.
async fn watch(client: &Client) -> anyhow::Result<()> {
    let mut wallet = client.subscribe_wallet();
    let mut notices = client.subscribe_notices();
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down");
                return Ok(());
            }
            changed = wallet.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let snapshot = wallet.borrow_and_update().clone();
                print_json(&snapshot)?;
            }
            notice = notices.recv() => match notice {
                Ok(notice) => println!("[{:?}] {}", notice.level, notice.message),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Notice stream lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
    }
}

fn campaign_id(args: &[String]) -> anyhow::Result<CampaignId> {
    args.get(1)
        .ok_or_else(|| anyhow!("usage: {} <campaign-id>", args.first().map(String::as_str).unwrap_or("show")))?
        .parse()
        .context("campaign id must be a number")
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
