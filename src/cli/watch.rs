use anyhow::Result;
use clap::Args;

use super::session::{self, Client};
use crate::catalog::{Catalog, ContentItem};
use crate::config::GlobalConfig;
use crate::paywall::{
    Access, ContentGate, PaywallController, PaywallResult, PurchaseOption, PurchaseResolution,
};

#[derive(Args)]
pub struct WatchArgs {
    /// Catalog item id
    item_id: String,

    /// Subscribe with this package if the item is gated (e.g. premium)
    #[arg(long, value_name = "PRODUCT")]
    buy: Option<String>,
}

fn now_playing(item: &ContentItem) {
    println!("Now playing: \"{}\" by {}", item.title, item.creator_name);
}

/// Options from the current offering, or the default premium option
async fn purchase_options(client: &Client) -> Vec<PurchaseOption> {
    client
        .offerings()
        .await
        .current
        .map(|offering| PurchaseOption::from_offering(&offering))
        .unwrap_or_default()
}

pub async fn run(args: WatchArgs, config: &GlobalConfig) -> Result<()> {
    let catalog = Catalog::load_or_demo(config.catalog_path());
    let item = catalog
        .get(&args.item_id)
        .ok_or_else(|| anyhow::anyhow!("No catalog item with id '{}'", args.item_id))?;

    let session = session::connect(config).await?;
    let mut paywall = PaywallController::new(session.client.clone())
        .with_options(purchase_options(&session.client).await);
    paywall.on_purchase_success(|item, attempt| {
        tracing::info!(item = %item.id, product_id = %attempt.product_id, "Purchase confirmed");
    });
    let gate = ContentGate::with_paywall(session.client.clone(), paywall);

    if let Access::Granted = gate.request_access(item).await {
        now_playing(item);
        return Ok(());
    }

    if let Some(view) = gate.paywall().view().await {
        println!("{}\n", view);
    }

    let Some(product_id) = args.buy else {
        println!("Run again with --buy <PRODUCT> to subscribe.");
        gate.dismiss().await;
        return Ok(());
    };

    match gate.purchase(&product_id).await {
        PurchaseResolution::Unlocked { item, tier } => {
            println!("Subscribed ({})", tier);
            now_playing(&item);
        }
        PurchaseResolution::InsufficientTier { .. }
        | PurchaseResolution::Pending(PaywallResult::Retry { .. }) => {
            if let Some(view) = gate.paywall().view().await {
                println!("{}", view);
            }
        }
        PurchaseResolution::Pending(PaywallResult::Purchased { .. })
        | PurchaseResolution::Pending(PaywallResult::Busy)
        | PurchaseResolution::Pending(PaywallResult::NotOpen) => {
            println!("Nothing to purchase");
        }
    }
    Ok(())
}
