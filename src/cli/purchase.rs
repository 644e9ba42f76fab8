use anyhow::Result;
use clap::Args;

use super::session;
use crate::config::GlobalConfig;
use crate::entitlement::PurchaseOutcome;

#[derive(Args)]
pub struct PurchaseArgs {
    /// Package identifier from the current offering (e.g. premium)
    product_id: String,

    /// Output the attempt as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(args: PurchaseArgs, config: &GlobalConfig) -> Result<()> {
    let session = session::connect(config).await?;
    session.require_user()?;

    let attempt = session.client.purchase(&args.product_id).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&attempt)?);
    }

    match attempt.outcome {
        PurchaseOutcome::Purchased { snapshot } => {
            if !args.json {
                println!("Purchased {}; tier is now {}", attempt.product_id, snapshot.tier());
            }
            Ok(())
        }
        PurchaseOutcome::Cancelled => {
            if !args.json {
                println!("Purchase cancelled");
            }
            Ok(())
        }
        PurchaseOutcome::Failed { failure } => Err(anyhow::anyhow!(failure)),
    }
}
