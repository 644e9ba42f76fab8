use anyhow::Result;
use clap::Args;

use super::session;
use crate::config::GlobalConfig;

#[derive(Args)]
pub struct OfferingsArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(args: OfferingsArgs, config: &GlobalConfig) -> Result<()> {
    let session = session::connect(config).await?;
    session.require_user()?;
    let offerings = session.client.offerings().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&offerings)?);
        return Ok(());
    }

    if offerings.all.is_empty() {
        println!("No offerings available");
        return Ok(());
    }

    let current = offerings.current.as_ref().map(|o| o.identifier.as_str());
    for offering in &offerings.all {
        let marker = if Some(offering.identifier.as_str()) == current {
            " (current)"
        } else {
            ""
        };
        println!("{}{}", offering.identifier, marker);
        for package in &offering.packages {
            let price = package
                .price
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:<12} {:<20} {:<14} grants {}",
                package.identifier, package.product_id, price, package.entitlement
            );
        }
    }
    Ok(())
}
