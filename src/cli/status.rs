use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::session;
use crate::billing::{ActiveEntitlement, EntitlementTier};
use crate::config::GlobalConfig;

#[derive(Args)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct StatusReport {
    user: Option<String>,
    configured: bool,
    tier: EntitlementTier,
    active: Vec<ActiveEntitlement>,
}

pub async fn run(args: StatusArgs, config: &GlobalConfig) -> Result<()> {
    let session = session::connect(config).await?;
    let tier = session.client.entitlement_tier().await;
    let active = session
        .client
        .tier_cache()
        .snapshot()
        .await
        .map(|snapshot| snapshot.active.into_values().collect())
        .unwrap_or_default();

    let report = StatusReport {
        user: session.user.as_ref().map(ToString::to_string),
        configured: session.client.is_configured().await,
        tier,
        active,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("User:       {}", report.user.as_deref().unwrap_or("(signed out)"));
    println!(
        "Billing:    {}",
        if report.configured { "configured" } else { "unavailable" }
    );
    println!("Tier:       {}", report.tier);
    for entitlement in &report.active {
        let expires = entitlement
            .expires_at
            .map(|at| format!("expires at {}", at))
            .unwrap_or_else(|| "no expiry".to_string());
        println!("  - {} ({})", entitlement.identifier, expires);
    }
    Ok(())
}
