use anyhow::Result;
use clap::Args;

use super::session;
use crate::catalog::Catalog;
use crate::config::GlobalConfig;

#[derive(Args)]
pub struct CatalogArgs {
    /// Only list premium items
    #[arg(long)]
    premium_only: bool,

    /// Only list items of this subject (e.g. Mathematics)
    #[arg(long)]
    subject: Option<String>,

    /// Output as JSON rows
    #[arg(long)]
    json: bool,
}

pub async fn run(args: CatalogArgs, config: &GlobalConfig) -> Result<()> {
    let catalog = Catalog::load_or_demo(config.catalog_path());
    let items: Vec<_> = catalog
        .items()
        .iter()
        .filter(|item| !args.premium_only || item.is_premium)
        .filter(|item| match &args.subject {
            Some(subject) => item
                .subject
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case(subject)),
            None => true,
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    // The catalog is usable without billing, so a missing backend only hides the lock column
    let tier = match session::connect(config).await {
        Ok(session) => Some(session.client.cached_tier().await),
        Err(e) => {
            tracing::debug!(error = %e, "Billing unavailable for catalog listing");
            None
        }
    };

    println!(
        "{} videos ({} free, {} premium)",
        catalog.len(),
        catalog.len() - catalog.premium_count(),
        catalog.premium_count()
    );
    for item in items {
        let badge = if !item.is_premium {
            "free"
        } else if tier.is_some_and(|t| t.grants(item.required_tier())) {
            "unlocked"
        } else {
            "locked"
        };
        let price = item
            .price
            .map(|p| format!(" ${}", p))
            .unwrap_or_default();
        println!(
            "{:>4}  [{:<8}] {} - {}{}",
            item.id, badge, item.title, item.creator_name, price
        );
    }
    Ok(())
}
