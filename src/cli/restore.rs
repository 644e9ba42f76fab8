use anyhow::Result;
use clap::Args;

use super::session;
use crate::config::GlobalConfig;

#[derive(Args)]
pub struct RestoreArgs {}

pub async fn run(_args: RestoreArgs, config: &GlobalConfig) -> Result<()> {
    let session = session::connect(config).await?;
    let user = session.require_user()?;
    let tier = session.client.restore().await;
    println!("Restored purchases for {}; tier is {}", user, tier);
    Ok(())
}
