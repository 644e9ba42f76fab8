use std::collections::BTreeMap;

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::GlobalConfig;

#[derive(Args)]
pub struct ConfigCommandArgs {
    #[command(subcommand)]
    command: Option<ConfigCommands>,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Output environment variables for current configuration
    Env(EnvArgs),
}

#[derive(Args)]
struct EnvArgs {
    /// Output as JSON object instead of KEY=VALUE pairs
    #[arg(long)]
    json: bool,
}

pub async fn run(args: ConfigCommandArgs, config: &GlobalConfig) -> Result<()> {
    match args.command {
        None => {
            // Show the merged config; the API key never leaves the process
            let json = serde_json::to_string_pretty(&config.redacted())?;
            println!("{}", json);
            Ok(())
        }
        Some(ConfigCommands::Env(env_args)) => output_env_vars(&config.redacted(), env_args.json),
    }
}

fn env_vars(config: &GlobalConfig) -> BTreeMap<&'static str, String> {
    let mut vars = BTreeMap::new();

    if let Some(key) = &config.api_key {
        vars.insert("EDUGATE_API_KEY", key.clone());
    }
    if let Some(url) = &config.billing_url {
        vars.insert("EDUGATE_BILLING_URL", url.clone());
    }
    if let Some(user) = &config.user {
        vars.insert("EDUGATE_USER", user.to_string());
    }
    if let Some(catalog) = &config.catalog {
        vars.insert("EDUGATE_CATALOG", catalog.display().to_string());
    }
    for (name, value) in [
        ("EDUGATE_REQUEST_TIMEOUT", config.request_timeout),
        ("EDUGATE_PURCHASE_TIMEOUT", config.purchase_timeout),
        ("EDUGATE_CONNECT_TIMEOUT", config.connect_timeout),
    ] {
        if let Some(secs) = value {
            vars.insert(name, secs.to_string());
        }
    }
    if config.sandbox {
        vars.insert("EDUGATE_SANDBOX", "true".to_string());
    }
    if config.verbose {
        vars.insert("EDUGATE_VERBOSE", "true".to_string());
    }
    if config.debug {
        vars.insert("EDUGATE_DEBUG", "true".to_string());
    }
    if let Some(log_file) = &config.log_file {
        vars.insert("EDUGATE_LOG_FILE", log_file.display().to_string());
    }
    vars
}

fn output_env_vars(config: &GlobalConfig, json: bool) -> Result<()> {
    let vars = env_vars(config);
    if json {
        println!("{}", serde_json::to_string_pretty(&vars)?);
    } else {
        for (name, value) in &vars {
            println!("{}={}", name, value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::SessionIdentity;

    #[test]
    fn test_env_vars_skip_unset_values() {
        let config = GlobalConfig {
            api_key: Some("sk_live".to_string()),
            user: SessionIdentity::new("u1").ok(),
            purchase_timeout: Some(45),
            ..Default::default()
        }
        .redacted();

        let vars = env_vars(&config);
        assert_eq!(vars.get("EDUGATE_USER").map(String::as_str), Some("u1"));
        assert_eq!(vars.get("EDUGATE_PURCHASE_TIMEOUT").map(String::as_str), Some("45"));
        assert_ne!(vars.get("EDUGATE_API_KEY").map(String::as_str), Some("sk_live"));
        assert!(!vars.contains_key("EDUGATE_BILLING_URL"));
        assert!(!vars.contains_key("EDUGATE_SANDBOX"));
    }
}
