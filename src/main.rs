use anyhow::Result;
use clap::{Parser, Subcommand};

use edugate::{cli, config};

#[derive(Parser)]
#[command(name = "edugate")]
#[command(about = "Premium-entitlement gating for an education video catalog")]
#[command(long_about = "\
Premium-entitlement gating for an education video catalog

edugate decides whether a signed-in user may watch a video, shows the
subscription paywall when they may not, and drives purchases and restores
against the billing service.

TYPICAL WORKFLOWS:

  Try it without a billing account:
    1. edugate --sandbox --user u1 catalog         # List videos with locks
    2. edugate --sandbox --user u1 watch 2         # Premium video: paywall
    3. edugate --sandbox --user u1 watch 2 --buy premium

  Against the billing service:
    export EDUGATE_BILLING_URL=https://billing.example.com
    export EDUGATE_API_KEY=sk_...
    edugate --user u1 status
    edugate --user u1 restore

For more details on each command, use: edugate <command> --help
")]
struct Cli {
    /// Global configuration arguments
    #[command(flatten)]
    config: config::ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the user's entitlement tier
    ///
    /// Example:
    ///
    ///  $ edugate --user u1 status
    ///
    Status(cli::status::StatusArgs),

    /// List the offerings presented to the user
    Offerings(cli::offerings::OfferingsArgs),

    /// Purchase a package from the current offering
    ///
    /// Example:
    ///
    ///  $ edugate --user u1 purchase premium
    ///
    Purchase(cli::purchase::PurchaseArgs),

    /// Re-sync store purchases for the user
    Restore(cli::restore::RestoreArgs),

    /// Watch a catalog item, going through the paywall if it is premium
    ///
    /// Example:
    ///
    ///  $ edugate --sandbox --user u1 watch 4 --buy premium
    ///
    Watch(cli::watch::WatchArgs),

    /// List the video catalog
    Catalog(cli::catalog::CatalogArgs),

    /// Show the merged configuration (API key redacted)
    Config(cli::config::ConfigCommandArgs),

    /// Display version information
    Version,

    /// List all commands and subcommands (hidden, for tooling)
    #[command(hide = true)]
    ListCommands,
}

/// List all commands and their subcommands for tooling/scripting
///
/// Output format: `command` or `command:sub1 sub2`
fn list_commands() {
    use clap::CommandFactory;

    let cmd = Cli::command();
    for subcmd in cmd.get_subcommands() {
        let name = subcmd.get_name();
        if name == "help" || name == "list-commands" {
            continue;
        }

        let sub_names: Vec<&str> = subcmd
            .get_subcommands()
            .filter(|s| s.get_name() != "help")
            .map(|s| s.get_name())
            .collect();

        if sub_names.is_empty() {
            println!("{}", name);
        } else {
            println!("{}:{}", name, sub_names.join(" "));
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let global_config = config::GlobalConfig::from_args(&cli.config)?;

    // Initialize tracing after config is fully merged
    global_config.init_tracing();

    tracing::debug!("edugate starting");

    match cli.command {
        Commands::Status(args) => cli::status::run(args, &global_config).await?,
        Commands::Offerings(args) => cli::offerings::run(args, &global_config).await?,
        Commands::Purchase(args) => cli::purchase::run(args, &global_config).await?,
        Commands::Restore(args) => cli::restore::run(args, &global_config).await?,
        Commands::Watch(args) => cli::watch::run(args, &global_config).await?,
        Commands::Catalog(args) => cli::catalog::run(args, &global_config).await?,
        Commands::Config(args) => cli::config::run(args, &global_config).await?,
        Commands::Version => println!("{}", cli::version("edugate")),
        Commands::ListCommands => list_commands(),
    }

    tracing::debug!("edugate shutting down");
    Ok(())
}
