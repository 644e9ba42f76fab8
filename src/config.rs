//! Global configuration management for edugate
//!
//! Configuration can be loaded from:
//! - JSON files (e.g., ~/.config/edugate.json)
//! - Inline JSON strings (via `--config '{...}'`)
//! - Environment variables (EDUGATE_*)
//!
//! CLI arguments and environment variables take precedence over the file.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::billing::SessionIdentity;
use crate::logging::LogFormat;

const REDACTED: &str = "<redacted>";

// ============================================================================
// Configuration Arguments
// ============================================================================

/// Common configuration arguments (used across CLI commands)
#[derive(Args, Clone, Debug, Default)]
pub struct ConfigArgs {
    /// Global configuration file (JSON file path or JSON string).
    ///
    /// - A file path: --config edugate.json
    ///
    /// - Inline JSON: --config '{"billing_url":"https://billing.example.com","sandbox":false}'
    ///
    #[arg(long = "config", short = 'c', env = "EDUGATE_CONFIG", value_name = "file.json or {json}")]
    pub config: Option<String>,

    /// Billing API key
    ///
    /// Without a key every user is treated as free tier.
    ///
    #[arg(long, short = 'k', env = "EDUGATE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Billing service base URL (e.g., https://billing.example.com)
    #[arg(long, short = 'b', env = "EDUGATE_BILLING_URL", value_name = "http(s)://...")]
    pub billing_url: Option<String>,

    /// Signed-in user id, as issued by the auth provider
    #[arg(long, short = 'u', env = "EDUGATE_USER")]
    pub user: Option<SessionIdentity>,

    /// Catalog file (JSON array of content rows)
    ///
    /// Falls back to the built-in demo catalog when missing or unreadable.
    ///
    #[arg(long, env = "EDUGATE_CATALOG", value_name = "PATH")]
    pub catalog: Option<PathBuf>,

    /// Timeout for billing requests in seconds (default 15)
    #[arg(long, env = "EDUGATE_REQUEST_TIMEOUT", value_name = "SECS")]
    pub request_timeout: Option<u64>,

    /// Timeout for purchases in seconds (default 30)
    #[arg(long, env = "EDUGATE_PURCHASE_TIMEOUT", value_name = "SECS")]
    pub purchase_timeout: Option<u64>,

    /// TCP connect timeout for the billing service in seconds
    #[arg(long, env = "EDUGATE_CONNECT_TIMEOUT", value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// Use the in-process sandbox billing backend instead of the service
    #[arg(long, env = "EDUGATE_SANDBOX")]
    pub sandbox: bool,

    /// Entitlement granted to --user in the sandbox (repeatable)
    ///
    /// Example: --sandbox --user u1 --sandbox-grant premium
    ///
    #[arg(long = "sandbox-grant", value_name = "ENTITLEMENT", requires = "sandbox")]
    pub sandbox_grants: Vec<String>,

    // -------------------------------------------------------------------------
    // Logging/Tracing Options
    // -------------------------------------------------------------------------

    /// Enable verbose output (INFO level logging)
    ///
    /// Default is WARN level. Use -v for INFO, -d for DEBUG.
    ///
    #[arg(short = 'v', long, env = "EDUGATE_VERBOSE")]
    pub verbose: bool,

    /// Enable debug output (DEBUG level logging)
    #[arg(short = 'd', long, env = "EDUGATE_DEBUG", conflicts_with = "verbose")]
    pub debug: bool,

    /// Quiet mode - only show errors
    #[arg(short = 'q', long, conflicts_with_all = ["verbose", "debug"])]
    pub quiet: bool,

    /// Silent mode - suppress all terminal log output
    ///
    /// Log file output (if configured) is unaffected.
    ///
    #[arg(long, short = 's', conflicts_with_all = ["verbose", "debug", "quiet"])]
    pub silent: bool,

    /// Log output format [default: pretty]
    #[arg(long, short = 'L', value_enum, env = "EDUGATE_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    /// Write debug logs to file
    #[arg(long, short = 'l', env = "EDUGATE_LOG_FILE", value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

// ============================================================================
// Global Configuration
// ============================================================================

/// Global configuration structure (can be serialized/deserialized from JSON)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Billing API key
    pub api_key: Option<String>,

    /// Billing service base URL
    pub billing_url: Option<String>,

    /// Signed-in user
    pub user: Option<SessionIdentity>,

    /// Catalog file path
    pub catalog: Option<PathBuf>,

    /// Billing request timeout in seconds
    pub request_timeout: Option<u64>,

    /// Purchase timeout in seconds
    pub purchase_timeout: Option<u64>,

    /// Connection timeout in seconds
    pub connect_timeout: Option<u64>,

    /// Use the in-process sandbox backend
    pub sandbox: bool,

    /// Entitlements granted to `user` in the sandbox
    pub sandbox_grants: Vec<String>,

    pub verbose: bool,
    pub debug: bool,
    pub quiet: bool,
    pub silent: bool,

    /// Log output format (pretty, json, compact)
    pub log_format: LogFormat,

    /// Write debug logs to file
    pub log_file: Option<PathBuf>,
}

impl GlobalConfig {
    /// Load configuration from ConfigArgs
    ///
    /// CLI args take precedence over the `--config` file, which takes
    /// precedence over defaults.
    pub fn from_args(args: &ConfigArgs) -> Result<Self> {
        let mut global = match &args.config {
            Some(input) => {
                let json = load_json_string(input)?;
                serde_json::from_str(&json)
                    .map_err(|e| anyhow::anyhow!("Failed to parse global config JSON: {}", e))?
            }
            None => GlobalConfig::default(),
        };
        global.merge_args(args);
        global.validate()?;
        Ok(global)
    }

    fn merge_args(&mut self, args: &ConfigArgs) {
        if let Some(api_key) = &args.api_key {
            self.api_key = Some(api_key.clone());
        }
        if let Some(billing_url) = &args.billing_url {
            self.billing_url = Some(billing_url.clone());
        }
        if let Some(user) = &args.user {
            self.user = Some(user.clone());
        }
        if let Some(catalog) = &args.catalog {
            self.catalog = Some(catalog.clone());
        }
        if args.request_timeout.is_some() {
            self.request_timeout = args.request_timeout;
        }
        if args.purchase_timeout.is_some() {
            self.purchase_timeout = args.purchase_timeout;
        }
        if args.connect_timeout.is_some() {
            self.connect_timeout = args.connect_timeout;
        }
        if args.sandbox {
            self.sandbox = true;
        }
        if !args.sandbox_grants.is_empty() {
            self.sandbox_grants = args.sandbox_grants.clone();
        }

        if args.verbose {
            self.verbose = true;
        }
        if args.debug {
            self.debug = true;
        }
        if args.quiet {
            self.quiet = true;
        }
        if args.silent {
            self.silent = true;
        }
        if let Some(log_format) = &args.log_format {
            self.log_format = log_format.clone();
        }
        if let Some(log_file) = &args.log_file {
            self.log_file = Some(log_file.clone());
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("request_timeout", self.request_timeout),
            ("purchase_timeout", self.purchase_timeout),
            ("connect_timeout", self.connect_timeout),
        ] {
            if value == Some(0) {
                anyhow::bail!("{} must be at least 1 second", name);
            }
        }
        Ok(())
    }

    /// Catalog path, if one is configured
    pub fn catalog_path(&self) -> Option<&Path> {
        self.catalog.as_deref()
    }

    /// Copy safe to print: the API key is masked
    pub fn redacted(&self) -> Self {
        Self {
            api_key: self.api_key.as_ref().map(|_| REDACTED.to_string()),
            ..self.clone()
        }
    }

    /// Initialize tracing/logging based on configuration
    ///
    /// Call this once early in main() before any logging calls.
    pub fn init_tracing(&self) {
        crate::logging::init_tracing(crate::logging::TracingConfig {
            verbose: self.verbose,
            debug: self.debug,
            quiet: self.quiet,
            silent: self.silent,
            format: self.log_format.clone(),
            log_file: self.log_file.clone(),
        });
    }
}

// ============================================================================
// Configuration Loading
// ============================================================================

/// Helper to load JSON from either a file path or inline JSON string
fn load_json_string(input: &str) -> Result<String> {
    if input.trim_start().starts_with('{') {
        return Ok(input.to_string());
    }
    let path = Path::new(input);
    std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))
}
