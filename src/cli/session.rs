//! Connecting CLI commands to the billing backend

use std::sync::Arc;

use anyhow::Result;

use crate::billing::{ConfiguredBackend, SessionIdentity};
use crate::config::GlobalConfig;
use crate::entitlement::{ClientTimeouts, EntitlementClient};

/// Key used for the sandbox backend when none is configured
const SANDBOX_API_KEY: &str = "sk_sandbox";

pub type Client = Arc<EntitlementClient<ConfiguredBackend>>;

/// A configured client, logged in when a user is known
pub struct Session {
    pub client: Client,
    pub user: Option<SessionIdentity>,
}

impl Session {
    /// The signed-in user, or an error telling how to provide one
    pub fn require_user(&self) -> Result<&SessionIdentity> {
        self.user
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No user. Use --user or EDUGATE_USER"))
    }
}

/// Build the backend from config, configure it and log in `config.user`
///
/// Billing problems are not errors here: an unconfigured client still serves
/// free content, so only an unusable backend definition fails.
pub async fn connect(config: &GlobalConfig) -> Result<Session> {
    let backend = ConfiguredBackend::from_config(config).await?;
    let client = Arc::new(
        EntitlementClient::new(backend).with_timeouts(ClientTimeouts::from(config)),
    );

    let api_key = config
        .api_key
        .as_deref()
        .or(config.sandbox.then_some(SANDBOX_API_KEY));
    client.configure(api_key).await;

    if let Some(user) = &config.user {
        client.login(user).await;
    }

    Ok(Session {
        client,
        user: config.user.clone(),
    })
}
