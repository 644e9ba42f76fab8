//! HTTP client for a hosted billing API

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;

use super::backend::{BillingBackend, BillingError};
use super::types::{
    CustomerInfoPayload, EntitlementSnapshot, OfferingSnapshot, OfferingsPayload, Package,
    SessionIdentity,
};
use crate::prelude::now_unix;

/// Error code the API uses when the store sheet was dismissed
const PURCHASE_CANCELLED_CODE: &str = "purchase_cancelled";

/// Billing backend speaking the subscriber REST API:
///
/// - `POST /v1/subscribers/{id}/login`
/// - `GET  /v1/subscribers/{id}`
/// - `GET  /v1/subscribers/{id}/offerings`
/// - `POST /v1/subscribers/{id}/purchases`
/// - `POST /v1/subscribers/{id}/restore`
///
/// Requests carry the configured API key as a bearer token.
#[derive(Debug)]
pub struct HttpBillingBackend {
    base_url: Url,
    client: Client,
    api_key: RwLock<Option<String>>,
}

#[derive(Debug, Serialize)]
struct PurchaseRequest<'a> {
    package_id: &'a str,
    product_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
}

impl HttpBillingBackend {
    pub fn try_new(base_url: Url) -> Result<Self, BillingError> {
        if base_url.cannot_be_a_base() {
            return Err(BillingError::Url {
                context: "Billing URL cannot be a base URL",
            });
        }
        Ok(Self {
            base_url,
            client: Client::new(),
            api_key: RwLock::new(None),
        })
    }

    /// Rebuild the HTTP client with a connection timeout
    ///
    /// Overall call deadlines are enforced by the entitlement client, so only
    /// the connect phase is bounded here.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Result<Self, BillingError> {
        self.client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| BillingError::Http {
                context: "Failed to build HTTP client",
                source: e,
            })?;
        Ok(self)
    }

    /// `{base}/v1/subscribers/{user}/{suffix...}` with the user id percent-encoded
    fn subscriber_url(&self, user: &SessionIdentity, suffix: &[&str]) -> Result<Url, BillingError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BillingError::Url {
                context: "Billing URL cannot be a base URL",
            })?
            .pop_if_empty()
            .extend(["v1", "subscribers", user.as_str()])
            .extend(suffix);
        Ok(url)
    }

    async fn authorize(
        &self,
        mut req: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, BillingError> {
        let key = self.api_key.read().await;
        let key = key.as_deref().ok_or(BillingError::NotConfigured)?;
        req = req.bearer_auth(key);
        Ok(req)
    }

    async fn get_json<R>(&self, url: Url, context: &'static str) -> Result<R, BillingError>
    where
        R: serde::de::DeserializeOwned,
    {
        let req = self.authorize(self.client.get(url)).await?;
        let response = req
            .send()
            .await
            .map_err(|e| BillingError::Http { context, source: e })?;
        handle_response(response, context).await
    }

    async fn post_json<T, R>(
        &self,
        url: Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, BillingError>
    where
        T: Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let req = self.authorize(self.client.post(url).json(payload)).await?;
        let response = req
            .send()
            .await
            .map_err(|e| BillingError::Http { context, source: e })?;
        handle_response(response, context).await
    }

    async fn customer_snapshot(
        &self,
        url: Url,
        context: &'static str,
        body: Option<&serde_json::Value>,
    ) -> Result<EntitlementSnapshot, BillingError> {
        let payload: CustomerInfoPayload = match body {
            Some(body) => self.post_json(url, context, body).await?,
            None => self.get_json(url, context).await?,
        };
        Ok(EntitlementSnapshot::narrow(payload, now_unix()))
    }
}

impl BillingBackend for HttpBillingBackend {
    async fn configure(&self, api_key: &str) -> Result<(), BillingError> {
        let api_key = api_key.trim();
        if api_key.is_empty() || api_key.chars().any(char::is_whitespace) {
            return Err(BillingError::InvalidApiKey(
                "key must be a single non-empty token".to_string(),
            ));
        }
        *self.api_key.write().await = Some(api_key.to_string());
        Ok(())
    }

    async fn login(&self, user: &SessionIdentity) -> Result<EntitlementSnapshot, BillingError> {
        let url = self.subscriber_url(user, &["login"])?;
        self.customer_snapshot(url, "POST /login", Some(&serde_json::json!({})))
            .await
    }

    async fn offerings(&self, user: &SessionIdentity) -> Result<OfferingSnapshot, BillingError> {
        let url = self.subscriber_url(user, &["offerings"])?;
        let payload: OfferingsPayload = self.get_json(url, "GET /offerings").await?;
        Ok(OfferingSnapshot::narrow(payload))
    }

    async fn purchase(
        &self,
        user: &SessionIdentity,
        package: &Package,
    ) -> Result<EntitlementSnapshot, BillingError> {
        let url = self.subscriber_url(user, &["purchases"])?;
        let request = PurchaseRequest {
            package_id: &package.identifier,
            product_id: &package.product_id,
        };
        let payload: CustomerInfoPayload = self.post_json(url, "POST /purchases", &request).await?;
        Ok(EntitlementSnapshot::narrow(payload, now_unix()))
    }

    async fn customer_info(&self, user: &SessionIdentity) -> Result<EntitlementSnapshot, BillingError> {
        let url = self.subscriber_url(user, &[])?;
        self.customer_snapshot(url, "GET /subscribers", None).await
    }

    async fn restore_purchases(
        &self,
        user: &SessionIdentity,
    ) -> Result<EntitlementSnapshot, BillingError> {
        let url = self.subscriber_url(user, &["restore"])?;
        self.customer_snapshot(url, "POST /restore", Some(&serde_json::json!({})))
            .await
    }
}

/// Parse JSON on 200, map cancellation codes, otherwise surface status and body
async fn handle_response<R: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    context: &'static str,
) -> Result<R, BillingError> {
    let status = response.status();
    if status == StatusCode::OK {
        return response
            .json::<R>()
            .await
            .map_err(|e| BillingError::JsonDeserialization { context, source: e });
    }

    let body = response
        .text()
        .await
        .map_err(|e| BillingError::ResponseBodyRead { context, source: e })?;

    if is_cancellation(status, &body) {
        return Err(BillingError::Cancelled);
    }
    Err(BillingError::HttpStatus {
        context,
        status,
        body,
    })
}

fn is_cancellation(status: StatusCode, body: &str) -> bool {
    if status != StatusCode::PAYMENT_REQUIRED && status != StatusCode::CONFLICT {
        return false;
    }
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.code)
        .is_some_and(|code| code == PURCHASE_CANCELLED_CODE)
}

// ============================================================================
// Conversion Implementations
// ============================================================================

/// Create HttpBillingBackend from a string URL
impl TryFrom<&str> for HttpBillingBackend {
    type Error = BillingError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| BillingError::UrlParse {
            context: "Failed to parse billing url",
            source: e,
        })?;
        HttpBillingBackend::try_new(url)
    }
}
