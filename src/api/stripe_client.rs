// src/api/stripe_client.rs
//
// Minimal read client for the Stripe API (https://api.stripe.com).
// Authorization: Bearer <secret key>. Invoice events only carry a
// subscription reference, so the current subscription state is re-fetched
// here.

use serde::Deserialize;
use std::fmt;

#[derive(Debug)]
pub enum StripeError {
    Http(reqwest::Error),
    Api { status: u16, body: String },
    InvalidResponse(String),
}

impl fmt::Display for StripeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StripeError::Http(e) => write!(f, "http error: {e}"),
            StripeError::Api { status, body } => {
                write!(f, "stripe api error status={status} body={body}")
            }
            StripeError::InvalidResponse(e) => write!(f, "invalid response: {e}"),
        }
    }
}

impl From<reqwest::Error> for StripeError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    pub current_period_end: i64,

    #[serde(default)]
    pub items: SubscriptionItems,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionItem {
    pub plan: Option<SubscriptionPlan>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionPlan {
    pub interval: Option<String>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
}

impl StripeSubscription {
    /// Plan of the first line item, if any.
    pub fn plan(&self) -> Option<&SubscriptionPlan> {
        self.items.data.first().and_then(|item| item.plan.as_ref())
    }
}

pub async fn retrieve_subscription(
    api_base: &str,
    api_key: &str,
    subscription_id: &str,
) -> Result<StripeSubscription, StripeError> {
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{api_base}/v1/subscriptions/{subscription_id}"))
        .bearer_auth(api_key)
        .send()
        .await?;

    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        return Err(StripeError::Api {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str::<StripeSubscription>(&body)
        .map_err(|e| StripeError::InvalidResponse(format!("{e}; body={body}")))
}
