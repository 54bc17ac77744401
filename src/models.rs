// src/models.rs

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub stripe_customer_id: Option<String>,
    pub premium_active: bool,
    pub premium_expires_at: Option<DateTime<Utc>>,
    pub stripe_subscription_id: Option<String>,
    /// Provider timestamp of the last billing event applied to this row.
    pub billing_updated_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct Payment {
    pub id: i32,
    pub user_id: i32,
    pub provider_payment_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,       // succeeded | failed
    pub payment_type: String, // monthly | yearly | renewal
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct DeadLetter {
    pub id: i32,
    pub event_id: String,
    pub event_type: String,
    pub reason: String,
    pub payload: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
}
