// src/billing.rs

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Plan interval value Stripe uses for annual billing.
const YEARLY_INTERVAL: &str = "year";

/// `billing_reason` Stripe sets on the first invoice of a subscription.
const INITIAL_BILLING_REASON: &str = "subscription_create";

/// Classify a payment for the audit trail.
///
/// A billing reason other than the initial one marks a renewal; otherwise the
/// plan interval decides between the yearly and monthly buckets.
pub fn classify_payment(billing_reason: Option<&str>, interval: Option<&str>) -> &'static str {
    match billing_reason {
        Some(reason) if reason != INITIAL_BILLING_REASON => "renewal",
        _ => {
            if interval == Some(YEARLY_INTERVAL) {
                "yearly"
            } else {
                "monthly"
            }
        }
    }
}

/// Currency codes are stored upper-cased regardless of how the provider
/// spelled them.
pub fn normalize_currency(currency: &str) -> String {
    currency.to_uppercase()
}

/// Convert Stripe's `current_period_end` (unix seconds) to an absolute
/// timestamp. `None` only for values outside the representable range.
pub fn expires_at_from_period_end(period_end: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(period_end, 0)
}

pub fn subscription_period_end(object: &Value) -> Option<i64> {
    object.get("current_period_end").and_then(Value::as_i64)
}

/// First plan interval found on a provider object. Subscriptions carry it
/// under `items.data[0].plan`, invoices under `lines.data[0].plan`, and some
/// legacy shapes have a top-level `plan`.
pub fn plan_interval(object: &Value) -> Option<&str> {
    if let Some(interval) = object
        .get("plan")
        .and_then(|p| p.get("interval"))
        .and_then(Value::as_str)
    {
        return Some(interval);
    }

    for container in ["items", "lines"] {
        let interval = object
            .get(container)
            .and_then(|c| c.get("data"))
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|item| item.get("plan"))
            .and_then(|p| p.get("interval"))
            .and_then(Value::as_str);
        if interval.is_some() {
            return interval;
        }
    }

    None
}

/// Amount in minor units from an invoice shape.
pub fn invoice_amount(object: &Value) -> Option<i64> {
    object
        .get("amount_paid")
        .and_then(Value::as_i64)
        .or_else(|| object.get("amount_due").and_then(Value::as_i64))
}

pub fn currency(object: &Value) -> Option<&str> {
    object.get("currency").and_then(Value::as_str)
}
