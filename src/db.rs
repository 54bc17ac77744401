// src/db.rs

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::models::User;

pub async fn get_user_by_customer_id(
    pool: &PgPool,
    customer_id: &str,
) -> Result<Option<User>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, email, stripe_customer_id, premium_active, premium_expires_at,
                  stripe_subscription_id, billing_updated_at, created_at
           FROM users
           WHERE stripe_customer_id = $1"#,
    )
    .bind(customer_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| User {
        id: r.get("id"),
        email: r.get("email"),
        stripe_customer_id: r.get("stripe_customer_id"),
        premium_active: r.get("premium_active"),
        premium_expires_at: r.get("premium_expires_at"),
        stripe_subscription_id: r.get("stripe_subscription_id"),
        billing_updated_at: r.get("billing_updated_at"),
        created_at: r.get("created_at"),
    }))
}

/// Attach the provider's customer id to a user row after checkout.
/// Returns false when no row matched the id.
pub async fn link_customer(
    pool: &PgPool,
    user_id: i32,
    customer_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET stripe_customer_id = $2 WHERE id = $1")
        .bind(user_id)
        .bind(customer_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Set premium state from a subscription event. The `billing_updated_at`
/// guard makes this a compare-and-set: an event older than the last applied
/// one matches no row and is reported back as stale (false).
pub async fn activate_premium(
    pool: &PgPool,
    customer_id: &str,
    expires_at: DateTime<Utc>,
    subscription_id: &str,
    event_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE users
           SET premium_active = TRUE,
               premium_expires_at = $2,
               stripe_subscription_id = $3,
               billing_updated_at = $4
           WHERE stripe_customer_id = $1
             AND (billing_updated_at IS NULL OR billing_updated_at <= $4)"#,
    )
    .bind(customer_id)
    .bind(expires_at)
    .bind(subscription_id)
    .bind(event_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Inverse of [`activate_premium`]: clears the active flag and subscription
/// id. `premium_expires_at` is intentionally left as-is; the flag is
/// authoritative.
pub async fn deactivate_premium(
    pool: &PgPool,
    customer_id: &str,
    event_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE users
           SET premium_active = FALSE,
               stripe_subscription_id = NULL,
               billing_updated_at = $2
           WHERE stripe_customer_id = $1
             AND (billing_updated_at IS NULL OR billing_updated_at <= $2)"#,
    )
    .bind(customer_id)
    .bind(event_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Append one audit row per billing event. The unique constraint on
/// `provider_payment_id` collapses provider redeliveries; a skipped
/// duplicate is reported back as false.
pub async fn insert_payment(
    pool: &PgPool,
    user_id: i32,
    provider_payment_id: &str,
    amount: i64,
    currency: &str,
    status: &str,
    payment_type: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"INSERT INTO payments
               (user_id, provider_payment_id, amount, currency, status, payment_type)
           VALUES ($1, $2, $3, $4, $5, $6)
           ON CONFLICT (provider_payment_id) DO NOTHING"#,
    )
    .bind(user_id)
    .bind(provider_payment_id)
    .bind(amount)
    .bind(currency)
    .bind(status)
    .bind(payment_type)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Record a billing event whose state transition could not be applied, so it
/// is recoverable later even though the provider got a 200.
pub async fn insert_dead_letter(
    pool: &PgPool,
    event_id: &str,
    event_type: &str,
    reason: &str,
    payload: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO webhook_dead_letters (event_id, event_type, reason, payload)
           VALUES ($1, $2, $3, $4)"#,
    )
    .bind(event_id)
    .bind(event_type)
    .bind(reason)
    .bind(payload.clone())
    .execute(pool)
    .await?;

    Ok(())
}
