// src/api/webhooks.rs

use std::fmt;

use actix_web::{web, HttpRequest, HttpResponse, Resource};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::api::signature::{self, StripeEvent};
use crate::api::stripe_client::{self, StripeError};
use crate::{billing, db, AppState};

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(rename = "type")]
    pub event_type: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookErrorBody {
    pub error: String,
}

/// Errors that abort dispatch and turn into a 500, so the provider retries
/// the delivery. Everything else is handled (logged, dead-lettered) inside
/// the individual handlers and still acknowledged.
#[derive(Debug)]
pub enum DispatchError {
    Db(sqlx::Error),
    Provider(StripeError),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Db(e) => write!(f, "database error: {e}"),
            DispatchError::Provider(e) => write!(f, "provider error: {e}"),
        }
    }
}

impl From<sqlx::Error> for DispatchError {
    fn from(value: sqlx::Error) -> Self {
        Self::Db(value)
    }
}

impl From<StripeError> for DispatchError {
    fn from(value: StripeError) -> Self {
        Self::Provider(value)
    }
}

/// The webhook endpoint: POST gets the handler, every other method a JSON
/// 405. Registered as one resource so both live on the same path.
pub fn webhook_resource() -> Resource {
    web::resource("/webhook/stripe")
        .route(web::post().to(stripe_webhook))
        .default_service(web::route().to(method_not_allowed))
}

#[utoipa::path(
    post,
    path = "/webhook/stripe",
    tag = "webhooks",
    request_body = signature::StripeEvent,
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 400, description = "Signature verification failed", body = WebhookErrorBody),
        (status = 405, description = "Method not allowed", body = WebhookErrorBody),
        (status = 500, description = "Dispatch failed, provider will retry", body = WebhookErrorBody)
    )
)]
pub async fn stripe_webhook(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    let Some(sig_header) = req
        .headers()
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
    else {
        return HttpResponse::BadRequest().json(WebhookErrorBody {
            error: "Webhook Error: missing Stripe-Signature header".to_string(),
        });
    };

    let event = match signature::verify_event(&body, sig_header, &state.stripe_webhook_secret) {
        Ok(event) => event,
        Err(e) => {
            log::warn!("stripe webhook rejected: {e}");
            return HttpResponse::BadRequest().json(WebhookErrorBody {
                error: format!("Webhook Error: {e}"),
            });
        }
    };

    match dispatch_event(&state, &event).await {
        Ok(()) => HttpResponse::Ok().json(WebhookAck {
            received: true,
            event_type: event.event_type,
        }),
        Err(e) => {
            log::error!(
                "stripe webhook dispatch failed event_id={} type={}: {e}",
                event.id,
                event.event_type
            );
            HttpResponse::InternalServerError().json(WebhookErrorBody {
                error: "Internal server error".to_string(),
            })
        }
    }
}

pub async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().json(WebhookErrorBody {
        error: "Method not allowed".to_string(),
    })
}

async fn dispatch_event(state: &AppState, event: &StripeEvent) -> Result<(), DispatchError> {
    match event.event_type.as_str() {
        "checkout.session.completed" => handle_checkout_completed(state, event).await,
        "customer.subscription.created" | "customer.subscription.updated" => {
            handle_subscription_updated(state, event).await
        }
        "customer.subscription.deleted" => handle_subscription_deleted(state, event).await,
        "invoice.payment_succeeded" => handle_invoice_payment_succeeded(state, event).await,
        "invoice.payment_failed" => handle_invoice_payment_failed(state, event).await,
        other => {
            log::info!("stripe webhook ignored event_id={} type={other}", event.id);
            Ok(())
        }
    }
}

/// Provider-side event time, used as the ordering guard for state writes.
fn event_timestamp(event: &StripeEvent) -> DateTime<Utc> {
    DateTime::from_timestamp(event.created, 0).unwrap_or_else(Utc::now)
}

/// Park an event whose transition was dropped. The delivery is still
/// acknowledged; this is the recovery trail.
async fn dead_letter(state: &AppState, event: &StripeEvent, reason: &str) {
    if let Err(e) = db::insert_dead_letter(
        &state.pool,
        &event.id,
        &event.event_type,
        reason,
        &event.data.object,
    )
    .await
    {
        log::error!("dead letter write failed event_id={}: {e}", event.id);
    }
}

/// checkout.session.completed: attach the provider's customer id to the user
/// named by `client_reference_id` (set by us when the checkout was created).
async fn handle_checkout_completed(
    state: &AppState,
    event: &StripeEvent,
) -> Result<(), DispatchError> {
    let object = &event.data.object;

    let Some(customer_id) = object.get("customer").and_then(Value::as_str) else {
        log::warn!("checkout completed without customer id event_id={}", event.id);
        dead_letter(state, event, "checkout session missing customer id").await;
        return Ok(());
    };

    let user_id = object
        .get("client_reference_id")
        .and_then(Value::as_str)
        .and_then(|r| r.parse::<i32>().ok());
    let Some(user_id) = user_id else {
        // Not retriable by construction: the provider would resend the same payload.
        log::warn!(
            "checkout completed with missing or non-numeric client_reference_id event_id={}",
            event.id
        );
        dead_letter(state, event, "missing or non-numeric client_reference_id").await;
        return Ok(());
    };

    match db::link_customer(&state.pool, user_id, customer_id).await {
        Ok(true) => {
            log::info!("linked stripe customer {customer_id} to user {user_id}");
        }
        Ok(false) => {
            log::warn!("no user row {user_id} to link customer {customer_id}");
            dead_letter(state, event, "no user row for client_reference_id").await;
        }
        Err(e) => {
            log::error!("customer link write failed user_id={user_id}: {e}");
            dead_letter(state, event, "customer link write failed").await;
        }
    }

    Ok(())
}

/// customer.subscription.created / customer.subscription.updated: premium on,
/// expiry from the subscription's period end.
async fn handle_subscription_updated(
    state: &AppState,
    event: &StripeEvent,
) -> Result<(), DispatchError> {
    let object = &event.data.object;

    let Some(customer_id) = object.get("customer").and_then(Value::as_str) else {
        dead_letter(state, event, "subscription event missing customer id").await;
        return Ok(());
    };

    let Some(user) = db::get_user_by_customer_id(&state.pool, customer_id).await? else {
        log::warn!(
            "subscription event for unknown customer {customer_id} event_id={}",
            event.id
        );
        dead_letter(state, event, "no user for stripe customer id").await;
        return Ok(());
    };

    let expires_at = billing::subscription_period_end(object)
        .and_then(billing::expires_at_from_period_end);
    let Some(expires_at) = expires_at else {
        dead_letter(state, event, "subscription missing current_period_end").await;
        return Ok(());
    };

    let subscription_id = object.get("id").and_then(Value::as_str).unwrap_or_default();

    match db::activate_premium(
        &state.pool,
        customer_id,
        expires_at,
        subscription_id,
        event_timestamp(event),
    )
    .await
    {
        Ok(true) => {
            log::info!(
                "premium active for user {} until {expires_at} subscription={subscription_id}",
                user.id
            );
        }
        Ok(false) => {
            log::info!(
                "stale subscription event skipped for user {} event_id={}",
                user.id,
                event.id
            );
        }
        Err(e) => {
            log::error!("premium activate write failed user_id={}: {e}", user.id);
            dead_letter(state, event, "premium activate write failed").await;
        }
    }

    Ok(())
}

/// customer.subscription.deleted: premium off, subscription id cleared.
/// The old expiry stays on the row; the active flag is what matters.
async fn handle_subscription_deleted(
    state: &AppState,
    event: &StripeEvent,
) -> Result<(), DispatchError> {
    let object = &event.data.object;

    let Some(customer_id) = object.get("customer").and_then(Value::as_str) else {
        dead_letter(state, event, "subscription event missing customer id").await;
        return Ok(());
    };

    let Some(user) = db::get_user_by_customer_id(&state.pool, customer_id).await? else {
        log::warn!(
            "subscription delete for unknown customer {customer_id} event_id={}",
            event.id
        );
        dead_letter(state, event, "no user for stripe customer id").await;
        return Ok(());
    };

    match db::deactivate_premium(&state.pool, customer_id, event_timestamp(event)).await {
        Ok(true) => log::info!("premium deactivated for user {}", user.id),
        Ok(false) => {
            log::info!(
                "stale subscription delete skipped for user {} event_id={}",
                user.id,
                event.id
            );
        }
        Err(e) => {
            log::error!("premium deactivate write failed user_id={}: {e}", user.id);
            dead_letter(state, event, "premium deactivate write failed").await;
        }
    }

    Ok(())
}

/// invoice.payment_succeeded: refresh the expiry from the subscription the
/// invoice references (the invoice itself only carries the id) and record
/// the payment.
async fn handle_invoice_payment_succeeded(
    state: &AppState,
    event: &StripeEvent,
) -> Result<(), DispatchError> {
    let object = &event.data.object;

    let Some(customer_id) = object.get("customer").and_then(Value::as_str) else {
        dead_letter(state, event, "invoice missing customer id").await;
        return Ok(());
    };

    let Some(user) = db::get_user_by_customer_id(&state.pool, customer_id).await? else {
        log::warn!(
            "invoice for unknown customer {customer_id} event_id={}",
            event.id
        );
        dead_letter(state, event, "no user for stripe customer id").await;
        return Ok(());
    };

    let mut interval = billing::plan_interval(object).map(str::to_string);

    if let Some(subscription_ref) = object.get("subscription").and_then(Value::as_str) {
        let subscription = stripe_client::retrieve_subscription(
            &state.stripe_api_base,
            &state.stripe_api_key,
            subscription_ref,
        )
        .await?;

        if interval.is_none() {
            interval = subscription.plan().and_then(|p| p.interval.clone());
        }

        if let Some(expires_at) =
            billing::expires_at_from_period_end(subscription.current_period_end)
        {
            match db::activate_premium(
                &state.pool,
                customer_id,
                expires_at,
                &subscription.id,
                event_timestamp(event),
            )
            .await
            {
                Ok(true) => {
                    log::info!("premium extended for user {} until {expires_at}", user.id);
                }
                Ok(false) => {
                    log::info!(
                        "stale invoice event skipped for user {} event_id={}",
                        user.id,
                        event.id
                    );
                }
                Err(e) => {
                    log::error!("premium extend write failed user_id={}: {e}", user.id);
                    dead_letter(state, event, "premium extend write failed").await;
                }
            }
        }
    }

    record_payment(state, event, user.id, "succeeded", interval.as_deref()).await;
    Ok(())
}

/// invoice.payment_failed: audit row only, no premium state change.
async fn handle_invoice_payment_failed(
    state: &AppState,
    event: &StripeEvent,
) -> Result<(), DispatchError> {
    let object = &event.data.object;

    let Some(customer_id) = object.get("customer").and_then(Value::as_str) else {
        dead_letter(state, event, "invoice missing customer id").await;
        return Ok(());
    };

    let Some(user) = db::get_user_by_customer_id(&state.pool, customer_id).await? else {
        log::warn!(
            "failed invoice for unknown customer {customer_id} event_id={}",
            event.id
        );
        dead_letter(state, event, "no user for stripe customer id").await;
        return Ok(());
    };

    let interval = billing::plan_interval(object).map(str::to_string);
    record_payment(state, event, user.id, "failed", interval.as_deref()).await;
    Ok(())
}

/// Write one audit row for an invoice event. Write failures are logged and
/// dead-lettered; the delivery is acknowledged either way.
async fn record_payment(
    state: &AppState,
    event: &StripeEvent,
    user_id: i32,
    status: &str,
    interval: Option<&str>,
) {
    let object = &event.data.object;

    let Some(provider_payment_id) = object.get("id").and_then(Value::as_str) else {
        dead_letter(state, event, "invoice missing id").await;
        return;
    };
    let Some(amount) = billing::invoice_amount(object) else {
        dead_letter(state, event, "invoice missing amount").await;
        return;
    };
    let Some(currency) = billing::currency(object) else {
        dead_letter(state, event, "invoice missing currency").await;
        return;
    };

    let billing_reason = object.get("billing_reason").and_then(Value::as_str);
    let payment_type = billing::classify_payment(billing_reason, interval);
    let currency = billing::normalize_currency(currency);

    match db::insert_payment(
        &state.pool,
        user_id,
        provider_payment_id,
        amount,
        &currency,
        status,
        payment_type,
    )
    .await
    {
        Ok(true) => {
            log::info!(
                "payment recorded user_id={user_id} provider_payment_id={provider_payment_id} \
                 amount={amount} {currency} status={status} type={payment_type}"
            );
        }
        Ok(false) => {
            log::info!("duplicate payment skipped provider_payment_id={provider_payment_id}");
        }
        Err(e) => {
            log::error!("payment write failed provider_payment_id={provider_payment_id}: {e}");
            dead_letter(state, event, "payment write failed").await;
        }
    }
}
