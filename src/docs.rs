use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(crate::api::webhooks::stripe_webhook),
    components(
        schemas(
            crate::api::signature::StripeEvent,
            crate::api::signature::EventData,
            crate::api::webhooks::WebhookAck,
            crate::api::webhooks::WebhookErrorBody
        )
    ),
    tags(
        (name = "webhooks", description = "Billing callbacks from Stripe")
    )
)]
pub struct ApiDoc;
