pub mod api;
pub mod billing;
pub mod db;
pub mod docs;
pub mod models;

use sqlx::PgPool;

/// Shared application state. Built once in `main` (or by the test support
/// code) and injected into handlers via `web::Data`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub stripe_api_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_base: String,
}
