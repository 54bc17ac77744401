// src/main.rs
use actix_web::{App, HttpResponse, HttpServer, Responder, web};
use dotenvy::dotenv;
use sqlx::PgPool;
use std::env;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use premium_sync::{AppState, api, docs};

async fn index() -> impl Responder {
    HttpResponse::Ok().body("Service ready!")
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let stripe_api_key = env::var("STRIPE_API_KEY").expect("STRIPE_API_KEY required");
    let stripe_webhook_secret =
        env::var("STRIPE_WEBHOOK_SECRET").expect("STRIPE_WEBHOOK_SECRET required");
    let stripe_api_base = env::var("STRIPE_API_BASE_URL")
        .unwrap_or_else(|_| "https://api.stripe.com".to_string());

    let state = web::Data::new(AppState {
        pool,
        stripe_api_key,
        stripe_webhook_secret,
        stripe_api_base,
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/", web::get().to(index))
            .service(
                SwaggerUi::new("/docs/{_:.*}")
                    .url("/api-docs/openapi.json", docs::ApiDoc::openapi()),
            )
            .service(api::webhooks::webhook_resource())
    })
    .bind(("0.0.0.0", 8070))?
    .run()
    .await
}
