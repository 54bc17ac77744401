pub mod signature;
pub mod stripe_client;
pub mod webhooks;
