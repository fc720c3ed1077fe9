pub mod config;
pub mod engine;
pub mod error;
pub mod mailer;
pub mod models;
pub mod paystack;
pub mod pricing;
pub mod routes;
pub mod store;
