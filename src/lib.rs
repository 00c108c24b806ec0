pub mod auth;
pub mod cache;
pub mod clock;
pub mod configuration;
pub mod error;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod routes;
pub mod startup;
pub mod telemetry;
pub mod users;
pub mod validators;
