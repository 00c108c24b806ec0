use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::auth::AuthService;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub cache: &'static str,
}

fn state(up: bool) -> &'static str {
    if up {
        "up"
    } else {
        "down"
    }
}

/// GET /health_check
///
/// 200 when both stores answer, 503 otherwise.
pub async fn health_check(auth: web::Data<AuthService>) -> HttpResponse {
    let health = auth.check_stores().await;
    let healthy = health.database && health.cache;

    let body = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        database: state(health.database),
        cache: state(health.cache),
    };

    if healthy {
        tracing::debug!("Health check passed");
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}
