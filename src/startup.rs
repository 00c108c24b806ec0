use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthService, BcryptHasher, JwtCodec, PgRefreshTokenStore, SessionStore, TokenPolicy};
use crate::cache::{RedisCache, SessionCache};
use crate::clock::{Clock, SystemClock};
use crate::configuration::Settings;
use crate::error::json_error_handler;
use crate::middleware::{AuthMiddleware, RequestLogger};
use crate::repository::PgUserRepository;
use crate::routes::{
    delete_user, get_profile, get_user, health_check, list_users, login, logout, refresh, register,
    update_profile, update_user,
};
use crate::users::UserService;

/// Services shared by every worker
pub struct Application {
    pub auth: Arc<AuthService>,
    pub users: Arc<UserService>,
}

impl Application {
    /// Connect the production stores described by `configuration`.
    ///
    /// Pending migrations are applied before the services are assembled.
    pub async fn build(configuration: &Settings) -> Result<Self, std::io::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(configuration.database.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&configuration.database.connection_string())
            .await
            .map_err(|e| {
                tracing::error!("Failed to create connection pool: {}", e);
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "Database connection error")
            })?;
        tracing::info!("Database connection pool created successfully");

        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            tracing::error!("Failed to run migrations: {}", e);
            std::io::Error::new(std::io::ErrorKind::Other, "Database migration error")
        })?;

        let cache = RedisCache::connect(&configuration.redis).await.map_err(|e| {
            tracing::error!("Failed to connect to Redis: {}", e);
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "Cache connection error")
        })?;
        tracing::info!("Redis connection established");

        Ok(Self::assemble(configuration, pool, Arc::new(cache)))
    }

    /// Wire the services over already connected stores.
    pub fn assemble(configuration: &Settings, pool: PgPool, cache: Arc<dyn SessionCache>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let users = Arc::new(PgUserRepository::new(pool.clone()));
        let sessions = SessionStore::new(
            cache,
            clock.clone(),
            Duration::from_secs(configuration.session.index_ttl_margin),
        );

        let auth = Arc::new(AuthService::new(
            users.clone(),
            Arc::new(PgRefreshTokenStore::new(pool)),
            sessions,
            Arc::new(BcryptHasher::new()),
            Arc::new(JwtCodec::new(&configuration.jwt, clock.clone())),
            clock.clone(),
            TokenPolicy::from_settings(configuration),
        ));
        let user_service = Arc::new(UserService::new(users, auth.clone(), clock));

        Self {
            auth,
            users: user_service,
        }
    }
}

pub fn run(
    listener: TcpListener,
    auth: Arc<AuthService>,
    users: Arc<UserService>,
) -> Result<Server, std::io::Error> {
    let auth = web::Data::from(auth);
    let users = web::Data::from(users);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(RequestLogger)

            // Shared state
            .app_data(auth.clone())
            .app_data(users.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))

            // Public routes (no authentication required)
            .route("/health_check", web::get().to(health_check))
            .route("/auth/register", web::post().to(register))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))

            // Protected routes (require a live session)
            .service(
                web::scope("/auth/logout")
                    .wrap(AuthMiddleware::new(auth.clone()))
                    .route("", web::post().to(logout)),
            )
            .service(
                web::scope("/users")
                    .wrap(AuthMiddleware::new(auth.clone()))
                    .route("", web::get().to(list_users))
                    .route("/profile", web::get().to(get_profile))
                    .route("/profile", web::put().to(update_profile))
                    .route("/{id}", web::get().to(get_user))
                    .route("/{id}", web::put().to(update_user))
                    .route("/{id}", web::delete().to(delete_user)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
