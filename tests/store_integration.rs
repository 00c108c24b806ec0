//! Runs against the Postgres and Redis servers named in `configuration.yaml`.
//! Each test gets a fresh database. Start both servers, then
//! `cargo test --test store_integration -- --ignored`.

mod common;

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::TestApp;
use serde_json::Value;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use uuid::Uuid;

use user_auth::auth::{PgRefreshTokenStore, RefreshTokenStore, SessionStore};
use user_auth::cache::{RedisCache, SessionCache};
use user_auth::clock::{Clock, SystemClock};
use user_auth::configuration::{get_configuration, DatabaseSettings, Settings};
use user_auth::error::{AuthError, StoreError};
use user_auth::models::NewUser;
use user_auth::repository::{PgUserRepository, UserRepository};
use user_auth::startup::{run, Application};

pub async fn configure_database(config: &DatabaseSettings) -> PgPool {
    // Create database
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");
    // Migrate database
    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

fn configuration() -> Settings {
    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = Uuid::new_v4().to_string();
    configuration
}

async fn redis_cache(configuration: &Settings) -> RedisCache {
    RedisCache::connect(&configuration.redis)
        .await
        .expect("Failed to connect to Redis")
}

/// Production wiring: Postgres repositories, Redis sessions, default bcrypt cost.
async fn spawn_app() -> (TestApp, PgPool) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let configuration = configuration();
    let pool = configure_database(&configuration.database).await;
    let cache = redis_cache(&configuration).await;
    let application = Application::assemble(&configuration, pool.clone(), Arc::new(cache));

    let server = run(listener, application.auth.clone(), application.users)
        .expect("Failed to bind address");
    let _ = tokio::spawn(server);

    let app = TestApp {
        address,
        client: reqwest::Client::new(),
        auth: application.auth,
    };
    (app, pool)
}

fn new_user(username: &str, email: &str) -> NewUser {
    NewUser {
        username: username.to_string(),
        email: email.to_string(),
        password_hash: "$2b$04$not-a-real-digest".to_string(),
    }
}

async fn refresh_rows(pool: &PgPool, user_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM refresh_tokens WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .expect("Failed to count refresh tokens")
}

// --- HTTP flows over the real stores ---

#[tokio::test]
#[ignore = "needs Postgres and Redis"]
async fn duplicate_register_returns_400_conflict() {
    let (app, _pool) = spawn_app().await;
    assert_eq!(201, app.register("alice", "a@x.com", "pw1").await.status().as_u16());

    for (username, email) in [("alice", "other@x.com"), ("bob", "a@x.com")] {
        let response = app.register(username, email, "pw1").await;

        assert_eq!(400, response.status().as_u16());
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "CONFLICT");
    }
}

#[tokio::test]
#[ignore = "needs Postgres and Redis"]
async fn refresh_replay_returns_401() {
    let (app, _pool) = spawn_app().await;
    let session = app.signed_in("alice", "a@x.com", "pw1").await;

    let rotated = app.refresh(&session.refresh_token).await;
    assert_eq!(200, rotated.status().as_u16());
    let rotated: Value = rotated.json().await.unwrap();
    let new_access = rotated["accessToken"].as_str().unwrap();
    assert_eq!(200, app.get_authed("/users/profile", new_access).await.status().as_u16());

    let replay = app.refresh(&session.refresh_token).await;
    assert_eq!(401, replay.status().as_u16());
    let body: Value = replay.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_TOKEN");
}

#[tokio::test]
#[ignore = "needs Postgres and Redis"]
async fn logout_deletes_every_refresh_row() {
    let (app, pool) = spawn_app().await;
    let first = app.signed_in("alice", "a@x.com", "pw1").await;
    let second: Value = app.login("a@x.com", "pw1").await.json().await.unwrap();
    let user_id: Uuid = first.user_id.parse().unwrap();
    assert_eq!(refresh_rows(&pool, user_id).await, 2);

    assert_eq!(200, app.logout(&first.access_token).await.status().as_u16());

    assert_eq!(refresh_rows(&pool, user_id).await, 0);
    assert_eq!(401, app.get_authed("/users/profile", &first.access_token).await.status().as_u16());
    let other_access = second["accessToken"].as_str().unwrap();
    assert_eq!(200, app.get_authed("/users/profile", other_access).await.status().as_u16());
}

#[tokio::test]
#[ignore = "needs Postgres and Redis"]
async fn deleted_user_loses_sessions_and_refresh_rows() {
    let (app, pool) = spawn_app().await;
    let admin = app.signed_in("admin", "admin@x.com", "pw1").await;
    let bob = app.signed_in("bob", "b@x.com", "pw1").await;

    let response = app
        .delete_authed(&format!("/users/{}", bob.user_id), &admin.access_token)
        .await;
    assert_eq!(200, response.status().as_u16());

    assert_eq!(refresh_rows(&pool, bob.user_id.parse().unwrap()).await, 0);
    assert_eq!(401, app.get_authed("/users/profile", &bob.access_token).await.status().as_u16());
    assert_eq!(401, app.refresh(&bob.refresh_token).await.status().as_u16());
}

// --- Postgres stores ---

#[tokio::test]
#[ignore = "needs Postgres"]
async fn unique_constraint_surfaces_as_conflict() {
    let pool = configure_database(&configuration().database).await;
    let users = PgUserRepository::new(pool);
    users.create(&new_user("alice", "a@x.com"), Utc::now()).await.unwrap();

    for (username, email) in [("alice", "other@x.com"), ("bob", "a@x.com")] {
        let err = users
            .create(&new_user(username, email), Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::UniqueViolation(_)), "got {:?}", err);
        assert!(matches!(AuthError::from(err), AuthError::Conflict));
    }
}

#[tokio::test]
#[ignore = "needs Postgres"]
async fn concurrent_take_succeeds_once() {
    let pool = configure_database(&configuration().database).await;
    let users = PgUserRepository::new(pool.clone());
    let tokens = PgRefreshTokenStore::new(pool);
    let alice = users.create(&new_user("alice", "a@x.com"), Utc::now()).await.unwrap();

    let now = Utc::now();
    let secret = tokens
        .create(alice.id, now, now + chrono::Duration::days(7))
        .await
        .unwrap();
    assert_eq!(tokens.lookup(&secret).await.unwrap().unwrap().user_id, alice.id);

    let (first, second) = tokio::join!(tokens.take(&secret), tokens.take(&secret));
    let winners = [first.unwrap(), second.unwrap()]
        .into_iter()
        .filter(Option::is_some)
        .count();

    assert_eq!(winners, 1);
    assert!(tokens.lookup(&secret).await.unwrap().is_none());
    assert!(!tokens.delete(&secret).await.unwrap());
}

#[tokio::test]
#[ignore = "needs Postgres"]
async fn delete_all_only_touches_one_user() {
    let pool = configure_database(&configuration().database).await;
    let users = PgUserRepository::new(pool.clone());
    let tokens = PgRefreshTokenStore::new(pool.clone());
    let alice = users.create(&new_user("alice", "a@x.com"), Utc::now()).await.unwrap();
    let bob = users.create(&new_user("bob", "b@x.com"), Utc::now()).await.unwrap();

    let expires = Utc::now() + chrono::Duration::days(7);
    for _ in 0..2 {
        tokens.create(alice.id, Utc::now(), expires).await.unwrap();
    }
    let bobs = tokens.create(bob.id, Utc::now(), expires).await.unwrap();

    assert_eq!(tokens.delete_all(alice.id).await.unwrap(), 2);
    assert_eq!(refresh_rows(&pool, alice.id).await, 0);
    assert!(tokens.lookup(&bobs).await.unwrap().is_some());
}

#[tokio::test]
#[ignore = "needs Postgres"]
async fn deleting_a_user_cascades_to_refresh_tokens() {
    let pool = configure_database(&configuration().database).await;
    let users = PgUserRepository::new(pool.clone());
    let tokens = PgRefreshTokenStore::new(pool.clone());
    let alice = users.create(&new_user("alice", "a@x.com"), Utc::now()).await.unwrap();
    let secret = tokens
        .create(alice.id, Utc::now(), Utc::now() + chrono::Duration::days(7))
        .await
        .unwrap();

    assert!(users.delete(alice.id).await.unwrap());

    assert!(tokens.lookup(&secret).await.unwrap().is_none());
    assert_eq!(refresh_rows(&pool, alice.id).await, 0);
}

// --- Redis cache ---

#[tokio::test]
#[ignore = "needs Redis"]
async fn set_add_stores_members_and_sets_ttl() {
    let configuration = configuration();
    let cache = redis_cache(&configuration).await;
    let key = format!("user_auth-test:{}", Uuid::new_v4());

    cache.set_add(&key, "a", Duration::from_secs(60)).await.unwrap();
    cache.set_add(&key, "b", Duration::from_secs(120)).await.unwrap();

    let mut members = cache.set_members(&key).await.unwrap();
    members.sort();
    assert_eq!(members, vec!["a".to_string(), "b".to_string()]);

    let client = redis::Client::open(configuration.redis.connection_string()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    let ttl: i64 = redis::cmd("TTL").arg(&key).query_async(&mut conn).await.unwrap();
    assert!(ttl > 60 && ttl <= 120, "ttl was {}", ttl);

    cache.set_remove(&key, "a").await.unwrap();
    cache.set_remove(&key, "b").await.unwrap();
    assert!(cache.set_members(&key).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "needs Redis"]
async fn session_store_over_redis_revokes_every_session() {
    let configuration = configuration();
    let cache: Arc<dyn SessionCache> = Arc::new(redis_cache(&configuration).await);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let sessions = SessionStore::new(cache, clock, Duration::from_secs(3600));
    let user_id = Uuid::new_v4();
    let (first, second) = (Uuid::new_v4().to_string(), Uuid::new_v4().to_string());

    sessions.create(user_id, &first, Duration::from_secs(60)).await.unwrap();
    sessions.create(user_id, &second, Duration::from_secs(60)).await.unwrap();
    assert_eq!(sessions.get(&first).await.unwrap().unwrap().user_id, user_id);

    assert_eq!(sessions.delete_all(user_id).await.unwrap(), 2);

    assert!(sessions.get(&first).await.unwrap().is_none());
    assert!(sessions.get(&second).await.unwrap().is_none());
    assert!(sessions.ping().await.is_ok());
}
