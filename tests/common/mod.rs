#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use user_auth::auth::{
    AuthService, BcryptHasher, InMemoryRefreshTokenStore, JwtCodec, SessionStore, TokenPolicy,
};
use user_auth::cache::{InMemoryCache, SessionCache};
use user_auth::clock::{Clock, SystemClock};
use user_auth::configuration::JwtSettings;
use user_auth::repository::InMemoryUserRepository;
use user_auth::startup::run;
use user_auth::users::UserService;

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub auth: Arc<AuthService>,
}

pub struct LoggedIn {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
}

fn jwt_settings() -> JwtSettings {
    JwtSettings {
        secret: "integration-test-secret-with-enough-length".to_string(),
        access_token_expiry: 900,
        refresh_token_expiry: 604800,
        issuer: "user_auth_test".to_string(),
    }
}

pub async fn spawn_app() -> TestApp {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    spawn_app_with_cache(Arc::new(InMemoryCache::new(clock))).await
}

/// Same wiring as production, with in-memory stores and a cheap bcrypt cost.
pub async fn spawn_app_with_cache(cache: Arc<dyn SessionCache>) -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let users = Arc::new(InMemoryUserRepository::new());
    let sessions = SessionStore::new(cache, clock.clone(), Duration::from_secs(3600));

    let auth = Arc::new(AuthService::new(
        users.clone(),
        Arc::new(InMemoryRefreshTokenStore::new()),
        sessions,
        Arc::new(BcryptHasher::with_cost(4)),
        Arc::new(JwtCodec::new(&jwt_settings(), clock.clone())),
        clock.clone(),
        TokenPolicy::default(),
    ));
    let user_service = Arc::new(UserService::new(users, auth.clone(), clock));

    let server = run(listener, auth.clone(), user_service).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        client: reqwest::Client::new(),
        auth,
    }
}

impl TestApp {
    pub async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(&format!("{}{}", self.address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> reqwest::Response {
        self.post_json(
            "/auth/register",
            &json!({ "username": username, "email": email, "password": password }),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.post_json("/auth/login", &json!({ "email": email, "password": password }))
            .await
    }

    /// Register then log in, returning the issued tokens.
    pub async fn signed_in(&self, username: &str, email: &str, password: &str) -> LoggedIn {
        assert_eq!(self.register(username, email, password).await.status().as_u16(), 201);
        let body: Value = self.login(email, password).await.json().await.unwrap();

        LoggedIn {
            user_id: body["user"]["id"].as_str().unwrap().to_string(),
            access_token: body["accessToken"].as_str().unwrap().to_string(),
            refresh_token: body["refreshToken"].as_str().unwrap().to_string(),
        }
    }

    pub async fn refresh(&self, refresh_token: &str) -> reqwest::Response {
        self.post_json("/auth/refresh", &json!({ "refreshToken": refresh_token }))
            .await
    }

    pub async fn logout(&self, access_token: &str) -> reqwest::Response {
        self.client
            .post(&format!("{}/auth/logout", self.address))
            .bearer_auth(access_token)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_authed(&self, path: &str, access_token: &str) -> reqwest::Response {
        self.client
            .get(&format!("{}{}", self.address, path))
            .bearer_auth(access_token)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn put_authed(&self, path: &str, access_token: &str, body: &Value) -> reqwest::Response {
        self.client
            .put(&format!("{}{}", self.address, path))
            .bearer_auth(access_token)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn delete_authed(&self, path: &str, access_token: &str) -> reqwest::Response {
        self.client
            .delete(&format!("{}{}", self.address, path))
            .bearer_auth(access_token)
            .send()
            .await
            .expect("Failed to execute request.")
    }
}
