use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Extension, Json, Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use config::Config;
use rate_limit::{RateLimitManager, Tier};
use server::ServeConfig;
use tokio::{net::TcpListener, time::timeout};

/// Test client for making HTTP requests to the test server
pub struct TestClient {
    base_url: String,
    client: reqwest::Client,
}

impl TestClient {
    /// Create a new test client for the given base URL
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Start a request to `path` on the server
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client.request(method, format!("{}{}", self.base_url, path))
    }

    /// Send a GET request to the given path
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.request(reqwest::Method::GET, path).send().await.unwrap()
    }
}

/// Test server that manages the lifecycle of a server instance
pub struct TestServer {
    pub client: TestClient,
    pub address: SocketAddr,
    _handle: tokio::task::JoinHandle<()>,
}

/// Builder for [`TestServer`]
pub struct TestServerBuilder {
    application: Router,
}

impl Default for TestServerBuilder {
    fn default() -> Self {
        Self {
            application: content_api(),
        }
    }
}

impl TestServerBuilder {
    /// Replace the protected application routes
    pub fn application(mut self, application: Router) -> Self {
        self.application = application;
        self
    }

    /// Start a server with the given TOML configuration
    pub async fn build(self, config_toml: &str) -> TestServer {
        let config: Config = toml::from_str(config_toml).unwrap();

        // Find an available port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let serve_config = ServeConfig {
            listen_address: address,
            config,
            application: self.application,
        };

        let handle = tokio::spawn(async move {
            // Drop the listener so the server can bind to the address
            drop(listener);

            if let Err(e) = server::serve(serve_config).await {
                eprintln!("Server failed to start: {e}");
            }
        });

        let client = TestClient::new(format!("http://{address}"));

        // Wait until the server accepts connections
        for _ in 0..50 {
            let probe = client.request(reqwest::Method::GET, "/").send();

            if let Ok(Ok(_)) = timeout(Duration::from_millis(100), probe).await {
                break;
            }

            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        TestServer {
            client,
            address,
            _handle: handle,
        }
    }
}

impl TestServer {
    pub fn builder() -> TestServerBuilder {
        TestServerBuilder::default()
    }

    /// Start a server with the default content API
    pub async fn start(config_toml: &str) -> Self {
        Self::builder().build(config_toml).await
    }
}

/// A small content API shaped like the routes the classifier knows about.
///
/// Creating a letter additionally charges a notification update to the same caller
/// through the in-process adapter.
pub fn content_api() -> Router {
    Router::new()
        .route("/api/thoughts", get(list).post(created))
        .route("/api/search", get(list))
        .route("/api/posts/{id}", get(item).patch(item).delete(item))
        .route("/api/posts/{id}/like", post(item))
        .route("/api/threads/{id}/replies/{reply}/like", post(item))
        .route("/api/letters", post(create_letter))
        .route("/api/notifications/{id}", patch(item))
        .route("/api/auth/session", post(created))
}

async fn list() -> Json<serde_json::Value> {
    Json(serde_json::json!([]))
}

async fn item() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn created() -> StatusCode {
    StatusCode::CREATED
}

async fn create_letter(Extension(manager): Extension<Arc<RateLimitManager>>) -> impl IntoResponse {
    match manager.admit(Tier::InteractionNotificationUpdate).await {
        Ok(admission) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "notifications_remaining": admission.remaining })),
        ),
        Err(exceeded) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "retry_after": exceeded.retry_after_seconds })),
        ),
    }
}

/// Whether a Redis server answers on the default local port.
pub async fn redis_available() -> bool {
    matches!(
        timeout(Duration::from_millis(200), tokio::net::TcpStream::connect("127.0.0.1:6379")).await,
        Ok(Ok(_))
    )
}

/// A key prefix unique to one test run, so parallel tests never share counters.
pub fn unique_prefix(test: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();

    format!("test_{test}_{nanos}:")
}
