mod handlers;
mod metrics;
mod routes;

use std::sync::Arc;

use axum::Router;
use gradely_common::notify::{LogNotifier, NotificationSink};
use gradely_common::queue::{RedisTaskQueue, TaskQueue};
use gradely_common::repo::{RedisSolutionRepository, SolutionRepository};
use redis::aio::ConnectionManager;
use tokio::net::TcpListener;
use tracing::info;

pub struct AppState {
    pub repo: Arc<dyn SolutionRepository>,
    pub queue: Arc<dyn TaskQueue>,
    pub notifier: Arc<dyn NotificationSink>,
}

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Gradely API booting...");

    // Connect to Redis
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    let client = redis::Client::open(redis_url.as_str()).expect("Failed to create Redis client");

    let redis_conn = ConnectionManager::new(client)
        .await
        .expect("Failed to connect to Redis");

    info!("Connected to Redis: {}", redis_url);

    let state = Arc::new(AppState {
        repo: Arc::new(RedisSolutionRepository::new(redis_conn.clone())),
        queue: Arc::new(RedisTaskQueue::new(redis_conn)),
        notifier: Arc::new(LogNotifier),
    });

    // Build router
    let app = Router::new().merge(routes::routes()).with_state(state);

    // Start server
    let addr = std::env::var("API_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = TcpListener::bind(&addr).await.expect("Failed to bind to address");

    info!("HTTP server listening on {}", addr);
    info!("Ready to accept solutions");

    axum::serve(listener, app).await.expect("Server error");
}
