mod client;
mod dispatch;
mod poller;

use std::sync::Arc;

use client::HttpGraderBackend;
use dispatch::Dispatcher;
use gradely_common::config::{DispatchConfig, GraderConfig, PollConfig};
use gradely_common::notify::LogNotifier;
use gradely_common::queue::{self, RedisTaskQueue};
use gradely_common::repo::RedisSolutionRepository;
use gradely_common::types::SolutionKind;
use poller::Poller;
use tokio::signal;
use tracing::{error, info, instrument, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Gradely worker booting...");

    // Get solution kind from environment
    let kind_str = std::env::var("WORKER_KIND").unwrap_or_else(|_| "education".to_string());

    let kind: SolutionKind = match kind_str.to_lowercase().parse() {
        Ok(kind) => kind,
        Err(_) => {
            error!("Invalid solution kind: {}", kind_str);
            error!("Valid options: education, competition");
            std::process::exit(1);
        }
    };

    let dispatch_config = DispatchConfig::from_env();
    let poll_config = PollConfig::from_env();
    let grader_config = GraderConfig::from_env();

    info!("Worker configured for kind: {}", kind);
    info!("Grading backend: {}", grader_config.base_url);
    info!("Dispatch queue: {}", queue::dispatch_queue(kind));
    info!("Poll queue: {}", queue::poll_queue(kind));
    info!(
        "Retry policy: {} attempts, soft {}s / hard {}s",
        dispatch_config.max_attempts,
        dispatch_config.soft_time_limit.as_secs(),
        dispatch_config.hard_time_limit.as_secs()
    );

    // Connect to Redis
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    let client = ::redis::Client::open(redis_url.as_str())?;
    let redis_conn = ::redis::aio::ConnectionManager::new(client).await?;

    info!("Connected to Redis: {}", redis_url);

    let repo = Arc::new(RedisSolutionRepository::new(redis_conn.clone()));
    let task_queue = Arc::new(RedisTaskQueue::new(redis_conn.clone()));
    let backend = Arc::new(HttpGraderBackend::new(grader_config));
    let notifier = Arc::new(LogNotifier);

    let dispatcher = Dispatcher::new(
        repo.clone(),
        task_queue.clone(),
        backend.clone(),
        notifier.clone(),
        dispatch_config,
    );
    let poller = Poller::new(repo, task_queue, backend, notifier, poll_config);

    // Setup graceful shutdown
    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
        warn!("Received shutdown signal, draining queues...");
    };

    let mut dispatch_conn = redis_conn.clone();
    let mut poll_conn = redis_conn;

    tokio::select! {
        _ = dispatch_loop(&mut dispatch_conn, kind, &dispatcher) => {},
        _ = poll_loop(&mut poll_conn, kind, &poller) => {},
        _ = shutdown => {},
    }

    info!("Worker shutdown complete");
    Ok(())
}

#[instrument(skip(redis_conn, dispatcher), fields(kind = %kind))]
async fn dispatch_loop(
    redis_conn: &mut ::redis::aio::ConnectionManager,
    kind: SolutionKind,
    dispatcher: &Dispatcher,
) -> anyhow::Result<()> {
    loop {
        // BLPOP with 5 second timeout for graceful shutdown
        match queue::pop_dispatch(redis_conn, kind, 5.0).await {
            Ok(Some(task)) => {
                info!(solution_id = %task.solution_id, "Received dispatch task");

                let start = std::time::Instant::now();
                match dispatcher.dispatch(&task).await {
                    Ok(outcome) => {
                        info!(
                            solution_id = %task.solution_id,
                            outcome = ?outcome,
                            elapsed_ms = start.elapsed().as_millis(),
                            "Dispatch finished"
                        );
                    }
                    Err(e) => {
                        error!(solution_id = %task.solution_id, error = %e, "Dispatch failed");
                    }
                }
            }
            Ok(None) => {
                // Timeout - check for shutdown
                continue;
            }
            Err(e) => {
                error!(error = %e, "Redis error");
                tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
            }
        }
    }
}

#[instrument(skip(redis_conn, poller), fields(kind = %kind))]
async fn poll_loop(
    redis_conn: &mut ::redis::aio::ConnectionManager,
    kind: SolutionKind,
    poller: &Poller,
) -> anyhow::Result<()> {
    loop {
        match queue::pop_poll(redis_conn, kind, 5.0).await {
            Ok(Some(task)) => {
                let solution_id = task.solution_id;
                match poller.handle(task).await {
                    Ok(outcome) => {
                        info!(solution_id = %solution_id, outcome = ?outcome, "Poll task finished");
                    }
                    Err(e) => {
                        error!(solution_id = %solution_id, error = %e, "Poll task failed");
                    }
                }
            }
            Ok(None) => {
                continue;
            }
            Err(e) => {
                error!(error = %e, "Redis error");
                tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
            }
        }
    }
}
