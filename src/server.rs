use crate::config::Config;
use crate::error::Result;
use crate::handlers::{health_check, whoami};
use crate::memory::InMemoryEngine;
use crate::middleware::{logging_middleware, rate_limit};
use crate::pipeline::RateLimitPipeline;
use crate::redis::RedisEngine;
use crate::response::JsonLimitExceeded;
use axum::routing::{any, get};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the demo application with quota enforcement in front of every route.
pub fn create_app(pipeline: RateLimitPipeline) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/*path", any(whoami))
        .layer(middleware::from_fn_with_state(pipeline, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

pub struct Server {
    app: Router,
    bind_addr: SocketAddr,
}

impl Server {
    pub async fn new(config: &Config) -> Result<Self> {
        let policies = config.route_policies()?;
        let identifiers = config.key_strategy();

        let pipeline = match &config.redis_url {
            Some(url) => {
                let engine = RedisEngine::connect(url).await?;
                engine.ping().await?;
                tracing::info!("Redis responded to PING, using Redis quota engine");
                RateLimitPipeline::new(engine, policies, identifiers, JsonLimitExceeded::default())
            }
            None => {
                tracing::info!("No Redis URL configured, using in-memory quota engine");
                let engine = InMemoryEngine::new();
                spawn_cleanup(engine.clone(), config.cleanup_interval);
                RateLimitPipeline::new(engine, policies, identifiers, JsonLimitExceeded::default())
            }
        };

        Ok(Self {
            app: create_app(pipeline),
            bind_addr: config.bind_addr,
        })
    }

    pub async fn run(self) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        tracing::info!("Quota gate listening on {}", self.bind_addr);
        tracing::info!("Health check available at /health");

        axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        Ok(())
    }
}

fn spawn_cleanup(engine: InMemoryEngine, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            if let Err(e) = engine.purge_expired() {
                tracing::warn!("Failed to purge expired quota windows: {}", e);
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
