use dermacart_backend::api::{cors_layer, router, AppState};
use dermacart_backend::cache::store::{
    MemoryRetryQueue, MemoryTransientStore, RedisRetryQueue, RedisTransientStore, RetryQueue,
    TransientStore,
};
use dermacart_backend::cache::{init_cache_pool, keys, CachePoolConfig};
use dermacart_backend::checkout::preparation::OrderPreparation;
use dermacart_backend::config::AppConfig;
use dermacart_backend::database::init_pool_from_config;
use dermacart_backend::database::order_repository::{
    MemoryOrderStore, OrderStore, PgOrderRepository,
};
use dermacart_backend::health::HealthChecker;
use dermacart_backend::logging::init_tracing;
use dermacart_backend::payments::factory::PaymentProviderFactory;
use dermacart_backend::services::checkout::CheckoutService;
use dermacart_backend::services::reconciler::CallbackReconciler;
use dermacart_backend::workers::reconciliation_retry::ReconciliationRetryWorker;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Graceful shutdown signal handler
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config comes first so the subscriber can be built from it; config
    // failures this early go straight to stderr via anyhow.
    let config = AppConfig::from_env().map_err(|e| anyhow::anyhow!("configuration error: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("configuration validation failed: {}", e))?;

    init_tracing(&config.logging);

    let skip_externals = std::env::var("SKIP_EXTERNALS")
        .unwrap_or_else(|_| "false".to_string())
        .to_lowercase()
        == "true";

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        "Starting Dermacart backend service"
    );

    // Wire up stores. SKIP_EXTERNALS trades Redis and Postgres for in-memory
    // equivalents so the flow can be exercised without infrastructure.
    let (transient, retry_queue, orders, db_pool, cache_pool): (
        Arc<dyn TransientStore>,
        Arc<dyn RetryQueue>,
        Arc<dyn OrderStore>,
        _,
        _,
    ) = if skip_externals {
        info!("SKIP_EXTERNALS=true, using in-memory stores");
        (
            Arc::new(MemoryTransientStore::new()),
            Arc::new(MemoryRetryQueue::new()),
            Arc::new(MemoryOrderStore::new()),
            None,
            None,
        )
    } else {
        info!("Initializing database connection pool");
        let db_pool = init_pool_from_config(&config.database).await.map_err(|e| {
            error!("Failed to initialize database pool: {}", e);
            anyhow::anyhow!(e.to_string())
        })?;

        info!("Initializing Redis cache connection pool");
        let cache_pool = init_cache_pool(CachePoolConfig {
            redis_url: config.cache.redis_url.clone(),
            max_connections: config.cache.max_connections,
            ..Default::default()
        })
        .await
        .map_err(|e| {
            error!("Failed to initialize cache pool: {}", e);
            anyhow::anyhow!(e.to_string())
        })?;

        (
            Arc::new(RedisTransientStore::new(cache_pool.clone())),
            Arc::new(RedisRetryQueue::new(
                cache_pool.clone(),
                keys::order::RECONCILE_QUEUE,
            )),
            Arc::new(PgOrderRepository::new(db_pool.clone())),
            Some(db_pool),
            Some(cache_pool),
        )
    };

    let factory = Arc::new(PaymentProviderFactory::from_env().map_err(|e| {
        error!("Payment provider configuration failed: {}", e);
        anyhow::anyhow!(e.to_string())
    })?);
    info!(providers = ?factory.list_available(), "Payment providers enabled");

    let preparation = OrderPreparation::new(
        transient.clone(),
        Duration::from_secs(config.payment.checkout_ttl_secs),
    );
    let checkout = Arc::new(CheckoutService::new(
        preparation,
        factory.clone(),
        transient.clone(),
    ));
    let reconciler = Arc::new(CallbackReconciler::new(
        factory,
        transient,
        orders.clone(),
        retry_queue.clone(),
    ));

    let state = Arc::new(AppState {
        checkout,
        reconciler,
        orders: orders.clone(),
        health: HealthChecker::new(db_pool, cache_pool),
        result_url: config.payment.result_url.clone(),
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = ReconciliationRetryWorker::new(
        retry_queue,
        orders,
        Duration::from_secs(config.payment.retry_interval_secs),
    );
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    let app = router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(cors_layer(&config.server.cors_allowed_origins)),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address: {}", e))?;
    info!(addr = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    // Let the retry worker observe the signal and finish its pass.
    if let Err(e) = worker_handle.await {
        error!("Retry worker terminated abnormally: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}
