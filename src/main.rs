use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inference_gateway::config::DiscoveryMode;
use inference_gateway::worker::{
    run_discovery_loop, EndpointsWorkerSource, StaticWorkerSource, WorkerSource,
};
use inference_gateway::{
    Config, Gateway, HealthMonitor, PlacementCache, Placer, Reconciler, RedisStore,
    RegistryStore, WorkerAddr, WorkerClient,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting inference gateway");

    // External registry
    let registry: Arc<dyn RegistryStore> = Arc::new(
        RedisStore::connect(&config.registry.url, config.timeouts.registry()).await?,
    );
    tracing::info!("Connected to registry at {}", config.registry.url);

    // Worker fleet collaborators
    let monitor = Arc::new(HealthMonitor::new());
    let client = Arc::new(WorkerClient::new(
        config.timeouts.probe(),
        config.timeouts.load(),
        config.timeouts.unload(),
        config.concurrency.health_fanout,
        config.concurrency.load_fanout,
    ));
    let cache = Arc::new(PlacementCache::new(config.timings.verify_ttl()));

    let source: Arc<dyn WorkerSource> = match config.workers.mode {
        DiscoveryMode::Static => {
            let addrs = config
                .workers
                .static_workers
                .iter()
                .map(|s| s.parse::<WorkerAddr>())
                .collect::<Result<Vec<_>, _>>()?;
            tracing::info!("Using static worker list ({} workers)", addrs.len());
            Arc::new(StaticWorkerSource::new(addrs))
        }
        DiscoveryMode::Cluster => {
            let kube_client = kube::Client::try_default().await?;
            tracing::info!(
                "Using cluster endpoint discovery for service {}/{}",
                config.workers.cluster.namespace,
                config.workers.cluster.service
            );
            Arc::new(EndpointsWorkerSource::new(
                kube_client,
                &config.workers.cluster.namespace,
                &config.workers.cluster.service,
                config.workers.cluster.target_port,
            ))
        }
    };

    let placer = Arc::new(Placer::new(
        registry.clone(),
        monitor.clone(),
        client.clone(),
        cache.clone(),
        config.registry.model_key_prefix.clone(),
        config.registry.worker_load_key_prefix.clone(),
        config.registry.assign_ttl(),
    ));
    let reconciler = Arc::new(Reconciler::new(
        registry,
        monitor.clone(),
        client.clone(),
        cache,
        config.registry.model_key_prefix.clone(),
        config.registry.worker_load_key_prefix.clone(),
        config.registry.assign_ttl(),
    ));

    // Initial discovery and probe so routing has a fleet before serving
    monitor.sync_addrs(&source.discover().await).await;
    monitor.probe_all(&client).await;

    // Background loops
    tokio::spawn(run_discovery_loop(
        source,
        monitor.clone(),
        config.timings.discover(),
    ));
    tokio::spawn(monitor.clone().run(client, config.timings.health()));
    tokio::spawn(reconciler.run(config.timings.reconcile()));

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(Gateway::new(config, monitor, placer));
    let app: Router = inference_gateway::routes::app(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    tracing::info!("Listening on {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
