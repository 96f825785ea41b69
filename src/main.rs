use home_dashboard_api::api::{create_router, AppState};
use home_dashboard_api::config::AppConfig;
use home_dashboard_api::database::connection::{establish_connection_pool, DatabaseError, PgPool};
use home_dashboard_api::database::repositories::{
    ElectricityRepositoryImpl, StockRepositoryImpl, TodoRepositoryImpl,
};
use home_dashboard_api::jobs::{
    ElectricityFetchJob, JobSupervisor, RetryPolicy, StocksPruneJob,
};
use home_dashboard_api::services::{
    ElectricityService, MockSensorSource, NetworkMonitor, SensorPoller, TelemetryCell,
    TodoistService, TransitService, WeatherService,
};
use home_dashboard_api::stocks::{
    MarketCalendar, QuotaConfig, QuotaGuard, StalenessPolicy, StocksService, TwelveDataProvider,
};
use home_dashboard_api::upstream;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "home_dashboard_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(%error, "Configuration error");
            std::process::exit(1);
        }
    };

    let pool = match establish_connection_pool(&config.database_url, config.pool_size) {
        Ok(pool) => pool,
        Err(error) => {
            tracing::error!(%error, "Database unavailable");
            std::process::exit(1);
        }
    };

    let client = upstream::build_client();

    // Repositories share the pool through a connection provider
    let stock_repository = Arc::new(StockRepositoryImpl::new(conn_provider(pool.clone())));
    let electricity_repository =
        Arc::new(ElectricityRepositoryImpl::new(conn_provider(pool.clone())));
    let todo_repository = Arc::new(TodoRepositoryImpl::new(conn_provider(pool)));

    // Core services
    let quota = Arc::new(QuotaGuard::new(QuotaConfig::default()));
    let stocks = Arc::new(StocksService::new(
        stock_repository.clone(),
        Arc::new(TwelveDataProvider::new(
            client.clone(),
            config.twelvedata_api_key.clone(),
        )),
        quota.clone(),
        MarketCalendar::default(),
        StalenessPolicy::default(),
    ));
    let electricity = Arc::new(ElectricityService::new(
        electricity_repository,
        client.clone(),
    ));
    let todoist = Arc::new(TodoistService::new(
        todo_repository,
        client.clone(),
        config.todoist_token.clone(),
        config.todoist_label.clone(),
        config.todoist_poll_interval,
    ));
    let network = Arc::new(NetworkMonitor::new(
        config.network_ping_target.clone(),
        config.network_interface.clone(),
        config.network_poll_interval,
    ));
    let weather = Arc::new(WeatherService::new(
        client.clone(),
        config.weather_settings_path.clone(),
    ));
    let transit = Arc::new(TransitService::new(
        client,
        config.digitransit_api_key.clone(),
        config.transit_stop_ids.clone(),
    ));
    let sensor = Arc::new(TelemetryCell::new());

    let supervisor = match start_background_jobs(
        &config,
        stocks.clone(),
        electricity.clone(),
        todoist.clone(),
        network.clone(),
        sensor.clone(),
    )
    .await
    {
        Ok(supervisor) => supervisor,
        Err(error) => {
            tracing::error!(%error, "Background job startup failed");
            std::process::exit(1);
        }
    };

    let app = create_router(AppState {
        stocks,
        stock_repository,
        quota,
        electricity,
        todoist,
        network,
        weather,
        transit,
        sensor,
    });

    let listener = match tokio::net::TcpListener::bind(&config.bind_address).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%error, address = %config.bind_address, "Bind failed");
            std::process::exit(1);
        }
    };

    tracing::info!("🚀 Home dashboard API running on http://{}", config.bind_address);
    tracing::info!("📚 Swagger UI: http://{}/swagger-ui", config.bind_address);

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    supervisor.stop_all().await;

    if let Err(error) = serve_result {
        tracing::error!(%error, "Server error");
        std::process::exit(1);
    }
}

fn conn_provider(
    pool: PgPool,
) -> impl Fn() -> Result<
    home_dashboard_api::database::connection::PgPooledConnection,
    DatabaseError,
> + Send
       + Sync
       + 'static {
    move || {
        pool.get()
            .map_err(|e| DatabaseError::ConnectionPoolError(e.to_string()))
    }
}

/// Register and start every background task
async fn start_background_jobs(
    config: &AppConfig,
    stocks: Arc<StocksService>,
    electricity: Arc<ElectricityService>,
    todoist: Arc<TodoistService>,
    network: Arc<NetworkMonitor>,
    sensor_cell: Arc<TelemetryCell>,
) -> Result<Arc<JobSupervisor>, home_dashboard_api::jobs::JobError> {
    let supervisor = Arc::new(JobSupervisor::new(config.shutdown_grace).await?);

    if config.todoist_token.is_empty() {
        tracing::warn!("Todoist token not configured, task mirror disabled");
    } else {
        supervisor.register_poller(todoist);
    }
    supervisor.register_poller(network);
    supervisor.register_poller(Arc::new(SensorPoller::new(
        Arc::new(MockSensorSource::new()),
        sensor_cell,
        config.sensor_poll_interval,
    )));

    // Tomorrow's sheet is published early afternoon local time; the
    // retry loop inside the job rides out publication jitter
    let electricity_job = Arc::new(ElectricityFetchJob::new(
        electricity,
        RetryPolicy::default(),
    ));
    supervisor
        .schedule_cron(
            "electricity_daily_fetch",
            "0 2 14 * * *",
            chrono_tz::Europe::Helsinki,
            electricity_job.clone(),
        )
        .await?;
    // Also once at startup, to recover after downtime
    supervisor
        .schedule_startup("electricity_startup_fetch", electricity_job)
        .await?;

    supervisor
        .schedule_cron(
            "stocks_history_prune",
            "0 0 * * * *",
            chrono_tz::UTC,
            Arc::new(StocksPruneJob::new(stocks)),
        )
        .await?;

    supervisor.start_all().await?;
    Ok(supervisor)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "Ctrl-C handler failed");
            // Fall back to never resolving; SIGTERM still works
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    // Give in-flight requests a moment before the supervisor tears
    // background work down
    tokio::time::sleep(Duration::from_millis(100)).await;
}
