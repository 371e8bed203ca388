use aptitude_backend::{
    config::{get_config, init_config, Config, LogFormat},
    database::pool::create_pool,
    middleware::{auth::JwtAuth, rate_limit::RateLimiter},
    routes,
    services::notification_service::{LogNotifier, NotificationPort, WebhookNotifier},
    services::session_service::SessionSettings,
    store::{MemoryStore, PgSessionStore, SessionStore},
    utils::time::{Clock, SystemClock},
    AppState,
};
use reqwest::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_config()?;
    let config = get_config()?;
    init_tracing(config.log_format);

    let notifier = build_notifier(config)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let settings = SessionSettings {
        max_violations: config.max_violations,
        submit_grace: chrono::Duration::seconds(config.submit_grace_seconds),
    };

    match &config.database_url {
        Some(url) => {
            let pool = create_pool(url).await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Using Postgres session store");
            serve(config, PgSessionStore::new(pool), notifier, clock, settings).await
        }
        None => {
            let store = match &config.seed_path {
                Some(path) => MemoryStore::load_seed_file(path)?,
                None => MemoryStore::new(),
            };
            tracing::warn!("DATABASE_URL not set, sessions are kept in memory");
            serve(config, store, notifier, clock, settings).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info,sqlx=warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn build_notifier(config: &Config) -> anyhow::Result<Arc<dyn NotificationPort>> {
    Ok(match &config.notification_webhook_url {
        Some(url) => {
            let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
            info!(target_url = %url, "Delivering session events to webhook");
            Arc::new(WebhookNotifier::new(
                client,
                url.to_string(),
                config.webhook_secret.clone(),
            ))
        }
        None => Arc::new(LogNotifier),
    })
}

async fn serve<S: SessionStore>(
    config: &Config,
    store: S,
    notifier: Arc<dyn NotificationPort>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
) -> anyhow::Result<()> {
    let app_state = AppState::new(store, notifier, clock, settings);

    {
        let sessions = app_state.sessions.clone();
        let interval = Duration::from_secs(config.sweep_interval_seconds.max(1));
        tokio::spawn(async move {
            loop {
                if let Err(e) = sessions.expire_overdue().await {
                    tracing::error!(error = ?e, "Overdue session sweep failed");
                }
                tokio::time::sleep(interval).await;
            }
        });
    }

    let app = routes::app_router(
        app_state,
        JwtAuth::new(&config.jwt_secret),
        RateLimiter::new(config.public_rps),
    )
    .layer(CorsLayer::permissive())
    .layer(TraceLayer::new_for_http())
    .layer(RequestBodyLimitLayer::new(1024 * 1024));

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
