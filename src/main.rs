use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use usermgmt_api::{
    config::Config,
    db::{self, kv::RedisKv, users::PgUserStore},
    services::{
        email::{LogMailer, Mailer, SmtpMailer},
        email_queue::{EmailQueue, RetryPolicy},
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");

    let kv = RedisKv::connect(&config.redis_url).await?;
    info!("Redis connected");

    let transport: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => {
            info!("SMTP email service configured");
            Arc::new(SmtpMailer::new(smtp)?)
        }
        None => {
            info!("SMTP not configured, emails will be logged and dropped");
            Arc::new(LogMailer)
        }
    };
    let (email_queue, _email_worker) = EmailQueue::start(transport, RetryPolicy::default());

    let state = AppState::new(
        &config.auth,
        Arc::new(PgUserStore::new(pool)),
        Arc::new(kv),
        Arc::new(email_queue),
    );

    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_str(&config.client_url)?)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let app = usermgmt_api::router(state).layer(cors);

    let addr = format!("{}:{}", config.host, config.port);
    info!("User management API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
