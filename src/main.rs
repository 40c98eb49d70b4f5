use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

use slotbook::config::AppConfig;
use slotbook::db;
use slotbook::db::queries;
use slotbook::handlers;
use slotbook::services::notifications::mailgun::MailgunMailer;
use slotbook::services::payments::stripe::StripeClient;
use slotbook::services::sweep;
use slotbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env()?;

    let conn = db::init_db(&config.database_url)?;
    let seeded = queries::seed_default_services(&conn, &chrono::Local::now().naive_local())?;
    if seeded > 0 {
        tracing::info!(count = seeded, "seeded default services");
    }

    anyhow::ensure!(!config.stripe_secret_key.is_empty(), "STRIPE_SECRET_KEY must be set");
    if config.stripe_webhook_secret.is_empty() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not set, payment webhooks are accepted unsigned");
    }
    if config.session_secret.is_empty() {
        tracing::warn!("SESSION_SECRET not set, admin API is disabled");
    }
    let payments = StripeClient::new(config.stripe_secret_key.clone());

    let mailer = MailgunMailer::new(
        config.mail_api_base.clone(),
        config.mail_domain.clone(),
        config.mail_api_key.clone(),
        config.mail_default_sender.clone(),
    );
    if !mailer.is_configured() {
        tracing::warn!("mail transport not configured, notifications will be logged as failed");
    }

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        payments: Box::new(payments),
        mailer: Box::new(mailer),
    });

    tokio::spawn(sweep::run_pending_sweep(Arc::clone(&state)));

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
