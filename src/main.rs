use std::sync::Arc;

use anyhow::Context as _;
use axum::{
    routing::{get, post},
    Router,
};
use chrono::Utc;
use futures_util::future::join_all;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

mod config;
mod context;
mod data;
mod features;
mod handlers;
mod messaging;
mod schema;
mod utils;

#[cfg(test)]
mod testing;

use crate::config::AppConfig;
use crate::context::AppContext;
use crate::data::repositories::{migrations, sqlite, CardStore, SqliteStore};
use crate::messaging::{Messenger, TelegramMessenger};
use crate::utils::{spawn_periodic, Templates};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    // Database configuration
    let pool = sqlite::build_pool(&config.database_url).context("Failed to create DB pool")?;
    migrations::run(&pool).context("Failed to prepare the database schema")?;
    let store: Arc<dyn CardStore> = Arc::new(SqliteStore::new(pool));

    // Templates and outbound chat API
    let templates = Arc::new(Templates::load().context("Template parsing error")?);
    let messenger: Arc<dyn Messenger> = Arc::new(TelegramMessenger::new(
        &config.telegram_api_url,
        &config.telegram_token,
    ));

    let bind_addr = config.bind_addr.clone();
    let ctx = Arc::new(AppContext::new(config, store, messenger, templates));

    let shutdown = CancellationToken::new();
    let loops = spawn_background_loops(&ctx, &shutdown);

    let app = Router::new()
        .route("/telegram/webhook", post(handlers::telegram_webhook))
        .route("/health", get(handlers::health))
        .with_state(ctx);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {bind_addr}"))?;
    log::info!("Server running on http://{}", bind_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await;

    // Stop the loops whether the server exited cleanly or not.
    shutdown.cancel();
    for result in join_all(loops).await {
        if let Err(e) = result {
            log::error!("Background loop ended abnormally: {}", e);
        }
    }

    served.context("Server error")?;
    log::info!("Shut down cleanly");
    Ok(())
}

fn spawn_background_loops(
    ctx: &Arc<AppContext>,
    shutdown: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let reminder_tick = ctx.config.reminder_tick;
    let reminders = {
        let ctx = ctx.clone();
        spawn_periodic("Reminder dispatcher", reminder_tick, shutdown.clone(), move || {
            let ctx = ctx.clone();
            async move {
                if let Err(e) = ctx.reminders.tick(Utc::now().naive_utc()).await {
                    log::error!("Reminder tick failed: {}", e);
                }
            }
        })
    };

    let quiz_sweep = ctx.config.quiz_sweep_interval;
    let quizzes = {
        let ctx = ctx.clone();
        spawn_periodic("Quiz sweeper", quiz_sweep, shutdown.clone(), move || {
            let ctx = ctx.clone();
            async move {
                ctx.quiz.sweep(Utc::now().naive_utc());
            }
        })
    };

    let review_sweep = ctx.config.review_sweep_interval;
    let reviews = {
        let ctx = ctx.clone();
        spawn_periodic("Review sweeper", review_sweep, shutdown.clone(), move || {
            let ctx = ctx.clone();
            async move {
                if let Err(e) = ctx.review.sweep_idle(Utc::now().naive_utc()) {
                    log::error!("Review sweep failed: {}", e);
                }
            }
        })
    };

    vec![reminders, quizzes, reviews]
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = shutdown.cancelled() => {},
    }
    log::info!("Shutdown requested");
}
