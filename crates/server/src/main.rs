use std::sync::Arc;

use tokio::sync::Notify;
use tracing::info;

use docpost_core::{config::load_dotenv, Config, ScheduleRegistry};
use docpost_notify::{
    Directory, EmailRenderer, LogMailer, Mailer, MemoryDirectory, SmtpMailer, TemplateRenderer,
};
use docpost_queue::{BatchedJobs, MemoryBatchStore, MemoryDelayQueue};
use docpost_server::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let config = Config::from_env();
    config.log_summary();

    let directory: Arc<dyn Directory> = Arc::new(MemoryDirectory::new());
    tracing::warn!("using the in-memory directory; state does not survive restarts");

    let store = Arc::new(MemoryBatchStore::new());
    let queue = Arc::new(MemoryDelayQueue::new());
    let registry = ScheduleRegistry::from_config(&config.schedules);
    let engine = Arc::new(BatchedJobs::new(store, queue, registry));

    let mailer: Arc<dyn Mailer> = if config.smtp.host.is_some() {
        Arc::new(SmtpMailer::from_config(&config.smtp)?)
    } else {
        info!("SMTP unconfigured; mail will be logged, not delivered");
        Arc::new(LogMailer::new())
    };

    let renderer = Arc::new(EmailRenderer::new(
        directory.clone(),
        mailer,
        config.sender.clone(),
        config.home_url.clone(),
    ));
    engine.set_handler(renderer)?;

    let shutdown = Arc::new(Notify::new());
    for i in 0..config.worker_count {
        let engine = engine.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            engine.run_worker(&format!("notify-worker-{i}"), shutdown).await;
        });
    }

    let state = Arc::new(AppState {
        directory,
        pages: TemplateRenderer::new(),
        config: config.clone(),
    });
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "docpost server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
