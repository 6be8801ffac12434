use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use content_promoter::config::Config;
use content_promoter::db::Database;
use content_promoter::feeds::FeedNormalizer;
use content_promoter::generate::{CopyGenerator, GeminiClient};
use content_promoter::jobs::{JobContext, JobHandlers, JobQueue, JobWorker};
use content_promoter::notify::{LogNotifier, Notifier, SlackNotifier};
use content_promoter::publish::{
    LinkedInClient, LinkedInSettings, PlatformPublisher, PlatformRegistry,
};
use content_promoter::scheduler::Scheduler;
use content_promoter::web::{self, AppState};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting content-promoter");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        role = ?config.role,
        feeds = config.content_feeds.len(),
        "Configuration loaded"
    );

    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }

    let db = Database::new(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    info!("Database initialized");

    let queue = JobQueue::new(db.clone());
    let publisher = build_publisher(&config, db.clone())?;
    let shutdown = CancellationToken::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    if config.role.runs_worker() {
        let generator = build_generator(&config)?;
        let normalizer =
            Arc::new(FeedNormalizer::new(config.feed_timeout).context("Failed to build feed client")?);
        let notifier = build_notifier(&config)?;

        let ctx = JobContext::new(
            &config,
            queue.clone(),
            normalizer,
            generator,
            publisher.clone(),
            notifier,
        );
        let worker = JobWorker::new(&config, queue.clone(), JobHandlers::new(ctx));

        // Jobs left running by a previous process
        if let Err(e) = worker.recover_on_startup().await {
            error!("Failed to recover jobs on startup: {e:#}");
        }

        let worker_shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            worker.run(worker_shutdown).await;
        }));

        let scheduler = Scheduler::new(&config, queue.clone())?;
        let scheduler_shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            scheduler.run(scheduler_shutdown).await;
        }));
        info!("Job worker and scheduler started");
    }

    if config.role.runs_web() {
        let state = AppState {
            db,
            queue,
            publisher,
            config: Arc::new(config.clone()),
        };
        let web_shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = web::serve(state, web_shutdown).await {
                error!("Web server error: {e:#}");
            }
        }));
    }

    shutdown_signal().await;

    info!("Shutting down...");
    shutdown.cancel();

    for task in tasks {
        match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Task ended abnormally: {e}"),
            Err(_) => warn!("Task did not stop within the grace period"),
        }
    }

    info!("Shutdown complete");

    Ok(())
}

fn build_generator(config: &Config) -> Result<CopyGenerator> {
    let api_key = config
        .gemini_api_key
        .as_deref()
        .context("GEMINI_API_KEY is required to run jobs")?;
    let gemini = GeminiClient::new(api_key, &config.gemini_model, config.generation_timeout)
        .context("Failed to build Gemini client")?
        .with_base_url(&config.gemini_api_base);
    info!(model = %config.gemini_model, "Copy generation enabled");
    Ok(CopyGenerator::new(
        Arc::new(gemini),
        config.generation_retry,
        &config.utm_params,
    ))
}

fn build_publisher(config: &Config, db: Database) -> Result<PlatformPublisher> {
    let mut registry = PlatformRegistry::new();

    match (
        config.linkedin_client_id.as_deref(),
        config.linkedin_client_secret.as_deref(),
    ) {
        (Some(client_id), Some(client_secret)) => {
            let linkedin = LinkedInClient::new(
                LinkedInSettings {
                    client_id: client_id.to_string(),
                    client_secret: client_secret.to_string(),
                    redirect_uri: config.linkedin_redirect_uri.clone(),
                    oauth_base: config.linkedin_oauth_base.clone(),
                    api_base: config.linkedin_api_base.clone(),
                },
                config.publish_timeout,
            )
            .context("Failed to build LinkedIn client")?;
            registry.register(Arc::new(linkedin));
            info!("LinkedIn publishing enabled");
        }
        _ => warn!("LinkedIn credentials not configured - publishing disabled"),
    }

    Ok(PlatformPublisher::new(
        db,
        registry,
        config.publish_retry,
        config.token_refresh_skew,
    ))
}

fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    if !config.slack_notifications_enabled {
        info!("Slack notifications disabled - digests are logged only");
        return Ok(Arc::new(LogNotifier));
    }
    let Some(token) = config.slack_bot_token.as_deref() else {
        warn!("SLACK_NOTIFICATIONS_ENABLED is set but SLACK_BOT_TOKEN is missing - digests are logged only");
        return Ok(Arc::new(LogNotifier));
    };
    let slack = SlackNotifier::new(token, &config.slack_api_base, config.publish_timeout)
        .context("Failed to build Slack client")?
        .with_default_channel(config.slack_default_channel.clone());
    info!("Slack notifications enabled");
    Ok(Arc::new(slack))
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,content_promoter=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
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
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
