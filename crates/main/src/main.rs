//! 主应用程序入口
//!
//! 装配存储、投递队列和申请受理服务，启动 Axum Web API。

use std::sync::Arc;

use application::{
    ApplicationIntakeDependencies, ApplicationIntakeService, Clock, DeliveryQueue,
    DeliveryQueueConfig, DomainRecipientDirectory, IntakeSettings, NotificationDispatcher,
    PlainTextRenderer, SystemClock,
};
use config::AppConfig;
use infrastructure::Infrastructure;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load_validated()?;

    // RUST_LOG 优先，否则使用配置中的日志级别
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let infrastructure = Infrastructure::connect(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let delivery_queue = Arc::new(DeliveryQueue::new(
        infrastructure.transport.clone(),
        Arc::new(PlainTextRenderer),
        clock.clone(),
        DeliveryQueueConfig::from(&config.delivery),
    ));
    delivery_queue.start().await;

    let dispatcher = Arc::new(NotificationDispatcher::new(
        delivery_queue.clone(),
        Arc::new(DomainRecipientDirectory::new(&config.mail.recipient_domain)),
    ));

    let intake_service = ApplicationIntakeService::new(ApplicationIntakeDependencies {
        store: infrastructure.store.clone(),
        dispatcher,
        clock,
        settings: IntakeSettings::from(&config.intake),
    });

    let state = AppState::new(Arc::new(intake_service), delivery_queue.clone());
    let app = router(state);

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(%address, backend = ?config.database.backend, "marketplace server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let report = delivery_queue.shutdown().await;
    tracing::info!(
        remaining_jobs = report.remaining_jobs,
        drained_within_grace = report.drained_within_grace,
        "server stopped"
    );

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
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

    tracing::info!("shutdown signal received");
}
