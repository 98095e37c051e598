use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rfp_assist::ai::{GeminiClient, StructuringAdapter};
use rfp_assist::config::AppConfig;
use rfp_assist::mail::{Dispatcher, ImapMailbox, Mailbox, SmtpDispatcher};
use rfp_assist::service::RfpService;
use rfp_assist::store::LibSqlStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "failed to install rustls crypto provider")?;

    let config = AppConfig::from_env()?;

    let db_path = std::path::Path::new(&config.db_path);
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let store = Arc::new(LibSqlStore::new_local(db_path).await?);
    info!(path = %config.db_path, "Database ready");

    let generator = Arc::new(GeminiClient::new(&config.gemini));
    let adapter = Arc::new(StructuringAdapter::new(generator));

    let (mailbox, dispatcher): (Option<Arc<dyn Mailbox>>, Option<Arc<dyn Dispatcher>>) =
        match &config.mail {
            Some(mail) => (
                Some(Arc::new(ImapMailbox::new(mail.clone()))),
                Some(Arc::new(SmtpDispatcher::new(mail.clone()))),
            ),
            None => {
                warn!("No mail configuration, dispatch and ingestion disabled");
                (None, None)
            }
        };

    let poll_enabled = mailbox.is_some() && config.poll_interval_secs > 0;
    let service = Arc::new(RfpService::new(store, adapter, mailbox, dispatcher));

    if poll_enabled {
        let poll_service = Arc::clone(&service);
        let interval_secs = config.poll_interval_secs;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                match poll_service.ingest_cycle().await {
                    Ok(outcomes) => {
                        if !outcomes.is_empty() {
                            info!(count = outcomes.len(), "Poll cycle processed emails");
                        }
                    }
                    Err(e) => error!(error = %e, "Poll cycle failed"),
                }
            }
        });
        info!(interval_secs, "Mailbox poll loop started");
    }

    let app = rfp_assist::api::router(service);
    let addr = format!("0.0.0.0:{}", config.bind_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}
