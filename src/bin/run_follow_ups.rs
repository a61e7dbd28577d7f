//! One-shot follow-up run, for cron jobs or manual catch-up.
//!
//! Generates due follow-ups for every client and, unless `--generate-only`
//! is passed, sends the ones whose schedule has arrived.

use std::sync::Arc;

use rust_followup_api::channels::{ChannelRegistry, EmailSender, PushSender, SmsSender};
use rust_followup_api::config::Config;
use rust_followup_api::db::Database;
use rust_followup_api::db_storage::PgStorage;
use rust_followup_api::followup::FollowUpService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let generate_only = std::env::args().any(|a| a == "--generate-only");

    let config = Config::from_env()?;
    let db = Database::new(&config.database_url).await?;
    let storage = Arc::new(PgStorage::new(db.pool.clone()));

    let mut channels = ChannelRegistry::new()
        .register(Arc::new(EmailSender::new(
            config.email_api_url.clone(),
            config.email_api_key.clone(),
        )?))
        .register(Arc::new(SmsSender::new(config.sms_region()?)));
    if let (Some(url), Some(key)) = (&config.push_api_url, &config.push_api_key) {
        channels = channels.register(Arc::new(PushSender::new(url.clone(), key.clone())?));
    }

    let service = FollowUpService::new(storage.clone(), storage, channels);

    tracing::info!("Connected to database. Generating follow-ups...");
    let report = service.generate_automatic_follow_ups().await?;
    tracing::info!(
        "Generation complete: {} analyzed, {} generated, {} skipped, {} failed",
        report.clients_analyzed,
        report.generated,
        report.skipped,
        report.failed
    );

    if generate_only {
        return Ok(());
    }

    let dispatch = service.dispatch_due_follow_ups(chrono::Utc::now()).await?;
    tracing::info!(
        "Dispatch complete: {} attempted, {} sent, {} failed, {} skipped",
        dispatch.attempted,
        dispatch.sent,
        dispatch.failed,
        dispatch.skipped
    );

    Ok(())
}
