//! Wiring & DI. Entry point: load settings, bootstrap adapters, inject into services,
//! run the poller, scheduler and liveness server until Ctrl-C.
//! No business logic here.

use std::sync::Arc;
use tg_digest::adapters::ai::AnthropicAdapter;
use tg_digest::adapters::http::{self, HealthState};
use tg_digest::adapters::persistence::SqliteRepo;
use tg_digest::adapters::telegram::{BotApiClient, UpdatePoller};
use tg_digest::ports::{
    AiPort, ChatChannel, ChatRepository, Clock, MessageRepository, ReportRepository,
    ScheduledJob, UpdateHandler,
};
use tg_digest::shared::{Settings, SystemClock, logging};
use tg_digest::usecases::{
    AdminService, AnalysisClient, CleanupService, DailyTrigger, MessageCollector,
    ReportDeliveryService, Scheduler, UpdateDispatcher,
};
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().map_err(|e| anyhow::anyhow!("{}", e))?;
    logging::init_tracing(&settings.log_level);
    info!(settings = ?settings, "configuration loaded");

    if settings.admin_user_id.is_none() {
        warn!("ADMIN_USER_ID not set, admin commands are disabled");
    }
    if settings.admin_chat_id.is_none() {
        warn!("ADMIN_CHAT_ID not set, delivery escalations will only be logged");
    }

    // --- Persistence ---
    let repo = Arc::new(
        SqliteRepo::connect(&settings.database_path)
            .await
            .map_err(|e| anyhow::anyhow!("SQLite connect failed: {}", e))?,
    );
    let chats: Arc<dyn ChatRepository> = repo.clone();
    let messages: Arc<dyn MessageRepository> = repo.clone();
    let reports: Arc<dyn ReportRepository> = repo.clone();

    // --- Telegram Bot API ---
    let bot = Arc::new(BotApiClient::new(
        &settings.telegram_api_url,
        settings.telegram_bot_token.clone(),
    ));
    let me = bot
        .get_me()
        .await
        .map_err(|e| anyhow::anyhow!("Bot token check failed: {}", e))?;
    info!(bot_id = me.id, username = ?me.username, "connected to Telegram Bot API");
    let channel: Arc<dyn ChatChannel> = bot.clone();

    // --- Analysis ---
    let ai: Arc<dyn AiPort> = Arc::new(AnthropicAdapter::new(
        settings.ai_api_url.clone(),
        settings.anthropic_api_key.clone(),
        settings.ai_model.clone(),
    ));
    info!(model = %settings.ai_model, url = %settings.ai_api_url, "analysis client configured");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // --- Services ---
    let analysis = Arc::new(AnalysisClient::new(ai, messages.clone(), clock.clone()));
    let delivery = Arc::new(ReportDeliveryService::new(
        chats.clone(),
        reports.clone(),
        analysis,
        channel.clone(),
        clock.clone(),
        settings.admin_chat_id,
    ));
    let cleanup = Arc::new(CleanupService::new(
        messages.clone(),
        reports,
        clock.clone(),
        settings.message_retention_hours,
        settings.report_retention_days,
    ));
    let dispatcher: Arc<dyn UpdateHandler> = Arc::new(UpdateDispatcher::new(
        Arc::new(MessageCollector::new(chats.clone(), messages)),
        Arc::new(AdminService::new(chats, settings.admin_user_id)),
        channel,
    ));

    // --- Scheduler ---
    let mut scheduler = Scheduler::new(clock.clone());
    let report_job: Arc<dyn ScheduledJob> = delivery;
    let cleanup_job: Arc<dyn ScheduledJob> = cleanup;
    scheduler.add_job(
        report_job,
        DailyTrigger::at_hour(settings.report_time_hour, settings.utc_offset)
            .map_err(|e| anyhow::anyhow!("{}", e))?,
    );
    scheduler.add_job(
        cleanup_job,
        DailyTrigger::at_hour(settings.cleanup_time_hour, settings.utc_offset)
            .map_err(|e| anyhow::anyhow!("{}", e))?,
    );
    info!(
        report_hour = settings.report_time_hour,
        cleanup_hour = settings.cleanup_time_hour,
        timezone = %settings.timezone,
        "daily jobs registered"
    );
    let health_state = HealthState::new(scheduler.handle(), clock);

    // --- Run until Ctrl-C ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poller = UpdatePoller::new(bot, dispatcher);
    let poller_rx = shutdown_rx.clone();
    let poller_task = tokio::spawn(async move { poller.run(poller_rx).await });
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx.clone()));
    let health_task = tokio::spawn(http::serve(settings.health_port, health_state, shutdown_rx));

    info!("bot started, press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl-C, shutting down");
    }
    info!("shutdown requested, waiting for in-flight work");
    let _ = shutdown_tx.send(true);

    if let Err(e) = poller_task.await {
        warn!(error = %e, "poller task ended abnormally");
    }
    if let Err(e) = scheduler_task.await {
        warn!(error = %e, "scheduler task ended abnormally");
    }
    match health_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "liveness server failed"),
        Err(e) => warn!(error = %e, "liveness server task ended abnormally"),
    }

    info!("bot stopped");
    Ok(())
}
