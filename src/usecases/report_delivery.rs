//! Daily report delivery. Analyzes every enabled chat, sends the report, records the outcome.
//!
//! Chats are processed strictly one after another with a fixed stagger between them.
//! A failing chat is recorded and the run moves on; a run where more than half of the
//! chats failed notifies the administrator once.

use crate::domain::{Chat, DomainError, NewReport, TextFormat};
use crate::ports::{ChatChannel, ChatRepository, Clock, ReportRepository, ScheduledJob};
use crate::shared::config::{MAX_DELIVERY_ATTEMPTS, RETRY_COOLDOWN, STAGGER_DELAY};
use crate::usecases::analysis_client::AnalysisClient;
use crate::usecases::report_formatter::format_report;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const ESCALATION_THRESHOLD: f64 = 0.5;
const MAX_LISTED_FAILURES: usize = 10;

/// Pacing and retry knobs for one run.
#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    pub max_attempts: u32,
    /// Pause between two consecutive chats.
    pub stagger_delay: Duration,
    /// Wait after a generic channel error before the next attempt.
    pub retry_cooldown: Duration,
    /// Failure fraction above which the administrator is notified.
    pub escalation_threshold: f64,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_DELIVERY_ATTEMPTS,
            stagger_delay: STAGGER_DELAY,
            retry_cooldown: RETRY_COOLDOWN,
            escalation_threshold: ESCALATION_THRESHOLD,
        }
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeliveryRunSummary {
    pub total_chats: usize,
    pub reports_sent: usize,
    pub reports_skipped: usize,
    pub errors: usize,
    pub failed_chat_ids: Vec<i64>,
}

impl DeliveryRunSummary {
    pub fn failure_rate(&self) -> f64 {
        if self.total_chats == 0 {
            0.0
        } else {
            self.errors as f64 / self.total_chats as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatOutcome {
    Sent,
    Skipped,
}

pub struct ReportDeliveryService {
    chats: Arc<dyn ChatRepository>,
    reports: Arc<dyn ReportRepository>,
    analysis: Arc<AnalysisClient>,
    channel: Arc<dyn ChatChannel>,
    clock: Arc<dyn Clock>,
    admin_chat_id: Option<i64>,
    policy: DeliveryPolicy,
}

impl ReportDeliveryService {
    pub fn new(
        chats: Arc<dyn ChatRepository>,
        reports: Arc<dyn ReportRepository>,
        analysis: Arc<AnalysisClient>,
        channel: Arc<dyn ChatChannel>,
        clock: Arc<dyn Clock>,
        admin_chat_id: Option<i64>,
    ) -> Self {
        Self {
            chats,
            reports,
            analysis,
            channel,
            clock,
            admin_chat_id,
            policy: DeliveryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run one delivery pass over every enabled chat.
    ///
    /// Only a failure to list the chats is returned as an error; everything per chat
    /// is folded into the summary.
    pub async fn run_daily_reports(&self) -> Result<DeliveryRunSummary, DomainError> {
        let chats = self.chats.list_enabled().await?;
        let mut summary = DeliveryRunSummary {
            total_chats: chats.len(),
            ..Default::default()
        };

        if chats.is_empty() {
            info!("no enabled chats, nothing to report");
            return Ok(summary);
        }

        info!(chats = chats.len(), "starting daily report run");

        for (idx, chat) in chats.iter().enumerate() {
            match self.process_chat(chat).await {
                Ok(ChatOutcome::Sent) => summary.reports_sent += 1,
                Ok(ChatOutcome::Skipped) => summary.reports_skipped += 1,
                Err(e) => {
                    error!(chat_id = chat.chat_id, error = %e, "report failed for chat");
                    summary.errors += 1;
                    summary.failed_chat_ids.push(chat.chat_id);
                }
            }

            if idx + 1 < chats.len() && !self.policy.stagger_delay.is_zero() {
                tokio::time::sleep(self.policy.stagger_delay).await;
            }
        }

        info!(
            total = summary.total_chats,
            sent = summary.reports_sent,
            skipped = summary.reports_skipped,
            errors = summary.errors,
            "daily report run complete"
        );

        if summary.failure_rate() > self.policy.escalation_threshold {
            error!(
                failure_rate = summary.failure_rate(),
                failed = ?summary.failed_chat_ids,
                "high failure rate in report run"
            );
            self.escalate(&summary).await;
        }

        Ok(summary)
    }

    async fn process_chat(&self, chat: &Chat) -> Result<ChatOutcome, DomainError> {
        info!(chat_id = chat.chat_id, name = %chat.name, "processing chat");

        let result = match self.analysis.analyze_chat_last_24h(chat.chat_id).await? {
            Some(result) if result.has_questions() => result,
            _ => {
                info!(chat_id = chat.chat_id, "no questions found, skipping report");
                return Ok(ChatOutcome::Skipped);
            }
        };

        let now = self.clock.now();
        let text = format_report(&result, &chat.name, now);
        self.deliver(chat.chat_id, &text).await?;

        // Delivery is confirmed at this point; a bookkeeping failure must not turn it
        // into a chat error or a resend.
        let report = NewReport {
            chat_ref: chat.id,
            report_date: now.date_naive(),
            questions_count: result.summary.total_questions,
            answered_count: result.summary.answered,
            unanswered_count: result.summary.unanswered,
            avg_response_time_minutes: result.summary.avg_response_time_minutes,
            report_text: Some(text),
            sent_at: Some(now.timestamp()),
        };
        match self.reports.create_report(&report).await {
            Ok(saved) => info!(chat_id = chat.chat_id, report_id = saved.id, "report sent and saved"),
            Err(e) => warn!(chat_id = chat.chat_id, error = %e, "report sent but not saved"),
        }

        Ok(ChatOutcome::Sent)
    }

    /// Send with retries. Rate limits wait the server-given time, generic channel
    /// errors wait the cooldown, anything else aborts at once.
    pub async fn deliver(&self, chat_id: i64, text: &str) -> Result<(), DomainError> {
        let max = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max {
            let wait = match self
                .channel
                .send_message(chat_id, text, TextFormat::Markdown)
                .await
            {
                Ok(()) => {
                    info!(chat_id, attempt, "report delivered");
                    return Ok(());
                }
                Err(DomainError::FloodWait { seconds }) => {
                    warn!(chat_id, attempt, wait_secs = seconds, "rate limited");
                    last_error = format!("rate limited ({seconds}s)");
                    Duration::from_secs(seconds)
                }
                Err(DomainError::Channel(msg)) => {
                    warn!(chat_id, attempt, error = %msg, "channel error");
                    last_error = msg;
                    self.policy.retry_cooldown
                }
                Err(e) => {
                    error!(chat_id, attempt, error = %e, "unexpected delivery error");
                    return Err(DomainError::Delivery(format!("chat {chat_id}: {e}")));
                }
            };

            if attempt < max && !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
        }

        Err(DomainError::Delivery(format!(
            "chat {chat_id}: giving up after {max} attempts: {last_error}"
        )))
    }

    /// Best effort: one attempt, failure only logged.
    async fn escalate(&self, summary: &DeliveryRunSummary) {
        let Some(admin_chat_id) = self.admin_chat_id else {
            warn!("no admin chat configured, skipping escalation");
            return;
        };

        let text = escalation_text(summary);
        match self
            .channel
            .send_message(admin_chat_id, &text, TextFormat::Markdown)
            .await
        {
            Ok(()) => info!(admin_chat_id, "escalation sent"),
            Err(e) => error!(admin_chat_id, error = %e, "failed to send escalation"),
        }
    }
}

fn escalation_text(summary: &DeliveryRunSummary) -> String {
    let mut ids: Vec<String> = summary
        .failed_chat_ids
        .iter()
        .take(MAX_LISTED_FAILURES)
        .map(|id| id.to_string())
        .collect();
    let hidden = summary.failed_chat_ids.len().saturating_sub(MAX_LISTED_FAILURES);
    if hidden > 0 {
        ids.push(format!("... and {hidden} more"));
    }

    format!(
        "⚠️ *Report Delivery Alert*\n\n\
         The daily report run had a high failure rate.\n\n\
         Total chats: {}\n\
         Failed: {}\n\
         Failure rate: {:.1}%\n\n\
         Failed chat IDs: {}",
        summary.total_chats,
        summary.errors,
        summary.failure_rate() * 100.0,
        ids.join(", ")
    )
}

#[async_trait::async_trait]
impl ScheduledJob for ReportDeliveryService {
    fn id(&self) -> &'static str {
        "daily_reports"
    }

    fn name(&self) -> &'static str {
        "Daily report delivery"
    }

    async fn run_once(&self) {
        match self.run_daily_reports().await {
            Ok(summary) => match serde_json::to_string(&summary) {
                Ok(json) => info!(summary = %json, "report job finished"),
                Err(_) => info!(?summary, "report job finished"),
            },
            Err(e) => error!(error = %e, "report job failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::SqliteRepo;
    use crate::domain::{IncomingMessage, Report};
    use crate::ports::{AiPort, MessageRepository};
    use crate::shared::FixedClock;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const ADMIN_CHAT: i64 = 999;

    struct ScriptedAi(Mutex<VecDeque<Result<String, DomainError>>>);

    #[async_trait::async_trait]
    impl AiPort for ScriptedAi {
        async fn complete(&self, _prompt: &str) -> Result<String, DomainError> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(analysis_json(0)))
        }
    }

    /// Pops scripted outcomes; succeeds once the script is exhausted.
    #[derive(Default)]
    struct FakeChannel {
        script: Mutex<VecDeque<Result<(), DomainError>>>,
        sent: Mutex<Vec<(i64, String)>>,
    }

    impl FakeChannel {
        fn scripted(outcomes: Vec<Result<(), DomainError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(outcomes.into()),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn attempts_to(&self, chat_id: i64) -> usize {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(id, _)| *id == chat_id)
                .count()
        }
    }

    #[async_trait::async_trait]
    impl ChatChannel for FakeChannel {
        async fn send_message(
            &self,
            chat_id: i64,
            text: &str,
            _format: TextFormat,
        ) -> Result<(), DomainError> {
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    struct BrokenReports;

    #[async_trait::async_trait]
    impl ReportRepository for BrokenReports {
        async fn create_report(&self, _: &NewReport) -> Result<Report, DomainError> {
            Err(DomainError::Repo("disk full".to_string()))
        }
        async fn get_report(&self, _: i64) -> Result<Option<Report>, DomainError> {
            Ok(None)
        }
        async fn get_by_chat_and_date(
            &self,
            _: i64,
            _: NaiveDate,
        ) -> Result<Option<Report>, DomainError> {
            Ok(None)
        }
        async fn get_recent_by_chat(&self, _: i64, _: u32) -> Result<Vec<Report>, DomainError> {
            Ok(vec![])
        }
        async fn mark_sent(
            &self,
            _: i64,
            _: DateTime<Utc>,
        ) -> Result<Option<Report>, DomainError> {
            Ok(None)
        }
        async fn delete_report(&self, _: i64) -> Result<bool, DomainError> {
            Ok(false)
        }
        async fn delete_reports_before(&self, _: i64, _: NaiveDate) -> Result<u64, DomainError> {
            Ok(0)
        }
        async fn delete_all_reports_before(&self, _: NaiveDate) -> Result<u64, DomainError> {
            Ok(0)
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap()
    }

    fn immediate() -> DeliveryPolicy {
        DeliveryPolicy {
            stagger_delay: Duration::ZERO,
            retry_cooldown: Duration::ZERO,
            ..DeliveryPolicy::default()
        }
    }

    /// Model answer with `n` questions, the first one answered.
    fn analysis_json(n: usize) -> String {
        let questions: Vec<serde_json::Value> = (0..n)
            .map(|i| {
                let minutes: Option<f64> = (i == 0).then_some(12.0);
                serde_json::json!({
                    "message_id": i + 1,
                    "text": format!("question {i}?"),
                    "category": "technical",
                    "is_answered": i == 0,
                    "response_time_minutes": minutes,
                })
            })
            .collect();
        serde_json::json!({
            "questions": questions,
            "answers": [],
            "summary": {"total_questions": n, "answered": n.min(1), "unanswered": n.saturating_sub(1)}
        })
        .to_string()
    }

    struct Harness {
        repo: Arc<SqliteRepo>,
        _dir: TempDir,
    }

    impl Harness {
        async fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let repo = Arc::new(SqliteRepo::connect(dir.path().join("bot.db")).await.unwrap());
            Self { repo, _dir: dir }
        }

        /// Register an enabled chat with one recent message.
        async fn chat_with_traffic(&self, chat_id: i64) -> Chat {
            let chat = self
                .repo
                .upsert_chat(chat_id, &format!("chat {chat_id}"))
                .await
                .unwrap();
            self.repo
                .save_message(&IncomingMessage {
                    chat_id,
                    message_id: 1,
                    sender_id: 5,
                    sender_name: "Ann".to_string(),
                    text: "Is the API down?".to_string(),
                    sent_at: now().timestamp() - 3600,
                })
                .await
                .unwrap();
            chat
        }

        fn service(
            &self,
            ai: Vec<Result<String, DomainError>>,
            channel: Arc<FakeChannel>,
        ) -> ReportDeliveryService {
            let clock = Arc::new(FixedClock(now()));
            let analysis = Arc::new(AnalysisClient::new(
                Arc::new(ScriptedAi(Mutex::new(ai.into()))),
                self.repo.clone(),
                clock.clone(),
            ));
            ReportDeliveryService::new(
                self.repo.clone(),
                self.repo.clone(),
                analysis,
                channel,
                clock,
                Some(ADMIN_CHAT),
            )
            .with_policy(immediate())
        }
    }

    #[tokio::test]
    async fn test_no_enabled_chats() {
        let h = Harness::new().await;
        let channel = FakeChannel::scripted(vec![]);
        let summary = h.service(vec![], channel.clone()).run_daily_reports().await.unwrap();
        assert_eq!(summary, DeliveryRunSummary::default());
        assert!(channel.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_one_sent_one_skipped() {
        let h = Harness::new().await;
        let first = h.chat_with_traffic(-101).await;
        let second = h.chat_with_traffic(-102).await;
        let channel = FakeChannel::scripted(vec![]);

        let summary = h
            .service(vec![Ok(analysis_json(3)), Ok(analysis_json(0))], channel.clone())
            .run_daily_reports()
            .await
            .unwrap();

        assert_eq!(summary.total_chats, 2);
        assert_eq!(summary.reports_sent, 1);
        assert_eq!(summary.reports_skipped, 1);
        assert_eq!(summary.errors, 0);
        assert!(summary.failed_chat_ids.is_empty());

        let sent = channel.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, -101);
        assert!(sent[0].1.contains("• Total Questions: 3"));

        let report = h
            .repo
            .get_by_chat_and_date(first.id, now().date_naive())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.questions_count, 3);
        assert_eq!(report.answered_count, 1);
        assert_eq!(report.sent_at, Some(now().timestamp()));
        assert!(
            h.repo
                .get_by_chat_and_date(second.id, now().date_naive())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_majority_failure_escalates_once() {
        let h = Harness::new().await;
        for id in [-1, -2, -3, -4] {
            h.chat_with_traffic(id).await;
        }
        let channel = FakeChannel::scripted(vec![]);
        let ai_error = || Err(DomainError::Ai("API error 500".to_string()));

        let summary = h
            .service(
                vec![ai_error(), ai_error(), Ok(analysis_json(1)), ai_error()],
                channel.clone(),
            )
            .run_daily_reports()
            .await
            .unwrap();

        assert_eq!(summary.errors, 3);
        assert_eq!(summary.failed_chat_ids, vec![-1, -2, -4]);
        assert_eq!(summary.reports_sent, 1);
        assert_eq!(channel.attempts_to(ADMIN_CHAT), 1);

        let sent = channel.sent.lock().unwrap().clone();
        let alert = &sent.iter().find(|(id, _)| *id == ADMIN_CHAT).unwrap().1;
        assert!(alert.contains("Failed chat IDs: -1, -2, -4"));
        assert!(alert.contains("Failure rate: 75.0%"));
    }

    #[tokio::test]
    async fn test_half_failure_does_not_escalate() {
        let h = Harness::new().await;
        h.chat_with_traffic(-1).await;
        h.chat_with_traffic(-2).await;
        let channel = FakeChannel::scripted(vec![]);

        let summary = h
            .service(
                vec![Err(DomainError::Ai("boom".to_string())), Ok(analysis_json(1))],
                channel.clone(),
            )
            .run_daily_reports()
            .await
            .unwrap();

        assert_eq!(summary.errors, 1);
        assert_eq!(channel.attempts_to(ADMIN_CHAT), 0);
    }

    #[tokio::test]
    async fn test_escalation_failure_is_swallowed() {
        let h = Harness::new().await;
        h.chat_with_traffic(-1).await;
        // Report send fails (fatal), then the escalation send fails too.
        let channel = FakeChannel::scripted(vec![
            Err(DomainError::Delivery("bad payload".to_string())),
            Err(DomainError::Channel("admin unreachable".to_string())),
        ]);

        let summary = h
            .service(vec![Ok(analysis_json(1))], channel.clone())
            .run_daily_reports()
            .await
            .unwrap();

        assert_eq!(summary.errors, 1);
        assert_eq!(channel.attempts_to(ADMIN_CHAT), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_then_success_takes_two_attempts() {
        let h = Harness::new().await;
        let channel = FakeChannel::scripted(vec![Err(DomainError::FloodWait { seconds: 0 })]);
        let service = h.service(vec![], channel.clone());

        service.deliver(-7, "report").await.unwrap();
        assert_eq!(channel.attempts_to(-7), 2);
    }

    #[tokio::test]
    async fn test_channel_errors_exhaust_attempts() {
        let h = Harness::new().await;
        let channel = FakeChannel::scripted(
            (0..5)
                .map(|_| Err(DomainError::Channel("timeout".to_string())))
                .collect(),
        );
        let service = h.service(vec![], channel.clone());

        let err = service.deliver(-7, "report").await.unwrap_err();
        assert!(matches!(err, DomainError::Delivery(_)));
        assert_eq!(channel.attempts_to(-7), MAX_DELIVERY_ATTEMPTS as usize);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_sleeps_server_wait_then_cooldown() {
        let h = Harness::new().await;
        let channel = FakeChannel::scripted(vec![
            Err(DomainError::FloodWait { seconds: 7 }),
            Err(DomainError::Channel("timeout".to_string())),
        ]);
        let service = h
            .service(vec![], channel.clone())
            .with_policy(DeliveryPolicy::default());

        let start = tokio::time::Instant::now();
        service.deliver(-7, "report").await.unwrap();

        let elapsed = start.elapsed();
        assert_eq!(channel.attempts_to(-7), 3);
        assert!(elapsed >= Duration::from_secs(7 + 60), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(7 + 61), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_cooldown_after_last_attempt() {
        let h = Harness::new().await;
        let channel = FakeChannel::scripted(
            (0..3)
                .map(|_| Err(DomainError::Channel("timeout".to_string())))
                .collect(),
        );
        let service = h
            .service(vec![], channel.clone())
            .with_policy(DeliveryPolicy::default());

        let start = tokio::time::Instant::now();
        assert!(service.deliver(-7, "report").await.is_err());

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(120), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(121), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stagger_between_chats_but_not_after_last() {
        let h = Harness::new().await;
        for id in [-1, -2, -3] {
            h.chat_with_traffic(id).await;
        }
        let channel = FakeChannel::scripted(vec![]);
        let service = h
            .service(
                vec![Ok(analysis_json(0)), Ok(analysis_json(0)), Ok(analysis_json(0))],
                channel,
            )
            .with_policy(DeliveryPolicy::default());

        let start = tokio::time::Instant::now();
        let summary = service.run_daily_reports().await.unwrap();

        let elapsed = start.elapsed();
        assert_eq!(summary.reports_skipped, 3);
        assert!(elapsed >= Duration::from_secs(10), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(11), "{elapsed:?}");
    }

    #[tokio::test]
    async fn test_unexpected_error_aborts_without_retry() {
        let h = Harness::new().await;
        let channel = FakeChannel::scripted(vec![Err(DomainError::Repo("weird".to_string()))]);
        let service = h.service(vec![], channel.clone());

        let err = service.deliver(-7, "report").await.unwrap_err();
        assert!(matches!(err, DomainError::Delivery(_)));
        assert_eq!(channel.attempts_to(-7), 1);
    }

    #[tokio::test]
    async fn test_persistence_failure_still_counts_as_sent() {
        let h = Harness::new().await;
        h.chat_with_traffic(-1).await;
        let channel = FakeChannel::scripted(vec![]);
        let clock = Arc::new(FixedClock(now()));
        let analysis = Arc::new(AnalysisClient::new(
            Arc::new(ScriptedAi(Mutex::new(vec![Ok(analysis_json(2))].into()))),
            h.repo.clone(),
            clock.clone(),
        ));
        let service = ReportDeliveryService::new(
            h.repo.clone(),
            Arc::new(BrokenReports),
            analysis,
            channel.clone(),
            clock,
            None,
        )
        .with_policy(immediate());

        let summary = service.run_daily_reports().await.unwrap();
        assert_eq!(summary.reports_sent, 1);
        assert_eq!(summary.errors, 0);
        assert_eq!(channel.attempts_to(-1), 1);
    }

    #[test]
    fn test_escalation_lists_at_most_ten_ids() {
        let summary = DeliveryRunSummary {
            total_chats: 12,
            reports_sent: 0,
            reports_skipped: 0,
            errors: 12,
            failed_chat_ids: (1..=12).collect(),
        };
        let text = escalation_text(&summary);
        assert!(text.contains("1, 2, 3, 4, 5, 6, 7, 8, 9, 10, ... and 2 more"));
        assert!(text.contains("Failure rate: 100.0%"));
    }
}
