//! Retention cleanup. Purges messages (hours-based) and reports (days-based).
//!
//! Both operations are all-or-nothing: on a store error the run is logged and counts as 0.

use crate::ports::{Clock, MessageRepository, ReportRepository, ScheduledJob};
use chrono::Duration;
use std::sync::Arc;
use tracing::{error, info};

pub struct CleanupService {
    messages: Arc<dyn MessageRepository>,
    reports: Arc<dyn ReportRepository>,
    clock: Arc<dyn Clock>,
    message_retention_hours: u32,
    report_retention_days: u32,
}

impl CleanupService {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        reports: Arc<dyn ReportRepository>,
        clock: Arc<dyn Clock>,
        message_retention_hours: u32,
        report_retention_days: u32,
    ) -> Self {
        Self {
            messages,
            reports,
            clock,
            message_retention_hours,
            report_retention_days,
        }
    }

    /// Delete every message sent before `now - retention`. Returns rows removed.
    pub async fn cleanup_old_messages(&self) -> u64 {
        let cutoff = self.clock.now() - Duration::hours(i64::from(self.message_retention_hours));
        info!(
            %cutoff,
            retention_hours = self.message_retention_hours,
            "starting message cleanup"
        );
        match self.messages.delete_before(cutoff).await {
            Ok(deleted) => {
                info!(deleted, "message cleanup completed");
                deleted
            }
            Err(e) => {
                error!(error = %e, "message cleanup failed");
                0
            }
        }
    }

    /// Delete reports dated before `today - retention days`. Returns rows removed.
    pub async fn cleanup_old_reports(&self) -> u64 {
        let cutoff = self.clock.now().date_naive()
            - Duration::days(i64::from(self.report_retention_days));
        match self.reports.delete_all_reports_before(cutoff).await {
            Ok(deleted) => {
                info!(deleted, %cutoff, "report cleanup completed");
                deleted
            }
            Err(e) => {
                error!(error = %e, "report cleanup failed");
                0
            }
        }
    }
}

#[async_trait::async_trait]
impl ScheduledJob for CleanupService {
    fn id(&self) -> &'static str {
        "cleanup_old_messages"
    }

    fn name(&self) -> &'static str {
        "Retention cleanup"
    }

    async fn run_once(&self) {
        let messages = self.cleanup_old_messages().await;
        let reports = self.cleanup_old_reports().await;
        info!(messages, reports, "cleanup job finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::SqliteRepo;
    use crate::domain::{DomainError, IncomingMessage, Message, NewReport};
    use crate::ports::ChatRepository;
    use crate::shared::FixedClock;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 2, 0, 0).unwrap()
    }

    async fn setup() -> (Arc<SqliteRepo>, CleanupService, TempDir) {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(SqliteRepo::connect(dir.path().join("c.db")).await.unwrap());
        let service = CleanupService::new(
            repo.clone(),
            repo.clone(),
            Arc::new(FixedClock(now())),
            48,
            30,
        );
        (repo, service, dir)
    }

    async fn seed(repo: &SqliteRepo, chat_id: i64, message_id: i64, sent_at: DateTime<Utc>) {
        repo.save_message(&IncomingMessage {
            chat_id,
            message_id,
            sender_id: 1,
            sender_name: "Ann".to_string(),
            text: "hi".to_string(),
            sent_at: sent_at.timestamp(),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_messages_before_cutoff_are_removed() {
        let (repo, service, _dir) = setup().await;
        let cutoff = now() - Duration::hours(48);
        seed(&repo, -1, 1, cutoff - Duration::minutes(1)).await;
        seed(&repo, -2, 2, cutoff - Duration::days(5)).await;
        seed(&repo, -1, 3, cutoff).await;
        seed(&repo, -2, 4, now()).await;

        assert_eq!(service.cleanup_old_messages().await, 2);
        assert!(repo.get_message(-1, 3).await.unwrap().is_some());
        assert!(repo.get_message(-2, 4).await.unwrap().is_some());
        assert_eq!(repo.count_messages(None).await.unwrap(), 2);

        // Second run is a no-op.
        assert_eq!(service.cleanup_old_messages().await, 0);
    }

    #[tokio::test]
    async fn test_reports_older_than_retention_are_removed() {
        let (repo, service, _dir) = setup().await;
        let chat = repo.upsert_chat(-1, "chat").await.unwrap();
        for date in [
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 8).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 9).unwrap(),
        ] {
            repo.create_report(&NewReport {
                chat_ref: chat.id,
                report_date: date,
                questions_count: 1,
                answered_count: 1,
                unanswered_count: 0,
                avg_response_time_minutes: None,
                report_text: None,
                sent_at: None,
            })
            .await
            .unwrap();
        }

        // Cutoff is 2025-02-08: strictly older dates go.
        assert_eq!(service.cleanup_old_reports().await, 1);
        assert_eq!(repo.get_recent_by_chat(chat.id, 10).await.unwrap().len(), 2);
    }

    struct FailingMessages;

    #[async_trait::async_trait]
    impl MessageRepository for FailingMessages {
        async fn save_message(&self, _: &IncomingMessage) -> Result<Message, DomainError> {
            Err(DomainError::Repo("locked".to_string()))
        }
        async fn get_messages_between(
            &self,
            _: i64,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> Result<Vec<Message>, DomainError> {
            Ok(vec![])
        }
        async fn get_message(&self, _: i64, _: i64) -> Result<Option<Message>, DomainError> {
            Ok(None)
        }
        async fn delete_before(&self, _: DateTime<Utc>) -> Result<u64, DomainError> {
            Err(DomainError::Repo("database is locked".to_string()))
        }
        async fn count_messages(&self, _: Option<i64>) -> Result<u64, DomainError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_store_error_counts_as_zero() {
        let (repo, _, _dir) = setup().await;
        let service = CleanupService::new(
            Arc::new(FailingMessages),
            repo,
            Arc::new(FixedClock(now())),
            48,
            30,
        );
        assert_eq!(service.cleanup_old_messages().await, 0);
    }
}
