//! Long-polling update loop. Feeds `getUpdates` results to an `UpdateHandler` one at a time.
//!
//! Runs until the shutdown flag flips; the update in flight is always finished first.

use crate::adapters::telegram::bot_api::BotApiClient;
use crate::adapters::telegram::mapper;
use crate::ports::UpdateHandler;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const POLL_TIMEOUT_SECS: u64 = 30;
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

pub struct UpdatePoller {
    api: Arc<BotApiClient>,
    handler: Arc<dyn UpdateHandler>,
    poll_timeout_secs: u64,
}

impl UpdatePoller {
    pub fn new(api: Arc<BotApiClient>, handler: Arc<dyn UpdateHandler>) -> Self {
        Self {
            api,
            handler,
            poll_timeout_secs: POLL_TIMEOUT_SECS,
        }
    }

    /// Poll until `shutdown` becomes true. Transport errors back off and retry.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(timeout_secs = self.poll_timeout_secs, "update polling started");
        let mut offset: Option<i64> = None;

        while !*shutdown.borrow() {
            let poll = self.api.get_updates(offset, self.poll_timeout_secs);
            let updates = tokio::select! {
                result = poll => result,
                _ = shutdown.changed() => break,
            };

            let updates = match updates {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, backoff_secs = ERROR_BACKOFF.as_secs(), "getUpdates failed");
                    tokio::select! {
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                        _ = shutdown.changed() => break,
                    }
                    continue;
                }
            };

            for update in updates {
                offset = Some(update.update_id + 1);
                match mapper::update_to_domain(&update) {
                    Some(inbound) => self.handler.handle_update(inbound).await,
                    None => debug!(update_id = update.update_id, "skipping non-text update"),
                }
            }
        }

        info!("update polling stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::InboundUpdate;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<InboundUpdate>>,
        stop: Mutex<Option<watch::Sender<bool>>>,
    }

    #[async_trait::async_trait]
    impl UpdateHandler for Recorder {
        async fn handle_update(&self, update: InboundUpdate) {
            self.seen.lock().unwrap().push(update);
            if let Some(tx) = self.stop.lock().unwrap().as_ref() {
                let _ = tx.send(true);
            }
        }
    }

    #[tokio::test]
    async fn test_dispatches_text_updates_then_stops() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bottok/getUpdates")
            .with_status(200)
            .with_body(
                r#"{"ok":true,"result":[
                {"update_id":5,"message":{"message_id":1,"date":1,"chat":{"id":-9,"type":"group","title":"G"},"sticker":{}}},
                {"update_id":6,"message":{"message_id":2,"date":2,"chat":{"id":-9,"type":"group","title":"G"},"text":"hi"}}
                ]}"#,
            )
            .create_async()
            .await;

        let (tx, rx) = watch::channel(false);
        let recorder = Arc::new(Recorder::default());
        *recorder.stop.lock().unwrap() = Some(tx);

        let api = Arc::new(BotApiClient::new(&server.url(), "tok".to_string()));
        let mut poller = UpdatePoller::new(api, recorder.clone());
        poller.poll_timeout_secs = 0;

        tokio::time::timeout(Duration::from_secs(5), poller.run(rx))
            .await
            .unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(&seen[0], InboundUpdate::Text(m) if m.text == "hi"));
    }

    #[tokio::test]
    async fn test_returns_immediately_when_already_shut_down() {
        let (_tx, rx) = watch::channel(true);
        let api = Arc::new(BotApiClient::new("http://127.0.0.1:9", "tok".to_string()));
        let poller = UpdatePoller::new(api, Arc::new(Recorder::default()));
        tokio::time::timeout(Duration::from_secs(1), poller.run(rx))
            .await
            .unwrap();
    }
}
