//! Inbound ports. The update transport and the scheduler call into the application.

use crate::domain::InboundUpdate;

/// Receives one update at a time. Implementations contain their own errors:
/// a failing update never blocks the next one.
#[async_trait::async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn handle_update(&self, update: InboundUpdate);
}

/// A job the scheduler fires. `run_once` must be safe to call repeatedly and must not
/// return errors: failures are logged inside the job.
#[async_trait::async_trait]
pub trait ScheduledJob: Send + Sync {
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    async fn run_once(&self);
}
