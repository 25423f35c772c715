//! Application use cases. Orchestrate domain logic via ports.

pub mod admin_service;
pub mod analysis_client;
pub mod cleanup_service;
pub mod dispatcher;
pub mod message_collector;
pub mod report_delivery;
pub mod report_formatter;
pub mod scheduler;

pub use admin_service::AdminService;
pub use analysis_client::AnalysisClient;
pub use cleanup_service::CleanupService;
pub use dispatcher::UpdateDispatcher;
pub use message_collector::{IngestOutcome, MessageCollector};
pub use report_delivery::{DeliveryPolicy, DeliveryRunSummary, ReportDeliveryService};
pub use scheduler::{DailyTrigger, Scheduler, SchedulerHandle};
