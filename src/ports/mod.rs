//! Port traits. API boundaries for the hexagon.
//!
//! - Inbound: Called by the update transport and the scheduler into the application
//! - Outbound: Called by application into infrastructure

pub mod inbound;
pub mod outbound;

pub use inbound::{ScheduledJob, UpdateHandler};
pub use outbound::{
    AiPort, ChatChannel, ChatRepository, Clock, MessageRepository, ReportRepository,
};
