//! Cross-cutting concerns: configuration, logging, time.

pub mod clock;
pub mod config;
pub mod logging;

pub use clock::{FixedClock, SystemClock};
pub use config::Settings;
