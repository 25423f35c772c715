//! HTTP surface: liveness endpoint only.

pub mod health;

pub use health::{HealthState, serve};
