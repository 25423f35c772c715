//! Tracing setup. `RUST_LOG` wins over the configured level.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Directive used when `RUST_LOG` is unset: the configured level, HTTP internals capped at warn.
pub fn default_directive(level: &str) -> String {
    format!("{},hyper=warn,reqwest=warn,h2=warn", level.to_lowercase())
}

pub fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive(level).into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_parses() {
        let directive = default_directive("DEBUG");
        assert!(directive.starts_with("debug,"));
        assert!(EnvFilter::try_new(&directive).is_ok());
    }
}
