//! Tracing setup
//!
//! The subscriber starts before configuration is read so config loading is
//! logged. The configured level is applied afterwards through a reload
//! handle, unless `RUST_LOG` was set.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Level used until the config file has been read
pub const STARTUP_LEVEL: &str = "info";

/// Filter directives for a configured level
pub fn filter_directives(level: &str) -> String {
    format!(
        "rolebridge_server={level},rolebridge_common={level},tower_http=info",
        level = level
    )
}

/// Handle to the live log filter
pub struct LogFilter {
    handle: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

impl LogFilter {
    /// Reloadable filter layer and its handle
    pub fn new(filter: EnvFilter, from_env: bool) -> (reload::Layer<EnvFilter, Registry>, Self) {
        let (layer, handle) = reload::Layer::new(filter);
        (layer, Self { handle, from_env })
    }

    /// Install the global subscriber; `RUST_LOG` wins when set
    pub fn init() -> Self {
        let (filter, from_env) = match EnvFilter::try_from_default_env() {
            Ok(filter) => (filter, true),
            Err(_) => (EnvFilter::new(filter_directives(STARTUP_LEVEL)), false),
        };
        let (layer, log_filter) = Self::new(filter, from_env);
        tracing_subscriber::registry()
            .with(layer)
            .with(fmt::layer())
            .init();
        log_filter
    }

    /// Switch to the configured level; returns false when `RUST_LOG` is in charge
    pub fn apply_level(&self, level: &str) -> anyhow::Result<bool> {
        if self.from_env {
            return Ok(false);
        }
        let filter = EnvFilter::try_new(filter_directives(level))?;
        self.handle.reload(filter)?;
        Ok(true)
    }

    /// Current filter directives
    pub fn current(&self) -> Option<String> {
        self.handle.with_current(|filter| filter.to_string()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_level_replaces_startup_filter() {
        let (layer, log_filter) =
            LogFilter::new(EnvFilter::new(filter_directives(STARTUP_LEVEL)), false);
        let _subscriber = tracing_subscriber::registry().with(layer);

        assert!(log_filter.current().unwrap().contains("rolebridge_common=info"));
        assert!(log_filter.apply_level("debug").unwrap());
        let current = log_filter.current().unwrap();
        assert!(current.contains("rolebridge_server=debug"));
        assert!(current.contains("rolebridge_common=debug"));
    }

    #[test]
    fn test_rust_log_filter_is_kept() {
        let (layer, log_filter) = LogFilter::new(EnvFilter::new("warn"), true);
        let _subscriber = tracing_subscriber::registry().with(layer);

        assert!(!log_filter.apply_level("trace").unwrap());
        assert_eq!(log_filter.current().unwrap(), "warn");
    }
}
