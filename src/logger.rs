use std::env;
use tracing_subscriber::EnvFilter;

const DEFAULT_LEVEL: &str = "info";

/// `RUST_LOG` wins when set; otherwise `LOG_LEVEL` applies to every target.
fn filter_directives(log_level: Option<String>, rust_log: Option<String>) -> String {
    match rust_log {
        Some(directives) => directives,
        None => log_level
            .map(|level| level.trim().to_lowercase())
            .filter(|level| !level.is_empty())
            .unwrap_or_else(|| DEFAULT_LEVEL.to_string()),
    }
}

pub fn init_logging() {
    let directives = filter_directives(env::var("LOG_LEVEL").ok(), env::var("RUST_LOG").ok());
    let filter = EnvFilter::new(directives);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn log_level_is_lowercased() {
        assert_eq!(filter_directives(Some("DEBUG".to_string()), None), "debug");
    }

    #[test]
    fn rust_log_overrides_level() {
        let directives = filter_directives(Some("DEBUG".to_string()), Some("scholarhub=trace".to_string()));
        assert_eq!(directives, "scholarhub=trace");
    }

    #[test]
    fn blank_level_falls_back_to_info() {
        assert_eq!(filter_directives(Some("  ".to_string()), None), "info");
        assert_eq!(filter_directives(None, None), "info");
    }
}
