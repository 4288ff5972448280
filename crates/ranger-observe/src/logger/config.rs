use std::io::IsTerminal;

use crate::logger::format::LoggerFormat;

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive, e.g. `info` or `ranger.core=debug,info`.
    pub level: String,
    pub with_targets: bool,
    pub with_time: bool,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: false,
            with_time: false,
            use_color: std::io::stderr().is_terminal(),
        }
    }
}

impl LoggerConfig {
    /// Verbose preset: targets and timestamps on.
    pub fn verbose(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            with_targets: true,
            with_time: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_terse_text() {
        let cfg = LoggerConfig::default();
        assert_eq!(cfg.format, LoggerFormat::Text);
        assert_eq!(cfg.level, "info");
        assert!(!cfg.with_targets && !cfg.with_time);
    }

    #[test]
    fn verbose_preset() {
        let cfg = LoggerConfig::verbose("debug");
        assert_eq!(cfg.level, "debug");
        assert!(cfg.with_targets && cfg.with_time);
    }
}
