use std::str::FromStr;

/// Verbosity levels exposed to host applications; maps onto the tracing
/// filter levels internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Mute,
    Error,
    Warning,
    Params,
    Info,
    Verbose,
    Debug,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Mute => "off",
            LogLevel::Error => "error",
            LogLevel::Warning => "warn",
            LogLevel::Params | LogLevel::Info => "info",
            LogLevel::Verbose | LogLevel::Debug => "debug",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mute" => Ok(LogLevel::Mute),
            "error" => Ok(LogLevel::Error),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "params" => Ok(LogLevel::Params),
            "info" => Ok(LogLevel::Info),
            "verbose" => Ok(LogLevel::Verbose),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(()),
        }
    }
}

pub fn log_level_from_string(s: &str) -> Option<LogLevel> {
    s.parse().ok()
}

/// Installs a console subscriber at the requested level. Call once per
/// process; subsequent calls are ignored so tests can run in parallel.
pub fn init_console_logging(level: LogLevel) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level.as_filter())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        assert_eq!(log_level_from_string("Debug"), Some(LogLevel::Debug));
        assert_eq!(log_level_from_string("warning"), Some(LogLevel::Warning));
        assert_eq!(log_level_from_string("MUTE"), Some(LogLevel::Mute));
        assert_eq!(log_level_from_string("shout"), None);
    }

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Debug > LogLevel::Info);
        assert!(LogLevel::Error < LogLevel::Warning);
    }
}
