use crate::config::config::LoggerConfig;

pub fn level_filter(level: &str) -> log::LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

/// setup_logger installs env_logger at the configured level.
///
/// Returns false when a logger was already installed by an earlier call.
pub fn setup_logger(config: &LoggerConfig) -> bool {
    env_logger::builder()
        .filter_level(level_filter(&config.level))
        .format_timestamp_micros()
        .target(env_logger::Target::Stdout)
        .try_init()
        .is_ok()
}
